//! Escaping of code for the statement request body.

/// Escape `code` for embedding inside the JSON string of `{"code": "..."}`.
///
/// The replacements run in a fixed order: literal `\n` sequences, real
/// newlines, escaped quotes, then bare quotes. Each step must not see the
/// output of a later one.
#[must_use]
pub fn escape_code(code: &str) -> String {
    code.replace("\\n", "\\\\n")
        .replace('\n', "\\n")
        .replace("\\\"", "\\\\\"")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use livy_transport::protocol::statement_body;

    use super::*;

    fn decoded(code: &str) -> String {
        let body: serde_json::Value = serde_json::from_str(&statement_body(&escape_code(code)))
            .expect("escaped body should be valid JSON");
        body["code"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_newline_literal_backslash_n_and_quote_survive() {
        let code = "val s = \"a\\nb\"\nprintln(s)";
        assert_eq!(decoded(code), code);
    }

    #[test]
    fn test_escaped_quote_survives() {
        let code = r#"x = "say \"hi\"""#;
        assert_eq!(decoded(code), code);
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape_code("a\nb"), r"a\nb");
        assert_eq!(escape_code(r"a\nb"), r"a\\nb");
        assert_eq!(escape_code(r#"\""#), r#"\\\""#);
        assert_eq!(escape_code("\"x\""), r#"\"x\""#);
    }

    #[test]
    fn test_blank_stays_blank() {
        assert!(escape_code("   ").trim().is_empty());
        // newlines turn into visible escapes
        assert!(!escape_code("  \n ").trim().is_empty());
    }
}
