//! Request context for interpret calls.

use serde::{Deserialize, Serialize};

use crate::Principal;

/// Identity and request id of a single interpret call.
///
/// The principal selects the remote session; the request id is the key
/// a later `cancel` uses to find the statement this call is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// User the remote session is created for and addressed by.
    pub principal: Principal,

    /// Caller-chosen identifier of this request (a paragraph id, a job id, ...).
    pub request_id: String,
}

impl RequestContext {
    /// Create a context for one request.
    #[must_use]
    pub fn new(principal: impl Into<Principal>, request_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            request_id: request_id.into(),
        }
    }
}
