//! Spark SQL on top of a Scala Spark interpreter.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use livy_core::{
    Code, ExecutionResult, Interpreter, LivyConfig, OutputStore, RequestContext, SessionDirectory,
    SessionId,
};
use livy_executor::{ExecError, RequestHandle, reshape_table};
use tokio::sync::OnceCell;

use crate::{InterpretError, LivyInterpreter, MemoryDirectory, Scheduler};

const SPARK_SESSION_CLASS: &str = "org.apache.spark.sql.SparkSession";
const CREATE_SQL_CONTEXT: &str =
    "val sqlContext = new org.apache.spark.sql.SQLContext(sc)\nimport sqlContext.implicits._";

/// Which SQL entry point the remote Spark exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkDialect {
    /// Spark 2.x and later: `spark.sql`.
    SparkSession,
    /// Spark 1.x: `sqlContext.sql`.
    SqlContext,
}

impl SparkDialect {
    /// Scala code running `sql` and printing at most `max_result` rows.
    ///
    /// Triple quotes avoid escaping the query.
    #[must_use]
    pub fn wrap(self, sql: &str, max_result: usize) -> String {
        let entry = match self {
            Self::SparkSession => "spark",
            Self::SqlContext => "sqlContext",
        };
        format!("{entry}.sql(\"\"\"{sql}\"\"\").show({max_result})")
    }
}

/// Runs SQL in the sessions of a Spark interpreter and returns tables.
///
/// The dialect is detected on first use and kept for the interpreter's
/// lifetime. A failed detection is retried by the next request. With the
/// `sqlContext` dialect, each session gets its SQLContext before its first
/// query.
pub struct SqlInterpreter<D = MemoryDirectory>
where
    D: SessionDirectory,
{
    spark: Arc<LivyInterpreter<D>>,
    scheduler: Scheduler,
    dialect: OnceCell<SparkDialect>,
    /// Sessions known to have `sqlContext` defined.
    prepared: Mutex<HashSet<SessionId>>,
    max_result: usize,
}

impl<D> SqlInterpreter<D>
where
    D: SessionDirectory,
{
    /// SQL interpreter sharing `spark`'s sessions.
    ///
    /// With `concurrent_sql` set, queries run on their own bounded scheduler;
    /// otherwise they queue behind Spark requests.
    #[must_use]
    pub fn new(spark: Arc<LivyInterpreter<D>>, config: &LivyConfig) -> Self {
        let scheduler = if config.concurrent_sql {
            Scheduler::parallel(config.max_concurrency)
        } else {
            spark.scheduler().clone()
        };
        Self {
            spark,
            scheduler,
            dialect: OnceCell::new(),
            prepared: Mutex::new(HashSet::new()),
            max_result: config.max_result,
        }
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The detected dialect, if detection already ran.
    #[must_use]
    pub fn dialect(&self) -> Option<SparkDialect> {
        self.dialect.get().copied()
    }

    async fn run(
        &self,
        sql: &str,
        principal: &str,
        handle: &RequestHandle,
    ) -> Result<ExecutionResult, InterpretError> {
        let session = self.spark.session_for(principal, handle).await?;
        let dialect = *self
            .dialect
            .get_or_try_init(|| self.detect(session, handle))
            .await?;
        if dialect == SparkDialect::SqlContext && !self.is_prepared(session) {
            self.create_sql_context(session, handle).await?;
        }

        let query = dialect.wrap(sql, self.max_result);
        let result = self
            .spark
            .runner()
            .submit_and_wait(&query, session, handle)
            .await?;
        if !result.is_success() {
            return Ok(result);
        }

        let table = reshape_table(&result.message).map_err(ExecError::from)?;
        Ok(ExecutionResult::success(table))
    }

    async fn detect(
        &self,
        session: SessionId,
        handle: &RequestHandle,
    ) -> Result<SparkDialect, InterpretError> {
        let runner = self.spark.runner();

        let reply = runner.submit_and_wait("spark", session, handle).await?;
        if reply.is_success() && reply.message.contains(SPARK_SESSION_CLASS) {
            tracing::info!(session, "SparkSession detected, using spark.sql");
            return Ok(SparkDialect::SparkSession);
        }

        let reply = runner.submit_and_wait("sqlContext", session, handle).await?;
        match reply.code {
            Code::Success => {
                tracing::info!(session, "sqlContext detected");
                self.mark_prepared(session);
            }
            Code::Error => {
                tracing::info!(session, "sqlContext not found, creating SQLContext");
                self.create_sql_context(session, handle).await?;
            }
            Code::Incomplete => {}
        }
        Ok(SparkDialect::SqlContext)
    }

    /// Define `sqlContext` in `session` and remember that it has one.
    async fn create_sql_context(
        &self,
        session: SessionId,
        handle: &RequestHandle,
    ) -> Result<(), InterpretError> {
        let created = self
            .spark
            .runner()
            .submit_and_wait(CREATE_SQL_CONTEXT, session, handle)
            .await?;
        if created.code == Code::Error {
            return Err(InterpretError::SqlContext(created.message));
        }
        tracing::debug!(session, "created SQLContext");
        self.mark_prepared(session);
        Ok(())
    }

    fn is_prepared(&self, session: SessionId) -> bool {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&session)
    }

    fn mark_prepared(&self, session: SessionId) {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session);
    }
}

#[async_trait]
impl<D> Interpreter for SqlInterpreter<D>
where
    D: SessionDirectory,
{
    async fn interpret(
        &self,
        code: &str,
        ctx: &RequestContext,
        out: &OutputStore,
    ) -> ExecutionResult {
        out.clear();
        if code.trim().is_empty() {
            out.push_finished();
            return ExecutionResult::success("");
        }

        let handle = self.spark.begin(&ctx.request_id);
        let result = self
            .scheduler
            .run(async {
                match self.run(code, &ctx.principal, &handle).await {
                    Ok(result) => result,
                    Err(e) => self.spark.failure(&ctx.principal, e).await,
                }
            })
            .await;
        out.push_finished();
        result
    }

    async fn cancel(&self, request_id: &str) {
        self.spark.cancel(request_id).await;
    }

    async fn close(&self) {
        self.spark.close().await;
    }
}
