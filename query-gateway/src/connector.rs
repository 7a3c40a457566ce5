//! Connection seam between the gateway and a database driver.

use async_trait::async_trait;

use common::errors::AppResult;
use common::models::{QueryInvocation, QueryOutcome};

/// Opens sessions against a database.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a dedicated connection or borrows one from a pool.
    async fn open(&self) -> AppResult<Box<dyn Session>>;

    /// Short label for logs and health output.
    fn mode(&self) -> &'static str;
}

/// One opened connection.
///
/// The gateway calls [`Session::close`] exactly once per opened session,
/// whatever the outcome of [`Session::run`].
#[async_trait]
pub trait Session: Send {
    /// Executes a single statement with its bind values.
    ///
    /// Reads yield [`QueryOutcome::Rows`], writes [`QueryOutcome::Written`].
    async fn run(&mut self, invocation: &QueryInvocation) -> AppResult<QueryOutcome>;

    /// Closes the connection or hands it back to its pool.
    async fn close(self: Box<Self>) -> AppResult<()>;
}
