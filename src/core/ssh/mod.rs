//! SSH session collaborator.
//!
//! The engine only ever talks to a [Session] behind a [Connector]; the
//! production implementation shells out to the system `ssh` binary
//! ([session::SshSession]). Tests substitute an in-memory fake.

pub mod session;

use std::time::Duration;

use crate::error::Result;
use crate::server::Server;

pub use session::{SshConnector, SshSession};

/// Outcome of one remote command or script execution. Immutable.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Combined stdout/stderr of the remote command.
    pub output: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn successful(&self) -> bool {
        self.exit_code == 0
    }
}

/// One open session against a target server, bounded by a per-job timeout.
///
/// Every job attempt opens its own session and closes it before returning;
/// there is no pooling or reuse across attempts.
pub trait Session: Send {
    /// Run a single command.
    fn exec(&self, command: &str) -> Result<ExecutionResult>;

    /// Run a multi-line script, optionally streaming output chunks as they
    /// arrive. The chunk callback is a no-op by default at call sites.
    fn execute_script(
        &self,
        script: &str,
        on_chunk: Option<&dyn Fn(&str)>,
    ) -> Result<ExecutionResult>;

    /// Fetch a remote file's content, or None if it does not exist.
    fn get_file_content(&self, path: &str) -> Result<Option<String>>;

    /// Adjust the per-command timeout for subsequent calls.
    fn set_timeout(&mut self, secs: u64);

    /// Release the session. Safe to call more than once.
    fn disconnect(&mut self);
}

/// Opens sessions. Impersonation (`run_as`) is an explicit field of every
/// connect request rather than an optional method consulted lazily.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        server: &Server,
        run_as: Option<&str>,
        timeout: Duration,
    ) -> Result<Box<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_iff_exit_zero() {
        let ok = ExecutionResult {
            output: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
        };
        let bad = ExecutionResult {
            output: String::new(),
            exit_code: 1,
            duration: Duration::ZERO,
        };
        assert!(ok.successful());
        assert!(!bad.successful());
    }
}
