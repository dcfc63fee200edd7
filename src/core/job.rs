//! Provision job contract, retry/backoff policy, and the job runner.
//!
//! A provision job wraps script generation, SSH execution, audit record
//! lifecycle and retry policy for exactly one remote operation. The runner
//! owns the execution algorithm; jobs supply the script and the
//! resource-specific success/failure side effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::audit::{AuditStore, NewAuditRecord};
use crate::error::{Error, Result};
use crate::script::{control_dir_for, unique_script_name, wrap_script};
use crate::server::Server;
use crate::ssh::{Connector, ExecutionResult};

/// Per-job-class retry parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub backoff_secs: &'static [u64],
}

impl RetryPolicy {
    /// Default for multi-step provisioning scripts.
    pub const fn provisioning() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 3600,
            backoff_secs: &[60, 180, 600],
        }
    }

    /// Default for lightweight single-line commands.
    pub const fn command() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 120,
            backoff_secs: &[10, 30, 60],
        }
    }

    /// Explicit opt-out of retries.
    pub const fn no_retry(timeout_secs: u64) -> Self {
        Self {
            max_attempts: 1,
            timeout_secs,
            backoff_secs: &[],
        }
    }

    /// Backoff delay before the retry following attempt `attempt` (1-based).
    /// Indices past the schedule clamp to its last element.
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        if self.backoff_secs.is_empty() {
            return 0;
        }
        let idx = (attempt as usize - 1).min(self.backoff_secs.len() - 1);
        self.backoff_secs[idx]
    }

    /// Attempt budget for a given error.
    ///
    /// Transport/connectivity errors get the full configured budget;
    /// everything else gets one attempt fewer. This asymmetry is
    /// intentional and must not be changed without a product decision.
    pub fn budget_for(&self, error: &Error) -> u32 {
        if error.is_transient() {
            self.max_attempts
        } else {
            self.max_attempts.saturating_sub(1).max(1)
        }
    }
}

/// Delay before the next attempt, or None when the budget is spent.
fn next_delay(policy: &RetryPolicy, attempt: u32, error: &Error) -> Option<u64> {
    if attempt < policy.budget_for(error) {
        Some(policy.backoff_for_attempt(attempt))
    } else {
        None
    }
}

/// One remote operation: script generation + execution + audit + hooks.
///
/// `on_success` is the only place the associated resource's state advances;
/// `on_failure` performs resource-specific compensation.
pub trait ProvisionJob: Send {
    fn resource_type(&self) -> &str;
    fn resource_id(&self) -> Option<i64>;
    fn target_server(&self) -> &Server;
    fn run_as_user(&self) -> Option<&str> {
        None
    }
    fn policy(&self) -> RetryPolicy {
        RetryPolicy::provisioning()
    }
    /// Pure function from captured parameters to raw shell text. Errors here
    /// are configuration bugs, not remote failures, and are never retried.
    fn generate_script(&self) -> Result<String>;
    /// Live output callback for UI streaming. No-op by default.
    fn on_output_chunk(&self, _chunk: &str) {}
    fn on_success(&self, result: &ExecutionResult);
    fn on_failure(&self, error: &Error);
}

/// Lighter variant for single-line commands that need no audit record.
pub trait CommandJob: Send {
    fn target_server(&self) -> &Server;
    fn run_as_user(&self) -> Option<&str> {
        None
    }
    fn policy(&self) -> RetryPolicy {
        RetryPolicy::command()
    }
    fn command(&self) -> Result<String>;
    fn on_success(&self, result: &ExecutionResult);
    fn on_failure(&self, error: &Error);
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Executes provision jobs against an audit store over a connector.
pub struct JobRunner {
    connector: Arc<dyn Connector>,
    store: Arc<AuditStore>,
    sleeper: Sleeper,
}

impl JobRunner {
    pub fn new(connector: Arc<dyn Connector>, store: Arc<AuditStore>) -> Self {
        Self {
            connector,
            store,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the backoff sleep, for tests.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn store(&self) -> &AuditStore {
        &self.store
    }

    /// Run a provision job to completion or exhaustion.
    ///
    /// Creates the audit record on the first attempt, re-fetches it by id on
    /// every retry, and guarantees the record resolves to a terminal status
    /// before this call returns.
    pub fn run(&self, job: &dyn ProvisionJob) -> Result<ExecutionResult> {
        let policy = job.policy();
        let raw = job.generate_script().map_err(|e| Error::ScriptGeneration {
            job: job.resource_type().to_string(),
            reason: e.to_string(),
        })?;

        let run_as = job
            .run_as_user()
            .unwrap_or(&job.target_server().user)
            .to_string();
        let name = unique_script_name(Utc::now());
        let wrapped = wrap_script(&raw, &control_dir_for(&run_as), &name);

        let record_id = self.store.create(&NewAuditRecord {
            server_id: job.target_server().id.clone(),
            filename: format!("{}.sh", name),
            resource_type: job.resource_type().to_string(),
            resource_id: job.resource_id(),
            run_as: job.run_as_user().map(str::to_string),
            script: wrapped.clone(),
        })?;

        let mut attempt = 1;
        loop {
            match self.attempt(job, &wrapped, record_id, &policy) {
                Ok(result) => {
                    job.on_success(&result);
                    return Ok(result);
                }
                Err(err) => match next_delay(&policy, attempt, &err) {
                    Some(delay) => {
                        self.store
                            .append_output(record_id, &format!("[RETRY] {}", err))?;
                        log_status!(
                            "job",
                            "{} attempt {}/{} failed ({}), retrying in {}s",
                            job.resource_type(),
                            attempt,
                            policy.max_attempts,
                            err.code(),
                            delay
                        );
                        (self.sleeper)(Duration::from_secs(delay));
                        attempt += 1;
                    }
                    None => {
                        self.store
                            .mark_failed(record_id, &format!("[FATAL ERROR] {}", err))?;
                        let fatal = Error::AttemptsExhausted {
                            attempts: attempt,
                            message: err.to_string(),
                        };
                        job.on_failure(&fatal);
                        return Err(fatal);
                    }
                },
            }
        }
    }

    fn attempt(
        &self,
        job: &dyn ProvisionJob,
        wrapped: &str,
        record_id: i64,
        policy: &RetryPolicy,
    ) -> Result<ExecutionResult> {
        // Re-fetch instead of holding a live record across the retry
        // boundary; only the id is captured state.
        let _record = self.store.get(record_id)?;

        let mut session = self.connector.connect(
            job.target_server(),
            job.run_as_user(),
            Duration::from_secs(policy.timeout_secs),
        )?;
        // Executing only while a session is actually open; a failed connect
        // must not leave the record in flight across the backoff window.
        self.store.mark_executing(record_id)?;
        let outcome =
            session.execute_script(wrapped, Some(&|chunk: &str| job.on_output_chunk(chunk)));
        session.disconnect();
        let result = outcome?;

        self.store
            .finish(record_id, &result.output, result.exit_code, Utc::now())?;

        if result.successful() {
            Ok(result)
        } else {
            Err(Error::ScriptExecution {
                exit_code: result.exit_code,
                message: last_line(&result.output),
            })
        }
    }

    /// Run a command job: same retry shape, no audit persistence.
    pub fn run_command(&self, job: &dyn CommandJob) -> Result<ExecutionResult> {
        let policy = job.policy();
        let command = job.command().map_err(|e| Error::ScriptGeneration {
            job: "command".to_string(),
            reason: e.to_string(),
        })?;

        let mut attempt = 1;
        loop {
            let outcome = self.command_attempt(job, &command, &policy);
            match outcome {
                Ok(result) => {
                    job.on_success(&result);
                    return Ok(result);
                }
                Err(err) => match next_delay(&policy, attempt, &err) {
                    Some(delay) => {
                        log_status!(
                            "job",
                            "Command attempt {}/{} failed ({}), retrying in {}s",
                            attempt,
                            policy.max_attempts,
                            err.code(),
                            delay
                        );
                        (self.sleeper)(Duration::from_secs(delay));
                        attempt += 1;
                    }
                    None => {
                        let fatal = Error::AttemptsExhausted {
                            attempts: attempt,
                            message: err.to_string(),
                        };
                        job.on_failure(&fatal);
                        return Err(fatal);
                    }
                },
            }
        }
    }

    fn command_attempt(
        &self,
        job: &dyn CommandJob,
        command: &str,
        policy: &RetryPolicy,
    ) -> Result<ExecutionResult> {
        let mut session = self.connector.connect(
            job.target_server(),
            job.run_as_user(),
            Duration::from_secs(policy.timeout_secs),
        )?;
        let outcome = session.exec(command);
        session.disconnect();
        let result = outcome?;

        if result.successful() {
            Ok(result)
        } else {
            Err(Error::ScriptExecution {
                exit_code: result.exit_code,
                message: last_line(&result.output),
            })
        }
    }
}

fn last_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("(no output)")
        .to_string()
}
