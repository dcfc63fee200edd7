use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Script generation failed for '{job}': {reason}")]
    ScriptGeneration { job: String, reason: String },

    #[error("SSH connection failed: {0}")]
    Connect(String),

    #[error("Remote script exited with code {exit_code}: {message}")]
    ScriptExecution { exit_code: i32, message: String },

    #[error("Provisioning failed after {attempts} attempt(s): {message}")]
    AttemptsExhausted { attempts: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audit store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::ServerNotFound(_) => "SERVER_NOT_FOUND",
            Error::ScriptGeneration { .. } => "SCRIPT_GENERATION_FAILED",
            Error::Connect(_) => "SSH_CONNECT_FAILED",
            Error::ScriptExecution { .. } => "REMOTE_SCRIPT_FAILED",
            Error::AttemptsExhausted { .. } => "ATTEMPTS_EXHAUSTED",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Store(_) => "AUDIT_STORE_ERROR",
            Error::Other(_) => "ERROR",
        }
    }

    /// Classify an error as a transport/connectivity problem by keyword.
    ///
    /// Transient errors are granted the full retry budget; everything else
    /// gets one attempt fewer (see `RetryPolicy::budget_for`).
    pub fn is_transient(&self) -> bool {
        let message = self.to_string().to_lowercase();
        message.contains("ssh") || message.contains("connection")
    }
}
