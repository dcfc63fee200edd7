// Public modules
pub mod audit;
pub mod error;
pub mod job;
pub mod notify;
pub mod pipeline;
pub mod resource;
pub mod script;
pub mod scripts;
pub mod server;
pub mod site;
pub mod ssh;

// Re-export common types for convenience
pub use audit::{AuditFilter, AuditRecord, AuditStatus, AuditStore};
pub use error::{Error, Result};
pub use job::{CommandJob, JobRunner, ProvisionJob, RetryPolicy};
pub use notify::Notifier;
pub use pipeline::{build_steps, Batch, StepDescriptor, StepKind};
pub use resource::{Resource, ResourceHandle, ResourceKind, ResourceStatus};
pub use server::Server;
pub use site::{SiteKind, SiteSnapshot};
pub use ssh::{Connector, ExecutionResult, Session, SshConnector};
