//! Notification/event bus collaborator.
//!
//! The engine emits step-changed and status-updated signals; delivery is
//! someone else's problem. The default implementation just logs.

use crate::pipeline::StepKind;
use crate::resource::Resource;

pub trait Notifier: Send + Sync {
    /// Emitted after each successful pipeline step.
    fn step_changed(&self, resource: &Resource, step: Option<StepKind>);

    /// Emitted after terminal outcomes and on batch start.
    fn status_updated(&self, resource: &Resource);
}

/// Logs signals to stderr via `log_status!`.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn step_changed(&self, resource: &Resource, step: Option<StepKind>) {
        match step {
            Some(step) => log_status!(
                "notify",
                "{} #{} now at step '{}'",
                resource.kind.as_str(),
                resource.id,
                step.as_str()
            ),
            None => log_status!(
                "notify",
                "{} #{} finished all steps",
                resource.kind.as_str(),
                resource.id
            ),
        }
    }

    fn status_updated(&self, resource: &Resource) {
        log_status!(
            "notify",
            "{} #{} status: {}",
            resource.kind.as_str(),
            resource.id,
            resource.status.as_str()
        );
    }
}
