//! Provisionable resource kinds and their status state machines.
//!
//! Status transitions are driven exclusively by the `on_success`/`on_failure`
//! hooks of the jobs associated with a resource. The engine itself never
//! mutates a resource's status.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Site,
    Database,
    DatabaseUser,
    Certificate,
    DomainRecord,
    PhpRuntime,
    BackgroundProcess,
    ScheduledJob,
    Server,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Site => "site",
            ResourceKind::Database => "database",
            ResourceKind::DatabaseUser => "database_user",
            ResourceKind::Certificate => "certificate",
            ResourceKind::DomainRecord => "domain_record",
            ResourceKind::PhpRuntime => "php_runtime",
            ResourceKind::BackgroundProcess => "background_process",
            ResourceKind::ScheduledJob => "scheduled_job",
            ResourceKind::Server => "server",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Installing,
    Installed,
    Failed,
    Deleting,
    Renewing,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Installing => "installing",
            ResourceStatus::Installed => "installed",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Renewing => "renewing",
        }
    }

    /// A terminal status never advances again without a new operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Installed | ResourceStatus::Failed)
    }

    /// Whether `from -> to` is a legal transition for the given kind.
    ///
    /// `Renewing` only exists for certificates; a renewal returns to
    /// `Installed` on success and on failure (the prior installed state is
    /// never lost).
    pub fn can_transition(kind: ResourceKind, from: ResourceStatus, to: ResourceStatus) -> bool {
        use ResourceStatus::*;
        match (from, to) {
            (Pending, Installing) => true,
            (Installing, Installed) | (Installing, Failed) => true,
            (Installed, Deleting) => true,
            (Deleting, Failed) => true,
            // Re-running a failed operation starts the machine over.
            (Failed, Installing) => true,
            (Installed, Renewing) | (Renewing, Installed) => kind == ResourceKind::Certificate,
            _ => false,
        }
    }
}

/// A provisionable entity: identity, target server and current status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: i64,
    pub server_id: String,
    pub kind: ResourceKind,
    pub status: ResourceStatus,
    /// Name of the pipeline step currently in progress, for progress display.
    #[serde(default)]
    pub current_step: Option<String>,
}

/// Shared handle to a resource, mutated from job hooks while a batch runs.
pub type ResourceHandle = Arc<Mutex<Resource>>;

impl Resource {
    pub fn new(id: i64, server_id: &str, kind: ResourceKind) -> Self {
        Self {
            id,
            server_id: server_id.to_string(),
            kind,
            status: ResourceStatus::Pending,
            current_step: None,
        }
    }

    pub fn into_handle(self) -> ResourceHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn set_status(&mut self, status: ResourceStatus) {
        log_status!(
            "resource",
            "{} #{} {} -> {}",
            self.kind.as_str(),
            self.id,
            self.status.as_str(),
            status.as_str()
        );
        self.status = status;
    }
}
