//! Site resource model and the jobs that install one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::ProvisionJob;
use crate::notify::Notifier;
use crate::pipeline::{build_steps, Batch, StepKind};
use crate::resource::{ResourceHandle, ResourceStatus};
use crate::scripts;
use crate::server::Server;
use crate::ssh::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    Php,
    Laravel,
    Wordpress,
    Static,
}

impl SiteKind {
    /// Whether installing this kind of site runs database migrations.
    pub fn requires_migrations(&self) -> bool {
        matches!(self, SiteKind::Laravel)
    }
}

/// Everything the pipeline builder and script generators need to know about
/// a site. A plain value; taking a snapshot keeps `build_steps` total and
/// side-effect-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSnapshot {
    pub domain: String,
    pub php_version: String,
    pub kind: SiteKind,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    pub web_root: String,
}

impl SiteSnapshot {
    pub fn requires_migrations(&self) -> bool {
        self.kind.requires_migrations()
    }
}

/// One pipeline step for one site, bound to the shared resource handle.
///
/// `on_success` advances the resource's step marker (or completes the
/// install on the final step); `on_failure` marks the resource failed.
/// These hooks are the only place site status changes.
pub struct SiteStepJob {
    server: Server,
    site: SiteSnapshot,
    resource: ResourceHandle,
    notifier: Arc<dyn Notifier>,
    kind: StepKind,
    next: Option<StepKind>,
}

impl ProvisionJob for SiteStepJob {
    fn resource_type(&self) -> &str {
        "site"
    }

    fn resource_id(&self) -> Option<i64> {
        Some(self.resource.lock().unwrap().id)
    }

    fn target_server(&self) -> &Server {
        &self.server
    }

    fn run_as_user(&self) -> Option<&str> {
        Some(&self.server.user)
    }

    fn generate_script(&self) -> Result<String> {
        scripts::render(self.kind, &self.site)
    }

    fn on_success(&self, _result: &ExecutionResult) {
        let mut resource = self.resource.lock().unwrap();
        match self.next {
            Some(next) => {
                resource.current_step = Some(next.as_str().to_string());
            }
            None => {
                resource.set_status(ResourceStatus::Installed);
                resource.current_step = None;
            }
        }
        let snapshot = resource.clone();
        drop(resource);
        self.notifier.step_changed(&snapshot, self.next);
        if snapshot.status == ResourceStatus::Installed {
            self.notifier.status_updated(&snapshot);
        }
    }

    fn on_failure(&self, _error: &Error) {
        let mut resource = self.resource.lock().unwrap();
        resource.set_status(ResourceStatus::Failed);
        resource.current_step = None;
        let snapshot = resource.clone();
        drop(resource);
        self.notifier.status_updated(&snapshot);
    }
}

/// Assemble the install batch for a site: ordered steps, one job each.
pub fn install_batch(
    server: &Server,
    site: &SiteSnapshot,
    resource: ResourceHandle,
    notifier: Arc<dyn Notifier>,
) -> Batch {
    let descriptors = build_steps(site);
    let kinds: Vec<StepKind> = descriptors.iter().map(|d| d.kind).collect();

    let jobs: Vec<Box<dyn ProvisionJob>> = kinds
        .iter()
        .enumerate()
        .map(|(index, &kind)| {
            Box::new(SiteStepJob {
                server: server.clone(),
                site: site.clone(),
                resource: Arc::clone(&resource),
                notifier: Arc::clone(&notifier),
                kind,
                next: kinds.get(index + 1).copied(),
            }) as Box<dyn ProvisionJob>
        })
        .collect();

    Batch::new(resource, kinds, jobs, notifier)
        .with_metadata("domain", &site.domain)
        .with_metadata("server", &server.id)
}
