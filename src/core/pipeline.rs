//! Pipeline builder and batch runner.
//!
//! `build_steps` is a pure function from a site snapshot to the ordered
//! step list; the order is a construction invariant, not a runtime check.
//! A `Batch` dispatches the steps strictly sequentially, because each
//! step's script assumes the filesystem state left by the previous one.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::job::{JobRunner, ProvisionJob};
use crate::notify::Notifier;
use crate::resource::{ResourceHandle, ResourceStatus};
use crate::site::SiteSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateConfigDirectory,
    CreateServerBlock,
    ConfigureWwwRedirect,
    EnableConfig,
    CreateRuntimePool,
    RestartServices,
    CreateLogrotateConfig,
    CreateDirectoryTree,
    CloneRepository,
    CreateEnvFile,
    InstallDependencies,
    BuildAssets,
    RunMigrations,
    Finalize,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::CreateConfigDirectory => "create_config_directory",
            StepKind::CreateServerBlock => "create_server_block",
            StepKind::ConfigureWwwRedirect => "configure_www_redirect",
            StepKind::EnableConfig => "enable_config",
            StepKind::CreateRuntimePool => "create_runtime_pool",
            StepKind::RestartServices => "restart_services",
            StepKind::CreateLogrotateConfig => "create_logrotate_config",
            StepKind::CreateDirectoryTree => "create_directory_tree",
            StepKind::CloneRepository => "clone_repository",
            StepKind::CreateEnvFile => "create_env_file",
            StepKind::InstallDependencies => "install_dependencies",
            StepKind::BuildAssets => "build_assets",
            StepKind::RunMigrations => "run_migrations",
            StepKind::Finalize => "finalize",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepKind::CreateConfigDirectory => "Create config directory",
            StepKind::CreateServerBlock => "Create server-block config",
            StepKind::ConfigureWwwRedirect => "Configure www redirect",
            StepKind::EnableConfig => "Enable the config",
            StepKind::CreateRuntimePool => "Create isolated runtime pool",
            StepKind::RestartServices => "Restart dependent services",
            StepKind::CreateLogrotateConfig => "Create log-rotation config",
            StepKind::CreateDirectoryTree => "Create directory tree",
            StepKind::CloneRepository => "Clone source repository",
            StepKind::CreateEnvFile => "Create environment file",
            StepKind::InstallDependencies => "Install dependencies",
            StepKind::BuildAssets => "Build frontend assets",
            StepKind::RunMigrations => "Run database migrations",
            StepKind::Finalize => "Finalize release",
        }
    }
}

/// A step identity paired with the parameters its script needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

impl StepDescriptor {
    fn new(kind: StepKind) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            params: HashMap::new(),
        }
    }

    fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// Build the ordered step list for installing a site.
///
/// Fixed backbone with conditional insertions. The relative order
/// Clone -> CreateEnv -> InstallDependencies -> BuildAssets ->
/// RunMigrations -> Finalize is a hard invariant.
pub fn build_steps(site: &SiteSnapshot) -> Vec<StepDescriptor> {
    let mut steps = vec![
        StepDescriptor::new(StepKind::CreateConfigDirectory),
        StepDescriptor::new(StepKind::CreateServerBlock),
        StepDescriptor::new(StepKind::ConfigureWwwRedirect),
        StepDescriptor::new(StepKind::EnableConfig),
        StepDescriptor::new(StepKind::CreateRuntimePool)
            .with_param("phpVersion", &site.php_version),
        StepDescriptor::new(StepKind::RestartServices),
        StepDescriptor::new(StepKind::CreateLogrotateConfig),
        StepDescriptor::new(StepKind::CreateDirectoryTree),
    ];

    if let Some(repository) = &site.repository {
        steps.push(
            StepDescriptor::new(StepKind::CloneRepository)
                .with_param("repository", repository)
                .with_param("branch", site.branch.as_deref().unwrap_or("main")),
        );
    }

    // Always present; the env script adapts when there is no repository.
    steps.push(StepDescriptor::new(StepKind::CreateEnvFile));

    if site.repository.is_some() {
        steps.push(StepDescriptor::new(StepKind::InstallDependencies));

        if let Some(build_command) = &site.build_command {
            steps.push(
                StepDescriptor::new(StepKind::BuildAssets)
                    .with_param("buildCommand", build_command),
            );
        }

        if site.requires_migrations() {
            steps.push(StepDescriptor::new(StepKind::RunMigrations));
        }
    }

    steps.push(StepDescriptor::new(StepKind::Finalize));
    steps
}

/// The set of steps generated for one provisioning request, dispatched as a
/// single unit of work. Created per invocation, discarded once resolved.
pub struct Batch {
    pub id: Uuid,
    resource: ResourceHandle,
    /// Step kinds paired with their jobs at construction, so a length
    /// mismatch between the two is unrepresentable mid-dispatch.
    work: Vec<(StepKind, Box<dyn ProvisionJob>)>,
    notifier: Arc<dyn Notifier>,
    /// Observability tags; consumed by tracing only, never by control flow.
    metadata: HashMap<String, String>,
}

impl Batch {
    pub fn new(
        resource: ResourceHandle,
        steps: Vec<StepKind>,
        jobs: Vec<Box<dyn ProvisionJob>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource,
            work: steps.into_iter().zip(jobs).collect(),
            notifier,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.work.iter().map(|(step, _)| *step).collect()
    }

    /// Dispatch all steps in order, halting on the first final failure.
    ///
    /// On start the resource moves to Installing with the first step
    /// marked; subsequent transitions happen inside the jobs'
    /// success/failure hooks. If a step errors without its failure hook
    /// firing (a script generation bug), the batch still resolves the
    /// resource to Failed before propagating: a batch never returns with
    /// the resource in a non-terminal status.
    pub fn run(self, runner: &JobRunner) -> Result<()> {
        for (key, value) in &self.metadata {
            log_status!("batch", "{} {}={}", self.id, key, value);
        }

        {
            let mut resource = self.resource.lock().unwrap();
            resource.set_status(ResourceStatus::Installing);
            resource.current_step = self.work.first().map(|(step, _)| step.as_str().to_string());
        }
        self.notifier
            .status_updated(&self.resource.lock().unwrap().clone());

        let total = self.work.len();
        for (index, (step, job)) in self.work.iter().enumerate() {
            log_status!(
                "batch",
                "{} step {}/{}: {}",
                self.id,
                index + 1,
                total,
                step.as_str()
            );
            if let Err(err) = runner.run(job.as_ref()) {
                self.resolve_failed();
                return Err(err);
            }
        }

        Ok(())
    }

    fn resolve_failed(&self) {
        let mut resource = self.resource.lock().unwrap();
        if resource.status.is_terminal() {
            return;
        }
        resource.set_status(ResourceStatus::Failed);
        resource.current_step = None;
        let snapshot = resource.clone();
        drop(resource);
        self.notifier.status_updated(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteKind;

    fn bare_site() -> SiteSnapshot {
        SiteSnapshot {
            domain: "example.com".into(),
            php_version: "8.3".into(),
            kind: SiteKind::Php,
            repository: None,
            branch: None,
            build_command: None,
            web_root: "/home/deploy/example.com".into(),
        }
    }

    #[test]
    fn backbone_is_always_present_and_finalize_is_last() {
        let steps = build_steps(&bare_site());
        let kinds: Vec<StepKind> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::CreateConfigDirectory,
                StepKind::CreateServerBlock,
                StepKind::ConfigureWwwRedirect,
                StepKind::EnableConfig,
                StepKind::CreateRuntimePool,
                StepKind::RestartServices,
                StepKind::CreateLogrotateConfig,
                StepKind::CreateDirectoryTree,
                StepKind::CreateEnvFile,
                StepKind::Finalize,
            ]
        );
    }

    #[test]
    fn batch_pairs_steps_with_jobs_and_drops_the_excess() {
        use crate::notify::LogNotifier;
        use crate::resource::{Resource, ResourceKind};
        use crate::server::Server;
        use crate::ssh::ExecutionResult;

        struct NoopJob {
            server: Server,
        }

        impl ProvisionJob for NoopJob {
            fn resource_type(&self) -> &str {
                "site"
            }
            fn resource_id(&self) -> Option<i64> {
                None
            }
            fn target_server(&self) -> &Server {
                &self.server
            }
            fn generate_script(&self) -> Result<String> {
                Ok("true".into())
            }
            fn on_success(&self, _result: &ExecutionResult) {}
            fn on_failure(&self, _error: &crate::error::Error) {}
        }

        let server = Server {
            id: "web1".into(),
            host: "web1.example.com".into(),
            user: "deploy".into(),
            port: 22,
            identity_file: None,
        };
        let resource = Resource::new(1, "web1", ResourceKind::Site).into_handle();
        let batch = Batch::new(
            resource,
            vec![StepKind::CreateConfigDirectory, StepKind::Finalize],
            vec![Box::new(NoopJob { server })],
            Arc::new(LogNotifier),
        );
        // Only the paired prefix survives; no out-of-bounds dispatch later.
        assert_eq!(batch.step_kinds(), vec![StepKind::CreateConfigDirectory]);
    }

    #[test]
    fn repository_steps_carry_params() {
        let mut site = bare_site();
        site.repository = Some("git@host:acme/shop.git".into());
        site.branch = Some("production".into());
        let steps = build_steps(&site);
        let clone = steps
            .iter()
            .find(|s| s.kind == StepKind::CloneRepository)
            .unwrap();
        assert_eq!(clone.params["repository"], "git@host:acme/shop.git");
        assert_eq!(clone.params["branch"], "production");
    }
}
