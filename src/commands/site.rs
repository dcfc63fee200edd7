use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::audit::AuditStore;
use dockhand::job::JobRunner;
use dockhand::notify::LogNotifier;
use dockhand::pipeline::{build_steps, StepDescriptor};
use dockhand::resource::{Resource, ResourceKind, ResourceStatus};
use dockhand::site::{install_batch, SiteKind, SiteSnapshot};
use dockhand::ssh::SshConnector;
use dockhand::utils::paths;
use dockhand::{server, Error, Result};

#[derive(Serialize)]
pub struct SiteOutput {
    command: String,
    domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ResourceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<Vec<StepDescriptor>>,
}

#[derive(Args)]
pub struct SiteArgs {
    #[command(subcommand)]
    command: SiteCommand,
}

#[derive(Args)]
struct SiteSpec {
    /// Site domain, e.g. shop.example.com
    domain: String,
    /// Target server ID
    #[arg(long)]
    server: String,
    /// PHP version (default: 8.3)
    #[arg(long, default_value = "8.3")]
    php: String,
    /// Site kind: php, laravel, wordpress, static
    #[arg(long, default_value = "php")]
    kind: String,
    /// Git repository to deploy from
    #[arg(long)]
    repository: Option<String>,
    /// Branch to deploy (default: main)
    #[arg(long)]
    branch: Option<String>,
    /// Frontend asset build command
    #[arg(long)]
    build_command: Option<String>,
}

#[derive(Subcommand)]
enum SiteCommand {
    /// Show the pipeline steps an install would run, without executing
    Plan(SiteSpec),
    /// Install a site on a server
    Install(SiteSpec),
}

fn parse_kind(kind: &str) -> Result<SiteKind> {
    match kind {
        "php" => Ok(SiteKind::Php),
        "laravel" => Ok(SiteKind::Laravel),
        "wordpress" => Ok(SiteKind::Wordpress),
        "static" => Ok(SiteKind::Static),
        other => Err(Error::Config(format!("Unknown site kind '{}'", other))),
    }
}

fn snapshot(spec: &SiteSpec, web_user: &str) -> Result<SiteSnapshot> {
    Ok(SiteSnapshot {
        domain: spec.domain.clone(),
        php_version: spec.php.clone(),
        kind: parse_kind(&spec.kind)?,
        repository: spec.repository.clone(),
        branch: spec.branch.clone(),
        build_command: spec.build_command.clone(),
        web_root: format!("/home/{}/{}", web_user, spec.domain),
    })
}

pub fn run(args: SiteArgs) -> Result<SiteOutput> {
    match args.command {
        SiteCommand::Plan(spec) => {
            let target = server::load(&spec.server)?;
            let site = snapshot(&spec, &target.user)?;
            Ok(SiteOutput {
                command: "site.plan".into(),
                domain: site.domain.clone(),
                status: None,
                steps: Some(build_steps(&site)),
            })
        }
        SiteCommand::Install(spec) => {
            let target = server::load(&spec.server)?;
            let site = snapshot(&spec, &target.user)?;

            let store = Arc::new(AuditStore::open(&paths::audit_db()?)?);
            let runner = JobRunner::new(Arc::new(SshConnector), store);

            let resource = Resource::new(next_resource_id(), &target.id, ResourceKind::Site)
                .into_handle();
            let batch = install_batch(&target, &site, Arc::clone(&resource), Arc::new(LogNotifier));
            let outcome = batch.run(&runner);

            let status = resource.lock().unwrap().status;
            outcome?;

            Ok(SiteOutput {
                command: "site.install".into(),
                domain: site.domain.clone(),
                status: Some(status),
                steps: None,
            })
        }
    }
}

// Resource rows are owned by the request-handling layer in a full
// deployment; the CLI just needs a locally unique id.
fn next_resource_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
