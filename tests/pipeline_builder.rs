use dockhand::pipeline::{build_steps, StepKind};
use dockhand::site::{SiteKind, SiteSnapshot};

fn site(repository: Option<&str>, build_command: Option<&str>, kind: SiteKind) -> SiteSnapshot {
    SiteSnapshot {
        domain: "app.example.com".into(),
        php_version: "8.3".into(),
        kind,
        repository: repository.map(str::to_string),
        branch: None,
        build_command: build_command.map(str::to_string),
        web_root: "/home/deploy/app.example.com".into(),
    }
}

fn kinds(site: &SiteSnapshot) -> Vec<StepKind> {
    build_steps(site).iter().map(|s| s.kind).collect()
}

#[test]
fn no_repository_yields_the_ten_step_backbone() {
    let steps = kinds(&site(None, None, SiteKind::Php));
    assert_eq!(
        steps,
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
    assert_eq!(steps.len(), 10);
}

#[test]
fn repository_without_build_or_migrations() {
    let steps = kinds(&site(Some("git@host/repo.git"), None, SiteKind::Php));
    assert!(steps.contains(&StepKind::CloneRepository));
    assert!(steps.contains(&StepKind::CreateEnvFile));
    assert!(steps.contains(&StepKind::InstallDependencies));
    assert!(!steps.contains(&StepKind::BuildAssets));
    assert!(!steps.contains(&StepKind::RunMigrations));
    assert_eq!(*steps.last().unwrap(), StepKind::Finalize);
}

#[test]
fn full_site_keeps_the_fixed_relative_order() {
    let steps = kinds(&site(
        Some("git@host/repo.git"),
        Some("npm run build"),
        SiteKind::Laravel,
    ));

    let position = |kind: StepKind| steps.iter().position(|&s| s == kind).unwrap();

    let clone = position(StepKind::CloneRepository);
    let env = position(StepKind::CreateEnvFile);
    let deps = position(StepKind::InstallDependencies);
    let assets = position(StepKind::BuildAssets);
    let migrations = position(StepKind::RunMigrations);
    let finalize = position(StepKind::Finalize);

    assert!(clone < env);
    assert!(env < deps);
    assert!(deps < assets);
    assert!(assets < migrations);
    assert!(migrations < finalize);
    assert_eq!(finalize, steps.len() - 1);
}

#[test]
fn build_command_without_repository_is_ignored() {
    let steps = kinds(&site(None, Some("npm run build"), SiteKind::Laravel));
    assert!(!steps.contains(&StepKind::BuildAssets));
    assert!(!steps.contains(&StepKind::RunMigrations));
}

#[test]
fn builder_is_pure() {
    let snapshot = site(Some("git@host/repo.git"), Some("npm run build"), SiteKind::Laravel);
    let first = kinds(&snapshot);
    let second = kinds(&snapshot);
    assert_eq!(first, second);
}
