//! Shell script generators for each pipeline step.
//!
//! The engine treats these as opaque string producers; each generator is a
//! pure function of the site snapshot. Generation failures signal a
//! configuration bug and are never retried.

use crate::error::{Error, Result};
use crate::pipeline::StepKind;
use crate::site::SiteSnapshot;
use crate::utils::shell::quote_arg;

pub fn render(kind: StepKind, site: &SiteSnapshot) -> Result<String> {
    match kind {
        StepKind::CreateConfigDirectory => Ok(create_config_directory(site)),
        StepKind::CreateServerBlock => Ok(create_server_block(site)),
        StepKind::ConfigureWwwRedirect => Ok(configure_www_redirect(site)),
        StepKind::EnableConfig => Ok(enable_config(site)),
        StepKind::CreateRuntimePool => Ok(create_runtime_pool(site)),
        StepKind::RestartServices => Ok(restart_services(site)),
        StepKind::CreateLogrotateConfig => Ok(create_logrotate_config(site)),
        StepKind::CreateDirectoryTree => Ok(create_directory_tree(site)),
        StepKind::CloneRepository => clone_repository(site),
        StepKind::CreateEnvFile => Ok(create_env_file(site)),
        StepKind::InstallDependencies => install_dependencies(site),
        StepKind::BuildAssets => build_assets(site),
        StepKind::RunMigrations => run_migrations(site),
        StepKind::Finalize => Ok(finalize(site)),
    }
}

fn create_config_directory(site: &SiteSnapshot) -> String {
    format!(
        "sudo mkdir -p /etc/nginx/sites-available /etc/nginx/sites-enabled\n\
         sudo mkdir -p /var/log/nginx/{domain}\n",
        domain = site.domain
    )
}

fn create_server_block(site: &SiteSnapshot) -> String {
    format!(
        "sudo tee /etc/nginx/sites-available/{domain} > /dev/null <<'NGINX'\n\
         server {{\n\
         \x20   listen 80;\n\
         \x20   server_name {domain};\n\
         \x20   root {web_root}/current/public;\n\
         \x20   index index.php index.html;\n\
         \x20   access_log /var/log/nginx/{domain}/access.log;\n\
         \x20   error_log /var/log/nginx/{domain}/error.log;\n\
         \x20   location ~ \\.php$ {{\n\
         \x20       fastcgi_pass unix:/run/php/php{php}-{domain}.sock;\n\
         \x20       include fastcgi_params;\n\
         \x20       fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;\n\
         \x20   }}\n\
         }}\n\
         NGINX\n",
        domain = site.domain,
        web_root = site.web_root,
        php = site.php_version
    )
}

fn configure_www_redirect(site: &SiteSnapshot) -> String {
    format!(
        "sudo tee /etc/nginx/sites-available/www.{domain} > /dev/null <<'NGINX'\n\
         server {{\n\
         \x20   listen 80;\n\
         \x20   server_name www.{domain};\n\
         \x20   return 301 $scheme://{domain}$request_uri;\n\
         }}\n\
         NGINX\n",
        domain = site.domain
    )
}

fn enable_config(site: &SiteSnapshot) -> String {
    format!(
        "sudo ln -sf /etc/nginx/sites-available/{domain} /etc/nginx/sites-enabled/{domain}\n\
         sudo ln -sf /etc/nginx/sites-available/www.{domain} /etc/nginx/sites-enabled/www.{domain}\n\
         sudo nginx -t\n",
        domain = site.domain
    )
}

fn create_runtime_pool(site: &SiteSnapshot) -> String {
    format!(
        "sudo tee /etc/php/{php}/fpm/pool.d/{domain}.conf > /dev/null <<'POOL'\n\
         [{domain}]\n\
         user = www-data\n\
         group = www-data\n\
         listen = /run/php/php{php}-{domain}.sock\n\
         listen.owner = www-data\n\
         listen.group = www-data\n\
         pm = dynamic\n\
         pm.max_children = 10\n\
         pm.start_servers = 2\n\
         pm.min_spare_servers = 1\n\
         pm.max_spare_servers = 3\n\
         POOL\n",
        php = site.php_version,
        domain = site.domain
    )
}

fn restart_services(site: &SiteSnapshot) -> String {
    format!(
        "sudo systemctl restart php{php}-fpm\n\
         sudo systemctl reload nginx\n",
        php = site.php_version
    )
}

fn create_logrotate_config(site: &SiteSnapshot) -> String {
    format!(
        "sudo tee /etc/logrotate.d/{domain} > /dev/null <<'ROTATE'\n\
         /var/log/nginx/{domain}/*.log {{\n\
         \x20   daily\n\
         \x20   rotate 14\n\
         \x20   compress\n\
         \x20   missingok\n\
         \x20   notifempty\n\
         }}\n\
         ROTATE\n",
        domain = site.domain
    )
}

fn create_directory_tree(site: &SiteSnapshot) -> String {
    format!(
        "mkdir -p {root}/releases {root}/shared\n\
         [ -e {root}/current ] || mkdir -p {root}/releases/initial\n\
         [ -e {root}/current ] || ln -s {root}/releases/initial {root}/current\n",
        root = site.web_root
    )
}

fn clone_repository(site: &SiteSnapshot) -> Result<String> {
    let repository = site.repository.as_deref().ok_or_else(|| {
        Error::Config("Clone step requires a repository to be configured".to_string())
    })?;
    let branch = site.branch.as_deref().unwrap_or("main");
    Ok(format!(
        "release={root}/releases/$(date +%s)\n\
         git clone --depth 1 --branch {branch} {repo} \"$release\"\n\
         ln -sfn \"$release\" {root}/current\n",
        root = site.web_root,
        branch = quote_arg(branch),
        repo = quote_arg(repository)
    ))
}

fn create_env_file(site: &SiteSnapshot) -> String {
    // Without a repository there is no shared framework env; drop a stub
    // so later steps can still source it.
    let body = if site.repository.is_some() {
        format!(
            "APP_ENV=production\nAPP_URL=https://{domain}\n",
            domain = site.domain
        )
    } else {
        "APP_ENV=production\n".to_string()
    };
    format!(
        "mkdir -p {root}/shared\n\
         cat > {root}/shared/.env <<'ENV'\n\
         {body}ENV\n\
         ln -sf {root}/shared/.env {root}/current/.env\n",
        root = site.web_root,
        body = body
    )
}

fn install_dependencies(site: &SiteSnapshot) -> Result<String> {
    if site.repository.is_none() {
        return Err(Error::Config(
            "Dependency install requires a cloned repository".to_string(),
        ));
    }
    Ok(format!(
        "cd {root}/current\n\
         composer install --no-dev --no-interaction --prefer-dist\n",
        root = site.web_root
    ))
}

fn build_assets(site: &SiteSnapshot) -> Result<String> {
    let build_command = site.build_command.as_deref().ok_or_else(|| {
        Error::Config("Asset build step requires a build command".to_string())
    })?;
    Ok(format!(
        "cd {root}/current\n\
         npm ci\n\
         {build}\n",
        root = site.web_root,
        build = build_command
    ))
}

fn run_migrations(site: &SiteSnapshot) -> Result<String> {
    if !site.requires_migrations() {
        return Err(Error::Config(
            "Migration step generated for a site kind without migrations".to_string(),
        ));
    }
    Ok(format!(
        "cd {root}/current\n\
         php artisan migrate --force\n",
        root = site.web_root
    ))
}

fn finalize(site: &SiteSnapshot) -> String {
    format!(
        "cd {root}/current\n\
         [ -f artisan ] && php artisan config:cache || true\n\
         chmod -R g+w {root}/shared\n\
         ls -1dt {root}/releases/* | tail -n +6 | xargs -r rm -rf\n",
        root = site.web_root
    )
}
