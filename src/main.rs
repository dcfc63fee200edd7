use clap::{Parser, Subcommand};
use serde::Serialize;

use dockhand::Result;

mod commands;

use commands::{audit, server, site};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(version = VERSION)]
#[command(about = "Provision web application stacks on remote servers over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage SSH server configurations
    #[command(visible_alias = "servers")]
    Server(server::ServerArgs),
    /// Provision and manage sites
    Site(site::SiteArgs),
    /// Inspect the provisioning audit trail
    Audit(audit::AuditArgs),
}

fn to_value<T: Serialize>(output: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(output)?)
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server(args) => server::run(args).and_then(to_value),
        Commands::Site(args) => site::run(args).and_then(to_value),
        Commands::Audit(args) => audit::run(args).and_then(to_value),
    };

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        }
        Err(err) => {
            let body = serde_json::json!({
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                }
            });
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            std::process::exit(1);
        }
    }
}
