use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::server::{self, Server};
use dockhand::Result;

#[derive(Default, Serialize)]
pub struct ServerOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<Server>,
    #[serde(skip_serializing_if = "Option::is_none")]
    servers: Option<Vec<Server>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<String>,
}

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    command: ServerCommand,
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Register a new SSH server
    Create {
        /// Server ID (generated from host if omitted)
        id: Option<String>,
        /// SSH host
        #[arg(long)]
        host: String,
        /// SSH username
        #[arg(long)]
        user: String,
        /// SSH port (default: 22)
        #[arg(long)]
        port: Option<u16>,
        /// Path to identity file
        #[arg(long)]
        identity_file: Option<String>,
    },
    /// Display server configuration
    Show {
        /// Server ID
        server_id: String,
    },
    /// List all registered servers
    List,
    /// Delete a server configuration
    Delete {
        /// Server ID
        server_id: String,
    },
}

pub fn run(args: ServerArgs) -> Result<ServerOutput> {
    match args.command {
        ServerCommand::Create {
            id,
            host,
            user,
            port,
            identity_file,
        } => {
            let server = Server {
                id: id.unwrap_or_else(|| Server::generate_id(&host)),
                host,
                user,
                port: port.unwrap_or(22),
                identity_file,
            };
            server::save(&server)?;
            Ok(ServerOutput {
                command: "server.create".into(),
                server_id: Some(server.id.clone()),
                server: Some(server),
                ..Default::default()
            })
        }
        ServerCommand::Show { server_id } => {
            let server = server::load(&server_id)?;
            Ok(ServerOutput {
                command: "server.show".into(),
                server_id: Some(server_id),
                server: Some(server),
                ..Default::default()
            })
        }
        ServerCommand::List => Ok(ServerOutput {
            command: "server.list".into(),
            servers: Some(server::list()?),
            ..Default::default()
        }),
        ServerCommand::Delete { server_id } => {
            server::delete(&server_id)?;
            Ok(ServerOutput {
                command: "server.delete".into(),
                deleted: Some(server_id),
                ..Default::default()
            })
        }
    }
}
