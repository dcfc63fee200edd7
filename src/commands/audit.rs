use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::audit::{AuditFilter, AuditRecord, AuditStatus, AuditStore};
use dockhand::utils::paths;
use dockhand::{Error, Result};

#[derive(Default, Serialize)]
pub struct AuditOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<Vec<AuditSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<AuditRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dismissed: Option<i64>,
}

/// Listing row without the full script/output payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    id: i64,
    server_id: String,
    resource_type: String,
    status: AuditStatus,
    filename: String,
    exit_code: Option<i32>,
    dismissed: bool,
}

impl From<AuditRecord> for AuditSummary {
    fn from(record: AuditRecord) -> Self {
        Self {
            id: record.id,
            server_id: record.server_id,
            resource_type: record.resource_type,
            status: record.status,
            filename: record.filename,
            exit_code: record.exit_code,
            dismissed: record.dismissed,
        }
    }
}

#[derive(Args)]
pub struct AuditArgs {
    #[command(subcommand)]
    command: AuditCommand,
}

#[derive(Subcommand)]
enum AuditCommand {
    /// List audit records
    List {
        /// Filter by server ID
        #[arg(long)]
        server: Option<String>,
        /// Filter by resource type (site, database, certificate, ...)
        #[arg(long)]
        resource_type: Option<String>,
        /// Filter by status: pending, executing, completed, failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one record's full script and output
    Show {
        /// Record ID
        id: i64,
    },
    /// Acknowledge a failed record
    Dismiss {
        /// Record ID
        id: i64,
    },
}

pub fn run(args: AuditArgs) -> Result<AuditOutput> {
    let store = AuditStore::open(&paths::audit_db()?)?;

    match args.command {
        AuditCommand::List {
            server,
            resource_type,
            status,
        } => {
            let status = match status {
                Some(s) => Some(AuditStatus::parse(&s).map_err(|_| {
                    Error::Config(format!("Unknown audit status '{}'", s))
                })?),
                None => None,
            };
            let filter = AuditFilter {
                server_id: server,
                resource_type,
                status,
            };
            let records = store.list(&filter)?;
            Ok(AuditOutput {
                command: "audit.list".into(),
                records: Some(records.into_iter().map(AuditSummary::from).collect()),
                ..Default::default()
            })
        }
        AuditCommand::Show { id } => Ok(AuditOutput {
            command: "audit.show".into(),
            record: Some(store.get(id)?),
            ..Default::default()
        }),
        AuditCommand::Dismiss { id } => {
            store.dismiss(id)?;
            Ok(AuditOutput {
                command: "audit.dismiss".into(),
                dismissed: Some(id),
                ..Default::default()
            })
        }
    }
}
