use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::paths;

/// A remote machine dockhand provisions resources onto.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Server {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty()
    }

    pub fn generate_id(host: &str) -> String {
        format!("server-{}", host.replace('.', "-"))
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

// ============================================================================
// Registry - all known servers live in one JSON file
// ============================================================================

pub fn list() -> Result<Vec<Server>> {
    let path = paths::servers_file()?;
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let servers: Vec<Server> = serde_json::from_str(&content)?;
    Ok(servers)
}

pub fn load(id: &str) -> Result<Server> {
    list()?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| Error::ServerNotFound(id.to_string()))
}

pub fn save(server: &Server) -> Result<()> {
    if !server.is_valid() {
        return Err(Error::Config(
            "Server requires a non-empty host and user".to_string(),
        ));
    }

    let mut servers = list()?;
    match servers.iter_mut().find(|s| s.id == server.id) {
        Some(existing) => *existing = server.clone(),
        None => servers.push(server.clone()),
    }
    write_all(&servers)
}

pub fn delete(id: &str) -> Result<()> {
    let mut servers = list()?;
    let before = servers.len();
    servers.retain(|s| s.id != id);
    if servers.len() == before {
        return Err(Error::ServerNotFound(id.to_string()));
    }
    write_all(&servers)
}

fn write_all(servers: &[Server]) -> Result<()> {
    paths::ensure_config_dir()?;
    let path = paths::servers_file()?;
    let content = serde_json::to_string_pretty(servers)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_replaces_dots() {
        assert_eq!(Server::generate_id("web1.example.com"), "server-web1-example-com");
    }

    #[test]
    fn validity_requires_host_and_user() {
        let server = Server {
            id: "s1".into(),
            host: String::new(),
            user: "deploy".into(),
            port: 22,
            identity_file: None,
        };
        assert!(!server.is_valid());
    }

    #[test]
    fn local_host_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("web1.example.com"));
    }
}
