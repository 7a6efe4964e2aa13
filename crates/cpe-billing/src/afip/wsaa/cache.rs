use std::path::{Path, PathBuf};

use super::ticket::parse_ticket;
use super::{AccessTicket, AfipService, WsaaError};

/// On-disk cache of access tickets, one `ta_<service>.xml` file per service.
#[derive(Debug, Clone)]
pub struct TicketStore {
    dir: PathBuf,
}

impl TicketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, service: AfipService) -> PathBuf {
        self.dir.join(format!("ta_{}.xml", service.as_str()))
    }

    /// Cached ticket for `service`. Missing, unreadable or corrupt files count as absent.
    pub async fn load(&self, service: AfipService) -> Option<AccessTicket> {
        let path = self.path_for(service);
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match parse_ticket(service, &raw) {
            Ok(ticket) => Some(ticket),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cached ticket");
                None
            }
        }
    }

    pub async fn save(&self, ticket: &AccessTicket) -> Result<PathBuf, WsaaError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| WsaaError::Cache(format!("{}: {err}", self.dir.display())))?;
        let path = self.path_for(ticket.service);
        tokio::fs::write(&path, ticket.raw.as_bytes())
            .await
            .map_err(|err| WsaaError::Cache(format!("{}: {err}", path.display())))?;
        Ok(path)
    }
}
