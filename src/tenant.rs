use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::compactor;
use crate::engine::{Collaborators, Engine};
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per dealership, keyed by the connection's database name.
/// Each gets its own journal file and compactor task.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    collaborators: Collaborators,
}

/// Only `[A-Za-z0-9_-]` is accepted, so a name maps to exactly one journal
/// file and can never leave the data directory.
fn validate_name(tenant: &str) -> io::Result<String> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "dealership name too long"));
    }
    let valid = !tenant.is_empty()
        && tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid dealership name {tenant:?}"),
        ));
    }
    Ok(tenant.to_string())
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self::with_collaborators(data_dir, compact_threshold, Collaborators::default())
    }

    /// Every engine created by this manager shares `collaborators`.
    pub fn with_collaborators(data_dir: PathBuf, compact_threshold: u64, collaborators: Collaborators) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            collaborators,
        }
    }

    /// The dealership's engine, created and replayed on first use.
    pub fn get_or_create(&self, tenant: &str) -> io::Result<Arc<Engine>> {
        let safe_name = validate_name(tenant)?;
        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many dealerships"));
        }

        let engine = match self.engines.entry(safe_name.clone()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let engine = Arc::new(Engine::with_collaborators(
                    wal_path,
                    Arc::new(NotifyHub::new()),
                    self.collaborators.clone(),
                )?);
                slot.insert(engine.clone());
                engine
            }
        };

        tokio::spawn(compactor::run_compactor(engine.clone(), self.compact_threshold));
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!("opened dealership {safe_name}");
        Ok(engine)
    }
}
