use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::engine::Engine;
use crate::limits::*;
use crate::model::Ms;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-registry engines. A registry is one municipality's books:
/// its own engine, WAL, reaper and compactor. Registry = database name from
/// the pgwire connection.
pub struct RegistryManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    claim_ttl_ms: Ms,
}

impl RegistryManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, claim_ttl_ms: Ms) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            claim_ttl_ms,
        }
    }

    /// Get or lazily create the engine for the given registry.
    pub fn get_or_create(&self, registry: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(registry) {
            return Ok(engine.value().clone());
        }
        if registry.len() > MAX_REGISTRY_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "registry name too long",
            ));
        }
        if self.engines.len() >= MAX_REGISTRIES {
            return Err(std::io::Error::other("too many registries"));
        }

        // Sanitize the name to prevent path traversal
        let safe_name: String = registry
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty registry name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify, self.claim_ttl_ms)?);

        let reaper_engine = engine.clone();
        tokio::spawn(async move {
            reaper::run_reaper(reaper_engine).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(registry.to_string(), engine.clone());
        metrics::gauge!(crate::observability::REGISTRIES_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
