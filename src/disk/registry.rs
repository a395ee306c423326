// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Client registry mapping client identifiers to their drive sets.
//!
//! A client's directory and images are provisioned from the template
//! directory on first contact. The registry lock only guards the map of
//! per-client slots; provisioning runs under the slot's own lock, so
//! concurrent first handshakes for one identifier create exactly one set
//! while lookups for other clients proceed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use log::{error, info, warn};
use remotefs_wire::{DISK_NAMES, DISK_SIZE, MAX_DRIVES};

use crate::disk::store::SectorStore;
use crate::error::{Error, Result};

/// The stores of one client, indexed by drive slot.
pub type DriveSet = Arc<[Arc<SectorStore>; MAX_DRIVES]>;

struct ClientSlot {
    dir: PathBuf,
    provisioning: Mutex<()>,
    drives: OnceLock<DriveSet>,
}

impl ClientSlot {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            provisioning: Mutex::new(()),
            drives: OnceLock::new(),
        }
    }
}

/// Registry of provisioned clients.
pub struct ClientRegistry {
    template_dir: PathBuf,
    clients_dir: PathBuf,
    flush_interval: Duration,
    clients: Mutex<HashMap<String, Arc<ClientSlot>>>,
}

/// Turn a client identifier into a single safe path segment.
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`, so `.`, `:` and path
/// separators can never escape the clients directory.
pub fn sanitize_client_id(client_id: &str) -> String {
    client_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new(
        template_dir: impl Into<PathBuf>,
        clients_dir: impl Into<PathBuf>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            template_dir: template_dir.into(),
            clients_dir: clients_dir.into(),
            flush_interval,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ClientSlot>>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Return the drives for `client_id`, provisioning them on first use.
    pub fn get_or_create_drives(&self, client_id: &str) -> Result<DriveSet> {
        let slot = self.slot(&sanitize_client_id(client_id));
        if let Some(drives) = slot.drives.get() {
            return Ok(Arc::clone(drives));
        }
        let _provisioning = match slot.provisioning.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(drives) = slot.drives.get() {
            return Ok(Arc::clone(drives));
        }
        self.provision_dir(client_id, &slot.dir)?;
        let drives = self.open_drives(&slot.dir)?;
        Ok(Arc::clone(slot.drives.get_or_init(|| drives)))
    }

    fn slot(&self, safe_id: &str) -> Arc<ClientSlot> {
        let mut clients = self.lock();
        let slot = clients
            .entry(safe_id.to_string())
            .or_insert_with(|| Arc::new(ClientSlot::new(self.clients_dir.join(safe_id))));
        Arc::clone(slot)
    }

    fn drive_sets(&self) -> Vec<DriveSet> {
        self.lock()
            .values()
            .filter_map(|slot| slot.drives.get().cloned())
            .collect()
    }

    /// Directory holding `client_id`'s images, if the client is provisioned.
    pub fn client_dir(&self, client_id: &str) -> Option<PathBuf> {
        self.lock()
            .get(&sanitize_client_id(client_id))
            .filter(|slot| slot.drives.get().is_some())
            .map(|slot| slot.dir.clone())
    }

    /// Number of clients with open drive sets.
    pub fn client_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.drives.get().is_some())
            .count()
    }

    fn provision_dir(&self, client_id: &str, dir: &Path) -> Result<()> {
        if !dir.exists() {
            info!("creating disk folder for new client: {client_id}");
        }
        fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))?;
        for name in DISK_NAMES {
            let dst = dir.join(name);
            if dst.exists() {
                continue;
            }
            let src = self.template_dir.join(name);
            if src.is_file() {
                info!("  copying {name}...");
                fs::copy(&src, &dst).map_err(|e| Error::storage(&dst, e))?;
            } else {
                warn!("  template {name} not found, creating empty disk");
                fs::write(&dst, vec![0u8; DISK_SIZE]).map_err(|e| Error::storage(&dst, e))?;
            }
        }
        Ok(())
    }

    fn open_drives(&self, dir: &Path) -> Result<DriveSet> {
        let [a, b, c, d] = DISK_NAMES;
        let open = |name: &str| -> Result<Arc<SectorStore>> {
            Ok(Arc::new(SectorStore::open(dir.join(name), self.flush_interval)?))
        };
        Ok(Arc::new([open(a)?, open(b)?, open(c)?, open(d)?]))
    }

    /// Issue any due deferred flushes. Returns how many stores flushed.
    pub fn flush_due(&self) -> usize {
        self.drive_sets()
            .iter()
            .flat_map(|drives| drives.iter())
            .filter(|store| store.flush_if_due())
            .count()
    }

    /// Flush every dirty store synchronously, keeping the mappings open.
    pub fn flush_all(&self) -> Result<()> {
        for drives in self.drive_sets() {
            for store in drives.iter().filter(|store| store.is_dirty()) {
                store.flush()?;
            }
        }
        Ok(())
    }

    /// Flush every store synchronously and release all mappings.
    pub fn shutdown(&self) {
        let slots: Vec<(String, Arc<ClientSlot>)> = self.lock().drain().collect();
        for (client, slot) in slots {
            let Some(drives) = slot.drives.get() else {
                continue;
            };
            for store in drives.iter() {
                if let Err(e) = store.close() {
                    error!("failed to flush {client} image: {e}");
                }
            }
        }
        info!("disk registry flushed and released");
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("template_dir", &self.template_dir)
            .field("clients_dir", &self.clients_dir)
            .field("clients", &self.client_count())
            .finish()
    }
}
