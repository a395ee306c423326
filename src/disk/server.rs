// CLASSIFICATION: COMMUNITY
// Filename: server.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! TCP front end for the disk protocol.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};
use remotefs_wire::DISK_NAMES;

use crate::config::DiskServerConfig;
use crate::disk::registry::ClientRegistry;
use crate::disk::session::DiskSession;
use crate::error::{Error, Result};
use crate::net::{self, LiveConnections, ShutdownHandle};
use crate::pool::WorkerPool;

/// Upper bound on how long the background flusher sleeps between passes.
const FLUSH_TICK: Duration = Duration::from_millis(250);

/// Disk server owning the client registry and its worker pool.
pub struct DiskServer {
    cfg: DiskServerConfig,
    registry: Arc<ClientRegistry>,
    live: LiveConnections,
    shutdown: Option<ShutdownHandle>,
    acceptor: Option<JoinHandle<WorkerPool>>,
    pool: Option<WorkerPool>,
    flusher: Option<JoinHandle<()>>,
}

impl DiskServer {
    /// Validate `cfg` and prepare the client directory.
    pub fn new(cfg: DiskServerConfig) -> Result<Self> {
        cfg.validate()?;
        fs::create_dir_all(&cfg.clients_dir).map_err(|e| Error::storage(&cfg.clients_dir, e))?;
        if !cfg.template_dir.is_dir() {
            warn!(
                "template directory not found: {}; new clients get blank disks",
                cfg.template_dir.display()
            );
        } else {
            let found = DISK_NAMES
                .iter()
                .filter(|name| cfg.template_dir.join(name).is_file())
                .count();
            if found == 0 {
                warn!(
                    "no disk images found in {} (expected {})",
                    cfg.template_dir.display(),
                    DISK_NAMES.join(", ")
                );
            } else {
                info!("found {found} disk image(s) in template directory");
            }
        }
        let registry = Arc::new(ClientRegistry::new(
            cfg.template_dir.clone(),
            cfg.clients_dir.clone(),
            cfg.flush_interval(),
        ));
        Ok(Self {
            cfg,
            registry,
            live: LiveConnections::new(),
            shutdown: None,
            acceptor: None,
            pool: None,
            flusher: None,
        })
    }

    /// Registry shared by every session of this server.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Handle that stops the accept loop, once started.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.shutdown.clone()
    }

    /// Connections currently being served.
    pub fn live_connections(&self) -> usize {
        self.live.len()
    }

    /// Bind and start serving in the background. Returns the bound address.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if self.acceptor.is_some() {
            return Err(Error::Config("disk server already started".into()));
        }
        let listener = net::bind(&self.cfg.bind_addr())?;
        let local = listener.local_addr()?;
        let shutdown = ShutdownHandle::new(local);
        let pool = WorkerPool::new("disk-session", self.cfg.workers)?;

        info!("remote disk server listening on {local}");
        info!("template directory: {}", self.cfg.template_dir.display());
        info!("client data directory: {}", self.cfg.clients_dir.display());

        let registry = Arc::clone(&self.registry);
        let live = self.live.clone();
        let loop_shutdown = shutdown.clone();
        let idle = self.cfg.idle_timeout();
        let acceptor = thread::Builder::new()
            .name("disk-accept".into())
            .spawn(move || {
                net::serve(listener, &loop_shutdown, idle, |stream, peer| {
                    let guard = match live.register(&stream) {
                        Ok(guard) => guard,
                        Err(e) => {
                            warn!("[{peer}] cannot track connection, dropping: {e}");
                            return;
                        }
                    };
                    let registry = Arc::clone(&registry);
                    let queued = pool.execute(move || {
                        let _guard = guard;
                        info!("client connected: {peer}");
                        let mut session = DiskSession::new(stream, registry, peer.to_string());
                        if let Err(e) = session.run() {
                            error!("error handling client {peer}: {e}");
                        }
                        info!("connection closed: {peer}");
                    });
                    if !queued {
                        warn!("worker pool closed, dropping {peer}");
                    }
                });
                pool
            })?;

        let registry = Arc::clone(&self.registry);
        let flush_shutdown = shutdown.clone();
        let tick = self.cfg.flush_interval().clamp(Duration::from_millis(10), FLUSH_TICK);
        let flusher = thread::Builder::new()
            .name("disk-flush".into())
            .spawn(move || {
                while !flush_shutdown.is_triggered() {
                    thread::sleep(tick);
                    registry.flush_due();
                }
            })?;

        self.shutdown = Some(shutdown);
        self.acceptor = Some(acceptor);
        self.flusher = Some(flusher);
        Ok(local)
    }

    /// Block until the accept loop exits.
    pub fn wait(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            match acceptor.join() {
                Ok(pool) => self.pool = Some(pool),
                Err(_) => error!("disk accept thread panicked"),
            }
        }
    }

    /// Stop accepting, end every live session, then flush and release every
    /// disk image.
    ///
    /// Sessions are joined before the images close, so no client ever reads
    /// from a released store.
    pub fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        shutdown.trigger();
        self.wait();
        self.live.close_all();
        if let Some(pool) = self.pool.take() {
            pool.join();
        }
        if let Some(flusher) = self.flusher.take() {
            if flusher.join().is_err() {
                error!("disk flush thread panicked");
            }
        }
        self.registry.shutdown();
        info!("disk server stopped");
    }
}

impl Drop for DiskServer {
    fn drop(&mut self) {
        self.stop();
    }
}
