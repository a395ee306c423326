// CLASSIFICATION: COMMUNITY
// Filename: server.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! TCP front end for the file-transfer protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::config::TransferServerConfig;
use crate::error::{Error, Result};
use crate::net::{self, LiveConnections, ShutdownHandle};
use crate::transfer::service::FileService;
use crate::transfer::session::TransferSession;

/// File-transfer server: one thread per connection over a shared
/// [`FileService`].
pub struct TransferServer {
    cfg: TransferServerConfig,
    service: Arc<FileService>,
    live: LiveConnections,
    shutdown: Option<ShutdownHandle>,
    acceptor: Option<JoinHandle<()>>,
}

impl TransferServer {
    /// Validate `cfg`; the served directory must already exist.
    pub fn new(cfg: TransferServerConfig) -> Result<Self> {
        cfg.validate()?;
        let service = Arc::new(FileService::new(
            cfg.files_dir.clone(),
            cfg.cache_capacity,
            cfg.cache_ttl(),
        ));
        Ok(Self {
            cfg,
            service,
            live: LiveConnections::new(),
            shutdown: None,
            acceptor: None,
        })
    }

    /// Chunk service shared by every session.
    pub fn service(&self) -> Arc<FileService> {
        Arc::clone(&self.service)
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
            return Err(Error::Config("transfer server already started".into()));
        }
        let listener = net::bind(&self.cfg.bind_addr())?;
        let local = listener.local_addr()?;
        let shutdown = ShutdownHandle::new(local);

        info!("file transfer server listening on {local}");
        info!("serving files from {}", self.cfg.files_dir.display());
        info!(
            "handle cache: {} entries, ttl {}s",
            self.cfg.cache_capacity, self.cfg.cache_ttl_secs
        );

        let service = Arc::clone(&self.service);
        let live = self.live.clone();
        let loop_shutdown = shutdown.clone();
        let idle = self.cfg.idle_timeout();
        let acceptor = thread::Builder::new()
            .name("transfer-accept".into())
            .spawn(move || {
                net::serve(listener, &loop_shutdown, idle, |stream, peer| {
                    let guard = match live.register(&stream) {
                        Ok(guard) => guard,
                        Err(e) => {
                            warn!("[{peer}] cannot track connection, dropping: {e}");
                            return;
                        }
                    };
                    let service = Arc::clone(&service);
                    let spawned = thread::Builder::new()
                        .name(format!("transfer-{peer}"))
                        .spawn(move || {
                            let _guard = guard;
                            info!("client connected: {peer}");
                            let mut session = TransferSession::new(stream, service, peer.to_string());
                            if let Err(e) = session.run() {
                                error!("error handling client {peer}: {e}");
                            }
                            info!("connection closed: {peer}");
                        });
                    if let Err(e) = spawned {
                        warn!("failed to spawn session thread for {peer}: {e}");
                    }
                });
            })?;

        self.shutdown = Some(shutdown);
        self.acceptor = Some(acceptor);
        Ok(local)
    }

    /// Block until the accept loop exits.
    pub fn wait(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("transfer accept thread panicked");
            }
        }
    }

    /// Stop accepting, cut off live sessions and close every cached handle.
    pub fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        shutdown.trigger();
        self.wait();
        self.live.close_all();
        self.service.shutdown();
        info!("file transfer server stopped");
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        self.stop();
    }
}
