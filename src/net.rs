// CLASSIFICATION: COMMUNITY
// Filename: net.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! TCP accept loop shared by the disk and file-transfer servers.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};

/// Bind a listener on `addr` (`host:port`).
pub fn bind(addr: &str) -> Result<TcpListener> {
    let resolved = addr
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("invalid listen address {addr}: {e}")))?
        .next()
        .ok_or_else(|| Error::Config(format!("no addresses resolved for {addr}")))?;
    Ok(TcpListener::bind(resolved)?)
}

/// Stops an accept loop started with [`serve`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake: SocketAddr,
}

impl ShutdownHandle {
    /// Build a handle for a listener bound at `local`.
    pub fn new(local: SocketAddr) -> Self {
        let mut wake = local;
        if wake.ip().is_unspecified() {
            wake.set_ip(match local {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake,
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown and unblock the pending `accept`.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // The loop re-checks the flag after every accept.
        let _ = TcpStream::connect_timeout(&self.wake, Duration::from_secs(1));
    }
}

/// Connections currently being served, so shutdown can cut them off.
#[derive(Debug, Clone, Default)]
pub struct LiveConnections {
    inner: Arc<LiveInner>,
}

#[derive(Debug, Default)]
struct LiveInner {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl LiveConnections {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        match self.inner.streams.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Track a clone of `stream` until the returned guard drops.
    pub fn register(&self, stream: &TcpStream) -> std::io::Result<LiveGuard> {
        let clone = stream.try_clone()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, clone);
        Ok(LiveGuard {
            owner: self.clone(),
            id,
        })
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no connection is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down both directions of every tracked connection. Blocked reads
    /// in the owning sessions return end-of-stream.
    pub fn close_all(&self) {
        for (_, stream) in self.lock().drain() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("shutdown of live connection failed: {e}");
            }
        }
    }
}

/// Removes its connection from [`LiveConnections`] on drop.
#[derive(Debug)]
pub struct LiveGuard {
    owner: LiveConnections,
    id: u64,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.id);
    }
}

/// Accept connections until `shutdown` fires, handing each configured
/// stream to `on_conn`.
///
/// Every stream gets `TCP_NODELAY` and, if given, an idle read timeout.
pub fn serve<F>(
    listener: TcpListener,
    shutdown: &ShutdownHandle,
    idle_timeout: Option<Duration>,
    mut on_conn: F,
) where
    F: FnMut(TcpStream, SocketAddr),
{
    for incoming in listener.incoming() {
        if shutdown.is_triggered() {
            break;
        }
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                warn!("incoming connection failed: {e}");
                continue;
            }
        };
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                warn!("dropping connection without peer address: {e}");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("[{peer}] failed to disable Nagle: {e}");
        }
        if let Err(e) = stream.set_read_timeout(idle_timeout) {
            warn!("[{peer}] failed to set idle timeout: {e}");
        }
        on_conn(stream, peer);
    }
    info!("accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn shutdown_unblocks_accept() {
        let listener = bind("127.0.0.1:0").unwrap();
        let handle = ShutdownHandle::new(listener.local_addr().unwrap());
        let loop_handle = handle.clone();
        let join = thread::spawn(move || {
            let mut served = 0;
            serve(listener, &loop_handle, None, |_, _| served += 1);
            served
        });
        handle.trigger();
        assert_eq!(join.join().unwrap(), 0);
    }

    #[test]
    fn streams_reach_handler() {
        let listener = bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = ShutdownHandle::new(addr);
        let loop_handle = handle.clone();
        let join = thread::spawn(move || {
            serve(listener, &loop_handle, Some(Duration::from_secs(5)), |mut s, _| {
                assert!(s.nodelay().unwrap());
                let mut b = [0u8; 1];
                s.read_exact(&mut b).unwrap();
                s.write_all(&b).unwrap();
            });
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[0x5A]).unwrap();
        let mut echo = [0u8; 1];
        client.read_exact(&mut echo).unwrap();
        assert_eq!(echo[0], 0x5A);
        handle.trigger();
        join.join().unwrap();
    }

    #[test]
    fn close_all_unblocks_reader() {
        let listener = bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let live = LiveConnections::new();
        let _client = TcpStream::connect(addr).unwrap();
        let (mut served, _) = listener.accept().unwrap();
        let guard = live.register(&served).unwrap();
        assert_eq!(live.len(), 1);
        let reader = thread::spawn(move || {
            let mut b = [0u8; 1];
            let n = served.read(&mut b).unwrap_or(0);
            drop(guard);
            n
        });
        thread::sleep(Duration::from_millis(50));
        live.close_all();
        assert_eq!(reader.join().unwrap(), 0);
        assert!(live.is_empty());
    }

    #[test]
    fn unspecified_bind_wakes_via_loopback() {
        let handle = ShutdownHandle::new("0.0.0.0:8085".parse().unwrap());
        assert_eq!(handle.wake, "127.0.0.1:8085".parse::<SocketAddr>().unwrap());
    }
}
