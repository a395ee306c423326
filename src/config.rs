// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Runtime configuration for the disk and file-transfer servers.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the defaults below. The CLI layers its flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default TCP port of the disk server.
pub const DEFAULT_DISK_PORT: u16 = 8085;
/// Default TCP port of the file-transfer server.
pub const DEFAULT_TRANSFER_PORT: u16 = 8090;

/// Configuration for the sector-addressed disk server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiskServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Directory holding the four template images.
    pub template_dir: PathBuf,
    /// Directory holding one subdirectory per client.
    pub clients_dir: PathBuf,
    /// Connection worker threads.
    pub workers: usize,
    /// Seconds a connection may stay silent before it is dropped; `0` disables.
    pub idle_timeout_secs: u64,
    /// Minimum milliseconds between flushes of a dirty image.
    pub flush_interval_ms: u64,
}

impl Default for DiskServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_DISK_PORT,
            template_dir: PathBuf::from("disks"),
            clients_dir: PathBuf::from("clients"),
            workers: 16,
            idle_timeout_secs: 300,
            flush_interval_ms: 2000,
        }
    }
}

impl DiskServerConfig {
    /// Parse a JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        parse_json(data)
    }

    /// Load a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        Ok(())
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle read timeout applied to every connection.
    pub fn idle_timeout(&self) -> Option<Duration> {
        idle_timeout(self.idle_timeout_secs)
    }

    /// Deferred flush interval for dirty images.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Configuration for the chunked file-transfer server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransferServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Read-only tree served to clients.
    pub files_dir: PathBuf,
    /// Open file handles kept in the cache.
    pub cache_capacity: usize,
    /// Seconds an unused cached handle survives.
    pub cache_ttl_secs: u64,
    /// Seconds a connection may stay silent before it is dropped; `0` disables.
    pub idle_timeout_secs: u64,
}

impl Default for TransferServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_TRANSFER_PORT,
            files_dir: PathBuf::from("files"),
            cache_capacity: 32,
            cache_ttl_secs: 60,
            idle_timeout_secs: 300,
        }
    }
}

impl TransferServerConfig {
    /// Parse a JSON document.
    pub fn from_json(data: &str) -> Result<Self> {
        parse_json(data)
    }

    /// Load a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".into()));
        }
        if !self.files_dir.is_dir() {
            return Err(Error::Config(format!(
                "files directory not found: {}",
                self.files_dir.display()
            )));
        }
        Ok(())
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle read timeout applied to every connection.
    pub fn idle_timeout(&self) -> Option<Duration> {
        idle_timeout(self.idle_timeout_secs)
    }

    /// Lifetime of an unused cached handle.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn idle_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_json<T: DeserializeOwned>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Config(e.to_string()))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let txt = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    parse_json(&txt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = DiskServerConfig::from_json("{}").unwrap();
        assert_eq!(cfg, DiskServerConfig::default());
        assert_eq!(cfg.port, 8085);
        assert_eq!(cfg.flush_interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = TransferServerConfig::from_json(r#"{"port": 9001, "cache_ttl_secs": 5}"#)
            .unwrap();
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.cache_capacity, 32);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9001");
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = DiskServerConfig::from_json("{port: }").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = DiskServerConfig {
            workers: 0,
            ..DiskServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_files_dir_rejected() {
        let cfg = TransferServerConfig {
            files_dir: PathBuf::from("/nonexistent/remotefs/files"),
            ..TransferServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_idle_timeout_disables() {
        let cfg = DiskServerConfig {
            idle_timeout_secs: 0,
            ..DiskServerConfig::default()
        };
        assert_eq!(cfg.idle_timeout(), None);
    }
}
