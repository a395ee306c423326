// CLASSIFICATION: COMMUNITY
// Filename: cli.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Command line front end for the `remotefs` binary.

use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::config::{DiskServerConfig, TransferServerConfig};
use crate::disk::DiskServer;
use crate::net::ShutdownHandle;
use crate::transfer::TransferServer;

/// Remote storage servers for the Altair 8800 emulator.
#[derive(Parser, Debug)]
#[command(name = "remotefs", about = "Remote disk and file transfer servers", version)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Server to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Server selection.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve per-client floppy images over the sector protocol.
    Disk(DiskArgs),
    /// Serve a directory over the chunked transfer protocol.
    Transfer(TransferArgs),
}

/// Flags for `remotefs disk`.
#[derive(Args, Debug, Default)]
pub struct DiskArgs {
    /// JSON configuration file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind.
    #[arg(long)]
    pub port: Option<u16>,
    /// Directory holding the template disk images.
    #[arg(long)]
    pub template_dir: Option<PathBuf>,
    /// Directory holding per-client disk images.
    #[arg(long)]
    pub clients_dir: Option<PathBuf>,
    /// Connection worker threads.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Seconds before an idle connection is dropped (0 disables).
    #[arg(long)]
    pub idle_timeout: Option<u64>,
    /// Minimum milliseconds between flushes of a dirty disk image.
    #[arg(long)]
    pub flush_interval_ms: Option<u64>,
}

/// Flags for `remotefs transfer`.
#[derive(Args, Debug, Default)]
pub struct TransferArgs {
    /// JSON configuration file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind.
    #[arg(long)]
    pub port: Option<u16>,
    /// Directory to serve.
    #[arg(long)]
    pub files_dir: Option<PathBuf>,
    /// Maximum cached open files.
    #[arg(long)]
    pub cache_capacity: Option<usize>,
    /// Seconds an unused cached file stays open.
    #[arg(long)]
    pub cache_ttl: Option<u64>,
    /// Seconds before an idle connection is dropped (0 disables).
    #[arg(long)]
    pub idle_timeout: Option<u64>,
}

impl DiskArgs {
    /// Resolve the effective configuration.
    pub fn into_config(self) -> anyhow::Result<DiskServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => DiskServerConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DiskServerConfig::default(),
        };
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(dir) = self.template_dir {
            cfg.template_dir = dir;
        }
        if let Some(dir) = self.clients_dir {
            cfg.clients_dir = dir;
        }
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        if let Some(secs) = self.idle_timeout {
            cfg.idle_timeout_secs = secs;
        }
        if let Some(ms) = self.flush_interval_ms {
            cfg.flush_interval_ms = ms;
        }
        Ok(cfg)
    }
}

impl TransferArgs {
    /// Resolve the effective configuration.
    pub fn into_config(self) -> anyhow::Result<TransferServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => TransferServerConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TransferServerConfig::default(),
        };
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(dir) = self.files_dir {
            cfg.files_dir = dir;
        }
        if let Some(capacity) = self.cache_capacity {
            cfg.cache_capacity = capacity;
        }
        if let Some(secs) = self.cache_ttl {
            cfg.cache_ttl_secs = secs;
        }
        if let Some(secs) = self.idle_timeout {
            cfg.idle_timeout_secs = secs;
        }
        Ok(cfg)
    }
}

/// Trigger `handle` on the first SIGINT or SIGTERM.
pub fn stop_on_signal(handle: ShutdownHandle) -> anyhow::Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    thread::Builder::new()
        .name("signal-watch".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!("received signal {signal}, shutting down");
                handle.trigger();
            }
        })
        .context("spawning signal thread")?;
    Ok(())
}

/// Run the selected server until a shutdown signal arrives, then stop it.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Disk(args) => {
            let cfg = args.into_config()?;
            let mut server = DiskServer::new(cfg).context("configuring disk server")?;
            server.start().context("starting disk server")?;
            if let Some(handle) = server.shutdown_handle() {
                stop_on_signal(handle)?;
            }
            server.wait();
            server.stop();
        }
        Command::Transfer(args) => {
            let cfg = args.into_config()?;
            let mut server = TransferServer::new(cfg).context("configuring transfer server")?;
            server.start().context("starting transfer server")?;
            if let Some(handle) = server.shutdown_handle() {
                stop_on_signal(handle)?;
            }
            server.wait();
            server.stop();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parses_disk_flags() {
        let cli = Cli::try_parse_from([
            "remotefs",
            "--debug",
            "disk",
            "--port",
            "9000",
            "--clients-dir",
            "/tmp/c",
            "--workers",
            "4",
            "--flush-interval-ms",
            "250",
        ])
        .unwrap();
        assert!(cli.debug);
        let Command::Disk(args) = cli.command else {
            panic!("expected disk command");
        };
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.flush_interval_ms, 250);
        assert_eq!(cfg.clients_dir, PathBuf::from("/tmp/c"));
        assert_eq!(cfg.template_dir, PathBuf::from("disks"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transfer.json");
        fs::write(&path, r#"{"port": 7000, "cache_capacity": 3, "cache_ttl_secs": 9}"#).unwrap();
        let cli = Cli::try_parse_from([
            "remotefs",
            "transfer",
            "--config",
            path.to_str().unwrap(),
            "--cache-capacity",
            "5",
        ])
        .unwrap();
        let Command::Transfer(args) = cli.command else {
            panic!("expected transfer command");
        };
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.cache_capacity, 5);
        assert_eq!(cfg.cache_ttl_secs, 9);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args = DiskArgs {
            config: Some(PathBuf::from("/nonexistent/remotefs.json")),
            ..DiskArgs::default()
        };
        let err = args.into_config().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/remotefs.json"));
    }
}
