use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::install::Install;
use crate::server::{ProcessServer, Server};
use crate::signal::ShutdownToken;

/// Exit code when the server dies on its own without a usable status.
const FALLBACK_EXIT_CODE: i32 = 42;

/// Runs a single supervised ZooKeeper instance in the foreground.
#[derive(Debug, Parser)]
#[command(
    name = "zk-shepherd",
    version,
    about = "Runs a supervised ZooKeeper instance in the foreground"
)]
pub struct Cli {
    /// Directory the instance keeps its state under
    #[arg(short = 'd', long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Client port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Load settings from a YAML file before applying the flags
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Whether snapshots fsync before being acknowledged
    #[arg(long, value_name = "BOOL")]
    force_sync: Option<bool>,

    /// Skip ACL checks
    #[arg(long)]
    skip_acl: bool,

    /// Transactions between snapshots
    #[arg(long, value_name = "N")]
    snap_count: Option<u32>,

    /// Extra JVM flags, space separated
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    jvm_flags: Option<String>,
}

impl Cli {
    /// Builds the config, launches the server and blocks until either the
    /// child exits or a termination signal asks us to stop it. The return
    /// value is the process exit code to report.
    pub fn run(self) -> Result<i32> {
        let config = self.build_config()?;
        let install = Arc::new(Install::from_env()?);
        let server = ProcessServer::new(config, install);

        let token = ShutdownToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || handler_token.request())?;

        // The trap handler above only flips the token; this thread does
        // the actual teardown.
        let waiter = {
            let server = server.clone();
            let token = token.clone();
            thread::spawn(move || {
                token.wait();
                server.shutdown();
            })
        };

        if let Err(e) = server.run() {
            // Release the waiter before reporting the failed launch.
            token.request();
            let _ = waiter.join();
            return Err(e);
        }
        info!(
            "Serving on port {} from {}; send SIGINT or SIGTERM to stop",
            server.config().client_port,
            server.config().base_dir.display()
        );

        let status = server.wait();
        let interrupted = token.requested();

        // Release the waiter if the child went away on its own.
        token.request();
        let _ = waiter.join();

        if interrupted {
            info!("Shutdown complete");
            return Ok(0);
        }

        match status {
            Some(status) => {
                warn!("Server exited on its own: {}", status);
                Ok(status.code().unwrap_or(FALLBACK_EXIT_CODE))
            }
            None => {
                warn!("Server exited on its own with no recorded status");
                Ok(FALLBACK_EXIT_CODE)
            }
        }
    }

    /// YAML config first (when given), then flags on top.
    fn build_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load_from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(dir) = &self.base_dir {
            config.base_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.client_port = port;
        }
        if let Some(force_sync) = self.force_sync {
            config.force_sync = Some(force_sync);
        }
        if self.skip_acl {
            config.skip_acl = Some(true);
        }
        if let Some(snap_count) = self.snap_count {
            config.snap_count = Some(snap_count);
        }
        if let Some(flags) = &self.jvm_flags {
            config
                .jvm_flags
                .extend(flags.split_whitespace().map(|s| s.to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "zk-shepherd",
            "-d",
            "/tmp/zk-cli-test",
            "-p",
            "2281",
            "--skip-acl",
            "--force-sync",
            "false",
            "--snap-count",
            "5000",
        ]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/tmp/zk-cli-test"));
        assert_eq!(config.client_port, 2281);
        assert_eq!(config.skip_acl, Some(true));
        assert_eq!(config.force_sync, Some(false));
        assert_eq!(config.snap_count, Some(5000));
    }

    #[test]
    fn jvm_flags_are_appended_not_replaced() {
        let cli = Cli::parse_from(["zk-shepherd", "--jvm-flags", "-Xmx512m -XX:+UseG1GC"]);
        let config = cli.build_config().unwrap();
        assert!(config.jvm_flags.contains(&"-Xmx512m".to_string()));
        assert!(config.jvm_flags.contains(&"-XX:+UseG1GC".to_string()));
        assert!(config.jvm_flags.contains(&"-server".to_string()));
    }

    #[test]
    fn yaml_config_is_applied_before_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yml");
        std::fs::write(&path, "client_port: 2400\ntick_time: 500\n").unwrap();

        let cli = Cli::parse_from([
            "zk-shepherd",
            "-c",
            path.to_str().unwrap(),
            "-p",
            "2500",
        ]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.client_port, 2500, "flag beats file");
        assert_eq!(config.tick_time, 500, "file beats default");
    }

    #[test]
    fn defaults_leave_the_tristate_keys_unset() {
        let cli = Cli::parse_from(["zk-shepherd"]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.force_sync, None);
        assert_eq!(config.skip_acl, None);
        assert_eq!(config.snap_count, None);
    }
}
