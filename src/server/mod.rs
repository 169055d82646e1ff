//! Server lifecycle supervision: the common [`Server`] surface plus the
//! on-disk scaffolding and readiness polling shared by both flavors.

pub mod embedded;
pub mod process;

pub use embedded::{EmbeddedRuntime, EmbeddedServer};
pub use process::ProcessServer;

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::ExitStatus;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::health;
use crate::install::LOG4J_TEMPLATE;

/// Budgets for lifecycle operations.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// How long a freshly launched server gets to answer its first ping.
    pub startup: Duration,
    /// How long each shutdown signal gets to take effect before the next
    /// one is sent.
    pub signal_wait: Duration,
    /// Pause between readiness probes.
    pub ping_interval: Duration,
    /// Socket budget for a single probe.
    pub ping_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(6),
            signal_wait: Duration::from_secs(5),
            ping_interval: Duration::from_millis(100),
            ping_timeout: Duration::from_secs(1),
        }
    }
}

/// What every supervised server flavor can do, whether it lives in a child
/// process or inside this one.
pub trait Server {
    /// Launches the server and waits for it to become reachable. Returns
    /// `Ok(false)` if this instance was already asked to run; a failed
    /// attempt spends the single shot too.
    fn run(&self) -> Result<bool>;

    /// Stops the server and reports true once it is down. Idempotent: a
    /// server that never started, or that already stopped, is quietly
    /// treated as down.
    fn shutdown(&self) -> bool;

    /// Whether the server is currently alive.
    fn running(&self) -> bool;

    /// Process id of the server while one exists.
    fn pid(&self) -> Option<i32>;

    fn config(&self) -> &ServerConfig;

    fn timeouts(&self) -> &Timeouts;

    /// How the server exited, for flavors that can observe it.
    fn status(&self) -> Option<ExitStatus> {
        None
    }

    /// Asks the server's client port whether it is OK.
    fn ping(&self) -> bool {
        let config = self.config();
        health::ping("127.0.0.1", config.client_port, self.timeouts().ping_timeout)
    }

    /// Stops the server and deletes everything under its base directory.
    /// A base directory that never existed is not an error.
    fn clobber(&self) -> Result<()> {
        self.shutdown();
        match fs::remove_dir_all(&self.config().base_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lays down the instance's on-disk scaffolding: directories, the identity
/// file, the rendered config and a logging template. Idempotent apart from
/// rewriting zoo.cfg and myid, which always reflect the current config.
pub(crate) fn create_files(config: &ServerConfig, log4j_template: Option<&Path>) -> Result<()> {
    fs::create_dir_all(&config.base_dir)?;
    fs::create_dir_all(config.data_dir())?;
    if let Some(parent) = config.myid_path().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config.myid_path(), format!("{}\n", config.myid))?;

    // The server boots straight off this file; flush it all the way down.
    let mut zoo_cfg = File::create(config.zoo_cfg_path())?;
    zoo_cfg.write_all(config.render_config_file().as_bytes())?;
    zoo_cfg.write_all(b"\n")?;
    zoo_cfg.sync_all()?;

    let props = config.log4j_props_path();
    if !props.exists() {
        match log4j_template {
            Some(template) => {
                fs::copy(template, &props)?;
            }
            None => fs::write(&props, LOG4J_TEMPLATE)?,
        }
    }

    fs::create_dir_all(config.log_dir())?;
    Ok(())
}

/// Polls the client port until the server answers or the startup budget
/// runs out. Always probes at least once.
pub(crate) fn wait_until_ping(config: &ServerConfig, timeouts: &Timeouts) -> bool {
    let deadline = Instant::now() + timeouts.startup;
    loop {
        if health::ping("127.0.0.1", config.client_port, timeouts.ping_timeout) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(timeouts.ping_interval);
    }
}
