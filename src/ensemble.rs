use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use crate::config::{default_base_dir, ServerConfig};
use crate::error::{Result, ShepherdError};
use crate::install::Install;
use crate::server::{ProcessServer, Server, Timeouts};

/// Client ports start here unless overridden; chosen well away from the
/// conventional 2181 so ensembles never collide with a real deployment.
pub const DEFAULT_BASE_PORT: u16 = 21811;
/// Offset from the base port to a member's follower (quorum) port.
pub const FOLLOWER_PORT_OFFSET: u16 = 100;
/// Offset from the base port to a member's leader-election port.
pub const LEADER_PORT_OFFSET: u16 = 200;

/// Composes N [`ProcessServer`]s into one self-contained ensemble on
/// localhost.
///
/// Member `i` gets identity `i`, lives under `<base_dir>/server-i`, serves
/// clients on `base_port + i` and talks quorum traffic on the follower and
/// leader offsets above. Every member is rendered with the same `server.N`
/// peer rows, which is what makes them an ensemble rather than N loners.
///
/// Starting is all-or-nothing: if any member fails to come up, the ones
/// already running are stopped and the member set is discarded, so a
/// failed ensemble can be retried from scratch. Shutting down discards
/// the member set too; the next [`Ensemble::run`] builds fresh handles
/// over the same directories.
pub struct Ensemble {
    /// Parent directory for the per-member `server-i` trees.
    pub base_dir: PathBuf,
    /// First client port; quorum ports are derived from it.
    pub base_port: u16,
    /// Budgets handed to every member.
    pub timeouts: Timeouts,
    /// Settings copied into every member before identity, ports, paths and
    /// peer rows are stamped on. Per-member fields set here are ignored.
    pub member_template: ServerConfig,
    num_members: usize,
    install: Arc<Install>,
    members: Option<Vec<ProcessServer>>,
    running: bool,
}

impl Ensemble {
    pub fn new(num_members: usize, install: Arc<Install>) -> Self {
        Self {
            base_dir: default_base_dir(),
            base_port: DEFAULT_BASE_PORT,
            timeouts: Timeouts::default(),
            member_template: ServerConfig::default(),
            num_members,
            install,
            members: None,
            running: false,
        }
    }

    pub fn num_members(&self) -> usize {
        self.num_members
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// The members, in identity order. Empty until a run succeeds, and
    /// again after a shutdown discards them.
    pub fn members(&self) -> &[ProcessServer] {
        self.members.as_deref().unwrap_or(&[])
    }

    /// Starts every member in identity order, waiting for each to become
    /// reachable before moving on. Returns `Ok(false)` when already
    /// running. On any member failing, stops what was started, discards
    /// the member set and reports that member's error.
    pub fn run(&mut self) -> Result<bool> {
        if self.running {
            return Ok(false);
        }
        self.validate_ports()?;

        let members: Vec<ProcessServer> = (0..self.num_members)
            .map(|idx| {
                ProcessServer::with_timeouts(
                    self.member_config(idx),
                    Arc::clone(&self.install),
                    self.timeouts,
                )
            })
            .collect();

        info!(
            "Starting {}-member ensemble on ports {}..{}",
            self.num_members,
            self.base_port,
            self.base_port + self.num_members.saturating_sub(1) as u16
        );

        for member in &members {
            if let Err(e) = member.run() {
                error!(
                    "Member {} failed to start; rolling the ensemble back",
                    member.config().myid
                );
                for started in &members {
                    started.shutdown();
                }
                return Err(e);
            }
        }

        self.members = Some(members);
        self.running = true;
        Ok(true)
    }

    /// Stops every member and discards the member set. A no-op reporting
    /// false when the ensemble is not running.
    pub fn shutdown(&mut self) -> bool {
        if !self.running {
            return false;
        }
        if let Some(members) = self.members.take() {
            for member in &members {
                member.shutdown();
            }
        }
        self.running = false;
        true
    }

    /// True only when every member process is alive.
    pub fn all_running(&self) -> bool {
        self.members
            .as_ref()
            .map_or(false, |members| members.iter().all(|m| m.running()))
    }

    /// True only when every member answers its ruok probe.
    pub fn ping_all(&self) -> bool {
        self.members
            .as_ref()
            .map_or(false, |members| members.iter().all(|m| m.ping()))
    }

    /// Stops everything and deletes the whole ensemble tree. The member
    /// set is discarded, so the ensemble can be run again from scratch.
    pub fn clobber(&mut self) -> Result<()> {
        self.shutdown();
        match fs::remove_dir_all(&self.base_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.members = None;
        Ok(())
    }

    /// The leader stride is the highest port in use; if the last member's
    /// leader port fits in a u16, every derived port does.
    fn validate_ports(&self) -> Result<()> {
        let last_leader = self.base_port as u64
            + LEADER_PORT_OFFSET as u64
            + (self.num_members as u64).saturating_sub(1);
        if last_leader > u16::MAX as u64 {
            return Err(ShepherdError::Config(format!(
                "base port {} leaves no room for {} members; the last leader port would be {}",
                self.base_port, self.num_members, last_leader
            )));
        }
        Ok(())
    }

    /// `server.N` rows shared by every member's rendered config.
    fn peer_rows(&self) -> BTreeMap<String, String> {
        (0..self.num_members)
            .map(|i| {
                (
                    format!("server.{}", i),
                    format!(
                        "127.0.0.1:{}:{}",
                        self.base_port + FOLLOWER_PORT_OFFSET + i as u16,
                        self.base_port + LEADER_PORT_OFFSET + i as u16
                    ),
                )
            })
            .collect()
    }

    fn member_config(&self, idx: usize) -> ServerConfig {
        let mut config = self.member_template.clone();
        config.base_dir = self.base_dir.join(format!("server-{}", idx));
        // Shared storage overrides would have members trampling each other.
        config.data_dir = None;
        config.data_log_dir = None;
        config.myid = idx as u32;
        config.client_port = self.base_port + idx as u16;
        config.extra.extend(self.peer_rows());
        config
    }
}
