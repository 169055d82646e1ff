use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::error::{Result, ShepherdError};
use crate::server::{create_files, wait_until_ping, Server, Timeouts};

/// The in-process engine an [`EmbeddedServer`] drives.
///
/// Implementations wrap whatever actually serves clients inside this
/// process. The supervisor only needs to boot it, block on its connection
/// acceptor and tear it down in two stages: stop accepting, then stop the
/// storage machinery behind the acceptor.
pub trait EmbeddedRuntime: Send + Sync + 'static {
    /// Boots the engine from the instance's on-disk layout.
    fn startup(&self, config: &ServerConfig) -> Result<()>;

    /// Blocks until the connection acceptor winds down.
    fn join_acceptor(&self);

    /// Stops accepting client connections.
    fn shutdown_acceptor(&self);

    /// Stops the storage and session machinery.
    fn shutdown_store(&self);

    /// Engine-level liveness, independent of the probe port.
    fn is_running(&self) -> bool;
}

struct Flags {
    run_called: bool,
    stopped: bool,
    worker: Option<JoinHandle<()>>,
}

/// Runs a server inside the current process on top of an
/// [`EmbeddedRuntime`]. Same lifecycle surface as a child process, minus
/// an exit status: the server lives and dies with us.
pub struct EmbeddedServer<R> {
    config: Arc<ServerConfig>,
    timeouts: Timeouts,
    runtime: Arc<R>,
    flags: Arc<Mutex<Flags>>,
}

impl<R> Clone for EmbeddedServer<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            timeouts: self.timeouts,
            runtime: Arc::clone(&self.runtime),
            flags: Arc::clone(&self.flags),
        }
    }
}

impl<R: EmbeddedRuntime> EmbeddedServer<R> {
    pub fn new(config: ServerConfig, runtime: R) -> Self {
        Self::with_timeouts(config, runtime, Timeouts::default())
    }

    pub fn with_timeouts(config: ServerConfig, runtime: R, timeouts: Timeouts) -> Self {
        Self {
            config: Arc::new(config),
            timeouts,
            runtime: Arc::new(runtime),
            flags: Arc::new(Mutex::new(Flags {
                run_called: false,
                stopped: false,
                worker: None,
            })),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

impl<R: EmbeddedRuntime> Server for EmbeddedServer<R> {
    /// Boots the runtime and holds the lock through the readiness poll, so
    /// a shutdown request queues behind a complete start instead of racing
    /// a half-booted engine.
    fn run(&self) -> Result<bool> {
        let mut flags = self.flags.lock();
        if flags.run_called {
            return Ok(false);
        }
        // A failed attempt spends the single shot too; handles never
        // relaunch.
        flags.run_called = true;

        let booted =
            create_files(&self.config, None).and_then(|()| self.runtime.startup(&self.config));
        if let Err(e) = booted {
            // Nothing came up, so there is nothing for shutdown to stop.
            flags.stopped = true;
            return Err(e);
        }

        let runtime = Arc::clone(&self.runtime);
        let myid = self.config.myid;
        flags.worker = Some(thread::spawn(move || {
            runtime.join_acceptor();
            debug!("Embedded instance {} acceptor wound down", myid);
        }));

        if wait_until_ping(&self.config, &self.timeouts) {
            debug!(
                "Embedded instance {} is answering on port {}",
                self.config.myid, self.config.client_port
            );
            return Ok(true);
        }

        if self.runtime.is_running() {
            warn!(
                "Embedded instance {} is up but not answering pings yet; continuing",
                self.config.myid
            );
            return Ok(true);
        }

        Err(ShepherdError::startup(format!(
            "embedded server on port {} never became reachable",
            self.config.client_port
        )))
    }

    fn shutdown(&self) -> bool {
        let mut flags = self.flags.lock();
        // Nothing started, or already stopped: quietly done.
        if !flags.run_called || flags.stopped {
            return true;
        }
        flags.stopped = true;

        self.runtime.shutdown_acceptor();
        self.runtime.shutdown_store();

        let worker = flags.worker.take();
        drop(flags);

        if let Some(worker) = worker {
            let _ = worker.join();
        }
        debug!("Embedded instance {} shut down", self.config.myid);
        true
    }

    fn running(&self) -> bool {
        let flags = self.flags.lock();
        flags.run_called && !flags.stopped && self.runtime.is_running()
    }

    /// An embedded server is us, so this is our own pid once running.
    fn pid(&self) -> Option<i32> {
        let flags = self.flags.lock();
        if flags.run_called && !flags.stopped {
            Some(process::id() as i32)
        } else {
            None
        }
    }

    fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }
}
