use std::fs::File;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::{Condvar, Mutex};

use crate::config::ServerConfig;
use crate::error::{Result, ShepherdError};
use crate::install::Install;
use crate::server::{create_files, wait_until_ping, Server, Timeouts};

/// Shutdown escalation ladder. Each rung gets `Timeouts::signal_wait` to
/// take effect before the next one is sent.
const SHUTDOWN_SIGNALS: &[Signal] = &[Signal::SIGHUP, Signal::SIGTERM, Signal::SIGKILL];

#[derive(Default)]
struct RunState {
    run_called: bool,
    pid: Option<i32>,
    exit_status: Option<ExitStatus>,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<RunState>,
    exited: Condvar,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle is going away; don't leave the child behind.
        let state = self.state.get_mut();
        if state.exit_status.is_none() {
            if let Some(pid) = state.pid {
                let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
        }
    }
}

/// Supervises one ZooKeeper server running as a child process.
///
/// Cloned handles are cheap and all observe the same instance: one clone
/// calling [`Server::run`] is visible to every other. A watcher thread
/// reaps the child the moment it exits, so its status is available even
/// when nobody asked it to stop.
#[derive(Clone)]
pub struct ProcessServer {
    config: Arc<ServerConfig>,
    install: Arc<Install>,
    timeouts: Timeouts,
    inner: Arc<Inner>,
}

impl ProcessServer {
    pub fn new(config: ServerConfig, install: Arc<Install>) -> Self {
        Self::with_timeouts(config, install, Timeouts::default())
    }

    pub fn with_timeouts(config: ServerConfig, install: Arc<Install>, timeouts: Timeouts) -> Self {
        Self {
            config: Arc::new(config),
            install,
            timeouts,
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::default()),
                exited: Condvar::new(),
            }),
        }
    }

    /// Whether [`Server::run`] has been called on this instance.
    pub fn spawned(&self) -> bool {
        self.inner.state.lock().run_called
    }

    /// Blocks until the child exits and returns how it went. Returns
    /// immediately with the recorded status if it already has, and with
    /// `None` if no child was ever launched.
    pub fn wait(&self) -> Option<ExitStatus> {
        let mut state = self.inner.state.lock();
        if !state.run_called {
            return None;
        }
        while state.exit_status.is_none() && state.pid.is_some() {
            self.inner.exited.wait(&mut state);
        }
        state.exit_status
    }

    fn spawn_child(&self) -> Result<Child> {
        let args = self.config.command_args(&self.install);
        debug!("Launching: {}", args.join(" "));

        let stdout = File::create(self.config.stdio_redirect_path())?;
        let stderr = stdout.try_clone()?;

        Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| ShepherdError::startup(format!("failed to launch {}: {}", args[0], e)))
    }

    /// The watcher owns the child handle and blocks in `wait` until it
    /// exits, then records the status and wakes anyone parked on the
    /// condvar. It holds only a weak reference so dropping the last server
    /// handle doesn't strand a thread keeping the state alive.
    fn spawn_watcher(&self, mut child: Child) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let myid = self.config.myid;
        thread::spawn(move || {
            let result = child.wait();
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.state.lock();
                match result {
                    Ok(status) => {
                        debug!("Instance {} exited: {}", myid, status);
                        state.exit_status = Some(status);
                    }
                    Err(e) => {
                        error!("Failed to reap instance {}: {}", myid, e);
                        state.pid = None;
                    }
                }
                inner.exited.notify_all();
            }
        })
    }
}

impl Server for ProcessServer {
    fn run(&self) -> Result<bool> {
        {
            let mut state = self.inner.state.lock();
            if state.run_called {
                return Ok(false);
            }
            // A failed attempt spends the single shot too; handles never
            // relaunch.
            state.run_called = true;

            create_files(&self.config, self.install.log4j_template())?;
            let child = self.spawn_child()?;
            let pid = child.id() as i32;

            state.pid = Some(pid);
            state.watcher = Some(self.spawn_watcher(child));
            info!(
                "Started instance {} on port {} (pid {})",
                self.config.myid, self.config.client_port, pid
            );
        }

        // Poll outside the lock so an early death can be recorded while we
        // wait for the first ping.
        if wait_until_ping(&self.config, &self.timeouts) {
            debug!(
                "Instance {} is answering on port {}",
                self.config.myid, self.config.client_port
            );
            return Ok(true);
        }

        if self.running() {
            warn!(
                "Instance {} is up but not answering pings yet; continuing",
                self.config.myid
            );
            return Ok(true);
        }

        let detail = match self.status() {
            Some(status) => format!("{}", status),
            None => "no exit status recorded".to_string(),
        };
        error!(
            "Instance {} died before becoming reachable ({})",
            self.config.myid, detail
        );
        Err(ShepherdError::startup(format!(
            "server on port {} died before answering ruok ({})",
            self.config.client_port, detail
        )))
    }

    fn shutdown(&self) -> bool {
        let mut state = self.inner.state.lock();
        let pid = match state.pid {
            // Never launched, or a previous shutdown already cleared it.
            None => return true,
            Some(pid) => pid,
        };

        for sig in SHUTDOWN_SIGNALS {
            if state.exit_status.is_some() {
                break;
            }
            match signal::kill(Pid::from_raw(pid), *sig) {
                Ok(()) => {
                    debug!("Sent {} to instance {} (pid {})", sig, self.config.myid, pid);
                    // Timing out here just moves us to the next rung.
                    let _ = self
                        .inner
                        .exited
                        .wait_for(&mut state, self.timeouts.signal_wait);
                }
                // Lost the race with the watcher: the child is already gone.
                Err(Errno::ESRCH) => break,
                Err(e) => {
                    warn!("Could not signal pid {} with {}: {}", pid, sig, e);
                }
            }
        }

        let watcher = state.watcher.take();
        state.pid = None;
        drop(state);

        if let Some(watcher) = watcher {
            let _ = watcher.join();
        }
        info!("Instance {} shut down", self.config.myid);
        true
    }

    fn running(&self) -> bool {
        let state = self.inner.state.lock();
        state.exit_status.is_none() && state.pid.map_or(false, process_alive)
    }

    fn pid(&self) -> Option<i32> {
        self.inner.state.lock().pid
    }

    fn status(&self) -> Option<ExitStatus> {
        self.inner.state.lock().exit_status
    }

    fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }
}

/// Signal 0 probes for existence without delivering anything.
fn process_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}
