//! Supervision for ZooKeeper server processes.
//!
//! A [`ProcessServer`] launches one server as a child process, lays its
//! on-disk layout down first (zoo.cfg, myid, a log4j template), waits for
//! it to answer the `ruok` probe and tears it down with an escalating
//! signal ladder. An [`Ensemble`] composes several of them into a
//! self-contained localhost quorum with strided ports, which is the
//! shape integration test suites want: bring a real ensemble up, point a
//! client at it, throw it away afterwards with [`Ensemble::clobber`].
//!
//! Servers hosted inside the current process plug in through
//! [`EmbeddedRuntime`] and get the same lifecycle surface.

pub mod cli;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod health;
pub mod install;
pub mod server;
pub mod signal;

pub use config::ServerConfig;
pub use ensemble::Ensemble;
pub use error::{Result, ShepherdError};
pub use install::Install;
pub use server::{EmbeddedRuntime, EmbeddedServer, ProcessServer, Server, Timeouts};
pub use signal::ShutdownToken;
