#![allow(dead_code)]

use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use zk_shepherd::{Install, Timeouts};

/// Writes an executable stand-in for the JVM and returns an install that
/// launches it. The script receives the whole java argv, so the rendered
/// config path arrives as its last argument.
pub fn fake_java(dir: &Path, body: &str) -> Arc<Install> {
    let script = dir.join("fake-java.sh");
    fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).unwrap();

    // Jars only flow into the command line; any readable file will do.
    let jar = dir.join("stand-in.jar");
    fs::write(&jar, b"jar").unwrap();

    Arc::new(Install::new(script, jar.clone(), jar))
}

/// Budgets tuned for tests: fail fast instead of waiting out the
/// production defaults.
pub fn quick_timeouts() -> Timeouts {
    Timeouts {
        startup: Duration::from_millis(400),
        signal_wait: Duration::from_millis(300),
        ping_interval: Duration::from_millis(50),
        ping_timeout: Duration::from_millis(200),
    }
}

/// Background thread answering `ruok` with `imok` on `port` until the
/// guard is dropped. Stands in for the server side of the health probe.
pub struct Responder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub fn answer_ruok(port: u16) -> Responder {
    let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
    listener.set_nonblocking(true).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        while !thread_stop.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let _ = stream.set_nonblocking(false);
                    let mut word = [0u8; 4];
                    if stream.read_exact(&mut word).is_ok() && &word == b"ruok" {
                        let _ = stream.write_all(b"imok");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    Responder {
        stop,
        handle: Some(handle),
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
