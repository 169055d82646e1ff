//! Liveness probing over the ZooKeeper four-letter-word admin protocol.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::trace;

/// Sends a four-letter command and collects the response until the server
/// closes the connection. The timeout bounds connect, write and read
/// individually.
fn four_letter_word(addr: &SocketAddr, word: &[u8; 4], timeout: Duration) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect_timeout(addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.write_all(word)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    Ok(response)
}

/// Asks the server at `host:port` whether it is OK. True only for the
/// exact `imok` answer; refused connections, timeouts, short reads and
/// unexpected payloads all count as not-running.
pub fn ping(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };

    for addr in addrs {
        match four_letter_word(&addr, b"ruok", timeout) {
            Ok(response) => return response == b"imok",
            Err(e) => {
                trace!("ruok probe of {} failed: {}", addr, e);
                continue;
            }
        }
    }
    false
}
