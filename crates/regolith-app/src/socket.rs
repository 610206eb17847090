//! The UDP layer: a non-blocking socket for the main loop plus, on the
//! server, a blocking clone for the receiver thread.
//!
//! Every send failure is a logged no-op; the protocol tolerates loss, so
//! no I/O error propagates past this module once the socket is bound.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use tracing::{debug, info};

use regolith_net::{Outbox, SharedReceiveQueue};

/// Largest datagram the receiver accepts.
const MAX_DATAGRAM: usize = 65_536;

/// A bound game socket.
pub struct GameSocket {
    socket: UdpSocket,
}

impl GameSocket {
    /// Binds to the given port on all interfaces, non-blocking.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        info!(port, "socket bound");
        Ok(Self { socket })
    }

    /// Sends every queued datagram; failures are logged and dropped.
    pub fn send_outbox(&self, out: &mut Outbox) {
        for (bytes, to) in out.drain() {
            if let Err(error) = self.socket.send_to(&bytes, to) {
                debug!(%error, %to, "send failed, dropping datagram");
            }
        }
    }

    /// Drains every currently readable datagram without blocking
    /// (client-side receive path).
    pub fn poll_into(&self, out: &mut Vec<(Vec<u8>, SocketAddr)>) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => out.push((buf[..len].to_vec(), from)),
                Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    debug!(%error, "recv failed");
                    break;
                }
            }
        }
    }

    /// Spawns the server's receiver thread: a blocking clone of the socket
    /// whose only job is to append datagrams to the shared queue.
    pub fn spawn_receiver(&self, queue: SharedReceiveQueue) -> io::Result<()> {
        let socket = self.socket.try_clone()?;
        socket.set_nonblocking(false)?;

        std::thread::Builder::new()
            .name("receiver".to_string())
            .spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                loop {
                    match socket.recv_from(&mut buf) {
                        Ok((len, from)) => {
                            if let Ok(mut queue) = queue.lock() {
                                queue.push(&buf[..len], from);
                            }
                        }
                        Err(error) => {
                            debug!(%error, "receiver thread recv failed");
                        }
                    }
                }
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regolith_net::ReceiveQueue;

    #[test]
    fn test_loopback_send_and_poll() {
        let a = GameSocket::bind(0).unwrap();
        let b = GameSocket::bind(0).unwrap();
        let b_addr: SocketAddr =
            format!("127.0.0.1:{}", b.socket.local_addr().unwrap().port())
                .parse()
                .unwrap();

        let mut out = Outbox::new();
        out.push(vec![1, 2, 3], b_addr);
        a.send_outbox(&mut out);
        assert!(out.is_empty());

        // Give the kernel a moment to deliver locally.
        let mut received = Vec::new();
        for _ in 0..50 {
            b.poll_into(&mut received);
            if !received.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, vec![1, 2, 3]);
    }

    #[test]
    fn test_receiver_thread_fills_queue() {
        let server = GameSocket::bind(0).unwrap();
        let server_addr: SocketAddr =
            format!("127.0.0.1:{}", server.socket.local_addr().unwrap().port())
                .parse()
                .unwrap();
        let queue = ReceiveQueue::shared();
        server.spawn_receiver(queue.clone()).unwrap();

        let client = GameSocket::bind(0).unwrap();
        let mut out = Outbox::new();
        out.push(b"hello".to_vec(), server_addr);
        client.send_outbox(&mut out);

        let mut drained = Vec::new();
        for _ in 0..100 {
            queue.lock().unwrap().drain_into(&mut drained);
            if !drained.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, b"hello");
    }
}
