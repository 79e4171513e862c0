//! Line transports carrying the coordination protocol.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

/// A duplex, line-oriented channel to the relay.
///
/// Every line sent by any rank is delivered to the inbound side of every
/// rank, the sender included. Lines never contain `\n`.
pub trait Transport: Send {
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Block until the next inbound line arrives, without its terminator.
    fn recv_line(&mut self) -> io::Result<String>;
}

/// Transport over two byte streams left open by the launcher.
pub struct PipeTransport {
    reader: BufReader<File>,
    writer: File,
}

impl PipeTransport {
    /// Open the inbound and outbound streams named by `inbound`/`outbound`.
    ///
    /// Each name is a path (typically a FIFO) or `fd:N` for a descriptor
    /// inherited from the launcher. The outbound stream is opened first.
    pub fn open(inbound: &str, outbound: &str) -> io::Result<Self> {
        let writer = OpenOptions::new()
            .append(true)
            .open(stream_path(outbound)?)?;
        let reader = BufReader::new(File::open(stream_path(inbound)?)?);
        Ok(Self { reader, writer })
    }
}

/// Resolve a stream name to a path; `fd:N` maps to `/dev/fd/N`.
pub fn stream_path(name: &str) -> io::Result<PathBuf> {
    match name.strip_prefix("fd:") {
        Some(fd) => {
            let fd: u32 = fd.parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad descriptor: {name}"))
            })?;
            Ok(Path::new("/dev/fd").join(fd.to_string()))
        }
        None if name.is_empty() => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty coordination stream name",
        )),
        None => Ok(PathBuf::from(name)),
    }
}

impl Transport for PipeTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn recv_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "coordination stream closed",
            ));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Single-process transport: every line comes straight back.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    queue: VecDeque<String>,
}

impl Transport for LoopbackTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.queue.push_back(line.to_string());
        Ok(())
    }

    fn recv_line(&mut self) -> io::Result<String> {
        self.queue.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::WouldBlock, "loopback read with nothing sent")
        })
    }
}

/// One endpoint of an in-memory relay built by [`memory_hub`].
pub struct MemoryTransport {
    peers: Arc<Mutex<Vec<mpsc::Sender<String>>>>,
    inbox: mpsc::Receiver<String>,
}

/// An in-memory relay for `size` ranks; endpoint `i` belongs to rank `i`.
///
/// Fan-out happens under one lock, so all endpoints see lines in the same
/// global order.
pub fn memory_hub(size: usize) -> Vec<MemoryTransport> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
    let peers = Arc::new(Mutex::new(senders));
    receivers
        .into_iter()
        .map(|inbox| MemoryTransport {
            peers: Arc::clone(&peers),
            inbox,
        })
        .collect()
}

impl Transport for MemoryTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let peers = self.peers.lock();
        for peer in peers.iter() {
            peer.send(line.to_string())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer endpoint dropped"))?;
        }
        Ok(())
    }

    fn recv_line(&mut self) -> io::Result<String> {
        self.inbox
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "relay closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_stream_path() {
        assert_eq!(stream_path("fd:7").unwrap(), PathBuf::from("/dev/fd/7"));
        assert_eq!(stream_path("/tmp/in").unwrap(), PathBuf::from("/tmp/in"));
        assert!(stream_path("fd:x").is_err());
        assert!(stream_path("").is_err());
    }

    #[test]
    fn test_pipe_transport_over_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let inbound = tmp.path().join("in");
        let outbound = tmp.path().join("out");
        fs::write(&inbound, "first\r\n\nthird\n").unwrap();
        fs::write(&outbound, "").unwrap();

        let mut transport =
            PipeTransport::open(inbound.to_str().unwrap(), outbound.to_str().unwrap()).unwrap();
        transport.send_line("{\"rank\":0}").unwrap();
        transport.send_line("").unwrap();

        assert_eq!(transport.recv_line().unwrap(), "first");
        assert_eq!(transport.recv_line().unwrap(), "");
        assert_eq!(transport.recv_line().unwrap(), "third");
        let eof = transport.recv_line().unwrap_err();
        assert_eq!(eof.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(fs::read_to_string(&outbound).unwrap(), "{\"rank\":0}\n\n");
    }

    #[test]
    fn test_memory_hub_delivers_to_everyone() {
        let mut hub = memory_hub(3);
        hub[1].send_line("hello").unwrap();
        for endpoint in &mut hub {
            assert_eq!(endpoint.recv_line().unwrap(), "hello");
        }
    }

    #[test]
    fn test_loopback_echoes() {
        let mut transport = LoopbackTransport::default();
        assert!(transport.recv_line().is_err());
        transport.send_line("a").unwrap();
        assert_eq!(transport.recv_line().unwrap(), "a");
    }
}
