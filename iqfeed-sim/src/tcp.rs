use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};

use iqfeed_core::PortKind;

use crate::SimState;
use crate::config::{CLIENT_TICK, TCP_WRITE_TIMEOUT};
use crate::session::{ClientConn, run_session};

const ACCEPT_TICK: Duration = Duration::from_millis(50);

/// Порт симулятора: неблокирующий accept и поток на каждого клиента
struct PortListener {
    kind: PortKind,
    listener: TcpListener,
    state: Arc<SimState>,
    shutdown: Arc<AtomicBool>,
    clients: Vec<JoinHandle<()>>,
}

impl PortListener {
    fn run(mut self) -> anyhow::Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.reap(false);
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("{} connection from {peer}", self.kind);
                    self.spawn_client(stream)?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_TICK),
                Err(e) => {
                    warn!("{} accept error: {e}", self.kind);
                    thread::sleep(ACCEPT_TICK);
                }
            }
        }

        info!("shutting down {} listener", self.kind);
        self.reap(true);
        Ok(())
    }

    fn spawn_client(&mut self, stream: TcpStream) -> anyhow::Result<()> {
        let cid = self.state.next_client_id();
        let kind = self.kind;
        let state = self.state.clone();
        let shutdown = self.shutdown.clone();

        let handle = thread::Builder::new()
            .name(format!("sim-{kind}-{cid}"))
            .spawn(move || {
                let res = prepare(stream)
                    .and_then(|s| ClientConn::new(cid, kind, s))
                    .and_then(|conn| run_session(conn, state, shutdown));
                if let Err(e) = res {
                    warn!("{kind} client #{cid}: {e}");
                }
            })
            .context("spawn client thread")?;
        self.clients.push(handle);
        Ok(())
    }

    // all=false: только завершившиеся потоки
    fn reap(&mut self, all: bool) {
        let (done, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.clients)
            .into_iter()
            .partition(|h| all || h.is_finished());
        self.clients = alive;

        for h in done {
            if h.join().is_err() {
                warn!("{} client thread panicked", self.kind);
            }
        }
    }
}

/// accept loop одного порта до `shutdown`
pub(crate) fn run_tcp_listener(
    listener: TcpListener,
    kind: PortKind,
    state: Arc<SimState>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    listener
        .set_nonblocking(true)
        .context("listener.set_nonblocking(true)")?;

    PortListener {
        kind,
        listener,
        state,
        shutdown,
        clients: Vec::new(),
    }
    .run()
}

// короткий тик чтения: между командами сессия рассылает обновления
fn prepare(stream: TcpStream) -> io::Result<TcpStream> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(CLIENT_TICK))?;
    stream.set_write_timeout(Some(TCP_WRITE_TIMEOUT))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use std::io::{BufRead, BufReader, Read, Write};

    fn spawn_listener(kind: PortKind, cfg: SimConfig) -> (std::net::SocketAddr, Arc<AtomicBool>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SimState::new(cfg));
        let shutdown = Arc::new(AtomicBool::new(false));
        let sd = shutdown.clone();
        let h = thread::spawn(move || run_tcp_listener(listener, kind, state, sd).unwrap());
        (addr, shutdown, h)
    }

    #[test]
    fn level1_client_gets_startup_and_protocol_reply() {
        let (addr, shutdown, h) = spawn_listener(PortKind::Level1, SimConfig::ephemeral());

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reader = BufReader::new(client.try_clone().unwrap());

        let mut lines = Vec::new();
        for _ in 0..5 {
            let mut l = String::new();
            reader.read_line(&mut l).unwrap();
            lines.push(l.trim_end().to_string());
        }
        assert!(lines.iter().any(|l| l == "S,SERVER CONNECTED"));

        client.write_all(b"S,SET PROTOCOL,6.2\r\n").unwrap();
        let mut l = String::new();
        reader.read_line(&mut l).unwrap();
        assert_eq!(l, "S,CURRENT PROTOCOL,6.2\n");

        shutdown.store(true, Ordering::Relaxed);
        h.join().unwrap();
    }

    #[test]
    fn lookup_reply_arrives_in_chunks_and_ends_with_sentinel() {
        let cfg = SimConfig {
            chunk_size: 7,
            ..SimConfig::ephemeral()
        };
        let (addr, shutdown, h) = spawn_listener(PortKind::Lookup, cfg);

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client.write_all(b"SST\r\n").unwrap();

        let mut got = String::new();
        let mut buf = [0u8; 1024];
        while !got.ends_with("!ENDMSG!,\r\n") {
            let n = client.read(&mut buf).unwrap();
            assert!(n > 0);
            got.push_str(std::str::from_utf8(&buf[..n]).unwrap());
        }
        assert!(got.starts_with("LS,1,EQUITY,Equity,\r\n"));

        shutdown.store(true, Ordering::Relaxed);
        drop(client);
        h.join().unwrap();
    }
}
