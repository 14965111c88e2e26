use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, info};

use iqfeed_core::{PortKind, STATS_STATUS_COLUMN};

use crate::SimState;
use crate::catalog;
use crate::config::ClientId;
use crate::generator::{FUNDAMENTAL_FIELDS, Quote, UPDATE_FIELDS};

const END_OF_MESSAGE: &str = "!ENDMSG!,\r\n";
const NO_DATA: &str = "E,!NO_DATA!,\r\n";
const SYNTAX_ERROR: &str = "E,!SYNTAX_ERROR!,\r\n";

/// Соединение клиента: команды построчно, ответы как есть
pub(crate) struct ClientConn {
    cid: ClientId,
    kind: PortKind,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    line: String,
}

impl ClientConn {
    pub(crate) fn new(cid: ClientId, kind: PortKind, stream: TcpStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            cid,
            kind,
            reader: BufReader::new(stream),
            writer,
            line: String::new(),
        })
    }

    /// Следующая команда без `\r\n`; `Ok(None)`: тик без данных.
    /// Неполная строка остаётся в буфере до следующего вызова.
    fn next_command(&mut self) -> io::Result<Option<String>> {
        match self.reader.read_line(&mut self.line) {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(_) if self.line.ends_with('\n') => {
                let cmd = self.line.trim_end_matches(['\r', '\n']).to_string();
                self.line.clear();
                debug!("{} #{} <- {cmd:?}", self.kind, self.cid);
                Ok(Some(cmd))
            }
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()
    }

    /// Ответ кусками фиксированного размера, чтобы клиент собирал сообщения
    fn send_chunked(&mut self, text: &str, chunk: usize) -> io::Result<()> {
        for part in text.as_bytes().chunks(chunk.max(1)) {
            self.writer.write_all(part)?;
            self.writer.flush()?;
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

pub(crate) fn run_session(
    mut conn: ClientConn,
    state: Arc<SimState>,
    shutdown: Arc<AtomicBool>,
) -> io::Result<()> {
    info!("{} client #{} connected", conn.kind, conn.cid);
    let res = match conn.kind {
        PortKind::Admin => run_admin(&mut conn, &state, &shutdown),
        PortKind::Level1 | PortKind::Level2 => run_stream(&mut conn, &state, &shutdown),
        PortKind::Lookup => run_lookup(&mut conn, &state, &shutdown),
        PortKind::Derivative => run_derivative(&mut conn, &state, &shutdown),
    };
    info!("{} client #{} disconnected", conn.kind, conn.cid);

    match res {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
        other => other,
    }
}

/// Строка `S,STATS`: статус связи в колонке `STATS_STATUS_COLUMN`
pub(crate) fn stats_line(state: &SimState) -> String {
    let status = if state.upstream_connected() {
        "Connected"
    } else {
        "Not Connected"
    };
    let clients = state.hub.subscribers();
    let mut fields: Vec<String> = vec![
        "S".into(),
        "STATS".into(),
        "127.0.0.1".into(),
        "60003".into(),
        "1300".into(),
        state.hub.watched_symbols().to_string(),
        clients.to_string(),
        "0".into(),
        "0".into(),
        "0".into(),
        "0".into(),
        "Jan 02 9:00AM".into(),
        "Jan 02 9:30AM".into(),
    ];
    fields.truncate(STATS_STATUS_COLUMN);
    fields.push(status.into());
    fields.extend(["6.2.0.25", "SIMULATOR", "0.00", "0.00", "0.00", "0.00", "0.00", "0.00"].map(String::from));
    format!("{}\n", fields.join(","))
}

fn protocol_reply(cmd: &str) -> Option<String> {
    cmd.strip_prefix("S,SET PROTOCOL,")
        .map(|v| format!("S,CURRENT PROTOCOL,{v}\n"))
}

fn run_admin(conn: &mut ClientConn, state: &SimState, shutdown: &AtomicBool) -> io::Result<()> {
    let mut last_stats = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(cmd) = conn.next_command()? {
            if let Some(reply) = protocol_reply(&cmd) {
                conn.send(&reply)?;
                continue;
            }
            match cmd.as_str() {
                "S,CLIENTSTATS ON" => {
                    conn.send(&format!("S,CLIENTSTATS,1,{},SIMULATOR,0,0,0,0\n", conn.cid))?;
                }
                "S,CLIENTSTATS OFF" => {}
                "S,CONNECT" => {
                    state.set_upstream_connected(true);
                    conn.send(&stats_line(state))?;
                }
                "S,DISCONNECT" => {
                    state.set_upstream_connected(false);
                    conn.send(&stats_line(state))?;
                }
                _ => conn.send(SYNTAX_ERROR)?,
            }
        }

        if last_stats.elapsed() >= state.cfg.stats_interval {
            conn.send(&stats_line(state))?;
            last_stats = Instant::now();
        }
    }
    Ok(())
}

fn startup_sequence(state: &SimState) -> String {
    let server = if state.upstream_connected() {
        "S,SERVER CONNECTED"
    } else {
        "S,SERVER DISCONNECTED"
    };
    format!("S,KEY,SIM\nS,KEYOK\n{server}\nS,IP,127.0.0.1 60003\nS,CUST,real_time,127.0.0.1,60003,SIM,6.2.0.25,0,ALL,,500,QT_API,,\n")
}

fn run_stream(conn: &mut ClientConn, state: &SimState, shutdown: &AtomicBool) -> io::Result<()> {
    conn.send(&startup_sequence(state))?;

    let rx = match state.hub.subscribe(conn.cid) {
        Ok(rx) => rx,
        Err(e) => {
            conn.send(&format!("E,{e},\r\n"))?;
            return Ok(());
        }
    };

    let mut fields: Vec<String> = UPDATE_FIELDS.map(String::from).to_vec();
    let res = stream_loop(conn, state, shutdown, &rx, &mut fields);
    state.hub.unsubscribe(conn.cid);
    res
}

fn stream_loop(
    conn: &mut ClientConn,
    state: &SimState,
    shutdown: &AtomicBool,
    rx: &Receiver<Arc<Quote>>,
    fields: &mut Vec<String>,
) -> io::Result<()> {
    while !shutdown.load(Ordering::Relaxed) {
        if let Some(cmd) = conn.next_command()? {
            handle_stream_command(conn, state, &cmd, fields)?;
        }

        for q in rx.try_iter() {
            conn.send(&q.update_row(fields))?;
        }
    }
    Ok(())
}

fn handle_stream_command(
    conn: &mut ClientConn,
    state: &SimState,
    cmd: &str,
    fields: &mut Vec<String>,
) -> io::Result<()> {
    if let Some(reply) = protocol_reply(cmd) {
        return conn.send(&reply);
    }

    match cmd {
        "S,REQUEST FUNDAMENTAL FIELDNAMES" => {
            return conn.send(&format!("S,FUNDAMENTAL FIELDNAMES,{}\n", FUNDAMENTAL_FIELDS.join(",")));
        }
        "S,REQUEST CURRENT UPDATE FIELDNAMES" => {
            return conn.send(&format!("S,CURRENT UPDATE FIELDNAMES,{}\n", fields.join(",")));
        }
        _ => {}
    }

    if let Some(list) = cmd.strip_prefix("S,SELECT UPDATE FIELDS,") {
        // Symbol всегда первым
        fields.clear();
        fields.push("Symbol".into());
        fields.extend(
            list.split(',')
                .filter(|f| !f.is_empty() && *f != "Symbol")
                .map(String::from),
        );
        return conn.send(&format!("S,CURRENT UPDATE FIELDNAMES,{}\n", fields.join(",")));
    }

    let watch = cmd
        .strip_prefix("WOR,")
        .or_else(|| cmd.strip_prefix('w'))
        .or_else(|| cmd.strip_prefix('t'));
    if let Some(symbol) = watch {
        if catalog::find(symbol).is_none() {
            return conn.send(&format!("n,{symbol}\r\n"));
        }
        if let Err(e) = state.hub.watch(conn.cid, symbol) {
            return conn.send(&format!("E,{e},\r\n"));
        }
        return Ok(());
    }

    let unwatch = cmd.strip_prefix("ROR,").or_else(|| cmd.strip_prefix('r'));
    if let Some(symbol) = unwatch {
        state.hub.unwatch(conn.cid, symbol);
        return Ok(());
    }

    if let Some(symbol) = cmd.strip_prefix('f') {
        if let Some(q) = state.hub.last_quote(symbol) {
            conn.send(&q.update_row(fields))?;
        }
        return Ok(());
    }

    conn.send(SYNTAX_ERROR)
}

fn run_lookup(conn: &mut ClientConn, state: &SimState, shutdown: &AtomicBool) -> io::Result<()> {
    while !shutdown.load(Ordering::Relaxed) {
        let Some(cmd) = conn.next_command()? else {
            continue;
        };
        if let Some(reply) = protocol_reply(&cmd) {
            conn.send(&reply)?;
            continue;
        }

        let response = lookup_response(&cmd);
        conn.send_chunked(&response, state.cfg.chunk_size)?;
    }
    Ok(())
}

/// Полный ответ lookup порта, включая маркер конца
pub(crate) fn lookup_response(cmd: &str) -> String {
    let parts: Vec<&str> = cmd.split(',').collect();
    let arg = |i: usize| parts.get(i).copied().unwrap_or("");

    let (request_id, marker, rows) = match arg(0) {
        "SST" => (arg(1), "LS", Some(catalog::security_type_rows())),
        "SLM" => (arg(1), "LS", Some(catalog::market_rows())),
        "SBF" => (
            arg(5),
            "LS",
            Some(catalog::search_rows(arg(1), arg(2), arg(3), arg(4))),
        ),
        "HTT" => (arg(8), "LH", catalog::find(arg(1)).map(catalog::tick_rows)),
        "HIT" => {
            let interval = arg(2).parse().unwrap_or(60);
            (
                arg(9),
                "LH",
                catalog::find(arg(1)).map(|l| catalog::bar_rows(l, interval)),
            )
        }
        _ => return SYNTAX_ERROR.to_string(),
    };

    let prefix = if request_id.is_empty() {
        String::new()
    } else {
        format!("{request_id},")
    };

    let mut out = String::new();
    match rows {
        Some(rows) if !rows.is_empty() => {
            for row in rows {
                out.push_str(&format!("{prefix}{marker},{row},\r\n"));
            }
        }
        _ => out.push_str(&format!("{prefix}{NO_DATA}")),
    }
    out.push_str(&prefix);
    out.push_str(END_OF_MESSAGE);
    out
}

fn run_derivative(conn: &mut ClientConn, state: &SimState, shutdown: &AtomicBool) -> io::Result<()> {
    let rx = match state.hub.subscribe(conn.cid) {
        Ok(rx) => rx,
        Err(e) => {
            conn.send(&format!("E,{e},\r\n"))?;
            return Ok(());
        }
    };

    let res = derivative_loop(conn, state, shutdown, &rx);
    state.hub.unsubscribe(conn.cid);
    res
}

fn derivative_loop(
    conn: &mut ClientConn,
    state: &SimState,
    shutdown: &AtomicBool,
    rx: &Receiver<Arc<Quote>>,
) -> io::Result<()> {
    while !shutdown.load(Ordering::Relaxed) {
        if let Some(cmd) = conn.next_command()? {
            if let Some(reply) = protocol_reply(&cmd) {
                conn.send(&reply)?;
            } else if let Some(args) = cmd.strip_prefix("BW,") {
                let mut it = args.split(',');
                let symbol = it.next().unwrap_or_default();
                let interval = it.next().and_then(|s| s.parse().ok()).unwrap_or(60);
                match catalog::find(symbol) {
                    Some(l) => {
                        // история за последние бары, потом живые обновления
                        for row in catalog::bar_rows(l, interval).iter().rev().take(3).rev() {
                            conn.send(&format!("BH,{symbol},{row},\r\n"))?;
                        }
                        if let Err(e) = state.hub.watch(conn.cid, symbol) {
                            conn.send(&format!("E,{e},\r\n"))?;
                        }
                    }
                    None => conn.send(&format!("n,{symbol}\r\n"))?,
                }
            } else {
                conn.send(SYNTAX_ERROR)?;
            }
        }

        for q in rx.try_iter() {
            conn.send(&format!(
                "BU,{},{:.2},{:.2},{:.2},{:.2},{},{},1,\r\n",
                q.symbol, q.last, q.ask, q.bid, q.last, q.total_volume, q.last_size
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[test]
    fn stats_status_sits_in_status_column() {
        let state = SimState::new(SimConfig::ephemeral());
        let line = stats_line(&state);
        let fields: Vec<_> = line.trim_end().split(',').collect();
        assert_eq!(fields[0], "S");
        assert_eq!(fields[1], "STATS");
        assert_eq!(fields[STATS_STATUS_COLUMN], "Connected");

        state.set_upstream_connected(false);
        let line = stats_line(&state);
        assert_eq!(line.split(',').nth(STATS_STATUS_COLUMN), Some("Not Connected"));
    }

    #[test]
    fn lookup_response_echoes_request_id() {
        let out = lookup_response("SLM,q1");
        assert!(out.starts_with("q1,LS,5,NYSE,"));
        assert!(out.ends_with("q1,!ENDMSG!,\r\n"));
    }

    #[test]
    fn unknown_history_symbol_reports_no_data() {
        let out = lookup_response("HTT,ZZZZ,,20250102 160000,,,,,,1024");
        assert_eq!(out, "E,!NO_DATA!,\r\n!ENDMSG!,\r\n");
    }

    #[test]
    fn interval_history_uses_requested_interval() {
        let out = lookup_response("HIT,AAPL,300,,20250102 160000,,,,,,1024");
        let first = out.lines().next().unwrap();
        assert!(first.starts_with("LH,2025-01-02 09:35:00,"), "{first}");
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert_eq!(lookup_response("XYZ,1"), SYNTAX_ERROR);
    }
}
