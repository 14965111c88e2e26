//! Точка входа `iqfeed-client`.
//!
//! Жизненный цикл:
//! - парсинг CLI и сборка `ClientConfig`
//! - инициализация демона: admin порт, `CLIENTSTATS ON`, `S,CONNECT`, ghost сессия
//! - выполнение одной команды (справочник, история или подписка)
//! - закрытие всех сессий, в том числе по `Ctrl+C`

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};

use iqfeed_client::{History, HistoryQuery, QueryOutcome, SessionRegistry, UpdateStream};
use iqfeed_core::{PortKind, ReadOutput};

use cli::{Args, Cmd};

const WATCH_SESSION: &str = "watch";
const UPDATE_QUEUE: usize = 1024;

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/debug
    env_logger::init();

    let args = Args::parse();
    args.validate()?;

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    let mut registry = SessionRegistry::new(args.client_config());

    if args.skip_init {
        if let Err(e) = registry.connect(PortKind::Admin, iqfeed_client::ADMIN_SESSION) {
            warn!("admin port: {e}");
        }
    } else {
        registry
            .initialize()
            .context("iqfeed daemon is not healthy")?;
    }

    let res = run(&mut registry, args.command, &shutdown);
    registry.shutdown();
    res
}

fn run(registry: &mut SessionRegistry, cmd: Cmd, shutdown: &Arc<AtomicBool>) -> anyhow::Result<()> {
    match cmd {
        Cmd::Health => {
            if !registry.health_check() {
                bail!("iqfeed daemon is not healthy");
            }
            println!("healthy");
        }

        Cmd::SecurityTypes { request_id } => {
            let out = registry.lookup_security_types(&request_id)?;
            print_outcome(&out, |t| format!("{}\t{}\t{}", t.id, t.short_name, t.long_name));
        }

        Cmd::MarketTypes { request_id } => {
            let out = registry.lookup_market_types(&request_id)?;
            print_outcome(&out, |m| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    m.id, m.short_name, m.long_name, m.group_id, m.short_group_name
                )
            });
        }

        Cmd::Search {
            search,
            field,
            market,
            security_type,
            root,
            request_id,
        } => {
            let out = registry.lookup_symbol(
                &search,
                cli::symbol_filter(market, security_type),
                field.into(),
                &request_id,
                root.as_deref(),
            )?;
            print_outcome(&out, |s| {
                format!(
                    "{}\t{}\t{}\t{}",
                    s.symbol, s.listed_market_id, s.security_type_id, s.description
                )
            });
        }

        Cmd::History {
            symbol,
            interval,
            start,
            end,
            batch_size,
        } => {
            let mut query = match interval {
                Some(secs) => HistoryQuery::interval(secs),
                None => HistoryQuery::trades(),
            }
            .between(start, end);
            query.batch_size = batch_size;

            match registry.query_historical(&symbol, query)? {
                History::Trades(out) => print_outcome(&out, |t| {
                    format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        t.time_stamp, t.last, t.last_size, t.total_volume, t.bid, t.ask, t.tick_id
                    )
                }),
                History::Interval(out) => print_outcome(&out, |b| {
                    format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        b.time_stamp,
                        b.open,
                        b.high,
                        b.low,
                        b.close,
                        b.total_volume,
                        b.period_volume,
                        b.number_of_trades
                    )
                }),
            }
        }

        Cmd::Watch {
            symbol,
            fields,
            trades,
            interval,
            depth,
        } => watch(registry, &symbol, &fields, trades, interval, depth, shutdown)?,
    }
    Ok(())
}

fn watch(
    registry: &mut SessionRegistry,
    symbol: &str,
    fields: &[String],
    trades: bool,
    interval: Option<u32>,
    depth: bool,
    shutdown: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let kind = match (interval, depth) {
        (Some(_), _) => PortKind::Derivative,
        (None, true) => PortKind::Level2,
        (None, false) => PortKind::Level1,
    };

    let session = registry.connect(kind, WATCH_SESSION)?;
    if !fields.is_empty() && kind.is_streaming() && !session.select_fieldnames(fields)? {
        warn!("daemon did not confirm fields {fields:?}");
    }
    match interval {
        Some(secs) => session.symbol_watch_interval(symbol, secs)?,
        None if trades => session.symbol_watch_trades(symbol)?,
        None => session.symbol_watch(symbol)?,
    }

    let session = registry
        .detach(WATCH_SESSION)
        .context("watch session vanished")?;
    let stream = UpdateStream::spawn(session, shutdown.clone(), UPDATE_QUEUE)?;
    info!("watching {symbol} on {kind} port, Ctrl+C to stop");

    loop {
        match stream.receiver().recv_timeout(Duration::from_millis(200)) {
            Ok(ReadOutput::Table(t)) => {
                for row in &t.rows {
                    println!("{}", row.join("\t"));
                }
            }
            Ok(ReadOutput::Raw(msgs)) => {
                for m in &msgs {
                    println!("{}", m.trim_end());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    if let Some(mut session) = stream.join() {
        if session.is_connected() && kind != PortKind::Derivative {
            session.symbol_terminate().ok();
        }
        session.disconnect();
    }
    Ok(())
}

fn print_outcome<T>(out: &QueryOutcome<T>, line: impl Fn(&T) -> String) {
    for r in &out.records {
        println!("{}", line(r));
    }
    if !out.complete {
        warn!("response is incomplete: {} records", out.records.len());
    }
}
