use log::{debug, warn};

use iqfeed_core::{Command, FeedError, LookupAccumulator, QueryResult, RowFilter};

use crate::session::Session;

/// Запрос/ответ с постраничной выдачей до `!ENDMSG!`.
///
/// Таймаут или закрытие сокета посреди выдачи не ошибка: возвращаем
/// накопленное с `complete == false`. Лимит запросов соблюдает сама сессия.
pub struct PaginatedQuery<'a> {
    session: &'a mut Session,
}

impl<'a> PaginatedQuery<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Команда со строками вида `[RequestID,]<marker>,...`
    pub fn run(&mut self, command: &Command, request_id: &str) -> Result<QueryResult, FeedError> {
        let marker = command.row_marker().unwrap_or_default();
        self.run_with(command, RowFilter::new(request_id, marker))
    }

    pub fn run_with(&mut self, command: &Command, filter: RowFilter) -> Result<QueryResult, FeedError> {
        self.session.send(command)?;

        let mut acc = LookupAccumulator::new(filter);
        loop {
            match self.session.read_cycle() {
                Ok(cycle) => {
                    if acc.push_cycle(&cycle.messages) {
                        break;
                    }
                }
                Err(e) if e.is_partial_stop() => {
                    warn!(
                        "{}: {e} during {:?}; returning {} partial rows",
                        self.session.name(),
                        command.to_string().trim_end(),
                        acc.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let res = acc.finish();
        debug!(
            "{}: {} rows, complete={}",
            self.session.name(),
            res.rows.len(),
            res.complete
        );
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{fake_daemon, session};
    use iqfeed_core::PortKind;
    use std::thread;
    use std::time::Duration;

    fn sst() -> Command {
        Command::SecurityTypes {
            request_id: String::new(),
        }
    }

    #[test]
    fn rows_are_collected_across_split_chunks_until_sentinel() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.expect("SST");
            p.send("LS,1,EQUITY,Equ");
            thread::sleep(Duration::from_millis(20));
            p.send("ity,\r\nLS,8,FUTURE,Future,\r\n");
            thread::sleep(Duration::from_millis(20));
            p.send("!ENDMSG!,\r\n");
            p.drain();
        });

        let mut s = session(addr, PortKind::Lookup);
        s.connect().unwrap();

        let res = PaginatedQuery::new(&mut s).run(&sst(), "").unwrap();
        assert!(res.complete);
        assert_eq!(
            res.rows,
            vec![vec!["1", "EQUITY", "Equity"], vec!["8", "FUTURE", "Future"]]
        );
        // SET PROTOCOL + SST
        assert_eq!(s.pacer().in_window(), 2);

        s.disconnect();
        h.join().unwrap();
    }

    #[test]
    fn request_id_is_stripped_from_rows() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.expect("SLM,q1");
            p.send("q1,LS,13,CBOE,Chicago Board Options Exchange,13,CBOE,\r\nq1,!ENDMSG!,\r\n");
            p.drain();
        });

        let mut s = session(addr, PortKind::Lookup);
        s.connect().unwrap();

        let cmd = Command::MarketTypes {
            request_id: "q1".into(),
        };
        let res = PaginatedQuery::new(&mut s).run(&cmd, "q1").unwrap();

        assert!(res.complete);
        assert_eq!(res.rows.len(), 1);
        assert_eq!(res.rows[0], ["13", "CBOE", "Chicago Board Options Exchange", "13", "CBOE"]);

        s.disconnect();
        h.join().unwrap();
    }

    #[test]
    fn timeout_returns_partial_rows() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.expect("SST");
            p.send("LS,1,EQUITY,Equity,\r\n");
            p.drain();
        });

        let mut s = session(addr, PortKind::Lookup);
        s.set_timeout(Duration::from_millis(200)).unwrap();
        s.connect().unwrap();

        let res = PaginatedQuery::new(&mut s).run(&sst(), "").unwrap();
        assert!(res.is_partial());
        assert_eq!(res.rows, vec![vec!["1", "EQUITY", "Equity"]]);

        s.disconnect();
        h.join().unwrap();
    }

    #[test]
    fn error_line_is_dropped_and_query_still_completes() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.expect("HTT,ZZZZ,,20240102 160000,,,,,,1024");
            p.send("E,!NO_DATA!,\r\n!ENDMSG!,\r\n");
            p.drain();
        });

        let mut s = session(addr, PortKind::Lookup);
        s.connect().unwrap();

        let cmd = Command::TickHistory {
            symbol: "ZZZZ".into(),
            start: String::new(),
            end: "20240102 160000".into(),
            batch_size: 1024,
        };
        let res = PaginatedQuery::new(&mut s).run(&cmd, "").unwrap();
        assert!(res.complete);
        assert!(res.rows.is_empty());

        s.disconnect();
        h.join().unwrap();
    }

    #[test]
    fn query_on_disconnected_session_fails() {
        let addr = "127.0.0.1:9".parse().unwrap();
        let mut s = session(addr, PortKind::Lookup);

        let err = PaginatedQuery::new(&mut s).run(&sst(), "").unwrap_err();
        assert!(matches!(err, FeedError::NotConnected));
    }
}
