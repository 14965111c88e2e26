use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::config::ClientId;
use crate::generator::Quote;

/// Очередь котировок на одного подписчика
const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub(crate) enum HubError {
    #[error("client #{0} is already subscribed")]
    AlreadySubscribed(ClientId),
    #[error("client #{0} is not subscribed")]
    UnknownSubscriber(ClientId),
}

/// Итог одной публикации
#[derive(Debug, Default)]
pub(crate) struct Delivery {
    delivered: usize,
    queue_full: usize,
    gone: usize,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={} queue_full={} gone={}",
            self.delivered, self.queue_full, self.gone
        )
    }
}

impl Delivery {
    pub(crate) fn lost(&self) -> bool {
        self.queue_full + self.gone > 0
    }
}

struct Subscriber {
    tx: Sender<Arc<Quote>>,
    symbols: HashSet<String>,
}

/// Подписки потоковых клиентов по символам и последняя котировка каждого символа.
///
/// Клиент получает только котировки символов, на которые подписан.
pub(crate) struct Hub {
    subs: Mutex<HashMap<ClientId, Subscriber>>,
    last: RwLock<HashMap<String, Arc<Quote>>>,
    queue_len: usize,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self::with_queue_len(SUBSCRIBER_QUEUE)
    }

    pub(crate) fn with_queue_len(queue_len: usize) -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
            last: RwLock::new(HashMap::new()),
            queue_len,
        }
    }

    fn subs(&self) -> MutexGuard<'_, HashMap<ClientId, Subscriber>> {
        match self.subs.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn subscribe(&self, cid: ClientId) -> Result<Receiver<Arc<Quote>>, HubError> {
        match self.subs().entry(cid) {
            Entry::Occupied(_) => Err(HubError::AlreadySubscribed(cid)),
            Entry::Vacant(e) => {
                let (tx, rx) = crossbeam_channel::bounded(self.queue_len);
                e.insert(Subscriber {
                    tx,
                    symbols: HashSet::new(),
                });
                Ok(rx)
            }
        }
    }

    pub(crate) fn unsubscribe(&self, cid: ClientId) -> bool {
        self.subs().remove(&cid).is_some()
    }

    /// `Ok(false)`, если символ уже был на подписке
    pub(crate) fn watch(&self, cid: ClientId, symbol: &str) -> Result<bool, HubError> {
        let mut subs = self.subs();
        let sub = subs.get_mut(&cid).ok_or(HubError::UnknownSubscriber(cid))?;
        Ok(sub.symbols.insert(symbol.to_string()))
    }

    pub(crate) fn unwatch(&self, cid: ClientId, symbol: &str) -> bool {
        self.subs()
            .get_mut(&cid)
            .is_some_and(|sub| sub.symbols.remove(symbol))
    }

    pub(crate) fn subscribers(&self) -> usize {
        self.subs().len()
    }

    /// Сколько разных символов на подписке у всех клиентов
    pub(crate) fn watched_symbols(&self) -> usize {
        let subs = self.subs();
        subs.values()
            .flat_map(|s| s.symbols.iter())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Последняя котировка символа (для `f<symbol>`)
    pub(crate) fn last_quote(&self, symbol: &str) -> Option<Arc<Quote>> {
        let last = match self.last.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        last.get(symbol).cloned()
    }

    /// Запоминает котировку и отправляет её подписчикам символа.
    /// Подписчики с закрытым каналом удаляются.
    pub(crate) fn publish(&self, q: Quote) -> Delivery {
        let q = Arc::new(q);
        match self.last.write() {
            Ok(mut g) => g.insert(q.symbol.clone(), q.clone()),
            Err(poisoned) => poisoned.into_inner().insert(q.symbol.clone(), q.clone()),
        };

        let mut out = Delivery::default();
        self.subs().retain(|_, sub| {
            if !sub.symbols.contains(&q.symbol) {
                return true;
            }
            match sub.tx.try_send(q.clone()) {
                Ok(()) => {
                    out.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    out.queue_full += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    out.gone += 1;
                    false
                }
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quote(symbol: &str, last: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            last,
            last_size: 100,
            total_volume: 100,
            bid: last - 0.01,
            ask: last + 0.01,
            tick_id: 1,
        }
    }

    #[test]
    fn only_watched_symbols_are_delivered() {
        let hub = Hub::new();
        let rx = hub.subscribe(1).unwrap();
        assert!(hub.watch(1, "AAPL").unwrap());
        assert!(!hub.watch(1, "AAPL").unwrap());

        assert_eq!(hub.publish(quote("MSFT", 410.0)).delivered, 0);
        assert_eq!(hub.publish(quote("AAPL", 185.0)).delivered, 1);

        let got = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(got.symbol, "AAPL");
        assert!(rx.try_recv().is_err());

        assert!(hub.unwatch(1, "AAPL"));
        assert_eq!(hub.publish(quote("AAPL", 186.0)).delivered, 0);
    }

    #[test]
    fn duplicate_and_unknown_subscribers_are_rejected() {
        let hub = Hub::new();
        let _rx = hub.subscribe(7).unwrap();
        assert!(matches!(hub.subscribe(7), Err(HubError::AlreadySubscribed(7))));
        assert!(matches!(hub.watch(8, "IBM"), Err(HubError::UnknownSubscriber(8))));
        assert_eq!(hub.subscribers(), 1);
    }

    #[test]
    fn last_quote_is_kept_without_subscribers() {
        let hub = Hub::new();
        hub.publish(quote("TSLA", 240.0));
        hub.publish(quote("TSLA", 241.5));
        assert_eq!(hub.last_quote("TSLA").unwrap().last, 241.5);
        assert!(hub.last_quote("IBM").is_none());
    }

    #[test]
    fn slow_subscriber_loses_quotes_and_closed_one_is_dropped() {
        let hub = Hub::with_queue_len(1);
        let _slow = hub.subscribe(1).unwrap();
        let closed = hub.subscribe(2).unwrap();
        hub.watch(1, "AAPL").unwrap();
        hub.watch(2, "AAPL").unwrap();
        hub.watch(2, "IBM").unwrap();
        assert_eq!(hub.watched_symbols(), 2);
        drop(closed);

        let first = hub.publish(quote("AAPL", 1.0));
        assert_eq!(first.delivered, 1);
        assert_eq!(first.gone, 1);
        assert_eq!(hub.subscribers(), 1);

        let second = hub.publish(quote("AAPL", 2.0));
        assert_eq!(second.queue_full, 1);
        assert!(second.lost());
        assert_eq!(hub.watched_symbols(), 1);
    }
}
