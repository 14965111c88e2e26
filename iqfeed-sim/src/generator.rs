use std::collections::HashMap;

use rand::Rng;

/// Поля обновлений Level 1, которые умеет симулятор
pub(crate) const UPDATE_FIELDS: [&str; 7] = [
    "Symbol",
    "Most Recent Trade",
    "Most Recent Trade Size",
    "Total Volume",
    "Bid",
    "Ask",
    "Tick ID",
];

pub(crate) const FUNDAMENTAL_FIELDS: [&str; 5] =
    ["Symbol", "Exchange ID", "PE", "Average Volume", "Company Name"];

/// Одна котировка
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Quote {
    pub(crate) symbol: String,
    pub(crate) last: f64,
    pub(crate) last_size: u64,
    pub(crate) total_volume: u64,
    pub(crate) bid: f64,
    pub(crate) ask: f64,
    pub(crate) tick_id: u64,
}

impl Quote {
    /// Значение поля по имени из `CURRENT UPDATE FIELDNAMES`
    pub(crate) fn field(&self, name: &str) -> String {
        match name {
            "Symbol" => self.symbol.clone(),
            "Most Recent Trade" => format!("{:.2}", self.last),
            "Most Recent Trade Size" => self.last_size.to_string(),
            "Total Volume" => self.total_volume.to_string(),
            "Bid" => format!("{:.2}", self.bid),
            "Ask" => format!("{:.2}", self.ask),
            "Tick ID" => self.tick_id.to_string(),
            _ => String::new(),
        }
    }

    /// Строка `Q` в порядке полей схемы; схема начинается с `Symbol`
    pub(crate) fn update_row(&self, fields: &[String]) -> String {
        let mut row = String::from("Q");
        for f in fields {
            row.push(',');
            row.push_str(&self.field(f));
        }
        row.push_str(",\r\n");
        row
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GeneratorConfig {
    /// Максимальный относительный шаг цены за тик (пример: 0.002 = 0.2%)
    pub(crate) max_rel_step: f64,
    pub(crate) min_price: f64,
    /// спред в долях цены
    pub(crate) spread: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_rel_step: 0.002,
            min_price: 0.01,
            spread: 0.0005,
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolState {
    price: f64,
    total_volume: u64,
    tick_id: u64,
}

/// Случайное блуждание цен по символам каталога
pub(crate) struct QuoteGenerator {
    cfg: GeneratorConfig,
    states: HashMap<String, SymbolState>,
}

impl QuoteGenerator {
    pub(crate) fn new<'a>(symbols: impl IntoIterator<Item = (&'a str, f64)>, cfg: GeneratorConfig) -> Self {
        let states = symbols
            .into_iter()
            .map(|(s, price)| {
                (
                    s.to_string(),
                    SymbolState {
                        price,
                        total_volume: 0,
                        tick_id: 0,
                    },
                )
            })
            .collect();
        Self { cfg, states }
    }

    pub(crate) fn next_quote(&mut self, symbol: &str) -> Option<Quote> {
        let st = self.states.get_mut(symbol)?;
        let mut rng = rand::rng();

        let delta = rng.random_range(-self.cfg.max_rel_step..self.cfg.max_rel_step);
        st.price = ((1.0 + delta) * st.price).max(self.cfg.min_price);

        let last_size = rng.random_range(1..500);
        st.total_volume += last_size;
        st.tick_id += 1;

        let half = st.price * self.cfg.spread / 2.0;
        Some(Quote {
            symbol: symbol.to_string(),
            last: st.price,
            last_size,
            total_volume: st.total_volume,
            bid: st.price - half,
            ask: st.price + half,
            tick_id: st.tick_id,
        })
    }

    pub(crate) fn next_batch(&mut self) -> Vec<Quote> {
        let keys: Vec<String> = self.states.keys().cloned().collect();
        keys.iter().filter_map(|s| self.next_quote(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_for_known_symbols() {
        let mut g = QuoteGenerator::new([("AAPL", 185.0)], GeneratorConfig::default());
        assert!(g.next_quote("MSFT").is_none());

        let q = g.next_quote("AAPL").unwrap();
        assert!(q.bid < q.ask);
        assert_eq!(q.tick_id, 1);
        assert_eq!(q.total_volume, q.last_size);

        let q2 = g.next_quote("AAPL").unwrap();
        assert_eq!(q2.tick_id, 2);
        assert!((q2.last / q.last - 1.0).abs() <= 0.002 + 1e-9);
    }

    #[test]
    fn update_row_follows_schema_order() {
        let q = Quote {
            symbol: "AAPL".into(),
            last: 185.5,
            last_size: 10,
            total_volume: 1000,
            bid: 185.49,
            ask: 185.51,
            tick_id: 7,
        };
        let fields = ["Symbol", "Bid", "Tick ID", "Nope"].map(String::from);
        assert_eq!(q.update_row(&fields), "Q,AAPL,185.49,7,,\r\n");
    }

    #[test]
    fn batch_covers_every_symbol() {
        let mut g = QuoteGenerator::new([("A", 1.0), ("B", 2.0)], GeneratorConfig::default());
        let mut got: Vec<_> = g.next_batch().into_iter().map(|q| q.symbol).collect();
        got.sort();
        assert_eq!(got, ["A", "B"]);
    }
}
