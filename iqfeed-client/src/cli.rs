use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use iqfeed_client::{ClientConfig, Endpoints};
use iqfeed_core::{
    ADMIN_PORT, DEFAULT_HOST, DERIVATIVE_PORT, LEVEL1_PORT, LEVEL2_PORT, LOOKUP_PORT, SearchField,
    SymbolFilter,
};

/// IQFeed Client - запросы к локальному демону IQFeed.
///
/// Перед командой клиент ждёт демон на admin порту, включает статистику
/// и открывает ghost сессию (можно пропустить через --skip-init).
#[derive(Parser, Debug, Clone)]
#[command(name = "iqfeed-client", version, about)]
pub(crate) struct Args {
    /// Адрес демона
    #[arg(long, global = true, default_value = DEFAULT_HOST)]
    pub(crate) host: IpAddr,

    #[arg(long, global = true, default_value_t = ADMIN_PORT)]
    pub(crate) admin_port: u16,

    #[arg(long, global = true, default_value_t = LEVEL1_PORT)]
    pub(crate) level1_port: u16,

    #[arg(long, global = true, default_value_t = LEVEL2_PORT)]
    pub(crate) level2_port: u16,

    #[arg(long, global = true, default_value_t = LOOKUP_PORT)]
    pub(crate) lookup_port: u16,

    #[arg(long, global = true, default_value_t = DERIVATIVE_PORT)]
    pub(crate) derivative_port: u16,

    /// Таймаут чтения сокета, секунды
    #[arg(long, global = true, default_value_t = 7)]
    pub(crate) timeout_secs: u64,

    /// Сколько раз пытаться достучаться до admin порта при старте
    #[arg(long, global = true, default_value_t = 30)]
    pub(crate) retries: u32,

    /// Не инициализировать демон (admin + ghost), сразу выполнить команду
    #[arg(long, global = true)]
    pub(crate) skip_init: bool,

    #[command(subcommand)]
    pub(crate) command: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Cmd {
    /// Проверка статистики admin порта
    Health,

    /// Типы ценных бумаг (SST)
    SecurityTypes {
        #[arg(long, default_value = "")]
        request_id: String,
    },

    /// Биржи и рынки (SLM)
    MarketTypes {
        #[arg(long, default_value = "")]
        request_id: String,
    },

    /// Поиск символов (SBF)
    Search {
        search: String,

        #[arg(long, value_enum, default_value_t = FieldArg::Symbol)]
        field: FieldArg,

        /// id рынка из market-types
        #[arg(long, conflicts_with = "security_type")]
        market: Option<String>,

        /// id типа бумаги из security-types
        #[arg(long)]
        security_type: Option<String>,

        /// Оставить только контракты корня, например @ES
        #[arg(long)]
        root: Option<String>,

        #[arg(long, default_value = "")]
        request_id: String,
    },

    /// Исторические сделки (HTT) или бары (HIT)
    History {
        symbol: String,

        /// Размер бара в секундах; без него запрашиваются сделки
        #[arg(long)]
        interval: Option<u32>,

        /// CCYYMMDD HHmmSS
        #[arg(long, default_value = "")]
        start: String,

        /// CCYYMMDD HHmmSS, по умолчанию сейчас
        #[arg(long, default_value = "")]
        end: String,

        /// DatapointsPerSend
        #[arg(long)]
        batch_size: Option<u32>,
    },

    /// Подписка на обновления до Ctrl+C
    Watch {
        symbol: String,

        /// Поля обновлений через запятую, например Last,Bid,Ask
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Только сделки (Level 1)
        #[arg(long)]
        trades: bool,

        /// Интервальные бары на derivative порту, секунды
        #[arg(long, conflicts_with = "trades")]
        interval: Option<u32>,

        /// Стакан на Level 2 порту
        #[arg(long, conflicts_with_all = ["trades", "interval"])]
        depth: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldArg {
    Symbol,
    Description,
}

impl From<FieldArg> for SearchField {
    fn from(f: FieldArg) -> Self {
        match f {
            FieldArg::Symbol => SearchField::Symbol,
            FieldArg::Description => SearchField::Description,
        }
    }
}

impl Args {
    /// Валидация аргументов, которую clap не делает сам
    pub(crate) fn validate(&self) -> Result<()> {
        let ports = [
            ("--admin-port", self.admin_port),
            ("--level1-port", self.level1_port),
            ("--level2-port", self.level2_port),
            ("--lookup-port", self.lookup_port),
            ("--derivative-port", self.derivative_port),
        ];
        for (name, port) in ports {
            if port == 0 {
                bail!("{name} must be in 1..=65535");
            }
        }

        if self.timeout_secs == 0 {
            bail!("--timeout-secs must be > 0");
        }

        match &self.command {
            Cmd::Search { search, .. } if search.trim().is_empty() => {
                bail!("search string is empty");
            }
            Cmd::History { symbol, .. } | Cmd::Watch { symbol, .. } if symbol.trim().is_empty() => {
                bail!("symbol is empty");
            }
            Cmd::History {
                interval: Some(0), ..
            } => bail!("--interval must be > 0"),
            _ => {}
        }

        Ok(())
    }

    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::default().with_endpoints(Endpoints {
            host: self.host,
            level1: self.level1_port,
            level2: self.level2_port,
            lookup: self.lookup_port,
            admin: self.admin_port,
            derivative: self.derivative_port,
        });
        let timeout = Duration::from_secs(self.timeout_secs);
        cfg.stream_timeout = timeout;
        cfg.lookup_timeout = timeout;
        cfg.connect_retry.max_attempts = self.retries;
        cfg
    }
}

/// Фильтр SBF из взаимоисключающих флагов
pub(crate) fn symbol_filter(market: Option<String>, security_type: Option<String>) -> SymbolFilter {
    match (market, security_type) {
        (Some(id), _) => SymbolFilter::ListedMarket(id),
        (None, Some(id)) => SymbolFilter::SecurityType(id),
        (None, None) => SymbolFilter::None,
    }
}
