use std::fmt;

/// Состояние сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// сокета нет или он закрыт
    #[default]
    Disconnected,
    /// идёт TCP подключение и `SET PROTOCOL`
    Connecting,
    /// ждём стартовые сообщения потокового порта
    Validating,
    /// сессия готова к командам
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Validating => "validating",
            SessionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Подтипы стартовых сообщений Level 1 / Level 2
pub const STARTUP_TOKENS: [&str; 5] = ["KEYOK", "CUST", "IP", "SERVER CONNECTED", "KEY"];

/// Единственный токен, который подтверждает подключение
pub const SERVER_CONNECTED: &str = "SERVER CONNECTED";

/// Подключена ли сессия по стартовым сообщениям.
/// Прочие стартовые токены на результат не влияют.
pub fn check_startup(messages: &[String]) -> bool {
    messages
        .iter()
        .any(|m| m.split(',').nth(1) == Some(SERVER_CONNECTED))
}

/// Стартовые токены, которых не оказалось в цикле (для диагностики)
pub fn missing_startup_tokens(messages: &[String]) -> Vec<&'static str> {
    STARTUP_TOKENS
        .into_iter()
        .filter(|t| !messages.iter().any(|m| m.split(',').nth(1) == Some(*t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn server_connected_anywhere_in_cycle_connects() {
        let msgs = owned(&[
            "S,KEY,2.5",
            "S,KEYOK",
            "S,CUST,real_time,127.0.0.1,60004,xxx,6.2.0.25,0",
            "S,IP,66.112.148.111",
            "S,SERVER CONNECTED,details",
        ]);
        assert!(check_startup(&msgs));
        assert!(missing_startup_tokens(&msgs).is_empty());
    }

    #[test]
    fn other_startup_tokens_never_connect() {
        let msgs = owned(&["S,KEY,1", "S,KEYOK", "S,CUST,x", "S,IP,1.2.3.4", "S,SERVER DISCONNECTED"]);
        assert!(!check_startup(&msgs));
        assert_eq!(missing_startup_tokens(&msgs), vec!["SERVER CONNECTED"]);
    }

    #[test]
    fn token_must_be_second_field_exactly() {
        assert!(!check_startup(&owned(&["SERVER CONNECTED"])));
        assert!(!check_startup(&owned(&["S,SERVER CONNECTED X"])));
        assert!(check_startup(&owned(&["S,SERVER CONNECTED"])));
        assert!(!check_startup(&[]));
    }
}
