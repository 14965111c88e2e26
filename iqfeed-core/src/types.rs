use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ADMIN_PORT, DERIVATIVE_PORT, LEVEL1_PORT, LEVEL2_PORT, LOOKUP_PORT};

/// Роль порта демона. От неё зависят рукопожатие и обработка чтения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// котировки / сделки
    Level1,
    /// стакан
    Level2,
    /// справочники и история
    Lookup,
    /// статистика и управление
    Admin,
    /// интервальные бары
    Derivative,
}

impl PortKind {
    /// Все роли
    pub const ALL: [PortKind; 5] = [
        PortKind::Level1,
        PortKind::Level2,
        PortKind::Lookup,
        PortKind::Admin,
        PortKind::Derivative,
    ];

    /// Стандартный номер порта
    pub fn default_port(self) -> u16 {
        match self {
            PortKind::Level1 => LEVEL1_PORT,
            PortKind::Level2 => LEVEL2_PORT,
            PortKind::Lookup => LOOKUP_PORT,
            PortKind::Admin => ADMIN_PORT,
            PortKind::Derivative => DERIVATIVE_PORT,
        }
    }

    /// Роль по стандартному номеру
    pub fn from_port(port: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.default_port() == port)
    }

    /// Потоковые порты шлют 5 стартовых сообщений и требуют схем
    pub fn is_streaming(self) -> bool {
        matches!(self, PortKind::Level1 | PortKind::Level2)
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortKind::Level1 => "level1",
            PortKind::Level2 => "level2",
            PortKind::Lookup => "lookup",
            PortKind::Admin => "admin",
            PortKind::Derivative => "derivative",
        };
        f.write_str(s)
    }
}

/// Семейство схем полей
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// `F` сообщения
    Fundamental,
    /// `Q` / `P` сообщения
    Update,
}

impl FieldType {
    /// Второй токен ответа с именами полей
    pub fn marker(self) -> &'static str {
        match self {
            FieldType::Fundamental => "FUNDAMENTAL FIELDNAMES",
            FieldType::Update => "CURRENT UPDATE FIELDNAMES",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Fundamental => f.write_str("fundamental"),
            FieldType::Update => f.write_str("update"),
        }
    }
}

/// Тип сообщения по первому токену
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `E`: ошибка демона
    Error,
    /// `S`: системное сообщение
    System,
    /// `S,STATS`
    AdminStat,
    /// `Q`: обновление котировки
    Update,
    /// `LS` / `LH`: строка справочника или истории
    LookupRow,
    /// всё остальное
    Other,
}

/// Одно сообщение протокола
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// исходная строка
    pub raw: String,
    /// тип по первому токену
    pub kind: MessageKind,
    /// токены через запятую
    pub fields: Vec<String>,
}

impl Message {
    /// Разбор строки без нормализации токенов
    pub fn parse(raw: &str) -> Self {
        let fields = split_fields(raw);
        let kind = match (
            fields.first().map(String::as_str),
            fields.get(1).map(String::as_str),
        ) {
            (Some("E"), _) => MessageKind::Error,
            (Some("S"), Some("STATS")) => MessageKind::AdminStat,
            (Some("S"), _) => MessageKind::System,
            (Some("Q"), _) => MessageKind::Update,
            (Some("LS" | "LH"), _) => MessageKind::LookupRow,
            _ => MessageKind::Other,
        };

        Self {
            raw: raw.to_string(),
            kind,
            fields,
        }
    }

    /// Второй токен (для `S` сообщений это подтип)
    pub fn subtype(&self) -> Option<&str> {
        self.fields.get(1).map(String::as_str)
    }
}

/// Делит сообщение по запятым без нормализации
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

/// Табличный результат: колонки + строки.
/// Пустой список колонок значит "позиционные" колонки (admin статистика).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// имена колонок
    pub columns: Vec<String>,
    /// строки в порядке прихода
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Пустая таблица с колонками
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Нет ни одной строки
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Последняя строка
    pub fn last_row(&self) -> Option<&[String]> {
        self.rows.last().map(Vec::as_slice)
    }

    /// Значение по имени колонки
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }
}

/// Результат одного цикла чтения
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutput {
    /// сообщения как есть (системные циклы, lookup порты)
    Raw(Vec<String>),
    /// admin статистика или проекция обновлений
    Table(Table),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_is_taken_from_leading_tokens() {
        assert_eq!(Message::parse("E,!NO_DATA!,").kind, MessageKind::Error);
        assert_eq!(Message::parse("S,KEY,1").kind, MessageKind::System);
        assert_eq!(Message::parse("S,STATS,1").kind, MessageKind::AdminStat);
        assert_eq!(Message::parse("Q,AAPL,1,").kind, MessageKind::Update);
        assert_eq!(Message::parse("LH,2024-01-02").kind, MessageKind::LookupRow);
        assert_eq!(Message::parse("F,AAPL").kind, MessageKind::Other);
        assert_eq!(Message::parse("").kind, MessageKind::Other);
    }

    #[test]
    fn port_kind_round_trips_default_ports() {
        for kind in PortKind::ALL {
            assert_eq!(PortKind::from_port(kind.default_port()), Some(kind));
        }
        assert_eq!(PortKind::from_port(1), None);
        assert!(PortKind::Level2.is_streaming());
        assert!(!PortKind::Lookup.is_streaming());
    }

    #[test]
    fn table_lookup_by_column_name() {
        let mut t = Table::new(vec!["Last".into(), "Bid".into()]);
        t.rows.push(vec!["100".into(), "99".into()]);

        assert_eq!(t.get(0, "Bid"), Some("99"));
        assert_eq!(t.get(0, "Ask"), None);
        assert_eq!(t.get(1, "Last"), None);
    }
}
