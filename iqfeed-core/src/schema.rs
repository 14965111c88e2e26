//! Согласование схем полей и проекция строк на схему.

use crate::constants::{DISCONNECTED_STATUS, STATS_STATUS_COLUMN};
use crate::error::FeedError;
use crate::types::{FieldType, Table, split_fields};

/// Колонка символа в схеме обновлений, если демон её объявил
pub const SYMBOL_COLUMN: &str = "Symbol";

const IGNORED_ADMIN: [&str; 2] = ["CURRENT PROTOCOL", "CLIENTSTATS"];

/// Ищет в цикле ответ с именами полей.
/// `None` значит "согласование не удалось", а не пустую схему.
pub fn extract_fieldnames(messages: &[String], field_type: FieldType) -> Option<Vec<String>> {
    let mut found = None;

    for m in messages {
        let fields = split_fields(m);
        if fields.len() <= 2 || fields[1] != field_type.marker() {
            continue;
        }
        found = Some(trim_trailing_blank(fields[2..].to_vec()));
    }

    found
}

/// Ответ на `SELECT UPDATE FIELDS`: новая схема и эхо активного символа
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    /// схема обновлений, первая колонка `Symbol`
    pub fields: Vec<String>,
    /// символ, который демон прислал на месте колонки `Symbol`
    pub echoed_symbol: Option<String>,
}

/// Первая колонка ответа всегда место символа: если там эхо символа,
/// схема получает `Symbol` вместо него и проекция сохраняет символ.
pub fn extract_selection(messages: &[String]) -> Option<FieldSelection> {
    let mut fields = extract_fieldnames(messages, FieldType::Update)?;
    let echoed_symbol = match fields.first_mut() {
        Some(first) if first.as_str() != SYMBOL_COLUMN => {
            Some(std::mem::replace(first, SYMBOL_COLUMN.to_string()))
        }
        _ => None,
    };

    Some(FieldSelection {
        fields,
        echoed_symbol,
    })
}

/// Проекция `Q` сообщения на схему обновлений.
///
/// Хвостовой пустой токен (от завершающей запятой) и тег отбрасываются.
/// Символ остаётся, только если схема начинается с колонки `Symbol`.
/// Для прочих сообщений возвращает `None`.
pub fn project_update(message: &str, schema: &[String]) -> Result<Option<Vec<String>>, FeedError> {
    let mut fields = split_fields(message);
    if fields.first().map(String::as_str) != Some("Q") {
        return Ok(None);
    }
    if schema.is_empty() {
        return Err(FeedError::SchemaMissing(FieldType::Update));
    }

    if fields.last().is_some_and(|f| is_blank(f)) {
        fields.pop();
    }

    let skip = if schema[0] == SYMBOL_COLUMN { 1 } else { 2 };
    let row: Vec<String> = fields.into_iter().skip(skip).collect();

    if row.len() != schema.len() {
        return Err(FeedError::SchemaMismatch {
            expected: schema.len(),
            got: row.len(),
        });
    }

    Ok(Some(row))
}

/// Все `Q` сообщения цикла в таблицу с колонками схемы
pub fn process_stream(messages: &[String], schema: &[String]) -> Result<Table, FeedError> {
    let mut table = Table::new(schema.to_vec());
    for m in messages {
        if let Some(row) = project_update(m, schema)? {
            table.rows.push(row);
        }
    }
    Ok(table)
}

/// Строки `S,STATS` admin порта; протокол и клиентская статистика отбрасываются
pub fn process_admin(messages: &[String]) -> Table {
    let mut table = Table::default();

    for m in messages {
        let fields = split_fields(m);
        match fields.get(1).map(String::as_str) {
            Some(t) if IGNORED_ADMIN.contains(&t) => continue,
            Some("STATS") => table.rows.push(fields),
            _ => {}
        }
    }

    table
}

/// Статус подключения демона из последней строки статистики.
/// `None`, если строки нет или она короче колонки статуса.
pub fn stats_status(stats: &Table) -> Option<&str> {
    stats
        .last_row()?
        .get(STATS_STATUS_COLUMN)
        .map(String::as_str)
}

/// Строка статистики сообщает, что демон отключён
pub fn reports_disconnected(stats: &Table) -> bool {
    stats_status(stats) == Some(DISCONNECTED_STATUS)
}

fn is_blank(token: &str) -> bool {
    token.trim_end_matches('\r').is_empty()
}

fn trim_trailing_blank(mut fields: Vec<String>) -> Vec<String> {
    if fields.last().is_some_and(|f| is_blank(f)) {
        fields.pop();
    } else if let Some(last) = fields.last_mut() {
        let trimmed = last.trim_end_matches('\r').len();
        last.truncate(trimmed);
    }
    fields
}
