use log::error;

use crate::types::{Message, MessageKind};

/// Как поступать с `E,` строками в цикле
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFilter {
    /// Убрать все строки ошибок
    #[default]
    DropAll,
    /// Совместимость: логировать все, убрать только последнюю
    DropLast,
}

/// Цикл чтения после классификации
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cycle {
    /// сообщения без строк ошибок
    pub messages: Vec<String>,
    /// в цикле есть `S,` сообщение
    pub is_system: bool,
    /// текст ошибок демона, как пришёл
    pub errors: Vec<String>,
}

/// Отделяет ошибки демона и помечает системные циклы
pub fn classify_cycle(mut messages: Vec<String>, filter: ErrorFilter) -> Cycle {
    let error_idx: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| is_error(m))
        .map(|(i, _)| i)
        .collect();

    let mut errors = Vec::with_capacity(error_idx.len());
    for &i in &error_idx {
        let text = error_text(&messages[i]);
        error!("IQFeed error: {text}");
        errors.push(text);
    }

    match filter {
        ErrorFilter::DropAll => messages.retain(|m| !is_error(m)),
        ErrorFilter::DropLast => {
            if let Some(&last) = error_idx.last() {
                messages.remove(last);
            }
        }
    }

    let is_system = has_system_message(&messages);

    Cycle {
        messages,
        is_system,
        errors,
    }
}

/// Есть ли в цикле системное сообщение
pub fn has_system_message(messages: &[String]) -> bool {
    messages.iter().any(|m| first_token(m) == "S")
}

/// Разбор сообщений цикла в типизированный вид
pub fn parse_messages(messages: &[String]) -> Vec<Message> {
    messages.iter().map(|m| Message::parse(m)).collect()
}

fn is_error(message: &str) -> bool {
    Message::parse(message).kind == MessageKind::Error
}

fn first_token(message: &str) -> &str {
    message.split(',').next().unwrap_or("")
}

fn error_text(message: &str) -> String {
    message
        .split_once(',')
        .map(|(_, rest)| rest)
        .unwrap_or("")
        .trim_end_matches(['\r', ','])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn error_lines_are_removed_and_reported() {
        let c = classify_cycle(owned(&["S,X", "E,bad thing", "S,Y"]), ErrorFilter::DropAll);

        assert_eq!(c.messages, vec!["S,X", "S,Y"]);
        assert_eq!(c.errors, vec!["bad thing"]);
        assert!(c.is_system);
    }

    #[test]
    fn drop_all_removes_every_error_line() {
        let c = classify_cycle(
            owned(&["E,first", "LS,1", "E,second,\r"]),
            ErrorFilter::DropAll,
        );
        assert_eq!(c.messages, vec!["LS,1"]);
        assert_eq!(c.errors, vec!["first", "second"]);
    }

    #[test]
    fn drop_last_keeps_earlier_error_lines() {
        // режим совместимости: удаляется только последняя ошибка
        let c = classify_cycle(
            owned(&["E,first", "LS,1", "E,second"]),
            ErrorFilter::DropLast,
        );
        assert_eq!(c.messages, vec!["E,first", "LS,1"]);
        assert_eq!(c.errors.len(), 2);
    }

    #[test]
    fn system_flag_only_for_leading_s_token() {
        let c = classify_cycle(owned(&["Q,AAPL,1,", "F,S,2"]), ErrorFilter::DropAll);
        assert!(!c.is_system);

        let c = classify_cycle(owned(&["Q,AAPL,1,", "S,SERVER CONNECTED"]), ErrorFilter::DropAll);
        assert!(c.is_system);
    }

    #[test]
    fn empty_cycle_is_not_system() {
        let c = classify_cycle(Vec::new(), ErrorFilter::default());
        assert!(c.messages.is_empty());
        assert!(!c.is_system);
        assert!(c.errors.is_empty());
    }
}
