use crate::constants::END_OF_MESSAGE;
use crate::types::split_fields;

/// Как нормализовать строки постраничного ответа
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    /// RequestID вызывающего (может быть пустым)
    pub request_id: String,
    /// Тег строки: `LS`, `LH`, ...
    pub marker: String,
    /// Оставлять колонку RequestID в строке
    pub echo_request_id: bool,
}

impl RowFilter {
    /// Фильтр, который убирает RequestID из строк
    pub fn new(request_id: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            marker: marker.into(),
            echo_request_id: false,
        }
    }

    /// Оставлять RequestID первой колонкой
    pub fn with_echo(mut self) -> Self {
        self.echo_request_id = true;
        self
    }

    /// Маркер конца; с непустым RequestID демон присылает его с префиксом id
    pub fn is_end(&self, message: &str) -> bool {
        if message == END_OF_MESSAGE {
            return true;
        }
        !self.request_id.is_empty()
            && message
                .strip_prefix(self.request_id.as_str())
                .and_then(|rest| rest.strip_prefix(','))
                == Some(END_OF_MESSAGE)
    }

    /// Строка ответа без `\r`, RequestID и тега
    pub fn normalize(&self, message: &str) -> Vec<String> {
        let mut fields = split_fields(message);

        if fields.last().is_some_and(|f| f == "\r") {
            fields.pop();
        } else if let Some(last) = fields.last_mut() {
            let trimmed = last.trim_end_matches('\r').len();
            last.truncate(trimmed);
        }

        let mut echoed = None;
        if fields.first().is_some_and(|f| *f == self.request_id) {
            let id = fields.remove(0);
            if self.echo_request_id {
                echoed = Some(id);
            }
        }

        if fields.first().is_some_and(|f| *f == self.marker) {
            fields.remove(0);
        }

        if let Some(id) = echoed {
            fields.insert(0, id);
        }

        fields
    }
}

/// Итог постраничного запроса
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// нормализованные строки
    pub rows: Vec<Vec<String>>,
    /// встретился маркер конца
    pub complete: bool,
}

impl QueryResult {
    /// Ответ оборван таймаутом
    pub fn is_partial(&self) -> bool {
        !self.complete
    }
}

/// Копит строки до маркера `!ENDMSG!`
#[derive(Debug, Clone)]
pub struct LookupAccumulator {
    filter: RowFilter,
    rows: Vec<Vec<String>>,
    complete: bool,
}

impl LookupAccumulator {
    /// 
    pub fn new(filter: RowFilter) -> Self {
        Self {
            filter,
            rows: Vec::new(),
            complete: false,
        }
    }

    /// Добавляет сообщения цикла; `true`, когда ответ завершён.
    /// Всё, что пришло после маркера в том же цикле, игнорируется.
    pub fn push_cycle(&mut self, messages: &[String]) -> bool {
        if self.complete {
            return true;
        }

        for m in messages {
            if self.filter.is_end(m) {
                self.complete = true;
                break;
            }
            if m.is_empty() {
                continue;
            }
            self.rows.push(self.filter.normalize(m));
        }

        self.complete
    }

    /// Маркер конца уже встретился
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Сколько строк накоплено
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Ни одной строки
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Отдаёт строки и флаг завершения
    pub fn finish(self) -> QueryResult {
        QueryResult {
            rows: self.rows,
            complete: self.complete,
        }
    }
}
