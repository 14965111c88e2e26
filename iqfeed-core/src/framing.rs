use std::io::{self, Read};

use log::debug;

use crate::constants::{MESSAGE_DELIMITER, READ_CHUNK};
use crate::error::FeedError;

/// Собирает из потока байт целые сообщения, разделённые `\n`.
///
/// Транспорт режет данные где угодно, поэтому читаем, пока буфер
/// не закончится разделителем. При таймауте отдаются уже целые сообщения,
/// незавершённый хвост остаётся в буфере до следующего `read_frame`.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Читатель поверх сокета или любого другого источника байт
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Исходный источник, например для смены таймаута сокета
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Один цикл чтения: все сообщения до последнего разделителя
    pub fn read_frame(&mut self) -> Result<Vec<String>, FeedError> {
        let mut chunk = [0u8; READ_CHUNK];

        while self.buf.last() != Some(&MESSAGE_DELIMITER) {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    if self.buf.is_empty() {
                        return Err(FeedError::Closed);
                    }
                    debug!("eof with {} unterminated bytes", self.buf.len());
                    break;
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return self.take_complete().ok_or(FeedError::ReadTimeout);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let raw = std::mem::take(&mut self.buf);
        Ok(split_frame(&String::from_utf8_lossy(&raw)))
    }

    /// Целые сообщения до последнего разделителя; хвост остаётся в буфере
    fn take_complete(&mut self) -> Option<Vec<String>> {
        let end = self.buf.iter().rposition(|&b| b == MESSAGE_DELIMITER)? + 1;
        let raw: Vec<u8> = self.buf.drain(..end).collect();
        debug!("timeout with {} unterminated bytes kept", self.buf.len());
        Some(split_frame(&String::from_utf8_lossy(&raw)))
    }
}

/// Делит буфер на сообщения; пустой хвост после финального `\n` отбрасывается
pub fn split_frame(text: &str) -> Vec<String> {
    let mut messages: Vec<String> = text
        .split(MESSAGE_DELIMITER as char)
        .map(str::to_string)
        .collect();

    if messages.last().is_some_and(String::is_empty) {
        messages.pop();
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Отдаёт заранее нарезанные куски, затем таймаут
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        eof: bool,
    }

    impl ChunkedReader {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                eof: false,
            }
        }

        fn with_eof(mut self) -> Self {
            self.eof = true;
            self
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(c) => {
                    buf[..c.len()].copy_from_slice(&c);
                    Ok(c.len())
                }
                None if self.eof => Ok(0),
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
            }
        }
    }

    #[test]
    fn message_split_across_chunks_is_reassembled() {
        let mut r = FrameReader::new(ChunkedReader::new(&[
            "S,KEY,123\nS,SERVER CON",
            "NECTED,ok\n",
        ]));

        let got = r.read_frame().unwrap();
        assert_eq!(got, vec!["S,KEY,123", "S,SERVER CONNECTED,ok"]);
    }

    #[test]
    fn trailing_delimiter_does_not_produce_empty_message() {
        let mut r = FrameReader::new(ChunkedReader::new(&["S,STATS,1\n"]));
        assert_eq!(r.read_frame().unwrap(), vec!["S,STATS,1"]);
    }

    #[test]
    fn inner_blank_lines_are_kept() {
        let mut r = FrameReader::new(ChunkedReader::new(&["LS,1\n\nLS,2\n"]));
        assert_eq!(r.read_frame().unwrap(), vec!["LS,1", "", "LS,2"]);
    }

    #[test]
    fn timeout_returns_complete_messages_and_keeps_partial_tail() {
        let mut r = FrameReader::new(ChunkedReader::new(&["LS,1\nLS,"]));
        assert_eq!(r.read_frame().unwrap(), vec!["LS,1"]);

        // хвост не потерян: следующий кусок его дописывает
        r.inner.chunks.push_back(b"2\n".to_vec());
        assert_eq!(r.read_frame().unwrap(), vec!["LS,2"]);
    }

    #[test]
    fn timeout_without_complete_message_surfaces() {
        let mut r = FrameReader::new(ChunkedReader::new(&["LS,"]));
        assert!(matches!(r.read_frame(), Err(FeedError::ReadTimeout)));

        r.inner.chunks.push_back(b"1\n".to_vec());
        assert_eq!(r.read_frame().unwrap(), vec!["LS,1"]);
    }

    #[test]
    fn eof_on_empty_buffer_is_closed() {
        let mut r = FrameReader::new(ChunkedReader::new(&[]).with_eof());
        assert!(matches!(r.read_frame(), Err(FeedError::Closed)));
    }

    #[test]
    fn eof_returns_unterminated_remainder() {
        let mut r = FrameReader::new(ChunkedReader::new(&["S,A\nS,B"]).with_eof());
        assert_eq!(r.read_frame().unwrap(), vec!["S,A", "S,B"]);
    }

    #[test]
    fn other_io_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "boom"))
            }
        }

        let err = FrameReader::new(Broken).read_frame().unwrap_err();
        match err {
            FeedError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
