use std::fmt;

use crate::collectors::sanitize::sanitize;

/// Longest `info` text kept for a record, in characters.
pub const INFO_LIMIT: usize = 200;

const ADDR_PLACEHOLDER: &str = "-";
const PROTO_PLACEHOLDER: &str = "?";

/// One row of the frame analyzer: the display form of a decoded frame or of
/// a line of text-mode capture output.
///
/// Every field is sanitized, printable text. A record is built once and never
/// changes afterwards; there is no mutable access to its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRecord {
    timestamp: String,
    protocol: String,
    source: String,
    destination: String,
    info: String,
    raw: Vec<String>,
}

impl ClassifiedRecord {
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    /// Human-readable dump of the original frame or line, one sanitized line
    /// per entry. Frames start with the textual form followed by the hex dump.
    pub fn raw(&self) -> &[String] {
        &self.raw
    }
}

/// `<timestamp> <protocol> <source> > <destination>: <info>`
impl fmt::Display for ClassifiedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} > {}: {}",
            self.timestamp, self.protocol, self.source, self.destination, self.info
        )
    }
}

/// What the `raw` field of a record is built from.
pub enum RawDump<'a> {
    Line(&'a str),
    Frame(&'a [u8]),
}

/// Mutable field set filled in by the classifier or the line parser, then
/// frozen into a [`ClassifiedRecord`].
#[derive(Debug, Default, Clone)]
pub struct Draft {
    pub timestamp: String,
    pub protocol: String,
    pub source: String,
    pub destination: String,
    pub info: String,
}

impl Draft {
    /// Fills the fields that are still empty with their placeholders.
    pub fn fill_defaults(&mut self, now: impl FnOnce() -> String) {
        if self.timestamp.is_empty() {
            self.timestamp = now();
        }
        if self.source.is_empty() {
            self.source = ADDR_PLACEHOLDER.into();
        }
        if self.destination.is_empty() {
            self.destination = ADDR_PLACEHOLDER.into();
        }
        if self.protocol.is_empty() {
            self.protocol = PROTO_PLACEHOLDER.into();
        }
    }

    /// Sanitizes every field and attaches the raw dump.
    pub fn freeze(self, raw: RawDump<'_>) -> ClassifiedRecord {
        let mut record = ClassifiedRecord {
            timestamp: sanitize(&self.timestamp),
            protocol: sanitize(&self.protocol),
            source: sanitize(&self.source),
            destination: sanitize(&self.destination),
            info: sanitize(&self.info),
            raw: Vec::new(),
        };
        record.raw = match raw {
            RawDump::Line(line) => vec![sanitize(line)],
            RawDump::Frame(bytes) => std::iter::once(record.to_string())
                .chain(hex_dump(bytes).into_iter().map(|line| sanitize(&line)))
                .collect(),
        };
        record
    }
}

/// Cuts `text` to [`INFO_LIMIT`] characters, marking the cut with `…`.
pub fn truncate_info(text: &str) -> String {
    match text.char_indices().nth(INFO_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Offset, hex and ASCII columns, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            format!("{:04x}  {:<47}  {}", i * 16, hex.join(" "), ascii)
        })
        .collect()
}
