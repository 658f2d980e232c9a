use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::collectors::record::{truncate_info, ClassifiedRecord, Draft, RawDump};

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+").expect("valid timestamp regex"))
}

fn endpoints_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9a-fA-F:.]+(?:\.\d+)?)\s*>\s*([0-9a-fA-F:.]+(?:\.\d+)?)")
            .expect("valid endpoints regex")
    })
}

/// Extracts a record from one line of text-mode capture output
/// (`tcpdump -l -n -tt` style). Heuristic and total: whatever cannot be
/// recognised falls back to placeholders, and the line itself is kept as
/// `info`.
pub fn parse_line(line: &str) -> ClassifiedRecord {
    let mut parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Draft {
            info: line.to_string(),
            ..Draft::default()
        }
        .freeze(RawDump::Line(line));
    }

    let mut draft = Draft::default();

    if timestamp_re().is_match(parts[0]) {
        draft.timestamp = parts[0].to_string();
        parts.remove(0);
    } else {
        draft.timestamp = wall_clock();
    }

    let rem = parts.join(" ");

    if matches!(parts.first(), Some(&"IP") | Some(&"IP6")) {
        draft.protocol = parts[0].to_string();
        if let Some((src, dst)) = split_at_arrow(&parts) {
            draft.source = src;
            draft.destination = dst;
        }
    }

    if draft.source.is_empty() || draft.destination.is_empty() {
        if let Some(caps) = endpoints_re().captures(&rem) {
            draft.source = caps[1].to_string();
            draft.destination = caps[2].trim_end_matches(':').to_string();
        }
    }

    match protocol_from_keywords(&rem) {
        Some(proto) => draft.protocol = proto.to_string(),
        None if draft.protocol.is_empty() => {
            debug!(line = %rem, "no protocol keyword in capture line");
        }
        None => {}
    }

    draft.info = truncate_info(&rem);
    draft.fill_defaults(wall_clock);
    draft.freeze(RawDump::Line(line))
}

/// Rebuilds a short window around the first token holding `>` and splits it
/// there. Source is the left side, destination the first token after the
/// arrow with its trailing `:` removed.
fn split_at_arrow(parts: &[&str]) -> Option<(String, String)> {
    let arrow = parts.iter().position(|tok| tok.contains('>'))?;
    let start = arrow.saturating_sub(1);
    let end = (arrow + 3).min(parts.len());
    let window = parts[start..end].join(" ");
    let (left, right) = window.split_once('>')?;
    let src = left.trim();
    let dst = right.split_whitespace().next().unwrap_or("").trim_end_matches(':');
    if src.is_empty() || dst.is_empty() {
        return None;
    }
    Some((src.to_string(), dst.to_string()))
}

fn protocol_from_keywords(text: &str) -> Option<&'static str> {
    let upper = text.to_uppercase();
    if upper.contains("TCP") || upper.contains("FLAGS") {
        Some("TCP")
    } else if upper.contains("UDP") {
        Some("UDP")
    } else if upper.contains("ICMP") {
        Some("ICMP")
    } else if upper.contains("ARP") {
        Some("ARP")
    } else {
        None
    }
}

fn wall_clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
