//! Terminal-safe rendering of untrusted captured text.
//!
//! Payloads, hostnames and tool output can carry escape sequences that would
//! repaint or retitle the terminal. Everything that reaches a widget goes
//! through [`sanitize`] first.

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// Strips terminal escape sequences and escapes the remaining control
/// characters. Printable text, including non-ASCII, passes through unchanged.
///
/// The output contains no control characters, so running it through
/// `sanitize` again yields the same string.
pub fn sanitize(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ESC {
            if let Some(len) = escape_sequence_len(&chars[i..]) {
                i += len;
                continue;
            }
        }
        push_escaped(&mut out, c);
        i += 1;
    }
    out
}

/// Length of the escape sequence starting at `seq[0]` (which is ESC), or
/// `None` when the sequence is incomplete. An incomplete sequence leaves the
/// ESC to be hex-escaped and the rest to pass through as text.
fn escape_sequence_len(seq: &[char]) -> Option<usize> {
    match *seq.get(1)? {
        // CSI: parameters, intermediates, one final byte
        '[' => {
            let mut j = 2;
            while matches!(seq.get(j), Some('\x30'..='\x3f')) {
                j += 1;
            }
            while matches!(seq.get(j), Some('\x20'..='\x2f')) {
                j += 1;
            }
            match seq.get(j)? {
                '\x40'..='\x7e' => Some(j + 1),
                _ => None,
            }
        }
        // OSC: terminated by BEL or ST (ESC \)
        ']' => {
            let mut j = 2;
            while let Some(&c) = seq.get(j) {
                if c == BEL {
                    return Some(j + 1);
                }
                if c == ESC && seq.get(j + 1) == Some(&'\\') {
                    return Some(j + 2);
                }
                j += 1;
            }
            None
        }
        // nF: intermediates then a final byte, e.g. charset selection `ESC ( B`
        '\x20'..='\x2f' => {
            let mut j = 2;
            while matches!(seq.get(j), Some('\x20'..='\x2f')) {
                j += 1;
            }
            match seq.get(j)? {
                '\x30'..='\x7e' => Some(j + 1),
                _ => None,
            }
        }
        '\x30'..='\x7e' => Some(2),
        _ => None,
    }
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if is_control(c) => out.push_str(&format!("\\x{:02x}", c as u32)),
        c => out.push(c),
    }
}

fn is_control(c: char) -> bool {
    c < ' ' || c == '\x7f' || ('\u{80}'..='\u{9f}').contains(&c)
}
