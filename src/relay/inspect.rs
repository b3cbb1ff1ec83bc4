//! Best-effort payload inspection for traffic logging.
//!
//! Inspection only observes: it never alters, delays or fails the data path.
//! The classifier looks at the first [`SNIFF_LEN`] bytes and decides whether
//! a chunk is printable text or opaque binary. Preview mode logs a short
//! excerpt; full-dump mode logs every byte between start/end markers.

use std::net::SocketAddr;

use tracing::{debug, info};

use super::connection::Direction;
use crate::config::LoggingConfig;

/// Bytes examined when classifying a payload.
pub const SNIFF_LEN: usize = 100;

/// Characters of decoded text shown in preview mode.
pub const PREVIEW_CHARS: usize = 200;

const MARKER: &str = "==================================================";

/// Classified payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Printable text, decoded with invalid sequences replaced.
    Text(String),
    /// Anything else, by length.
    Binary(usize),
}

/// Payload logging switches handed to both relays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log relayed payloads.
    pub log_data: bool,
    /// Log whole payloads instead of previews.
    pub full_dump: bool,
}

impl LogOptions {
    /// Whether payloads should be inspected at all. Full dump implies logging.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.log_data || self.full_dump
    }
}

impl From<&LoggingConfig> for LogOptions {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            log_data: config.log_data || config.full_dump,
            full_dump: config.full_dump,
        }
    }
}

/// Printable ASCII, tab, newline or carriage return.
#[inline]
#[must_use]
pub fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | b'\t' | b'\n' | b'\r')
}

/// Classify `data` by its first [`SNIFF_LEN`] bytes.
#[must_use]
pub fn classify(data: &[u8]) -> Payload {
    let sniffed = &data[..data.len().min(SNIFF_LEN)];
    if sniffed.iter().copied().all(is_text_byte) {
        Payload::Text(String::from_utf8_lossy(data).into_owned())
    } else {
        Payload::Binary(data.len())
    }
}

/// Space-separated lowercase hex of every byte.
#[must_use]
pub fn hex_dump(data: &[u8]) -> String {
    let encoded = hex::encode(data);
    let mut out = String::with_capacity(data.len() * 3);
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(pair.iter().map(|&c| char::from(c)));
    }
    out
}

/// Rendered log lines for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// One-line summary: direction, endpoints, size.
    pub summary: String,
    /// Preview line, or the bracketed full dump.
    pub body: Vec<String>,
    /// Text past the sniffed prefix contained invalid UTF-8.
    pub lossy: bool,
}

/// Render the log lines for `data` without emitting them.
#[must_use]
pub fn render(
    data: &[u8],
    source: SocketAddr,
    dest: SocketAddr,
    direction: Direction,
    full_dump: bool,
) -> Inspection {
    let summary = format!("[{direction}] {source} -> {dest} ({} bytes)", data.len());

    match classify(data) {
        Payload::Text(decoded) => {
            let lossy = std::str::from_utf8(data).is_err();
            let body = if full_dump {
                bracketed(format!("FULL DATA [{direction}]"), decoded)
            } else {
                let preview: String = decoded.chars().take(PREVIEW_CHARS).collect();
                vec![format!("Data preview: {preview}...")]
            };
            Inspection {
                summary,
                body,
                lossy,
            }
        },
        Payload::Binary(len) => {
            let body = if full_dump {
                bracketed(format!("FULL BINARY DATA [{direction}]"), hex_dump(data))
            } else {
                vec![format!("Binary data: {len} bytes transferred")]
            };
            Inspection {
                summary,
                body,
                lossy: false,
            }
        },
    }
}

fn bracketed(title: String, content: String) -> Vec<String> {
    vec![
        MARKER.to_string(),
        format!("{title} START"),
        MARKER.to_string(),
        content,
        MARKER.to_string(),
        format!("{title} END"),
        MARKER.to_string(),
    ]
}

/// Log `data` as seen travelling from `source` to `dest`.
///
/// The summary is logged at info, the payload lines at debug.
pub fn inspect(
    data: &[u8],
    source: SocketAddr,
    dest: SocketAddr,
    direction: Direction,
    full_dump: bool,
) {
    let inspection = render(data, source, dest, direction, full_dump);

    info!("{}", inspection.summary);
    if inspection.lossy {
        debug!(%direction, "Payload contained invalid UTF-8; undecodable bytes replaced");
    }
    for line in &inspection.body {
        debug!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn make_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn test_printable_ascii_is_text() {
        let data: Vec<u8> = (0..100).map(|i| b'a' + (i % 26) as u8).collect();
        match classify(&data) {
            Payload::Text(text) => assert_eq!(text.len(), 100),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_whitespace_is_text() {
        let data = b"GET / HTTP/1.1\r\n\tHost: example\r\n\r\n";
        assert!(matches!(classify(data), Payload::Text(_)));
    }

    #[test]
    fn test_nul_byte_is_binary() {
        let data = b"hello\0world";
        assert_eq!(classify(data), Payload::Binary(11));
    }

    #[test]
    fn test_only_prefix_is_sniffed() {
        let mut data = vec![b'x'; SNIFF_LEN];
        data.push(0x00);
        assert!(matches!(classify(&data), Payload::Text(_)));

        let mut data = vec![b'x'; SNIFF_LEN - 1];
        data.push(0x00);
        assert_eq!(classify(&data), Payload::Binary(SNIFF_LEN));
    }

    #[test]
    fn test_empty_payload_is_text() {
        assert_eq!(classify(&[]), Payload::Text(String::new()));
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x00, 0xff, 0x1a]), "00 ff 1a");
        assert_eq!(hex_dump(&[0x7f]), "7f");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_render_follows_classifier() {
        let mut late_nul = vec![b'x'; SNIFF_LEN];
        late_nul.push(0x00);
        let preview = render(&late_nul, make_addr(1), make_addr(2), Direction::ClientToTarget, false);
        assert!(matches!(classify(&late_nul), Payload::Text(_)));
        assert!(preview.body[0].starts_with("Data preview: xxx"));

        let early_nul = b"\0abc";
        let preview = render(early_nul, make_addr(1), make_addr(2), Direction::ClientToTarget, false);
        assert_eq!(classify(early_nul), Payload::Binary(4));
        assert_eq!(preview.body, vec!["Binary data: 4 bytes transferred".to_string()]);
    }

    #[test]
    fn test_log_options_from_config() {
        let config = LoggingConfig {
            full_dump: true,
            ..LoggingConfig::default()
        };
        let options = LogOptions::from(&config);
        assert!(options.log_data);
        assert!(options.full_dump);
        assert!(options.enabled());
        assert!(!LogOptions::default().enabled());
    }

    #[test]
    fn test_render_summary() {
        let inspection = render(
            b"ping",
            make_addr(5000),
            make_addr(80),
            Direction::ClientToTarget,
            false,
        );
        assert_eq!(
            inspection.summary,
            "[CLIENT->TARGET] 127.0.0.1:5000 -> 127.0.0.1:80 (4 bytes)"
        );
        assert_eq!(inspection.body, vec!["Data preview: ping...".to_string()]);
    }

    #[test]
    fn test_preview_is_bounded() {
        let data = vec![b'a'; 1000];
        let inspection = render(
            &data,
            make_addr(1),
            make_addr(2),
            Direction::ClientToTarget,
            false,
        );
        let expected = format!("Data preview: {}...", "a".repeat(PREVIEW_CHARS));
        assert_eq!(inspection.body, vec![expected]);
    }

    #[test]
    fn test_full_text_dump_is_complete() {
        let data = "line one\nline two\n".repeat(50);
        let inspection = render(
            data.as_bytes(),
            make_addr(1),
            make_addr(2),
            Direction::TargetToClient,
            true,
        );
        assert_eq!(inspection.body.len(), 7);
        assert_eq!(inspection.body[1], "FULL DATA [TARGET->CLIENT] START");
        assert_eq!(inspection.body[3], data);
        assert_eq!(inspection.body[5], "FULL DATA [TARGET->CLIENT] END");
    }

    #[test]
    fn test_full_binary_dump_is_complete() {
        let data: Vec<u8> = (0..=255).collect();
        let inspection = render(
            &data,
            make_addr(1),
            make_addr(2),
            Direction::ClientToTarget,
            true,
        );
        assert_eq!(inspection.body[1], "FULL BINARY DATA [CLIENT->TARGET] START");
        let dumped: Vec<&str> = inspection.body[3].split(' ').collect();
        assert_eq!(dumped.len(), 256);
        assert_eq!(dumped[0], "00");
        assert_eq!(dumped[255], "ff");
    }

    #[test]
    fn test_full_dump_is_superset_of_preview() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let binary: Vec<u8> = (0..600u32).map(|i| (i % 7) as u8).collect();

        for data in [text.as_bytes(), binary.as_slice()] {
            let preview = render(data, make_addr(1), make_addr(2), Direction::ClientToTarget, false);
            let full = render(data, make_addr(1), make_addr(2), Direction::ClientToTarget, true);
            assert_eq!(preview.summary, full.summary);

            let full_content = &full.body[3];
            match classify(data) {
                Payload::Text(decoded) => {
                    assert_eq!(full_content, &decoded);
                    let shown = preview.body[0]
                        .strip_prefix("Data preview: ")
                        .and_then(|s| s.strip_suffix("..."))
                        .unwrap();
                    assert!(full_content.starts_with(shown));
                    assert!(full_content.len() > shown.len());
                },
                Payload::Binary(len) => {
                    assert_eq!(preview.body[0], format!("Binary data: {len} bytes transferred"));
                    assert_eq!(full_content.split(' ').count(), len);
                },
            }
        }
    }

    #[test]
    fn test_invalid_utf8_after_prefix_is_lossy() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.extend_from_slice(&[0xff, 0xfe]);
        let inspection = render(&data, make_addr(1), make_addr(2), Direction::ClientToTarget, true);
        assert!(inspection.lossy);
        assert!(inspection.body[3].contains('\u{fffd}'));
    }

    #[test]
    fn test_inspect_does_not_panic() {
        inspect(&[0, 1, 2], make_addr(1), make_addr(2), Direction::ClientToTarget, true);
        inspect(b"text", make_addr(1), make_addr(2), Direction::TargetToClient, false);
    }
}
