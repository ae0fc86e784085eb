//! On-disk encoding for the append log and the bulk document.
//!
//! The append log (`stream.jsonl`) holds one compact JSON object per line. The
//! bulk document (`bulk.json`) is a single JSON object pretty-printed with
//! two-space indentation and no trailing newline.
//!
//! Decoding is tolerant by contract: the append log is trimmed by bytes, not by
//! records, so its first line may be a fragment (possibly not even valid UTF-8).
//! Such lines are skipped rather than reported.

use crate::error::Error;
use crate::types::{BulkDocument, Event};

/// Encode one event as an append log line, including the trailing `\n`.
///
/// # Errors
///
/// Returns [`Error::Encode`] if serialization fails.
pub fn encode_line(event: &Event) -> Result<Vec<u8>, Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode every parsable line of an append log.
///
/// Lines are split on `\n`, a trailing `\r` is stripped, blank lines are
/// ignored, and lines that do not parse as an [`Event`] are skipped. The result
/// keeps file order.
pub fn decode_lines(data: &[u8]) -> Vec<Event> {
    data.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| serde_json::from_slice::<Event>(line).ok())
        .collect()
}

/// Encode a bulk document in its stored, pretty-printed form.
///
/// # Errors
///
/// Returns [`Error::Encode`] if serialization fails.
pub fn encode_document(doc: &BulkDocument) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec_pretty(doc)?)
}

/// Decode a stored bulk document, or `None` if it is not valid JSON of the
/// expected shape.
pub fn decode_document(data: &[u8]) -> Option<BulkDocument> {
    serde_json::from_slice(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: i64, kind: &str) -> Event {
        Event {
            seq,
            kind: kind.to_string(),
            message: format!("message {seq}"),
            client_time: "2024-05-01T12:00:00Z".to_string(),
            user: "bob".to_string(),
            server_time: "2024-05-01T12:00:01.5Z".to_string(),
        }
    }

    #[test]
    fn encoded_line_is_single_line_with_newline() {
        let mut e = event(1, "click");
        e.message = "multi\nline".to_string();
        let line = encode_line(&e).expect("encode");
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(
            line.iter().filter(|b| **b == b'\n').count(),
            1,
            "embedded newlines must be escaped"
        );
    }

    #[test]
    fn decode_lines_keeps_file_order() {
        let mut data = Vec::new();
        for seq in 0..5 {
            data.extend(encode_line(&event(seq, "tick")).expect("encode"));
        }
        let decoded = decode_lines(&data);
        let seqs: Vec<i64> = decoded.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(decoded[2], event(2, "tick"));
    }

    #[test]
    fn decode_lines_skips_truncated_head() {
        let mut data = Vec::new();
        data.extend(encode_line(&event(1, "a")).expect("encode"));
        data.extend(encode_line(&event(2, "b")).expect("encode"));
        // Drop the first 7 bytes, as a byte-based trim would.
        let decoded = decode_lines(&data[7..]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].seq, 2);
    }

    #[test]
    fn decode_lines_tolerates_invalid_utf8_and_garbage() {
        let mut data = vec![0xE2, 0x82, b'}', b'\n'];
        data.extend(b"not json\n\n   \n{\"seq\":9}\r\n\"str\"\n");
        let decoded = decode_lines(&data);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].seq, 9);
    }

    #[test]
    fn decode_lines_of_empty_input_is_empty() {
        assert!(decode_lines(b"").is_empty());
        assert!(decode_lines(b"\n\n").is_empty());
    }

    #[test]
    fn document_is_pretty_printed_without_trailing_newline() {
        let doc = BulkDocument {
            events: vec![event(1, "a")],
            saved_at: "S".to_string(),
        };
        let bytes = encode_document(&doc).expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("{\n  \"events\": [\n    {\n      \"seq\": 1,"), "got: {text}");
        assert!(text.ends_with("\"savedAt\": \"S\"\n}"), "got: {text}");
        assert_eq!(decode_document(text.as_bytes()), Some(doc));
    }

    #[test]
    fn decode_document_rejects_garbage() {
        assert_eq!(decode_document(b"{\"events\": [ {\"seq\": 1"), None);
        assert_eq!(decode_document(b""), None);
        assert_eq!(decode_document(b"42"), None);
    }
}
