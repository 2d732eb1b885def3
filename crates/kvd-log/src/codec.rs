// ABOUTME: Wire codec for the file-backed log: percent-escaped, tab-separated records.
// ABOUTME: One line per event; framing characters never appear unescaped.

use kvd_core::{Event, EventType};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::TransactionLogError;

/// Everything outside `[A-Za-z0-9-_.~]` is escaped — tabs and newlines
/// included — so a record's framing survives arbitrary key/value text.
const ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Render one event as its persisted line, newline terminator included:
/// sequence, event type code, encoded key, encoded value, tab-separated.
pub fn encode_line(event: &Event) -> String {
    format!(
        "{}\t{}\t{}\t{}\n",
        event.sequence,
        event.event_type.code(),
        utf8_percent_encode(&event.key, ESCAPE),
        utf8_percent_encode(&event.value, ESCAPE),
    )
}

/// Parse one line (terminator already stripped) back into an event.
/// `line_no` is 1-based and used only for error context.
pub fn parse_line(line: &str, line_no: u64) -> Result<Event, TransactionLogError> {
    let malformed = |reason: &str| TransactionLogError::MalformedRecord {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut fields = line.split('\t');
    let sequence = fields.next().ok_or_else(|| malformed("missing sequence field"))?;
    let type_code = fields.next().ok_or_else(|| malformed("missing event type field"))?;
    let key = fields.next().ok_or_else(|| malformed("missing key field"))?;
    let value = fields.next().ok_or_else(|| malformed("missing value field"))?;
    if fields.next().is_some() {
        return Err(malformed("expected exactly four tab-separated fields"));
    }

    let sequence: u64 = sequence
        .parse()
        .map_err(|_| malformed("sequence is not an unsigned integer"))?;
    let code: u8 = type_code
        .parse()
        .map_err(|_| malformed("event type is not an integer"))?;
    let event_type =
        EventType::from_code(code).ok_or(TransactionLogError::UnknownEventType(code))?;

    Ok(Event {
        sequence,
        event_type,
        key: decode_field(key, line_no, "key")?,
        value: decode_field(value, line_no, "value")?,
    })
}

fn decode_field(raw: &str, line_no: u64, field: &str) -> Result<String, TransactionLogError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| TransactionLogError::MalformedRecord {
            line: line_no,
            reason: format!("{field} does not decode to valid UTF-8"),
        })
}
