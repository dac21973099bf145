//! Wire formats for file records.
//!
//! Both file formats are UTF-8 text with one record per line, newline
//! terminated. Signature records are sentinel lines interleaved with the
//! data lines: JSON files use an object whose first key is `_signature`,
//! CSV files use a `#sig,`-prefixed row. Rendering is deterministic so
//! that retried batches and the signature chain see identical bytes.

use serde_json::Value;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::sign::SignatureRecord;

const JSON_SIGNATURE_PREFIX: &str = "{\"_signature\":";
const CSV_SIGNATURE_PREFIX: &str = "#sig,";

/// Record format for file sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// One JSON object per line.
    Json,
    /// One `_id,timestamp,payload` row per line, RFC 4180 quoting.
    Csv,
}

impl RecordFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Render one event as a single line, without the trailing newline.
    pub fn render_event(self, event: &AuditEvent) -> Result<String, AuditError> {
        match self {
            Self::Json => Ok(serde_json::to_string(event)?),
            Self::Csv => {
                let payload = serde_json::to_string(&event.fields)?;
                Ok(format!(
                    "{},{},{}",
                    csv_quote(&event.id),
                    csv_quote(&event.timestamp),
                    csv_quote(&payload)
                ))
            }
        }
    }

    /// Parse one data line back into an event. Returns `None` for
    /// signature lines and lines that do not parse.
    pub fn parse_event(self, line: &str) -> Option<AuditEvent> {
        if self.is_signature_line(line) {
            return None;
        }
        match self {
            Self::Json => serde_json::from_str(line).ok(),
            Self::Csv => {
                let columns = csv_split(line)?;
                let [id, timestamp, payload]: [String; 3] = columns.try_into().ok()?;
                let fields = serde_json::from_str(&payload).ok()?;
                Some(AuditEvent {
                    id,
                    timestamp,
                    fields,
                })
            }
        }
    }

    /// Render a signature record as a single line, without the newline.
    pub fn render_signature(self, record: &SignatureRecord) -> String {
        match self {
            Self::Json => format!(
                "{}{},\"covers\":{},\"signedAt\":{}}}",
                JSON_SIGNATURE_PREFIX,
                Value::String(record.signature.clone()),
                record.covers,
                Value::String(record.signed_at.clone()),
            ),
            Self::Csv => format!(
                "{}{},{},{}",
                CSV_SIGNATURE_PREFIX, record.signature, record.covers, record.signed_at
            ),
        }
    }

    /// Parse a signature sentinel line.
    pub fn parse_signature(self, line: &str) -> Option<SignatureRecord> {
        if !self.is_signature_line(line) {
            return None;
        }
        match self {
            Self::Json => {
                let value: Value = serde_json::from_str(line).ok()?;
                Some(SignatureRecord {
                    signature: value.get("_signature")?.as_str()?.to_string(),
                    covers: value.get("covers")?.as_u64()?,
                    signed_at: value.get("signedAt")?.as_str()?.to_string(),
                })
            }
            Self::Csv => {
                let rest = line.strip_prefix(CSV_SIGNATURE_PREFIX)?;
                let mut parts = rest.splitn(3, ',');
                Some(SignatureRecord {
                    signature: parts.next()?.to_string(),
                    covers: parts.next()?.parse().ok()?,
                    signed_at: parts.next()?.to_string(),
                })
            }
        }
    }

    /// Whether the line is a signature sentinel rather than a data record.
    pub fn is_signature_line(self, line: &str) -> bool {
        match self {
            Self::Json => line.starts_with(JSON_SIGNATURE_PREFIX),
            Self::Csv => line.starts_with(CSV_SIGNATURE_PREFIX),
        }
    }
}

fn csv_quote(field: &str) -> String {
    // a bare leading '#' could collide with the signature sentinel prefix
    if field.starts_with('#') || field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_split(line: &str) -> Option<Vec<String>> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => quoted = false,
                _ => current.push(c),
            }
        } else {
            match c {
                '"' if current.is_empty() => quoted = true,
                ',' => columns.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
    }
    if quoted {
        return None;
    }
    columns.push(current);
    Some(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> AuditEvent {
        AuditEvent::builder()
            .id("evt-1")
            .field("userId", "alice")
            .field("status", "SUCCESSFUL")
            .build()
    }

    #[test]
    fn json_lines_round_trip() {
        let event = sample_event();
        let line = RecordFormat::Json.render_event(&event).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(RecordFormat::Json.parse_event(&line).unwrap(), event);
    }

    #[test]
    fn csv_rows_round_trip() {
        let event = AuditEvent::builder()
            .id("evt,with\"odd chars")
            .field("note", "hello, world")
            .build();
        let line = RecordFormat::Csv.render_event(&event).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(RecordFormat::Csv.parse_event(&line).unwrap(), event);
    }

    #[test]
    fn signature_lines_are_distinguishable() {
        let record = SignatureRecord {
            signature: "ab12".into(),
            covers: 512,
            signed_at: "2026-01-01T00:00:00.000Z".into(),
        };
        for format in [RecordFormat::Json, RecordFormat::Csv] {
            let line = format.render_signature(&record);
            assert!(format.is_signature_line(&line));
            assert!(format.parse_event(&line).is_none());
            assert_eq!(format.parse_signature(&line).unwrap(), record);
        }
    }

    #[test]
    fn hash_prefixed_ids_stay_data_rows() {
        let event = AuditEvent::builder()
            .id("#sig")
            .field("note", "adversarial id")
            .build();
        let line = RecordFormat::Csv.render_event(&event).unwrap();
        assert!(!RecordFormat::Csv.is_signature_line(&line));
        assert_eq!(RecordFormat::Csv.parse_event(&line).unwrap(), event);
    }

    #[test]
    fn data_lines_are_not_signature_lines() {
        let event = sample_event();
        for format in [RecordFormat::Json, RecordFormat::Csv] {
            let line = format.render_event(&event).unwrap();
            assert!(!format.is_signature_line(&line));
        }
    }
}
