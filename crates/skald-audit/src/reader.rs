//! Linear file scans for the read path.
//!
//! The reader opens the topic's current file at call time and scans the
//! handle it opened. Rotation only ever renames a file, so a scan that
//! races a rotation keeps reading the (now archived) file undisturbed to
//! completion. An event written just after the rotation appears only in
//! the new file — a best-effort consistency window, not a snapshot.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::format::RecordFormat;

/// Result of a filtered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    /// Number of records that matched the predicate.
    pub matches: usize,
    /// `true` when the whole file was scanned, so `matches` is the exact
    /// total. `false` when the result callback stopped the scan early.
    pub exact: bool,
}

/// Reader over one topic's current file.
pub struct EventReader {
    path: PathBuf,
    format: RecordFormat,
}

impl EventReader {
    pub fn new(path: impl Into<PathBuf>, format: RecordFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Point lookup by event identifier.
    pub fn read_event(&self, id: &str) -> Result<AuditEvent, AuditError> {
        let reader = BufReader::new(File::open(&self.path)?);
        for line in reader.lines() {
            let line = line?;
            if let Some(event) = self.format.parse_event(&line) {
                if event.id == id {
                    return Ok(event);
                }
            }
        }
        Err(AuditError::NotFound(id.to_string()))
    }

    /// Predicate-filtered scan. `on_match` is invoked per matching event
    /// and may return `false` to stop early, in which case the returned
    /// total is partial.
    pub fn query_events(
        &self,
        predicate: impl Fn(&AuditEvent) -> bool,
        mut on_match: impl FnMut(&AuditEvent) -> bool,
    ) -> Result<QueryResult, AuditError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut matches = 0usize;
        for line in reader.lines() {
            let line = line?;
            let Some(event) = self.format.parse_event(&line) else {
                // signature sentinel or malformed line
                continue;
            };
            if predicate(&event) {
                matches += 1;
                if !on_match(&event) {
                    return Ok(QueryResult {
                        matches,
                        exact: false,
                    });
                }
            }
        }
        Ok(QueryResult {
            matches,
            exact: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.audit.json");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    #[test]
    fn point_lookup_finds_record() {
        let (_dir, path) = write_log(&[
            r#"{"_id":"a","timestamp":"t","status":"ok"}"#,
            r#"{"_id":"b","timestamp":"t","status":"failed"}"#,
        ]);
        let reader = EventReader::new(path, RecordFormat::Json);
        let event = reader.read_event("b").unwrap();
        assert_eq!(event.field("status"), Some("failed".into()));
        assert!(matches!(
            reader.read_event("missing"),
            Err(AuditError::NotFound(_))
        ));
    }

    #[test]
    fn query_counts_exactly_and_skips_signature_lines() {
        let (_dir, path) = write_log(&[
            r#"{"_id":"a","timestamp":"t","status":"ok"}"#,
            r#"{"_signature":"ff","covers":40,"signedAt":"t"}"#,
            r#"{"_id":"b","timestamp":"t","status":"ok"}"#,
            r#"{"_id":"c","timestamp":"t","status":"failed"}"#,
        ]);
        let reader = EventReader::new(path, RecordFormat::Json);
        let mut seen = Vec::new();
        let result = reader
            .query_events(
                |e| e.field("status") == Some("ok".into()),
                |e| {
                    seen.push(e.id.clone());
                    true
                },
            )
            .unwrap();
        assert_eq!(result, QueryResult { matches: 2, exact: true });
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn early_termination_reports_partial_total() {
        let (_dir, path) = write_log(&[
            r#"{"_id":"a","timestamp":"t"}"#,
            r#"{"_id":"b","timestamp":"t"}"#,
            r#"{"_id":"c","timestamp":"t"}"#,
        ]);
        let reader = EventReader::new(path, RecordFormat::Json);
        let result = reader.query_events(|_| true, |_| false).unwrap();
        assert_eq!(result, QueryResult { matches: 1, exact: false });
    }
}
