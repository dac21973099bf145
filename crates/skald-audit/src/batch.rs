//! Batch assembly.
//!
//! A batch is the unit of delivery: an ordered run of rendered records
//! concatenated into one payload. Assembly is deterministic — the same
//! dequeued records always produce the same payload bytes — which the
//! signature chain and idempotent retries both rely on.

use crate::queue::QueuedRecord;

/// One assembled batch, alive between dequeue and sink acknowledgment.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Concatenated records, each terminated by a newline.
    pub payload: String,
    /// Identifiers of the contained events, in offer order.
    pub ids: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Assembles dequeued records into a delivery payload.
#[derive(Debug, Clone, Copy)]
pub struct BatchAssembler {
    average_event_size: usize,
}

impl BatchAssembler {
    pub fn new(average_event_size: usize) -> Self {
        Self { average_event_size }
    }

    pub fn assemble(&self, records: Vec<QueuedRecord>) -> Batch {
        let mut payload =
            String::with_capacity(self.average_event_size.saturating_mul(records.len()));
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            payload.push_str(&record.line);
            payload.push('\n');
            ids.push(record.id);
        }
        Batch { payload, ids }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, line: &str) -> QueuedRecord {
        QueuedRecord {
            id: id.to_string(),
            line: line.to_string(),
        }
    }

    #[test]
    fn concatenates_in_order_with_newlines() {
        let assembler = BatchAssembler::new(64);
        let batch = assembler.assemble(vec![record("1", "{\"a\":1}"), record("2", "{\"b\":2}")]);
        assert_eq!(batch.payload, "{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(batch.ids, ["1", "2"]);
        assert_eq!(batch.byte_len(), 16);
    }

    #[test]
    fn empty_input_yields_an_empty_batch() {
        let assembler = BatchAssembler::new(8);
        let batch = assembler.assemble(Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.byte_len(), 0);
    }

    #[test]
    fn assembly_is_deterministic() {
        let assembler = BatchAssembler::new(8);
        let records = || vec![record("1", "x"), record("2", "y")];
        assert_eq!(
            assembler.assemble(records()).payload,
            assembler.assemble(records()).payload
        );
    }
}
