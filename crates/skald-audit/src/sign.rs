//! Tamper-evident signature chain.
//!
//! A file sink periodically appends a signature record covering exactly
//! the bytes written since the previous signature point. Each signature
//! mixes the previous signature and the record's own `covers` and
//! `signed_at` metadata into its input, so the records form a chain:
//! verifying front-to-back detects any edit or truncation of the signed
//! portion of the file, including edits to the signature records
//! themselves.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::error::AuditError;
use crate::format::RecordFormat;

/// Black-box signing capability. Implementations must be deterministic.
pub trait Signer: Send + Sync {
    /// Compute a signature over `data`.
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}

/// Keyed BLAKE3 signer.
pub struct Blake3Signer {
    key: [u8; 32],
}

impl Blake3Signer {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl Signer for Blake3Signer {
    fn sign(&self, data: &[u8]) -> Vec<u8> {
        blake3::keyed_hash(&self.key, data).as_bytes().to_vec()
    }
}

/// One signature record, stored as a sentinel line in the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Hex-encoded signature over the previous signature plus the
    /// unsigned span.
    pub signature: String,
    /// Length in bytes of the span this signature covers.
    pub covers: u64,
    /// When the signature was taken, RFC 3339.
    pub signed_at: String,
}

/// Running chain state for one file.
pub struct ChainSigner {
    signer: Arc<dyn Signer>,
    prev: String,
}

impl ChainSigner {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            prev: String::new(),
        }
    }

    /// Sign the span of bytes appended since the previous signature
    /// point and advance the chain.
    pub fn sign_span(&mut self, span: &[u8]) -> SignatureRecord {
        let covers = span.len() as u64;
        let signed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature =
            chain_signature(self.signer.as_ref(), &self.prev, covers, &signed_at, span);
        self.prev = signature.clone();
        SignatureRecord {
            signature,
            covers,
            signed_at,
        }
    }

    /// Restart the chain, e.g. after rotating to a fresh file.
    pub fn reset(&mut self) {
        self.prev.clear();
    }

    /// Resume a chain from the last signature found in an existing file.
    pub fn resume(&mut self, prev: String) {
        self.prev = prev;
    }
}

fn chain_signature(
    signer: &dyn Signer,
    prev: &str,
    covers: u64,
    signed_at: &str,
    span: &[u8],
) -> String {
    // the record's metadata is part of the input, so an after-the-fact
    // edit of covers or signed_at breaks the chain too
    let mut input = Vec::with_capacity(prev.len() + 8 + signed_at.len() + span.len());
    input.extend_from_slice(prev.as_bytes());
    input.extend_from_slice(&covers.to_be_bytes());
    input.extend_from_slice(signed_at.as_bytes());
    input.extend_from_slice(span);
    hex::encode(signer.sign(&input))
}

/// Outcome of verifying a file's signature chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    /// Signatures verified.
    pub signatures: usize,
    /// Bytes after the last signature point (zero for a closed chain).
    pub unsigned_tail_bytes: u64,
}

impl ChainVerification {
    /// Whether the file ends on a signature record.
    pub fn is_closed(&self) -> bool {
        self.unsigned_tail_bytes == 0
    }
}

/// Verify the signature chain of a log file front-to-back.
pub fn verify_chain(
    path: impl AsRef<Path>,
    format: RecordFormat,
    signer: &dyn Signer,
) -> Result<ChainVerification, AuditError> {
    let bytes = fs::read(path.as_ref())?;
    let mut signatures = 0usize;
    let mut prev = String::new();
    let mut span_start = 0usize;
    let mut line_start = 0usize;

    for (i, b) in bytes.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        let line = std::str::from_utf8(&bytes[line_start..i])
            .map_err(|e| AuditError::SinkFailure(format!("log file is not UTF-8: {e}")))?;
        if format.is_signature_line(line) {
            let record = format.parse_signature(line).ok_or(AuditError::SignatureMismatch {
                offset: line_start as u64,
            })?;
            let span = &bytes[span_start..line_start];
            let expected =
                chain_signature(signer, &prev, record.covers, &record.signed_at, span);
            if record.signature != expected || record.covers != span.len() as u64 {
                return Err(AuditError::SignatureMismatch {
                    offset: line_start as u64,
                });
            }
            signatures += 1;
            prev = record.signature;
            span_start = i + 1;
        }
        line_start = i + 1;
    }

    Ok(ChainVerification {
        signatures,
        unsigned_tail_bytes: (bytes.len() - span_start) as u64,
    })
}
