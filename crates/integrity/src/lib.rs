//! Tradeflow Integrity - Stored file verification
//!
//! Files live behind the [`BlobStore`] seam. The verifier re-reads a
//! document's bytes, hashes them without holding any lock, then takes the
//! transaction lock only to compare against the recorded hash, latch
//! `is_compromised` on mismatch and append `VERIFY_OK` / `VERIFY_FAILED`.

pub mod blob;
pub mod digest;
pub mod error;
pub mod verifier;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use digest::sha256_hex;
pub use error::{IntegrityError, IntegrityResult};
pub use verifier::{IntegrityVerifier, VerificationReport};
