// Glue over the replicated document (yrs). The document itself is created
// and owned by the embedding application; the provider only merges remote
// updates into it and summarizes its state for the handshake.

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Origin, ReadTxn, Transact, Update};

use crate::error::ApplyError;

/// Merge encoded update bytes into `doc` inside a transaction tagged with
/// `origin`, so update observers can tell the merge apart from local edits.
pub fn apply_update(doc: &Doc, origin: &Origin, update: &[u8]) -> Result<(), ApplyError> {
    let decoded = Update::decode_v1(update).map_err(|error| ApplyError::Decode {
        detail: error.to_string(),
    })?;
    doc.transact_mut_with(origin.clone())
        .apply_update(decoded)
        .map_err(|error| ApplyError::Merge {
            detail: error.to_string(),
        })?;
    Ok(())
}

/// Compact summary of which updates this replica has already seen.
pub fn encode_state_vector(doc: &Doc) -> Vec<u8> {
    doc.transact().state_vector().encode_v1()
}
