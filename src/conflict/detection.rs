use ahash::AHashMap as HashMap;

use crate::TransactionIsolation;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::document::DocumentId;
use crate::transaction::StagedChange;

/// Represents the type of conflict detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The transaction read a document that was modified by another transaction.
    ReadWrite,
    /// The transaction attempted to overwrite a document that was modified by another transaction.
    WriteWrite,
    /// The transaction read a document that was deleted by another transaction.
    ReadDelete,
}

/// Checks a transaction's read and write sets against the transaction buffer.
///
/// This is the validation half of optimistic concurrency control. It must run
/// under the store's commit lock so that nothing is published between
/// validation and apply. Returns a map of conflicting ids and the type of
/// conflict; an empty map means the transaction may commit as-is.
///
/// A written id is checked against the version the transaction read, or, for
/// a blind write, against `snapshot_etag`: the latest commit published when the
/// transaction started. Field patches are excluded: they are applied against
/// whatever version is current at commit time.
pub fn detect_conflicts(
    snapshot_etag: u64,
    isolation_level: TransactionIsolation,
    read_set: &HashMap<DocumentId, u64>,
    write_set: &HashMap<DocumentId, StagedChange>,
    txn_buffer: &TxnBuffer,
) -> HashMap<DocumentId, ConflictType> {
    let mut conflicts: HashMap<DocumentId, ConflictType> = HashMap::new();

    if isolation_level == TransactionIsolation::RepeatableRead {
        for (key, read_version) in read_set {
            match txn_buffer.get(key) {
                Some(current_value) if current_value.version() > *read_version => {
                    // Modified, or inserted where this transaction saw nothing.
                    conflicts.insert(key.clone(), ConflictType::ReadWrite);
                }
                None if *read_version != 0 => {
                    conflicts.insert(key.clone(), ConflictType::ReadDelete);
                }
                _ => {}
            }
        }
    }

    for (key, change) in write_set {
        if matches!(change, StagedChange::Patch(_)) || conflicts.contains_key(key) {
            continue;
        }
        if let Some(current_value) = txn_buffer.get(key) {
            let seen_version = read_set.get(key).copied().unwrap_or(snapshot_etag);
            if current_value.version() > seen_version {
                conflicts.insert(key.clone(), ConflictType::WriteWrite);
            }
        }
    }

    conflicts
}
