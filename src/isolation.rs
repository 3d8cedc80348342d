use serde::{Deserialize, Serialize};

/// Defines the isolation levels supported by the Folio document store.
///
/// Isolation levels decide which reads a transaction validates at commit time.
/// Writes are always validated against documents committed after the
/// transaction started, regardless of level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIsolation {
    /// **Read Committed:**
    ///
    /// Any document read is committed at the moment it is read, but reading the
    /// same id twice may return different versions if another session commits
    /// in between. Reads are not recorded and never cause an abort; only
    /// write-write conflicts are detected.
    ReadCommitted,
    /// **Repeatable Read:**
    ///
    /// The version of every document read is recorded in the transaction's read
    /// set. At commit, if any of those documents was modified or deleted by a
    /// concurrent commit, the transaction is aborted (or resolved according to
    /// the configured [`ConflictResolution`](crate::ConflictResolution)).
    ///
    /// This is the level the loan service relies on: a loan reads the book and
    /// the user, and commits only if neither changed underneath it.
    #[default]
    RepeatableRead,
}
