use serde::{Deserialize, Serialize};

/// Defines how conflicts should be resolved during transaction commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Drop the conflicting changes of the committing transaction and commit the rest.
    Ignore,
    /// Overwrite the concurrently committed documents with this transaction's changes.
    Replace,
    /// Fail the transaction if a conflict is detected.
    #[default]
    Fail,
}
