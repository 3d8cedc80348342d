/// Lock-free buffer of the latest committed documents.
pub mod txn_buffer;
/// Documents tagged with the etag that committed them.
pub mod versioned_value;
