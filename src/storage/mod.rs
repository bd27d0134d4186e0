pub mod files;
pub mod models;

use crate::errors::Result;
use models::ClipboardEntry;

/// Persistence for individual entries, keyed by timestamp.
pub trait EntryStore {
    /// Writes the whole record, replacing any entry with the same timestamp.
    fn save(&self, entry: &ClipboardEntry) -> Result<()>;
    /// `NotFound` when absent, `Corrupt` when the record does not parse.
    fn load(&self, id: i64) -> Result<ClipboardEntry>;
    /// Returns false when there was nothing to delete.
    fn delete(&self, id: i64) -> Result<bool>;
    /// Every stored identifier, in no particular order.
    fn list(&self) -> Result<Vec<i64>>;
}
