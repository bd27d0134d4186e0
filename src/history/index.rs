use tracing::debug;

use crate::errors::Result;
use crate::storage::EntryStore;
use crate::storage::models::ClipboardEntry;

#[derive(Debug, Default)]
enum IndexState {
    #[default]
    Uninitialized,
    Ready(Vec<i64>),
}

/// Entry identifiers, newest first. Built from the store on first use and
/// kept in step with creates and deletes afterwards.
#[derive(Debug, Default)]
pub struct FilenameIndex {
    state: IndexState,
}

impl FilenameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, IndexState::Ready(_))
    }

    pub fn ensure_initialized(&mut self, store: &dyn EntryStore) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let mut ids = store.list()?;
        // Numeric order, not the file names' lexicographic order.
        ids.sort_unstable_by(|a, b| b.cmp(a));
        debug!(entries = ids.len(), "built filename index");
        self.state = IndexState::Ready(ids);
        Ok(())
    }

    fn ready_mut(&mut self) -> Option<&mut Vec<i64>> {
        match &mut self.state {
            IndexState::Ready(ids) => Some(ids),
            IndexState::Uninitialized => None,
        }
    }

    pub fn on_create(&mut self, id: i64) {
        if let Some(ids) = self.ready_mut() {
            // A same-millisecond capture overwrote the file; keep one id.
            if !ids.contains(&id) {
                ids.insert(0, id);
            }
        }
    }

    pub fn on_delete(&mut self, id: i64) {
        if let Some(ids) = self.ready_mut()
            && let Some(pos) = ids.iter().position(|&x| x == id)
        {
            ids.remove(pos);
        }
    }

    pub fn ids(&self) -> &[i64] {
        match &self.state {
            IndexState::Ready(ids) => ids,
            IndexState::Uninitialized => &[],
        }
    }

    /// Ids whose entry satisfies `keep`, in index order. Entries that fail to
    /// load are left out.
    pub fn filter<F>(&self, store: &dyn EntryStore, mut keep: F) -> Vec<i64>
    where
        F: FnMut(&ClipboardEntry) -> bool,
    {
        self.ids()
            .iter()
            .copied()
            .filter(|&id| match store.load(id) {
                Ok(entry) => keep(&entry),
                Err(e) => {
                    debug!(id, error = %e, "skipping unreadable entry");
                    false
                }
            })
            .collect()
    }
}
