//! Clipboard history: the entry store plus the two derived caches.
//!
//! [`History`] is built once per process and passed by `&mut` to everything
//! that reads or changes the history. Both caches start uninitialized and are
//! filled from disk on first access; after that they are only updated
//! incrementally by the operations below.

pub mod index;
pub mod tags;

use tracing::{debug, info, warn};

use crate::config::AppPaths;
use crate::errors::{ClipError, Result};
use crate::storage::EntryStore;
use crate::storage::files::FileStore;
use crate::storage::models::{ClipboardEntry, SearchQuery};
use index::FilenameIndex;
use tags::TagIndex;

pub struct History {
    store: Box<dyn EntryStore>,
    index: FilenameIndex,
    tags: TagIndex,
}

fn normalize_tag(tag: &str) -> Result<&str> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(ClipError::InvalidInput("Tag must not be empty".to_string()));
    }
    Ok(tag)
}

impl History {
    pub fn new(store: Box<dyn EntryStore>, tags: TagIndex) -> Self {
        Self {
            store,
            index: FilenameIndex::new(),
            tags,
        }
    }

    /// File-backed history under `paths.history_dir`.
    pub fn open(paths: &AppPaths) -> Result<Self> {
        let store = FileStore::open(&paths.history_dir)?;
        Ok(Self::new(Box::new(store), TagIndex::new(&paths.tags_file)))
    }

    /// Builds both caches now instead of on first use.
    pub fn initialize(&mut self) -> Result<()> {
        self.index.ensure_initialized(self.store.as_ref())?;
        self.tags.ensure_initialized();
        Ok(())
    }

    fn ensure_index(&mut self) -> Result<()> {
        self.index.ensure_initialized(self.store.as_ref())
    }

    // ── Entries ────────────────────────────────────────────────────

    /// Persists a new entry and puts it at the front of the index.
    pub fn create(&mut self, entry: &ClipboardEntry) -> Result<()> {
        self.ensure_index()?;
        self.store.save(entry)?;
        self.index.on_create(entry.timestamp);
        info!(id = entry.timestamp, "stored clipboard entry");
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<ClipboardEntry> {
        self.store.load(id)
    }

    /// Removes an entry and releases its tags. A missing entry is a no-op.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        self.ensure_index()?;
        let entry = match self.store.load(id) {
            Ok(entry) => Some(entry),
            Err(ClipError::NotFound(_)) => return Ok(false),
            Err(e) if e.is_absent() => {
                warn!(id, error = %e, "deleting unreadable entry, its tags stay counted until rebuilt");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(entry) = &entry {
            for tag in &entry.tags {
                self.tags.remove_one(tag);
            }
        }
        let removed = self.store.delete(id)?;
        if removed {
            self.index.on_delete(id);
            info!(id, "deleted clipboard entry");
        }
        Ok(removed)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Matching identifiers, newest first. An empty query does no per-entry I/O.
    pub fn list_ids(&mut self, query: &SearchQuery) -> Result<Vec<i64>> {
        self.ensure_index()?;
        if query.is_empty() {
            return Ok(self.index.ids().to_vec());
        }
        Ok(self
            .index
            .filter(self.store.as_ref(), |entry| query.matches(entry)))
    }

    pub fn count(&mut self, query: &SearchQuery) -> Result<usize> {
        self.list_ids(query).map(|ids| ids.len())
    }

    /// Newest matching entry, or [`ClipboardEntry::empty`].
    pub fn most_recent(&mut self, query: &SearchQuery) -> Result<ClipboardEntry> {
        let ids = self.list_ids(query)?;
        Ok(ids
            .iter()
            .find_map(|&id| self.store.load(id).ok())
            .unwrap_or_else(ClipboardEntry::empty))
    }

    /// Entries `[start, start + size)` of the matching list. Entries that fail
    /// to load are dropped, so the page may be short.
    pub fn batch(
        &mut self,
        start: usize,
        size: usize,
        query: &SearchQuery,
    ) -> Result<Vec<ClipboardEntry>> {
        let ids = self.list_ids(query)?;
        let page = ids.iter().skip(start).take(size);
        Ok(page
            .filter_map(|&id| match self.store.load(id) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(id, error = %e, "dropping entry from page");
                    None
                }
            })
            .collect())
    }

    // ── Tags ───────────────────────────────────────────────────────

    /// Returns false when the entry already has the tag or does not exist.
    pub fn add_tag(&mut self, id: i64, tag: &str) -> Result<bool> {
        let tag = normalize_tag(tag)?;
        let mut entry = match self.store.load(id) {
            Ok(entry) => entry,
            Err(e) if e.is_absent() => return Ok(false),
            Err(e) => return Err(e),
        };
        if entry.has_tag(tag) {
            return Ok(false);
        }
        entry.tags.push(tag.to_string());
        self.store.save(&entry)?;
        self.tags.push(tag);
        debug!(id, tag, "added tag");
        Ok(true)
    }

    /// Returns false when the entry does not hold the tag or does not exist.
    pub fn remove_tag(&mut self, id: i64, tag: &str) -> Result<bool> {
        let tag = normalize_tag(tag)?;
        let mut entry = match self.store.load(id) {
            Ok(entry) => entry,
            Err(e) if e.is_absent() => return Ok(false),
            Err(e) => return Err(e),
        };
        if !entry.has_tag(tag) {
            return Ok(false);
        }
        entry.tags.retain(|t| t != tag);
        self.store.save(&entry)?;
        self.tags.remove_one(tag);
        debug!(id, tag, "removed tag");
        Ok(true)
    }

    /// Every tag held by at least one entry, sorted.
    pub fn all_tags(&mut self) -> Vec<String> {
        self.tags.all()
    }

    /// Recomputes the tag multiset from every stored entry and rewrites the
    /// side file. Returns the number of tag occurrences found.
    pub fn rebuild_tags(&mut self) -> Result<usize> {
        self.ensure_index()?;
        let mut found = Vec::new();
        for &id in self.index.ids() {
            match self.store.load(id) {
                Ok(entry) => found.extend(entry.tags),
                Err(e) => debug!(id, error = %e, "skipping entry during tag rebuild"),
            }
        }
        let total = found.len();
        self.tags.replace(found);
        info!(occurrences = total, "rebuilt tag index");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_history() -> (TempDir, History) {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        let history = History::open(&paths).unwrap();
        (dir, history)
    }

    fn reopen(dir: &TempDir) -> History {
        History::open(&AppPaths::from_base(dir.path().to_path_buf())).unwrap()
    }

    fn text_entry(ts: i64, text: &str) -> ClipboardEntry {
        ClipboardEntry::new(text.to_string(), format!("<p>{text}</p>"), ts)
    }

    fn seed(history: &mut History, items: &[(i64, &str)]) {
        for &(ts, text) in items {
            history.create(&text_entry(ts, text)).unwrap();
        }
    }

    // --- Listing ---

    #[test]
    fn test_list_is_newest_first() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b"), (300, "c")]);
        let ids = history.list_ids(&SearchQuery::default()).unwrap();
        assert_eq!(ids, vec![300, 200, 100]);
    }

    #[test]
    fn test_cold_start_rebuilds_order() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (300, "c"), (200, "b")]);
        let mut fresh = reopen(&dir);
        let ids = fresh.list_ids(&SearchQuery::default()).unwrap();
        assert_eq!(ids, vec![300, 200, 100]);
    }

    #[test]
    fn test_save_sequence_is_strictly_descending() {
        let (_dir, mut history) = test_history();
        for ts in (1..=20).map(|i| 1_700_000_000_000 + i * 7) {
            history.create(&text_entry(ts, "x")).unwrap();
        }
        let ids = history.list_ids(&SearchQuery::default()).unwrap();
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_empty_store_most_recent_is_sentinel() {
        let (_dir, mut history) = test_history();
        let recent = history.most_recent(&SearchQuery::default()).unwrap();
        assert_eq!(recent, ClipboardEntry::empty());
    }

    #[test]
    fn test_most_recent_with_query() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "alpha"), (200, "beta"), (300, "gamma")]);
        let recent = history.most_recent(&SearchQuery::text("alpha")).unwrap();
        assert_eq!(recent.timestamp, 100);
        let newest = history.most_recent(&SearchQuery::default()).unwrap();
        assert_eq!(newest.timestamp, 300);
    }

    // --- Search ---

    #[test]
    fn test_text_search() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "hello world")]);
        let hits = history.batch(0, 10, &SearchQuery::text("world")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].timestamp, 100);
        assert!(history.batch(0, 10, &SearchQuery::text("xyz")).unwrap().is_empty());
        assert_eq!(history.count(&SearchQuery::text("xyz")).unwrap(), 0);
    }

    #[test]
    fn test_text_and_tag_search() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "work notes"), (200, "home notes"), (300, "work plan")]);
        history.add_tag(100, "work").unwrap();
        history.add_tag(300, "work").unwrap();
        assert_eq!(
            history.list_ids(&SearchQuery::tag("work")).unwrap(),
            vec![300, 100]
        );
        assert_eq!(
            history.list_ids(&SearchQuery::new("NOTES", "work")).unwrap(),
            vec![100]
        );
        assert_eq!(history.count(&SearchQuery::text("notes")).unwrap(), 2);
    }

    // --- Batches ---

    #[test]
    fn test_batch_slices_pages() {
        let (_dir, mut history) = test_history();
        for ts in 1..=10 {
            history.create(&text_entry(ts, "x")).unwrap();
        }
        let q = SearchQuery::default();
        let first: Vec<i64> = history.batch(0, 4, &q).unwrap().iter().map(|e| e.timestamp).collect();
        let last: Vec<i64> = history.batch(8, 4, &q).unwrap().iter().map(|e| e.timestamp).collect();
        assert_eq!(first, vec![10, 9, 8, 7]);
        assert_eq!(last, vec![2, 1]);
        assert!(history.batch(20, 4, &q).unwrap().is_empty());
    }

    #[test]
    fn test_batch_drops_unreadable_entries() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b"), (300, "c")]);
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        std::fs::write(paths.history_dir.join("200.json"), "{").unwrap();
        let page = history.batch(0, 3, &SearchQuery::default()).unwrap();
        let ids: Vec<i64> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(ids, vec![300, 100]);
    }

    // --- Delete ---

    #[test]
    fn test_delete_removes_from_index_and_store() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        assert!(history.delete(100).unwrap());
        assert_eq!(history.list_ids(&SearchQuery::default()).unwrap(), vec![200]);
        assert!(matches!(history.get(100), Err(ClipError::NotFound(_))));
    }

    #[test]
    fn test_delete_nonexistent_is_noop() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        history.add_tag(100, "keep").unwrap();
        assert!(!history.delete(999).unwrap());
        assert_eq!(history.list_ids(&SearchQuery::default()).unwrap(), vec![100]);
        assert_eq!(history.all_tags(), vec!["keep"]);
        assert_eq!(history.tags.count("keep"), 1);
        assert!(history.get(100).is_ok());
    }

    #[test]
    fn test_delete_releases_tags() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        history.add_tag(100, "work").unwrap();
        history.add_tag(100, "urgent").unwrap();
        history.add_tag(200, "work").unwrap();
        history.delete(100).unwrap();
        assert_eq!(history.all_tags(), vec!["work"]);
        assert_eq!(history.tags.count("work"), 1);
    }

    #[test]
    fn test_delete_unreadable_entry_removes_file() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        history.add_tag(200, "work").unwrap();
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        std::fs::write(paths.history_dir.join("200.json"), "garbage").unwrap();

        assert!(history.delete(200).unwrap());
        assert_eq!(history.list_ids(&SearchQuery::default()).unwrap(), vec![100]);
        assert!(!paths.history_dir.join("200.json").exists());
        // Tags of the unreadable entry cannot be released until a rebuild.
        assert_eq!(history.all_tags(), vec!["work"]);
        assert_eq!(history.rebuild_tags().unwrap(), 0);
        assert!(history.all_tags().is_empty());
    }

    // --- Tags ---

    #[test]
    fn test_add_tag_is_idempotent() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        assert!(history.add_tag(100, "work").unwrap());
        assert!(!history.add_tag(100, "work").unwrap());
        assert_eq!(history.get(100).unwrap().tags, vec!["work"]);
        assert_eq!(history.tags.count("work"), 1);
    }

    #[test]
    fn test_add_tag_trims_and_rejects_empty() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        assert!(history.add_tag(100, "  work ").unwrap());
        assert_eq!(history.get(100).unwrap().tags, vec!["work"]);
        assert!(matches!(
            history.add_tag(100, "   "),
            Err(ClipError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_add_tag_missing_entry() {
        let (_dir, mut history) = test_history();
        assert!(!history.add_tag(999, "work").unwrap());
        assert!(history.all_tags().is_empty());
    }

    #[test]
    fn test_remove_tag_shared_between_entries() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        history.add_tag(100, "work").unwrap();
        history.add_tag(200, "work").unwrap();
        history.remove_tag(100, "work").unwrap();
        assert!(history.all_tags().contains(&"work".to_string()));
        history.remove_tag(200, "work").unwrap();
        assert!(!history.all_tags().contains(&"work".to_string()));
    }

    #[test]
    fn test_remove_tag_not_held_leaves_counts() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        history.add_tag(200, "work").unwrap();
        assert!(!history.remove_tag(100, "work").unwrap());
        assert_eq!(history.all_tags(), vec!["work"]);
    }

    #[test]
    fn test_tags_survive_restart() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        history.add_tag(100, "work").unwrap();
        let mut fresh = reopen(&dir);
        assert_eq!(fresh.all_tags(), vec!["work"]);
        assert_eq!(fresh.list_ids(&SearchQuery::tag("work")).unwrap(), vec![100]);
    }

    #[test]
    fn test_rebuild_tags_from_entries() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a"), (200, "b")]);
        history.add_tag(100, "work").unwrap();
        history.add_tag(200, "work").unwrap();
        history.add_tag(200, "home").unwrap();
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        std::fs::write(&paths.tags_file, "garbage").unwrap();

        let mut fresh = reopen(&dir);
        assert!(fresh.all_tags().is_empty());
        assert_eq!(fresh.rebuild_tags().unwrap(), 3);
        assert_eq!(fresh.all_tags(), vec!["home", "work"]);
        assert_eq!(fresh.tags.count("work"), 2);
    }

    /// Reads from disk but refuses every write.
    struct ReadOnlyStore(FileStore);

    impl EntryStore for ReadOnlyStore {
        fn save(&self, _entry: &ClipboardEntry) -> Result<()> {
            Err(ClipError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
        fn load(&self, id: i64) -> Result<ClipboardEntry> {
            self.0.load(id)
        }
        fn delete(&self, id: i64) -> Result<bool> {
            self.0.delete(id)
        }
        fn list(&self) -> Result<Vec<i64>> {
            self.0.list()
        }
    }

    fn read_only_history(dir: &TempDir) -> History {
        let paths = AppPaths::from_base(dir.path().to_path_buf());
        let store = FileStore::open(&paths.history_dir).unwrap();
        History::new(Box::new(ReadOnlyStore(store)), TagIndex::new(&paths.tags_file))
    }

    #[test]
    fn test_failed_entry_write_does_not_count_tag() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        drop(history);

        let mut failing = read_only_history(&dir);
        assert!(failing.add_tag(100, "work").is_err());
        assert!(failing.get(100).unwrap().tags.is_empty());
        assert!(failing.all_tags().is_empty());

        let mut fresh = reopen(&dir);
        assert!(fresh.all_tags().is_empty());
    }

    #[test]
    fn test_failed_entry_write_keeps_tag_count() {
        let (dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        history.add_tag(100, "work").unwrap();
        drop(history);

        let mut failing = read_only_history(&dir);
        assert!(failing.remove_tag(100, "work").is_err());
        assert_eq!(failing.get(100).unwrap().tags, vec!["work"]);
        assert_eq!(failing.all_tags(), vec!["work"]);

        let mut fresh = reopen(&dir);
        assert_eq!(fresh.all_tags(), vec!["work"]);
    }

    #[test]
    fn test_tag_file_not_listed_as_entry() {
        let (_dir, mut history) = test_history();
        seed(&mut history, &[(100, "a")]);
        history.add_tag(100, "work").unwrap();
        assert_eq!(history.count(&SearchQuery::default()).unwrap(), 1);
    }
}
