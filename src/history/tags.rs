use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::errors::ClipError;
use crate::storage::files::write_atomic;

#[derive(Debug, Default)]
enum TagState {
    #[default]
    Uninitialized,
    Ready(Vec<String>),
}

/// Multiset of every tag attached to any entry, one occurrence per holder.
/// Written through to a side file on each mutation.
#[derive(Debug)]
pub struct TagIndex {
    path: PathBuf,
    state: TagState,
}

impl TagIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: TagState::Uninitialized,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, TagState::Ready(_))
    }

    /// Loads the side file. A missing or unparsable file resets the index to
    /// empty and rewrites it.
    pub fn ensure_initialized(&mut self) {
        if self.is_ready() {
            return;
        }
        let loaded = match fs::read(&self.path) {
            Ok(raw) => match serde_json::from_slice::<Vec<String>>(&raw) {
                Ok(tags) => Some(tags),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "tag index is corrupt, resetting");
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read tag index, resetting");
                None
            }
        };
        match loaded {
            Some(tags) => {
                debug!(tags = tags.len(), "loaded tag index");
                self.state = TagState::Ready(tags);
            }
            None => {
                self.state = TagState::Ready(Vec::new());
                self.persist();
            }
        }
    }

    fn ready_mut(&mut self) -> &mut Vec<String> {
        self.ensure_initialized();
        match &mut self.state {
            TagState::Ready(tags) => tags,
            TagState::Uninitialized => unreachable!("tag index initialized above"),
        }
    }

    #[cfg(test)]
    pub fn count(&mut self, tag: &str) -> usize {
        self.ready_mut().iter().filter(|t| *t == tag).count()
    }

    pub fn push(&mut self, tag: &str) {
        self.ready_mut().push(tag.to_string());
        self.persist();
    }

    /// Removes a single occurrence. Returns false if the tag was not present.
    pub fn remove_one(&mut self, tag: &str) -> bool {
        let tags = self.ready_mut();
        let Some(pos) = tags.iter().position(|t| t == tag) else {
            return false;
        };
        tags.remove(pos);
        self.persist();
        true
    }

    /// Replaces the whole multiset, e.g. after rescanning every entry.
    pub fn replace(&mut self, tags: Vec<String>) {
        self.state = TagState::Ready(tags);
        self.persist();
    }

    /// Deduplicated, sorted.
    pub fn all(&mut self) -> Vec<String> {
        let mut tags = self.ready_mut().clone();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Best effort: a failed write is logged and the in-memory state kept.
    fn persist(&self) {
        let TagState::Ready(tags) = &self.state else {
            return;
        };
        let mut sorted = tags.clone();
        sorted.sort();
        let result = serde_json::to_vec(&sorted)
            .map_err(ClipError::from)
            .and_then(|json| write_atomic(&self.path, &json));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to write tag index");
        }
    }
}
