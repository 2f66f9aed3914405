//! Path-keyed replacement buffers.

use std::collections::HashMap;

use gctk_gcm::normalize;

/// Replacement bytes for disc paths, consulted by the exporter before the
/// original image.
///
/// Keys are disc paths as exposed by [`DiscImage`](gctk_gcm::DiscImage) and
/// compare case-insensitively. The last [`set`](Self::set) for a path wins.
#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    entries: HashMap<String, OverlayEntry>,
}

#[derive(Debug, Clone)]
struct OverlayEntry {
    path: String,
    data: Vec<u8>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `path` with `data`, returning the previous replacement if any.
    pub fn set(&mut self, path: impl Into<String>, data: Vec<u8>) -> Option<Vec<u8>> {
        let path = path.into();
        tracing::debug!(path = %path, size = data.len(), "overlay set");
        self.entries
            .insert(normalize(&path), OverlayEntry { path, data })
            .map(|previous| previous.data)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .get(&normalize(path))
            .map(|entry| entry.data.as_slice())
    }

    pub fn is_overlaid(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlaid paths with the casing they were registered with.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .values()
            .map(|entry| (entry.path.as_str(), entry.data.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut store = OverlayStore::new();

        assert!(store.set("sys/main.dol", vec![1]).is_none());
        assert_eq!(store.set("sys/main.dol", vec![2]), Some(vec![1]));
        assert_eq!(store.get("sys/main.dol"), Some(&[2u8][..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut store = OverlayStore::new();
        store.set("files/RELS.arc", vec![7]);

        assert!(store.is_overlaid("FILES/rels.arc"));
        assert_eq!(store.get("/files/rels.arc"), Some(&[7u8][..]));
        assert_eq!(store.iter().next().map(|(path, _)| path), Some("files/RELS.arc"));
    }

    #[test]
    fn test_absent_path() {
        let store = OverlayStore::new();

        assert!(store.is_empty());
        assert!(store.get("files/RELS.arc").is_none());
        assert!(!store.is_overlaid("files/RELS.arc"));
    }
}
