//! Results of store operations.
//!
//! [`StoreEntry`] is what a point-read returns, [`CollectionListing`] is what
//! a prefix-list returns. Both are owned transiently by the request that
//! produced them and are never cached.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::StoreResult;
use crate::path::SEPARATOR;

/// The key/value bundle stored at one logical path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreEntry {
    data: BTreeMap<String, Value>,
}

impl StoreEntry {
    /// Creates an entry from its key/value data.
    pub fn new(data: BTreeMap<String, Value>) -> Self {
        Self { data }
    }

    /// Returns the entry's key/value data.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Number of keys in the entry.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the entry holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Canonical byte representation of the entry.
    ///
    /// Pretty-printed JSON with keys in sorted order, terminated by a
    /// newline. File size and file content are both derived from this, so
    /// the two always agree.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&self.data)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl From<BTreeMap<String, Value>> for StoreEntry {
    fn from(data: BTreeMap<String, Value>) -> Self {
        Self::new(data)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StoreEntry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One child of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    name: String,
    is_collection: bool,
}

impl ListingEntry {
    /// Parses a raw listing key. A trailing separator marks a sub-collection
    /// and is stripped from the display name.
    pub fn from_raw(raw: &str) -> Self {
        let name = raw.trim_end_matches(SEPARATOR);
        Self {
            name: name.to_string(),
            is_collection: name.len() != raw.len(),
        }
    }

    /// Display name, without any trailing separator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the child is itself a collection.
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }
}

/// Ordered children of a collection, in the order the store returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionListing {
    entries: Vec<ListingEntry>,
}

impl CollectionListing {
    /// Builds a listing from raw keys as returned by the store.
    pub fn from_raw<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: keys
                .into_iter()
                .map(|k| ListingEntry::from_raw(k.as_ref()))
                .collect(),
        }
    }

    /// Children in store order.
    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the collection has no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the children in store order.
    pub fn iter(&self) -> std::slice::Iter<'_, ListingEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a CollectionListing {
    type Item = &'a ListingEntry;
    type IntoIter = std::slice::Iter<'a, ListingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for CollectionListing {
    type Item = ListingEntry;
    type IntoIter = std::vec::IntoIter<ListingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_bytes_are_sorted_pretty_json() {
        let entry: StoreEntry = [("zeta", json!("last")), ("alpha", json!(1))]
            .into_iter()
            .collect();
        let bytes = entry.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\n  \"alpha\": 1,\n  \"zeta\": \"last\"\n}\n");
    }

    #[test]
    fn test_empty_entry_bytes() {
        let entry = StoreEntry::default();
        assert_eq!(entry.to_bytes().unwrap(), b"{}\n");
        assert!(entry.is_empty());
    }

    #[test]
    fn test_entry_bytes_are_stable() {
        let entry: StoreEntry = [("password", json!("hunter2")), ("user", json!("admin"))]
            .into_iter()
            .collect();
        assert_eq!(entry.to_bytes().unwrap(), entry.to_bytes().unwrap());
    }

    #[test]
    fn test_listing_classifies_trailing_separator() {
        let listing = CollectionListing::from_raw(["sub/", "leaf"]);
        let entries = listing.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name(), "sub");
        assert!(entries[0].is_collection());
        assert_eq!(entries[1].name(), "leaf");
        assert!(!entries[1].is_collection());
    }

    #[test]
    fn test_listing_preserves_store_order() {
        let listing = CollectionListing::from_raw(["c", "a/", "b"]);
        let names: Vec<_> = listing.iter().map(ListingEntry::name).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn test_listing_empty() {
        let listing = CollectionListing::from_raw(Vec::<String>::new());
        assert!(listing.is_empty());
        assert_eq!(listing.len(), 0);
    }
}
