//! Record schema for map annotations.
//!
//! Defines the canonical field order, the key/label table used for sheet
//! headers, and the [`Record`] type handed back by listings.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Key of the id field.
pub const ID: &str = "id";

/// Key of the creation timestamp field.
pub const TIMESTAMP: &str = "timestamp";

/// Record fields in the order they are laid out on a fresh sheet.
///
/// Changing this order changes where `append` writes each value.
pub const COLUMNS: [&str; 11] = [
    ID,
    "lat",
    "lng",
    "shopName",
    "address",
    "category",
    "accessibility",
    "rating",
    "experience",
    "reporter",
    TIMESTAMP,
];

/// Display label shown in the header row for each field key.
const COLUMN_LABELS: [(&str, &str); 11] = [
    (ID, "ID"),
    ("lat", "緯度"),
    ("lng", "經度"),
    ("shopName", "店名"),
    ("address", "地址"),
    ("category", "類別"),
    ("accessibility", "無障礙設施"),
    ("rating", "評分"),
    ("experience", "體驗心得"),
    ("reporter", "回報者"),
    (TIMESTAMP, "提交時間"),
];

/// Look up the header label for a field key.
#[must_use]
pub fn label_for(key: &str) -> Option<&'static str> {
    COLUMN_LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
}

/// Look up the field key whose label is exactly `label`.
#[must_use]
pub fn key_for_label(label: &str) -> Option<&'static str> {
    COLUMN_LABELS
        .iter()
        .find(|(_, l)| *l == label)
        .map(|(key, _)| *key)
}

/// Resolve a header cell to a field key.
///
/// Headers written by this crate hold labels, but a sheet edited by hand may
/// hold raw keys or columns we know nothing about. Anything that is not a
/// known label is used verbatim as the key.
#[must_use]
pub fn resolve_key(header: &str) -> &str {
    key_for_label(header).unwrap_or(header)
}

/// Header row for a fresh sheet: one label per canonical column.
#[must_use]
pub fn header_labels() -> Vec<String> {
    COLUMNS
        .iter()
        .map(|&key| label_for(key).unwrap_or(key).to_string())
        .collect()
}

/// One map annotation as read back from the grid.
///
/// Fields keep the column order of the sheet they came from, which is what
/// the front-end sees when the record is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value for the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// Get a field value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The record id, or an empty string if the sheet has no id column.
    #[must_use]
    pub fn id(&self) -> &str {
        self.get(ID).unwrap_or_default()
    }

    /// The creation timestamp, or an empty string if absent.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        self.get(TIMESTAMP).unwrap_or_default()
    }

    /// Iterate over `(key, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}
