//! Field metadata consumed by the dictionary

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the postings of a field record. Ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, index_options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            number,
            index_options,
        }
    }

    pub fn has_freqs(&self) -> bool {
        self.index_options.has_freqs()
    }
}

/// The fields of one segment, addressable by number or name.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: FxHashMap<u32, FieldInfo>,
    by_name: FxHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new(fields: impl IntoIterator<Item = FieldInfo>) -> Result<Self> {
        let mut infos = Self::default();
        for field in fields {
            infos.add(field)?;
        }
        Ok(infos)
    }

    pub fn add(&mut self, field: FieldInfo) -> Result<()> {
        if self.by_number.contains_key(&field.number) {
            return Err(Error::InvalidArgument(format!(
                "duplicate field number {}",
                field.number
            )));
        }
        if self.by_name.contains_key(&field.name) {
            return Err(Error::InvalidArgument(format!(
                "duplicate field name {:?}",
                field.name
            )));
        }
        self.by_name.insert(field.name.clone(), field.number);
        self.by_number.insert(field.number, field);
        Ok(())
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(&number)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).and_then(|n| self.by_number.get(n))
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_options_order() {
        assert!(!IndexOptions::Docs.has_freqs());
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(!IndexOptions::DocsAndFreqs.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositionsAndOffsets.has_offsets());
    }

    #[test]
    fn test_field_infos_lookup() {
        let infos = FieldInfos::new([
            FieldInfo::new("body", 1, IndexOptions::DocsAndFreqsAndPositions),
            FieldInfo::new("id", 0, IndexOptions::Docs),
        ])
        .unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos.by_name("body").unwrap().number, 1);
        assert_eq!(infos.by_number(0).unwrap().name, "id");
        assert!(infos.by_name("title").is_none());
    }

    #[test]
    fn test_field_infos_rejects_duplicates() {
        let mut infos = FieldInfos::default();
        infos.add(FieldInfo::new("a", 0, IndexOptions::Docs)).unwrap();
        assert!(infos.add(FieldInfo::new("b", 0, IndexOptions::Docs)).is_err());
        assert!(infos.add(FieldInfo::new("a", 1, IndexOptions::Docs)).is_err());
    }
}
