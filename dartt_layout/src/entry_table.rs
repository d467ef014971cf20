//! Debug entries held in memory.

use std::{cell::Cell, collections::HashMap};

use gimli::DwTag;

use crate::{Child, DebugInfo, Entry, EntryError};

/// An in-memory [DebugInfo] implementation.
///
/// Useful for metadata produced by other tools, and for describing layouts in tests without
/// compiling a binary. Offsets are indices into the table.
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: Vec<Entry<usize>>,
    variables: HashMap<String, usize>,
    reads: Cell<usize>,
}

impl EntryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top level entry and return its offset.
    pub fn add(&mut self, entry: Entry<usize>) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Add an entry as the last child of `parent` and return its offset.
    ///
    /// Returns None if `parent` is not in the table.
    pub fn add_child(&mut self, parent: usize, entry: Entry<usize>) -> Option<usize> {
        if parent >= self.entries.len() {
            return None;
        }
        let tag: DwTag = entry.tag;
        let offset = self.add(entry);
        self.entries[parent].children.push(Child { tag, offset });
        Some(offset)
    }

    /// Declare a global variable of the given type.
    pub fn add_variable(&mut self, name: &str, type_offset: usize) {
        self.variables.insert(name.to_owned(), type_offset);
    }

    /// The number of times [DebugInfo::entry] has been called.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl DebugInfo for EntryTable {
    type Offset = usize;

    fn variable_type(&self, name: &str) -> Result<Option<usize>, EntryError> {
        Ok(self.variables.get(name).copied())
    }

    fn entry(&self, offset: usize) -> Result<Entry<usize>, EntryError> {
        self.reads.set(self.reads.get() + 1);
        self.entries
            .get(offset)
            .cloned()
            .ok_or_else(|| EntryError::UnknownOffset {
                offset: offset.to_string(),
            })
    }
}
