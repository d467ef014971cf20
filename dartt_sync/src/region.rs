//! Grouping of fields into word-aligned transfer regions.

use tracing::debug;

use crate::{FieldNode, FieldTree, NodeId};

/// The transfer unit of the device, in bytes.
pub const WORD_SIZE: usize = 4;

/// Round `offset` down to a multiple of [WORD_SIZE].
pub fn align_down(offset: usize) -> usize {
    offset - offset % WORD_SIZE
}

/// Round `offset` up to a multiple of [WORD_SIZE].
pub fn align_up(offset: usize) -> usize {
    align_down(offset + WORD_SIZE - 1)
}

/// A word-aligned byte range that covers one or more fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// The first byte of the region. Always a multiple of [WORD_SIZE].
    pub start: usize,
    /// The length in bytes. Always a multiple of [WORD_SIZE].
    pub length: usize,
    /// The fields inside the region, ordered by offset.
    pub fields: Vec<NodeId>,
}

impl MemoryRegion {
    /// The offset just past the end of the region.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// The region's first word index.
    pub fn start_word(&self) -> usize {
        self.start / WORD_SIZE
    }

    /// The number of words in the region.
    pub fn words(&self) -> usize {
        self.length / WORD_SIZE
    }
}

/// Group the fields in `fields` that satisfy `predicate` into word-aligned regions.
///
/// Fields are visited in offset order (ties keep their order in `fields`). A field joins the
/// current region if its aligned start is not past the region's end, so fields that share a
/// word or sit in adjacent words are transferred together. The regions are ordered and don't
/// overlap.
pub fn coalesce(
    tree: &FieldTree,
    fields: &[NodeId],
    mut predicate: impl FnMut(&FieldNode) -> bool,
) -> Vec<MemoryRegion> {
    let mut selected: Vec<NodeId> = fields
        .iter()
        .copied()
        .filter(|&id| tree.get(id).map_or(false, |node| predicate(node)))
        .collect();
    selected.sort_by_key(|&id| tree[id].offset());

    let mut regions: Vec<MemoryRegion> = Vec::new();
    for id in selected {
        let node = &tree[id];
        let start = align_down(node.offset());
        let end = align_up(node.end()).max(start + WORD_SIZE);

        match regions.last_mut() {
            Some(region) if start <= region.end() => {
                if end > region.end() {
                    region.length = end - region.start;
                }
                region.fields.push(id);
            }
            _ => regions.push(MemoryRegion {
                start,
                length: end - start,
                fields: vec![id],
            }),
        }
    }

    for region in &regions {
        debug!(
            "region {}..{} with {} fields",
            region.start,
            region.end(),
            region.fields.len()
        );
    }
    regions
}
