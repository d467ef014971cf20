use std::path::Path;

use dartt_data_type::{Endian, FieldValue};
use dartt_layout::{Symbol, SymbolLayout};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    coalesce, Description, DescriptionError, FieldNode, FieldTree, LoadError, MemoryRegion,
    MirrorBuffers, NodeId, SyncError, Transport,
};

/// The live state of one variable: its field tree, leaf index and mirror buffers.
#[derive(Debug, Clone)]
pub struct Session {
    symbol: Symbol,
    endian: Endian,
    tree: FieldTree,
    leaves: Vec<NodeId>,
    buffers: MirrorBuffers,
    extra: Map<String, Value>,
}

/// The outcome of one [Session::sync] cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// The number of regions written and acknowledged.
    pub written: usize,
    /// The number of regions read and applied.
    pub read: usize,
    /// The regions that failed. Their fields keep their flags and are retried next cycle.
    pub failures: Vec<RegionFailure>,
}

impl SyncReport {
    /// Return true if no region failed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, region: &MemoryRegion, error: SyncError, direction: &str) {
        warn!(
            "{} of region {}..{} failed: {}",
            direction,
            region.start,
            region.end(),
            error
        );
        self.failures.push(RegionFailure {
            start: region.start,
            length: region.length,
            error,
        });
    }
}

/// A region that could not be transferred.
#[derive(Debug, Clone)]
pub struct RegionFailure {
    /// The first byte of the region.
    pub start: usize,
    /// The length of the region in bytes.
    pub length: usize,
    /// The reason for the failure.
    pub error: SyncError,
}

impl Session {
    /// Create a session for `tree`, expanding its arrays.
    pub fn new(symbol: Symbol, endian: Endian, mut tree: FieldTree) -> Self {
        tree.expand_arrays();
        let leaves = tree.leaves();
        let buffers = MirrorBuffers::new(tree.total_size(), endian);
        info!(
            "session for {}: {} fields, {} leaves, {} buffer bytes",
            symbol.name,
            tree.len(),
            leaves.len(),
            buffers.len()
        );
        Self {
            symbol,
            endian,
            tree,
            leaves,
            buffers,
            extra: Map::new(),
        }
    }

    /// Create a session for a resolved variable.
    pub fn from_layout(layout: &SymbolLayout) -> Self {
        Self::new(
            layout.symbol.clone(),
            layout.endian,
            FieldTree::from_layout(layout),
        )
    }

    /// Create a session for the variable `symbol_name` in an ELF file.
    pub fn load_elf(elf_path: impl AsRef<Path>, symbol_name: &str) -> Result<Self, LoadError> {
        let layout = SymbolLayout::read_elf(elf_path, symbol_name)?;
        Ok(Self::from_layout(&layout))
    }

    /// Create a session from a saved description, restoring its UI state.
    pub fn from_description(description: &Description) -> Self {
        let symbol = Symbol {
            name: description.symbol.clone(),
            address: description.address_value(),
            size: description.nbytes,
        };
        let mut session = Self::new(symbol, description.endian, description.to_tree());
        session.extra = description.extra.clone();
        session
    }

    /// Create a session from a description file.
    pub fn load_description(path: impl AsRef<Path>) -> Result<Self, DescriptionError> {
        Ok(Self::from_description(&Description::load(path)?))
    }

    /// Describe the session's tree and UI state.
    pub fn to_description(&self) -> Description {
        let mut description =
            Description::from_tree(&self.symbol.name, self.symbol.address, self.endian, &self.tree);
        description.extra = self.extra.clone();
        description
    }

    /// Save the session's description to a file.
    pub fn save_description(&self, path: impl AsRef<Path>) -> Result<(), DescriptionError> {
        self.to_description().save(path)
    }

    /// The variable's symbol.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// The byte order of the target.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The field tree.
    pub fn tree(&self) -> &FieldTree {
        &self.tree
    }

    /// All leaves in depth-first order.
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// The mirror buffers.
    pub fn buffers(&self) -> &MirrorBuffers {
        &self.buffers
    }

    /// Look up a field.
    pub fn node(&self, id: NodeId) -> Option<&FieldNode> {
        self.tree.get(id)
    }

    /// Look up a field to change its UI state.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FieldNode> {
        self.tree.get_mut(id)
    }

    /// Find a field by path. See [FieldTree::find].
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.tree.find(path)
    }

    /// Set a leaf's value and mark it to be written.
    pub fn set_value(&mut self, id: NodeId, value: FieldValue) -> Result<(), SyncError> {
        let node = self.tree.get_mut(id).ok_or(SyncError::UnknownNode(id))?;
        node.set_value(value)?;
        node.dirty = true;
        Ok(())
    }

    /// Set a leaf's value from a displayed value, undoing the display scale if enabled.
    pub fn set_display_value(&mut self, id: NodeId, display_value: f64) -> Result<(), SyncError> {
        let node = self.tree.get(id).ok_or(SyncError::UnknownNode(id))?;
        let current = node.value().ok_or_else(|| SyncError::NotALeaf {
            name: self.tree.path(id),
        })?;
        let raw = if node.use_display_scale && node.display_scale != 0.0 {
            display_value / node.display_scale
        } else {
            display_value
        };
        self.set_value(id, current.with_f64(raw))
    }

    /// The regions covering all dirty leaves.
    pub fn build_write_queue(&self) -> Vec<MemoryRegion> {
        coalesce(&self.tree, &self.leaves, |node| {
            node.dirty && node.value().is_some()
        })
    }

    /// The regions covering all subscribed leaves.
    pub fn build_read_queue(&self) -> Vec<MemoryRegion> {
        coalesce(&self.tree, &self.leaves, |node| {
            node.subscribed && node.value().is_some()
        })
    }

    /// Return true if the region must be read from the device before it can be staged.
    ///
    /// This is the case when some byte of the region belongs to none of its fields and it
    /// hasn't been received from the device since the buffers last expired.
    pub fn needs_fetch(&self, region: &MemoryRegion) -> bool {
        (region.start..region.end()).any(|byte| {
            !self.buffers.is_fresh(byte)
                && !region.fields.iter().any(|&id| {
                    self.tree
                        .get(id)
                        .map_or(false, |node| node.offset() <= byte && byte < node.end())
                })
        })
    }

    /// Encode the region's fields over the last observed bytes and return the words to write.
    pub fn stage_for_write(&mut self, region: &MemoryRegion) -> Result<&[u8], SyncError> {
        self.buffers.stage(&self.tree, region)?;
        self.buffers.desired_window(region)
    }

    /// Store the bytes read from the device for `region`.
    pub fn receive(&mut self, region: &MemoryRegion, bytes: &[u8]) -> Result<(), SyncError> {
        if bytes.len() != region.length {
            return Err(SyncError::OutOfBounds {
                name: format!("read of region at {}", region.start),
                start: region.start,
                end: region.start + bytes.len(),
                buffer_len: region.length,
            });
        }
        self.buffers.receive(region.start, bytes)
    }

    /// Copy received bytes into the region's fields.
    ///
    /// Dirty fields are skipped, so an edit that hasn't been written yet is kept.
    pub fn apply_from_read(&mut self, region: &MemoryRegion) -> Result<(), SyncError> {
        let fields = region
            .fields
            .iter()
            .copied()
            .filter(|&id| self.tree.get(id).map_or(true, |node| !node.dirty))
            .collect();
        let clean = MemoryRegion {
            start: region.start,
            length: region.length,
            fields,
        };
        self.buffers.from_wire(&mut self.tree, &clean)
    }

    /// Record that the staged region was written, clearing its fields' dirty flags.
    pub fn acknowledge_write(&mut self, region: &MemoryRegion) -> Result<(), SyncError> {
        self.buffers.commit(region)?;
        for &id in &region.fields {
            if let Some(node) = self.tree.get_mut(id) {
                node.dirty = false;
            }
        }
        Ok(())
    }

    /// Run one cycle: write every dirty region, then read every subscribed region.
    ///
    /// Observed bytes from earlier cycles are expired first, so a partial word is always
    /// fetched before it is written. A failed region doesn't stop the cycle. Its fields keep their flags, so it is tried
    /// again next cycle.
    pub fn sync<T: Transport + ?Sized>(&mut self, transport: &mut T) -> SyncReport {
        let mut report = SyncReport::default();
        self.buffers.expire();

        for region in self.build_write_queue() {
            match self.write_region(transport, &region) {
                Ok(()) => report.written += 1,
                Err(error) => report.fail(&region, error, "write"),
            }
        }
        for region in self.build_read_queue() {
            match self.read_region(transport, &region) {
                Ok(()) => report.read += 1,
                Err(error) => report.fail(&region, error, "read"),
            }
        }

        debug!(
            "sync of {}: {} written, {} read, {} failed",
            self.symbol.name,
            report.written,
            report.read,
            report.failures.len()
        );
        report
    }

    fn write_region<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        region: &MemoryRegion,
    ) -> Result<(), SyncError> {
        if self.needs_fetch(region) {
            let mut current = vec![0; region.length];
            transport.read(region.start, &mut current)?;
            self.receive(region, &current)?;
        }
        let bytes = self.stage_for_write(region)?;
        transport.write(region.start, bytes)?;
        self.acknowledge_write(region)
    }

    fn read_region<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        region: &MemoryRegion,
    ) -> Result<(), SyncError> {
        let mut bytes = vec![0; region.length];
        transport.read(region.start, &mut bytes)?;
        self.receive(region, &bytes)?;
        self.apply_from_read(region)
    }
}
