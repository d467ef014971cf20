//! Byte buffers mirroring the variable's memory on the host.

use dartt_data_type::Endian;

use crate::{align_up, FieldTree, MemoryRegion, NodeId, SyncError};

/// The desired and observed images of the variable.
///
/// `desired` holds the bytes the host wants on the device, and `observed` the bytes last read
/// from (or confirmed written to) the device. Both are a whole number of words long.
///
/// Observed bytes are fresh from the time they are received or committed until the next
/// [expire](Self::expire). Only fresh bytes are trusted to still match the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorBuffers {
    desired: Vec<u8>,
    observed: Vec<u8>,
    fresh: Vec<bool>,
    endian: Endian,
}

impl MirrorBuffers {
    /// Zeroed buffers for a variable of `total_size` bytes.
    pub fn new(total_size: usize, endian: Endian) -> Self {
        let len = align_up(total_size);
        Self {
            desired: vec![0; len],
            observed: vec![0; len],
            fresh: vec![false; len],
            endian,
        }
    }

    /// The buffer length in bytes.
    pub fn len(&self) -> usize {
        self.desired.len()
    }

    /// Return true if the variable is empty.
    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    /// The byte order used to encode values.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The bytes the host wants on the device.
    pub fn desired(&self) -> &[u8] {
        &self.desired
    }

    /// The bytes last seen on the device.
    pub fn observed(&self) -> &[u8] {
        &self.observed
    }

    /// Return true if the byte at `offset` was read from or written to the device since the
    /// last [expire](Self::expire).
    pub fn is_fresh(&self, offset: usize) -> bool {
        self.fresh.get(offset).copied().unwrap_or(false)
    }

    /// Mark every observed byte as stale, since the device may have changed it.
    pub fn expire(&mut self) {
        self.fresh.iter_mut().for_each(|fresh| *fresh = false);
    }

    /// Encode the values of the region's fields into the desired buffer.
    ///
    /// Every field is checked before anything is written, so on error the buffer is unchanged.
    pub fn to_wire(&mut self, tree: &FieldTree, region: &MemoryRegion) -> Result<(), SyncError> {
        self.check_fields(tree, region)?;
        for &id in &region.fields {
            let node = &tree[id];
            if let Some(value) = node.value() {
                value.write_to(&mut self.desired[node.offset()..node.end()], self.endian)?;
            }
        }
        Ok(())
    }

    /// Decode the observed bytes of the region's fields into the tree.
    ///
    /// Every field is checked before any value changes, so on error the tree is unchanged.
    pub fn from_wire(&self, tree: &mut FieldTree, region: &MemoryRegion) -> Result<(), SyncError> {
        self.check_fields(tree, region)?;
        for &id in &region.fields {
            let node = &mut tree[id];
            let (start, end) = (node.offset(), node.end());
            if let Some(value) = node.value_mut() {
                value.read_from(&self.observed[start..end], self.endian)?;
            }
        }
        Ok(())
    }

    /// Prepare the region for writing.
    ///
    /// The region's window of the desired buffer is first reset to the observed bytes, and the
    /// fields are then encoded over it. Bytes not covered by the region's fields keep their
    /// device values only if they are fresh, so the caller fetches the window first otherwise.
    pub fn stage(&mut self, tree: &FieldTree, region: &MemoryRegion) -> Result<(), SyncError> {
        self.check_window(region)?;
        self.check_fields(tree, region)?;
        let window = region.start..region.end();
        self.desired[window.clone()].copy_from_slice(&self.observed[window]);
        self.to_wire(tree, region)
    }

    /// The region's window of the desired buffer.
    pub fn desired_window(&self, region: &MemoryRegion) -> Result<&[u8], SyncError> {
        self.check_window(region)?;
        Ok(&self.desired[region.start..region.end()])
    }

    /// Store bytes read from the device at `start`.
    pub fn receive(&mut self, start: usize, bytes: &[u8]) -> Result<(), SyncError> {
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= self.len())
            .ok_or_else(|| SyncError::OutOfBounds {
                name: "received data".to_owned(),
                start,
                end: start.saturating_add(bytes.len()),
                buffer_len: self.len(),
            })?;
        self.observed[start..end].copy_from_slice(bytes);
        self.fresh[start..end].iter_mut().for_each(|fresh| *fresh = true);
        Ok(())
    }

    /// Record that the region's window of the desired buffer is now on the device.
    pub fn commit(&mut self, region: &MemoryRegion) -> Result<(), SyncError> {
        self.check_window(region)?;
        let window = region.start..region.end();
        self.observed[window.clone()].copy_from_slice(&self.desired[window.clone()]);
        self.fresh[window].iter_mut().for_each(|fresh| *fresh = true);
        Ok(())
    }

    fn check_window(&self, region: &MemoryRegion) -> Result<(), SyncError> {
        if region.end() > self.len() {
            return Err(SyncError::OutOfBounds {
                name: format!("region at {}", region.start),
                start: region.start,
                end: region.end(),
                buffer_len: self.len(),
            });
        }
        Ok(())
    }

    fn check_fields(&self, tree: &FieldTree, region: &MemoryRegion) -> Result<(), SyncError> {
        for &id in &region.fields {
            self.check_field(tree, id)?;
        }
        Ok(())
    }

    fn check_field(&self, tree: &FieldTree, id: NodeId) -> Result<(), SyncError> {
        let node = tree.get(id).ok_or(SyncError::UnknownNode(id))?;
        let value = node.value().ok_or_else(|| SyncError::NotALeaf {
            name: tree.path(id),
        })?;
        if node.end() > self.len() || value.size() != node.size() {
            return Err(SyncError::OutOfBounds {
                name: tree.path(id),
                start: node.offset(),
                end: node.offset() + value.size(),
                buffer_len: self.len(),
            });
        }
        Ok(())
    }
}
