//! The persistent tree of named fields that mirrors a variable's memory layout.

use std::{
    fmt,
    ops::{Index, IndexMut},
};

use dartt_data_type::{BitField, FieldKind, FieldValue, QualifiedType, TypeKind, TypeTable};
use dartt_layout::SymbolLayout;
use tracing::{debug, warn};

use crate::SyncError;

/// Nesting depth after which the builder stops descending.
///
/// Valid metadata can't contain a struct that contains itself by value, so only malformed
/// metadata reaches this.
const MAX_DEPTH: usize = 256;

/// An index into a [FieldTree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element information for an array field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    /// The classification of each element.
    pub element_kind: FieldKind,
    /// The size of each element in bytes.
    pub element_size: usize,
    /// The total number of elements across all dimensions.
    pub count: usize,
    /// The declared dimensions, outermost first.
    pub dimensions: Vec<usize>,
    /// The display name of the element type.
    pub element_type_name: String,
}

/// A named field at an absolute offset from the symbol base.
///
/// The layout of a field is fixed once it is added to a tree. The UI state is public and may be
/// changed freely.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    name: String,
    offset: usize,
    size: usize,
    kind: FieldKind,
    type_name: String,
    bit_field: Option<BitField>,
    array: Option<ArrayInfo>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    value: Option<FieldValue>,
    /// The field should be read from the device every cycle.
    pub subscribed: bool,
    /// The value was edited locally and hasn't been confirmed written.
    pub dirty: bool,
    /// The field is expanded in a tree view.
    pub expanded: bool,
    /// The factor applied to the raw value for display.
    pub display_scale: f64,
    /// Whether [display_scale](Self::display_scale) is applied.
    pub use_display_scale: bool,
}

impl FieldNode {
    /// Create a field. Leaves of a fixed-width kind start with a zero value.
    pub fn new(
        name: impl Into<String>,
        offset: usize,
        size: usize,
        kind: FieldKind,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            kind,
            type_name: type_name.into(),
            bit_field: None,
            array: None,
            parent: None,
            children: Vec::new(),
            value: FieldValue::zero(kind, size),
            subscribed: false,
            dirty: false,
            expanded: false,
            display_scale: 1.0,
            use_display_scale: false,
        }
    }

    /// Attach array element information.
    pub fn with_array(mut self, array: ArrayInfo) -> Self {
        self.array = Some(array);
        self
    }

    /// Attach bit-field placement.
    pub fn with_bit_field(mut self, bit_field: Option<BitField>) -> Self {
        self.bit_field = bit_field;
        self
    }

    /// The field name, e.g. `thing1` or `[3]`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The byte offset from the symbol base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The offset just past the end of the field.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// The classification of the field.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The display name of the field's type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Bit-field placement, if the field is a bit-field.
    pub fn bit_field(&self) -> Option<BitField> {
        self.bit_field
    }

    /// Element information, if the field is an array.
    pub fn array(&self) -> Option<&ArrayInfo> {
        self.array.as_ref()
    }

    /// The containing field, or None for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The child fields in order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Return true if the field has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The current value. Only leaves of a fixed-width kind hold a value.
    pub fn value(&self) -> Option<FieldValue> {
        self.value
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut FieldValue> {
        self.value.as_mut()
    }

    /// Replace the value. The new value must have the same variant as the current one.
    ///
    /// This doesn't mark the field dirty; see [Session::set_value](crate::Session::set_value).
    pub fn set_value(&mut self, value: FieldValue) -> Result<(), SyncError> {
        match &mut self.value {
            Some(current) => {
                current.check_replacement(&value)?;
                *current = value;
                Ok(())
            }
            None => Err(SyncError::NotALeaf {
                name: self.name.clone(),
            }),
        }
    }

    /// The value as shown to the user, with the display scale applied if enabled.
    pub fn display_value(&self) -> Option<f64> {
        let raw = self.value?.as_f64();
        Some(if self.use_display_scale {
            raw * self.display_scale
        } else {
            raw
        })
    }

    /// The value formatted for display. Pointers are shown in hex.
    pub fn formatted_value(&self) -> Option<String> {
        let value = self.value?;
        Some(match self.kind {
            FieldKind::Pointer => format!("0x{:08X}", value.as_f64() as u64),
            _ if self.use_display_scale => format!("{:.6}", value.as_f64() * self.display_scale),
            _ => value.to_string(),
        })
    }

    /// Turn the field into an unknown, empty leaf.
    fn degrade(&mut self, total_size: usize) {
        self.kind = FieldKind::Unknown;
        self.offset = self.offset.min(total_size);
        self.size = 0;
        self.array = None;
        self.value = None;
    }
}

/// A tree of fields stored in an arena. The root is always [FieldTree::root].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTree {
    nodes: Vec<FieldNode>,
    total_size: usize,
}

/// A child field still to be created by the builder.
struct PendingField {
    name: String,
    offset: usize,
    data_type: QualifiedType,
    bit_field: Option<BitField>,
}

impl FieldTree {
    /// Create a tree for a symbol of `total_size` bytes.
    pub fn new(root: FieldNode, total_size: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            total_size,
        };
        let root = tree.fit(root, 0, total_size);
        tree.nodes.push(root);
        tree
    }

    /// Build the tree for a resolved symbol layout, before array expansion.
    pub fn from_layout(layout: &SymbolLayout) -> Self {
        Self::build(
            &layout.types,
            &layout.root,
            &layout.symbol.name,
            0,
            layout.total_size(),
        )
    }

    /// Build the tree for a value of type `root_type` located at `base_offset`.
    ///
    /// Offsets are absolute: each member's offset is its parent's offset plus the member's
    /// relative offset. An array of structs, unions or arrays gets a single representative
    /// child named `[0]`. Arrays of leaves get no children until
    /// [expand_arrays](Self::expand_arrays) is called.
    pub fn build(
        types: &TypeTable,
        root_type: &QualifiedType,
        name: &str,
        base_offset: usize,
        total_size: usize,
    ) -> Self {
        let (root, children) = node_for_type(types, root_type, name.to_owned(), base_offset, None);
        let mut tree = Self::new(root, total_size);

        let root_id = tree.root();
        let mut stack: Vec<(NodeId, PendingField, usize)> = Vec::new();
        if tree[root_id].kind() != FieldKind::Unknown {
            stack.extend(children.into_iter().rev().map(|child| (root_id, child, 1)));
        }

        while let Some((parent, pending, depth)) = stack.pop() {
            let (node, children) = node_for_type(
                types,
                &pending.data_type,
                pending.name,
                pending.offset,
                pending.bit_field,
            );
            let id = tree.add_child(parent, node);

            if children.is_empty() || tree[id].kind() == FieldKind::Unknown {
                continue;
            }
            if depth >= MAX_DEPTH {
                warn!("{} is nested too deeply, not descending", tree.path(id));
                continue;
            }
            stack.extend(children.into_iter().rev().map(|child| (id, child, depth + 1)));
        }

        debug!("built {} fields for {}", tree.len(), name);
        tree
    }

    /// The root field.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The size of the symbol the tree describes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// The number of fields in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, since the root is present.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a field.
    pub fn get(&self, id: NodeId) -> Option<&FieldNode> {
        self.nodes.get(id.0)
    }

    /// Look up a field mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut FieldNode> {
        self.nodes.get_mut(id.0)
    }

    /// Add `node` as the last child of `parent`.
    ///
    /// A node that doesn't fit inside its parent (or the symbol) is degraded to an unknown,
    /// empty leaf. The parent stops holding a value.
    pub fn add_child(&mut self, parent: NodeId, mut node: FieldNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let (start, end) = {
            let parent = &mut self[parent];
            parent.value = None;
            parent.children.push(id);
            (parent.offset, parent.end())
        };
        node.parent = Some(parent);
        let node = self.fit(node, start, end);
        self.nodes.push(node);
        id
    }

    fn fit(&self, mut node: FieldNode, start: usize, end: usize) -> FieldNode {
        let fits = node.offset >= start
            && node
                .offset
                .checked_add(node.size)
                .map_or(false, |node_end| node_end <= end && node_end <= self.total_size);
        if !fits {
            warn!(
                "field {} at {}+{} doesn't fit in {}..{}, treating as unknown",
                node.name, node.offset, node.size, start, end
            );
            node.degrade(self.total_size);
        }
        node
    }

    /// Give every childless array of leaves one child per element.
    ///
    /// Element `i` is named `[i]` and placed at `offset + i * element_size`. Arrays that
    /// already have children are skipped, so calling this again has no effect. Returns the
    /// number of arrays expanded.
    pub fn expand_arrays(&mut self) -> usize {
        let mut expanded = 0;
        // Nodes added here are never arrays, so they don't need to be visited.
        for index in 0..self.nodes.len() {
            let id = NodeId(index);
            let node = &self.nodes[index];
            let array = match &node.array {
                Some(array)
                    if node.children.is_empty()
                        && array.count > 0
                        && array.element_size > 0
                        && !array.element_kind.is_composite() =>
                {
                    array.clone()
                }
                _ => continue,
            };
            let fits = array
                .count
                .checked_mul(array.element_size)
                .map_or(false, |total| total <= node.size);
            if !fits {
                warn!(
                    "{} has {} elements of {} bytes, more than its size {}",
                    self.path(id),
                    array.count,
                    array.element_size,
                    node.size
                );
                continue;
            }

            let offset = node.offset;
            for i in 0..array.count {
                let child = FieldNode::new(
                    format!("[{}]", i),
                    offset + i * array.element_size,
                    array.element_size,
                    array.element_kind,
                    array.element_type_name.clone(),
                );
                self.add_child(id, child);
            }
            expanded += 1;
        }
        expanded
    }

    /// All fields in depth-first, left-to-right order, starting with the root.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self[id].children.iter().rev());
        }
        order
    }

    /// All childless fields in depth-first, left-to-right order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self[id].is_leaf())
            .collect()
    }

    /// Find a field by its path relative to the root, e.g. `thing_array[0].v[2]` or
    /// `thing1.val`. The empty path is the root.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let path = path.replace('[', ".[");
        let mut current = self.root();
        for segment in path.split('.').filter(|segment| !segment.is_empty()) {
            current = *self[current]
                .children
                .iter()
                .find(|&&child| self[child].name == segment)?;
        }
        Some(current)
    }

    /// The path of a field relative to the root, in the format accepted by
    /// [find](Self::find).
    pub fn path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            match node.parent {
                Some(parent) => {
                    names.push(node.name.as_str());
                    current = self.get(parent);
                }
                None => break,
            }
        }

        let mut path = String::new();
        for name in names.iter().rev() {
            if !path.is_empty() && !name.starts_with('[') {
                path.push('.');
            }
            path.push_str(name);
        }
        path
    }
}

impl Index<NodeId> for FieldTree {
    type Output = FieldNode;

    fn index(&self, id: NodeId) -> &FieldNode {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for FieldTree {
    fn index_mut(&mut self, id: NodeId) -> &mut FieldNode {
        &mut self.nodes[id.0]
    }
}

impl fmt::Display for FieldTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root(), 0)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self[id];
            write!(
                f,
                "{:indent$}{}: {} @{} ({})",
                "",
                node.name,
                node.type_name,
                node.offset,
                node.size,
                indent = depth * 2
            )?;
            if let Some(value) = node.formatted_value() {
                write!(f, " = {}", value)?;
            }
            writeln!(f)?;
            stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        Ok(())
    }
}

/// Create the field for a value of `data_type`, along with the children it should have.
fn node_for_type(
    types: &TypeTable,
    data_type: &QualifiedType,
    name: String,
    offset: usize,
    bit_field: Option<BitField>,
) -> (FieldNode, Vec<PendingField>) {
    let descriptor = types.get(data_type.id);
    let kind = FieldKind::classify(types, data_type);
    let mut node = FieldNode::new(
        name,
        offset,
        descriptor.size,
        kind,
        types.type_name(data_type),
    )
    .with_bit_field(bit_field);

    let mut children = Vec::new();
    match &descriptor.kind {
        TypeKind::Struct { members } | TypeKind::Union { members } => {
            children.extend(members.iter().map(|member| PendingField {
                name: member.name.clone(),
                offset: offset.saturating_add(member.offset),
                data_type: member.data_type.clone(),
                bit_field: member.bit_field,
            }));
        }
        TypeKind::Array {
            element,
            dimensions,
            total_elements,
        } => {
            let element_kind = FieldKind::classify(types, element);
            node = node.with_array(ArrayInfo {
                element_kind,
                element_size: types.size_of(element),
                count: *total_elements,
                dimensions: dimensions.clone(),
                element_type_name: types.type_name(element),
            });
            if element_kind.is_composite() {
                children.push(PendingField {
                    name: "[0]".to_owned(),
                    offset,
                    data_type: element.clone(),
                    bit_field: None,
                });
            }
        }
        TypeKind::Unknown
        | TypeKind::Void
        | TypeKind::Int(_)
        | TypeKind::Float(_)
        | TypeKind::Pointer { .. }
        | TypeKind::Enum { .. } => {}
    }
    (node, children)
}
