//! A read-only view of debug metadata, as needed by the type resolver.

use std::{fmt, hash::Hash};

use gimli::{DwAte, DwTag};

use crate::EntryError;

/// A source of debugging information entries.
///
/// Entries are addressed by an offset that identifies them uniquely and stably for the lifetime
/// of the source. The resolver uses these offsets as cache keys, so two references to the same
/// type must produce equal offsets.
pub trait DebugInfo {
    /// The identity of an entry.
    type Offset: Copy + Eq + Hash + fmt::Debug;

    /// Return the type entry of the global variable with the given name.
    ///
    /// Returns `Ok(None)` if there is no such variable, or if it has no type.
    fn variable_type(&self, name: &str) -> Result<Option<Self::Offset>, EntryError>;

    /// Read the entry at `offset`.
    fn entry(&self, offset: Self::Offset) -> Result<Entry<Self::Offset>, EntryError>;
}

/// The direct child of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child<O> {
    /// The tag of the child entry.
    pub tag: DwTag,
    /// The offset of the child entry.
    pub offset: O,
}

/// The attributes of a debugging information entry that matter for data layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<O> {
    /// The entry tag, e.g. `DW_TAG_structure_type`.
    pub tag: DwTag,
    /// `DW_AT_name`
    pub name: Option<String>,
    /// `DW_AT_byte_size`
    pub byte_size: Option<usize>,
    /// `DW_AT_encoding`
    pub encoding: Option<DwAte>,
    /// `DW_AT_type`
    pub type_ref: Option<O>,
    /// `DW_AT_data_member_location`, either as a constant or a `DW_OP_plus_uconst` expression.
    pub member_offset: Option<usize>,
    /// `DW_AT_bit_size`
    pub bit_size: Option<usize>,
    /// `DW_AT_data_bit_offset`
    pub data_bit_offset: Option<usize>,
    /// `DW_AT_bit_offset`
    pub bit_offset: Option<usize>,
    /// `DW_AT_count`
    pub count: Option<usize>,
    /// `DW_AT_upper_bound`
    pub upper_bound: Option<usize>,
    /// `DW_AT_const_value`
    pub const_value: Option<i64>,
    /// `DW_AT_declaration`
    pub is_declaration: bool,
    /// The direct children, in order.
    pub children: Vec<Child<O>>,
}

impl<O> Entry<O> {
    /// An entry with the given tag and no attributes.
    pub fn new(tag: DwTag) -> Self {
        Self {
            tag,
            name: None,
            byte_size: None,
            encoding: None,
            type_ref: None,
            member_offset: None,
            bit_size: None,
            data_bit_offset: None,
            bit_offset: None,
            count: None,
            upper_bound: None,
            const_value: None,
            is_declaration: false,
            children: Vec::new(),
        }
    }

    /// Set `DW_AT_name`.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Set `DW_AT_byte_size`.
    pub fn byte_size(mut self, size: usize) -> Self {
        self.byte_size = Some(size);
        self
    }

    /// Set `DW_AT_encoding`.
    pub fn encoding(mut self, encoding: DwAte) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Set `DW_AT_type`.
    pub fn type_ref(mut self, offset: O) -> Self {
        self.type_ref = Some(offset);
        self
    }

    /// Set `DW_AT_data_member_location`.
    pub fn member_offset(mut self, offset: usize) -> Self {
        self.member_offset = Some(offset);
        self
    }

    /// Set `DW_AT_bit_size` and `DW_AT_data_bit_offset`.
    pub fn bit_field(mut self, bit_size: usize, data_bit_offset: usize) -> Self {
        self.bit_size = Some(bit_size);
        self.data_bit_offset = Some(data_bit_offset);
        self
    }

    /// Set `DW_AT_count`.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Set `DW_AT_upper_bound`.
    pub fn upper_bound(mut self, upper_bound: usize) -> Self {
        self.upper_bound = Some(upper_bound);
        self
    }

    /// Set `DW_AT_const_value`.
    pub fn const_value(mut self, value: i64) -> Self {
        self.const_value = Some(value);
        self
    }

    /// Set `DW_AT_declaration`.
    pub fn declaration(mut self) -> Self {
        self.is_declaration = true;
        self
    }

    /// Return the offsets of the children with the given tag.
    pub fn children_with_tag(&self, tag: DwTag) -> impl Iterator<Item = &O> + '_ {
        self.children
            .iter()
            .filter(move |child| child.tag == tag)
            .map(|child| &child.offset)
    }
}
