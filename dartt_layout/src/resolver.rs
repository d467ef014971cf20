//! Iterative resolution of debug type entries into a [TypeTable].

use std::{
    collections::{HashMap, HashSet},
    iter,
};

use dartt_data_type::{
    BitField, FloatType, IntType, Member, QualifiedType, TypeDescriptor, TypeId, TypeKind,
    TypeTable,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{DebugInfo, Entry};

/// The size of a pointer whose entry has no byte size.
const DEFAULT_POINTER_SIZE: usize = 4;

/// The size of an enum whose entry has no byte size.
const DEFAULT_ENUM_SIZE: usize = 4;

/// The longest chain of typedefs and qualifiers that is followed before giving up.
///
/// A longer chain can only come from a cycle in malformed metadata.
const MAX_ALIAS_CHAIN: usize = 1 << 20;

/// The longest typedef chain followed when looking for a bit-field's storage unit size.
const MAX_STORAGE_CHAIN: usize = 64;

/// The prefix used for naming anonymous members.
const ANON_FIELD_NAME: &str = "__anon";

/// The place that a resolved type is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Root,
    Pointee(TypeId),
    Element(TypeId),
    Member(TypeId, usize),
}

#[derive(Debug)]
enum Work<O> {
    /// Resolve the type entry `die` into `slot`.
    Type { die: O, slot: Slot, aliases: usize },
    /// Resolve member `index` of the struct or union `parent` from the member entry `die`.
    Member { die: O, parent: TypeId, index: usize },
}

/// Resolves type entries from a [DebugInfo] source into a [TypeTable].
///
/// Resolution never recurses: work items are kept on an explicit stack, so arbitrarily deep
/// type graphs can be resolved. Every non-alias type entry is resolved at most once per
/// resolver and shared by all of its uses, which also makes self-referential types terminate.
///
/// Failures are local. An entry that can't be read, or that has an unsupported shape, becomes
/// [TypeId::UNKNOWN] (or an unknown descriptor that keeps its name and size) and a warning is
/// logged. The rest of the type is still resolved.
#[derive(Debug)]
pub struct TypeResolver<'a, D: DebugInfo> {
    info: &'a D,
    types: TypeTable,
    cache: HashMap<D::Offset, TypeId>,
    root: QualifiedType,
}

impl<'a, D: DebugInfo> TypeResolver<'a, D> {
    /// Create a resolver reading from `info`.
    pub fn new(info: &'a D) -> Self {
        Self {
            info,
            types: TypeTable::new(),
            cache: HashMap::new(),
            root: QualifiedType::unknown(),
        }
    }

    /// The descriptors resolved so far.
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Consume the resolver, returning the resolved descriptors.
    pub fn into_types(self) -> TypeTable {
        self.types
    }

    /// Resolve the type entry at `die`.
    ///
    /// The returned type, and all types reachable from it, are stored in [types](Self::types).
    pub fn resolve(&mut self, die: D::Offset) -> QualifiedType {
        self.root = QualifiedType::unknown();

        let mut stack = vec![Work::Type {
            die,
            slot: Slot::Root,
            aliases: 0,
        }];
        while let Some(work) = stack.pop() {
            match work {
                Work::Type { die, slot, aliases } => {
                    self.resolve_type(die, slot, aliases, &mut stack)
                }
                Work::Member { die, parent, index } => {
                    self.resolve_member(die, parent, index, &mut stack)
                }
            }
        }

        self.fill_array_sizes();
        self.name_anonymous_members();

        debug!(
            "resolved {:?} to {} ({} descriptors)",
            die,
            self.types.type_name(&self.root),
            self.types.len()
        );
        self.root.clone()
    }

    fn resolve_type(
        &mut self,
        die: D::Offset,
        slot: Slot,
        aliases: usize,
        stack: &mut Vec<Work<D::Offset>>,
    ) {
        if let Some(&id) = self.cache.get(&die) {
            self.set_slot(slot, id);
            return;
        }

        let entry = match self.info.entry(die) {
            Ok(entry) => entry,
            Err(error) => {
                warn!("failed to read type entry {:?}: {}", die, error);
                self.set_slot(slot, TypeId::UNKNOWN);
                return;
            }
        };

        match entry.tag {
            gimli::DW_TAG_typedef
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_restrict_type => {
                if aliases >= MAX_ALIAS_CHAIN {
                    warn!("typedef chain at {:?} is too long, treating as unknown", die);
                    self.set_slot(slot, TypeId::UNKNOWN);
                    return;
                }
                if let Some(target) = self.slot_mut(slot) {
                    match entry.tag {
                        gimli::DW_TAG_typedef => {
                            if target.alias.is_none() {
                                target.alias = entry.name.clone();
                            }
                        }
                        gimli::DW_TAG_const_type => target.is_const = true,
                        gimli::DW_TAG_volatile_type => target.is_volatile = true,
                        _ => {}
                    }
                }
                // The underlying type is written to the same slot.
                match entry.type_ref {
                    Some(underlying) => stack.push(Work::Type {
                        die: underlying,
                        slot,
                        aliases: aliases + 1,
                    }),
                    None => self.set_slot(slot, TypeId::VOID),
                }
            }

            gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type => {
                let size = entry.byte_size.unwrap_or(DEFAULT_POINTER_SIZE);
                let kind = TypeKind::Pointer {
                    pointee: QualifiedType::new(TypeId::VOID),
                };
                let id = self.allocate(die, slot, TypeDescriptor::new(kind, None, size));
                if let Some(pointee) = entry.type_ref {
                    stack.push(Work::Type {
                        die: pointee,
                        slot: Slot::Pointee(id),
                        aliases: 0,
                    });
                }
            }

            gimli::DW_TAG_array_type => {
                let dimensions = self.read_dimensions(&entry);
                let total_elements = if dimensions.is_empty() {
                    0
                } else {
                    dimensions
                        .iter()
                        .try_fold(1usize, |total, &length| total.checked_mul(length))
                        .unwrap_or_else(|| {
                            warn!("array {:?} has too many elements", die);
                            0
                        })
                };
                let kind = TypeKind::Array {
                    element: QualifiedType::unknown(),
                    dimensions,
                    total_elements,
                };
                // A missing byte size is filled in once the element size is known.
                let size = entry.byte_size.unwrap_or(0);
                let id = self.allocate(die, slot, TypeDescriptor::new(kind, None, size));
                match entry.type_ref {
                    Some(element) => stack.push(Work::Type {
                        die: element,
                        slot: Slot::Element(id),
                        aliases: 0,
                    }),
                    None => warn!("array {:?} has no element type", die),
                }
            }

            gimli::DW_TAG_structure_type
            | gimli::DW_TAG_class_type
            | gimli::DW_TAG_union_type => {
                if entry.is_declaration && entry.byte_size.is_none() {
                    debug!("{:?} is only declared, treating as unknown", entry.name);
                    let descriptor = TypeDescriptor::new(TypeKind::Unknown, entry.name.clone(), 0);
                    self.allocate(die, slot, descriptor);
                    return;
                }

                let member_dies: Vec<D::Offset> = entry
                    .children_with_tag(gimli::DW_TAG_member)
                    .copied()
                    .collect();
                let members: Vec<Member> = member_dies
                    .iter()
                    .map(|_| Member {
                        name: String::new(),
                        offset: 0,
                        bit_field: None,
                        data_type: QualifiedType::unknown(),
                    })
                    .collect();
                let kind = if entry.tag == gimli::DW_TAG_union_type {
                    TypeKind::Union { members }
                } else {
                    TypeKind::Struct { members }
                };
                let size = entry.byte_size.unwrap_or(0);
                let descriptor = TypeDescriptor::new(kind, entry.name.clone(), size);
                let parent = self.allocate(die, slot, descriptor);

                // Reversed so that members are processed in declaration order.
                for (index, &member) in member_dies.iter().enumerate().rev() {
                    stack.push(Work::Member {
                        die: member,
                        parent,
                        index,
                    });
                }
            }

            gimli::DW_TAG_enumeration_type => {
                let mut enumerators = IndexMap::new();
                for &child in entry.children_with_tag(gimli::DW_TAG_enumerator) {
                    match self.info.entry(child) {
                        Ok(Entry {
                            name: Some(name),
                            const_value: Some(value),
                            ..
                        }) => {
                            enumerators.insert(name, value);
                        }
                        Ok(_) => warn!("enumerator {:?} is missing a name or value", child),
                        Err(error) => warn!("failed to read enumerator {:?}: {}", child, error),
                    }
                }
                let size = entry.byte_size.unwrap_or(DEFAULT_ENUM_SIZE);
                let kind = TypeKind::Enum { enumerators };
                self.allocate(die, slot, TypeDescriptor::new(kind, entry.name.clone(), size));
            }

            gimli::DW_TAG_base_type => {
                let size = entry.byte_size.unwrap_or(0);
                let kind = base_type_kind(&entry, size);
                if kind == TypeKind::Unknown {
                    warn!(
                        "unsupported base type {:?} with size {}",
                        entry.name, size
                    );
                }
                self.allocate(die, slot, TypeDescriptor::new(kind, entry.name.clone(), size));
            }

            gimli::DW_TAG_subroutine_type => {
                let descriptor = TypeDescriptor::new(TypeKind::Unknown, None, 0);
                self.allocate(die, slot, descriptor);
            }

            tag => {
                warn!("unsupported type entry {} at {:?}", tag, die);
                let size = entry.byte_size.unwrap_or(0);
                let descriptor = TypeDescriptor::new(TypeKind::Unknown, entry.name.clone(), size);
                self.allocate(die, slot, descriptor);
            }
        }
    }

    fn resolve_member(
        &mut self,
        die: D::Offset,
        parent: TypeId,
        index: usize,
        stack: &mut Vec<Work<D::Offset>>,
    ) {
        let entry = match self.info.entry(die) {
            Ok(entry) => entry,
            Err(error) => {
                warn!("failed to read member entry {:?}: {}", die, error);
                return;
            }
        };

        let is_union = matches!(self.types.get(parent).kind, TypeKind::Union { .. });
        let storage_size = self.storage_size(&entry);
        let (offset, bit_field) = member_placement(&entry, is_union, storage_size);

        let member = self
            .types
            .get_mut(parent)
            .and_then(|descriptor| descriptor.members_mut())
            .and_then(|members| members.get_mut(index));
        if let Some(member) = member {
            member.name = entry.name.clone().unwrap_or_default();
            member.offset = offset;
            member.bit_field = bit_field;
        }

        match entry.type_ref {
            Some(data_type) => stack.push(Work::Type {
                die: data_type,
                slot: Slot::Member(parent, index),
                aliases: 0,
            }),
            None => warn!("member {:?} has no type", entry.name),
        }
    }

    /// The size of the storage unit holding a member, read from the member itself or from its
    /// type with typedefs and qualifiers stripped.
    fn storage_size(&self, entry: &Entry<D::Offset>) -> Option<usize> {
        if entry.byte_size.is_some() {
            return entry.byte_size;
        }
        let mut next = entry.type_ref;
        for _ in 0..MAX_STORAGE_CHAIN {
            let underlying = self.info.entry(next?).ok()?;
            if underlying.byte_size.is_some() {
                return underlying.byte_size;
            }
            match underlying.tag {
                gimli::DW_TAG_typedef
                | gimli::DW_TAG_const_type
                | gimli::DW_TAG_volatile_type
                | gimli::DW_TAG_restrict_type => next = underlying.type_ref,
                _ => return None,
            }
        }
        None
    }

    fn read_dimensions(&self, entry: &Entry<D::Offset>) -> Vec<usize> {
        entry
            .children_with_tag(gimli::DW_TAG_subrange_type)
            .map(|&child| match self.info.entry(child) {
                Ok(subrange) => subrange
                    .count
                    .or_else(|| subrange.upper_bound.and_then(|bound| bound.checked_add(1)))
                    .unwrap_or(0),
                Err(error) => {
                    warn!("failed to read subrange {:?}: {}", child, error);
                    0
                }
            })
            .collect()
    }

    /// Add a descriptor for `die`, cache it, and store it in `slot`.
    ///
    /// Caching happens before any child work is pushed, so a type that refers back to itself
    /// resolves to the same id.
    fn allocate(&mut self, die: D::Offset, slot: Slot, descriptor: TypeDescriptor) -> TypeId {
        let id = self.types.push(descriptor);
        self.cache.insert(die, id);
        self.set_slot(slot, id);
        id
    }

    fn slot_mut(&mut self, slot: Slot) -> Option<&mut QualifiedType> {
        match slot {
            Slot::Root => Some(&mut self.root),
            Slot::Pointee(id) => match &mut self.types.get_mut(id)?.kind {
                TypeKind::Pointer { pointee } => Some(pointee),
                _ => None,
            },
            Slot::Element(id) => match &mut self.types.get_mut(id)?.kind {
                TypeKind::Array { element, .. } => Some(element),
                _ => None,
            },
            Slot::Member(id, index) => self
                .types
                .get_mut(id)?
                .members_mut()?
                .get_mut(index)
                .map(|member| &mut member.data_type),
        }
    }

    fn set_slot(&mut self, slot: Slot, id: TypeId) {
        if let Some(target) = self.slot_mut(slot) {
            target.id = id;
        }
    }

    /// Compute the size of arrays whose entry had no byte size.
    fn fill_array_sizes(&mut self) {
        // An array of arrays needs its element sized first, so repeat until nothing changes.
        loop {
            let mut changed = false;
            for index in 0..self.types.len() {
                let id = TypeId(index);
                let descriptor = self.types.get(id);
                let size = match &descriptor.kind {
                    TypeKind::Array {
                        element,
                        total_elements,
                        ..
                    } if descriptor.size == 0 => self
                        .types
                        .size_of(element)
                        .checked_mul(*total_elements)
                        .filter(|&size| size > 0),
                    _ => None,
                };
                if let (Some(size), Some(descriptor)) = (size, self.types.get_mut(id)) {
                    descriptor.size = size;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn name_anonymous_members(&mut self) {
        for index in 0..self.types.len() {
            if let Some(members) = self
                .types
                .get_mut(TypeId(index))
                .and_then(|descriptor| descriptor.members_mut())
            {
                if members.iter().any(|member| member.name.is_empty()) {
                    give_unique_names(members);
                }
            }
        }
    }
}

/// Compute the byte offset and bit-field placement of a member.
///
/// A bit-field given only by its bit offset from the start of the struct is placed at the
/// start of the `storage_size` unit that holds its first bit.
fn member_placement<O>(
    entry: &Entry<O>,
    is_union: bool,
    storage_size: Option<usize>,
) -> (usize, Option<BitField>) {
    let offset = if is_union {
        0
    } else {
        match (entry.member_offset, entry.data_bit_offset) {
            (Some(offset), _) => offset,
            (None, Some(bits)) => {
                let unit = storage_size.filter(|&size| size > 0).unwrap_or(1);
                bits / (8 * unit) * unit
            }
            (None, None) => 0,
        }
    };
    let bit_field = entry.bit_size.map(|bit_size| {
        let bit_offset = match entry.data_bit_offset {
            Some(bits) => bits.saturating_sub(offset * 8),
            None => entry.bit_offset.unwrap_or(0),
        };
        BitField {
            bit_size,
            bit_offset,
        }
    });
    (offset, bit_field)
}

fn base_type_kind<O>(entry: &Entry<O>, size: usize) -> TypeKind {
    let signed = || IntType::signed_with_size(size).map(TypeKind::Int);
    let unsigned = || IntType::unsigned_with_size(size).map(TypeKind::Int);
    let float = || FloatType::with_size(size).map(TypeKind::Float);

    let kind = match entry.encoding {
        Some(gimli::DW_ATE_float) => float(),
        Some(gimli::DW_ATE_signed) | Some(gimli::DW_ATE_signed_char) => signed(),
        Some(gimli::DW_ATE_unsigned)
        | Some(gimli::DW_ATE_unsigned_char)
        | Some(gimli::DW_ATE_boolean)
        | Some(gimli::DW_ATE_UTF)
        | Some(gimli::DW_ATE_address) => unsigned(),
        Some(_) => None,
        None => match entry.name.as_deref() {
            Some("float") | Some("double") => float(),
            Some("char") | Some("signed char") | Some("short int") | Some("int")
            | Some("long int") | Some("long long int") => signed(),
            Some("unsigned char")
            | Some("_Bool")
            | Some("short unsigned int")
            | Some("unsigned int")
            | Some("long unsigned int")
            | Some("long long unsigned int") => unsigned(),
            _ => None,
        },
    };
    kind.unwrap_or(TypeKind::Unknown)
}

/// Give every unnamed member a name that isn't used by another member.
fn give_unique_names(members: &mut [Member]) {
    let mut used_names: HashSet<String> = members
        .iter()
        .filter(|member| !member.name.is_empty())
        .map(|member| member.name.clone())
        .collect();
    for member in members.iter_mut().filter(|member| member.name.is_empty()) {
        let name = unique_name(&used_names, ANON_FIELD_NAME);
        used_names.insert(name.clone());
        member.name = name;
    }
}

/// Return a name that isn't present in `used_names`.
fn unique_name(used_names: &HashSet<String>, base_name: &str) -> String {
    let fallbacks = (1..).map(|k| format!("{}_{}", base_name, k));
    iter::once(base_name.to_owned())
        .chain(fallbacks)
        .find(|name| !used_names.contains(name))
        .unwrap_or_else(|| base_name.to_owned())
}

#[cfg(test)]
mod tests {
    use dartt_data_type::{FloatType, IntType, TypeKind};

    use super::*;
    use crate::EntryTable;

    fn int(table: &mut EntryTable) -> usize {
        table.add(
            Entry::new(gimli::DW_TAG_base_type)
                .name("int")
                .byte_size(4)
                .encoding(gimli::DW_ATE_signed),
        )
    }

    fn float(table: &mut EntryTable) -> usize {
        table.add(
            Entry::new(gimli::DW_TAG_base_type)
                .name("float")
                .byte_size(4)
                .encoding(gimli::DW_ATE_float),
        )
    }

    fn member(name: &str, offset: usize, type_ref: usize) -> Entry<usize> {
        Entry::new(gimli::DW_TAG_member)
            .name(name)
            .member_offset(offset)
            .type_ref(type_ref)
    }

    #[test]
    fn struct_members_keep_declaration_order() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let float = float(&mut table);
        let s = table.add(
            Entry::new(gimli::DW_TAG_structure_type)
                .name("sample")
                .byte_size(12),
        );
        table.add_child(s, member("first", 0, int));
        table.add_child(s, member("second", 4, float));
        table.add_child(s, member("third", 8, int));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(s);
        let types = resolver.types();

        let descriptor = types.get(root.id);
        assert_eq!(descriptor.size, 12);
        assert_eq!(descriptor.name.as_deref(), Some("sample"));
        let members = descriptor.members();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
        let offsets: Vec<usize> = members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, [0, 4, 8]);
        assert_eq!(
            types.get(members[1].data_type.id).kind,
            TypeKind::Float(FloatType::F32)
        );
        assert_eq!(
            types.get(members[2].data_type.id).kind,
            TypeKind::Int(IntType::S32)
        );
    }

    #[test]
    fn typedefs_and_qualifiers_are_transparent() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let volatile = table.add(Entry::new(gimli::DW_TAG_volatile_type).type_ref(int));
        let konst = table.add(Entry::new(gimli::DW_TAG_const_type).type_ref(volatile));
        let inner = table.add(
            Entry::new(gimli::DW_TAG_typedef)
                .name("inner_t")
                .type_ref(konst),
        );
        let outer = table.add(
            Entry::new(gimli::DW_TAG_typedef)
                .name("outer_t")
                .type_ref(inner),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(outer);
        assert_eq!(root.alias.as_deref(), Some("outer_t"));
        assert!(root.is_const);
        assert!(root.is_volatile);
        assert_eq!(resolver.types().get(root.id).kind, TypeKind::Int(IntType::S32));
        assert_eq!(resolver.types().size_of(&root), 4);

        // The bare int is shared with the aliased use.
        let plain = resolver.resolve(int);
        assert_eq!(plain.id, root.id);
        assert_eq!(plain.alias, None);
    }

    #[test]
    fn self_referential_struct_terminates() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let node = table.add(
            Entry::new(gimli::DW_TAG_structure_type)
                .name("node")
                .byte_size(8),
        );
        let pointer = table.add(
            Entry::new(gimli::DW_TAG_pointer_type)
                .byte_size(4)
                .type_ref(node),
        );
        table.add_child(node, member("value", 0, int));
        table.add_child(node, member("next", 4, pointer));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(node);
        let types = resolver.types();
        let next = &types.get(root.id).members()[1];
        match &types.get(next.data_type.id).kind {
            TypeKind::Pointer { pointee } => assert_eq!(pointee.id, root.id),
            kind => panic!("expected pointer, found {:?}", kind),
        }
        assert_eq!(types.type_name(&next.data_type), "struct node*");
    }

    #[test]
    fn void_pointer_defaults() {
        let mut table = EntryTable::new();
        let pointer = table.add(Entry::new(gimli::DW_TAG_pointer_type));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(pointer);
        let descriptor = resolver.types().get(root.id);
        assert_eq!(descriptor.size, DEFAULT_POINTER_SIZE);
        assert_eq!(
            descriptor.kind,
            TypeKind::Pointer {
                pointee: QualifiedType::new(TypeId::VOID)
            }
        );
    }

    #[test]
    fn arrays_read_all_dimensions() {
        let mut table = EntryTable::new();
        let float = float(&mut table);
        let matrix = table.add(Entry::new(gimli::DW_TAG_array_type).type_ref(float));
        table.add_child(matrix, Entry::new(gimli::DW_TAG_subrange_type).upper_bound(1));
        table.add_child(matrix, Entry::new(gimli::DW_TAG_subrange_type).count(3));
        let flexible = table.add(Entry::new(gimli::DW_TAG_array_type).type_ref(float));
        table.add_child(flexible, Entry::new(gimli::DW_TAG_subrange_type));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(matrix);
        let descriptor = resolver.types().get(root.id).clone();
        match &descriptor.kind {
            TypeKind::Array {
                dimensions,
                total_elements,
                ..
            } => {
                assert_eq!(dimensions, &[2, 3]);
                assert_eq!(*total_elements, 6);
            }
            kind => panic!("expected array, found {:?}", kind),
        }
        // No byte size in the entry, so it is element size times count.
        assert_eq!(descriptor.size, 24);
        assert_eq!(resolver.types().type_name(&root), "float[2][3]");

        let root = resolver.resolve(flexible);
        let descriptor = resolver.types().get(root.id);
        assert_eq!(descriptor.size, 0);
        match &descriptor.kind {
            TypeKind::Array {
                total_elements, ..
            } => assert_eq!(*total_elements, 0),
            kind => panic!("expected array, found {:?}", kind),
        }
    }

    #[test]
    fn union_members_start_at_zero() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let float = float(&mut table);
        let u = table.add(
            Entry::new(gimli::DW_TAG_union_type)
                .name("either")
                .byte_size(4),
        );
        table.add_child(u, member("i", 0, int));
        table.add_child(u, member("f", 4, float));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(u);
        let members = resolver.types().get(root.id).members().to_vec();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|member| member.offset == 0));
        assert!(matches!(
            resolver.types().get(root.id).kind,
            TypeKind::Union { .. }
        ));
    }

    #[test]
    fn enum_constants_keep_order() {
        let mut table = EntryTable::new();
        let e = table.add(Entry::new(gimli::DW_TAG_enumeration_type).name("mode"));
        table.add_child(
            e,
            Entry::new(gimli::DW_TAG_enumerator)
                .name("MODE_OFF")
                .const_value(0),
        );
        table.add_child(
            e,
            Entry::new(gimli::DW_TAG_enumerator)
                .name("MODE_ON")
                .const_value(7),
        );
        table.add_child(
            e,
            Entry::new(gimli::DW_TAG_enumerator)
                .name("MODE_FAULT")
                .const_value(-1),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(e);
        let descriptor = resolver.types().get(root.id);
        assert_eq!(descriptor.size, DEFAULT_ENUM_SIZE);
        match &descriptor.kind {
            TypeKind::Enum { enumerators } => {
                let pairs: Vec<(&str, i64)> = enumerators
                    .iter()
                    .map(|(name, value)| (name.as_str(), *value))
                    .collect();
                assert_eq!(pairs, [("MODE_OFF", 0), ("MODE_ON", 7), ("MODE_FAULT", -1)]);
            }
            kind => panic!("expected enum, found {:?}", kind),
        }
        assert_eq!(resolver.types().type_name(&root), "enum mode");
    }

    #[test]
    fn bit_fields_record_placement() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let s = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(4));
        table.add_child(
            s,
            Entry::new(gimli::DW_TAG_member)
                .name("lo")
                .bit_field(3, 0)
                .type_ref(int),
        );
        table.add_child(
            s,
            Entry::new(gimli::DW_TAG_member)
                .name("hi")
                .bit_field(5, 13)
                .type_ref(int),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(s);
        let placements: Vec<(usize, Option<BitField>)> = resolver
            .types()
            .get(root.id)
            .members()
            .iter()
            .map(|member| (member.offset, member.bit_field))
            .collect();
        assert_eq!(
            placements,
            [
                (
                    0,
                    Some(BitField {
                        bit_size: 3,
                        bit_offset: 0
                    })
                ),
                (
                    0,
                    Some(BitField {
                        bit_size: 5,
                        bit_offset: 13
                    })
                ),
            ]
        );
    }

    #[test]
    fn bit_field_units_follow_typedefs() {
        let mut table = EntryTable::new();
        let short = table.add(
            Entry::new(gimli::DW_TAG_base_type)
                .name("short unsigned int")
                .byte_size(2)
                .encoding(gimli::DW_ATE_unsigned),
        );
        let flags_t = table.add(
            Entry::new(gimli::DW_TAG_typedef)
                .name("flags_t")
                .type_ref(short),
        );
        let volatile = table.add(Entry::new(gimli::DW_TAG_volatile_type).type_ref(flags_t));
        let s = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(4));
        table.add_child(
            s,
            Entry::new(gimli::DW_TAG_member)
                .name("ready")
                .bit_field(1, 17)
                .type_ref(volatile),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(s);
        let member = &resolver.types().get(root.id).members()[0];
        assert_eq!(member.offset, 2);
        assert_eq!(
            member.bit_field,
            Some(BitField {
                bit_size: 1,
                bit_offset: 1
            })
        );
    }

    #[test]
    fn unresolvable_reference_degrades_one_member() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let s = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(8));
        table.add_child(s, member("broken", 0, 9999));
        table.add_child(s, member("fine", 4, int));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(s);
        let types = resolver.types();
        let members = types.get(root.id).members();
        assert_eq!(members[0].data_type.id, TypeId::UNKNOWN);
        assert_eq!(types.size_of(&members[0].data_type), 0);
        assert_eq!(types.get(members[1].data_type.id).kind, TypeKind::Int(IntType::S32));
    }

    #[test]
    fn shared_types_are_read_once() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let point = table.add(
            Entry::new(gimli::DW_TAG_structure_type)
                .name("point")
                .byte_size(8),
        );
        table.add_child(point, member("x", 0, int));
        table.add_child(point, member("y", 4, int));
        let line = table.add(
            Entry::new(gimli::DW_TAG_structure_type)
                .name("line")
                .byte_size(16),
        );
        table.add_child(line, member("start", 0, point));
        table.add_child(line, member("end", 8, point));

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(line);
        let members = resolver.types().get(root.id).members();
        assert_eq!(members[0].data_type.id, members[1].data_type.id);
        // line, start, point, x, int, y, end
        assert_eq!(table.reads(), 7);
    }

    #[test]
    fn long_typedef_chains_do_not_recurse() {
        let mut table = EntryTable::new();
        let mut current = int(&mut table);
        for i in 0..100_000 {
            current = table.add(
                Entry::new(gimli::DW_TAG_typedef)
                    .name(&format!("t{}", i))
                    .type_ref(current),
            );
        }

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(current);
        assert_eq!(root.alias.as_deref(), Some("t99999"));
        assert_eq!(resolver.types().get(root.id).kind, TypeKind::Int(IntType::S32));
    }

    #[test]
    fn anonymous_members_get_unique_names() {
        let mut table = EntryTable::new();
        let int = int(&mut table);
        let s = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(12));
        table.add_child(s, Entry::new(gimli::DW_TAG_member).type_ref(int));
        table.add_child(s, member("__anon", 4, int));
        table.add_child(
            s,
            Entry::new(gimli::DW_TAG_member)
                .member_offset(8)
                .type_ref(int),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(s);
        let names: Vec<String> = resolver
            .types()
            .get(root.id)
            .members()
            .iter()
            .map(|member| member.name.clone())
            .collect();
        assert_eq!(names, ["__anon_1", "__anon", "__anon_2"]);
    }

    #[test]
    fn declarations_are_unknown_but_named() {
        let mut table = EntryTable::new();
        let opaque = table.add(
            Entry::new(gimli::DW_TAG_structure_type)
                .name("opaque")
                .declaration(),
        );

        let mut resolver = TypeResolver::new(&table);
        let root = resolver.resolve(opaque);
        let descriptor = resolver.types().get(root.id);
        assert_eq!(descriptor.kind, TypeKind::Unknown);
        assert_eq!(descriptor.name.as_deref(), Some("opaque"));
        assert_eq!(descriptor.size, 0);
    }
}
