//! Types and functions for representing C data types.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Integer types of different sizes and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntType {
    /// 8 bit unsigned int
    U8,
    /// 8 bit signed int
    S8,
    /// 16 bit unsigned int
    U16,
    /// 16 bit signed int
    S16,
    /// 32 bit unsigned int
    U32,
    /// 32 bit signed int
    S32,
    /// 64 bit unsigned int
    U64,
    /// 64 bit signed int
    S64,
}

/// Float types of different sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatType {
    /// 32 bit float
    F32,
    /// 64 bit float
    F64,
}

impl IntType {
    /// The size of the int in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S8 => 1,
            Self::U16 => 2,
            Self::S16 => 2,
            Self::U32 => 4,
            Self::S32 => 4,
            Self::U64 => 8,
            Self::S64 => 8,
        }
    }

    /// Return true if the int type is signed.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    /// Returns an unsigned int type with the given size in bytes, if one exists.
    pub fn unsigned_with_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }

    /// Returns a signed int type with the given size in bytes, if one exists.
    pub fn signed_with_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(Self::S8),
            2 => Some(Self::S16),
            4 => Some(Self::S32),
            8 => Some(Self::S64),
            _ => None,
        }
    }
}

impl FloatType {
    /// The size of the float in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Returns the float type with the given size in bytes, if one exists.
    pub fn with_size(size: usize) -> Option<Self> {
        match size {
            4 => Some(Self::F32),
            8 => Some(Self::F64),
            _ => None,
        }
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntType::U8 => write!(f, "uint8_t"),
            IntType::S8 => write!(f, "int8_t"),
            IntType::U16 => write!(f, "uint16_t"),
            IntType::S16 => write!(f, "int16_t"),
            IntType::U32 => write!(f, "uint32_t"),
            IntType::S32 => write!(f, "int32_t"),
            IntType::U64 => write!(f, "uint64_t"),
            IntType::S64 => write!(f, "int64_t"),
        }
    }
}

impl fmt::Display for FloatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatType::F32 => write!(f, "float"),
            FloatType::F64 => write!(f, "double"),
        }
    }
}

/// Byte order of the target that a layout was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Default for Endian {
    fn default() -> Self {
        Self::Little
    }
}

/// An index into a [TypeTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

impl TypeId {
    /// The shared descriptor used for anything that could not be resolved.
    pub const UNKNOWN: TypeId = TypeId(0);
    /// The shared `void` descriptor.
    pub const VOID: TypeId = TypeId(1);
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A use of a type, together with the qualifiers and typedef name it was reached through.
///
/// Qualifiers and aliases never change the layout of the underlying descriptor, so they are
/// kept here instead of in the (shared) descriptor itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedType {
    /// The underlying type.
    pub id: TypeId,
    /// True if a `const` qualifier was applied.
    pub is_const: bool,
    /// True if a `volatile` qualifier was applied.
    pub is_volatile: bool,
    /// The outermost typedef name, if any.
    pub alias: Option<String>,
}

impl QualifiedType {
    /// An unqualified use of `id`.
    pub fn new(id: TypeId) -> Self {
        Self {
            id,
            is_const: false,
            is_volatile: false,
            alias: None,
        }
    }

    /// An unqualified use of the unknown type.
    pub fn unknown() -> Self {
        Self::new(TypeId::UNKNOWN)
    }
}

/// Bit-field placement of a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitField {
    /// The number of bits in the field.
    pub bit_size: usize,
    /// The bit offset of the field within its storage unit.
    pub bit_offset: usize,
}

/// A member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The member name.
    ///
    /// Anonymous members are given a name on construction, typically `__anon`.
    pub name: String,
    /// The byte offset relative to the start of the containing struct or union.
    pub offset: usize,
    /// Bit-field placement, if the member is a bit-field.
    pub bit_field: Option<BitField>,
    /// The type of the member.
    pub data_type: QualifiedType,
}

/// The closed set of type shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// A type that could not be resolved, or is not supported.
    Unknown,
    /// Void, typically used as a pointer target.
    Void,
    /// An integer type.
    Int(IntType),
    /// A float type.
    Float(FloatType),
    /// A pointer type.
    Pointer {
        /// The type being pointed to.
        pointee: QualifiedType,
    },
    /// An array type, possibly multi-dimensional.
    Array {
        /// The element type.
        element: QualifiedType,
        /// The length of each dimension, outermost first. Flexible dimensions are 0.
        dimensions: Vec<usize>,
        /// The product of the dimensions.
        total_elements: usize,
    },
    /// A struct type with members in declaration order.
    Struct {
        /// The members of the struct.
        members: Vec<Member>,
    },
    /// A union type with members in declaration order.
    Union {
        /// The members of the union. All offsets are 0.
        members: Vec<Member>,
    },
    /// An enum type.
    Enum {
        /// The named constants in declaration order.
        enumerators: IndexMap<String, i64>,
    },
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// The shape of the type.
    pub kind: TypeKind,
    /// The tag or base type name, e.g. `mything_t` for `struct mything_t`.
    pub name: Option<String>,
    /// The size of the type in bytes.
    pub size: usize,
}

impl TypeDescriptor {
    /// Create a descriptor.
    pub fn new(kind: TypeKind, name: Option<String>, size: usize) -> Self {
        Self { kind, name, size }
    }

    /// Return the struct or union members, or an empty slice for other kinds.
    pub fn members(&self) -> &[Member] {
        match &self.kind {
            TypeKind::Struct { members } | TypeKind::Union { members } => members,
            _ => &[],
        }
    }

    /// Mutable version of [members](Self::members).
    pub fn members_mut(&mut self) -> Option<&mut Vec<Member>> {
        match &mut self.kind {
            TypeKind::Struct { members } | TypeKind::Union { members } => Some(members),
            _ => None,
        }
    }
}

/// An arena of type descriptors.
///
/// Descriptors reference each other by [TypeId], so shared and self-referential types are
/// stored exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable {
    types: Vec<TypeDescriptor>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table holding only the unknown and void descriptors.
    pub fn new() -> Self {
        Self {
            types: vec![
                TypeDescriptor::new(TypeKind::Unknown, None, 0),
                TypeDescriptor::new(TypeKind::Void, None, 0),
            ],
        }
    }

    /// Add a descriptor and return its id.
    pub fn push(&mut self, descriptor: TypeDescriptor) -> TypeId {
        self.types.push(descriptor);
        TypeId(self.types.len() - 1)
    }

    /// Look up a descriptor. Ids from another table resolve to the unknown descriptor.
    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        self.types.get(id.0).unwrap_or(&self.types[TypeId::UNKNOWN.0])
    }

    /// Look up a descriptor mutably.
    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeDescriptor> {
        self.types.get_mut(id.0)
    }

    /// The number of descriptors, including the two built-in ones.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false, since the built-in descriptors are present.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The size of a type in bytes.
    pub fn size_of(&self, data_type: &QualifiedType) -> usize {
        self.get(data_type.id).size
    }

    /// Return a C-like display name for a type, e.g. `float[3]`, `struct node*` or `MyAlias`.
    pub fn type_name(&self, data_type: &QualifiedType) -> String {
        // Suffixes are collected outermost first and applied innermost first.
        let mut suffixes: Vec<String> = Vec::new();
        let mut current = data_type;
        let mut steps = 0;

        let base = loop {
            if let Some(alias) = &current.alias {
                break alias.clone();
            }
            steps += 1;
            if steps > self.types.len() {
                break "<cycle>".to_owned();
            }

            let descriptor = self.get(current.id);
            match &descriptor.kind {
                TypeKind::Unknown => {
                    break descriptor.name.clone().unwrap_or_else(|| "<unknown>".to_owned())
                }
                TypeKind::Void => break "void".to_owned(),
                TypeKind::Int(int_type) => {
                    break descriptor
                        .name
                        .clone()
                        .unwrap_or_else(|| int_type.to_string())
                }
                TypeKind::Float(float_type) => {
                    break descriptor
                        .name
                        .clone()
                        .unwrap_or_else(|| float_type.to_string())
                }
                TypeKind::Pointer { pointee } => {
                    suffixes.push("*".to_owned());
                    current = pointee;
                }
                TypeKind::Array {
                    element,
                    dimensions,
                    ..
                } => {
                    let suffix: String = dimensions.iter().map(|d| format!("[{}]", d)).collect();
                    suffixes.push(suffix);
                    current = element;
                }
                TypeKind::Struct { .. } => break tagged_name("struct", &descriptor.name),
                TypeKind::Union { .. } => break tagged_name("union", &descriptor.name),
                TypeKind::Enum { .. } => break tagged_name("enum", &descriptor.name),
            }
        };

        let mut name = base;
        for suffix in suffixes.iter().rev() {
            name.push_str(suffix);
        }
        name
    }
}

fn tagged_name(tag: &str, name: &Option<String>) -> String {
    match name {
        Some(name) => format!("{} {}", tag, name),
        None => format!("{} <anonymous>", tag),
    }
}
