//! Field classifications and the fixed-width values held by leaf fields.

use std::{convert::TryInto, fmt, mem};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{ValueSizeError, ValueTypeError},
    Endian, FloatType, IntType, QualifiedType, TypeKind, TypeTable,
};

/// The closed classification of a field.
///
/// The serialized names match the `type` tags of the persisted description. When reading, C
/// type names are also accepted and any unrecognized tag becomes [Unknown](Self::Unknown), see
/// [from_type_tag](Self::from_type_tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A struct.
    Struct,
    /// A union.
    Union,
    /// An array.
    Array,
    /// 32 bit float.
    Float,
    /// 64 bit float.
    Double,
    /// 8 bit signed int.
    Int8,
    /// 8 bit unsigned int.
    UInt8,
    /// 16 bit signed int.
    Int16,
    /// 16 bit unsigned int.
    UInt16,
    /// 32 bit signed int.
    Int32,
    /// 32 bit unsigned int.
    UInt32,
    /// 64 bit signed int.
    Int64,
    /// 64 bit unsigned int.
    UInt64,
    /// A pointer, stored as an unsigned int of the pointer's width.
    Pointer,
    /// An enum, stored as a signed int of the enum's width.
    Enum,
    /// A type that could not be resolved.
    Unknown,
}

impl Default for FieldKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_type_tag(&tag))
    }
}

impl FieldKind {
    /// Parse a `type` tag, which is either a serialized kind name or a C type name.
    ///
    /// Pointer types (`T *`) and `struct `, `union ` and `enum ` names map to their kind. Any
    /// other unrecognized name is [Unknown](Self::Unknown).
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "struct" => Self::Struct,
            "union" => Self::Union,
            "array" => Self::Array,
            "float" | "f32" => Self::Float,
            "double" | "f64" => Self::Double,
            "int8" | "int8_t" | "char" | "signed char" => Self::Int8,
            "uint8" | "uint8_t" | "unsigned char" | "bool" | "_Bool" => Self::UInt8,
            "int16" | "int16_t" | "short" | "short int" => Self::Int16,
            "uint16" | "uint16_t" | "unsigned short" | "unsigned short int"
            | "short unsigned int" => Self::UInt16,
            "int32" | "int32_t" | "int" | "long" | "long int" => Self::Int32,
            "uint32" | "uint32_t" | "unsigned int" | "unsigned long" | "unsigned long int"
            | "long unsigned int" => Self::UInt32,
            "int64" | "int64_t" | "long long" | "long long int" => Self::Int64,
            "uint64" | "uint64_t" | "unsigned long long" | "unsigned long long int"
            | "long long unsigned int" => Self::UInt64,
            "pointer" => Self::Pointer,
            "enum" => Self::Enum,
            _ if tag.ends_with('*') => Self::Pointer,
            _ if tag.starts_with("struct ") => Self::Struct,
            _ if tag.starts_with("union ") => Self::Union,
            _ if tag.starts_with("enum ") => Self::Enum,
            _ => Self::Unknown,
        }
    }

    /// Classify a resolved type.
    pub fn classify(types: &TypeTable, data_type: &QualifiedType) -> Self {
        match &types.get(data_type.id).kind {
            TypeKind::Unknown | TypeKind::Void => Self::Unknown,
            TypeKind::Int(int_type) => Self::from(*int_type),
            TypeKind::Float(FloatType::F32) => Self::Float,
            TypeKind::Float(FloatType::F64) => Self::Double,
            TypeKind::Pointer { .. } => Self::Pointer,
            TypeKind::Array { .. } => Self::Array,
            TypeKind::Struct { .. } => Self::Struct,
            TypeKind::Union { .. } => Self::Union,
            TypeKind::Enum { .. } => Self::Enum,
        }
    }

    /// Return true for kinds whose fields have children.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Struct | Self::Union | Self::Array)
    }

    /// The fixed width of the kind in bytes, if it has one.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Float | Self::Int32 | Self::UInt32 => Some(4),
            Self::Double | Self::Int64 | Self::UInt64 => Some(8),
            _ => None,
        }
    }
}

impl From<IntType> for FieldKind {
    fn from(int_type: IntType) -> Self {
        match int_type {
            IntType::U8 => Self::UInt8,
            IntType::S8 => Self::Int8,
            IntType::U16 => Self::UInt16,
            IntType::S16 => Self::Int16,
            IntType::U32 => Self::UInt32,
            IntType::S32 => Self::Int32,
            IntType::U64 => Self::UInt64,
            IntType::S64 => Self::Int64,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Array => "array",
            Self::Float => "float",
            Self::Double => "double",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Pointer => "pointer",
            Self::Enum => "enum",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// The value held by a leaf field.
///
/// The variant always matches the field's classification and size exactly; see
/// [FieldValue::zero].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// 32 bit float
    F32(f32),
    /// 64 bit float
    F64(f64),
    /// 8 bit signed int
    I8(i8),
    /// 8 bit unsigned int
    U8(u8),
    /// 16 bit signed int
    I16(i16),
    /// 16 bit unsigned int
    U16(u16),
    /// 32 bit signed int
    I32(i32),
    /// 32 bit unsigned int
    U32(u32),
    /// 64 bit signed int
    I64(i64),
    /// 64 bit unsigned int
    U64(u64),
}

macro_rules! decode {
    ($ty:ty, $src:expr, $endian:expr) => {{
        let bytes: [u8; mem::size_of::<$ty>()] = $src.try_into().map_err(|_| ValueSizeError {
            expected: mem::size_of::<$ty>(),
            actual: $src.len(),
        })?;
        match $endian {
            Endian::Little => <$ty>::from_le_bytes(bytes),
            Endian::Big => <$ty>::from_be_bytes(bytes),
        }
    }};
}

macro_rules! encode {
    ($value:expr, $dst:expr, $endian:expr) => {{
        let bytes = match $endian {
            Endian::Little => $value.to_le_bytes(),
            Endian::Big => $value.to_be_bytes(),
        };
        if $dst.len() != bytes.len() {
            return Err(ValueSizeError {
                expected: bytes.len(),
                actual: $dst.len(),
            });
        }
        $dst.copy_from_slice(&bytes);
    }};
}

impl FieldValue {
    /// The zero value for a leaf of the given kind and size.
    ///
    /// Returns None for composite and unknown kinds, and for sizes that don't match the kind.
    pub fn zero(kind: FieldKind, size: usize) -> Option<Self> {
        let value = match kind {
            FieldKind::Float => Self::F32(0.0),
            FieldKind::Double => Self::F64(0.0),
            FieldKind::Int8 => Self::I8(0),
            FieldKind::UInt8 => Self::U8(0),
            FieldKind::Int16 => Self::I16(0),
            FieldKind::UInt16 => Self::U16(0),
            FieldKind::Int32 => Self::I32(0),
            FieldKind::UInt32 => Self::U32(0),
            FieldKind::Int64 => Self::I64(0),
            FieldKind::UInt64 => Self::U64(0),
            FieldKind::Pointer => match size {
                1 => Self::U8(0),
                2 => Self::U16(0),
                4 => Self::U32(0),
                8 => Self::U64(0),
                _ => return None,
            },
            FieldKind::Enum => match size {
                1 => Self::I8(0),
                2 => Self::I16(0),
                4 => Self::I32(0),
                8 => Self::I64(0),
                _ => return None,
            },
            FieldKind::Struct | FieldKind::Union | FieldKind::Array | FieldKind::Unknown => {
                return None
            }
        };
        if value.size() == size {
            Some(value)
        } else {
            None
        }
    }

    /// The size of the value in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::I8(_) | Self::U8(_) => 1,
            Self::I16(_) | Self::U16(_) => 2,
            Self::F32(_) | Self::I32(_) | Self::U32(_) => 4,
            Self::F64(_) | Self::I64(_) | Self::U64(_) => 8,
        }
    }

    /// Return true if `other` has the same variant as `self`.
    pub fn same_variant(&self, other: &FieldValue) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// Return an error unless `value` can be stored in place of `self`.
    pub fn check_replacement(&self, value: &FieldValue) -> Result<(), ValueTypeError> {
        if self.same_variant(value) {
            Ok(())
        } else {
            Err(ValueTypeError {
                expected: self.variant_name().into(),
                actual: *value,
            })
        }
    }

    /// Encode the value into `dst`, which must be exactly [size](Self::size) bytes long.
    pub fn write_to(&self, dst: &mut [u8], endian: Endian) -> Result<(), ValueSizeError> {
        match *self {
            Self::F32(v) => encode!(v, dst, endian),
            Self::F64(v) => encode!(v, dst, endian),
            Self::I8(v) => encode!(v, dst, endian),
            Self::U8(v) => encode!(v, dst, endian),
            Self::I16(v) => encode!(v, dst, endian),
            Self::U16(v) => encode!(v, dst, endian),
            Self::I32(v) => encode!(v, dst, endian),
            Self::U32(v) => encode!(v, dst, endian),
            Self::I64(v) => encode!(v, dst, endian),
            Self::U64(v) => encode!(v, dst, endian),
        }
        Ok(())
    }

    /// Decode `src` into `self`, keeping the current variant.
    pub fn read_from(&mut self, src: &[u8], endian: Endian) -> Result<(), ValueSizeError> {
        *self = match *self {
            Self::F32(_) => Self::F32(decode!(f32, src, endian)),
            Self::F64(_) => Self::F64(decode!(f64, src, endian)),
            Self::I8(_) => Self::I8(decode!(i8, src, endian)),
            Self::U8(_) => Self::U8(decode!(u8, src, endian)),
            Self::I16(_) => Self::I16(decode!(i16, src, endian)),
            Self::U16(_) => Self::U16(decode!(u16, src, endian)),
            Self::I32(_) => Self::I32(decode!(i32, src, endian)),
            Self::U32(_) => Self::U32(decode!(u32, src, endian)),
            Self::I64(_) => Self::I64(decode!(i64, src, endian)),
            Self::U64(_) => Self::U64(decode!(u64, src, endian)),
        };
        Ok(())
    }

    /// Convert the value to a float, for display and scaling.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
            Self::I8(v) => v as f64,
            Self::U8(v) => v as f64,
            Self::I16(v) => v as f64,
            Self::U16(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::U32(v) => v as f64,
            Self::I64(v) => v as f64,
            Self::U64(v) => v as f64,
        }
    }

    /// Return a value of the same variant holding `v`.
    ///
    /// Integers are rounded to the nearest value and saturate at the bounds of the variant.
    pub fn with_f64(&self, v: f64) -> Self {
        match self {
            Self::F32(_) => Self::F32(v as f32),
            Self::F64(_) => Self::F64(v),
            Self::I8(_) => Self::I8(v.round() as i8),
            Self::U8(_) => Self::U8(v.round() as u8),
            Self::I16(_) => Self::I16(v.round() as i16),
            Self::U16(_) => Self::U16(v.round() as u16),
            Self::I32(_) => Self::I32(v.round() as i32),
            Self::U32(_) => Self::U32(v.round() as u32),
            Self::I64(_) => Self::I64(v.round() as i64),
            Self::U64(_) => Self::U64(v.round() as u64),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(v) => write!(f, "{:.6}", v),
            Self::F64(v) => write!(f, "{:.6}", v),
            Self::I8(v) => write!(f, "{}", v),
            Self::U8(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
        }
    }
}
