#![allow(missing_docs)]

use std::{error::Error, fmt, io, path::PathBuf, sync::Arc};

#[derive(Debug, Clone)]
pub enum LayoutError {
    FileReadError {
        path: PathBuf,
        error: Arc<io::Error>,
    },
    ObjectReadError(object::Error),
    NoDebugInfo,
    DwarfReadError(gimli::Error),
    SymbolNotFound {
        name: String,
    },
    NoTypeInfoForSymbol {
        name: String,
    },
    EntryError(EntryError),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::FileReadError { path, error } => {
                write!(f, "failed to open {}: {}", path.display(), error)
            }
            LayoutError::ObjectReadError(error) => write!(f, "not a valid binary: {}", error),
            LayoutError::NoDebugInfo => write!(f, "binary contains no DWARF debug info"),
            LayoutError::DwarfReadError(error) => write!(f, "dwarf error: {}", error),
            LayoutError::SymbolNotFound { name } => {
                write!(f, "symbol {} not found in symbol table", name)
            }
            LayoutError::NoTypeInfoForSymbol { name } => {
                write!(f, "no debug info for variable {}", name)
            }
            LayoutError::EntryError(error) => write!(f, "{}", error),
        }
    }
}

impl Error for LayoutError {}

impl From<object::Error> for LayoutError {
    fn from(v: object::Error) -> Self {
        Self::ObjectReadError(v)
    }
}

impl From<gimli::Error> for LayoutError {
    fn from(v: gimli::Error) -> Self {
        Self::DwarfReadError(v)
    }
}

impl From<EntryError> for LayoutError {
    fn from(v: EntryError) -> Self {
        Self::EntryError(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    DwarfReadError(gimli::Error),
    UnknownOffset { offset: String },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::DwarfReadError(error) => write!(f, "dwarf error: {}", error),
            EntryError::UnknownOffset { offset } => {
                write!(f, "no debug entry at offset {}", offset)
            }
        }
    }
}

impl Error for EntryError {}

impl From<gimli::Error> for EntryError {
    fn from(v: gimli::Error) -> Self {
        Self::DwarfReadError(v)
    }
}
