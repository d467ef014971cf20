#![allow(missing_docs)]

use std::{error::Error, fmt, io, path::PathBuf, sync::Arc};

use dartt_data_type::{ValueSizeError, ValueTypeError};
use dartt_layout::LayoutError;

use crate::{NodeId, TransportError};

#[derive(Debug, Clone)]
pub enum SyncError {
    OutOfBounds {
        name: String,
        start: usize,
        end: usize,
        buffer_len: usize,
    },
    NotALeaf {
        name: String,
    },
    UnknownNode(NodeId),
    ValueTypeError(ValueTypeError),
    ValueSizeError(ValueSizeError),
    TransportError(TransportError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::OutOfBounds {
                name,
                start,
                end,
                buffer_len,
            } => write!(
                f,
                "{} at {}..{} exceeds buffer of {} bytes",
                name, start, end, buffer_len
            ),
            SyncError::NotALeaf { name } => write!(f, "{} does not hold a value", name),
            SyncError::UnknownNode(id) => write!(f, "no field with id {}", id),
            SyncError::ValueTypeError(error) => write!(f, "{}", error),
            SyncError::ValueSizeError(error) => write!(f, "{}", error),
            SyncError::TransportError(error) => write!(f, "{}", error),
        }
    }
}

impl Error for SyncError {}

impl From<ValueTypeError> for SyncError {
    fn from(v: ValueTypeError) -> Self {
        Self::ValueTypeError(v)
    }
}

impl From<ValueSizeError> for SyncError {
    fn from(v: ValueSizeError) -> Self {
        Self::ValueSizeError(v)
    }
}

impl From<TransportError> for SyncError {
    fn from(v: TransportError) -> Self {
        Self::TransportError(v)
    }
}

#[derive(Debug, Clone)]
pub enum DescriptionError {
    FileReadError {
        path: PathBuf,
        error: Arc<io::Error>,
    },
    FileWriteError {
        path: PathBuf,
        error: Arc<io::Error>,
    },
    JsonError(Arc<serde_json::Error>),
}

impl fmt::Display for DescriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptionError::FileReadError { path, error } => {
                write!(f, "failed to read {}: {}", path.display(), error)
            }
            DescriptionError::FileWriteError { path, error } => {
                write!(f, "failed to write {}: {}", path.display(), error)
            }
            DescriptionError::JsonError(error) => write!(f, "invalid description: {}", error),
        }
    }
}

impl Error for DescriptionError {}

impl From<serde_json::Error> for DescriptionError {
    fn from(v: serde_json::Error) -> Self {
        Self::JsonError(Arc::new(v))
    }
}

#[derive(Debug, Clone)]
pub enum LoadError {
    LayoutError(LayoutError),
    DescriptionError(DescriptionError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::LayoutError(error) => write!(f, "{}", error),
            LoadError::DescriptionError(error) => write!(f, "{}", error),
        }
    }
}

impl Error for LoadError {}

impl From<LayoutError> for LoadError {
    fn from(v: LayoutError) -> Self {
        Self::LayoutError(v)
    }
}

impl From<DescriptionError> for LoadError {
    fn from(v: DescriptionError) -> Self {
        Self::DescriptionError(v)
    }
}
