#![allow(missing_docs)]

use std::{borrow::Cow, error::Error, fmt};

use crate::FieldValue;

#[derive(Debug, Clone)]
pub struct ValueTypeError {
    pub expected: Cow<'static, str>,
    pub actual: FieldValue,
}

impl fmt::Display for ValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected value of type {}, found {:?}",
            self.expected, self.actual
        )
    }
}

impl Error for ValueTypeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSizeError {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for ValueSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} bytes for value, found {}",
            self.expected, self.actual
        )
    }
}

impl Error for ValueSizeError {}
