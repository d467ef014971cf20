//! Representation of C data types as read from debug metadata, and of the fixed-width
//! values stored in a field tree.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use data_type::*;
pub use error::*;
pub use value::*;

mod data_type;
mod error;
mod value;
