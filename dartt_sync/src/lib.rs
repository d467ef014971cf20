//! Live synchronization of a firmware variable with a device.
//!
//! A [Session] owns the [FieldTree] built for one global variable, the leaf index, and the two
//! mirror buffers. Each cycle, dirty leaves are coalesced into word-aligned regions, staged
//! into the desired buffer and written through a [Transport]; subscribed leaves are coalesced,
//! read into the observed buffer and copied back into the tree.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use description::*;
pub use error::*;
pub use field_tree::*;
pub use mirror::*;
pub use region::*;
pub use session::*;
pub use transport::*;

mod description;
mod error;
mod field_tree;
mod mirror;
mod region;
mod session;
mod transport;
