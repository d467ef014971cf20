//! Reconstruction of a global variable's type layout from debug metadata.
//!
//! [SymbolLayout::read_elf] reads an ELF file, locates a symbol and resolves the DWARF type of
//! the variable with the same name into a [SymbolLayout]. The resolver itself only depends on
//! the [DebugInfo] trait, which is also implemented by the in-memory [EntryTable].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use debug_info::*;
pub use elf_layout::*;
pub use entry_table::*;
pub use error::*;
pub use resolver::*;
pub use symbol_layout::*;

mod debug_info;
mod elf_layout;
mod entry_table;
mod error;
mod resolver;
mod symbol_layout;
