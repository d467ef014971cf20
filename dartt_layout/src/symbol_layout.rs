use std::fmt;

use dartt_data_type::{Endian, QualifiedType, TypeTable};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{DebugInfo, LayoutError, TypeResolver};

/// A symbol from a binary's symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// The symbol name.
    pub name: String,
    /// The address of the symbol.
    pub address: u64,
    /// The size recorded in the symbol table, or 0 if unknown.
    pub size: usize,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: addr={:#010X}, size={:#X}",
            self.name, self.address, self.size
        )
    }
}

/// The resolved type layout of one global variable.
#[derive(Debug, Clone)]
pub struct SymbolLayout {
    /// The symbol table entry for the variable.
    pub symbol: Symbol,
    /// All types reachable from the variable's type.
    pub types: TypeTable,
    /// The type of the variable.
    pub root: QualifiedType,
    /// The byte order of the target.
    pub endian: Endian,
}

impl SymbolLayout {
    /// Resolve the type of the variable named by `symbol` from `info`.
    pub fn resolve<D: DebugInfo>(
        info: &D,
        symbol: Symbol,
        endian: Endian,
    ) -> Result<Self, LayoutError> {
        let type_offset =
            info.variable_type(&symbol.name)?
                .ok_or_else(|| LayoutError::NoTypeInfoForSymbol {
                    name: symbol.name.clone(),
                })?;

        let mut resolver = TypeResolver::new(info);
        let root = resolver.resolve(type_offset);
        let types = resolver.into_types();

        let layout = Self {
            symbol,
            types,
            root,
            endian,
        };
        info!(
            "resolved {} as {} ({} bytes)",
            layout.symbol.name,
            layout.type_name(),
            layout.total_size()
        );
        Ok(layout)
    }

    /// The number of bytes the variable occupies.
    ///
    /// This is the symbol table size when known, and the type size otherwise.
    pub fn total_size(&self) -> usize {
        if self.symbol.size > 0 {
            self.symbol.size
        } else {
            self.types.size_of(&self.root)
        }
    }

    /// The number of 32 bit words needed to hold the variable.
    pub fn total_words(&self) -> usize {
        (self.total_size() + 3) / 4
    }

    /// The display name of the variable's type.
    pub fn type_name(&self) -> String {
        self.types.type_name(&self.root)
    }
}

impl fmt::Display for SymbolLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "symbol: {}", self.symbol)?;
        writeln!(f, "type: {}", self.type_name())?;
        write!(f, "endian: {:?}", self.endian)
    }
}

#[cfg(test)]
mod tests {
    use dartt_data_type::{IntType, TypeKind};

    use super::*;
    use crate::{Entry, EntryTable};

    fn symbol(name: &str, size: usize) -> Symbol {
        Symbol {
            name: name.to_owned(),
            address: 0x2000_0000,
            size,
        }
    }

    #[test]
    fn total_size_prefers_symbol_table() {
        let mut table = EntryTable::new();
        let short = table.add(
            Entry::new(gimli::DW_TAG_base_type)
                .name("short int")
                .byte_size(2)
                .encoding(gimli::DW_ATE_signed),
        );
        table.add_variable("counter", short);

        let layout = SymbolLayout::resolve(&table, symbol("counter", 0), Endian::Little).unwrap();
        assert_eq!(layout.total_size(), 2);
        assert_eq!(layout.total_words(), 1);
        assert_eq!(layout.types.get(layout.root.id).kind, TypeKind::Int(IntType::S16));

        let layout = SymbolLayout::resolve(&table, symbol("counter", 4), Endian::Little).unwrap();
        assert_eq!(layout.total_size(), 4);
    }

    #[test]
    fn missing_variable_is_an_error() {
        let table = EntryTable::new();
        let error = SymbolLayout::resolve(&table, symbol("absent", 4), Endian::Little).unwrap_err();
        assert!(matches!(
            error,
            LayoutError::NoTypeInfoForSymbol { ref name } if name == "absent"
        ));
    }
}
