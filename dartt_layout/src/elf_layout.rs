//! Symbol and type information extracted from an ELF file.

use std::{borrow::Cow, fs, path::Path, sync::Arc};

use dartt_data_type::Endian;
use gimli::{
    AttributeValue, DebugInfoOffset, DebuggingInformationEntry, DwAt, Dwarf, EndianSlice,
    Operation, Reader, RunTimeEndian, SectionId, Unit, UnitOffset,
};
use object::{Object, ObjectSection, ObjectSymbol};
use tracing::debug;

use crate::{Child, DebugInfo, Entry, EntryError, LayoutError, Symbol, SymbolLayout};

impl SymbolLayout {
    /// Construct a SymbolLayout from the symbol table and DWARF debugging information of an
    /// ELF file.
    pub fn read_elf(elf_path: impl AsRef<Path>, symbol_name: &str) -> Result<Self, LayoutError> {
        let elf_path = elf_path.as_ref();
        let buffer = fs::read(elf_path).map_err(|error| LayoutError::FileReadError {
            path: elf_path.to_path_buf(),
            error: Arc::new(error),
        })?;
        Self::parse_elf(&buffer, symbol_name)
    }

    /// Construct a SymbolLayout from the contents of an ELF file.
    pub fn parse_elf(data: &[u8], symbol_name: &str) -> Result<Self, LayoutError> {
        let object = object::File::parse(data)?;
        let symbol = find_symbol(&object, symbol_name)?;
        debug!("found {}", symbol);

        if !has_debug_info(&object) {
            return Err(LayoutError::NoDebugInfo);
        }
        let endian = if object.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        // Load dwarf info
        let load_section = |id: SectionId| -> Result<Cow<'_, [u8]>, object::Error> {
            Ok(object
                .section_by_name(id.name())
                .map(|ref section| section.uncompressed_data())
                .transpose()?
                .unwrap_or(Cow::Borrowed(&[])))
        };
        let dwarf_cow = Dwarf::load(&load_section)?;
        let dwarf = dwarf_cow.borrow(|section| EndianSlice::new(section, endian));
        let info = DwarfInfo::new(dwarf)?;

        let endian = match endian {
            RunTimeEndian::Little => Endian::Little,
            RunTimeEndian::Big => Endian::Big,
        };
        Self::resolve(&info, symbol, endian)
    }
}

/// Look up a symbol in an ELF file.
pub fn read_symbol(elf_path: impl AsRef<Path>, symbol_name: &str) -> Result<Symbol, LayoutError> {
    let elf_path = elf_path.as_ref();
    let buffer = fs::read(elf_path).map_err(|error| LayoutError::FileReadError {
        path: elf_path.to_path_buf(),
        error: Arc::new(error),
    })?;
    let object = object::File::parse(&buffer[..])?;
    find_symbol(&object, symbol_name)
}

/// Look up a defined symbol in the static or dynamic symbol table.
pub fn find_symbol(object: &object::File<'_>, symbol_name: &str) -> Result<Symbol, LayoutError> {
    object
        .symbols()
        .chain(object.dynamic_symbols())
        .filter(|symbol| symbol.is_definition())
        .find(|symbol| symbol.name() == Ok(symbol_name))
        .map(|symbol| Symbol {
            name: symbol_name.to_owned(),
            address: symbol.address(),
            size: symbol.size() as usize,
        })
        .ok_or_else(|| LayoutError::SymbolNotFound {
            name: symbol_name.to_owned(),
        })
}

fn has_debug_info(object: &object::File<'_>) -> bool {
    object
        .section_by_name(SectionId::DebugInfo.name())
        .map_or(false, |section| section.size() > 0)
}

/// DWARF debugging information, addressed by global `.debug_info` offsets.
#[derive(Debug)]
pub struct DwarfInfo<R: Reader> {
    dwarf: Dwarf<R>,
    units: Vec<Unit<R>>,
}

impl<R: Reader> DwarfInfo<R> {
    /// Parse the unit headers of `dwarf`.
    pub fn new(dwarf: Dwarf<R>) -> Result<Self, gimli::Error> {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            units.push(dwarf.unit(header)?);
        }
        Ok(Self { dwarf, units })
    }

    /// Find the unit containing `offset`.
    fn locate(
        &self,
        offset: DebugInfoOffset<R::Offset>,
    ) -> Result<(&Unit<R>, UnitOffset<R::Offset>), EntryError> {
        self.units
            .iter()
            .find_map(|unit| {
                offset
                    .to_unit_offset(&unit.header)
                    .map(|unit_offset| (unit, unit_offset))
            })
            .ok_or_else(|| EntryError::UnknownOffset {
                offset: format!("{:?}", offset),
            })
    }

    fn read_entry(
        &self,
        unit: &Unit<R>,
        offset: UnitOffset<R::Offset>,
    ) -> Result<Entry<DebugInfoOffset<R::Offset>>, gimli::Error> {
        let mut tree = unit.entries_tree(Some(offset))?;
        let node = tree.root()?;
        let mut entry = self.read_attributes(unit, node.entry())?;

        let mut children = node.children();
        while let Some(child) = children.next()? {
            let child_entry = child.entry();
            if let Some(offset) = child_entry.offset().to_debug_info_offset(&unit.header) {
                entry.children.push(Child {
                    tag: child_entry.tag(),
                    offset,
                });
            }
        }
        Ok(entry)
    }

    fn read_attributes(
        &self,
        unit: &Unit<R>,
        die: &DebuggingInformationEntry<'_, '_, R>,
    ) -> Result<Entry<DebugInfoOffset<R::Offset>>, gimli::Error> {
        let encoding = match die.attr_value(gimli::DW_AT_encoding)? {
            Some(AttributeValue::Encoding(encoding)) => Some(encoding),
            _ => None,
        };
        let const_value = die
            .attr(gimli::DW_AT_const_value)?
            .and_then(|attr| attr.sdata_value().or_else(|| attr.udata_value().map(|v| v as i64)));
        let is_declaration = matches!(
            die.attr_value(gimli::DW_AT_declaration)?,
            Some(AttributeValue::Flag(true))
        );

        Ok(Entry {
            tag: die.tag(),
            name: self.attr_string(unit, die, gimli::DW_AT_name)?,
            byte_size: attr_usize(die, gimli::DW_AT_byte_size)?,
            encoding,
            type_ref: attr_reference(unit, die, gimli::DW_AT_type)?,
            member_offset: member_location(unit, die)?,
            bit_size: attr_usize(die, gimli::DW_AT_bit_size)?,
            data_bit_offset: attr_usize(die, gimli::DW_AT_data_bit_offset)?,
            bit_offset: attr_usize(die, gimli::DW_AT_bit_offset)?,
            count: attr_usize(die, gimli::DW_AT_count)?,
            upper_bound: attr_usize(die, gimli::DW_AT_upper_bound)?,
            const_value,
            is_declaration,
            children: Vec::new(),
        })
    }

    /// Read a string attribute from `die`.
    ///
    /// Return None if the attribute is not present.
    /// Return an error if the attribute is present but is not a string.
    fn attr_string(
        &self,
        unit: &Unit<R>,
        die: &DebuggingInformationEntry<'_, '_, R>,
        attr_name: DwAt,
    ) -> Result<Option<String>, gimli::Error> {
        Ok(match die.attr_value(attr_name)? {
            Some(attr) => Some(
                self.dwarf
                    .attr_string(unit, attr)?
                    .to_string()?
                    .as_ref()
                    .to_owned(),
            ),
            None => None,
        })
    }
}

impl<R: Reader> DebugInfo for DwarfInfo<R> {
    type Offset = DebugInfoOffset<R::Offset>;

    fn variable_type(&self, name: &str) -> Result<Option<Self::Offset>, EntryError> {
        for unit in &self.units {
            let mut depth = 0;
            let mut entries = unit.entries();
            while let Some((delta, die)) = entries.next_dfs()? {
                depth += delta;
                // Only variables at the top level of a unit are globals.
                if depth != 1 || die.tag() != gimli::DW_TAG_variable {
                    continue;
                }
                if self.attr_string(unit, die, gimli::DW_AT_name)?.as_deref() != Some(name) {
                    continue;
                }
                if let Some(type_ref) = attr_reference(unit, die, gimli::DW_AT_type)? {
                    return Ok(Some(type_ref));
                }
            }
        }
        Ok(None)
    }

    fn entry(&self, offset: Self::Offset) -> Result<Entry<Self::Offset>, EntryError> {
        let (unit, unit_offset) = self.locate(offset)?;
        Ok(self.read_entry(unit, unit_offset)?)
    }
}

/// Read an unsigned int attribute from `die`.
///
/// Return None if the attribute is not present or is not an unsigned int.
fn attr_usize<R: Reader>(
    die: &DebuggingInformationEntry<'_, '_, R>,
    attr_name: DwAt,
) -> Result<Option<usize>, gimli::Error> {
    Ok(die
        .attr(attr_name)?
        .and_then(|attr| attr.udata_value().map(|udata| udata as usize)))
}

/// Read a type reference attribute from `die` as a global offset.
fn attr_reference<R: Reader>(
    unit: &Unit<R>,
    die: &DebuggingInformationEntry<'_, '_, R>,
    attr_name: DwAt,
) -> Result<Option<DebugInfoOffset<R::Offset>>, gimli::Error> {
    Ok(match die.attr_value(attr_name)? {
        Some(AttributeValue::UnitRef(offset)) => offset.to_debug_info_offset(&unit.header),
        Some(AttributeValue::DebugInfoRef(offset)) => Some(offset),
        _ => None,
    })
}

/// Read `DW_AT_data_member_location`, which is either a constant or a
/// `DW_OP_plus_uconst` expression.
fn member_location<R: Reader>(
    unit: &Unit<R>,
    die: &DebuggingInformationEntry<'_, '_, R>,
) -> Result<Option<usize>, gimli::Error> {
    let attr = match die.attr(gimli::DW_AT_data_member_location)? {
        Some(attr) => attr,
        None => return Ok(None),
    };
    if let Some(offset) = attr.udata_value() {
        return Ok(Some(offset as usize));
    }
    if let Some(expression) = attr.exprloc_value() {
        let mut operations = expression.operations(unit.encoding());
        if let Some(Operation::PlusConstant { value } | Operation::UnsignedConstant { value }) =
            operations.next()?
        {
            return Ok(Some(value as usize));
        }
    }
    Ok(None)
}
