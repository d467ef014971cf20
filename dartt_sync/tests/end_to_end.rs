use dartt_data_type::{BitField, Endian, FieldKind, FieldValue};
use dartt_layout::{Entry, EntryTable, LayoutError, Symbol, SymbolLayout};
use dartt_sync::{
    Description, LoadError, MemoryRegion, MemoryTransport, Session, SyncError, WORD_SIZE,
};

fn base_type(table: &mut EntryTable, name: &str, size: usize, encoding: gimli::DwAte) -> usize {
    table.add(
        Entry::new(gimli::DW_TAG_base_type)
            .name(name)
            .byte_size(size)
            .encoding(encoding),
    )
}

fn member(table: &mut EntryTable, parent: usize, name: &str, offset: usize, type_ref: usize) {
    table
        .add_child(
            parent,
            Entry::new(gimli::DW_TAG_member)
                .name(name)
                .member_offset(offset)
                .type_ref(type_ref),
        )
        .unwrap();
}

fn array(table: &mut EntryTable, element: usize, count: usize) -> usize {
    let array = table.add(Entry::new(gimli::DW_TAG_array_type).type_ref(element));
    table
        .add_child(array, Entry::new(gimli::DW_TAG_subrange_type).count(count))
        .unwrap();
    array
}

/// ```c
/// typedef struct { float v[3]; int32_t val; } mything_t;
/// typedef struct {
///     float a;
///     int32_t b;
///     uint32_t c;
///     int16_t d1;
///     int16_t d2;
///     uint8_t exarr[8];
///     mything_t thing1;
///     mything_t thing_array[3];
/// } example_dartt_t;
/// example_dartt_t example_dartt;
/// ```
fn example_layout() -> SymbolLayout {
    let mut table = EntryTable::new();
    let float = base_type(&mut table, "float", 4, gimli::DW_ATE_float);
    let int = base_type(&mut table, "int", 4, gimli::DW_ATE_signed);
    let uint = base_type(&mut table, "unsigned int", 4, gimli::DW_ATE_unsigned);
    let short = base_type(&mut table, "short int", 2, gimli::DW_ATE_signed);
    let uchar = base_type(&mut table, "unsigned char", 1, gimli::DW_ATE_unsigned_char);

    let mything = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(16));
    let floats = array(&mut table, float, 3);
    member(&mut table, mything, "v", 0, floats);
    member(&mut table, mything, "val", 12, int);
    let mything_t = table.add(
        Entry::new(gimli::DW_TAG_typedef)
            .name("mything_t")
            .type_ref(mything),
    );

    let example = table.add(Entry::new(gimli::DW_TAG_structure_type).byte_size(88));
    member(&mut table, example, "a", 0, float);
    member(&mut table, example, "b", 4, int);
    member(&mut table, example, "c", 8, uint);
    member(&mut table, example, "d1", 12, short);
    member(&mut table, example, "d2", 14, short);
    let bytes = array(&mut table, uchar, 8);
    member(&mut table, example, "exarr", 16, bytes);
    member(&mut table, example, "thing1", 24, mything_t);
    let things = array(&mut table, mything_t, 3);
    member(&mut table, example, "thing_array", 40, things);
    let example_t = table.add(
        Entry::new(gimli::DW_TAG_typedef)
            .name("example_dartt_t")
            .type_ref(example),
    );
    table.add_variable("example_dartt", example_t);

    let symbol = Symbol {
        name: "example_dartt".to_owned(),
        address: 0x2000_0400,
        size: 88,
    };
    SymbolLayout::resolve(&table, symbol, Endian::Little).unwrap()
}

fn example_session() -> Session {
    Session::from_layout(&example_layout())
}

#[test]
fn tree_matches_layout() {
    let session = example_session();
    let tree = session.tree();
    assert_eq!(tree.total_size(), 88);
    assert_eq!(session.buffers().len(), 88);
    assert_eq!(tree[tree.root()].type_name(), "example_dartt_t");

    let offsets: Vec<(&str, usize, FieldKind)> = [
        "a",
        "b",
        "c",
        "d1",
        "d2",
        "exarr",
        "thing1",
        "thing_array",
    ]
    .iter()
    .map(|&name| {
        let node = &tree[tree.find(name).unwrap()];
        (name, node.offset(), node.kind())
    })
    .collect();
    assert_eq!(
        offsets,
        [
            ("a", 0, FieldKind::Float),
            ("b", 4, FieldKind::Int32),
            ("c", 8, FieldKind::UInt32),
            ("d1", 12, FieldKind::Int16),
            ("d2", 14, FieldKind::Int16),
            ("exarr", 16, FieldKind::Array),
            ("thing1", 24, FieldKind::Struct),
            ("thing_array", 40, FieldKind::Array),
        ]
    );

    let exarr = tree.find("exarr").unwrap();
    let elements: Vec<(usize, FieldKind)> = tree[exarr]
        .children()
        .iter()
        .map(|&id| (tree[id].offset(), tree[id].kind()))
        .collect();
    let expected: Vec<(usize, FieldKind)> =
        (16..24).map(|offset| (offset, FieldKind::UInt8)).collect();
    assert_eq!(elements, expected);

    assert_eq!(tree[tree.find("thing1.v[2]").unwrap()].offset(), 32);
    assert_eq!(tree[tree.find("thing1.val").unwrap()].offset(), 36);
    let things = tree.find("thing_array").unwrap();
    assert_eq!(tree[things].children().len(), 1);
    assert_eq!(tree[tree.find("thing_array[0].val").unwrap()].offset(), 52);
    assert_eq!(tree[things].array().map(|array| array.count), Some(3));
}

#[test]
fn bit_fields_keep_their_storage_unit() {
    let mut table = EntryTable::new();
    let int = base_type(&mut table, "int", 4, gimli::DW_ATE_signed);
    let flags = table.add(
        Entry::new(gimli::DW_TAG_structure_type)
            .name("flags_t")
            .byte_size(4),
    );
    for (name, bit_size, data_bit_offset) in [("lo", 3, 0), ("hi", 5, 13)] {
        table
            .add_child(
                flags,
                Entry::new(gimli::DW_TAG_member)
                    .name(name)
                    .bit_field(bit_size, data_bit_offset)
                    .type_ref(int),
            )
            .unwrap();
    }
    table.add_variable("flags", flags);
    let symbol = Symbol {
        name: "flags".to_owned(),
        address: 0x2000_0000,
        size: 4,
    };
    let layout = SymbolLayout::resolve(&table, symbol, Endian::Little).unwrap();

    let session = Session::from_layout(&layout);
    let tree = session.tree();
    let hi = &tree[tree.find("hi").unwrap()];
    assert_eq!((hi.offset(), hi.size(), hi.kind()), (0, 4, FieldKind::Int32));
    assert_eq!(
        hi.bit_field(),
        Some(BitField {
            bit_size: 5,
            bit_offset: 13
        })
    );
    assert_eq!(session.leaves().len(), 2);
}

#[test]
fn every_field_lies_inside_its_parent() {
    let session = example_session();
    let tree = session.tree();
    for id in tree.preorder() {
        let node = &tree[id];
        assert!(node.end() <= tree.total_size(), "{}", tree.path(id));
        if let Some(parent) = node.parent() {
            assert!(node.offset() >= tree[parent].offset(), "{}", tree.path(id));
            assert!(node.end() <= tree[parent].end(), "{}", tree.path(id));
        }
    }
    for &leaf in session.leaves() {
        let node = &tree[leaf];
        if let Some(value) = node.value() {
            assert_eq!(value.size(), node.size(), "{}", tree.path(leaf));
        }
    }
}

#[test]
fn adjacent_edits_are_written_together() {
    let mut session = example_session();
    let a = session.find("a").unwrap();
    let b = session.find("b").unwrap();
    session.set_value(a, FieldValue::F32(1.2345)).unwrap();
    session.set_value(b, FieldValue::I32(-12345)).unwrap();

    let queue = session.build_write_queue();
    assert_eq!(
        queue,
        [MemoryRegion {
            start: 0,
            length: 8,
            fields: vec![a, b],
        }]
    );
    assert!(!session.needs_fetch(&queue[0]));

    let mut expected = 1.2345f32.to_le_bytes().to_vec();
    expected.extend_from_slice(&(-12345i32).to_le_bytes());
    assert_eq!(session.stage_for_write(&queue[0]).unwrap(), &expected[..]);

    session.acknowledge_write(&queue[0]).unwrap();
    assert!(session.build_write_queue().is_empty());
    assert_eq!(&session.buffers().observed()[..8], &expected[..]);
}

#[test]
fn neighbouring_device_bytes_survive_a_write() {
    let mut session = example_session();
    let d1 = session.find("d1").unwrap();
    session.set_value(d1, FieldValue::I16(-1)).unwrap();

    let mut device = MemoryTransport::new(88);
    device.memory_mut()[14..16].copy_from_slice(&0x1234i16.to_le_bytes());

    let report = session.sync(&mut device);
    assert!(report.is_ok());
    assert_eq!(report.written, 1);
    assert_eq!(device.writes(), &[(12, WORD_SIZE)]);
    assert_eq!(&device.memory()[12..16], &[0xFF, 0xFF, 0x34, 0x12]);
    assert!(!session.node(d1).unwrap().dirty);
}

#[test]
fn subscribed_fields_follow_the_device() {
    let mut session = example_session();
    for path in ["c", "exarr[5]", "thing_array[0].v[1]"] {
        let id = session.find(path).unwrap();
        session.node_mut(id).unwrap().subscribed = true;
    }

    let mut device = MemoryTransport::new(88);
    device.memory_mut()[8..12].copy_from_slice(&77u32.to_le_bytes());
    device.memory_mut()[21] = 200;
    device.memory_mut()[44..48].copy_from_slice(&(-0.5f32).to_le_bytes());

    let report = session.sync(&mut device);
    assert!(report.is_ok());
    assert_eq!(report.read, 3);
    assert_eq!(device.reads(), &[(8, 4), (20, 4), (44, 4)]);

    let value = |path: &str| session.node(session.find(path).unwrap()).unwrap().value();
    assert_eq!(value("c"), Some(FieldValue::U32(77)));
    assert_eq!(value("exarr[5]"), Some(FieldValue::U8(200)));
    assert_eq!(value("thing_array[0].v[1]"), Some(FieldValue::F32(-0.5)));
    assert_eq!(value("exarr[4]"), Some(FieldValue::U8(0)));
}

#[test]
fn out_of_bounds_regions_change_nothing() {
    let mut session = example_session();
    let val = session.find("thing_array[0].val").unwrap();
    let region = MemoryRegion {
        start: 84,
        length: 8,
        fields: vec![val],
    };
    let before = session.buffers().clone();

    assert!(matches!(
        session.receive(&region, &[0xFF; 8]),
        Err(SyncError::OutOfBounds { .. })
    ));
    assert!(matches!(
        session.stage_for_write(&region),
        Err(SyncError::OutOfBounds { .. })
    ));
    assert!(session.acknowledge_write(&region).is_err());
    assert_eq!(session.buffers(), &before);
    assert_eq!(session.node(val).unwrap().value(), Some(FieldValue::I32(0)));
}

#[test]
fn failed_writes_stay_dirty() {
    let mut session = example_session();
    let c = session.find("c").unwrap();
    session.set_value(c, FieldValue::U32(5)).unwrap();

    let mut device = MemoryTransport::new(88);
    device.fail_writes = true;
    let report = session.sync(&mut device);
    assert_eq!(report.written, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(session.node(c).unwrap().dirty);
    assert_eq!(session.build_write_queue().len(), 1);

    device.fail_writes = false;
    let report = session.sync(&mut device);
    assert_eq!(report.written, 1);
    assert_eq!(&device.memory()[8..12], &5u32.to_le_bytes());
}

#[test]
fn description_round_trip() {
    let mut session = example_session();
    for path in ["a", "exarr[2]", "thing_array[0].v[0]"] {
        let id = session.find(path).unwrap();
        session.node_mut(id).unwrap().subscribed = true;
    }
    let thing1 = session.find("thing1").unwrap();
    session.node_mut(thing1).unwrap().expanded = true;
    let b = session.find("b").unwrap();
    let node = session.node_mut(b).unwrap();
    node.display_scale = 0.25;
    node.use_display_scale = true;

    let mut description = session.to_description();
    assert_eq!(description.address, "0x20000400");
    assert_eq!(description.nbytes, 88);
    assert_eq!(description.nwords, 22);
    description
        .extra
        .insert("plot".to_owned(), serde_json::json!({ "window": 500 }));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example_dartt.json");
    description.save(&path).unwrap();

    let loaded = Session::load_description(&path).unwrap();
    assert_eq!(loaded.tree(), session.tree());
    assert_eq!(loaded.leaves(), session.leaves());
    assert_eq!(loaded.symbol(), session.symbol());

    let resaved = loaded.to_description();
    assert_eq!(resaved.extra["plot"]["window"], 500);
    assert_eq!(resaved.to_json().unwrap(), description.to_json().unwrap());
    assert_eq!(Description::from_json(&resaved.to_json().unwrap()).unwrap(), description);
}

#[test]
fn missing_binary_is_a_load_error() {
    let error = Session::load_elf("/nonexistent/firmware.elf", "example_dartt").unwrap_err();
    assert!(matches!(
        error,
        LoadError::LayoutError(LayoutError::FileReadError { .. })
    ));
}
