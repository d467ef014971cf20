//! The JSON description of a variable's field tree, as saved to and loaded from disk.

use std::{fs, path::Path, sync::Arc};

use dartt_data_type::{BitField, Endian, FieldKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{align_up, ArrayInfo, DescriptionError, FieldNode, FieldTree, NodeId, WORD_SIZE};

/// A saved description of one variable.
///
/// Keys that this crate doesn't know about are kept in [extra](Self::extra) and written back
/// unchanged, so settings owned by other tools survive a load and save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// The symbol name.
    pub symbol: String,
    /// The symbol address formatted as `0x%08X`.
    pub address: String,
    /// The symbol address.
    pub address_int: u64,
    /// The size of the variable in bytes.
    pub nbytes: usize,
    /// The size of the variable in 32 bit words, rounded up.
    pub nwords: usize,
    /// The byte order of the target.
    #[serde(default)]
    pub endian: Endian,
    /// The type of the variable.
    #[serde(rename = "type")]
    pub root: TypeInfo,
    /// UI state of the root field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSettings>,
    /// Unrecognized top level keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The shape of a field.
///
/// Missing keys take their defaults, so a field with an unreadable shape becomes an unknown,
/// empty leaf instead of failing the whole description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// The classification of the field.
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    /// The size in bytes. Omitted by some writers when zero.
    #[serde(default)]
    pub size: usize,
    /// The display name of the type.
    #[serde(default, alias = "typedef", skip_serializing_if = "String::is_empty")]
    pub type_name: String,
    /// Members of a struct or union.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldInfo>,
    /// Array dimensions, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<usize>,
    /// The total number of array elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_elements: Option<usize>,
    /// The array element type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<Box<TypeInfo>>,
    /// UI state of the array's element fields, by index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub element_ui: Vec<UiSettings>,
}

/// A member of a struct or union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// The member name.
    pub name: String,
    /// The offset from the symbol base.
    pub byte_offset: usize,
    /// The index of the word containing the first byte.
    #[serde(default)]
    pub dartt_offset: usize,
    /// The number of bits, for bit-fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_size: Option<usize>,
    /// The bit offset within the storage unit, for bit-fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_offset: Option<usize>,
    /// The shape of the member.
    #[serde(default)]
    pub type_info: TypeInfo,
    /// UI state of the member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSettings>,
}

/// Saved UI state of one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// See [FieldNode::subscribed].
    pub subscribed: bool,
    /// See [FieldNode::expanded].
    pub expanded: bool,
    /// See [FieldNode::display_scale].
    pub display_scale: f64,
    /// See [FieldNode::use_display_scale].
    pub use_display_scale: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            subscribed: false,
            expanded: false,
            display_scale: 1.0,
            use_display_scale: false,
        }
    }
}

impl UiSettings {
    /// The UI state of `node`.
    pub fn of(node: &FieldNode) -> Self {
        Self {
            subscribed: node.subscribed,
            expanded: node.expanded,
            display_scale: node.display_scale,
            use_display_scale: node.use_display_scale,
        }
    }

    /// Copy the settings onto `node`.
    pub fn apply(&self, node: &mut FieldNode) {
        node.subscribed = self.subscribed;
        node.expanded = self.expanded;
        node.display_scale = self.display_scale;
        node.use_display_scale = self.use_display_scale;
    }

    /// Return true if the settings are those of a new field.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    fn non_default(node: &FieldNode) -> Option<Self> {
        Some(Self::of(node)).filter(|ui| !ui.is_default())
    }
}

impl Description {
    /// Read a description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptionError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|error| DescriptionError::FileReadError {
            path: path.to_path_buf(),
            error: Arc::new(error),
        })?;
        Self::from_json(&json)
    }

    /// Write the description to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DescriptionError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|error| DescriptionError::FileWriteError {
            path: path.to_path_buf(),
            error: Arc::new(error),
        })
    }

    /// Parse a description.
    pub fn from_json(json: &str) -> Result<Self, DescriptionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Format the description as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, DescriptionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The symbol address, taken from [address](Self::address) if it is valid hex.
    pub fn address_value(&self) -> u64 {
        let hex = self
            .address
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        u64::from_str_radix(hex, 16).unwrap_or(self.address_int)
    }

    /// Describe `tree`, including the UI state of every field.
    pub fn from_tree(symbol: &str, address: u64, endian: Endian, tree: &FieldTree) -> Self {
        let order = tree.preorder();
        let mut built: Vec<Option<TypeInfo>> = vec![None; tree.len()];

        // Children come after their parents in preorder, so the reverse visits them first.
        for &id in order.iter().rev() {
            let info = type_info_of(tree, id, &mut built);
            built[id.0] = Some(info);
        }

        let root = tree.root();
        let nbytes = tree.total_size();
        Self {
            symbol: symbol.to_owned(),
            address: format!("0x{:08X}", address),
            address_int: address,
            nbytes,
            nwords: align_up(nbytes) / WORD_SIZE,
            endian,
            root: built[root.0].take().unwrap_or_else(|| TypeInfo::leaf(&tree[root])),
            ui: UiSettings::non_default(&tree[root]),
            extra: Map::new(),
        }
    }

    /// Rebuild the field tree, with arrays expanded and UI state applied.
    pub fn to_tree(&self) -> FieldTree {
        let mut root = node_from_info(&self.symbol, 0, &self.root, None);
        if let Some(ui) = &self.ui {
            ui.apply(&mut root);
        }
        let mut tree = FieldTree::new(root, self.nbytes);

        let mut arrays: Vec<(NodeId, &TypeInfo)> = Vec::new();
        let mut stack: Vec<(NodeId, Pending<'_>)> = Vec::new();
        let root = tree.root();
        record_array(&mut arrays, root, &self.root);
        stack.extend(
            pending_children(&self.root, 0)
                .into_iter()
                .rev()
                .map(|p| (root, p)),
        );

        while let Some((parent, pending)) = stack.pop() {
            let mut node =
                node_from_info(pending.name, pending.offset, pending.info, pending.bit_field);
            if let Some(ui) = pending.ui {
                ui.apply(&mut node);
            }
            let id = tree.add_child(parent, node);
            if tree[id].kind() == FieldKind::Unknown {
                continue;
            }
            record_array(&mut arrays, id, pending.info);
            stack.extend(
                pending_children(pending.info, pending.offset)
                    .into_iter()
                    .rev()
                    .map(|p| (id, p)),
            );
        }

        tree.expand_arrays();
        for (id, info) in arrays {
            let children = tree[id].children().to_vec();
            for (child, ui) in children.into_iter().zip(&info.element_ui) {
                ui.apply(&mut tree[child]);
            }
        }
        tree
    }
}

impl TypeInfo {
    fn leaf(node: &FieldNode) -> Self {
        Self {
            kind: node.kind(),
            size: node.size(),
            type_name: node.type_name().to_owned(),
            fields: Vec::new(),
            dimensions: Vec::new(),
            total_elements: None,
            element_type: None,
            element_ui: Vec::new(),
        }
    }

    fn element_is_composite(&self) -> bool {
        self.element_type
            .as_ref()
            .map_or(false, |element| element.kind.is_composite())
    }
}

fn type_info_of(tree: &FieldTree, id: NodeId, built: &mut [Option<TypeInfo>]) -> TypeInfo {
    let node = &tree[id];
    let mut info = TypeInfo::leaf(node);
    let mut take = |child: NodeId| {
        built[child.0]
            .take()
            .unwrap_or_else(|| TypeInfo::leaf(&tree[child]))
    };

    match node.array() {
        Some(array) => {
            info.dimensions = array.dimensions.clone();
            info.total_elements = Some(array.count);
            let element = match node.children().first() {
                Some(&first) if array.element_kind.is_composite() => take(first),
                _ => TypeInfo {
                    kind: array.element_kind,
                    size: array.element_size,
                    type_name: array.element_type_name.clone(),
                    fields: Vec::new(),
                    dimensions: Vec::new(),
                    total_elements: None,
                    element_type: None,
                    element_ui: Vec::new(),
                },
            };
            info.element_type = Some(Box::new(element));

            let element_ui: Vec<UiSettings> = node
                .children()
                .iter()
                .map(|&child| UiSettings::of(&tree[child]))
                .collect();
            if element_ui.iter().any(|ui| !ui.is_default()) {
                info.element_ui = element_ui;
            }
        }
        None => {
            info.fields = node
                .children()
                .iter()
                .map(|&child| {
                    let child_node = &tree[child];
                    FieldInfo {
                        name: child_node.name().to_owned(),
                        byte_offset: child_node.offset(),
                        dartt_offset: child_node.offset() / WORD_SIZE,
                        bit_size: child_node.bit_field().map(|bits| bits.bit_size),
                        bit_offset: child_node.bit_field().map(|bits| bits.bit_offset),
                        type_info: take(child),
                        ui: UiSettings::non_default(child_node),
                    }
                })
                .collect();
        }
    }
    info
}

fn node_from_info(
    name: &str,
    offset: usize,
    info: &TypeInfo,
    bit_field: Option<BitField>,
) -> FieldNode {
    let mut node = FieldNode::new(name, offset, info.size, info.kind, info.type_name.clone())
        .with_bit_field(bit_field);
    if info.kind == FieldKind::Array {
        if let Some(element) = &info.element_type {
            let count = info
                .total_elements
                .unwrap_or_else(|| info.dimensions.iter().product());
            node = node.with_array(ArrayInfo {
                element_kind: element.kind,
                element_size: element.size,
                count,
                dimensions: info.dimensions.clone(),
                element_type_name: element.type_name.clone(),
            });
        }
    }
    node
}

struct Pending<'a> {
    name: &'a str,
    offset: usize,
    info: &'a TypeInfo,
    bit_field: Option<BitField>,
    ui: Option<&'a UiSettings>,
}

fn pending_children(info: &TypeInfo, offset: usize) -> Vec<Pending<'_>> {
    if info.kind == FieldKind::Array {
        return match &info.element_type {
            Some(element) if info.element_is_composite() => vec![Pending {
                name: "[0]",
                offset,
                info: element,
                bit_field: None,
                ui: info.element_ui.first(),
            }],
            _ => Vec::new(),
        };
    }
    info.fields
        .iter()
        .map(|field| Pending {
            name: &field.name,
            offset: field.byte_offset,
            info: &field.type_info,
            bit_field: field.bit_size.map(|bit_size| BitField {
                bit_size,
                bit_offset: field.bit_offset.unwrap_or(0),
            }),
            ui: field.ui.as_ref(),
        })
        .collect()
}

/// Remember arrays of leaves, whose element UI state is applied after expansion.
fn record_array<'a>(arrays: &mut Vec<(NodeId, &'a TypeInfo)>, id: NodeId, info: &'a TypeInfo) {
    if info.kind == FieldKind::Array && !info.element_is_composite() && !info.element_ui.is_empty()
    {
        arrays.push((id, info));
    }
}

#[cfg(test)]
mod tests {
    use dartt_data_type::{
        FloatType, IntType, Member, QualifiedType, TypeDescriptor, TypeKind, TypeTable,
    };
    use serde_json::json;

    use super::*;

    fn sample_tree() -> FieldTree {
        let mut types = TypeTable::new();
        let float = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Float(FloatType::F32),
            Some("float".to_owned()),
            4,
        )));
        let byte = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Int(IntType::U8),
            Some("unsigned char".to_owned()),
            1,
        )));
        let vec3 = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Array {
                element: float.clone(),
                dimensions: vec![3],
                total_elements: 3,
            },
            None,
            12,
        )));
        let flags = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Array {
                element: byte.clone(),
                dimensions: vec![2, 2],
                total_elements: 4,
            },
            None,
            4,
        )));
        let thing = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Struct {
                members: vec![
                    Member {
                        name: "v".to_owned(),
                        offset: 0,
                        bit_field: None,
                        data_type: vec3,
                    },
                    Member {
                        name: "mode".to_owned(),
                        offset: 12,
                        bit_field: Some(BitField {
                            bit_size: 3,
                            bit_offset: 2,
                        }),
                        data_type: byte,
                    },
                ],
            },
            Some("thing".to_owned()),
            16,
        )));
        let things = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Array {
                element: thing.clone(),
                dimensions: vec![2],
                total_elements: 2,
            },
            None,
            32,
        )));
        let root = QualifiedType::new(types.push(TypeDescriptor::new(
            TypeKind::Struct {
                members: vec![
                    Member {
                        name: "thing1".to_owned(),
                        offset: 0,
                        bit_field: None,
                        data_type: thing,
                    },
                    Member {
                        name: "flags".to_owned(),
                        offset: 16,
                        bit_field: None,
                        data_type: flags,
                    },
                    Member {
                        name: "things".to_owned(),
                        offset: 20,
                        bit_field: None,
                        data_type: things,
                    },
                ],
            },
            Some("state".to_owned()),
            52,
        )));

        let mut tree = FieldTree::build(&types, &root, "state", 0, 52);
        tree.expand_arrays();
        tree
    }

    #[test]
    fn round_trip_is_isomorphic() {
        let mut tree = sample_tree();
        let v1 = tree.find("thing1.v[1]").unwrap();
        tree[v1].subscribed = true;
        tree[v1].display_scale = 2.5;
        tree[v1].use_display_scale = true;
        let flag = tree.find("flags[3]").unwrap();
        tree[flag].subscribed = true;
        let element = tree.find("things[0]").unwrap();
        tree[element].expanded = true;
        let root = tree.root();
        tree[root].expanded = true;

        let description = Description::from_tree("state", 0x2000_0100, Endian::Little, &tree);
        assert_eq!(description.address, "0x20000100");
        assert_eq!(description.nwords, 13);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        description.save(&path).unwrap();
        let loaded = Description::load(&path).unwrap();
        assert_eq!(loaded, description);
        assert_eq!(loaded.to_tree(), tree);
    }

    #[test]
    fn field_offsets_are_absolute() {
        let tree = sample_tree();
        let description = Description::from_tree("state", 0, Endian::Little, &tree);
        let json = serde_json::to_value(&description).unwrap();

        assert_eq!(json["type"]["type"], "struct");
        let things = &json["type"]["fields"][2];
        assert_eq!(things["byte_offset"], 20);
        assert_eq!(things["dartt_offset"], 5);
        assert_eq!(things["type_info"]["total_elements"], 2);
        let mode = &things["type_info"]["element_type"]["fields"][1];
        assert_eq!(mode["name"], "mode");
        assert_eq!(mode["byte_offset"], 32);
        assert_eq!(mode["bit_size"], 3);
        assert_eq!(mode["type_info"]["type"], "uint8");
        assert_eq!(json["type"]["fields"][1]["type_info"]["dimensions"], json!([2, 2]));
    }

    #[test]
    fn accepts_c_type_names_and_keeps_unknown_keys() {
        let json = r#"{
            "symbol": "counter",
            "address": "0x20000010",
            "address_int": 0,
            "nbytes": 6,
            "nwords": 2,
            "type": {
                "type": "struct",
                "size": 6,
                "fields": [
                    {
                        "name": "count",
                        "byte_offset": 0,
                        "dartt_offset": 0,
                        "type_info": { "type": "int", "size": 4 },
                        "ui": { "subscribed": true }
                    },
                    {
                        "name": "level",
                        "byte_offset": 4,
                        "dartt_offset": 1,
                        "type_info": { "type": "uint16_t", "size": 2 }
                    }
                ]
            },
            "serial": { "port": "/dev/ttyUSB0", "baud": 921600 }
        }"#;

        let description = Description::from_json(json).unwrap();
        assert_eq!(description.endian, Endian::Little);
        assert_eq!(description.address_value(), 0x2000_0010);
        assert_eq!(description.extra["serial"]["baud"], 921600);

        let tree = description.to_tree();
        let count = tree.find("count").unwrap();
        assert_eq!(tree[count].kind(), FieldKind::Int32);
        assert!(tree[count].subscribed);
        assert_eq!(tree[count].display_scale, 1.0);
        assert_eq!(tree[tree.find("level").unwrap()].kind(), FieldKind::UInt16);

        let saved: Value = serde_json::from_str(&description.to_json().unwrap()).unwrap();
        assert_eq!(saved["serial"]["port"], "/dev/ttyUSB0");
    }

    #[test]
    fn unreadable_fields_degrade_alone() {
        let json = r#"{
            "symbol": "state",
            "address": "0x20000000",
            "address_int": 536870912,
            "nbytes": 12,
            "nwords": 3,
            "type": {
                "type": "struct",
                "typedef": "state_t",
                "size": 12,
                "fields": [
                    {
                        "name": "wide",
                        "byte_offset": 0,
                        "type_info": { "type": "wchar_t", "size": 4 }
                    },
                    {
                        "name": "mode",
                        "byte_offset": 4,
                        "type_info": {
                            "type": "unsigned short int",
                            "typedef": "mode_t",
                            "size": 2
                        }
                    },
                    {
                        "name": "empty",
                        "byte_offset": 8,
                        "type_info": { "type": "struct", "fields": [] }
                    },
                    {
                        "name": "level",
                        "byte_offset": 8,
                        "type_info": { "type": "long double", "size": 4 }
                    }
                ]
            }
        }"#;

        let description = Description::from_json(json).unwrap();
        assert_eq!(description.root.type_name, "state_t");
        let tree = description.to_tree();
        assert_eq!(tree[tree.root()].type_name(), "state_t");

        let wide = &tree[tree.find("wide").unwrap()];
        assert_eq!((wide.kind(), wide.size()), (FieldKind::Unknown, 4));
        assert_eq!(wide.value(), None);
        let mode = &tree[tree.find("mode").unwrap()];
        assert_eq!(mode.kind(), FieldKind::UInt16);
        assert_eq!(mode.type_name(), "mode_t");
        assert_eq!(tree[tree.find("empty").unwrap()].size(), 0);
        assert_eq!(tree[tree.find("level").unwrap()].kind(), FieldKind::Unknown);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            Description::from_json("{\"symbol\": 3}"),
            Err(DescriptionError::JsonError(_))
        ));
        assert!(matches!(
            Description::load("/nonexistent/description.json"),
            Err(DescriptionError::FileReadError { .. })
        ));
    }
}
