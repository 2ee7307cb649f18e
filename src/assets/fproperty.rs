//! Self-describing property tree used by save files.
//!
//! Every property is `name`, `type name`, 64-bit `size`, a type-specific
//! header, then `size` bytes of payload. Names and type names are plain
//! length-prefixed strings here, not name-table references.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, trace, warn};
use serde::Serialize;
use serde::ser::{Serializer, SerializeMap, SerializeSeq};
use super::*;

/// Size recorded for map values, which carry no serialized size of their own.
pub const UNSIZED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyKind {
    Bool,
    Byte,
    Int,
    Int64,
    Float,
    Str,
    Name,
    Object,
    SoftObject,
    Text,
    Struct,
    Array,
    Map,
    Set,
    Unknown,
}

impl PropertyKind {
    fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "BoolProperty" => PropertyKind::Bool,
            "ByteProperty" => PropertyKind::Byte,
            "IntProperty" => PropertyKind::Int,
            "Int64Property" => PropertyKind::Int64,
            "FloatProperty" => PropertyKind::Float,
            "StrProperty" => PropertyKind::Str,
            "NameProperty" => PropertyKind::Name,
            "ObjectProperty" => PropertyKind::Object,
            "SoftObjectProperty" => PropertyKind::SoftObject,
            "TextProperty" => PropertyKind::Text,
            "StructProperty" => PropertyKind::Struct,
            "ArrayProperty" => PropertyKind::Array,
            "MapProperty" => PropertyKind::Map,
            "SetProperty" => PropertyKind::Set,
            _ => PropertyKind::Unknown,
        }
    }

    /// Kinds that carry their own header between the size and the payload.
    fn has_type_header(self) -> bool {
        match self {
            PropertyKind::Bool | PropertyKind::Byte | PropertyKind::Struct
                | PropertyKind::Array | PropertyKind::Map | PropertyKind::Set => true,
            _ => false,
        }
    }

    fn is_array_element(self) -> bool {
        match self {
            PropertyKind::Byte | PropertyKind::Map | PropertyKind::Set | PropertyKind::Unknown => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
enum TypeHeader {
    Plain,
    Bool(bool),
    Byte { enum_name: String },
    Struct { struct_type: String, struct_guid: FGuid },
    Array { element_type: String },
    Map { key_type: String, value_type: String },
    Set { element_type: String },
}

fn read_guid_flag(reader: &mut ReaderCursor) -> ParserResult<Option<FGuid>> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(FGuid::new(reader)?)),
        flag => Err(ParserError::format(format!("Invalid property guid flag: {}", flag))),
    }
}

/// Reads the header of a kind for which `has_type_header` is true.
fn read_type_header(reader: &mut ReaderCursor, kind: PropertyKind) -> ParserResult<(TypeHeader, Option<FGuid>)> {
    match kind {
        PropertyKind::Bool => {
            let value = reader.read_u8()? != 0;
            Ok((TypeHeader::Bool(value), read_guid_flag(reader)?))
        },
        PropertyKind::Byte => {
            let enum_name = read_string(reader)?;
            Ok((TypeHeader::Byte { enum_name }, read_guid_flag(reader)?))
        },
        PropertyKind::Struct => {
            let struct_type = read_string(reader)?;
            let struct_guid = FGuid::new(reader)?;
            Ok((TypeHeader::Struct { struct_type, struct_guid }, read_guid_flag(reader)?))
        },
        PropertyKind::Array => {
            let element_type = read_string(reader)?;
            let flag = reader.read_u8()?;
            if flag != 0 {
                return Err(ParserError::format(format!("Array of {} has non-zero guid flag {}", element_type, flag)));
            }
            Ok((TypeHeader::Array { element_type }, None))
        },
        PropertyKind::Map => {
            let key_type = read_string(reader)?;
            let value_type = read_string(reader)?;
            Ok((TypeHeader::Map { key_type, value_type }, read_guid_flag(reader)?))
        },
        PropertyKind::Set => {
            let element_type = read_string(reader)?;
            Ok((TypeHeader::Set { element_type }, read_guid_flag(reader)?))
        },
        _ => Ok((TypeHeader::Plain, read_guid_flag(reader)?)),
    }
}

#[derive(Debug)]
pub struct FByteValue {
    enum_name: Option<String>,
    payload: Vec<u8>,
    value: Option<String>,
}

impl FByteValue {
    /// A payload whose leading i32 is `size - 4` holds an enum name string instead of a number.
    fn from_payload(enum_name: Option<String>, payload: Vec<u8>, size: i64) -> Self {
        let mut value = None;
        if payload.len() > 4 && LittleEndian::read_i32(&payload[0..4]) as i64 == size - 4 {
            let mut text = &payload[4..];
            if text.last() == Some(&0) {
                text = &text[..text.len() - 1];
            }
            value = std::str::from_utf8(text).ok().map(|v| v.to_owned());
        }

        Self { enum_name, payload, value }
    }

    pub fn get_enum_name(&self) -> Option<&str> {
        self.enum_name.as_deref()
    }

    pub fn get_payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn get_value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl Serialize for FByteValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        match (&self.value, self.payload.as_slice()) {
            (Some(value), _) => serializer.serialize_str(value),
            (None, [byte]) => serializer.serialize_u8(*byte),
            (None, payload) => payload.serialize(serializer),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FSoftObjectValue {
    path: String,
    unknown: i32,
}

impl FSoftObjectValue {
    pub fn get_path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Default)]
pub struct FTextValue {
    flags: u8,
    history: Option<u64>,
    other_flag: Option<u8>,
    id: Option<String>,
    value: Option<String>,
}

impl FTextValue {
    pub fn get_flags(&self) -> u8 {
        self.flags
    }

    pub fn get_history(&self) -> Option<u64> {
        self.history
    }

    pub fn get_other_flag(&self) -> Option<u8> {
        self.other_flag
    }

    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get_value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl Serialize for FTextValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        self.value.serialize(serializer)
    }
}

impl Newable for FTextValue {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        let flags = reader.read_u8()?;
        let mut text = Self { flags, ..Self::default() };
        match flags {
            2 => {
                text.history = Some(reader.read_u64::<LittleEndian>()?);
            },
            0 | 8 => {
                let history = reader.read_u64::<LittleEndian>()?;
                text.history = Some(history);
                if history & 0xFF000000 != 0 {
                    return Ok(text);
                }
                text.other_flag = Some(reader.read_u8()?);
                text.id = Some(read_string(reader)?);
            },
            _ => return Err(ParserError::unsupported(format!("Text flags {}", flags))),
        }
        text.value = Some(read_string(reader)?);
        Ok(text)
    }
}

/// A struct body. Keys usually equal the property names; `LinearColor` is the exception.
#[derive(Debug, Default)]
pub struct FStructValue {
    struct_type: Option<String>,
    struct_guid: Option<FGuid>,
    properties: Vec<(String, FProperty)>,
}

impl FStructValue {
    pub fn get_struct_type(&self) -> Option<&str> {
        self.struct_type.as_deref()
    }

    pub fn get_struct_guid(&self) -> Option<&FGuid> {
        self.struct_guid.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&FProperty> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_properties(&self) -> &[(String, FProperty)] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub(crate) fn from_properties(properties: Vec<(String, FProperty)>) -> Self {
        Self { struct_type: None, struct_guid: None, properties }
    }
}

impl Serialize for FStructValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for (key, property) in &self.properties {
            map.serialize_entry(key, property)?;
        }
        map.end()
    }
}

#[derive(Debug)]
pub struct FMapValue {
    key_type: String,
    value_type: String,
    unknown: i32,
    entries: Vec<(String, FProperty)>,
}

impl FMapValue {
    pub fn get_key_type(&self) -> &str {
        &self.key_type
    }

    pub fn get_value_type(&self) -> &str {
        &self.value_type
    }

    pub fn get_unknown(&self) -> i32 {
        self.unknown
    }

    pub fn get(&self, key: &str) -> Option<&FProperty> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_entries(&self) -> &[(String, FProperty)] {
        &self.entries
    }
}

impl Serialize for FMapValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, property) in &self.entries {
            map.serialize_entry(key, property)?;
        }
        map.end()
    }
}

#[derive(Debug)]
pub struct FSetValue {
    element_type: String,
    unknown: u32,
    elements: Vec<String>,
}

impl FSetValue {
    pub fn get_element_type(&self) -> &str {
        &self.element_type
    }

    pub fn get_unknown(&self) -> u32 {
        self.unknown
    }

    pub fn get_elements(&self) -> &[String] {
        &self.elements
    }
}

impl Serialize for FSetValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut seq = serializer.serialize_seq(Some(self.elements.len()))?;
        for element in &self.elements {
            seq.serialize_element(element)?;
        }
        seq.end()
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FPropertyValue {
    Bool(bool),
    Byte(FByteValue),
    Int(i32),
    Int64(i64),
    Float(f32),
    Str(String),
    Name(String),
    Object(String),
    SoftObject(FSoftObjectValue),
    Text(FTextValue),
    Struct(FStructValue),
    Array(Vec<FProperty>),
    Map(FMapValue),
    Set(FSetValue),
    GameplayTags(Vec<String>),
    Guid(FGuid),
    /// Raw payload of a type this reader does not decode.
    Unknown(Vec<u8>),
}

#[derive(Debug)]
pub struct FProperty {
    name: String,
    type_name: String,
    property_guid: Option<FGuid>,
    size: i64,
    value_offset: u64,
    value: FPropertyValue,
}

impl Serialize for FProperty {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        self.value.serialize(serializer)
    }
}

impl FProperty {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get_property_guid(&self) -> Option<&FGuid> {
        self.property_guid.as_ref()
    }

    pub fn get_size(&self) -> i64 {
        self.size
    }

    /// Stream offset where the payload starts. Adding the size gives the next sibling.
    pub fn get_value_offset(&self) -> u64 {
        self.value_offset
    }

    pub fn get_value(&self) -> &FPropertyValue {
        &self.value
    }

    /// Reads one property of a named list. `None` means the list's terminator was reached.
    pub fn read_property(reader: &mut ReaderCursor) -> ParserResult<Option<Self>> {
        let name = read_string(reader)?;
        if name == "None" {
            return Ok(None);
        }

        let type_name = read_string(reader)?;
        let size = reader.read_i64::<LittleEndian>()?;
        if size < 0 {
            return Err(ParserError::format(format!("Property {} has negative size {}", name, size)));
        }
        trace!("Reading property: {} {}", type_name, name);

        let kind = PropertyKind::from_type_name(&type_name);
        let (header, property_guid) = match read_type_header(reader, kind) {
            Ok(data) => data,
            Err(e) => return Err(ParserError::add(e, format!("Property: {}", name))),
        };

        let value_offset = reader.position();
        let end = value_offset + size as u64;
        let value = match read_body(reader, kind, &header, size, false) {
            Ok(value) => value,
            Err(e) if e.is_unsupported() => {
                warn!("Skipping {} bytes of property {} ({}): {}", size, name, type_name, e);
                reader.set_position(value_offset);
                FPropertyValue::Unknown(read_bytes(reader, size as u64)?)
            },
            Err(e) => return Err(ParserError::add(e, format!("Property: {}", name))),
        };

        if reader.position() != end {
            debug!("Property {} ({}) read to {} but declared end is {}", name, type_name, reader.position(), end);
            reader.set_position(end);
        }

        Ok(Some(Self {
            name, type_name, property_guid, size, value_offset, value,
        }))
    }

    fn fixed(name: &str, type_name: &str, size: i64, value_offset: u64, value: FPropertyValue) -> Self {
        Self {
            name: name.to_owned(),
            type_name: type_name.to_owned(),
            property_guid: None,
            size,
            value_offset,
            value,
        }
    }
}

/// Reads properties until the `None` terminator.
pub fn read_properties(reader: &mut ReaderCursor) -> ParserResult<Vec<(String, FProperty)>> {
    let mut properties = Vec::new();
    while let Some(property) = FProperty::read_property(reader)? {
        properties.push((property.name.clone(), property));
    }
    Ok(properties)
}

/// Reads `count` array elements that share one name/type/size header.
/// Only the first element carries the type-specific header fields.
fn read_property_array(reader: &mut ReaderCursor, element_type: &str, count: u32) -> ParserResult<Vec<FProperty>> {
    let name = read_string(reader)?;
    if name == "None" {
        return Err(ParserError::format(format!("Array of {} has no element header", element_type)));
    }
    let type_name = read_string(reader)?;
    let size = reader.read_i64::<LittleEndian>()?;
    if type_name != element_type {
        debug!("Array element header {} declares {} instead of {}", name, type_name, element_type);
    }

    let kind = PropertyKind::from_type_name(&type_name);
    if !kind.is_array_element() {
        return Err(ParserError::unsupported(format!("Array element type {}", type_name)));
    }

    let mut header = TypeHeader::Plain;
    let mut items = Vec::new();
    for i in 0..count {
        let body_only = i != 0;
        if kind == PropertyKind::Bool {
            // Element 0 is a fixed 16-bit value; no guid flag follows.
            if !body_only {
                header = TypeHeader::Bool(reader.read_u16::<LittleEndian>()? != 0);
            }
        } else if kind.has_type_header() && (!body_only || kind == PropertyKind::Array) {
            header = read_type_header(reader, kind)?.0;
        }
        let value_offset = reader.position();
        let value = read_body(reader, kind, &header, size, body_only)?;
        items.push(FProperty {
            name: name.clone(),
            type_name: type_name.clone(),
            property_guid: None,
            size,
            value_offset,
            value,
        });
    }

    Ok(items)
}

fn read_body(reader: &mut ReaderCursor, kind: PropertyKind, header: &TypeHeader, size: i64, body_only: bool) -> ParserResult<FPropertyValue> {
    Ok(match kind {
        PropertyKind::Bool => match header {
            TypeHeader::Bool(value) if !body_only => FPropertyValue::Bool(*value),
            _ => FPropertyValue::Bool(reader.read_u8()? != 0),
        },
        PropertyKind::Byte => match header {
            TypeHeader::Byte { enum_name } if !body_only => {
                let payload = read_bytes(reader, size as u64)?;
                FPropertyValue::Byte(FByteValue::from_payload(Some(enum_name.clone()), payload, size))
            },
            _ => FPropertyValue::Byte(FByteValue::from_payload(None, vec![reader.read_u8()?], 1)),
        },
        PropertyKind::Int => FPropertyValue::Int(reader.read_i32::<LittleEndian>()?),
        PropertyKind::Int64 => FPropertyValue::Int64(reader.read_i64::<LittleEndian>()?),
        PropertyKind::Float => FPropertyValue::Float(reader.read_f32::<LittleEndian>()?),
        PropertyKind::Str => FPropertyValue::Str(read_string(reader)?),
        PropertyKind::Name => FPropertyValue::Name(read_string(reader)?),
        PropertyKind::Object => FPropertyValue::Object(read_string(reader)?),
        PropertyKind::SoftObject => FPropertyValue::SoftObject(FSoftObjectValue {
            path: read_string(reader)?,
            unknown: reader.read_i32::<LittleEndian>()?,
        }),
        PropertyKind::Text => FPropertyValue::Text(FTextValue::new(reader)?),
        PropertyKind::Struct => match header {
            TypeHeader::Struct { struct_type, struct_guid } => {
                let struct_guid = if body_only { None } else { Some(*struct_guid) };
                let properties = if size == 0 && !body_only {
                    Vec::new()
                } else {
                    read_struct_body(reader, struct_type)?
                };
                FPropertyValue::Struct(FStructValue {
                    struct_type: Some(struct_type.clone()),
                    struct_guid,
                    properties,
                })
            },
            _ => FPropertyValue::Struct(FStructValue::from_properties(read_properties(reader)?)),
        },
        PropertyKind::Array => match header {
            TypeHeader::Array { element_type } => {
                let count = reader.read_u32::<LittleEndian>()?;
                if count == 0 {
                    FPropertyValue::Array(Vec::new())
                } else {
                    FPropertyValue::Array(read_property_array(reader, element_type, count)?)
                }
            },
            _ => return Err(ParserError::format("Array body without array header".to_owned())),
        },
        PropertyKind::Map => match header {
            TypeHeader::Map { key_type, value_type } => FPropertyValue::Map(read_map_body(reader, key_type, value_type)?),
            _ => return Err(ParserError::format("Map body without map header".to_owned())),
        },
        PropertyKind::Set => match header {
            TypeHeader::Set { element_type } => FPropertyValue::Set(read_set_body(reader, element_type)?),
            _ => return Err(ParserError::format("Set body without set header".to_owned())),
        },
        PropertyKind::Unknown => FPropertyValue::Unknown(read_bytes(reader, size as u64)?),
    })
}

fn read_float_fields(reader: &mut ReaderCursor, fields: &[(&str, &str)]) -> ParserResult<Vec<(String, FProperty)>> {
    let mut properties = Vec::new();
    for (key, name) in fields {
        let offset = reader.position();
        let value = FPropertyValue::Float(reader.read_f32::<LittleEndian>()?);
        properties.push((key.to_string(), FProperty::fixed(name, "FloatProperty", 4, offset, value)));
    }
    Ok(properties)
}

/// Struct bodies with a fixed binary layout; everything else is a named property list.
fn read_struct_body(reader: &mut ReaderCursor, struct_type: &str) -> ParserResult<Vec<(String, FProperty)>> {
    let offset = reader.position();
    match struct_type {
        "Vector" => read_float_fields(reader, &[("X", "X"), ("Y", "Y"), ("Z", "Z")]),
        "Quat" => read_float_fields(reader, &[("X", "X"), ("Y", "Y"), ("Z", "Z"), ("W", "W")]),
        "LinearColor" => read_float_fields(reader, &[("R", "X"), ("G", "Y"), ("B", "Z"), ("A", "W")]),
        "Timespan" | "DateTime" => {
            let value = FPropertyValue::Int64(reader.read_i64::<LittleEndian>()?);
            Ok(vec![("Ticks".to_owned(), FProperty::fixed("Ticks", "Int64Property", 8, offset, value))])
        },
        "GameplayTagContainer" => {
            let count = reader.read_i32::<LittleEndian>()?;
            let mut tags = Vec::new();
            for _i in 0..count {
                tags.push(read_string(reader)?);
            }
            let size = (reader.position() - offset) as i64;
            let value = FPropertyValue::GameplayTags(tags);
            Ok(vec![("Tags".to_owned(), FProperty::fixed("Tag", "TagContainerProperty", size, offset, value))])
        },
        "Guid" => {
            let value = FPropertyValue::Guid(FGuid::new(reader)?);
            Ok(vec![("GUID".to_owned(), FProperty::fixed("GUID", "GuidProperty", 16, offset, value))])
        },
        _ => read_properties(reader),
    }
}

fn read_map_body(reader: &mut ReaderCursor, key_type: &str, value_type: &str) -> ParserResult<FMapValue> {
    if key_type != "StrProperty" || value_type != "StructProperty" {
        return Err(ParserError::unsupported(format!("Map of {} to {}", key_type, value_type)));
    }

    let unknown = reader.read_i32::<LittleEndian>()?;
    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(ParserError::format(format!("Map has negative count {}", count)));
    }

    let mut entries = Vec::new();
    for _i in 0..count {
        let key = read_string(reader)?;
        let value_offset = reader.position();
        let value = FPropertyValue::Struct(FStructValue::from_properties(read_properties(reader)?));
        let property = FProperty::fixed(&key, value_type, UNSIZED, value_offset, value);
        entries.push((key, property));
    }

    Ok(FMapValue {
        key_type: key_type.to_owned(),
        value_type: value_type.to_owned(),
        unknown,
        entries,
    })
}

fn read_set_body(reader: &mut ReaderCursor, element_type: &str) -> ParserResult<FSetValue> {
    if element_type != "ObjectProperty" {
        return Err(ParserError::unsupported(format!("Set of {}", element_type)));
    }

    let unknown = reader.read_u32::<LittleEndian>()?;
    let count = reader.read_u32::<LittleEndian>()?;
    let mut elements = Vec::new();
    for _i in 0..count {
        elements.push(read_string(reader)?);
    }

    Ok(FSetValue {
        element_type: element_type.to_owned(),
        unknown,
        elements,
    })
}
