use byteorder::{LittleEndian, ReadBytesExt};
use log::{trace, warn};
use serde::Serialize;
use serde::ser::{Serializer, SerializeMap};
use super::*;

#[derive(Debug, Serialize)]
pub struct FIntPoint {
    x: u32,
    y: u32,
}

impl FIntPoint {
    pub fn get_x(&self) -> u32 {
        self.x
    }

    pub fn get_y(&self) -> u32 {
        self.y
    }
}

impl Newable for FIntPoint {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            x: reader.read_u32::<LittleEndian>()?,
            y: reader.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UScriptStruct {
    IntPoint(FIntPoint),
    Guid(FGuid),
}

impl UScriptStruct {
    fn new(reader: &mut ReaderCursor, struct_name: &str) -> ParserResult<Self> {
        Ok(match struct_name {
            "IntPoint" => UScriptStruct::IntPoint(FIntPoint::new(reader)?),
            "Guid" => UScriptStruct::Guid(FGuid::new(reader)?),
            _ => return Err(ParserError::unsupported(format!("Unsupported struct type: {}", struct_name))),
        })
    }
}

/// Type-specific fields serialized in a tag before its value.
#[derive(Debug)]
pub enum FPropertyTagData {
    StructProperty(String, FGuid),
    BoolProperty(bool),
    EnumProperty(String),
    ByteProperty(String),
    ArrayProperty(String),
    MapProperty(String, String),
    SetProperty(String),
    NoData,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FPropertyTagType {
    BoolProperty(bool),
    FloatProperty(f32),
    IntProperty(i32),
    Int8Property(i8),
    Int16Property(i16),
    UInt16Property(u16),
    UInt32Property(u32),
    UInt64Property(u64),
    ByteProperty(u8),
    NameProperty(String),
    StructProperty(UScriptStruct),
}

impl FPropertyTagType {
    fn new(reader: &mut ReaderCursor, name_map: &NameMap, property_type: &str, tag_data: &FPropertyTagData) -> ParserResult<Self> {
        Ok(match property_type {
            "BoolProperty" => FPropertyTagType::BoolProperty(
                match tag_data {
                    FPropertyTagData::BoolProperty(val) => *val,
                    _ => return Err(ParserError::format("Bool property does not have bool data".to_owned())),
                }
            ),
            "StructProperty" => FPropertyTagType::StructProperty(
                match tag_data {
                    FPropertyTagData::StructProperty(name, _guid) => UScriptStruct::new(reader, name)?,
                    _ => return Err(ParserError::format("Struct does not have struct data".to_owned())),
                }
            ),
            "FloatProperty" => FPropertyTagType::FloatProperty(reader.read_f32::<LittleEndian>()?),
            "IntProperty" => FPropertyTagType::IntProperty(reader.read_i32::<LittleEndian>()?),
            "Int8Property" => FPropertyTagType::Int8Property(reader.read_i8()?),
            "Int16Property" => FPropertyTagType::Int16Property(reader.read_i16::<LittleEndian>()?),
            "UInt16Property" => FPropertyTagType::UInt16Property(reader.read_u16::<LittleEndian>()?),
            "UInt32Property" => FPropertyTagType::UInt32Property(reader.read_u32::<LittleEndian>()?),
            "UInt64Property" => FPropertyTagType::UInt64Property(reader.read_u64::<LittleEndian>()?),
            "ByteProperty" => match tag_data {
                FPropertyTagData::ByteProperty(enum_name) if enum_name != "None" => {
                    FPropertyTagType::NameProperty(read_fname(reader, name_map)?)
                },
                FPropertyTagData::ByteProperty(_) => FPropertyTagType::ByteProperty(reader.read_u8()?),
                _ => return Err(ParserError::format("Byte property does not have byte data".to_owned())),
            },
            _ => return Err(ParserError::unsupported(format!("Could not read property type: {}", property_type))),
        })
    }
}

#[derive(Debug)]
pub struct FPropertyTag {
    name: String,
    property_type: String,
    tag_data: FPropertyTagData,
    size: i32,
    array_index: i32,
    property_guid: Option<FGuid>,
    tag: Option<FPropertyTagType>,
}

impl FPropertyTag {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_property_type(&self) -> &str {
        &self.property_type
    }

    pub fn get_tag_data(&self) -> &FPropertyTagData {
        &self.tag_data
    }

    pub fn get_size(&self) -> i32 {
        self.size
    }

    pub fn get_array_index(&self) -> i32 {
        self.array_index
    }

    pub fn get_property_guid(&self) -> Option<&FGuid> {
        self.property_guid.as_ref()
    }

    /// The decoded value, if it was requested and the type is understood.
    pub fn get_tag(&self) -> Option<&FPropertyTagType> {
        self.tag.as_ref()
    }
}

/// Reads one tag of an export's property bag. `None` is the bag terminator.
pub fn read_property_tag(reader: &mut ReaderCursor, name_map: &NameMap, read_data: bool) -> ParserResult<Option<FPropertyTag>> {
    let name = read_fname(reader, name_map)?;
    if name == "None" {
        return Ok(None);
    }

    let property_type = read_fname(reader, name_map)?.trim().to_owned();
    let size = reader.read_i32::<LittleEndian>()?;
    if size < 0 {
        return Err(ParserError::format(format!("Property {} has negative size {}", name, size)));
    }
    let array_index = reader.read_i32::<LittleEndian>()?;

    trace!("Reading property: {} {}", property_type, name);

    let tag_data = match property_type.as_str() {
        "StructProperty" => FPropertyTagData::StructProperty(read_fname(reader, name_map)?, FGuid::new(reader)?),
        "BoolProperty" => FPropertyTagData::BoolProperty(reader.read_u8()? != 0),
        "EnumProperty" => FPropertyTagData::EnumProperty(read_fname(reader, name_map)?),
        "ByteProperty" => FPropertyTagData::ByteProperty(read_fname(reader, name_map)?),
        "ArrayProperty" => FPropertyTagData::ArrayProperty(read_fname(reader, name_map)?),
        "MapProperty" => FPropertyTagData::MapProperty(read_fname(reader, name_map)?, read_fname(reader, name_map)?),
        "SetProperty" => FPropertyTagData::SetProperty(read_fname(reader, name_map)?),
        _ => FPropertyTagData::NoData,
    };

    let has_property_guid = reader.read_u8()? != 0;
    let property_guid = match has_property_guid {
        true => Some(FGuid::new(reader)?),
        false => None,
    };

    let pos = reader.position();
    let tag = if read_data {
        match FPropertyTagType::new(reader, name_map, &property_type, &tag_data) {
            Ok(tag) => Some(tag),
            Err(e) if e.is_unsupported() => {
                warn!("Skipping property {}: {}", name, e);
                None
            },
            Err(e) => return Err(ParserError::add(e, format!("Property: {}", name))),
        }
    } else {
        None
    };
    reader.set_position(pos + size as u64);

    Ok(Some(FPropertyTag {
        name,
        property_type,
        tag_data,
        size,
        array_index,
        property_guid,
        tag,
    }))
}

/// Generic export body: a property tag bag plus an optional object guid.
#[derive(Debug)]
pub struct UObject {
    export_type: String,
    properties: Vec<FPropertyTag>,
    object_guid: Option<FGuid>,
}

impl UObject {
    pub fn new(reader: &mut ReaderCursor, name_map: &NameMap, export_type: &str, read_data: bool) -> ParserResult<Self> {
        trace!("Export type: {}", export_type);
        let mut properties = Vec::new();
        loop {
            let tag = read_property_tag(reader, name_map, read_data)?;
            let tag = match tag {
                Some(data) => data,
                None => break,
            };

            properties.push(tag);
        }

        let serialize_guid = reader.read_u32::<LittleEndian>()?;
        let object_guid = match serialize_guid {
            0 => None,
            _ => Some(FGuid::new(reader)?),
        };

        Ok(Self {
            properties,
            export_type: export_type.to_owned(),
            object_guid,
        })
    }

    pub fn get_export_type(&self) -> &str {
        &self.export_type
    }

    pub fn get_properties(&self) -> &[FPropertyTag] {
        &self.properties
    }

    pub fn get_property(&self, name: &str) -> Option<&FPropertyTag> {
        self.properties.iter().find(|v| v.name == name)
    }

    pub fn get_object_guid(&self) -> Option<&FGuid> {
        self.object_guid.as_ref()
    }
}

impl Serialize for UObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for property in &self.properties {
            map.serialize_entry(&property.name, &property.tag)?;
        }
        map.end()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    pub(crate) fn name_map() -> NameMap {
        NameMap::from(["None", "Size", "IntPoint", "StructProperty", "IntProperty", "ByteProperty",
            "EMode", "EMode::Fast", "BoolProperty", "Flag", "Mode", "Raw", "TextProperty", "Label",
            "SRGB", "Count"].iter().map(|v| v.to_string()).collect::<Vec<String>>())
    }

    pub(crate) fn write_name(data: &mut Vec<u8>, name_map: &NameMap, name: &str) {
        let index = name_map.get_entries().iter().position(|v| v.get_data() == name).unwrap();
        data.write_i32::<LittleEndian>(index as i32).unwrap();
        data.write_i32::<LittleEndian>(0).unwrap();
    }

    pub(crate) fn write_tag(data: &mut Vec<u8>, name_map: &NameMap, name: &str, property_type: &str, tag_data: &[u8], value: &[u8]) {
        write_name(data, name_map, name);
        write_name(data, name_map, property_type);
        data.write_i32::<LittleEndian>(value.len() as i32).unwrap();
        data.write_i32::<LittleEndian>(0).unwrap();
        data.extend_from_slice(tag_data);
        data.push(0);
        data.extend_from_slice(value);
    }

    #[test]
    fn reads_known_tags() {
        let names = name_map();
        let mut struct_data = Vec::new();
        write_name(&mut struct_data, &names, "IntPoint");
        struct_data.extend_from_slice(&[0u8; 16]);
        let mut enum_data = Vec::new();
        write_name(&mut enum_data, &names, "EMode");
        let mut enum_value = Vec::new();
        write_name(&mut enum_value, &names, "EMode::Fast");
        let mut raw_data = Vec::new();
        write_name(&mut raw_data, &names, "None");

        let mut data = Vec::new();
        write_tag(&mut data, &names, "Size", "StructProperty", &struct_data, &[4, 0, 0, 0, 8, 0, 0, 0]);
        write_tag(&mut data, &names, "Count", "IntProperty", &[], &[7, 0, 0, 0]);
        write_tag(&mut data, &names, "Mode", "ByteProperty", &enum_data, &enum_value);
        write_tag(&mut data, &names, "Raw", "ByteProperty", &raw_data, &[3]);
        write_tag(&mut data, &names, "Flag", "BoolProperty", &[1], &[]);
        write_name(&mut data, &names, "None");
        data.write_u32::<LittleEndian>(0).unwrap();

        let mut reader = ReaderCursor::new(data);
        let object = UObject::new(&mut reader, &names, "Thing", true).unwrap();
        assert_eq!(object.get_properties().len(), 5);
        assert!(object.get_object_guid().is_none());
        assert_eq!(serde_json::to_string(&object).unwrap(),
            r#"{"Size":{"x":4,"y":8},"Count":7,"Mode":"EMode::Fast","Raw":3,"Flag":true}"#);
    }

    #[test]
    fn reads_numeric_tags_and_guid_struct() {
        let names = NameMap::from(["None", "FloatProperty", "Int8Property", "Int16Property", "UInt16Property",
            "UInt32Property", "UInt64Property", "StructProperty", "Guid", "Value"]
            .iter().map(|v| v.to_string()).collect::<Vec<String>>());
        let mut guid_data = Vec::new();
        write_name(&mut guid_data, &names, "Guid");
        guid_data.extend_from_slice(&[0u8; 16]);
        let guid_bytes: Vec<u8> = (1u8..=16).collect();

        let mut data = Vec::new();
        write_tag(&mut data, &names, "Value", "FloatProperty", &[], &1.5f32.to_le_bytes());
        write_tag(&mut data, &names, "Value", "Int8Property", &[], &[0xFE]);
        write_tag(&mut data, &names, "Value", "Int16Property", &[], &(-300i16).to_le_bytes());
        write_tag(&mut data, &names, "Value", "UInt16Property", &[], &60000u16.to_le_bytes());
        write_tag(&mut data, &names, "Value", "UInt32Property", &[], &4_000_000_000u32.to_le_bytes());
        write_tag(&mut data, &names, "Value", "UInt64Property", &[], &(1u64 << 40).to_le_bytes());
        write_tag(&mut data, &names, "Value", "StructProperty", &guid_data, &guid_bytes);
        write_name(&mut data, &names, "None");
        data.write_u32::<LittleEndian>(0).unwrap();

        let mut reader = ReaderCursor::new(data);
        let object = UObject::new(&mut reader, &names, "Thing", true).unwrap();
        let tags: Vec<&FPropertyTagType> = object.get_properties().iter().map(|v| v.get_tag().unwrap()).collect();
        assert_eq!(tags.len(), 7);
        match tags[0] { FPropertyTagType::FloatProperty(v) => assert_eq!(*v, 1.5), other => panic!("unexpected {:?}", other) }
        match tags[1] { FPropertyTagType::Int8Property(v) => assert_eq!(*v, -2), other => panic!("unexpected {:?}", other) }
        match tags[2] { FPropertyTagType::Int16Property(v) => assert_eq!(*v, -300), other => panic!("unexpected {:?}", other) }
        match tags[3] { FPropertyTagType::UInt16Property(v) => assert_eq!(*v, 60000), other => panic!("unexpected {:?}", other) }
        match tags[4] { FPropertyTagType::UInt32Property(v) => assert_eq!(*v, 4_000_000_000), other => panic!("unexpected {:?}", other) }
        match tags[5] { FPropertyTagType::UInt64Property(v) => assert_eq!(*v, 1u64 << 40), other => panic!("unexpected {:?}", other) }
        match tags[6] {
            FPropertyTagType::StructProperty(UScriptStruct::Guid(guid)) => assert_eq!(guid.to_bytes().to_vec(), guid_bytes),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_is_skipped_by_size() {
        let names = name_map();
        let mut data = Vec::new();
        write_tag(&mut data, &names, "Label", "TextProperty", &[], &[1, 2, 3, 4, 5, 6]);
        write_tag(&mut data, &names, "Count", "IntProperty", &[], &[2, 0, 0, 0]);
        write_name(&mut data, &names, "None");
        data.write_u32::<LittleEndian>(1).unwrap();
        data.extend_from_slice(&[9u8; 16]);
        let total = data.len() as u64;

        let mut reader = ReaderCursor::new(data);
        let object = UObject::new(&mut reader, &names, "Thing", true).unwrap();
        assert_eq!(reader.position(), total);
        assert!(object.get_property("Label").unwrap().get_tag().is_none());
        assert_eq!(object.get_property("Label").unwrap().get_size(), 6);
        match object.get_property("Count").unwrap().get_tag() {
            Some(FPropertyTagType::IntProperty(v)) => assert_eq!(*v, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(object.get_object_guid().unwrap().to_bytes(), [9u8; 16]);
    }

    #[test]
    fn headers_only_without_data() {
        let names = name_map();
        let mut data = Vec::new();
        write_tag(&mut data, &names, "Count", "IntProperty", &[], &[2, 0, 0, 0]);
        write_name(&mut data, &names, "None");

        let mut reader = ReaderCursor::new(data);
        let tag = read_property_tag(&mut reader, &names, false).unwrap().unwrap();
        assert_eq!(tag.get_property_type(), "IntProperty");
        assert!(tag.get_tag().is_none());
        assert!(read_property_tag(&mut reader, &names, false).unwrap().is_none());
    }

    #[test]
    fn negative_size_is_format_error() {
        let names = name_map();
        let mut data = Vec::new();
        write_name(&mut data, &names, "Count");
        write_name(&mut data, &names, "IntProperty");
        data.write_i32::<LittleEndian>(-4).unwrap();
        data.write_i32::<LittleEndian>(0).unwrap();

        let mut reader = ReaderCursor::new(data);
        let err = read_property_tag(&mut reader, &names, true).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }
}
