use std::convert::TryFrom;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use super::*;

const SAVE_GAME_IDENTIFIER: &[u8; 4] = b"GVAS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ECustomVersionSerializationFormat {
    Unknown,
    Guids,
    Enums,
    Optimized,
    AutomaticPlusOne,
}

impl TryFrom<i32> for ECustomVersionSerializationFormat {
    type Error = ParserError;

    fn try_from(value: i32) -> ParserResult<Self> {
        Ok(match value {
            0 => ECustomVersionSerializationFormat::Unknown,
            1 => ECustomVersionSerializationFormat::Guids,
            2 => ECustomVersionSerializationFormat::Enums,
            3 => ECustomVersionSerializationFormat::Optimized,
            4 => ECustomVersionSerializationFormat::AutomaticPlusOne,
            _ => return Err(ParserError::format(format!("Unknown custom version format: {}", value))),
        })
    }
}

/// A `.sav` document: a short header followed by one root property list.
#[derive(Debug, Serialize)]
pub struct FSaveGame {
    file_type: Option<u32>,
    save_game_version: u32,
    package_version: u32,
    engine_version: FEngineVersion,
    custom_version_format: ECustomVersionSerializationFormat,
    custom_versions: Vec<FCustomVersion>,
    save_game_class_name: String,
    unknown: Option<i32>,
    root: FStructValue,
}

impl FSaveGame {
    /// With `expect_identifier` the buffer must start with `GVAS`; otherwise the
    /// first four bytes are kept as an opaque file type.
    pub fn from_buffer(buf: &[u8], expect_identifier: bool) -> ParserResult<Self> {
        let mut reader = ReaderCursor::new(buf.to_vec());

        let file_type = match expect_identifier {
            true => {
                let identifier = read_bytes(&mut reader, 4)?;
                if identifier != SAVE_GAME_IDENTIFIER {
                    return Err(ParserError::format(format!("Invalid save identifier: {:?}", identifier)));
                }
                None
            },
            false => Some(reader.read_u32::<LittleEndian>()?),
        };

        let save_game_version = reader.read_u32::<LittleEndian>()?;
        let package_version = reader.read_u32::<LittleEndian>()?;
        let engine_version = FEngineVersion::new(&mut reader)?;
        let custom_version_format = ECustomVersionSerializationFormat::try_from(reader.read_i32::<LittleEndian>()?)?;
        let custom_versions = read_tarray(&mut reader)?;
        let save_game_class_name = read_string(&mut reader)?;
        let unknown = match engine_version.get_minor() > 26 {
            true => Some(reader.read_i32::<LittleEndian>()?),
            false => None,
        };

        let properties = match read_properties(&mut reader) {
            Ok(properties) => properties,
            Err(e) => return Err(ParserError::add(e, format!("Save: {}", save_game_class_name))),
        };

        Ok(Self {
            file_type,
            save_game_version,
            package_version,
            engine_version,
            custom_version_format,
            custom_versions,
            save_game_class_name,
            unknown,
            root: FStructValue::from_properties(properties),
        })
    }

    pub fn get_save_game_version(&self) -> u32 {
        self.save_game_version
    }

    pub fn get_package_version(&self) -> u32 {
        self.package_version
    }

    pub fn get_engine_version(&self) -> &FEngineVersion {
        &self.engine_version
    }

    pub fn get_custom_version_format(&self) -> ECustomVersionSerializationFormat {
        self.custom_version_format
    }

    pub fn get_custom_versions(&self) -> &[FCustomVersion] {
        &self.custom_versions
    }

    pub fn get_save_game_class_name(&self) -> &str {
        &self.save_game_class_name
    }

    pub fn get_root(&self) -> &FStructValue {
        &self.root
    }
}
