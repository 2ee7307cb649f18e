use std::convert::TryFrom;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};
use serde::Serialize;
use serde::ser::{Serializer, SerializeSeq};
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

mod bulk;
mod fproperty;
mod properties;
mod save;
mod texture2d;

pub use bulk::{BulkDataFlags, FByteBulkData};
pub use fproperty::{FProperty, FPropertyValue, FStructValue, FByteValue, FTextValue, FSoftObjectValue,
    FMapValue, FSetValue, read_properties, UNSIZED};
pub use properties::{FPropertyTag, FPropertyTagData, FPropertyTagType, UScriptStruct, FIntPoint, UObject, read_property_tag};
pub use save::{FSaveGame, ECustomVersionSerializationFormat};
pub use texture2d::{Texture2D, FStripDataFlags, FTexturePlatformData, FTexture2DMipMap, FVirtualTextureBuiltData,
    FVirtualTextureDataChunk, EVirtualTextureCodec};

pub type ReaderCursor = Cursor<Vec<u8>>;

const PACKAGE_FILE_TAG: u32 = 0x9E2A83C1;
const LEGACY_FILE_VERSION: i32 = -7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserErrorKind {
    /// The input violates the format: bad magic, broken structure, index out of range.
    Format,
    /// The input is well formed but uses something this reader does not implement.
    Unsupported,
    Io,
}

/// Error raised while reading a package, save file or texture.
///
/// The property list is a trail of context, innermost first, that grows as
/// the error is handed up through nested readers.
#[derive(Debug)]
pub struct ParserError {
    kind: ParserErrorKind,
    property_list: Vec<String>,
}

impl ParserError {
    pub fn new(kind: ParserErrorKind, start: String) -> Self {
        Self {
            kind,
            property_list: vec![start],
        }
    }

    pub fn format(start: String) -> Self {
        Self::new(ParserErrorKind::Format, start)
    }

    pub fn unsupported(start: String) -> Self {
        Self::new(ParserErrorKind::Unsupported, start)
    }

    pub fn add(mut error: ParserError, property: String) -> Self {
        error.property_list.push(property);
        error
    }

    pub fn get_kind(&self) -> ParserErrorKind {
        self.kind
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind == ParserErrorKind::Unsupported
    }

    pub fn get_properties(&self) -> &[String] {
        &self.property_list
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} error: {}", self.kind, self.property_list.join(" <- "))
    }
}

impl std::error::Error for ParserError {}

impl From<std::io::Error> for ParserError {
    fn from(error: std::io::Error) -> ParserError {
        ParserError::new(ParserErrorKind::Io, format!("{}", error))
    }
}

impl From<std::str::Utf8Error> for ParserError {
    fn from(error: std::str::Utf8Error) -> ParserError {
        ParserError::format(format!("Invalid UTF-8 string: {}", error))
    }
}

impl From<std::string::FromUtf16Error> for ParserError {
    fn from(error: std::string::FromUtf16Error) -> ParserError {
        ParserError::format(format!("Invalid UTF-16 string: {}", error))
    }
}

pub type ParserResult<T> = Result<T, ParserError>;

pub trait Newable: Sized {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self>;
}

pub trait NewableWithNameMap: Sized {
    fn new_n(reader: &mut ReaderCursor, name_map: &NameMap, import_map: &[FObjectImport]) -> ParserResult<Self>;
}

fn remaining(reader: &ReaderCursor) -> u64 {
    (reader.get_ref().len() as u64).saturating_sub(reader.position())
}

/// Fails before allocating when fewer than `length` bytes are left.
pub(crate) fn ensure_remaining(reader: &ReaderCursor, length: u64) -> ParserResult<()> {
    let left = remaining(reader);
    if length > left {
        return Err(ParserError::format(format!("Read of {} bytes at {} runs past the end ({} left)",
            length, reader.position(), left)));
    }
    Ok(())
}

pub(crate) fn read_bytes(reader: &mut ReaderCursor, length: u64) -> ParserResult<Vec<u8>> {
    ensure_remaining(reader, length)?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Reads a length-prefixed string. Negative lengths are UTF-16 code units.
pub fn read_string(reader: &mut ReaderCursor) -> ParserResult<String> {
    let length = reader.read_i32::<LittleEndian>()?;
    if length == 0 {
        return Ok(String::new());
    }

    if length < 0 {
        let units = (length as i64).abs() as u64;
        ensure_remaining(reader, units * 2)?;
        let mut u16bytes = vec![0u16; units as usize];
        reader.read_u16_into::<LittleEndian>(&mut u16bytes)?;
        if u16bytes.last() == Some(&0) {
            u16bytes.pop();
        }
        return Ok(String::from_utf16(&u16bytes)?);
    }

    let mut bytes = read_bytes(reader, length as u64)?;
    if bytes.last() == Some(&0) {
        bytes.pop();
    }

    Ok(std::str::from_utf8(&bytes)?.to_owned())
}

pub fn read_tarray<S>(reader: &mut ReaderCursor) -> ParserResult<Vec<S>> where S: Newable {
    let length = reader.read_u32::<LittleEndian>()?;
    let mut container = Vec::new();

    for _i in 0..length {
        container.push(S::new(reader)?);
    }

    Ok(container)
}

/// Runs `f` with the cursor at `offset` and puts the cursor back where it was
/// afterwards, whether or not `f` succeeded.
pub fn read_at<T, F>(reader: &mut ReaderCursor, offset: u64, f: F) -> ParserResult<T>
where F: FnOnce(&mut ReaderCursor) -> ParserResult<T> {
    let current = reader.position();
    reader.seek(SeekFrom::Start(offset))?;
    let result = f(reader);
    reader.set_position(current);
    result
}

impl Newable for String {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        read_string(reader)
    }
}

impl Newable for i32 {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl Newable for u32 {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FGuid {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl FGuid {
    /// The 16 bytes exactly as they were serialized.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.a.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.b.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.c.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.d.to_le_bytes());
        bytes
    }
}

impl Newable for FGuid {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            a: reader.read_u32::<LittleEndian>()?,
            b: reader.read_u32::<LittleEndian>()?,
            c: reader.read_u32::<LittleEndian>()?,
            d: reader.read_u32::<LittleEndian>()?,
        })
    }
}

impl fmt::Display for FGuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x}{:08x}{:08x}{:08x}", self.a, self.b, self.c, self.d)
    }
}

#[derive(Debug, Serialize)]
pub struct FCustomVersion {
    key: FGuid,
    version: i32,
}

impl Newable for FCustomVersion {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            key: FGuid::new(reader)?,
            version: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct FGenerationInfo {
    export_count: i32,
    name_count: i32,
}

impl Newable for FGenerationInfo {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            export_count: reader.read_i32::<LittleEndian>()?,
            name_count: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FEngineVersion {
    major: u16,
    minor: u16,
    patch: u16,
    changelist: u32,
    branch: String,
}

impl FEngineVersion {
    pub fn get_major(&self) -> u16 {
        self.major
    }

    pub fn get_minor(&self) -> u16 {
        self.minor
    }
}

impl Newable for FEngineVersion {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            major: reader.read_u16::<LittleEndian>()?,
            minor: reader.read_u16::<LittleEndian>()?,
            patch: reader.read_u16::<LittleEndian>()?,
            changelist: reader.read_u32::<LittleEndian>()?,
            branch: read_string(reader)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct FCompressedChunk {
    uncompressed_offset: i32,
    uncompressed_size: i32,
    compressed_offset: i32,
    compressed_size: i32,
}

impl Newable for FCompressedChunk {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            uncompressed_offset: reader.read_i32::<LittleEndian>()?,
            uncompressed_size: reader.read_i32::<LittleEndian>()?,
            compressed_offset: reader.read_i32::<LittleEndian>()?,
            compressed_size: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FPackageFileSummary {
    tag: u32,
    legacy_file_version: i32,
    legacy_ue3_version: i32,
    file_version_ue4: i32,
    file_version_licensee_ue4: i32,
    total_header_size: i32,
    folder_name: String,
    package_flags: u32,
    name_count: i32,
    name_offset: i32,
    gatherable_text_data_count: i32,
    gatherable_text_data_offset: i32,
    export_count: i32,
    export_offset: i32,
    import_count: i32,
    import_offset: i32,
    depends_offset: i32,
    string_asset_references_count: i32,
    string_asset_references_offset: i32,
    searchable_names_offset: i32,
    thumbnail_table_offset: i32,
    guid: FGuid,
    generations: Vec<FGenerationInfo>,
    saved_by_engine_version: FEngineVersion,
    compatible_with_engine_version: FEngineVersion,
    compression_flags: u32,
    compressed_chunks: Vec<FCompressedChunk>,
    package_source: u32,
    additional_packages_to_cook: Vec<String>,
    bulk_data_start_offset: u32,
    world_tile_info_data_offset: u32,
    chunk_ids: Vec<i32>,
    preload_dependency_count: i32,
    preload_dependency_offset: i32,
}

impl FPackageFileSummary {
    pub fn get_file_version(&self) -> i32 {
        self.file_version_ue4
    }

    pub fn get_licensee_version(&self) -> i32 {
        self.file_version_licensee_ue4
    }

    pub fn get_folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn get_package_flags(&self) -> u32 {
        self.package_flags
    }

    pub fn get_saved_by_engine_version(&self) -> &FEngineVersion {
        &self.saved_by_engine_version
    }
}

impl Newable for FPackageFileSummary {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        let tag = reader.read_u32::<LittleEndian>()?;
        if tag != PACKAGE_FILE_TAG {
            return Err(ParserError::format(format!("Invalid package tag: {:#010x}", tag)));
        }
        let legacy_file_version = reader.read_i32::<LittleEndian>()?;
        if legacy_file_version != LEGACY_FILE_VERSION {
            return Err(ParserError::format(format!("Unexpected legacy file version: {}", legacy_file_version)));
        }
        let legacy_ue3_version = reader.read_i32::<LittleEndian>()?;
        let file_version_ue4 = reader.read_i32::<LittleEndian>()?;
        let file_version_licensee_ue4 = reader.read_i32::<LittleEndian>()?;
        let custom_version_count = reader.read_u32::<LittleEndian>()?;
        if custom_version_count != 0 {
            return Err(ParserError::unsupported(format!("Custom versions in package header: {}", custom_version_count)));
        }

        Ok(Self {
            tag,
            legacy_file_version,
            legacy_ue3_version,
            file_version_ue4,
            file_version_licensee_ue4,
            total_header_size: reader.read_i32::<LittleEndian>()?,
            folder_name: read_string(reader)?,
            package_flags: reader.read_u32::<LittleEndian>()?,
            name_count: reader.read_i32::<LittleEndian>()?,
            name_offset: reader.read_i32::<LittleEndian>()?,
            gatherable_text_data_count: reader.read_i32::<LittleEndian>()?,
            gatherable_text_data_offset: reader.read_i32::<LittleEndian>()?,
            export_count: reader.read_i32::<LittleEndian>()?,
            export_offset: reader.read_i32::<LittleEndian>()?,
            import_count: reader.read_i32::<LittleEndian>()?,
            import_offset: reader.read_i32::<LittleEndian>()?,
            depends_offset: reader.read_i32::<LittleEndian>()?,
            string_asset_references_count: reader.read_i32::<LittleEndian>()?,
            string_asset_references_offset: reader.read_i32::<LittleEndian>()?,
            searchable_names_offset: reader.read_i32::<LittleEndian>()?,
            thumbnail_table_offset: reader.read_i32::<LittleEndian>()?,
            guid: FGuid::new(reader)?,
            generations: read_tarray(reader)?,
            saved_by_engine_version: FEngineVersion::new(reader)?,
            compatible_with_engine_version: FEngineVersion::new(reader)?,
            compression_flags: reader.read_u32::<LittleEndian>()?,
            compressed_chunks: read_tarray(reader)?,
            package_source: reader.read_u32::<LittleEndian>()?,
            additional_packages_to_cook: read_tarray(reader)?,
            bulk_data_start_offset: reader.read_u32::<LittleEndian>()?,
            world_tile_info_data_offset: reader.read_u32::<LittleEndian>()?,
            chunk_ids: read_tarray(reader)?,
            preload_dependency_count: reader.read_i32::<LittleEndian>()?,
            preload_dependency_offset: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FNameEntrySerialized {
    data: String,
    non_case_preserving_hash: u16,
    case_preserving_hash: u16,
}

impl FNameEntrySerialized {
    pub fn get_data(&self) -> &str {
        &self.data
    }
}

impl Newable for FNameEntrySerialized {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            data: read_string(reader)?,
            non_case_preserving_hash: reader.read_u16::<LittleEndian>()?,
            case_preserving_hash: reader.read_u16::<LittleEndian>()?,
        })
    }
}

/// The package's name table. Everything else refers to names by index.
#[derive(Debug, Default)]
pub struct NameMap {
    names: Vec<FNameEntrySerialized>,
}

impl NameMap {
    pub fn new(names: Vec<FNameEntrySerialized>) -> Self {
        Self { names }
    }

    /// Resolves a name reference. A positive number is appended verbatim as `_<number>`.
    pub fn get_name(&self, index: i32, number: i32) -> ParserResult<String> {
        let entry = match usize::try_from(index).ok().and_then(|i| self.names.get(i)) {
            Some(entry) => entry,
            None => return Err(ParserError::format(format!("Name index {} out of range ({} names)", index, self.names.len()))),
        };

        if number > 0 {
            Ok(format!("{}_{}", entry.data, number))
        } else {
            Ok(entry.data.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get_entries(&self) -> &[FNameEntrySerialized] {
        &self.names
    }
}

impl From<Vec<String>> for NameMap {
    fn from(names: Vec<String>) -> Self {
        Self::new(names.into_iter().map(|data| FNameEntrySerialized {
            data,
            non_case_preserving_hash: 0,
            case_preserving_hash: 0,
        }).collect())
    }
}

impl Serialize for NameMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut seq = serializer.serialize_seq(Some(self.names.len()))?;
        for name in &self.names {
            seq.serialize_element(&name.data)?;
        }
        seq.end()
    }
}

pub fn read_fname(reader: &mut ReaderCursor, name_map: &NameMap) -> ParserResult<String> {
    let name_index = reader.read_i32::<LittleEndian>()?;
    let name_number = reader.read_i32::<LittleEndian>()?;
    name_map.get_name(name_index, name_number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageObject {
    Null,
    Import(usize),
    Export(usize),
}

/// Signed reference into the import (negative) or export (positive) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FPackageIndex {
    index: i32,
}

impl FPackageIndex {
    pub fn from_raw(index: i32) -> Self {
        Self { index }
    }

    pub fn get_index(&self) -> i32 {
        self.index
    }

    pub fn resolve(&self) -> PackageObject {
        if self.index < 0 {
            PackageObject::Import((-(self.index as i64) - 1) as usize)
        } else if self.index > 0 {
            PackageObject::Export((self.index - 1) as usize)
        } else {
            PackageObject::Null
        }
    }

    pub fn get_import<'a>(&self, import_map: &'a [FObjectImport]) -> Option<&'a FObjectImport> {
        match self.resolve() {
            PackageObject::Import(i) => import_map.get(i),
            _ => None,
        }
    }

    fn check(&self, import_count: usize, export_count: usize) -> ParserResult<()> {
        let in_range = match self.resolve() {
            PackageObject::Null => true,
            PackageObject::Import(i) => i < import_count,
            PackageObject::Export(i) => i < export_count,
        };
        if !in_range {
            return Err(ParserError::format(format!("Package index {} out of range ({} imports, {} exports)",
                self.index, import_count, export_count)));
        }
        Ok(())
    }
}

impl Newable for FPackageIndex {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            index: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FObjectImport {
    class_package: String,
    class_name: String,
    outer_index: FPackageIndex,
    #[serde(skip)]
    outer_import: Option<usize>,
    object_name: String,
}

impl FObjectImport {
    pub fn get_class_package(&self) -> &str {
        &self.class_package
    }

    pub fn get_class_name(&self) -> &str {
        &self.class_name
    }

    pub fn get_object_name(&self) -> &str {
        &self.object_name
    }

    pub fn get_outer_index(&self) -> FPackageIndex {
        self.outer_index
    }

    /// Position of the outer import in the import table, when the outer is an import.
    pub fn get_outer_import(&self) -> Option<usize> {
        self.outer_import
    }
}

impl NewableWithNameMap for FObjectImport {
    fn new_n(reader: &mut ReaderCursor, name_map: &NameMap, _import_map: &[FObjectImport]) -> ParserResult<Self> {
        Ok(Self {
            class_package: read_fname(reader, name_map)?,
            class_name: read_fname(reader, name_map)?,
            outer_index: FPackageIndex::new(reader)?,
            outer_import: None,
            object_name: read_fname(reader, name_map)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FObjectExport {
    class_index: FPackageIndex,
    class_name: String,
    super_index: FPackageIndex,
    template_index: FPackageIndex,
    outer_index: FPackageIndex,
    object_name: String,
    save: u32,
    serial_size: i64,
    serial_offset: i64,
    forced_export: bool,
    not_for_client: bool,
    not_for_server: bool,
    package_guid: FGuid,
    package_flags: u32,
    not_always_loaded_for_editor_game: bool,
    is_asset: bool,
    first_export_dependency: i32,
    serialization_before_serialization_dependencies: bool,
    create_before_serialization_dependencies: bool,
    serialization_before_create_dependencies: bool,
    create_before_create_dependencies: bool,
}

impl FObjectExport {
    pub fn get_class_index(&self) -> FPackageIndex {
        self.class_index
    }

    pub fn get_super_index(&self) -> FPackageIndex {
        self.super_index
    }

    pub fn get_template_index(&self) -> FPackageIndex {
        self.template_index
    }

    pub fn get_outer_index(&self) -> FPackageIndex {
        self.outer_index
    }

    /// Object name of the export's class, as resolved through the package tables.
    pub fn get_class_name(&self) -> &str {
        &self.class_name
    }

    pub fn get_object_name(&self) -> &str {
        &self.object_name
    }

    pub fn get_serial_size(&self) -> i64 {
        self.serial_size
    }

    pub fn get_serial_offset(&self) -> i64 {
        self.serial_offset
    }

    pub fn get_package_guid(&self) -> &FGuid {
        &self.package_guid
    }

    pub fn is_asset(&self) -> bool {
        self.is_asset
    }
}

impl NewableWithNameMap for FObjectExport {
    fn new_n(reader: &mut ReaderCursor, name_map: &NameMap, import_map: &[FObjectImport]) -> ParserResult<Self> {
        let class_index = FPackageIndex::new(reader)?;
        let class_name = match class_index.resolve() {
            PackageObject::Import(_) => match class_index.get_import(import_map) {
                Some(import) => import.object_name.clone(),
                None => return Err(ParserError::format(format!("Export class index {} out of range ({} imports)",
                    class_index.index, import_map.len()))),
            },
            // filled in once every export name is known
            _ => String::new(),
        };

        Ok(Self {
            class_index,
            class_name,
            super_index: FPackageIndex::new(reader)?,
            template_index: FPackageIndex::new(reader)?,
            outer_index: FPackageIndex::new(reader)?,
            object_name: read_fname(reader, name_map)?,
            save: reader.read_u32::<LittleEndian>()?,
            serial_size: reader.read_i64::<LittleEndian>()?,
            serial_offset: reader.read_i64::<LittleEndian>()?,
            forced_export: reader.read_i32::<LittleEndian>()? != 0,
            not_for_client: reader.read_i32::<LittleEndian>()? != 0,
            not_for_server: reader.read_i32::<LittleEndian>()? != 0,
            package_guid: FGuid::new(reader)?,
            package_flags: reader.read_u32::<LittleEndian>()?,
            not_always_loaded_for_editor_game: reader.read_u32::<LittleEndian>()? != 0,
            is_asset: reader.read_u32::<LittleEndian>()? != 0,
            first_export_dependency: reader.read_i32::<LittleEndian>()?,
            serialization_before_serialization_dependencies: reader.read_u32::<LittleEndian>()? != 0,
            create_before_serialization_dependencies: reader.read_u32::<LittleEndian>()? != 0,
            serialization_before_create_dependencies: reader.read_u32::<LittleEndian>()? != 0,
            create_before_create_dependencies: reader.read_u32::<LittleEndian>()? != 0,
        })
    }
}

/// A decoded export body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PackageExport {
    Texture2D(Texture2D),
    Object(UObject),
}

impl PackageExport {
    pub fn get_export_type(&self) -> &str {
        match self {
            PackageExport::Texture2D(_) => "Texture2D",
            PackageExport::Object(object) => object.get_export_type(),
        }
    }

    pub fn get_object(&self) -> &UObject {
        match self {
            PackageExport::Texture2D(texture) => texture.get_base_object(),
            PackageExport::Object(object) => object,
        }
    }
}

fn table_range(count: i32, offset: i32, table: &str) -> ParserResult<(usize, u64)> {
    if count < 0 || offset < 0 {
        return Err(ParserError::format(format!("Invalid {} table: count {} at offset {}", table, count, offset)));
    }
    Ok((count as usize, offset as u64))
}

/// Header of one asset: summary plus name, import and export tables.
#[derive(Debug, Serialize)]
pub struct Package {
    summary: FPackageFileSummary,
    name_map: NameMap,
    import_map: Vec<FObjectImport>,
    export_map: Vec<FObjectExport>,
    export_size: i64,
}

impl Package {
    pub fn from_buffer(uasset: &[u8]) -> ParserResult<Self> {
        let mut cursor = ReaderCursor::new(uasset.to_vec());
        let summary = FPackageFileSummary::new(&mut cursor)?;

        let (name_count, name_offset) = table_range(summary.name_count, summary.name_offset, "name")?;
        let mut name_map = NameMap::default();
        if name_count > 0 {
            name_map = read_at(&mut cursor, name_offset, |reader| {
                let mut names = Vec::new();
                for _i in 0..name_count {
                    names.push(FNameEntrySerialized::new(reader)?);
                }
                Ok(NameMap::new(names))
            })?;
        }

        let (import_count, import_offset) = table_range(summary.import_count, summary.import_offset, "import")?;
        let mut import_map = Vec::new();
        if import_count > 0 {
            import_map = read_at(&mut cursor, import_offset, |reader| {
                let mut imports: Vec<FObjectImport> = Vec::new();
                for _i in 0..import_count {
                    let import = FObjectImport::new_n(reader, &name_map, &imports)?;
                    imports.push(import);
                }
                Ok(imports)
            })?;
        }

        // outers may point forward in the table
        for i in 0..import_map.len() {
            let outer_index = import_map[i].outer_index;
            if let PackageObject::Import(outer) = outer_index.resolve() {
                if outer >= import_map.len() {
                    return Err(ParserError::format(format!("Import {} has outer index {} out of range",
                        import_map[i].object_name, outer_index.index)));
                }
                import_map[i].outer_import = Some(outer);
            }
        }

        let (export_count, export_offset) = table_range(summary.export_count, summary.export_offset, "export")?;
        let mut export_map = Vec::new();
        if export_count > 0 {
            export_map = read_at(&mut cursor, export_offset, |reader| {
                let mut exports = Vec::new();
                for _i in 0..export_count {
                    exports.push(FObjectExport::new_n(reader, &name_map, &import_map)?);
                }
                Ok(exports)
            })?;
        }

        for i in 0..export_map.len() {
            let export = &export_map[i];
            for index in &[export.class_index, export.super_index, export.template_index, export.outer_index] {
                index.check(import_map.len(), export_map.len())?;
            }
            let class_name = match export.class_index.resolve() {
                PackageObject::Import(_) => continue,
                PackageObject::Export(class) => export_map[class].object_name.clone(),
                PackageObject::Null => "None".to_owned(),
            };
            export_map[i].class_name = class_name;
        }

        let export_size = export_map.iter().map(|v| v.serial_size).sum();

        Ok(Self {
            summary,
            name_map,
            import_map,
            export_map,
            export_size,
        })
    }

    /// Decodes every export body from the companion `.uexp` buffer.
    pub fn read_exports(&self, uexp: &[u8]) -> ParserResult<Vec<PackageExport>> {
        let mut cursor = ReaderCursor::new(uexp.to_vec());
        self.export_map.iter().map(|export| {
            let position = self.get_body_offset(export)?;
            cursor.seek(SeekFrom::Start(position))?;
            let export_type = export.get_class_name();
            let result = match export_type {
                "Texture2D" => Texture2D::new(&mut cursor, &self.name_map).map(PackageExport::Texture2D),
                _ => UObject::new(&mut cursor, &self.name_map, export_type, true).map(PackageExport::Object),
            };
            let result = match result {
                Ok(data) => data,
                Err(e) => return Err(ParserError::add(e, format!("Export: {} ({})", export.object_name, export_type))),
            };

            let end = position + export.serial_size as u64;
            if cursor.position() != end {
                debug!("Did not read {} fully: stopped at {} of {}", export.object_name, cursor.position(), end);
            }
            Ok(result)
        }).collect()
    }

    /// Offset of an export's body within the `.uexp` buffer.
    pub fn get_body_offset(&self, export: &FObjectExport) -> ParserResult<u64> {
        let position = export.serial_offset - self.get_total_header_size();
        if position < 0 || export.serial_size < 0 {
            return Err(ParserError::format(format!("Export {} has serial offset {} before header end {}",
                export.object_name, export.serial_offset, self.get_total_header_size())));
        }
        Ok(position as u64)
    }

    pub fn get_summary(&self) -> &FPackageFileSummary {
        &self.summary
    }

    pub fn get_name_map(&self) -> &NameMap {
        &self.name_map
    }

    pub fn get_imports(&self) -> &[FObjectImport] {
        &self.import_map
    }

    pub fn get_exports(&self) -> &[FObjectExport] {
        &self.export_map
    }

    pub fn get_total_header_size(&self) -> i64 {
        self.summary.total_header_size as i64
    }

    pub fn get_export_size(&self) -> i64 {
        self.export_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn names() -> NameMap {
        NameMap::from(vec!["None".to_owned(), "Texture2D".to_owned()])
    }

    #[test]
    fn name_number_is_appended_verbatim() {
        let name_map = names();
        assert_eq!(name_map.get_name(1, 0).unwrap(), "Texture2D");
        assert_eq!(name_map.get_name(1, 3).unwrap(), "Texture2D_3");
        assert_eq!(name_map.get_name(0, -1).unwrap(), "None");
    }

    #[test]
    fn name_index_out_of_range() {
        let name_map = names();
        assert_eq!(name_map.get_name(2, 0).unwrap_err().get_kind(), ParserErrorKind::Format);
        assert_eq!(name_map.get_name(-1, 0).unwrap_err().get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn package_index_resolution() {
        assert_eq!(FPackageIndex::from_raw(0).resolve(), PackageObject::Null);
        assert_eq!(FPackageIndex::from_raw(-1).resolve(), PackageObject::Import(0));
        assert_eq!(FPackageIndex::from_raw(2).resolve(), PackageObject::Export(1));
        assert_eq!(FPackageIndex::from_raw(i32::MIN).resolve(), PackageObject::Import(2147483647));
    }

    #[test]
    fn package_index_binds_import() {
        let imports = vec![FObjectImport {
            class_package: "/Script/CoreUObject".to_owned(),
            class_name: "Class".to_owned(),
            outer_index: FPackageIndex::from_raw(0),
            outer_import: None,
            object_name: "Texture2D".to_owned(),
        }];
        let import = FPackageIndex::from_raw(-1).get_import(&imports).unwrap();
        assert_eq!(import.get_object_name(), "Texture2D");
        assert!(FPackageIndex::from_raw(2).get_import(&imports).is_none());
        assert!(FPackageIndex::from_raw(-2).check(1, 0).is_err());
        assert!(FPackageIndex::from_raw(1).check(1, 1).is_ok());
    }

    #[test]
    fn read_ansi_and_wide_strings() {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(4).unwrap();
        data.extend_from_slice(b"abc\0");
        data.write_i32::<LittleEndian>(-3).unwrap();
        for unit in &[0x68u16, 0x69, 0] {
            data.write_u16::<LittleEndian>(*unit).unwrap();
        }
        data.write_i32::<LittleEndian>(0).unwrap();

        let mut reader = ReaderCursor::new(data);
        assert_eq!(read_string(&mut reader).unwrap(), "abc");
        assert_eq!(read_string(&mut reader).unwrap(), "hi");
        assert_eq!(read_string(&mut reader).unwrap(), "");
    }

    #[test]
    fn oversized_string_fails_before_allocating() {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(i32::MAX).unwrap();
        let mut reader = ReaderCursor::new(data);
        assert_eq!(read_string(&mut reader).unwrap_err().get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn read_at_restores_position_on_error() {
        let mut reader = ReaderCursor::new(vec![1, 0, 0, 0, 2, 0, 0, 0]);
        reader.set_position(4);
        let value: i32 = read_at(&mut reader, 0, |r| i32::new(r)).unwrap();
        assert_eq!(value, 1);
        assert_eq!(reader.position(), 4);

        let failed: ParserResult<i32> = read_at(&mut reader, 6, |r| i32::new(r));
        assert_eq!(failed.unwrap_err().get_kind(), ParserErrorKind::Io);
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn guid_bytes_round_trip() {
        let bytes: Vec<u8> = (0u8..16).collect();
        let mut reader = ReaderCursor::new(bytes.clone());
        let guid = FGuid::new(&mut reader).unwrap();
        assert_eq!(&guid.to_bytes()[..], &bytes[..]);
    }

    #[test]
    fn bad_magic_is_format_error() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(0xDEADBEEF).unwrap();
        data.write_i32::<LittleEndian>(LEGACY_FILE_VERSION).unwrap();
        let err = Package::from_buffer(&data).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn wrong_legacy_version_is_format_error() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(PACKAGE_FILE_TAG).unwrap();
        data.write_i32::<LittleEndian>(-6).unwrap();
        let err = Package::from_buffer(&data).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn custom_versions_in_header_are_unsupported() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(PACKAGE_FILE_TAG).unwrap();
        data.write_i32::<LittleEndian>(LEGACY_FILE_VERSION).unwrap();
        for value in &[864i32, 517, 0] {
            data.write_i32::<LittleEndian>(*value).unwrap();
        }
        data.write_u32::<LittleEndian>(1).unwrap();
        data.extend_from_slice(&[0u8; 20]);
        let err = Package::from_buffer(&data).unwrap_err();
        assert!(err.is_unsupported());
    }
}
