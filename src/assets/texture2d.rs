use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use serde::Serialize;
use super::*;

const BITMASK_CUBEMAP: u32 = 1 << 31;
const BITMASK_HAS_OPT_DATA: u32 = 1 << 30;
const BITMASK_NUM_SLICES: u32 = BITMASK_HAS_OPT_DATA - 1;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FStripDataFlags {
    global_strip_flags: u8,
    class_strip_flags: u8,
}

impl FStripDataFlags {
    pub fn is_editor_data_stripped(&self) -> bool {
        self.global_strip_flags & 1 != 0
    }

    pub fn is_data_stripped_for_server(&self) -> bool {
        self.global_strip_flags & 2 != 0
    }

    pub fn is_class_data_stripped(&self, flag: u8) -> bool {
        self.class_strip_flags & flag != 0
    }
}

impl Newable for FStripDataFlags {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            global_strip_flags: reader.read_u8()?,
            class_strip_flags: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FTexture2DMipMap {
    cooked: bool,
    data: FByteBulkData,
    size_x: u32,
    size_y: u32,
    size_z: u32,
}

impl FTexture2DMipMap {
    pub fn get_width(&self) -> u32 {
        self.size_x
    }

    pub fn get_height(&self) -> u32 {
        self.size_y
    }

    pub fn get_depth(&self) -> u32 {
        self.size_z
    }

    pub fn get_bulk_data(&self) -> &FByteBulkData {
        &self.data
    }
}

impl Newable for FTexture2DMipMap {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        Ok(Self {
            cooked: reader.read_u32::<LittleEndian>()? != 0,
            data: FByteBulkData::new(reader)?,
            size_x: reader.read_u32::<LittleEndian>()?,
            size_y: reader.read_u32::<LittleEndian>()?,
            size_z: reader.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EVirtualTextureCodec {
    /// Always black, 0,0,0,0
    Black,
    /// Always opaque black, 0,0,0,255
    OpaqueBlack,
    White,
    /// Flat normal map, 128,125,255,255
    Flat,
    /// GPU-ready data, stored as is
    RawGPU,
    /// GPU-ready data, zlib compressed
    ZippedGPU,
    Crunch,
}

impl EVirtualTextureCodec {
    fn from_u8(value: u8) -> ParserResult<Self> {
        Ok(match value {
            0 => EVirtualTextureCodec::Black,
            1 => EVirtualTextureCodec::OpaqueBlack,
            2 => EVirtualTextureCodec::White,
            3 => EVirtualTextureCodec::Flat,
            4 => EVirtualTextureCodec::RawGPU,
            5 => EVirtualTextureCodec::ZippedGPU,
            6 => EVirtualTextureCodec::Crunch,
            _ => return Err(ParserError::format(format!("Unknown virtual texture codec: {}", value))),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FVirtualTextureDataChunk {
    pub(crate) size_in_bytes: u32,
    pub(crate) codec_payload_size: u32,
    pub(crate) codec_types: Vec<EVirtualTextureCodec>,
    pub(crate) codec_payload_offsets: Vec<u16>,
    pub(crate) bulk_data: FByteBulkData,
}

impl FVirtualTextureDataChunk {
    fn new(reader: &mut ReaderCursor, layer_count: u32) -> ParserResult<Self> {
        let size_in_bytes = reader.read_u32::<LittleEndian>()?;
        let codec_payload_size = reader.read_u32::<LittleEndian>()?;
        let mut codec_types = Vec::new();
        let mut codec_payload_offsets = Vec::new();
        for _i in 0..layer_count {
            codec_types.push(EVirtualTextureCodec::from_u8(reader.read_u8()?)?);
            codec_payload_offsets.push(reader.read_u16::<LittleEndian>()?);
        }

        Ok(Self {
            size_in_bytes,
            codec_payload_size,
            codec_types,
            codec_payload_offsets,
            bulk_data: FByteBulkData::new(reader)?,
        })
    }

    pub fn get_size_in_bytes(&self) -> u32 {
        self.size_in_bytes
    }

    pub fn get_codec_types(&self) -> &[EVirtualTextureCodec] {
        &self.codec_types
    }

    pub fn get_bulk_data(&self) -> &FByteBulkData {
        &self.bulk_data
    }
}

#[derive(Debug, Serialize)]
pub struct FVirtualTextureBuiltData {
    pub(crate) cooked: bool,
    pub(crate) layer_count: u32,
    pub(crate) width_in_blocks: u32,
    pub(crate) height_in_blocks: u32,
    pub(crate) tile_size: u32,
    pub(crate) tile_border_size: u32,
    pub(crate) mip_count: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) tile_index_per_chunk: Vec<u32>,
    pub(crate) tile_index_per_mip: Vec<u32>,
    pub(crate) tile_offset_in_chunk: Vec<u32>,
    pub(crate) layer_pixel_formats: Vec<String>,
    pub(crate) chunks: Vec<FVirtualTextureDataChunk>,
}

impl FVirtualTextureBuiltData {
    fn new(reader: &mut ReaderCursor, first_mip: i32) -> ParserResult<Self> {
        let cooked = reader.read_i32::<LittleEndian>()? != 0;
        let layer_count = reader.read_u32::<LittleEndian>()?;
        let width_in_blocks = reader.read_u32::<LittleEndian>()?;
        let height_in_blocks = reader.read_u32::<LittleEndian>()?;
        let tile_size = reader.read_u32::<LittleEndian>()?;
        let tile_border_size = reader.read_u32::<LittleEndian>()?;
        if first_mip > 0 {
            return Err(ParserError::unsupported(format!("Virtual texture with stripped mips (first mip {})", first_mip)));
        }

        let mip_count = reader.read_u32::<LittleEndian>()?;
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let tile_index_per_chunk = read_tarray(reader)?;
        let tile_index_per_mip = read_tarray(reader)?;
        let tile_offset_in_chunk = read_tarray(reader)?;

        let mut layer_pixel_formats = Vec::new();
        for _i in 0..layer_count {
            layer_pixel_formats.push(read_string(reader)?);
        }

        let chunk_count = reader.read_u32::<LittleEndian>()?;
        let mut chunks = Vec::new();
        for _i in 0..chunk_count {
            chunks.push(FVirtualTextureDataChunk::new(reader, layer_count)?);
        }

        Ok(Self {
            cooked,
            layer_count,
            width_in_blocks,
            height_in_blocks,
            tile_size,
            tile_border_size,
            mip_count,
            width,
            height,
            tile_index_per_chunk,
            tile_index_per_mip,
            tile_offset_in_chunk,
            layer_pixel_formats,
            chunks,
        })
    }

    pub fn get_tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn get_tile_border_size(&self) -> u32 {
        self.tile_border_size
    }

    pub fn get_tile_offsets(&self) -> &[u32] {
        &self.tile_offset_in_chunk
    }

    pub fn get_layer_pixel_formats(&self) -> &[String] {
        &self.layer_pixel_formats
    }

    pub fn get_chunks(&self) -> &[FVirtualTextureDataChunk] {
        &self.chunks
    }
}

/// Cooked pixel data for one pixel format.
#[derive(Debug, Serialize)]
pub struct FTexturePlatformData {
    pub(crate) size_x: i32,
    pub(crate) size_y: i32,
    pub(crate) slice_count: u32,
    pub(crate) cubemap: bool,
    pub(crate) pixel_format: String,
    pub(crate) first_mip: i32,
    pub(crate) mips: Vec<FTexture2DMipMap>,
    pub(crate) is_virtual: bool,
    pub(crate) virtual_data: Option<FVirtualTextureBuiltData>,
}

impl FTexturePlatformData {
    pub fn get_width(&self) -> i32 {
        self.size_x
    }

    pub fn get_height(&self) -> i32 {
        self.size_y
    }

    pub fn get_slice_count(&self) -> u32 {
        self.slice_count
    }

    pub fn is_cubemap(&self) -> bool {
        self.cubemap
    }

    pub fn get_pixel_format(&self) -> &str {
        &self.pixel_format
    }

    pub fn get_first_mip(&self) -> i32 {
        self.first_mip
    }

    pub fn get_mips(&self) -> &[FTexture2DMipMap] {
        &self.mips
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn get_virtual_data(&self) -> Option<&FVirtualTextureBuiltData> {
        self.virtual_data.as_ref()
    }

    /// The mip with the largest side. The earliest one wins a tie.
    pub fn get_largest_mip(&self) -> Option<&FTexture2DMipMap> {
        let mut largest: Option<&FTexture2DMipMap> = None;
        for mip in &self.mips {
            let size = mip.size_x.max(mip.size_y);
            match largest {
                Some(current) if current.size_x.max(current.size_y) >= size => {},
                _ => largest = Some(mip),
            }
        }
        largest
    }
}

impl Newable for FTexturePlatformData {
    fn new(reader: &mut ReaderCursor) -> ParserResult<Self> {
        let size_x = reader.read_i32::<LittleEndian>()?;
        let size_y = reader.read_i32::<LittleEndian>()?;
        let packed_data = reader.read_u32::<LittleEndian>()?;
        let pixel_format = read_string(reader)?;
        if packed_data & BITMASK_HAS_OPT_DATA != 0 {
            read_bytes(reader, 8)?;
        }
        let first_mip = reader.read_i32::<LittleEndian>()?;
        let mips = read_tarray(reader)?;
        let is_virtual = reader.read_i32::<LittleEndian>()? != 0;
        let virtual_data = match is_virtual {
            true => Some(FVirtualTextureBuiltData::new(reader, first_mip)?),
            false => None,
        };

        Ok(Self {
            size_x,
            size_y,
            slice_count: packed_data & BITMASK_NUM_SLICES,
            cubemap: packed_data & BITMASK_CUBEMAP != 0,
            pixel_format,
            first_mip,
            mips,
            is_virtual,
            virtual_data,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Texture2D {
    base_object: UObject,
    strip_flags: [FStripDataFlags; 2],
    cooked: u32,
    textures: Vec<FTexturePlatformData>,
}

impl Texture2D {
    pub fn new(reader: &mut ReaderCursor, name_map: &NameMap) -> ParserResult<Self> {
        let object = UObject::new(reader, name_map, "Texture2D", true)?;
        let strip_flags = [FStripDataFlags::new(reader)?, FStripDataFlags::new(reader)?];

        let mut textures: Vec<FTexturePlatformData> = Vec::new();
        let cooked = reader.read_u32::<LittleEndian>()?;
        if cooked == 1 {
            let mut pixel_format = read_fname(reader, name_map)?;
            while pixel_format != "None" {
                let _skip_offset = reader.read_i64::<LittleEndian>()?;
                let texture = match FTexturePlatformData::new(reader) {
                    Ok(data) => data,
                    Err(e) => return Err(ParserError::add(e, format!("Platform data: {}", pixel_format))),
                };
                trace!("Read {} texture {}x{} with {} mips", pixel_format, texture.size_x, texture.size_y, texture.mips.len());
                textures.push(texture);
                pixel_format = read_fname(reader, name_map)?;
            }
        }

        Ok(Self {
            base_object: object,
            strip_flags,
            cooked,
            textures,
        })
    }

    pub fn get_base_object(&self) -> &UObject {
        &self.base_object
    }

    pub fn get_strip_flags(&self) -> &[FStripDataFlags; 2] {
        &self.strip_flags
    }

    pub fn is_cooked(&self) -> bool {
        self.cooked == 1
    }

    pub fn get_textures(&self) -> &[FTexturePlatformData] {
        &self.textures
    }
}
