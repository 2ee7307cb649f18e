use std::io::{Cursor, Read};
use byteorder::{LittleEndian, ReadBytesExt};
use image::{ImageDecoder, ImageError, ImageBuffer, Bgra, Rgb, Rgba, Luma, RgbaImage, ColorType, buffer::ConvertBuffer, imageops};
use image::codecs::{dxt, png};
use bitreader::BitReader;
use flate2::read::ZlibDecoder;
use log::debug;
use crate::assets::{Texture2D, FTexturePlatformData, FVirtualTextureBuiltData, EVirtualTextureCodec,
    ParserResult, ParserError, ParserErrorKind};

/// Turns raw GPU pixel data into an RGBA image.
pub trait TextureCodec {
    fn decode(&self, bytes: &[u8], pixel_format: &str, width: u32, height: u32) -> ParserResult<RgbaImage>;
}

/// Decoder backed by the `image` crate, plus an in-crate BC5 decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl TextureCodec for ImageCodec {
    fn decode(&self, bytes: &[u8], pixel_format: &str, width: u32, height: u32) -> ParserResult<RgbaImage> {
        match pixel_format {
            "PF_DXT5" => decode_texture_dxt5(bytes, width, height),
            "PF_DXT1" => decode_texture_dxt1(bytes, width, height),
            "PF_B8G8R8A8" => decode_texture_bgra(bytes, width, height),
            "PF_BC5" => {
                let data = create_rgb_from_bc5(bytes, width, height)?;
                Ok(from_raw::<Rgb<u8>>(data, width, height)?.convert())
            },
            "PF_G8" => Ok(from_raw::<Luma<u8>>(raw_slice(bytes, width as u64 * height as u64)?, width, height)?.convert()),
            _ => Err(ParserError::unsupported(format!("Unsupported pixel format: {}", pixel_format))),
        }
    }
}

impl From<ImageError> for ParserError {
    fn from(error: ImageError) -> ParserError {
        let kind = match error {
            ImageError::Unsupported(_) => ParserErrorKind::Unsupported,
            _ => ParserErrorKind::Format,
        };
        ParserError::new(kind, format!("{}", error))
    }
}

fn raw_slice(bytes: &[u8], length: u64) -> ParserResult<Vec<u8>> {
    if (bytes.len() as u64) < length {
        return Err(ParserError::format(format!("Pixel data has {} bytes, {} needed", bytes.len(), length)));
    }
    Ok(bytes[..length as usize].to_vec())
}

fn from_raw<P>(data: Vec<u8>, width: u32, height: u32) -> ParserResult<ImageBuffer<P, Vec<u8>>>
where P: image::Pixel<Subpixel = u8> + 'static {
    match ImageBuffer::<P, Vec<u8>>::from_raw(width, height, data) {
        Some(buf) => Ok(buf),
        None => Err(ParserError::format(format!("Pixel buffer too small for {}x{}", width, height))),
    }
}

fn decode_texture_bgra(bytes: &[u8], width: u32, height: u32) -> ParserResult<RgbaImage> {
    let data = raw_slice(bytes, width as u64 * height as u64 * 4)?;
    let buf = from_raw::<Bgra<u8>>(data, width, height)?;
    Ok(buf.convert())
}

fn decode_texture_dxt5(bytes: &[u8], width: u32, height: u32) -> ParserResult<RgbaImage> {
    let reader = Cursor::new(bytes);
    let decoder = dxt::DxtDecoder::new(reader, width, height, dxt::DxtVariant::DXT5)?;
    let mut buf = vec![0u8; decoder.total_bytes() as usize];

    decoder.read_image(&mut buf)?;

    from_raw(buf, width, height)
}

fn rgb565(color: u16) -> [u8; 4] {
    let r = ((color >> 11) & 0x1F) as u32;
    let g = ((color >> 5) & 0x3F) as u32;
    let b = (color & 0x1F) as u32;
    [(r * 255 / 31) as u8, (g * 255 / 63) as u8, (b * 255 / 31) as u8, 255]
}

fn blend(a: [u8; 4], b: [u8; 4], wa: u32, wb: u32) -> [u8; 4] {
    let mut out = [255u8; 4];
    for c in 0..3 {
        out[c] = ((a[c] as u32 * wa + b[c] as u32 * wb) / (wa + wb)) as u8;
    }
    out
}

/// DXT1 keeps its 1-bit alpha: in three-colour blocks index 3 is transparent black.
fn decode_dxt1_block(buf_in: &mut Cursor<&[u8]>) -> ParserResult<[[u8; 4]; 16]> {
    let c0 = buf_in.read_u16::<LittleEndian>()?;
    let c1 = buf_in.read_u16::<LittleEndian>()?;
    let indices = buf_in.read_u32::<LittleEndian>()?;

    let p0 = rgb565(c0);
    let p1 = rgb565(c1);
    let palette = if c0 > c1 {
        [p0, p1, blend(p0, p1, 2, 1), blend(p0, p1, 1, 2)]
    } else {
        [p0, p1, blend(p0, p1, 1, 1), [0, 0, 0, 0]]
    };

    let mut pixels = [[0u8; 4]; 16];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = palette[((indices >> (2 * i)) & 3) as usize];
    }
    Ok(pixels)
}

fn decode_texture_dxt1(bytes: &[u8], width: u32, height: u32) -> ParserResult<RgbaImage> {
    let blocks_x = width / 4 + u32::from(width % 4 != 0);
    let blocks_y = height / 4 + u32::from(height % 4 != 0);
    let needed = blocks_x as u64 * blocks_y as u64 * 8;
    if (bytes.len() as u64) < needed {
        return Err(ParserError::format(format!("DXT1 data has {} bytes, {} needed", bytes.len(), needed)));
    }

    let mut image = RgbaImage::new(width, height);
    let mut cursor = Cursor::new(bytes);
    for y_block in 0..blocks_y {
        for x_block in 0..blocks_x {
            let pixels = decode_dxt1_block(&mut cursor)?;
            for (i, pixel) in pixels.iter().enumerate() {
                let x = x_block * 4 + (i as u32) % 4;
                let y = y_block * 4 + (i as u32) / 4;
                if x < width && y < height {
                    image.put_pixel(x, y, Rgba(*pixel));
                }
            }
        }
    }

    Ok(image)
}

/// Encodes an image as PNG.
pub fn encode_png(image: &RgbaImage) -> ParserResult<Vec<u8>> {
    let mut png_data: Vec<u8> = Vec::new();

    let encoder = png::PngEncoder::new(&mut png_data);
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;

    Ok(png_data)
}

/// Morton index of a virtual texture tile: row bits on even positions, column bits on odd ones.
pub fn z_order_index(row: u32, column: u32) -> u64 {
    let mut index = 0u64;
    for bit in 0..32 {
        index |= ((row as u64 >> bit) & 1) << (2 * bit);
        index |= ((column as u64 >> bit) & 1) << (2 * bit + 1);
    }
    index
}

/// Decodes one platform data block into an image, using the largest mip or the virtual texture tiles.
pub fn decode_texture(platform: &FTexturePlatformData, ubulk: Option<&[u8]>, codec: &dyn TextureCodec) -> ParserResult<RgbaImage> {
    if let Some(virtual_data) = platform.get_virtual_data() {
        return decode_virtual_texture(platform, virtual_data, ubulk, codec);
    }

    let mip = match platform.get_largest_mip() {
        Some(mip) => mip,
        None => return Err(ParserError::format(format!("Texture {} has no mips", platform.get_pixel_format()))),
    };
    let bytes = mip.get_bulk_data().get_data(ubulk)?;
    debug!("Decoding {} mip {}x{} from {} bytes", platform.get_pixel_format(), mip.get_width(), mip.get_height(), bytes.len());

    codec.decode(bytes, platform.get_pixel_format(), mip.get_width(), mip.get_height())
}

/// Decodes every platform data block of a texture.
pub fn decode_textures(texture: &Texture2D, ubulk: Option<&[u8]>, codec: &dyn TextureCodec) -> ParserResult<Vec<RgbaImage>> {
    texture.get_textures().iter().map(|platform| {
        match decode_texture(platform, ubulk, codec) {
            Ok(image) => Ok(image),
            Err(e) => Err(ParserError::add(e, format!("Texture: {}", platform.get_pixel_format()))),
        }
    }).collect()
}

fn inflate(data: &[u8]) -> ParserResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buf = Vec::new();
    match decoder.read_to_end(&mut buf) {
        Ok(_) => Ok(buf),
        Err(e) => Err(ParserError::format(format!("Could not inflate tile: {}", e))),
    }
}

fn decode_virtual_texture(platform: &FTexturePlatformData, virtual_data: &FVirtualTextureBuiltData,
        ubulk: Option<&[u8]>, codec: &dyn TextureCodec) -> ParserResult<RgbaImage> {
    if virtual_data.chunks.len() != 1 || virtual_data.layer_count != 1 {
        return Err(ParserError::unsupported(format!("Virtual texture with {} chunks and {} layers",
            virtual_data.chunks.len(), virtual_data.layer_count)));
    }
    let chunk = &virtual_data.chunks[0];
    let (codec_type, layer_format) = match (chunk.codec_types.first(), virtual_data.layer_pixel_formats.first()) {
        (Some(codec_type), Some(layer_format)) => (*codec_type, layer_format),
        _ => return Err(ParserError::format("Virtual texture layer is missing its codec or format".to_owned())),
    };

    let tile_size = virtual_data.tile_size;
    let border = virtual_data.tile_border_size;
    if tile_size == 0 || platform.size_x < 0 || platform.size_y < 0 {
        return Err(ParserError::format(format!("Invalid virtual texture: {}x{} with tile size {}",
            platform.size_x, platform.size_y, tile_size)));
    }
    let width = platform.size_x as u32;
    let height = platform.size_y as u32;
    let padded = match border.checked_mul(2).and_then(|v| v.checked_add(tile_size)) {
        Some(padded) => padded,
        None => return Err(ParserError::format(format!("Tile size {} with border {} overflows", tile_size, border))),
    };

    let payload = chunk.bulk_data.get_data(ubulk)?;
    let chunk_end = (chunk.size_in_bytes as usize).min(payload.len());
    let offsets = &virtual_data.tile_offset_in_chunk;

    let mut canvas = RgbaImage::new(width, height);
    for row in 0..(width / tile_size) {
        for column in 0..(height / tile_size) {
            let index = z_order_index(row, column) as usize;
            let start = match offsets.get(index) {
                Some(offset) => *offset as usize,
                None => return Err(ParserError::format(format!("Tile {} has no offset ({} offsets)", index, offsets.len()))),
            };
            let end = offsets.get(index + 1).map(|v| *v as usize).unwrap_or(chunk_end);
            if start == end {
                continue;
            }
            if start > end || end > chunk_end {
                return Err(ParserError::format(format!("Tile {} range {}..{} outside chunk of {} bytes", index, start, end, chunk_end)));
            }

            let data = &payload[start..end];
            let tile = match codec_type {
                EVirtualTextureCodec::RawGPU => codec.decode(data, layer_format, padded, padded)?,
                EVirtualTextureCodec::ZippedGPU => codec.decode(&inflate(data)?, layer_format, padded, padded)?,
                _ => return Err(ParserError::unsupported(format!("Virtual texture codec {:?}", codec_type))),
            };
            let tile = imageops::crop_imm(&tile, border, border, tile_size, tile_size).to_image();
            imageops::replace(&mut canvas, &tile, row * tile_size, column * tile_size);
        }
    }

    Ok(canvas)
}

fn get_pixel_loc(width: u32, x: usize, y: usize, off: usize) -> usize {
    (y * (width as usize) + x) * 3 + off
}

fn create_rgb_from_bc5(bytes: &[u8], width: u32, height: u32) -> ParserResult<Vec<u8>> {
    let mut res = vec![0u8;(width as usize) * (height as usize) * 3];
    let mut cursor = Cursor::new(bytes);
    for y_block in 0..((height as usize) / 4) {
        for x_block in 0..((width as usize) / 4) {
            let r_bytes = decode_bc3_block(&mut cursor)?;
            let g_bytes = decode_bc3_block(&mut cursor)?;

            for i in 0..16 {
                let x = x_block * 4 + i % 4;
                let y = y_block * 4 + i / 4;
                res[get_pixel_loc(width, x, y, 0)] = r_bytes[i];
                res[get_pixel_loc(width, x, y, 1)] = g_bytes[i];
                res[get_pixel_loc(width, x, y, 2)] = get_z_normal(r_bytes[i], g_bytes[i]);
            }
        }
    }

    Ok(res)
}

fn get_z_normal(x: u8, y: u8) -> u8 {
    let xf = ((x as f32) / 127.5) - 1.0;
    let yf = ((y as f32) / 127.5) - 1.0;
    let zval = (1.0 - xf*xf - yf*yf).max(0.0).sqrt().min(1.0);
    ((zval * 127.0) + 128.0) as u8
}

fn decode_bc3_block(buf_in: &mut Cursor<&[u8]>) -> ParserResult<[u8;16]> {
    let ref0 = buf_in.read_u8()? as f32;
    let ref1 = buf_in.read_u8()? as f32;

    let mut ref_sl = [0f32; 8];
    ref_sl[0] = ref0;
    ref_sl[1] = ref1;

    if ref0 > ref1 {
        for i in 0..6 {
            let step = (i + 1) as f32;
            ref_sl[i + 2] = ((7.0 - step) * ref0 + step * ref1) / 7.0;
        }
    } else {
        for i in 0..4 {
            let step = (i + 1) as f32;
            ref_sl[i + 2] = ((5.0 - step) * ref0 + step * ref1) / 5.0;
        }
        ref_sl[6] = 0.0;
        ref_sl[7] = 255.0;
    }

    let mut index_block1 = [0u8;3];
    buf_in.read_exact(&mut index_block1)?;
    let index_block1 = get_bc3_indices(&index_block1)?;

    let mut index_block2 = [0u8;3];
    buf_in.read_exact(&mut index_block2)?;
    let index_block2 = get_bc3_indices(&index_block2)?;

    let mut bytes = [0u8;16];
    for i in 0..8 {
        bytes[7 - i] = ref_sl[index_block1[i] as usize] as u8;
        bytes[15 - i] = ref_sl[index_block2[i] as usize] as u8;
    }

    Ok(bytes)
}

fn get_bc3_indices(buf_block: &[u8;3]) -> ParserResult<[u8;8]> {
    let buf_test = [buf_block[2], buf_block[1], buf_block[0]];
    let mut reader = BitReader::new(&buf_test);
    let mut indices = [0u8; 8];

    for index in indices.iter_mut() {
        *index = match reader.read_u8(3) {
            Ok(value) => value,
            Err(e) => return Err(ParserError::format(format!("Invalid BC5 index block: {:?}", e))),
        };
    }

    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use byteorder::WriteBytesExt;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use crate::assets::{Newable, ReaderCursor};

    fn write_string(data: &mut Vec<u8>, value: &str) {
        data.write_i32::<LittleEndian>(value.len() as i32 + 1).unwrap();
        data.extend_from_slice(value.as_bytes());
        data.push(0);
    }

    fn write_inline_bulk(data: &mut Vec<u8>, payload: &[u8]) {
        data.write_u32::<LittleEndian>(crate::assets::BulkDataFlags::FORCE_INLINE_PAYLOAD).unwrap();
        data.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        data.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        data.write_u64::<LittleEndian>(0).unwrap();
        data.extend_from_slice(payload);
    }

    fn simple_platform(pixel_format: &str, width: u32, height: u32, payload: &[u8]) -> FTexturePlatformData {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(width as i32).unwrap();
        data.write_i32::<LittleEndian>(height as i32).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        write_string(&mut data, pixel_format);
        data.write_i32::<LittleEndian>(0).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        write_inline_bulk(&mut data, payload);
        for value in &[width, height, 1] {
            data.write_u32::<LittleEndian>(*value).unwrap();
        }
        data.write_i32::<LittleEndian>(0).unwrap();
        FTexturePlatformData::new(&mut ReaderCursor::new(data)).unwrap()
    }

    /// A padded 4x4 G8 tile whose 2x2 interior is `value`.
    fn bordered_tile(value: u8) -> Vec<u8> {
        let mut tile = vec![0u8; 16];
        for y in 1..3 {
            for x in 1..3 {
                tile[y * 4 + x] = value;
            }
        }
        tile
    }

    fn zip(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// A 4x4 G8 virtual texture of 2x2 tiles with a 1 pixel border.
    /// `tiles` are stored in Morton order; missing trailing tiles are empty.
    fn virtual_platform(codec: u8, tiles: &[Vec<u8>], chunk_count: u32) -> FTexturePlatformData {
        let mut payload = Vec::new();
        let mut offsets = Vec::new();
        for tile in tiles {
            offsets.push(payload.len() as u32);
            payload.extend_from_slice(tile);
        }
        offsets.push(payload.len() as u32);

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(4).unwrap();
        data.write_i32::<LittleEndian>(4).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        write_string(&mut data, "PF_G8");
        data.write_i32::<LittleEndian>(0).unwrap();
        data.write_u32::<LittleEndian>(0).unwrap();
        data.write_i32::<LittleEndian>(1).unwrap();
        for value in &[1u32, 1, 2, 2, 2, 1, 1, 4, 4] {
            data.write_u32::<LittleEndian>(*value).unwrap();
        }
        for table in &[vec![0u32], vec![0u32], offsets] {
            data.write_u32::<LittleEndian>(table.len() as u32).unwrap();
            for value in table {
                data.write_u32::<LittleEndian>(*value).unwrap();
            }
        }
        write_string(&mut data, "PF_G8");
        data.write_u32::<LittleEndian>(chunk_count).unwrap();
        for _i in 0..chunk_count {
            data.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            data.write_u32::<LittleEndian>(0).unwrap();
            data.push(codec);
            data.write_u16::<LittleEndian>(0).unwrap();
            write_inline_bulk(&mut data, &payload);
        }

        FTexturePlatformData::new(&mut ReaderCursor::new(data)).unwrap()
    }

    /// Tile `i` in Morton order is filled with `(i + 1) * 10`; the last tile is empty.
    fn zipped_virtual_platform() -> FTexturePlatformData {
        let tiles: Vec<Vec<u8>> = (0..3u8).map(|i| zip(&bordered_tile((i + 1) * 10))).collect();
        virtual_platform(5, &tiles, 1)
    }

    #[test]
    fn morton_order() {
        let cells = [(0, 0), (1, 0), (0, 1), (1, 1), (2, 0), (3, 0), (2, 1), (3, 1)];
        for (expected, (row, column)) in cells.iter().enumerate() {
            assert_eq!(z_order_index(*row, *column), expected as u64);
        }
        assert_eq!(z_order_index(0, 2), 8);
    }

    #[test]
    fn bgra_channels_are_swapped() {
        let platform = simple_platform("PF_B8G8R8A8", 2, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let image = decode_texture(&platform, None, &ImageCodec).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1, 4]);
        assert_eq!(image.get_pixel(1, 0).0, [7, 6, 5, 8]);
    }

    #[test]
    fn g8_becomes_grey() {
        let image = ImageCodec.decode(&[0, 128, 255, 7], "PF_G8", 2, 2).unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [128, 128, 128, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [7, 7, 7, 255]);
    }

    #[test]
    fn short_pixel_data_is_format_error() {
        let err = ImageCodec.decode(&[0, 1, 2], "PF_B8G8R8A8", 1, 1).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn unknown_pixel_format_is_unsupported() {
        let err = ImageCodec.decode(&[0; 16], "PF_ASTC_4x4", 4, 4).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn dxt1_solid_block() {
        let image = ImageCodec.decode(&[0xFF, 0xFF, 0, 0, 0, 0, 0, 0], "PF_DXT1", 4, 4).unwrap();
        assert_eq!(image.get_pixel(3, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn bc5_reconstructs_blue() {
        let mut block = vec![200u8, 100, 0, 0, 0, 0, 0, 0];
        block.extend_from_slice(&[50, 10, 0, 0, 0, 0, 0, 0]);
        let image = ImageCodec.decode(&block, "PF_BC5", 4, 4).unwrap();
        assert_eq!(image.get_pixel(2, 1).0, [200, 50, get_z_normal(200, 50), 255]);
    }

    #[test]
    fn virtual_texture_tiles_follow_morton_order() {
        let platform = zipped_virtual_platform();
        let image = decode_texture(&platform, None, &ImageCodec).unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [10, 10, 10, 255]);
        assert_eq!(image.get_pixel(2, 0).0, [20, 20, 20, 255]);
        assert_eq!(image.get_pixel(0, 3).0, [30, 30, 30, 255]);
        assert_eq!(image.get_pixel(3, 3).0, [0, 0, 0, 0]);
    }

    #[test]
    fn dxt1_keeps_punch_through_alpha() {
        // color0 <= color1 selects the three-colour mode; index 3 is transparent.
        let image = ImageCodec.decode(&[0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], "PF_DXT1", 4, 4).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(3, 3).0, [0, 0, 0, 0]);

        let image = ImageCodec.decode(&[0, 0, 0xFF, 0xFF, 0x01, 0, 0, 0], "PF_DXT1", 4, 4).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn short_dxt1_data_is_format_error() {
        let err = ImageCodec.decode(&[0; 8], "PF_DXT1", 8, 4).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn raw_virtual_tiles_are_placed() {
        let tiles = vec![bordered_tile(10), bordered_tile(20), bordered_tile(30), bordered_tile(40)];
        let platform = virtual_platform(4, &tiles, 1);
        let image = decode_texture(&platform, None, &ImageCodec).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(image.get_pixel(2, 1).0, [20, 20, 20, 255]);
        assert_eq!(image.get_pixel(1, 2).0, [30, 30, 30, 255]);
        assert_eq!(image.get_pixel(3, 3).0, [40, 40, 40, 255]);
    }

    #[test]
    fn tile_range_outside_chunk_is_format_error() {
        let mut platform = virtual_platform(4, &[bordered_tile(10)], 1);
        if let Some(virtual_data) = platform.virtual_data.as_mut() {
            virtual_data.tile_offset_in_chunk[1] = 1000;
        }
        let err = decode_texture(&platform, None, &ImageCodec).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn oversized_tile_border_is_format_error() {
        let mut platform = virtual_platform(4, &[bordered_tile(10)], 1);
        if let Some(virtual_data) = platform.virtual_data.as_mut() {
            virtual_data.tile_border_size = 0x8000_0000;
        }
        let err = decode_texture(&platform, None, &ImageCodec).unwrap_err();
        assert_eq!(err.get_kind(), ParserErrorKind::Format);
    }

    #[test]
    fn several_chunks_or_layers_are_unsupported() {
        let platform = virtual_platform(4, &[bordered_tile(10)], 2);
        assert!(decode_texture(&platform, None, &ImageCodec).unwrap_err().is_unsupported());

        let mut platform = virtual_platform(4, &[bordered_tile(10)], 1);
        if let Some(virtual_data) = platform.virtual_data.as_mut() {
            virtual_data.layer_count = 2;
        }
        assert!(decode_texture(&platform, None, &ImageCodec).unwrap_err().is_unsupported());
    }

    #[test]
    fn png_output_has_signature() {
        let image = RgbaImage::new(2, 2);
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
