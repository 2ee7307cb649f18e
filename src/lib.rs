use image::RgbaImage;
use crate::assets::{ParserResult, Package, PackageExport, FSaveGame};
use crate::texture::{ImageCodec, decode_textures};

pub mod assets;
pub mod texture;

/// Parses only the `.uasset` header and its tables.
pub fn read_package(uasset: &[u8]) -> ParserResult<Package> {
    Package::from_buffer(uasset)
}

/// Parses the header and decodes every export body from the `.uexp` buffer.
pub fn read_asset(uasset: &[u8], uexp: &[u8]) -> ParserResult<(Package, Vec<PackageExport>)> {
    let package = Package::from_buffer(uasset)?;
    let exports = package.read_exports(uexp)?;
    Ok((package, exports))
}

/// Decodes every texture export of an asset.
/// Images are named after their export, with `_<n>` added when an export has several platform blocks.
/// Assets without texture exports yield an empty list.
pub fn read_texture_images(uasset: &[u8], uexp: &[u8], ubulk: Option<&[u8]>) -> ParserResult<Vec<(String, RgbaImage)>> {
    let (package, exports) = read_asset(uasset, uexp)?;
    let mut images = Vec::new();
    for (export, body) in package.get_exports().iter().zip(exports.iter()) {
        let texture = match body {
            PackageExport::Texture2D(texture) => texture,
            PackageExport::Object(_) => continue,
        };
        let decoded = decode_textures(texture, ubulk, &ImageCodec)?;
        let count = decoded.len();
        for (i, image) in decoded.into_iter().enumerate() {
            let name = match count {
                1 => export.get_object_name().to_owned(),
                _ => format!("{}_{}", export.get_object_name(), i),
            };
            images.push((name, image));
        }
    }
    Ok(images)
}

/// Parses a save file. See `FSaveGame::from_buffer` for `expect_identifier`.
pub fn read_save(buf: &[u8], expect_identifier: bool) -> ParserResult<FSaveGame> {
    FSaveGame::from_buffer(buf, expect_identifier)
}
