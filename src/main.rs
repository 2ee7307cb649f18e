use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn, error, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use walkdir::WalkDir;
use cooked_asset_parse::assets::{ParserResult, ParserError, Package, PackageExport};
use cooked_asset_parse::texture::encode_png;
use cooked_asset_parse::{read_asset, read_package, read_save, read_texture_images};

const USAGE: &str = "Usage: cooked-asset-parse [-v] <command> <path>

Commands:
    package <asset>    dump header, tables and exports of <asset>.uasset/.uexp as JSON
    texture <asset>    write every texture of <asset> as PNG next to it
    save <file.sav>    dump a save file as JSON
    batch <dir>        write every texture found under <dir> as PNG";

#[derive(Serialize)]
struct AssetDump<'a> {
    package: &'a Package,
    exports: Option<&'a [PackageExport]>,
}

fn read_file(path: &Path) -> ParserResult<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) => Err(ParserError::add(ParserError::from(e), format!("File: {}", path.display()))),
    }
}

/// Strips a `.uasset`, `.uexp` or `.ubulk` extension so any of the three files can name the asset.
fn asset_base(path: &str) -> PathBuf {
    let path = Path::new(path);
    match path.extension().and_then(|v| v.to_str()) {
        Some("uasset") | Some("uexp") | Some("ubulk") => path.with_extension(""),
        _ => path.to_owned(),
    }
}

fn print_json<T: Serialize>(value: &T) -> ParserResult<()> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        },
        Err(e) => Err(ParserError::format(format!("JSON serialization failed: {}", e))),
    }
}

fn dump_package(path: &str) -> ParserResult<()> {
    let base = asset_base(path);
    let uasset = read_file(&base.with_extension("uasset"))?;
    let uexp_path = base.with_extension("uexp");
    if !uexp_path.exists() {
        let package = read_package(&uasset)?;
        return print_json(&AssetDump { package: &package, exports: None });
    }

    let uexp = read_file(&uexp_path)?;
    let (package, exports) = read_asset(&uasset, &uexp)?;
    print_json(&AssetDump { package: &package, exports: Some(exports.as_slice()) })
}

fn extract_textures(base: &Path, output_dir: &Path) -> ParserResult<usize> {
    let uasset = read_file(&base.with_extension("uasset"))?;
    let uexp = read_file(&base.with_extension("uexp"))?;
    let ubulk_path = base.with_extension("ubulk");
    let ubulk = match ubulk_path.exists() {
        true => Some(read_file(&ubulk_path)?),
        false => None,
    };

    let images = read_texture_images(&uasset, &uexp, ubulk.as_deref())?;
    for (name, image) in &images {
        let png = encode_png(image)?;
        let target = output_dir.join(format!("{}.png", name));
        if let Err(e) = fs::write(&target, png) {
            return Err(ParserError::add(ParserError::from(e), format!("File: {}", target.display())));
        }
        info!("Wrote {} ({}x{})", target.display(), image.width(), image.height());
    }
    Ok(images.len())
}

fn dump_texture(path: &str) -> ParserResult<()> {
    let base = asset_base(path);
    let output_dir = base.parent().map(|v| v.to_owned()).unwrap_or_default();
    if extract_textures(&base, &output_dir)? == 0 {
        info!("{} has no texture exports", base.display());
    }
    Ok(())
}

fn dump_save(path: &str) -> ParserResult<()> {
    let buf = read_file(Path::new(path))?;
    let save = read_save(&buf, true)?;
    print_json(&save)
}

fn batch(dir: &str) -> ParserResult<()> {
    let mut assets: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            },
        };
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|v| v.to_str()) == Some("uasset") {
            assets.push(path.to_owned());
        }
    }
    if assets.is_empty() {
        return Err(ParserError::format(format!("No .uasset files under {}", dir)));
    }
    assets.sort();

    let mut written = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for asset in &assets {
        let base = asset.with_extension("");
        let output_dir = base.parent().map(|v| v.to_owned()).unwrap_or_default();
        match extract_textures(&base, &output_dir) {
            Ok(0) => {
                debug!("{}: no textures", asset.display());
                skipped += 1;
            },
            Ok(count) => written += count,
            Err(e) => {
                error!("{}: {}", asset.display(), e);
                failed += 1;
            },
        }
    }

    info!("Processed {} assets: {} images written, {} without textures, {} failed",
        assets.len(), written, skipped, failed);
    Ok(())
}

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.first().map(|v| v == "-v").unwrap_or(false);
    if verbose {
        args.remove(0);
    }

    let level = match verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not initialise logger: {}", e);
    }

    if args.len() != 2 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let result = match args[0].as_str() {
        "package" => dump_package(&args[1]),
        "texture" => dump_texture(&args[1]),
        "save" => dump_save(&args[1]),
        "batch" => batch(&args[1]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        },
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
