//! Job exports
//!
//! - `results.jsonl`: one page record per line, in crawl order
//! - `results.zip`: manifest, log, JSONL export, page files and assets

use crate::models::PageRecord;
use crate::storage::fs::{ASSETS_DIR, EXPORTS_DIR, LOG_FILE, MANIFEST_FILE, PAGES_DIR};
use crate::storage::traits::StorageResult;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const JSONL_FILE: &str = "results.jsonl";
pub(crate) const ARCHIVE_FILE: &str = "results.zip";

/// Writes `exports/results.jsonl` for the job in `dir`
pub(crate) fn write_jsonl(dir: &Path, pages: &[PageRecord]) -> StorageResult<PathBuf> {
    let exports = dir.join(EXPORTS_DIR);
    fs::create_dir_all(&exports)?;
    let path = exports.join(JSONL_FILE);

    let mut out = BufWriter::new(File::create(&path)?);
    for page in pages {
        serde_json::to_writer(&mut out, page)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(path)
}

/// Writes `exports/results.zip` for the job in `dir`
///
/// Expects the JSONL export to exist already.
pub(crate) fn write_archive(dir: &Path) -> StorageResult<PathBuf> {
    let exports = dir.join(EXPORTS_DIR);
    fs::create_dir_all(&exports)?;
    let path = exports.join(ARCHIVE_FILE);

    let mut zip = ZipWriter::new(File::create(&path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in [MANIFEST_FILE, LOG_FILE] {
        add_file(&mut zip, &dir.join(name), name, options)?;
    }
    add_file(&mut zip, &exports.join(JSONL_FILE), JSONL_FILE, options)?;
    add_dir(&mut zip, &dir.join(PAGES_DIR), PAGES_DIR, options, |name| name.ends_with(".json"))?;
    add_dir(&mut zip, &dir.join(ASSETS_DIR), ASSETS_DIR, options, |name| !name.ends_with(".tmp"))?;

    zip.finish()?;
    Ok(path)
}

fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    options: FileOptions,
) -> StorageResult<()> {
    if !path.is_file() {
        return Ok(());
    }
    zip.start_file(name, options)?;
    zip.write_all(&fs::read(path)?)?;
    Ok(())
}

/// Adds the files of `dir` accepted by `keep`, skipping in-progress writes
fn add_dir<F>(
    zip: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: FileOptions,
    keep: F,
) -> StorageResult<()>
where
    F: Fn(&str) -> bool,
{
    if !dir.is_dir() {
        return Ok(());
    }
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| keep(name))
        .collect();
    names.sort();

    for name in names {
        add_file(zip, &dir.join(&name), &format!("{}/{}", prefix, name), options)?;
    }
    Ok(())
}
