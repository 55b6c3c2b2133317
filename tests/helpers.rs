// Shared test helpers for database fixtures and catalogs.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use geoisp::{Catalog, Config, Iso3166_1};

/// Size of the DAT header region.
pub const HEADER_SIZE: usize = 1028;

/// Lays out a DAT file from (inclusive upper bound, text record) pairs.
pub fn build_dat(entries: &[(u32, &str)]) -> Vec<u8> {
    let text_offset = HEADER_SIZE + entries.len() * 8;
    let mut table = Vec::with_capacity(entries.len() * 8);
    let mut text = Vec::new();
    for (upper, record) in entries {
        table.extend_from_slice(&upper.to_be_bytes());
        let packed = ((record.len() as u32) << 24) | text.len() as u32;
        table.extend_from_slice(&packed.to_le_bytes());
        text.extend_from_slice(record.as_bytes());
    }
    let mut content = Vec::new();
    content.extend_from_slice(&(text_offset as u32 + 1024).to_be_bytes());
    content.resize(HEADER_SIZE, 0);
    content.extend_from_slice(&table);
    content.extend_from_slice(&text);
    content
}

/// Three ranges around 58.32.0.0/16 plus a catch-all.
#[allow(dead_code)] // Used by other test files
pub fn sample_entries() -> Vec<(u32, &'static str)> {
    vec![
        (0x3A1F_FFFF, "中国\t中国\t\t\t"),
        (0x3A20_FFFF, "中国\t上海\t\t\tChinaNet"),
        (0x3A21_FFFF, "中国\t广东\t深圳\t\tUnicom/ChinaNet"),
        (0xFFFF_FFFF, "\t\t\t\t"),
    ]
}

/// Same ranges, different content: 58.32.0.0/16 moves to Unicom.
#[allow(dead_code)] // Used by other test files
pub fn updated_entries() -> Vec<(u32, &'static str)> {
    vec![
        (0x3A1F_FFFF, "中国\t中国\t\t\t"),
        (0x3A20_FFFF, "中国\t上海\t\t\tUnicom"),
        (0x3A21_FFFF, "中国\t广东\t深圳\t\tUnicom/ChinaNet"),
        (0xFFFF_FFFF, "\t\t\t\t"),
    ]
}

/// Small catalog matching the sample entries.
#[allow(dead_code)] // Used by other test files
pub fn sample_catalog() -> Arc<Catalog> {
    let mut builder = Catalog::builder();
    let cn = builder.add_country(
        1,
        Iso3166_1 {
            alpha2: "CN".to_string(),
            alpha3: "CHN".to_string(),
            numeric: 156,
        },
        "中国",
    );
    builder.add_subdivision(cn, 31, "CN-SH", "上海");
    let gd = builder.add_subdivision(cn, 44, "CN-GD", "广东");
    builder.add_city(gd, 4403, "深圳");
    builder.add_isp(1, "ChinaNet", vec!["电信".to_string()]);
    builder.add_isp(2, "Unicom", vec!["联通".to_string()]);
    Arc::new(builder.build())
}

/// Writes a DAT file built from `entries` and returns its path.
#[allow(dead_code)] // Used by other test files
pub fn write_dat(dir: &Path, name: &str, entries: &[(u32, &str)]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_dat(entries)).expect("Failed to write test database");
    path
}

/// Local-mode config with the background task disabled.
#[allow(dead_code)] // Used by other test files
pub fn manual_config(local_path: PathBuf) -> Config {
    Config {
        local_path,
        auto_start: false,
        fetch_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Pushes a file's modification time forward so change detection sees it.
#[allow(dead_code)] // Used by other test files
pub fn bump_mtime(path: &Path, by: Duration) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("Failed to open file");
    let modified = file
        .metadata()
        .and_then(|m| m.modified())
        .expect("Failed to read mtime");
    file.set_modified(modified + by)
        .expect("Failed to set mtime");
}
