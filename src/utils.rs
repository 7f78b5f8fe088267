use crate::model::CellCoord;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;

static CELL_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").expect("valid cell regex"));

static NATURAL_CHUNK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+|[^0-9]+").expect("valid regex"));

pub fn system_time_to_datetime(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

pub fn modified_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(system_time_to_datetime)
}

pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Identity of a file on disk: path, size and modification time.
pub fn hash_path_metadata(path: &Path, metadata: &Metadata) -> String {
    let modified = modified_at(metadata)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .unwrap_or_default();
    sha256_hex(&[
        path.to_string_lossy().as_bytes(),
        &metadata.len().to_le_bytes(),
        modified.as_bytes(),
    ])
}

/// Zero-based column index to spreadsheet letters (0 -> A, 26 -> AA).
pub fn column_index_to_letter(column: u32) -> String {
    let mut column = u64::from(column) + 1;
    let mut name = String::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.insert(0, (b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    name
}

/// Spreadsheet letters to a zero-based column index.
pub fn column_letter_to_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

pub fn to_excel(column: u32, row: u32) -> String {
    format!("{}{}", column_index_to_letter(column), u64::from(row) + 1)
}

pub fn parse_cell_address(address: &str) -> Option<CellCoord> {
    let caps = CELL_ADDRESS.captures(address.trim())?;
    let column = column_letter_to_index(&caps[1])?;
    let row: u32 = caps[2].parse().ok()?;
    if row == 0 {
        return None;
    }
    Some(CellCoord::new(column, row - 1))
}

/// Parses `A1:C3` (or a single `B2`) into its two corner cells.
pub fn parse_range(range: &str) -> Option<(CellCoord, CellCoord)> {
    match range.split_once(':') {
        Some((start, end)) => Some((parse_cell_address(start)?, parse_cell_address(end)?)),
        None => {
            let cell = parse_cell_address(range)?;
            Some((cell, cell))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalChunk {
    Number(u64),
    Text(String),
}

impl PartialOrd for NaturalChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NaturalChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NaturalChunk::Number(a), NaturalChunk::Number(b)) => a.cmp(b),
            (NaturalChunk::Text(a), NaturalChunk::Text(b)) => a.cmp(b),
            (NaturalChunk::Number(_), NaturalChunk::Text(_)) => Ordering::Less,
            (NaturalChunk::Text(_), NaturalChunk::Number(_)) => Ordering::Greater,
        }
    }
}

/// Sort key that orders `A2` before `A10`.
pub fn natural_sort_key(s: &str) -> Vec<NaturalChunk> {
    NATURAL_CHUNK
        .find_iter(s)
        .map(|m| {
            let chunk = m.as_str();
            match chunk.parse::<u64>() {
                Ok(n) if chunk.chars().all(|c| c.is_ascii_digit()) => NaturalChunk::Number(n),
                _ => NaturalChunk::Text(chunk.to_lowercase()),
            }
        })
        .collect()
}

/// Writes `bytes` to `path` through a sibling temp file so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Filesystem-safe rendition of a sheet name.
pub fn sanitize_file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

pub fn path_to_forward_slashes(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if raw.contains('\\') {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_indices_do_not_overflow() {
        assert_eq!(column_index_to_letter(u32::MAX), "MWLQKWV");
        assert_eq!(to_excel(0, u32::MAX), "A4294967296");
    }

    #[test]
    fn column_letters_round_trip() {
        for idx in [0u32, 1, 25, 26, 27, 51, 52, 701, 702] {
            let letters = column_index_to_letter(idx);
            assert_eq!(column_letter_to_index(&letters), Some(idx), "{letters}");
        }
        assert_eq!(column_index_to_letter(26), "AA");
    }

    #[test]
    fn parses_addresses_and_ranges() {
        assert_eq!(parse_cell_address("B3"), Some(CellCoord::new(1, 2)));
        assert_eq!(parse_cell_address("$c$1"), Some(CellCoord::new(2, 0)));
        assert_eq!(parse_cell_address("A0"), None);
        let (start, end) = parse_range("A1:C4").expect("range");
        assert_eq!(start, CellCoord::new(0, 0));
        assert_eq!(end, CellCoord::new(2, 3));
    }

    #[test]
    fn natural_key_orders_numbers_numerically() {
        let mut labels = vec!["A10", "A2", "B1", "A1"];
        labels.sort_by_key(|s| natural_sort_key(s));
        assert_eq!(labels, vec!["A1", "A2", "A10", "B1"]);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested/out.json");
        write_atomic(&target, b"{}").expect("write");
        write_atomic(&target, b"[1]").expect("overwrite");
        assert_eq!(std::fs::read(&target).expect("read"), b"[1]");
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
