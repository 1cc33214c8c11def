//! Turns pasted spreadsheet text into song rows.
//!
//! Each line is one song: `title, artist[, bpm[, tuning]]`. Tabs win over commas as the
//! separator, and a bare `Title - Artist` line is accepted too. Rows are capped first, then
//! exact duplicates are dropped, then what is left is validated.

use crate::songs::normalize::{collapse_whitespace, normalize_key};
use crate::songs::tuning::canonical_tuning;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    pub max_rows: usize,
    pub min_bpm: i32,
    pub max_bpm: i32,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_rows: 500,
            min_bpm: 20,
            max_bpm: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRow {
    pub title: String,
    pub artist: String,
    pub bpm: Option<i32>,
    pub tuning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidRow {
    /// 1-based line of the raw input.
    pub line_number: usize,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedImport {
    pub valid_rows: Vec<ImportRow>,
    pub invalid_rows: Vec<InvalidRow>,
    pub duplicates_removed: usize,
    pub truncated_count: usize,
    pub warnings: Vec<String>,
}

const TITLE_HEADERS: &[&str] = &["title", "song", "song title", "name"];
const ARTIST_HEADERS: &[&str] = &["artist", "band", "performer", "by"];

fn split_cells(line: &str) -> Vec<String> {
    let cells: Vec<&str> = if line.contains('\t') {
        line.split('\t').collect()
    } else if line.contains(',') {
        line.split(',').collect()
    } else if line.contains(" - ") {
        line.splitn(2, " - ").collect()
    } else {
        vec![line]
    };
    cells
        .into_iter()
        .map(|cell| collapse_whitespace(cell.trim().trim_matches('"')))
        .collect()
}

fn is_header(cells: &[String]) -> bool {
    let title = cells.first().map(|c| normalize_key(c)).unwrap_or_default();
    let artist = cells.get(1).map(|c| normalize_key(c)).unwrap_or_default();
    TITLE_HEADERS.contains(&title.as_str()) && ARTIST_HEADERS.contains(&artist.as_str())
}

fn cell(cells: &[String], index: usize) -> Option<&str> {
    cells
        .get(index)
        .map(String::as_str)
        .filter(|c| !c.is_empty())
}

fn parse_bpm(raw: &str, limits: &ImportLimits) -> Result<i32, String> {
    let digits = raw.trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace());
    let value: f64 = digits
        .parse()
        .map_err(|_| format!("bpm '{}' is not a number", raw))?;
    let bpm = value.round() as i32;
    if bpm < limits.min_bpm || bpm > limits.max_bpm {
        return Err(format!(
            "bpm {} is outside {}-{}",
            bpm, limits.min_bpm, limits.max_bpm
        ));
    }
    Ok(bpm)
}

/// Builds a row from already split cells, or says why it is not one.
fn validate(
    cells: &[String],
    line_number: usize,
    limits: &ImportLimits,
    warnings: &mut Vec<String>,
) -> Result<ImportRow, String> {
    let title = cell(cells, 0).ok_or("title is required")?;
    let artist = cell(cells, 1).ok_or("artist is required")?;
    let bpm = cell(cells, 2).map(|raw| parse_bpm(raw, limits)).transpose()?;
    let tuning = cell(cells, 3).map(|raw| match canonical_tuning(raw) {
        Some(canonical) => canonical.to_string(),
        None => {
            warnings.push(format!(
                "line {}: unrecognized tuning '{}' kept as typed",
                line_number, raw
            ));
            raw.to_string()
        }
    });
    Ok(ImportRow {
        title: title.to_string(),
        artist: artist.to_string(),
        bpm,
        tuning,
    })
}

pub fn parse_import(raw_text: &str, limits: &ImportLimits) -> ParsedImport {
    let mut parsed = ParsedImport::default();

    let mut lines: Vec<(usize, &str, Vec<String>)> = raw_text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, line, split_cells(line)))
        .collect();
    if lines.first().is_some_and(|(_, _, cells)| is_header(cells)) {
        lines.remove(0);
    }

    if lines.len() > limits.max_rows {
        parsed.truncated_count = lines.len() - limits.max_rows;
        lines.truncate(limits.max_rows);
        parsed.warnings.push(format!(
            "only the first {} rows are imported, {} more were ignored",
            limits.max_rows, parsed.truncated_count
        ));
    }

    let mut seen = HashSet::new();
    for (line_number, line, cells) in lines {
        if !seen.insert(cells.clone()) {
            parsed.duplicates_removed += 1;
            continue;
        }
        match validate(&cells, line_number, limits, &mut parsed.warnings) {
            Ok(row) => parsed.valid_rows.push(row),
            Err(reason) => parsed.invalid_rows.push(InvalidRow {
                line_number,
                raw: line.to_string(),
                reason,
            }),
        }
    }
    parsed
}
