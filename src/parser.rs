// 🏗️ Wikitext Parser - Museum attendance table ingestion
//
// Parses the "wikitable sortable" attendance table out of saved wikitext.
// Partial-failure tolerant by design: a malformed row lands in the discard
// list with a reason and the batch keeps going. Network fetching is a
// separate concern - this module only ever sees text.

use crate::harmonize::RawMuseumRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Rows below this visitor count are treated as noise (sub-table footnotes,
/// partial-year figures) and discarded.
const MIN_ACCEPTED_VISITORS: f64 = 100_000.0;

// ============================================================================
// DISCARDED ROWS
// ============================================================================

/// A table row that failed validation, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardedRow {
    pub reason: String,
    pub cells: Vec<String>,
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

pub fn load_wikitext(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read wikitext file {}", path.display()))
}

/// Parse the museum table into raw records plus the rows that didn't make it.
///
/// Duplicate (name, city) pairs collapse to the best-ranked row. Output order
/// is deterministic (sorted by name then city).
pub fn parse_museum_table(wikitext: &str) -> Result<(Vec<RawMuseumRecord>, Vec<DiscardedRow>)> {
    let table = extract_table(wikitext)?;

    let mut accepted: Vec<RawMuseumRecord> = Vec::new();
    let mut discarded: Vec<DiscardedRow> = Vec::new();

    let parts: Vec<&str> = table.split("\n|-").collect();
    for part in parts.iter().skip(1) {
        let mut chunk = *part;

        // Drop row attributes left on the "|-" line (e.g. style=...)
        if let Some(newline) = chunk.find('\n') {
            let first_line = chunk[..newline].trim();
            if !first_line.is_empty() && !first_line.starts_with('|') && !first_line.starts_with('!')
            {
                chunk = &chunk[newline + 1..];
            }
        }

        let row = chunk.trim();
        if row.starts_with("|}") {
            break;
        }
        // Header rows ("!...") and junk between rows
        if !row.starts_with('|') {
            continue;
        }

        let cells: Vec<String> = split_cells(row).iter().map(|cell| clean_cell(cell)).collect();

        if cells.len() < 4 {
            discarded.push(DiscardedRow {
                reason: "too_few_cells".to_string(),
                cells,
            });
            continue;
        }

        let rank = parse_rank(&cells[0]);
        let name = clean_museum_name(&cells[1]);
        let location = cells[2].clone();
        let (visitors, raw_visitors_str) = parse_visitors(&cells[3]);

        let (country, city) = split_location(&location);
        let (country, city) = normalize_location(country, city);

        match visitors {
            Some(v) if !name.is_empty() && v >= MIN_ACCEPTED_VISITORS => {
                accepted.push(RawMuseumRecord {
                    name,
                    location,
                    country,
                    city,
                    visitors: Some(v),
                    raw_visitors_str: Some(raw_visitors_str),
                    rank,
                    year: None,
                    coordinates: None,
                    museum_type: None,
                });
            }
            _ => {
                discarded.push(DiscardedRow {
                    reason: "failed_validation".to_string(),
                    cells,
                });
            }
        }
    }

    // Collapse duplicate (name, city) rows to the best rank
    let mut dedup: BTreeMap<(String, String), RawMuseumRecord> = BTreeMap::new();
    for record in accepted {
        let key = (record.name.clone(), record.city.clone().unwrap_or_default());
        match dedup.get(&key) {
            Some(existing) => {
                let better = match (record.rank, existing.rank) {
                    (Some(new), Some(old)) => new < old,
                    (Some(_), None) => true,
                    _ => false,
                };
                if better {
                    dedup.insert(key, record);
                }
            }
            None => {
                dedup.insert(key, record);
            }
        }
    }

    Ok((dedup.into_values().collect(), discarded))
}

// ============================================================================
// TABLE EXTRACTION
// ============================================================================

/// Pull out the first "wikitable sortable" table, balancing nested `{|`/`|}`.
fn extract_table(wikitext: &str) -> Result<String> {
    let marker = "class=\"wikitable sortable\"";
    let pos = wikitext
        .find(marker)
        .context("No 'wikitable sortable' table found in wikitext")?;
    let start = wikitext[..pos]
        .rfind("{|")
        .context("Table marker found but no opening '{|' before it")?;

    let mut depth = 0i32;
    let mut collected = String::new();
    for line in wikitext[start..].lines() {
        collected.push_str(line);
        collected.push('\n');
        let stripped = line.trim();
        if stripped.starts_with("{|") {
            depth += 1;
        } else if stripped == "|}" {
            depth -= 1;
            if depth == 0 {
                break;
            }
        }
    }

    Ok(collected)
}

/// Split a row block into raw cells. Cells arrive inline ("|a || b || c"),
/// one per line ("|a\n|b"), or a mix; continuation lines are joined with a
/// space.
fn split_cells(row_block: &str) -> Vec<String> {
    let normalized = row_block.replace('\r', "");
    let mut joined = String::with_capacity(normalized.len());

    for (i, line) in normalized.lines().enumerate() {
        if i == 0 {
            joined.push_str(line);
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with('|') || trimmed.starts_with('!') {
            joined.push('\n');
            joined.push_str(trimmed);
        } else {
            joined.push(' ');
            joined.push_str(line);
        }
    }

    let mut cells = Vec::new();
    for line in joined.lines() {
        let line = line.trim();
        if line == "|}" {
            continue;
        }
        let line = line.strip_prefix('|').unwrap_or(line);
        for cell in line.split("||") {
            cells.push(cell.trim().to_string());
        }
    }
    cells
}

// ============================================================================
// CELL CLEANING
// ============================================================================

/// Strip wiki markup from one cell: refs, links, HTML tags, templates.
fn clean_cell(text: &str) -> String {
    let text = strip_refs(text);
    let text = strip_links(&text);
    let text = strip_html_tags(&text);
    let text = strip_templates(&text);
    let text = text.replace("&nbsp;", " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `<ref ...>...</ref>` blocks and self-closing `<ref ... />` tags.
fn strip_refs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(start) = rest.find("<ref") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let Some(gt) = after.find('>') else {
            // Unterminated tag: drop the remainder
            break;
        };
        if after[..gt].ends_with('/') {
            rest = &after[gt + 1..];
        } else if let Some(close) = after[gt..].find("</ref>") {
            rest = &after[gt + close + "</ref>".len()..];
        } else {
            break;
        }
    }

    out
}

/// Replace `[[target|display]]` with `display` and `[[target]]` with `target`.
fn strip_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("]]") {
            Some(end) => {
                let inner = &after[..end];
                let display = inner.rsplit('|').next().unwrap_or(inner);
                out.push_str(display);
                rest = &after[end + 2..];
            }
            None => {
                // Unbalanced link: drop the brackets, keep the text
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn strip_html_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Resolve templates innermost-first. Flag and lang templates keep their
/// display text; everything else is dropped.
fn strip_templates(text: &str) -> String {
    let mut current = text.to_string();

    loop {
        let Some(close) = current.find("}}") else {
            break;
        };
        match current[..close].rfind("{{") {
            Some(open) => {
                let replacement = template_text(&current[open + 2..close]);
                current.replace_range(open..close + 2, &replacement);
            }
            None => {
                // Stray closing braces
                current.replace_range(close..close + 2, "");
            }
        }
    }

    // Unbalanced "{{" swallows the rest of the cell
    if let Some(open) = current.find("{{") {
        current.truncate(open);
    }

    current
}

fn template_text(inner: &str) -> String {
    let mut parts = inner.split('|');
    let name = parts.next().unwrap_or("").trim().to_lowercase();
    match name.as_str() {
        "flag" | "flagicon" | "flagcountry" | "lang" => {
            // Last positional argument is the display text; named arguments
            // like italic=no are not display text.
            parts
                .filter(|p| !p.contains('='))
                .next_back()
                .map(|p| p.trim().to_string())
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn clean_museum_name(name: &str) -> String {
    name.trim_matches(|c: char| c == '|' || c == ',' || c.is_whitespace())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// FIELD PARSING
// ============================================================================

fn parse_rank(cell: &str) -> Option<i64> {
    let digits: String = cell.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Parse a visitor cell like "8,700,000 (2024)" into an absolute count.
/// Returns (parsed count, original cell text) - the raw text is retained for
/// provenance even when parsing fails.
fn parse_visitors(cell: &str) -> (Option<f64>, String) {
    let raw = cell.to_string();
    let cleaned = strip_year_parens(cell);

    let compact: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(start) = compact.find(|c: char| c.is_ascii_digit()) else {
        return (None, raw);
    };

    // Commas and dots both act as thousands separators in this table
    let digits: String = compact[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| c.is_ascii_digit())
        .collect();

    match digits.parse::<i64>() {
        Ok(count) => (Some(count as f64), raw),
        Err(_) => (None, raw),
    }
}

/// Remove parenthesized years like "(2024)" so they are not mistaken for the
/// visitor figure.
fn strip_year_parens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '('
            && i + 5 < chars.len()
            && chars[i + 5] == ')'
            && chars[i + 1..i + 5].iter().all(|c| c.is_ascii_digit())
            && (chars[i + 1] == '1' || chars[i + 1] == '2')
        {
            i += 6;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

// ============================================================================
// LOCATION HANDLING
// ============================================================================

/// Split a cleaned location cell into (country, city).
/// "France, Paris" splits on the comma; "France Paris" takes the last token
/// as the city; a single word is a country with no city.
fn split_location(location: &str) -> (Option<String>, Option<String>) {
    let location = location.trim();
    if location.is_empty() {
        return (None, None);
    }

    if location.contains(',') {
        let segments: Vec<&str> = location
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() >= 2 {
            return (
                Some(segments[0].to_string()),
                Some(segments[1..].join(", ")),
            );
        }
        return (Some(location.trim_matches(',').trim().to_string()), None);
    }

    let tokens: Vec<&str> = location.split_whitespace().collect();
    if tokens.len() >= 2 {
        let city = tokens[tokens.len() - 1].to_string();
        let country = tokens[..tokens.len() - 1].join(" ");
        (Some(country), Some(city))
    } else {
        (Some(location.to_string()), None)
    }
}

/// Fixed corrections for multi-word cities the token split mangles.
fn normalize_location(
    country: Option<String>,
    city: Option<String>,
) -> (Option<String>, Option<String>) {
    let (Some(c), Some(ci)) = (country.as_deref(), city.as_deref()) else {
        return (country, city);
    };

    let fixed = match (c, ci) {
        ("United States New York", "City") => ("United States", "New York City"),
        ("United States Washington", "D.C.") => ("United States", "Washington, D.C."),
        ("United States Los", "Angeles") => ("United States", "Los Angeles"),
        ("United States Grand Rapids Charter Township", "Michigan") => {
            ("United States", "Grand Rapids Charter Township")
        }
        ("United States San Marino", "California") => ("United States", "San Marino"),
        ("United States New", "Orleans") => ("United States", "New Orleans"),
        ("UAE Abu", "Dhabi") => ("United Arab Emirates", "Abu Dhabi"),
        ("Mexico Mexico", "City") => ("Mexico", "Mexico City"),
        ("Russia Saint", "Petersburg") => ("Russia", "Saint Petersburg"),
        ("HK Hong", "Kong") => ("Hong Kong", "Hong Kong"),
        ("Brazil Rio de", "Janeiro") => ("Brazil", "Rio de Janeiro"),
        ("Brazil Sao", "Paulo") => ("Brazil", "Sao Paulo"),
        _ => return (country, city),
    };

    (Some(fixed.0.to_string()), Some(fixed.1.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
