//! Position suffix parsing, line/column range extraction, and splicing.
//!
//! Grammar: `suffix := ":" range`, `range := line | line "-" line | line
//! "-EOF"`, `line := "L" digits ["C" digits]`. Examples: `L12-L20`,
//! `L5C1-L5C40`, `L100-EOF`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::checksum::{is_binary_content, normalize_crlf};
use crate::error::VendorError;
use crate::model::PositionSpec;
use crate::safety::validate_dest_path;

/// Splits a `From`/`To` field into `(path, Option<suffix text>)`.
pub fn split_position_suffix(field: &str) -> (&str, Option<&str>) {
    match field.find(':') {
        Some(idx) => (&field[..idx], Some(&field[idx + 1..])),
        None => (field, None),
    }
}

static LINE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^L(\d+)$").unwrap());
static LINE_COL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^L(\d+)C(\d+)$").unwrap());

/// Parses a position suffix (without the leading `:`) into a
/// [`PositionSpec`].
pub fn parse_position_spec(field: &str, suffix: &str) -> Result<PositionSpec, VendorError> {
    let bad = |msg: String| {
        VendorError::ValidationFailed {
            vendor: String::new(),
            field: field.into(),
            message: msg,
        }
    };

    if let Some(rest) = suffix.strip_prefix("L") {
        // Reassemble with the leading "L" for the regexes below.
        let full = format!("L{rest}");
        if let Some((start_part, end_part)) = full.split_once('-') {
            if end_part == "EOF" {
                let (sl, sc) = parse_line_token(start_part).map_err(bad)?;
                return Ok(PositionSpec {
                    start_line: sl,
                    end_line: usize::MAX, // resolved to N by the caller
                    start_col: sc,
                    end_col: None,
                    to_eof: true,
                });
            }
            let (sl, sc) = parse_line_token(start_part).map_err(bad)?;
            let (el, ec) = parse_line_token(end_part).map_err(bad)?;
            if sc.is_some() != ec.is_some() {
                return Err(bad(
                    "start and end must both specify a column or neither".into(),
                ));
            }
            return Ok(PositionSpec {
                start_line: sl,
                end_line: el,
                start_col: sc,
                end_col: ec,
                to_eof: false,
            });
        }
        // Single line, optionally with a column — but a lone column without
        // an end makes no sense; single-line-only form has no columns.
        let (sl, sc) = parse_line_token(&full).map_err(bad)?;
        if sc.is_some() {
            return Err(bad(
                "a single-line position must not specify a column".into(),
            ));
        }
        return Ok(PositionSpec {
            start_line: sl,
            end_line: sl,
            start_col: None,
            end_col: None,
            to_eof: false,
        });
    }

    Err(bad(format!("malformed position suffix ':{suffix}'")))
}

fn parse_line_token(tok: &str) -> Result<(usize, Option<usize>), String> {
    if let Some(caps) = LINE_COL.captures(tok) {
        let line: usize = caps[1].parse().map_err(|_| "invalid line number".to_string())?;
        let col: usize = caps[2].parse().map_err(|_| "invalid column number".to_string())?;
        return Ok((line, Some(col)));
    }
    if let Some(caps) = LINE_ONLY.captures(tok) {
        let line: usize = caps[1].parse().map_err(|_| "invalid line number".to_string())?;
        return Ok((line, None));
    }
    Err(format!("malformed line token '{tok}'"))
}

/// Extracts the text selected by `pos` out of `content` (already read from
/// disk). Rejects binary content.
pub fn extract_position(path_for_errors: &str, content: &[u8], pos: &PositionSpec) -> Result<String, VendorError> {
    if is_binary_content(content) {
        return Err(VendorError::ValidationFailed {
            vendor: String::new(),
            field: "from".into(),
            message: format!("{path_for_errors}: binary not supported"),
        });
    }
    let text = String::from_utf8_lossy(content);
    let normalized = normalize_crlf(&text);
    let lines: Vec<&str> = normalized.split('\n').collect();
    let n = lines.len();

    let bad = |msg: String| {
        VendorError::ValidationFailed {
            vendor: String::new(),
            field: "from".into(),
            message: format!("{path_for_errors}: {msg}"),
        }
    };

    let end_line = if pos.to_eof { n } else { pos.end_line };

    if pos.start_line == 0 || pos.start_line > n {
        return Err(bad(format!(
            "start line {} out of range (file has {n} lines)",
            pos.start_line
        )));
    }
    if end_line == 0 || end_line > n {
        return Err(bad(format!(
            "end line {end_line} out of range (file has {n} lines)"
        )));
    }
    if pos.start_line > end_line {
        return Err(bad(format!(
            "start line {} is after end line {end_line}",
            pos.start_line
        )));
    }

    if !pos.has_columns() {
        return Ok(lines[pos.start_line - 1..end_line].join("\n"));
    }

    let start_col = pos.start_col.unwrap();
    let end_col = pos.end_col.unwrap();

    if pos.start_line == end_line {
        let line = lines[pos.start_line - 1];
        if end_col > line.chars().count() {
            return Err(bad(format!(
                "end column {end_col} exceeds line length ({})",
                line.chars().count()
            )));
        }
        if start_col == 0 || start_col > end_col {
            return Err(bad(format!("invalid column range {start_col}-{end_col}")));
        }
        return Ok(slice_chars(line, start_col - 1, end_col));
    }

    // Multi-line column extraction.
    let first_line = lines[pos.start_line - 1];
    let first_len = first_line.chars().count();
    let clamped_start = start_col.min(first_len + 1);
    let first_contribution = slice_chars(first_line, clamped_start.saturating_sub(1), first_len);

    let mut out = vec![first_contribution];
    for line in &lines[pos.start_line..end_line - 1] {
        out.push((*line).to_string());
    }

    let last_line = lines[end_line - 1];
    let last_len = last_line.chars().count();
    if end_col > last_len {
        return Err(bad(format!(
            "end column {end_col} exceeds last line length ({last_len})"
        )));
    }
    out.push(slice_chars(last_line, 0, end_col));

    Ok(out.join("\n"))
}

fn slice_chars(line: &str, start: usize, end: usize) -> String {
    line.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Overwrites (or creates) `file` with `content` when `pos` is `None`;
/// otherwise splices `content` into the validated line/column range of the
/// file's existing contents.
pub fn place_content(file: &std::path::Path, content: &str, pos: Option<&PositionSpec>) -> Result<(), VendorError> {
    if let Some(rel) = file.to_str()
        && !file.is_absolute()
    {
        validate_dest_path(rel)?;
    }

    let Some(pos) = pos else {
        return write_file(file, content);
    };

    let existing = std::fs::read(file).map_err(|e| VendorError::Internal {
        message: format!("{}: {e}", file.display()),
    })?;
    let text = String::from_utf8_lossy(&existing);
    let normalized = normalize_crlf(&text);
    let mut lines: Vec<String> = normalized.split('\n').map(|s| s.to_string()).collect();
    let n = lines.len();

    let bad = |msg: String| VendorError::ValidationFailed {
        vendor: String::new(),
        field: "to".into(),
        message: format!("{}: {msg}", file.display()),
    };

    let end_line = if pos.to_eof { n } else { pos.end_line };
    if pos.start_line == 0 || pos.start_line > n || end_line == 0 || end_line > n {
        return Err(bad(format!("position out of range (file has {n} lines)")));
    }

    if !pos.has_columns() {
        let replacement: Vec<String> = content.split('\n').map(|s| s.to_string()).collect();
        lines.splice(pos.start_line - 1..end_line, replacement);
    } else {
        let start_col = pos.start_col.unwrap();
        let end_col = pos.end_col.unwrap();
        if pos.start_line == end_line {
            let line = &lines[pos.start_line - 1];
            let line_len = line.chars().count();
            if end_col > line_len || start_col == 0 || start_col > end_col {
                return Err(bad(format!("invalid column range {start_col}-{end_col}")));
            }
            let prefix: String = line.chars().take(start_col - 1).collect();
            let suffix: String = line.chars().skip(end_col).collect();
            lines[pos.start_line - 1] = format!("{prefix}{content}{suffix}");
        } else {
            let last_len = lines[end_line - 1].chars().count();
            if end_col > last_len {
                return Err(bad(format!(
                    "end column {end_col} exceeds last line length ({last_len})"
                )));
            }
            let first_line = &lines[pos.start_line - 1];
            let first_len = first_line.chars().count();
            let clamped_start = start_col.min(first_len + 1);
            let prefix: String = first_line.chars().take(clamped_start - 1).collect();
            let last_suffix: String = lines[end_line - 1].chars().skip(end_col).collect();
            let replacement = format!("{prefix}{content}{last_suffix}");
            lines.splice(pos.start_line - 1..end_line, vec![replacement]);
        }
    }

    write_file(file, &lines.join("\n"))
}

fn write_file(file: &std::path::Path, content: &str) -> Result<(), VendorError> {
    if let Some(parent) = file.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| VendorError::Internal {
            message: format!("{}: {e}", parent.display()),
        })?;
    }
    std::fs::write(file, content).map_err(|e| VendorError::Internal {
        message: format!("{}: {e}", file.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_suffix_from_path() {
        assert_eq!(split_position_suffix("README.md:L10-L20"), ("README.md", Some("L10-L20")));
        assert_eq!(split_position_suffix("README.md"), ("README.md", None));
    }

    #[test]
    fn parses_line_range() {
        let pos = parse_position_spec("from", "L12-L20").unwrap();
        assert_eq!(pos.start_line, 12);
        assert_eq!(pos.end_line, 20);
        assert!(!pos.has_columns());
    }

    #[test]
    fn parses_column_range() {
        let pos = parse_position_spec("from", "L5C1-L5C40").unwrap();
        assert_eq!(pos.start_line, 5);
        assert_eq!(pos.end_line, 5);
        assert_eq!(pos.start_col, Some(1));
        assert_eq!(pos.end_col, Some(40));
        assert!(pos.has_columns());
    }

    #[test]
    fn parses_to_eof() {
        let pos = parse_position_spec("from", "L100-EOF").unwrap();
        assert_eq!(pos.start_line, 100);
        assert!(pos.to_eof);
    }

    #[test]
    fn extracts_line_range() {
        let content: String = (1..=50).map(|i| format!("line{i}\n")).collect();
        let pos = parse_position_spec("from", "L10-L20").unwrap();
        let extracted = extract_position("f", content.as_bytes(), &pos).unwrap();
        let lines: Vec<&str> = extracted.split('\n').collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "line10");
        assert_eq!(lines[10], "line20");
    }

    #[test]
    fn extracts_single_line_column_range() {
        let pos = parse_position_spec("from", "L1C1-L1C5").unwrap();
        let extracted = extract_position("f", b"hello world", &pos).unwrap();
        assert_eq!(extracted, "hello");
    }

    #[test]
    fn extracts_multiline_column_range() {
        let content = "abcdef\nghijkl\nmnopqr";
        let pos = parse_position_spec("from", "L1C4-L3C3").unwrap();
        let extracted = extract_position("f", content.as_bytes(), &pos).unwrap();
        assert_eq!(extracted, "def\nghijkl\nmno");
    }

    #[test]
    fn start_col_past_eol_on_first_line_yields_empty_contribution() {
        let content = "ab\nghijkl\nmnopqr";
        let pos = parse_position_spec("from", "L1C10-L3C3").unwrap();
        let extracted = extract_position("f", content.as_bytes(), &pos).unwrap();
        assert_eq!(extracted, "\nghijkl\nmno");
    }

    #[test]
    fn rejects_out_of_range_lines() {
        let pos = parse_position_spec("from", "L1-L5").unwrap();
        let err = extract_position("f.txt", b"only one line", &pos).unwrap_err();
        assert!(err.to_string().contains("f.txt"));
    }

    #[test]
    fn rejects_binary_content() {
        let pos = parse_position_spec("from", "L1-L2").unwrap();
        assert!(extract_position("f", b"ab\0cd\nef", &pos).is_err());
    }

    #[test]
    fn place_and_extract_round_trip_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.txt");
        place_content(&file, "hello", None).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
    }

    #[test]
    fn place_content_splices_line_range() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.txt");
        std::fs::write(&file, "a\nb\nc\nd\ne").unwrap();
        let pos = parse_position_spec("to", "L2-L3").unwrap();
        place_content(&file, "X\nY\nZ", Some(&pos)).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a\nX\nY\nZ\nd\ne");
    }
}
