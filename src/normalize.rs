//! ASCIIグリッドの小数点・桁区切り文字の正規化

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// ESRI ASCIIグリッドのヘッダ行数
const HEADER_LINES: usize = 6;

/// Decimal and thousands separators the grid was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separators {
    pub decimal: String,
    pub thousands: String,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            decimal: ".".to_string(),
            thousands: String::new(),
        }
    }
}

impl Separators {
    pub fn new(decimal: impl Into<String>, thousands: impl Into<String>) -> Self {
        Self {
            decimal: decimal.into(),
            thousands: thousands.into(),
        }
    }

    /// 既に正規形（"." と空文字）かどうか
    pub fn is_canonical(&self) -> bool {
        self.decimal == "." && self.thousands.is_empty()
    }

    fn strips_thousands(&self) -> bool {
        // 空白の桁区切りはヘッダと値の区切りを壊すため残す
        !self.thousands.is_empty() && self.thousands != " "
    }

    fn replaces_decimal(&self) -> bool {
        !self.decimal.is_empty() && self.decimal != "."
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeScope {
    /// ファイル全体を置換する
    #[default]
    WholeFile,
    /// Only the value rows; the six header lines are left as written.
    RowData,
}

/// Rewrites separators in `text`. Returns the input untouched when nothing
/// needs replacing.
pub fn normalize_text<'a>(text: &'a str, separators: &Separators) -> Cow<'a, str> {
    let mut text = Cow::Borrowed(text);
    if separators.strips_thousands() && text.contains(separators.thousands.as_str()) {
        text = Cow::Owned(text.replace(separators.thousands.as_str(), ""));
    }
    if separators.replaces_decimal() && text.contains(separators.decimal.as_str()) {
        text = Cow::Owned(text.replace(separators.decimal.as_str(), "."));
    }
    text
}

/// `normalize_text` applied according to `scope`.
pub fn normalize_grid_text<'a>(
    text: &'a str,
    separators: &Separators,
    scope: NormalizeScope,
) -> Cow<'a, str> {
    match scope {
        NormalizeScope::WholeFile => normalize_text(text, separators),
        NormalizeScope::RowData => {
            let split = header_end(text);
            let (header, rows) = text.split_at(split);
            match normalize_text(rows, separators) {
                Cow::Borrowed(_) => Cow::Borrowed(text),
                Cow::Owned(rows) => Cow::Owned(format!("{}{}", header, rows)),
            }
        }
    }
}

/// ヘッダ部の終端（バイト位置）
fn header_end(text: &str) -> usize {
    text.match_indices('\n')
        .nth(HEADER_LINES - 1)
        .map(|(i, _)| i + 1)
        .unwrap_or(text.len())
}

/// Normalizes the grid file at `path` in place.
///
/// Returns `true` when the file was rewritten. Canonical separators leave
/// the file untouched without reading it.
pub fn normalize_file(path: &Path, separators: &Separators, scope: NormalizeScope) -> Result<bool> {
    if separators.is_canonical() {
        return Ok(false);
    }

    let content = fs::read_to_string(path)?;
    match normalize_grid_text(&content, separators, scope) {
        Cow::Borrowed(_) => Ok(false),
        Cow::Owned(normalized) => {
            fs::write(path, normalized)?;
            tracing::debug!("Normalized separators in {:?}", path);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER_COMMA: &str = "ncols 2\nnrows 2\nxllcorner 1000,5\nyllcorner 2000,5\ncellsize 2,5\nNODATA_value -9999\n";

    #[test]
    fn test_comma_decimal_dot_thousands() {
        let separators = Separators::new(",", ".");
        assert_eq!(normalize_text("1.234,56", &separators), "1234.56");
    }

    #[test]
    fn test_space_thousands_is_left_alone() {
        let separators = Separators::new(".", " ");
        let out = normalize_text("1 234.56", &separators);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "1 234.56");
    }

    #[test]
    fn test_default_separators_are_canonical() {
        assert_eq!(Separators::default(), Separators::new(".", ""));
        assert!(Separators::default().is_canonical());
        assert!(!Separators::new(",", "").is_canonical());
    }

    #[test]
    fn test_canonical_is_noop() {
        let text = "ncols 3\n1.5 2.5 -9999\n";
        let out = normalize_text(text, &Separators::default());
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_idempotent() {
        let inputs = ["1,5 2,25\n-9999 3,0\n", "1'234,5 7,0\n", "12 345,6 7,8\n"];
        let configs = [
            Separators::new(",", ""),
            Separators::new(",", "'"),
            Separators::new(",", " "),
            Separators::new(".", ","),
        ];

        for separators in &configs {
            for input in inputs {
                let once = normalize_text(input, separators).into_owned();
                let twice = normalize_text(&once, separators).into_owned();
                assert_eq!(once, twice, "{:?} on {:?}", separators, input);
            }
        }
    }

    #[test]
    fn test_whole_file_touches_header() {
        let text = format!("{}1,5 2,5\n3,5 4,5\n", HEADER_COMMA);
        let out = normalize_grid_text(&text, &Separators::new(",", ""), NormalizeScope::WholeFile);
        assert!(out.contains("xllcorner 1000.5\n"));
        assert!(out.ends_with("1.5 2.5\n3.5 4.5\n"));
    }

    #[test]
    fn test_row_data_scope_keeps_header() {
        let text = format!("{}1,5 2,5\n3,5 4,5\n", HEADER_COMMA);
        let out = normalize_grid_text(&text, &Separators::new(",", ""), NormalizeScope::RowData);
        assert!(out.starts_with(HEADER_COMMA));
        assert!(out.ends_with("1.5 2.5\n3.5 4.5\n"));

        // ヘッダのみのファイル
        let out = normalize_grid_text(HEADER_COMMA, &Separators::new(",", ""), NormalizeScope::RowData);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_file_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("d1.asc");
        fs::write(&path, format!("{}1,5 2,5\n3,5 4,5\n", HEADER_COMMA)).unwrap();

        let changed = normalize_file(&path, &Separators::new(",", ""), NormalizeScope::WholeFile).unwrap();
        assert!(changed);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("cellsize 2.5\n"));
        assert!(content.ends_with("1.5 2.5\n3.5 4.5\n"));

        // 2回目は書き換えない
        let changed = normalize_file(&path, &Separators::new(",", ""), NormalizeScope::WholeFile).unwrap();
        assert!(!changed);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_normalize_file_canonical_skips_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.asc");
        assert!(!normalize_file(&path, &Separators::default(), NormalizeScope::WholeFile).unwrap());
        assert!(!path.exists());
    }
}
