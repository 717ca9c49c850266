//! Pattern catalogue loading.
//!
//! The catalogue is a tabular file with a header row and the columns
//! `category`, `pattern`, `confidence`, `description`; unknown columns are
//! ignored. CSV and XLSX sources are supported, chosen by file extension.
//! Rules are case-sensitive unless the pattern itself opts out with an
//! inline `(?i)` flag. Bad rows never abort loading: they are skipped and
//! reported with their 1-based row index.

use std::path::Path;

use calamine::{open_workbook, Data, Reader as CalamineReader, Xlsx};
use regex::Regex;
use tracing::warn;

use scrub_core::{Result, ScrubError};

// ---------------------------------------------------------------------------
// PatternRule / PatternWarning
// ---------------------------------------------------------------------------

/// One compiled catalogue rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub category: String,
    pub regex: Regex,
    /// Confidence attached to every match of this rule, in `[0, 1]`.
    pub confidence: f64,
    pub description: String,
}

/// A skipped catalogue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternWarning {
    /// 1-based data row index (the header row is row 0).
    pub row: usize,
    pub message: String,
}

impl std::fmt::Display for PatternWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pattern row {}: {}", self.row, self.message)
    }
}

// ---------------------------------------------------------------------------
// PatternStore
// ---------------------------------------------------------------------------

/// Ordered list of compiled rules, loaded once and read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    rules: Vec<PatternRule>,
}

impl PatternStore {
    /// Load a catalogue, dispatching on the file extension (`.xlsx` →
    /// spreadsheet, anything else → CSV). Returns the store plus warnings
    /// for every skipped row.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<PatternWarning>)> {
        let path = path.as_ref();
        let is_xlsx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
        let rows = if is_xlsx {
            read_xlsx_rows(path)?
        } else {
            read_csv_rows(path)?
        };
        Ok(Self::from_rows(rows))
    }

    /// Compile raw `(category, pattern, confidence, description)` rows.
    pub fn from_rows(rows: Vec<RawRow>) -> (Self, Vec<PatternWarning>) {
        let mut rules = Vec::new();
        let mut warnings = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let row_no = index + 1;
            if row.pattern.trim().is_empty() {
                continue;
            }
            let confidence = match row.confidence.trim().parse::<f64>() {
                Ok(c) if (0.0..=1.0).contains(&c) => c,
                Ok(c) => {
                    push_warning(
                        &mut warnings,
                        row_no,
                        format!("confidence {c} outside [0, 1]"),
                    );
                    continue;
                }
                Err(_) => {
                    push_warning(
                        &mut warnings,
                        row_no,
                        format!("unparsable confidence {:?}", row.confidence),
                    );
                    continue;
                }
            };
            match Regex::new(&row.pattern) {
                Ok(regex) => rules.push(PatternRule {
                    category: row.category,
                    regex,
                    confidence,
                    description: row.description,
                }),
                Err(err) => {
                    push_warning(&mut warnings, row_no, format!("invalid regex: {err}"));
                }
            }
        }

        (Self { rules }, warnings)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn push_warning(warnings: &mut Vec<PatternWarning>, row: usize, message: String) {
    warn!(row, %message, "pattern rule skipped");
    warnings.push(PatternWarning { row, message });
}

// ---------------------------------------------------------------------------
// Row readers
// ---------------------------------------------------------------------------

/// One uncompiled catalogue row.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub category: String,
    pub pattern: String,
    pub confidence: String,
    pub description: String,
}

/// Column indexes resolved from a header row; unknown headers are ignored.
struct Columns {
    category: Option<usize>,
    pattern: Option<usize>,
    confidence: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn resolve<S: AsRef<str>>(header: &[S]) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.as_ref().trim().eq_ignore_ascii_case(name))
        };
        Self {
            category: find("category"),
            pattern: find("pattern"),
            confidence: find("confidence"),
            description: find("description"),
        }
    }

    fn extract<S: AsRef<str>>(&self, record: &[S]) -> RawRow {
        let get = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|v| v.as_ref().to_string())
                .unwrap_or_default()
        };
        RawRow {
            category: get(self.category),
            pattern: get(self.pattern),
            confidence: get(self.confidence),
            description: get(self.description),
        }
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ScrubError::InvalidInput(format!("cannot read pattern catalogue: {e}")))?;
    let header: Vec<String> = reader
        .headers()
        .map_err(|e| ScrubError::InvalidInput(format!("pattern catalogue header: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let columns = Columns::resolve(&header);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ScrubError::InvalidInput(format!("pattern catalogue row: {e}")))?;
        let fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        rows.push(columns.extract(&fields));
    }
    Ok(rows)
}

fn read_xlsx_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| ScrubError::InvalidInput(format!("cannot read pattern catalogue: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ScrubError::InvalidInput("pattern catalogue has no sheets".to_string()))?
        .map_err(|e| ScrubError::InvalidInput(format!("pattern catalogue sheet: {e}")))?;

    let mut rows_iter = range.rows();
    let header: Vec<String> = match rows_iter.next() {
        Some(row) => row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };
    let columns = Columns::resolve(&header);

    let mut rows = Vec::new();
    for row in rows_iter {
        let fields: Vec<String> = row.iter().map(cell_to_string).collect();
        rows.push(columns.extract(&fields));
    }
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_store(content: &str) -> (PatternStore, Vec<PatternWarning>) {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        PatternStore::load(file.path()).expect("load")
    }

    #[test]
    fn loads_rules_from_csv() {
        let (store, warnings) = csv_store(
            "category,pattern,confidence,description\n\
             inn,\\d{10},0.95,tax id\n\
             person_name,Иванов И\\. И\\.,0.9,full name\n",
        );
        assert!(warnings.is_empty());
        assert_eq!(store.len(), 2);
        assert_eq!(store.rules()[0].category, "inn");
        assert!(store.rules()[0].regex.is_match("7701234567"));
        assert!((store.rules()[1].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn unknown_columns_are_ignored_and_order_free() {
        let (store, warnings) = csv_store(
            "note,pattern,category,confidence,description,extra\n\
             x,\\d+,number,0.5,digits,y\n",
        );
        assert!(warnings.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.rules()[0].category, "number");
    }

    #[test]
    fn empty_pattern_rows_are_silently_skipped() {
        let (store, warnings) = csv_store(
            "category,pattern,confidence,description\n\
             a,,0.5,empty\n\
             b,\\d+,0.5,ok\n",
        );
        assert!(warnings.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalid_regex_warns_with_row_index() {
        let (store, warnings) = csv_store(
            "category,pattern,confidence,description\n\
             a,(unclosed,0.5,bad\n\
             b,\\d+,0.5,good\n",
        );
        assert_eq!(store.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].row, 1);
        assert!(warnings[0].message.contains("invalid regex"));
    }

    #[test]
    fn bad_confidence_warns_and_skips() {
        let (store, warnings) = csv_store(
            "category,pattern,confidence,description\n\
             a,\\d+,high,bad\n\
             b,\\d+,1.5,out of range\n\
             c,\\d+,0.7,ok\n",
        );
        assert_eq!(store.len(), 1);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].row, 1);
        assert_eq!(warnings[1].row, 2);
    }

    #[test]
    fn rules_are_case_sensitive_by_default() {
        let (store, _) = csv_store(
            "category,pattern,confidence,description\n\
             org,Ministry,0.8,org\n\
             org2,(?i)ministry,0.8,org ci\n",
        );
        assert!(!store.rules()[0].regex.is_match("ministry"));
        assert!(store.rules()[1].regex.is_match("MINISTRY"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(PatternStore::load("/nonexistent/patterns.csv").is_err());
    }
}
