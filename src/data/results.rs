//! Result tables: per-misuse classification of detector findings.
//!
//! `result.csv` has one row per evaluated misuse plus one row per unmatched
//! finding:
//!
//! ```text
//! detector,project,version,misuse,classification,finding
//! DMMC,jodatime,1,mu1,TP,pattern-3
//! DMMC,jodatime,1,mu2,FN,
//! DMMC,jodatime,1,,FP,pattern-9
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DataError;

/// Name of the per-version result table.
pub const RESULT_FILE: &str = "result.csv";

/// Name of a human-reviewed result table overriding computed rows.
pub const REVIEWED_RESULT_FILE: &str = "reviewed-result.csv";

/// Column header of every result table.
pub const HEADER: [&str; 6] = [
    "detector",
    "project",
    "version",
    "misuse",
    "classification",
    "finding",
];

/// Evaluation verdict of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    #[serde(rename = "TP")]
    TruePositive,
    #[serde(rename = "FP")]
    FalsePositive,
    #[serde(rename = "FN")]
    FalseNegative,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::TruePositive => write!(f, "TP"),
            Classification::FalsePositive => write!(f, "FP"),
            Classification::FalseNegative => write!(f, "FN"),
        }
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TP" => Ok(Classification::TruePositive),
            "FP" => Ok(Classification::FalsePositive),
            "FN" => Ok(Classification::FalseNegative),
            other => Err(format!("unknown classification '{}'", other)),
        }
    }
}

/// One decision of a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub detector: String,
    pub project: String,
    pub version: String,
    /// Misuse id; empty for a finding that matched no misuse.
    pub misuse: String,
    pub classification: Classification,
    /// Matched finding id; empty for a false negative.
    pub finding: String,
}

impl ResultRow {
    /// Identity used to match reviewed rows against computed ones.
    pub fn key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.detector,
            &self.project,
            &self.version,
            &self.misuse,
            &self.finding,
        )
    }

    fn fields(&self) -> [String; 6] {
        [
            self.detector.clone(),
            self.project.clone(),
            self.version.clone(),
            self.misuse.clone(),
            self.classification.to_string(),
            self.finding.clone(),
        ]
    }
}

/// Renders rows as CSV, header included.
pub fn to_csv(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    out.push_str(&HEADER.join(","));
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = row.fields().iter().map(|f| escape(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Parses a result table. `path` is only used in error messages.
pub fn parse_csv(content: &str, path: &Path) -> Result<Vec<ResultRow>, DataError> {
    let malformed = |record: usize, reason: String| DataError::MalformedTable {
        path: path.to_path_buf(),
        record,
        reason,
    };

    let records = split_records(content).map_err(|reason| malformed(0, reason))?;
    let mut records = records.into_iter().enumerate();

    match records.next() {
        None => return Ok(Vec::new()),
        Some((_, header)) if header.iter().map(String::as_str).eq(HEADER) => {}
        Some((_, header)) => {
            return Err(malformed(1, format!("unexpected header {:?}", header)));
        }
    }

    let mut rows = Vec::new();
    for (index, record) in records {
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        let [detector, project, version, misuse, classification, finding]: [String; 6] = record
            .try_into()
            .map_err(|r: Vec<String>| malformed(index + 1, format!("expected 6 fields, got {}", r.len())))?;
        let classification = classification
            .parse()
            .map_err(|reason| malformed(index + 1, reason))?;
        rows.push(ResultRow {
            detector,
            project,
            version,
            misuse,
            classification,
            finding,
        });
    }
    Ok(rows)
}

/// Reads a result table; a missing file yields no rows.
pub fn read_result_table(path: &Path) -> Result<Vec<ResultRow>, DataError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    parse_csv(&content, path)
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_records(content: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(misuse: &str, classification: Classification, finding: &str) -> ResultRow {
        ResultRow {
            detector: "d".to_string(),
            project: "p".to_string(),
            version: "1".to_string(),
            misuse: misuse.to_string(),
            classification,
            finding: finding.to_string(),
        }
    }

    #[test]
    fn test_to_csv() {
        let csv = to_csv(&[
            row("p.1.m1", Classification::TruePositive, "f1"),
            row("", Classification::FalsePositive, "has,comma"),
        ]);
        assert_eq!(
            csv,
            "detector,project,version,misuse,classification,finding\n\
             d,p,1,p.1.m1,TP,f1\n\
             d,p,1,,FP,\"has,comma\"\n"
        );
    }

    #[test]
    fn test_parse_quoted_fields() {
        let content = "detector,project,version,misuse,classification,finding\n\
                       d,p,1,m,FP,\"say \"\"hi\"\", twice\"\r\n";
        let rows = parse_csv(content, Path::new("result.csv")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finding, "say \"hi\", twice");
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let err = parse_csv("a,b\n", Path::new("result.csv")).unwrap_err();
        assert!(matches!(err, DataError::MalformedTable { record: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_short_row() {
        let content = "detector,project,version,misuse,classification,finding\nd,p,1\n";
        let err = parse_csv(content, Path::new("result.csv")).unwrap_err();
        assert!(err.to_string().contains("expected 6 fields"));
    }

    #[test]
    fn test_empty_and_missing_tables() {
        assert!(parse_csv("", Path::new("x")).unwrap().is_empty());
        let temp = tempfile::TempDir::new().unwrap();
        assert!(read_result_table(&temp.path().join(RESULT_FILE))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_classification_from_str() {
        assert_eq!("tp".parse::<Classification>().unwrap(), Classification::TruePositive);
        assert!("XX".parse::<Classification>().is_err());
    }
}
