//! Parse one free-text CBP-16 report into a flat key/value record
use crate::ReportError;

/// Diagnostic printed by some predictors in the middle of their report
const OVERFLOW_WARNING: &str = "Edge sequence list access window overflow!\n\n";
const BREAKDOWNS_MARKER: &str = "Breakdowns:";
const TOTAL_MARKER: &str = "(TOTAL";
/// Table header lines between `Breakdowns:` and the metrics line
const BREAKDOWNS_HEADER_LINES: usize = 5;

/// Metrics of a single trace run, in the order they appear in the report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRecord {
    fields: Vec<(String, String)>,
}

impl ReportRecord {
    /// Insert a metric, replacing an earlier value with the same name
    pub fn insert(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Reduce the raw report to the single line that carries the metrics.
///
/// The three layouts seen in the evaluation results are handled in order:
/// the overflow warning is always removed, then either everything after the
/// `Breakdowns:` header or everything after the `(TOTAL ...)` group is kept.
pub fn normalize(raw: &str) -> Result<String, ReportError> {
    let text = raw.replace(OVERFLOW_WARNING, " ");

    let payload = if let Some(index) = text.find(BREAKDOWNS_MARKER) {
        text[index..]
            .trim()
            .split('\n')
            // marker plus header, remaining lines joined by a space
            .skip(1 + BREAKDOWNS_HEADER_LINES)
            .collect::<Vec<&str>>()
            .join(" ")
    } else if let Some(index) = text.find(TOTAL_MARKER) {
        match text[index..].find(')') {
            Some(close) => text[index + close + 1..].trim().to_string(),
            None => {
                return Err(ReportError::UnclosedTotal {
                    content: text.trim().to_string(),
                });
            }
        }
    } else {
        text.trim().to_string()
    };

    let lines = payload.split('\n').count();
    if lines > 1 {
        return Err(ReportError::MultipleLines {
            lines,
            content: payload,
        });
    }
    Ok(payload)
}

/// Parse a whole report body.
///
/// Colons are dropped before tokenizing so that both `KEY: VALUE` and the
/// simulator's `KEY \t : VALUE` layout yield the same pairs. `TRACE` holds a
/// file path and is not kept.
pub fn parse_report(raw: &str) -> Result<ReportRecord, ReportError> {
    let line = normalize(raw)?;
    let cleaned = line.replace(':', "");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err(ReportError::OddTokens {
            count: tokens.len(),
            content: line,
        });
    }

    let mut record = ReportRecord::default();
    for pair in tokens.chunks_exact(2) {
        if pair[0] == "TRACE" {
            continue;
        }
        record.insert(pair[0].to_string(), pair[1].to_string());
    }
    Ok(record)
}
