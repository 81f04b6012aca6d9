//! Extract parser: provenance header, delimiter detection, typed rows.

use std::io::{BufRead, BufReader};

use indexmap::IndexMap;

use super::outcome::LoadError;
use super::provenance::{self, ProvenanceMetadata};
use super::source::{SourceDescriptor, SourceRecord, SourceTable};
use crate::schema::FieldValue;

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// A successfully parsed extract.
#[derive(Debug, Clone)]
pub struct ParsedExtract {
    pub table: SourceTable,
    pub provenance: Option<ProvenanceMetadata>,
    /// Rows dropped because their key cell was empty.
    pub unkeyed_rows: usize,
}

/// Parses one extract against its descriptor.
pub struct Parser<'a> {
    descriptor: &'a SourceDescriptor,
    organizations: &'a IndexMap<String, String>,
}

impl<'a> Parser<'a> {
    pub fn new(descriptor: &'a SourceDescriptor, organizations: &'a IndexMap<String, String>) -> Self {
        Self {
            descriptor,
            organizations,
        }
    }

    /// Parse the raw bytes of an extract.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ParsedExtract, LoadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LoadError::corrupt(format!("not valid UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let (provenance, body) = if self.descriptor.provenance {
            self.split_provenance(text)?
        } else {
            (None, text)
        };

        if body.trim().is_empty() {
            return Err(LoadError::EmptyResource);
        }

        let delimiter = match self.descriptor.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            Some(c) => return Err(LoadError::corrupt(format!("delimiter '{}' is not ASCII", c))),
            None => detect_delimiter(body.as_bytes()),
        };

        let (table, unkeyed_rows) = self.parse_rows(body, delimiter)?;
        Ok(ParsedExtract {
            table,
            provenance,
            unkeyed_rows,
        })
    }

    fn split_provenance<'t>(&self, text: &'t str) -> Result<(Option<ProvenanceMetadata>, &'t str), LoadError> {
        let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
        match provenance::parse_header(first, self.organizations) {
            Ok(Some(metadata)) => Ok((Some(metadata), rest)),
            Ok(None) => {
                log::debug!("source '{}' has no provenance header", self.descriptor.name);
                Ok((None, text))
            }
            Err(reason) => Err(LoadError::corrupt(reason)),
        }
    }

    fn parse_rows(&self, body: &str, delimiter: u8) -> Result<(SourceTable, usize), LoadError> {
        let descriptor = self.descriptor;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| LoadError::corrupt(format!("unreadable header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let position = |column: &str| headers.iter().position(|h| h == column.trim());

        let key_index = position(&descriptor.key_column).ok_or_else(|| {
            LoadError::corrupt(format!("missing key column '{}'", descriptor.key_column))
        })?;

        let filter_index = match &descriptor.filter {
            Some(filter) => Some(position(&filter.column).ok_or_else(|| {
                LoadError::corrupt(format!("missing filter column '{}'", filter.column))
            })?),
            None => None,
        };

        let mut field_indices = Vec::with_capacity(descriptor.fields.len());
        for spec in &descriptor.fields.fields {
            let index = position(&spec.column);
            if index.is_none() {
                if spec.required {
                    return Err(LoadError::corrupt(format!(
                        "missing required column '{}'",
                        spec.column
                    )));
                }
                log::warn!(
                    "source '{}' has no column '{}'; field '{}' will be null",
                    descriptor.name,
                    spec.column,
                    spec.output_name()
                );
            }
            field_indices.push(index);
        }

        let mut rows = Vec::new();
        let mut total_rows = 0usize;
        let mut unkeyed_rows = 0usize;

        for (row_idx, result) in reader.records().enumerate() {
            let record =
                result.map_err(|e| LoadError::corrupt(format!("data row {}: {}", row_idx + 1, e)))?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            total_rows += 1;

            if let (Some(index), Some(filter)) = (filter_index, &descriptor.filter) {
                if record.get(index).map(str::trim) != Some(filter.value.trim()) {
                    continue;
                }
            }

            let key = record.get(key_index).unwrap_or("").trim();
            if descriptor.is_null_value(key) {
                unkeyed_rows += 1;
                continue;
            }

            let mut values = IndexMap::with_capacity(field_indices.len());
            for (spec, index) in descriptor.fields.fields.iter().zip(&field_indices) {
                let cell = index.and_then(|i| record.get(i)).unwrap_or("");
                let value = if descriptor.is_null_value(cell) {
                    FieldValue::Null
                } else {
                    spec.field_type.parse(cell).map_err(|reason| {
                        LoadError::corrupt(format!(
                            "data row {}, column '{}': {}",
                            row_idx + 1,
                            spec.column,
                            reason
                        ))
                    })?
                };
                values.insert(spec.output_name().to_string(), value);
            }

            rows.push(SourceRecord {
                key: key.to_string(),
                values,
            });
        }

        if total_rows == 0 {
            return Err(LoadError::EmptyResource);
        }
        if rows.is_empty() {
            return Err(match &descriptor.filter {
                Some(filter) if unkeyed_rows == 0 => LoadError::FilterNoMatch {
                    column: filter.column.clone(),
                    value: filter.value.clone(),
                },
                _ => LoadError::EmptyResource,
            });
        }
        if unkeyed_rows > 0 {
            log::warn!(
                "source '{}': {} row(s) without a '{}' value were skipped",
                descriptor.name,
                unkeyed_rows,
                descriptor.key_column
            );
        }

        let table = SourceTable {
            source: descriptor.name.clone(),
            fields: descriptor
                .fields
                .output_names()
                .into_iter()
                .map(String::from)
                .collect(),
            rows,
        };
        Ok((table, unkeyed_rows))
    }
}

/// Detect the delimiter by analyzing the first few lines.
///
/// Prefers the candidate that appears the same non-zero number of times on
/// every line; falls back to a comma.
pub fn detect_delimiter(bytes: &[u8]) -> u8 {
    let reader = BufReader::new(bytes);
    let lines: Vec<String> = reader
        .lines()
        .take(10)
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delim))
            .collect();

        let Some(&first_count) = counts.first() else {
            continue;
        };
        if first_count == 0 {
            continue;
        }

        let consistent = counts.iter().all(|&c| c == first_count);
        let score = if consistent {
            first_count * 1000 + if delim == b'\t' { 100 } else { 0 }
        } else {
            first_count
        };

        if score > best_score {
            best_score = score;
            best_delimiter = delim;
        }
    }

    best_delimiter
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delim_char = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim_char && !in_quotes => count += 1,
            _ => {}
        }
    }

    count
}
