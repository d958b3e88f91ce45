//! Column detection for heterogeneous spreadsheet exports.
//!
//! Every source goes through the same ranked resolution: caller override first,
//! then the configured candidates in priority order (exact name before substring),
//! then an explicit fallback that is reported rather than guessed silently.

use crate::error::{ReconciliationError, Result};
use crate::period::Period;
use crate::report::ParseWarning;
use crate::schema::{ReconciliationConfig, SourceKind, SourceOverrides, TableLayout};
use crate::utils::{contains_month_word, parse_period_header};
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub index: usize,
    pub name: String,
}

/// How the key column was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyMatch {
    Override,
    Token(String),
    /// Nothing matched; the first column was taken. Low confidence.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodColumn {
    pub index: usize,
    pub name: String,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub source: SourceKind,
    pub layout: TableLayout,
    pub key_column: ColumnRef,
    pub key_match: KeyMatch,
    /// Parsed month columns in original column order. Empty for long tables.
    pub period_columns: Vec<PeriodColumn>,
    pub date_column: Option<ColumnRef>,
    pub quantity_column: Option<ColumnRef>,
    pub warnings: Vec<ParseWarning>,
}

pub struct ColumnClassifier {
    key_tokens: Vec<String>,
    period_pattern: Regex,
    quantity_candidates: Vec<String>,
    date_candidates: Vec<String>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn find_exact(columns: &[String], name: &str) -> Option<usize> {
    let wanted = normalize_name(name);
    columns.iter().position(|c| normalize_name(c) == wanted)
}

/// Ranked resolution: an exact (case-insensitive) name match on any candidate beats
/// a substring match; within each pass candidates are tried in priority order.
fn resolve_candidate(columns: &[String], candidates: &[String], exclude: &[usize]) -> Option<usize> {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_name(c)).collect();
    let usable = |idx: &usize| !exclude.contains(idx);

    for candidate in candidates {
        let wanted = normalize_name(candidate);
        if wanted.is_empty() {
            continue;
        }
        if let Some(idx) = (0..columns.len()).filter(usable).find(|&i| normalized[i] == wanted) {
            return Some(idx);
        }
    }

    for candidate in candidates {
        let wanted = normalize_name(candidate);
        if wanted.is_empty() {
            continue;
        }
        if let Some(idx) = (0..columns.len())
            .filter(usable)
            .find(|&i| normalized[i].contains(&wanted))
        {
            return Some(idx);
        }
    }

    None
}

impl ColumnClassifier {
    pub fn new(config: &ReconciliationConfig) -> Result<Self> {
        Ok(Self {
            key_tokens: config
                .key_column_tokens
                .iter()
                .map(|t| normalize_name(t))
                .filter(|t| !t.is_empty())
                .collect(),
            period_pattern: Regex::new(&config.period_header_pattern)?,
            quantity_candidates: config.quantity_column_candidates.clone(),
            date_candidates: config.date_column_candidates.clone(),
        })
    }

    pub fn classify(&self, source: SourceKind, columns: &[String]) -> Result<Classification> {
        self.classify_with_overrides(source, columns, &SourceOverrides::default())
    }

    pub fn classify_with_overrides(
        &self,
        source: SourceKind,
        columns: &[String],
        overrides: &SourceOverrides,
    ) -> Result<Classification> {
        if columns.is_empty() {
            return Err(ReconciliationError::schema(
                source.name(),
                "table has no columns",
                columns,
            ));
        }

        let mut warnings = Vec::new();
        let (key_index, key_match) = self.resolve_key(source, columns, overrides)?;
        if key_match == KeyMatch::Fallback {
            warn!(
                "{}: no key token matched columns {:?}, using first column '{}'",
                source, columns, columns[key_index]
            );
            warnings.push(ParseWarning::KeyColumnFallback {
                source,
                column: columns[key_index].clone(),
            });
        }
        let key_column = ColumnRef {
            index: key_index,
            name: columns[key_index].clone(),
        };

        let (period_columns, header_warnings) = self.detect_period_columns(source, columns, key_index);

        let layout = overrides.layout.unwrap_or(if period_columns.is_empty() {
            TableLayout::Long
        } else {
            TableLayout::Wide
        });

        let classification = match layout {
            TableLayout::Wide => {
                if period_columns.is_empty() {
                    return Err(ReconciliationError::schema(
                        source.name(),
                        "wide layout requested but no month columns were found",
                        columns,
                    ));
                }
                warnings.extend(header_warnings);
                Classification {
                    source,
                    layout,
                    key_column,
                    key_match,
                    period_columns,
                    date_column: None,
                    quantity_column: None,
                    warnings,
                }
            }
            TableLayout::Long => {
                let (date_column, quantity_column) =
                    self.resolve_long_columns(source, columns, key_index, overrides)?;
                Classification {
                    source,
                    layout,
                    key_column,
                    key_match,
                    period_columns: Vec::new(),
                    date_column: Some(date_column),
                    quantity_column: Some(quantity_column),
                    warnings,
                }
            }
        };

        debug!(
            "{}: layout {:?}, key '{}' ({:?}), {} period column(s), date {:?}, quantity {:?}",
            source,
            classification.layout,
            classification.key_column.name,
            classification.key_match,
            classification.period_columns.len(),
            classification.date_column.as_ref().map(|c| &c.name),
            classification.quantity_column.as_ref().map(|c| &c.name),
        );

        Ok(classification)
    }

    fn resolve_key(
        &self,
        source: SourceKind,
        columns: &[String],
        overrides: &SourceOverrides,
    ) -> Result<(usize, KeyMatch)> {
        if let Some(name) = &overrides.key_column {
            let idx = find_exact(columns, name).ok_or_else(|| {
                ReconciliationError::schema(
                    source.name(),
                    format!("key column override '{}' not found", name),
                    columns,
                )
            })?;
            return Ok((idx, KeyMatch::Override));
        }

        let normalized: Vec<String> = columns.iter().map(|c| normalize_name(c)).collect();
        for token in &self.key_tokens {
            let exact = normalized.iter().position(|c| c == token);
            let partial = || normalized.iter().position(|c| c.contains(token.as_str()));
            if let Some(idx) = exact.or_else(partial) {
                return Ok((idx, KeyMatch::Token(token.clone())));
            }
        }

        Ok((0, KeyMatch::Fallback))
    }

    fn is_period_header(&self, name: &str) -> bool {
        self.period_pattern.is_match(name) || contains_month_word(name)
    }

    fn detect_period_columns(
        &self,
        source: SourceKind,
        columns: &[String],
        key_index: usize,
    ) -> (Vec<PeriodColumn>, Vec<ParseWarning>) {
        let mut period_columns = Vec::new();
        let mut warnings = Vec::new();

        for (index, name) in columns.iter().enumerate() {
            if index == key_index || !self.is_period_header(name) {
                continue;
            }
            match parse_period_header(name) {
                Some(period) => period_columns.push(PeriodColumn {
                    index,
                    name: name.clone(),
                    period,
                }),
                None => {
                    debug!("{}: header '{}' looks like a month but has no parseable period", source, name);
                    warnings.push(ParseWarning::UnparseablePeriodHeader {
                        source,
                        column: name.clone(),
                    });
                }
            }
        }

        (period_columns, warnings)
    }

    fn resolve_long_columns(
        &self,
        source: SourceKind,
        columns: &[String],
        key_index: usize,
        overrides: &SourceOverrides,
    ) -> Result<(ColumnRef, ColumnRef)> {
        let date_index = match &overrides.date_column {
            Some(name) => Some(find_exact(columns, name).ok_or_else(|| {
                ReconciliationError::schema(
                    source.name(),
                    format!("date column override '{}' not found", name),
                    columns,
                )
            })?),
            None => resolve_candidate(columns, &self.date_candidates, &[key_index]),
        };

        let mut taken = vec![key_index];
        taken.extend(date_index);

        let quantity_index = match &overrides.quantity_column {
            Some(name) => Some(find_exact(columns, name).ok_or_else(|| {
                ReconciliationError::schema(
                    source.name(),
                    format!("quantity column override '{}' not found", name),
                    columns,
                )
            })?),
            None => resolve_candidate(columns, &self.quantity_candidates, &taken),
        };

        match (date_index, quantity_index) {
            (Some(d), Some(q)) => Ok((
                ColumnRef {
                    index: d,
                    name: columns[d].clone(),
                },
                ColumnRef {
                    index: q,
                    name: columns[q].clone(),
                },
            )),
            (None, Some(_)) => Err(ReconciliationError::schema(
                source.name(),
                format!(
                    "no month columns and no date column (tried {:?})",
                    self.date_candidates
                ),
                columns,
            )),
            (Some(_), None) => Err(ReconciliationError::schema(
                source.name(),
                format!(
                    "no quantity column (tried {:?})",
                    self.quantity_candidates
                ),
                columns,
            )),
            (None, None) => Err(ReconciliationError::schema(
                source.name(),
                format!(
                    "no month columns, no date column (tried {:?}) and no quantity column (tried {:?})",
                    self.date_candidates, self.quantity_candidates
                ),
                columns,
            )),
        }
    }
}
