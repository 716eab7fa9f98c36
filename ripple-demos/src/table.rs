//! Column-oriented tables.
//!
//! Just enough of a data frame for the demos: CSV parsing with per-column
//! type inference, row selection, filters, histograms and lazy CSV export.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveDate;
use ripple_core::{ChunkStream, EvalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format used to recognize and write date columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no header row")]
    NoHeader,

    #[error("column `{column}` has {actual} rows, expected {expected}")]
    Ragged {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{0}` is not numeric")]
    NotNumeric(String),

    #[error("a histogram needs at least one bin")]
    NoBins,

    #[error("filter on `{column}` does not fit its {kind} values")]
    FilterMismatch { column: String, kind: &'static str },

    #[error("row mask has {actual} entries for {expected} rows")]
    MaskLength { expected: usize, actual: usize },
}

impl From<TableError> for EvalError {
    fn from(error: TableError) -> Self {
        EvalError::from_display(error)
    }
}

/// Values of one column. Missing numeric and date cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Date(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Date(_) => "date",
            ColumnData::Text(_) => "text",
        }
    }

    /// Present numeric values, skipping missing cells.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        match self {
            ColumnData::Numeric(values) => Some(values.iter().flatten().copied().collect()),
            _ => None,
        }
    }

    /// Min, max and sum of the present values of a numeric column.
    /// `None` for other columns and for columns with no values.
    pub fn stats(&self) -> Option<Stats> {
        let ColumnData::Numeric(values) = self else {
            return None;
        };
        let mut present = values.iter().flatten().copied();
        let first = present.next()?;
        Some(present.fold(
            Stats {
                count: 1,
                min: first,
                max: first,
                sum: first,
            },
            |stats, x| Stats {
                count: stats.count + 1,
                min: stats.min.min(x),
                max: stats.max.max(x),
                sum: stats.sum + x,
            },
        ))
    }

    /// The cell as written to CSV.
    pub fn cell(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(values) => values[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Date(values) => values[row]
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            ColumnData::Text(values) => values[row].clone(),
        }
    }

    fn select(&self, mask: &[bool]) -> ColumnData {
        fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(value, _)| value.clone())
                .collect()
        }
        match self {
            ColumnData::Numeric(values) => ColumnData::Numeric(keep(values, mask)),
            ColumnData::Date(values) => ColumnData::Date(keep(values, mask)),
            ColumnData::Text(values) => ColumnData::Text(keep(values, mask)),
        }
    }

    fn slice(&self, rows: Range<usize>) -> ColumnData {
        match self {
            ColumnData::Numeric(values) => ColumnData::Numeric(values[rows].to_vec()),
            ColumnData::Date(values) => ColumnData::Date(values[rows].to_vec()),
            ColumnData::Text(values) => ColumnData::Text(values[rows].to_vec()),
        }
    }

    /// Infer a column type from raw cells.
    ///
    /// Numeric if every non-empty cell parses as a number, date if every
    /// non-empty cell is a `YYYY-MM-DD` date, text otherwise. A column with
    /// no non-empty cells is text. `NaN` and infinite cells are missing.
    fn infer(cells: Vec<String>) -> ColumnData {
        let mut present = cells.iter().filter(|cell| !cell.is_empty()).peekable();
        if present.peek().is_none() {
            return ColumnData::Text(cells);
        }
        if present.clone().all(|cell| cell.parse::<f64>().is_ok()) {
            return ColumnData::Numeric(
                cells
                    .iter()
                    .map(|cell| cell.parse().ok().filter(|x: &f64| x.is_finite()))
                    .collect(),
            );
        }
        if present.all(|cell| NaiveDate::parse_from_str(cell, DATE_FORMAT).is_ok()) {
            return ColumnData::Date(
                cells
                    .iter()
                    .map(|cell| NaiveDate::parse_from_str(cell, DATE_FORMAT).ok())
                    .collect(),
            );
        }
        ColumnData::Text(cells)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }
}

/// A filter on one column. An empty value selection filters nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnFilter {
    /// Keep numbers in `[min, max]`.
    Range { min: f64, max: f64 },
    /// Keep dates in `[start, end]`.
    Dates { start: NaiveDate, end: NaiveDate },
    /// Keep text cells equal to one of `values`.
    Values { values: Vec<String> },
}

impl ColumnFilter {
    /// Whether the filter can apply to a column holding `data`.
    pub fn fits(&self, data: &ColumnData) -> bool {
        matches!(
            (self, data),
            (ColumnFilter::Range { .. }, ColumnData::Numeric(_))
                | (ColumnFilter::Dates { .. }, ColumnData::Date(_))
                | (ColumnFilter::Values { .. }, ColumnData::Text(_))
        )
    }
}

/// Filters keyed by column name.
pub type FilterSet = BTreeMap<String, ColumnFilter>;

/// Equal-width bin counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub column: String,
    /// `bins + 1` ascending edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width bins spanning their range.
    ///
    /// Every bin is half-open except the last, which includes the maximum.
    /// A constant sample is centered in a range of width one; an empty one
    /// spans `[0, 1]`. Non-finite values are skipped.
    pub fn new(column: impl Into<String>, values: &[f64], bins: usize) -> Result<Self, TableError> {
        if bins == 0 {
            return Err(TableError::NoBins);
        }
        let values: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
        let (mut lo, mut hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(*x), hi.max(*x))
            });
        if values.is_empty() {
            (lo, hi) = (0.0, 1.0);
        } else if lo == hi {
            (lo, hi) = (lo - 0.5, hi + 0.5);
        }
        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();

        let mut counts = vec![0; bins];
        for x in &values {
            let slot = (((x - lo) / width) as usize).min(bins - 1);
            counts[slot] += 1;
        }
        Ok(Self {
            column: column.into(),
            edges,
            counts,
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != expected) {
                return Err(TableError::Ragged {
                    column: bad.name.clone(),
                    expected,
                    actual: bad.data.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse CSV with a header row, inferring each column's type.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(String::is_empty) {
            return Err(TableError::NoHeader);
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (column, cell) in cells.iter_mut().zip(record.iter()) {
                column.push(cell.to_string());
            }
        }

        Self::new(
            headers
                .into_iter()
                .zip(cells)
                .map(|(name, cells)| Column::new(name, ColumnData::infer(cells)))
                .collect(),
        )
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let rows = 0..n.min(self.len());
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.slice(rows.clone())))
                .collect(),
        }
    }

    /// Rows whose mask entry is `true`.
    pub fn select(&self, mask: &[bool]) -> Result<Table, TableError> {
        if mask.len() != self.len() {
            return Err(TableError::MaskLength {
                expected: self.len(),
                actual: mask.len(),
            });
        }
        Ok(Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.select(mask)))
                .collect(),
        })
    }

    /// Rows passing every filter. Filters on absent columns are ignored;
    /// missing cells never pass a range filter.
    pub fn filter(&self, filters: &FilterSet) -> Result<Table, TableError> {
        let mut mask = vec![true; self.len()];
        for (name, filter) in filters {
            let Some(column) = self.column(name) else {
                continue;
            };
            match (filter, &column.data) {
                (ColumnFilter::Range { min, max }, ColumnData::Numeric(values)) => {
                    for (keep, value) in mask.iter_mut().zip(values) {
                        *keep &= value.is_some_and(|x| *min <= x && x <= *max);
                    }
                }
                (ColumnFilter::Dates { start, end }, ColumnData::Date(values)) => {
                    for (keep, value) in mask.iter_mut().zip(values) {
                        *keep &= value.is_some_and(|d| *start <= d && d <= *end);
                    }
                }
                (ColumnFilter::Values { values: wanted }, ColumnData::Text(values)) => {
                    if wanted.is_empty() {
                        continue;
                    }
                    for (keep, value) in mask.iter_mut().zip(values) {
                        *keep &= wanted.contains(value);
                    }
                }
                (_, data) => {
                    return Err(TableError::FilterMismatch {
                        column: name.clone(),
                        kind: data.kind(),
                    })
                }
            }
        }
        self.select(&mask)
    }

    /// The filters that fit this table's columns by name and kind.
    pub fn fitting(&self, filters: &FilterSet) -> FilterSet {
        filters
            .iter()
            .filter(|(name, filter)| {
                self.column(name)
                    .is_some_and(|column| filter.fits(&column.data))
            })
            .map(|(name, filter)| (name.clone(), filter.clone()))
            .collect()
    }

    /// Histogram of a numeric column, skipping missing cells.
    pub fn histogram(&self, name: &str, bins: usize) -> Result<Histogram, TableError> {
        let column = self
            .column(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        let values = column
            .data
            .numbers()
            .ok_or_else(|| TableError::NotNumeric(name.to_string()))?;
        Histogram::new(name, &values, bins)
    }

    /// Encode the whole table as CSV.
    pub fn to_csv(&self) -> Result<Vec<u8>, TableError> {
        self.encode(true, 0..self.len())
    }

    /// A lazy CSV export: the header, then `rows_per_chunk` rows per chunk.
    pub fn into_csv_chunks(self, rows_per_chunk: usize) -> ChunkStream {
        let rows_per_chunk = rows_per_chunk.max(1);
        let rows = self.len();
        let table = Arc::new(self);

        let header = {
            let table = Arc::clone(&table);
            std::iter::once_with(move || table.encode(true, 0..0).map_err(EvalError::from))
        };
        let body = (0..rows).step_by(rows_per_chunk).map(move |start| {
            let end = (start + rows_per_chunk).min(rows);
            table.encode(false, start..end).map_err(EvalError::from)
        });
        ChunkStream::new(header.chain(body))
    }

    fn encode(&self, header: bool, rows: Range<usize>) -> Result<Vec<u8>, TableError> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        if header {
            writer.write_record(self.names())?;
        }
        for row in rows {
            writer.write_record(self.columns.iter().map(|c| c.data.cell(row)))?;
        }
        writer
            .into_inner()
            .map_err(|e| TableError::Csv(csv::Error::from(e.into_error())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "date,category,value\n\
                          2025-01-01,A,10\n\
                          2025-01-02,B,\n\
                          2025-01-03,C,30.5\n";

    fn sample() -> Table {
        Table::from_csv(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn infers_column_types() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert_eq!(table.width(), 3);
        let kinds: Vec<&str> = table.columns().iter().map(|c| c.data.kind()).collect();
        assert_eq!(kinds, vec!["date", "text", "numeric"]);
        assert_eq!(
            table.column("value").unwrap().data,
            ColumnData::Numeric(vec![Some(10.0), None, Some(30.5)])
        );
        assert_eq!(table.numeric_columns(), vec!["value"]);
    }

    #[test]
    fn mixed_column_is_text() {
        let table = Table::from_csv(b"id\n1\ntwo\n").unwrap();
        assert_eq!(table.columns()[0].data.kind(), "text");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(matches!(
            Table::from_csv(b"a,b\n1,2\n3\n"),
            Err(TableError::Csv(_))
        ));
        assert!(matches!(Table::from_csv(b""), Err(TableError::NoHeader)));
    }

    #[test]
    fn csv_round_trips_cells() {
        let bytes = sample().to_csv().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), SAMPLE);
    }

    #[test]
    fn chunks_split_rows_after_header() {
        let chunks: Vec<Vec<u8>> = sample()
            .into_csv_chunks(2)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], b"date,category,value\n");
        assert_eq!(chunks[2], b"2025-01-03,C,30.5\n");
    }

    #[test]
    fn filters_combine() {
        let table = sample();
        let mut filters = FilterSet::new();
        filters.insert(
            "value".into(),
            ColumnFilter::Range {
                min: 0.0,
                max: 20.0,
            },
        );
        let filtered = table.filter(&filters).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.column("category").unwrap().data.cell(0), "A");

        let mut filters = FilterSet::new();
        filters.insert("category".into(), ColumnFilter::Values { values: vec![] });
        filters.insert(
            "date".into(),
            ColumnFilter::Dates {
                start: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            },
        );
        filters.insert("gone".into(), ColumnFilter::Values { values: vec!["x".into()] });
        assert_eq!(table.filter(&filters).unwrap().len(), 2);

        let mut filters = FilterSet::new();
        filters.insert("category".into(), ColumnFilter::Range { min: 0.0, max: 1.0 });
        assert!(matches!(
            table.filter(&filters),
            Err(TableError::FilterMismatch { kind: "text", .. })
        ));
    }

    #[test]
    fn histogram_closes_last_bin() {
        let h = Histogram::new("x", &[0.0, 1.0, 2.0, 3.0, 4.0], 4).unwrap();
        assert_eq!(h.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(h.counts, vec![1, 1, 1, 2]);
        assert_eq!(h.total(), 5);

        let constant = Histogram::new("x", &[7.0, 7.0], 2).unwrap();
        assert_eq!(constant.edges, vec![6.5, 7.0, 7.5]);
        assert_eq!(constant.counts, vec![0, 2]);

        assert!(matches!(Histogram::new("x", &[], 0), Err(TableError::NoBins)));
        assert!(matches!(
            sample().histogram("category", 5),
            Err(TableError::NotNumeric(_))
        ));
    }

    #[test]
    fn non_finite_cells_are_missing() {
        let table = Table::from_csv(b"x\n1\nNaN\ninf\n3\n").unwrap();
        let column = table.column("x").unwrap();
        assert!(column.is_numeric());
        assert_eq!(column.data.stats().unwrap().count, 2);

        let h = table.histogram("x", 2).unwrap();
        assert_eq!(h.edges, vec![1.0, 2.0, 3.0]);
        assert_eq!(h.counts, vec![1, 1]);

        let h = Histogram::new("x", &[0.0, f64::INFINITY, f64::NAN, 2.0], 2).unwrap();
        assert_eq!(h.edges, vec![0.0, 1.0, 2.0]);
        assert_eq!(h.total(), 2);
    }

    #[test]
    fn fitting_drops_filters_of_another_schema() {
        let table = sample();
        let mut filters = FilterSet::new();
        filters.insert("category".into(), ColumnFilter::Range { min: 0.0, max: 1.0 });
        filters.insert("value".into(), ColumnFilter::Range { min: 0.0, max: 20.0 });
        filters.insert("gone".into(), ColumnFilter::Values { values: vec![] });

        let fitting = table.fitting(&filters);
        assert_eq!(fitting.keys().collect::<Vec<_>>(), vec!["value"]);
        assert_eq!(table.filter(&fitting).unwrap().len(), 1);
    }

    #[test]
    fn stats_skip_missing_cells() {
        let table = Table::from_csv(b"n,t\n4,a\n,b\n-1,c\n7,d\n").unwrap();
        let stats = table.column("n").unwrap().data.stats().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!((stats.min, stats.max, stats.sum), (-1.0, 7.0, 10.0));
        assert_eq!(table.column("t").unwrap().data.stats(), None);
    }

    #[test]
    fn head_and_select() {
        let table = sample();
        assert_eq!(table.head(2).len(), 2);
        assert_eq!(table.head(10).len(), 3);
        assert!(matches!(
            table.select(&[true]),
            Err(TableError::MaskLength { .. })
        ));
    }
}
