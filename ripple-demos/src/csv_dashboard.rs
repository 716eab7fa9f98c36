//! CSV Explorer
//!
//! Load a CSV (uploaded, or a generated sample), narrow it with per-column
//! filters, and look at it through a status line, a preview, the filtered
//! rows, a few KPIs and a histogram. The filtered rows can be exported.
//!
//! # Nodes
//!
//! ```text
//! upload ─┐
//!         ├─ source ── raw ──┬──────────── status, preview, filter_controls
//! sample_seed                └─ filtered ─┬─ filtered_view, kpis, download
//! filters ───────────────────────┘         └─ chart
//! chart_column ────────────────────────────────┘
//! ```

use chrono::{Days, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ripple_core::{
    Download, EvalError, Graph, GraphBuilder, Input, Memo, Output, Reads,
};
use serde::Serialize;

use crate::error::DemoError;
use crate::table::{Column, ColumnData, FilterSet, Histogram, Table};
use crate::{Upload, View};

/// Rows in the generated sample.
pub const SAMPLE_ROWS: usize = 50;
/// Upper bound on chart bins.
pub const MAX_CHART_BINS: usize = 30;
/// Rows shown by the preview.
pub const PREVIEW_ROWS: usize = 5;

const PROMPT: &str = "Upload a CSV file or load the sample data";

/// The sample CSV: daily dates from 2025-01-01, categories cycling A to D,
/// and integer values drawn from `[0, 100)` with `seed`.
pub fn sample_csv(seed: u64) -> Result<Vec<u8>, DemoError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();
    let dates = (0..SAMPLE_ROWS)
        .map(|i| start.checked_add_days(Days::new(i as u64)))
        .collect();
    let categories = (0..SAMPLE_ROWS)
        .map(|i| ["A", "B", "C", "D"][i % 4].to_string())
        .collect();
    let values = (0..SAMPLE_ROWS)
        .map(|_| Some(rng.gen_range(0..100) as f64))
        .collect();
    let table = Table::new(vec![
        Column::new("date", ColumnData::Date(dates)),
        Column::new("category", ColumnData::Text(categories)),
        Column::new("value", ColumnData::Numeric(values)),
    ])?;
    Ok(table.to_csv()?)
}

/// Where the current data came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

/// One sidebar widget, sized to the loaded data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterControl {
    Range { column: String, min: f64, max: f64 },
    Dates { column: String, start: NaiveDate, end: NaiveDate },
    Values { column: String, options: Vec<String> },
}

impl FilterControl {
    /// The control for a column, or `None` if the column has no values.
    pub fn for_column(column: &Column) -> Option<Self> {
        let name = column.name.clone();
        match &column.data {
            ColumnData::Numeric(_) => {
                let stats = column.data.stats()?;
                Some(FilterControl::Range {
                    column: name,
                    min: stats.min,
                    max: stats.max,
                })
            }
            ColumnData::Date(values) => {
                let start = values.iter().flatten().min().copied()?;
                let end = values.iter().flatten().max().copied()?;
                Some(FilterControl::Dates {
                    column: name,
                    start,
                    end,
                })
            }
            ColumnData::Text(values) => {
                let mut options: Vec<String> = Vec::new();
                for value in values {
                    if !options.contains(value) {
                        options.push(value.clone());
                    }
                }
                Some(FilterControl::Values {
                    column: name,
                    options,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub rows: usize,
    pub numeric_columns: usize,
    /// Sum of the first numeric column.
    pub first_numeric_sum: f64,
}

impl Kpis {
    /// `None` when the table has no numeric column.
    pub fn of(table: &Table) -> Option<Self> {
        let numeric = table.numeric_columns();
        let first = table.column(numeric.first()?)?;
        Some(Kpis {
            rows: table.len(),
            numeric_columns: numeric.len(),
            first_numeric_sum: first.data.stats().map_or(0.0, |stats| stats.sum),
        })
    }
}

/// The chart for `requested`, falling back to the first numeric column.
/// `None` when the table has no numeric column.
pub fn chart(table: &Table, requested: Option<&str>) -> Result<Option<Histogram>, EvalError> {
    let numeric = table.numeric_columns();
    let column = match requested {
        Some(name) if numeric.contains(&name) => name,
        _ => match numeric.first() {
            Some(first) => *first,
            None => return Ok(None),
        },
    };
    let present = table
        .column(column)
        .and_then(|c| c.data.numbers())
        .map_or(0, |values| values.len());
    let bins = present.clamp(1, MAX_CHART_BINS);
    Ok(Some(table.histogram(column, bins)?))
}

/// Handles to the explorer's nodes.
#[derive(Debug, Clone)]
pub struct CsvDashboard {
    pub graph: Graph,
    pub upload: Input<Option<Upload>>,
    pub sample_seed: Input<Option<u64>>,
    pub filters: Input<FilterSet>,
    pub chart_column: Input<Option<String>>,
    pub source: Memo<Option<Source>>,
    pub raw: Memo<Option<Table>>,
    pub filtered: Memo<Option<Table>>,
    pub status: Output<View<Shape>>,
    pub preview: Output<View<Table>>,
    pub filter_controls: Output<View<Vec<FilterControl>>>,
    pub filtered_view: Output<View<Table>>,
    pub kpis: Output<View<Option<Kpis>>>,
    pub chart: Output<View<Option<Histogram>>>,
    pub download: Download,
}

impl CsvDashboard {
    pub fn build() -> Result<Self, DemoError> {
        let mut builder = GraphBuilder::new();

        let upload = builder.input("upload", None::<Upload>)?;
        let sample_seed = builder.input("sample_seed", None::<u64>)?;
        let filters = builder.input("filters", FilterSet::new())?;
        let chart_column = builder.input("chart_column", None::<String>)?;

        // An upload wins over the sample.
        let source = builder.memo("source", &["upload", "sample_seed"], move |reads| {
            if let Some(file) = reads.get(upload)? {
                return Ok(Some(Source {
                    name: file.name.clone(),
                    bytes: file.bytes.clone(),
                }));
            }
            match reads.get(sample_seed)? {
                Some(seed) => Ok(Some(Source {
                    name: "sample.csv".into(),
                    bytes: sample_csv(*seed).map_err(EvalError::from_display)?,
                })),
                None => Ok(None),
            }
        })?;

        let raw = builder.memo("raw", &["source"], move |reads| {
            reads
                .get(source)?
                .as_ref()
                .map(|source| Table::from_csv(&source.bytes))
                .transpose()
                .map_err(EvalError::from)
        })?;

        let filtered = builder.memo("filtered", &["raw", "filters"], move |reads| {
            let filters = reads.get(filters)?;
            reads
                .get(raw)?
                .as_ref()
                .map(|table| table.filter(&table.fitting(filters)))
                .transpose()
                .map_err(EvalError::from)
        })?;

        let status = builder.output("status", &["raw"], move |reads| {
            with_table(reads, raw, |table| Shape {
                rows: table.len(),
                columns: table.width(),
            })
        })?;

        let preview = builder.output("preview", &["raw"], move |reads| {
            with_table(reads, raw, |table| table.head(PREVIEW_ROWS))
        })?;

        let filter_controls = builder.output("filter_controls", &["raw"], move |reads| {
            with_table(reads, raw, |table| {
                table
                    .columns()
                    .iter()
                    .filter_map(FilterControl::for_column)
                    .collect()
            })
        })?;

        let filtered_view = builder.output("filtered_view", &["filtered"], move |reads| {
            with_table(reads, filtered, Table::clone)
        })?;

        let kpis = builder.output("kpis", &["filtered"], move |reads| {
            with_table(reads, filtered, Kpis::of)
        })?;

        let chart = builder.output("chart", &["filtered", "chart_column"], move |reads| {
            let requested = reads.get(chart_column)?.as_deref();
            match reads.get(filtered)? {
                Some(table) => Ok(View::ready(self::chart(table, requested)?)),
                None => Ok(View::prompt(PROMPT)),
            }
        })?;

        let download = builder.download(
            "download",
            "filtered.csv",
            "text/csv",
            &["filtered"],
            move |reads| match reads.get(filtered)? {
                Some(table) => Ok(table.clone().into_csv_chunks(1000)),
                None => Err(EvalError::failed("nothing to download: no data loaded")),
            },
        )?;

        Ok(Self {
            graph: builder.build()?,
            upload,
            sample_seed,
            filters,
            chart_column,
            source,
            raw,
            filtered,
            status,
            preview,
            filter_controls,
            filtered_view,
            kpis,
            chart,
            download,
        })
    }
}

/// Render `f(table)` when data is loaded, the prompt otherwise.
fn with_table<T>(
    reads: &Reads<'_>,
    table: Memo<Option<Table>>,
    f: impl FnOnce(&Table) -> T,
) -> Result<View<T>, EvalError> {
    Ok(match reads.get(table)? {
        Some(table) => View::ready(f(table)),
        None => View::prompt(PROMPT),
    })
}
