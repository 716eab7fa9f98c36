//! Visualization demo: a histogram, a continent-filtered table and an upload
//! preview over a fixed, seeded dataset.

use std::f64::consts::TAU;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ripple_core::{Download, EvalError, Graph, GraphBuilder, Input, Memo, Output};
use serde::Serialize;

use crate::error::DemoError;
use crate::table::{Column, ColumnData, ColumnFilter, FilterSet, Histogram, Table};
use crate::Upload;

pub const DATASET_ROWS: usize = 1000;
pub const DATASET_SEED: u64 = 42;
pub const CONTINENTS: [&str; 5] = ["Africa", "Americas", "Asia", "Europe", "Oceania"];
/// Columns the histogram can show.
pub const VALUE_COLUMNS: [&str; 3] = ["lifeExp", "gdpPercap", "pop"];
pub const BIN_RANGE: std::ops::RangeInclusive<u32> = 5..=50;

/// Standard normal sample (Box-Muller).
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// The demo dataset. Identical for a given seed.
pub fn dataset(seed: u64) -> Result<Table, DemoError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let life_exp = (0..DATASET_ROWS)
        .map(|_| Some(((72.0 + 10.0 * standard_normal(&mut rng)) * 10.0).round() / 10.0))
        .collect();
    let gdp = (0..DATASET_ROWS)
        .map(|_| Some((10.0 + standard_normal(&mut rng)).exp().round()))
        .collect();
    let pop = (0..DATASET_ROWS)
        .map(|_| Some(rng.gen_range(100_000_i64..100_000_000) as f64))
        .collect();
    let continent = (0..DATASET_ROWS)
        .map(|_| CONTINENTS[rng.gen_range(0..CONTINENTS.len())].to_string())
        .collect();
    Ok(Table::new(vec![
        Column::new("lifeExp", ColumnData::Numeric(life_exp)),
        Column::new("gdpPercap", ColumnData::Numeric(gdp)),
        Column::new("pop", ColumnData::Numeric(pop)),
        Column::new("continent", ColumnData::Text(continent)),
    ])?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plot {
    pub title: String,
    pub histogram: Histogram,
}

/// Rows of `continent`, or all rows for `"All"`.
pub fn by_continent(table: &Table, continent: &str) -> Result<Table, EvalError> {
    if continent == "All" {
        return Ok(table.clone());
    }
    if !CONTINENTS.contains(&continent) {
        return Err(EvalError::failed(format!("unknown continent `{continent}`")));
    }
    let mut filters = FilterSet::new();
    filters.insert(
        "continent".into(),
        ColumnFilter::Values {
            values: vec![continent.to_string()],
        },
    );
    Ok(table.filter(&filters)?)
}

pub fn plot(table: &Table, column: &str, bins: u32) -> Result<Plot, EvalError> {
    if !BIN_RANGE.contains(&bins) {
        return Err(EvalError::failed(format!(
            "bins must be between {} and {}, got {bins}",
            BIN_RANGE.start(),
            BIN_RANGE.end()
        )));
    }
    if !VALUE_COLUMNS.contains(&column) {
        return Err(EvalError::failed(format!("cannot plot column `{column}`")));
    }
    Ok(Plot {
        title: format!("{column} distribution"),
        histogram: table.histogram(column, bins as usize)?,
    })
}

/// Handles to the demo's nodes.
#[derive(Debug, Clone)]
pub struct Viz {
    pub graph: Graph,
    pub bins: Input<u32>,
    pub col: Input<String>,
    pub continent: Input<String>,
    pub file: Input<Option<Upload>>,
    pub filtered: Memo<Table>,
    pub uploaded: Memo<Option<Table>>,
    pub hist: Output<Plot>,
    pub tbl: Output<Table>,
    pub preview: Output<Table>,
    pub dl: Download,
}

impl Viz {
    pub fn build() -> Result<Self, DemoError> {
        let data = Arc::new(dataset(DATASET_SEED)?);
        let mut builder = GraphBuilder::new();

        let bins = builder.input("bins", 20_u32)?;
        let col = builder.input("col", "lifeExp".to_string())?;
        let continent = builder.input("continent", "All".to_string())?;
        let file = builder.input("file", None::<Upload>)?;

        let hist = {
            let data = Arc::clone(&data);
            builder.output("hist", &["bins", "col"], move |reads| {
                plot(&data, reads.get(col)?, *reads.get(bins)?)
            })?
        };

        let filtered = builder.memo("filtered", &["continent"], move |reads| {
            by_continent(&data, reads.get(continent)?)
        })?;

        let tbl = builder.output("tbl", &["filtered"], move |reads| {
            Ok(reads.get(filtered)?.clone())
        })?;

        let uploaded = builder.memo("uploaded", &["file"], move |reads| {
            reads
                .get(file)?
                .as_ref()
                .map(|upload| Table::from_csv(&upload.bytes))
                .transpose()
                .map_err(EvalError::from)
        })?;

        let preview = builder.output("preview", &["uploaded"], move |reads| {
            Ok(reads.get(uploaded)?.clone().unwrap_or_default())
        })?;

        let dl = builder.download(
            "dl",
            "filtered.csv",
            "text/csv",
            &["filtered"],
            move |reads| Ok(reads.get(filtered)?.clone().into_csv_chunks(1000)),
        )?;

        Ok(Self {
            graph: builder.build()?,
            bins,
            col,
            continent,
            file,
            filtered,
            uploaded,
            hist,
            tbl,
            preview,
            dl,
        })
    }
}
