//! Descriptive statistics of a raw customer dataset

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0 for fewer than two values
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    /// Cells holding a value
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub value_counts: BTreeMap<String, usize>,
    pub unique_values: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_customers: usize,
    pub columns: Vec<String>,
    pub numeric_columns: BTreeMap<String, NumericSummary>,
    pub categorical_columns: BTreeMap<String, CategoricalSummary>,
}

fn summarize_numeric(series: &Series) -> crate::Result<Option<NumericSummary>> {
    let cast = series.cast(&DataType::Float64)?;
    let values = cast.f64()?;
    let count = values.len() - values.null_count();
    let (Some(mean), Some(median), Some(min), Some(max)) =
        (values.mean(), values.median(), values.min(), values.max())
    else {
        return Ok(None);
    };

    let quartile = |q: f64| -> crate::Result<f64> {
        Ok(values
            .quantile(q, QuantileInterpolOptions::Linear)?
            .unwrap_or(median))
    };

    Ok(Some(NumericSummary {
        mean,
        median,
        std: if count > 1 { values.std(1).unwrap_or(0.0) } else { 0.0 },
        min,
        max,
        q25: quartile(0.25)?,
        q75: quartile(0.75)?,
        count,
    }))
}

fn summarize_categorical(df: &DataFrame, name: &str) -> crate::Result<CategoricalSummary> {
    let counts = df
        .clone()
        .lazy()
        .select([col(name)])
        .filter(col(name).is_not_null())
        .group_by([col(name)])
        .agg([len().alias("n_customers")])
        .collect()?;

    let totals = counts.column("n_customers")?.cast(&DataType::UInt64)?;
    let value_counts: BTreeMap<String, usize> = counts
        .column(name)?
        .str()?
        .into_iter()
        .zip(totals.u64()?.into_iter())
        .filter_map(|(value, count)| Some((value?.to_string(), count? as usize)))
        .collect();

    Ok(CategoricalSummary {
        unique_values: value_counts.len(),
        value_counts,
    })
}

/// Summarize every numeric and string column of `df`
pub fn summarize(df: &DataFrame) -> crate::Result<DataSummary> {
    let mut numeric_columns = BTreeMap::new();
    let mut categorical_columns = BTreeMap::new();

    for series in df.get_columns() {
        let name = series.name().to_string();
        if series.dtype().is_numeric() {
            if let Some(summary) = summarize_numeric(series)? {
                numeric_columns.insert(name, summary);
            }
        } else if series.dtype() == &DataType::String {
            let summary = summarize_categorical(df, &name)?;
            categorical_columns.insert(name, summary);
        }
    }

    Ok(DataSummary {
        total_customers: df.height(),
        columns: df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        numeric_columns,
        categorical_columns,
    })
}
