//! Customer dataset loading and schema validation using Polars

use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SegmentationError;

/// Numeric attributes in clustering order
pub const NUMERIC_FEATURES: [&str; 7] = [
    "age",
    "income",
    "visits_per_month",
    "avg_time_spent",
    "purchase_frequency",
    "avg_order_value",
    "customer_lifetime_value",
];

/// Categorical attributes in clustering order
pub const CATEGORICAL_FEATURES: [&str; 2] = ["gender", "preferred_category"];

/// Name of the column appended to a segmented dataset
pub const SEGMENT_COLUMN: &str = "segment";

// Positions inside `NUMERIC_FEATURES`
pub const VISITS_PER_MONTH: usize = 2;
pub const AVG_TIME_SPENT: usize = 3;
pub const PURCHASE_FREQUENCY: usize = 4;
pub const AVG_ORDER_VALUE: usize = 5;
pub const CUSTOMER_LIFETIME_VALUE: usize = 6;

/// Stand-in category for null categorical cells
pub const MISSING_CATEGORY: &str = "unknown";

/// All columns a dataset must provide before segmentation
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    NUMERIC_FEATURES.iter().chain(CATEGORICAL_FEATURES.iter()).copied()
}

/// A single customer as received by the prediction boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub age: Option<f64>,
    pub income: Option<f64>,
    pub visits_per_month: Option<f64>,
    pub avg_time_spent: Option<f64>,
    pub purchase_frequency: Option<f64>,
    pub avg_order_value: Option<f64>,
    pub customer_lifetime_value: Option<f64>,
    pub gender: String,
    pub preferred_category: String,
}

impl CustomerRecord {
    /// Numeric attributes in `NUMERIC_FEATURES` order
    pub fn numeric_values(&self) -> [Option<f64>; 7] {
        [
            self.age,
            self.income,
            self.visits_per_month,
            self.avg_time_spent,
            self.purchase_frequency,
            self.avg_order_value,
            self.customer_lifetime_value,
        ]
    }

    /// Categorical attributes in `CATEGORICAL_FEATURES` order
    pub fn categorical_values(&self) -> [&str; 2] {
        [&self.gender, &self.preferred_category]
    }

    /// Build a record from a flat key/value map.
    ///
    /// Numeric keys may be absent or empty (imputed later); both categorical
    /// keys are mandatory.
    pub fn from_map(fields: &HashMap<String, String>) -> crate::Result<Self> {
        let missing: Vec<String> = CATEGORICAL_FEATURES
            .iter()
            .filter(|name| !fields.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SegmentationError::Schema(missing));
        }

        let mut numeric = [None; 7];
        for (slot, name) in numeric.iter_mut().zip(NUMERIC_FEATURES) {
            *slot = match fields.get(name).map(|v| v.trim()) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                    SegmentationError::InvalidValue {
                        column: name.to_string(),
                        message: format!("`{raw}` is not a number"),
                    }
                })?),
            };
        }

        Ok(Self {
            age: numeric[0],
            income: numeric[1],
            visits_per_month: numeric[2],
            avg_time_spent: numeric[3],
            purchase_frequency: numeric[4],
            avg_order_value: numeric[5],
            customer_lifetime_value: numeric[6],
            gender: fields["gender"].trim().to_string(),
            preferred_category: fields["preferred_category"].trim().to_string(),
        })
    }
}

/// Column-oriented view of a customer dataset restricted to the required attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerTable {
    /// One column per entry of `NUMERIC_FEATURES`; `None` marks a missing cell
    pub numeric: Vec<Vec<Option<f64>>>,
    /// One column per entry of `CATEGORICAL_FEATURES`
    pub categorical: Vec<Vec<String>>,
}

impl CustomerTable {
    /// Extract the required columns from a DataFrame, failing on any absent column
    pub fn from_dataframe(df: &DataFrame) -> crate::Result<Self> {
        validate_schema(df)?;

        let mut numeric = Vec::with_capacity(NUMERIC_FEATURES.len());
        for name in NUMERIC_FEATURES {
            // Strict: text that does not parse must fail rather than become null
            let column = df.column(name)?.strict_cast(&DataType::Float64).map_err(|e| {
                SegmentationError::InvalidValue {
                    column: name.to_string(),
                    message: e.to_string(),
                }
            })?;
            numeric.push(column.f64()?.into_iter().collect::<Vec<Option<f64>>>());
        }

        let mut categorical = Vec::with_capacity(CATEGORICAL_FEATURES.len());
        for name in CATEGORICAL_FEATURES {
            let column = df.column(name)?.cast(&DataType::String)?;
            let values = column
                .str()?
                .into_iter()
                .map(|v| v.unwrap_or(MISSING_CATEGORY).to_string())
                .collect::<Vec<String>>();
            categorical.push(values);
        }

        debug!(rows = df.height(), "Extracted customer table from dataframe");
        Ok(Self {
            numeric,
            categorical,
        })
    }

    /// Table holding a single record
    pub fn from_record(record: &CustomerRecord) -> Self {
        Self {
            numeric: record.numeric_values().iter().map(|v| vec![*v]).collect(),
            categorical: record
                .categorical_values()
                .iter()
                .map(|v| vec![v.to_string()])
                .collect(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.categorical.first().map_or(0, Vec::len)
    }
}

/// Check that every required column is present
pub fn validate_schema(df: &DataFrame) -> crate::Result<()> {
    let missing: Vec<String> = required_columns()
        .filter(|name| df.get_column_index(name).is_none())
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SegmentationError::Schema(missing))
    }
}

/// Load a customer CSV file into a DataFrame
pub fn load_customer_csv(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "Loaded customer CSV");
    Ok(df)
}

/// Copy of `df` with the segment assignment of each row appended
pub fn attach_segments(df: &DataFrame, labels: &[usize]) -> crate::Result<DataFrame> {
    let segments: Vec<u32> = labels.iter().map(|&l| l as u32).collect();
    let mut labeled = df.clone();
    labeled.with_column(Series::new(SEGMENT_COLUMN, segments))?;
    Ok(labeled)
}

/// Write a DataFrame as CSV
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> crate::Result<()> {
    let path = path.as_ref();
    let mut file = std::fs::File::create(path)
        .map_err(|e| SegmentationError::persistence("create", path, e))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "age,gender,income,visits_per_month,avg_time_spent,purchase_frequency,avg_order_value,customer_lifetime_value,preferred_category").unwrap();
        writeln!(file, "34,F,52000,4,12.5,3,80.0,1200.0,Electronics").unwrap();
        writeln!(file, "51,M,,2,8.0,1,45.5,600.0,Home").unwrap();
        writeln!(file, "27,O,38000,9,20.0,7,30.0,900.0,Fashion").unwrap();
        file
    }

    #[test]
    fn test_load_and_extract_table() {
        let file = create_test_csv();
        let df = load_customer_csv(file.path()).unwrap();
        assert_eq!(df.height(), 3);

        let table = CustomerTable::from_dataframe(&df).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.numeric.len(), 7);
        assert_eq!(table.numeric[1], vec![Some(52000.0), None, Some(38000.0)]);
        assert_eq!(table.categorical[0], vec!["F", "M", "O"]);
        assert_eq!(table.categorical[1][2], "Fashion");
    }

    #[test]
    fn test_missing_gender_column_is_schema_error() {
        let df = df!(
            "age" => &[30.0],
            "income" => &[40000.0],
            "visits_per_month" => &[3.0],
            "avg_time_spent" => &[10.0],
            "purchase_frequency" => &[2.0],
            "avg_order_value" => &[50.0],
            "customer_lifetime_value" => &[700.0],
            "preferred_category" => &["Books"]
        )
        .unwrap();

        match CustomerTable::from_dataframe(&df) {
            Err(SegmentationError::Schema(missing)) => assert_eq!(missing, vec!["gender"]),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_record_from_map() {
        let fields: HashMap<String, String> = [
            ("age", "41"),
            ("income", "61000"),
            ("visits_per_month", ""),
            ("gender", "M"),
            ("preferred_category", "Sports"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let record = CustomerRecord::from_map(&fields).unwrap();
        assert_eq!(record.age, Some(41.0));
        assert_eq!(record.visits_per_month, None);
        assert_eq!(record.customer_lifetime_value, None);
        assert_eq!(record.gender, "M");
    }

    #[test]
    fn test_record_from_map_rejects_bad_number() {
        let fields: HashMap<String, String> = [
            ("age", "forty"),
            ("gender", "M"),
            ("preferred_category", "Sports"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let err = CustomerRecord::from_map(&fields).unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");
    }

    #[test]
    fn test_non_numeric_text_in_numeric_column_is_invalid_value() {
        let df = df!(
            "age" => &["30", "abc", "50"],
            "income" => &[40000.0, 52000.0, 61000.0],
            "visits_per_month" => &[3.0, 4.0, 5.0],
            "avg_time_spent" => &[10.0, 12.0, 9.0],
            "purchase_frequency" => &[2.0, 3.0, 1.0],
            "avg_order_value" => &[50.0, 70.0, 40.0],
            "customer_lifetime_value" => &[700.0, 900.0, 400.0],
            "gender" => &["F", "M", "F"],
            "preferred_category" => &["Books", "Home", "Books"]
        )
        .unwrap();

        match CustomerTable::from_dataframe(&df) {
            Err(SegmentationError::InvalidValue { column, .. }) => assert_eq!(column, "age"),
            other => panic!("expected invalid value error, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_text_with_nulls_is_accepted() {
        let df = df!(
            "age" => &[Some("30"), None, Some("50")],
            "income" => &[40000.0, 52000.0, 61000.0],
            "visits_per_month" => &[3.0, 4.0, 5.0],
            "avg_time_spent" => &[10.0, 12.0, 9.0],
            "purchase_frequency" => &[2.0, 3.0, 1.0],
            "avg_order_value" => &[50.0, 70.0, 40.0],
            "customer_lifetime_value" => &[700.0, 900.0, 400.0],
            "gender" => &["F", "M", "F"],
            "preferred_category" => &["Books", "Home", "Books"]
        )
        .unwrap();

        let table = CustomerTable::from_dataframe(&df).unwrap();
        assert_eq!(table.numeric[0], vec![Some(30.0), None, Some(50.0)]);
    }

    #[test]
    fn test_attach_segments() {
        let file = create_test_csv();
        let df = load_customer_csv(file.path()).unwrap();
        let labeled = attach_segments(&df, &[0, 2, 1]).unwrap();
        assert_eq!(labeled.width(), df.width() + 1);
        let segments: Vec<Option<u32>> = labeled
            .column(SEGMENT_COLUMN)
            .unwrap()
            .u32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(segments, vec![Some(0), Some(2), Some(1)]);
    }
}
