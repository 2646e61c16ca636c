//! Command-line interface definitions and argument parsing

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::SegmentationConfig;
use crate::data::CustomerRecord;

/// Customer segmentation CLI using K-Means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Optional TOML file with engine settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for fitted model artifacts
    #[arg(short, long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fit segments on a customer CSV and describe them
    Segment {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data/customer_data.csv")]
        input: PathBuf,

        /// Write insights JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the input rows with their segment to this CSV
        #[arg(short, long)]
        labeled: Option<PathBuf>,

        /// Largest cluster count to try
        #[arg(long)]
        max_k: Option<usize>,

        /// Seed for K-Means initialisation
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict the segment of one customer with the saved model
    Predict {
        /// Customer attributes as key=value pairs
        /// Example: --record "age=34,gender=F,income=52000,visits_per_month=4,avg_time_spent=12.5,purchase_frequency=3,avg_order_value=80,customer_lifetime_value=1200,preferred_category=Electronics"
        #[arg(short, long)]
        record: String,
    },

    /// Print descriptive statistics of a customer CSV
    Summary {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data/customer_data.csv")]
        input: PathBuf,
    },
}

impl Args {
    /// Engine configuration: config file (or defaults) with CLI overrides applied
    pub fn segmentation_config(&self) -> crate::Result<SegmentationConfig> {
        let mut config = match &self.config {
            Some(path) => SegmentationConfig::from_file(path)?,
            None => SegmentationConfig::default(),
        };

        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Command::Segment { max_k, seed, .. } = &self.command {
            if let Some(max_k) = max_k {
                config.max_clusters = *max_k;
            }
            if let Some(seed) = seed {
                config.clustering.seed = *seed;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a record given as comma-separated `key=value` pairs
pub fn parse_record(input: &str) -> anyhow::Result<CustomerRecord> {
    let mut fields = HashMap::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got: {}", part))?;
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(CustomerRecord::from_map(&fields)?)
}
