//! SegForge: customer segmentation CLI
//!
//! Fits K-Means segments on a customer CSV, describes them, and predicts the
//! segment of single customers from the saved model.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use segforge::cli::{parse_record, Args, Command};
use segforge::{
    load_customer_csv, summarize, write_csv, ArtifactStore, SegmentationConfig,
    SegmentationInsights, SegmentationService,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = args.segmentation_config()?;

    match &args.command {
        Command::Segment {
            input,
            output,
            labeled,
            ..
        } => run_segmentation(config, input, output.as_deref(), labeled.as_deref()),
        Command::Predict { record } => run_prediction(config, record),
        Command::Summary { input } => run_summary(input),
    }
}

/// Fit segments, save artifacts and report insights
fn run_segmentation(
    config: SegmentationConfig,
    input: &Path,
    output: Option<&Path>,
    labeled_path: Option<&Path>,
) -> Result<()> {
    let start_time = Instant::now();

    let df = load_customer_csv(input)
        .with_context(|| format!("Failed to load customer data from {}", input.display()))?;
    println!("✓ Data loaded: {} customers", df.height());

    let store = ArtifactStore::new(config.model_dir.clone());
    let service = SegmentationService::new(config).with_store(store.clone());
    let (mut labeled, insights) = service.fit_and_describe(&df)?;

    print_segment_statistics(&insights);
    if store.exists() {
        println!("Model artifacts saved to: {}", store.dir().display());
    }

    if let Some(path) = labeled_path {
        write_csv(&mut labeled, path)?;
        println!("Segmented customers saved to: {}", path.display());
    }

    let json = serde_json::to_string_pretty(&insights)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write insights to {}", path.display()))?;
            println!("Insights saved to: {}", path.display());
        }
        None => println!("{}", json),
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Predict one customer's segment from the saved artifacts
fn run_prediction(config: SegmentationConfig, record: &str) -> Result<()> {
    let record = parse_record(record)?;

    let store = ArtifactStore::new(config.model_dir.clone());
    let service = SegmentationService::new(config).with_store(store);
    service.load().with_context(|| {
        format!(
            "No trained model found in {}. Please run segmentation first.",
            service.config().model_dir.display()
        )
    })?;

    let prediction = service.predict_one(&record)?;
    let characteristics = service
        .current()
        .and_then(|fitted| fitted.insights.profile(prediction.segment_id).cloned());

    let response = serde_json::json!({
        "segment": prediction.segment_id,
        "segment_label": prediction.segment_label,
        "customer_data": record,
        "segment_characteristics": characteristics,
    });
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_summary(input: &Path) -> Result<()> {
    let df = load_customer_csv(input)
        .with_context(|| format!("Failed to load customer data from {}", input.display()))?;
    let summary = summarize(&df)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_segment_statistics(insights: &SegmentationInsights) {
    println!("\n=== Segment Statistics ===");
    println!("Number of segments: {}", insights.model_info.n_clusters);
    println!("Silhouette score: {:.3}", insights.model_info.silhouette_score);

    for profile in insights.segment_profiles.values() {
        println!(
            "Segment {}: {} customers ({:.1}%) - {}",
            profile.segment_id, profile.size, profile.percentage, profile.label
        );
    }
    println!();
}
