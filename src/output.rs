use crate::cache::{CacheValue, ResultArtifact};
use crate::models::{CacheSummary, EvaluationReport, FilterSummary};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print an evaluation report in the specified format
pub fn print_report(report: &EvaluationReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print_report_plain(report),
        OutputFormat::Json => print_json(report),
    }
}

fn print_report_plain(report: &EvaluationReport) {
    println!("📊 EVALUATION");
    println!("-------------");
    println!("Images: {}", report.num_images);
    println!("Predictions: {}", report.num_predictions);
    println!("mAP: {:.4}", report.mean_ap);
    println!();

    if report.per_class_ap.is_empty() {
        println!("No classes evaluated.");
        return;
    }

    println!("{:<8} {:<8} {:<8}", "Class", "AP", "#GT");
    println!("{}", "-".repeat(26));
    for (class, ap) in report.per_class_ap.iter().enumerate() {
        let num_gt = report.num_gt.get(class).copied().unwrap_or(0);
        println!("{:<8} {:<8.4} {:<8}", class, ap, num_gt);
    }
}

/// Print the summary of a cache run
pub fn print_cache_summary(summary: &CacheSummary, format: OutputFormat) {
    match format {
        OutputFormat::Plain => {
            println!(
                "Cached {} entries for {} images to: {}",
                summary.num_entries, summary.num_images, summary.destination
            );
        }
        OutputFormat::Json => print_json(summary),
    }
}

/// Print the summary of a filter run
pub fn print_filter_summary(summary: &FilterSummary, format: OutputFormat) {
    match format {
        OutputFormat::Plain => {
            println!(
                "Filtered {} files: kept {} of {} detections",
                summary.num_files, summary.detections_out, summary.detections_in
            );
        }
        OutputFormat::Json => print_json(summary),
    }
}

/// Print the contents of a result artifact
pub fn print_artifact(artifact: &ResultArtifact, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print_artifact_plain(artifact),
        OutputFormat::Json => print_json(artifact),
    }
}

fn print_artifact_plain(artifact: &ResultArtifact) {
    println!(
        "📝 {} images, {} entries",
        artifact.len(),
        artifact.total_entries()
    );
    for (image_id, cache) in artifact.iter() {
        println!();
        println!("Image {}", image_id);
        for (key, value) in cache.iter() {
            println!("  • {}: {}", key, format_value(value));
        }
    }
}

fn format_value(value: &CacheValue) -> String {
    match value {
        CacheValue::Score(score) => format!("{:.3}", score),
        CacheValue::Record(record) => format!(
            "[{:.1}, {:.1}, {:.1}, {:.1}] {:.3}",
            record[0], record[1], record[2], record[3], record[4]
        ),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}
