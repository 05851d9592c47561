//! Command-line interface: run jobs, serve a model, inspect the registry

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use colored::*;

use crate::config::Settings;
use crate::jobs::{Job, JobConfig, JobReport};
use crate::registry::{Loader, LoaderKind, ModelRegistry, uri_for_model_alias};
use crate::jobs::promotion::CHAMPION;
use crate::serving::AppState;
use crate::tracking::TrackingService;

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

#[derive(Parser)]
#[command(name = "modelops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, evaluate, register and serve chat models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job described by one or more JSON config files
    Run {
        /// Config files, deep-merged in order
        files: Vec<PathBuf>,

        /// Inline JSON merged after the files
        #[arg(short, long)]
        extra: Option<String>,
    },

    /// Serve a registered model over HTTP
    Serve {
        /// Model URI; defaults to the Champion alias of the registry name
        #[arg(short, long)]
        uri: Option<String>,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// List registered versions of a model
    Versions {
        /// Registered model name; defaults to REGISTRY_NAME
        name: Option<String>,
    },
}

/// Run a job config and print its report
pub fn cmd_run(files: &[PathBuf], extra: Option<&str>) -> anyhow::Result<()> {
    let config = JobConfig::load(files, extra)?;
    config.logger.start();

    let ctx = config.context(&Settings::from_env())?;
    section(&format!("{} {}", config.job.name(), dim(&format!("registry {}", ctx.settings.registry_name))));
    step_run(&format!("tracking store {}", ctx.settings.tracking_uri.display()));

    let start = Instant::now();
    let report = config.job.run(&ctx);
    let elapsed = start.elapsed();

    match report {
        Ok(report) => {
            print_report(&report);
            step_ok(&format!("finished in {:.2?}", elapsed));
            println!();
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e.to_string().red());
            Err(e.into())
        }
    }
}

fn print_report(report: &JobReport) {
    match report {
        JobReport::TrainingJob(r) => {
            kv("Run", &r.run_id);
            kv("Model URI", &r.model_uri);
            kv("Version", &r.version.to_string());
            for (name, score) in &r.metrics {
                kv(name, &format!("{:.4}", score));
            }
            if r.fallback {
                println!("  {}", "Saved to local fallback directory".yellow());
            }
        }
        JobReport::TuningJob(r) => {
            kv("Run", &r.run_id);
            kv("Candidates", &r.candidates.len().to_string());
            kv("Best score", &format!("{:.4}", r.best_score));
        }
        JobReport::PromotionJob(r) => {
            kv("Alias", &format!("{}@{}", r.name, r.alias));
            kv("Version", &r.version.to_string());
        }
        JobReport::EvaluationsJob(r) => {
            kv("Model URI", &r.model_uri);
            for result in &r.evaluation.results {
                let status = match result.passed {
                    Some(true) => ok("pass"),
                    Some(false) => "fail".red(),
                    None => dim("-"),
                };
                println!("  {:<18} {} {}", muted(&result.name), format!("{:.4}", result.score).white(), status);
            }
        }
        JobReport::ExplanationsJob(r) => {
            kv("Model URI", &r.model_uri);
            kv("Features", &r.features.to_string());
            kv("Samples", &r.samples.to_string());
        }
        JobReport::InferenceJob(r) => {
            kv("Model URI", &r.model_uri);
            kv("Rows", &r.rows.to_string());
        }
    }
}

/// Load the model to serve
///
/// Must run outside the async runtime: HTTP backends hold a blocking client.
pub fn load_serving_state(uri: Option<&str>) -> anyhow::Result<Arc<AppState>> {
    let settings = Settings::from_env();
    let uri = uri
        .map(String::from)
        .unwrap_or_else(|| uri_for_model_alias(&settings.registry_name, CHAMPION));
    let tracking = TrackingService::new(settings)?;
    let store = tracking.store();

    step_run(&format!("loading {}", uri));
    let adapter = LoaderKind::default().load(&uri, store, store)?;
    step_ok(&format!("loaded {} from run {}", adapter.metadata().kind, adapter.metadata().run_id));
    Ok(Arc::new(AppState::new(Arc::new(adapter), uri)))
}

/// Print the versions of a registered model
pub fn cmd_versions(name: Option<&str>) -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let name = name.map(String::from).unwrap_or_else(|| settings.registry_name.clone());
    let tracking = TrackingService::new(settings)?;
    let versions = tracking.store().list_versions(&name)?;

    section(&format!("{} {}", name, dim(&format!("{} versions", versions.len()))));
    println!(
        "  {:<8} {:<12} {:<20} {}",
        muted("Version"),
        muted("Stage"),
        muted("Aliases"),
        muted("URI")
    );
    for v in &versions {
        println!(
            "  {:<8} {:<12} {:<20} {}",
            v.version.to_string().white().bold(),
            format!("{:?}", v.stage),
            v.aliases.join(","),
            dim(&v.model_uri)
        );
    }
    println!();
    Ok(())
}
