mod commands;
mod logging;
mod progress;
mod rules;

use std::fs;
use std::process;

use clap::Parser;
use colored::*;
use commands::Cli;
use dicom_sorter_core::config::load_configuration_from;
use dicom_sorter_core::materialize::Failure;
use dicom_sorter_core::{DicomSorter, SorterConfig};
use dotenv::dotenv;
use progress::CliReporter;
use rules::SortRule;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    if !args.source_dir.exists() {
        error!("{} not exist!", args.source_dir.display());
        process::exit(1);
    }

    let mut config = match load_configuration_from(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };
    if let Some(dir) = &args.extract_to {
        config.extract_to_dir = Some(dir.clone());
    }
    if let Some(format) = args.format {
        config.bundle_format = format;
    }

    fs::create_dir_all(&args.output_dir)?;

    let rule = if args.clinical {
        info!("These are clinical scans.");
        SortRule::Clinical
    } else {
        SortRule::Cfmm
    };

    if let Err(err) = run(&args, rule, config) {
        error!("Error: {}", err);
        process::exit(1);
    }

    Ok(())
}

fn run(args: &Cli, rule: SortRule, config: SorterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = CliReporter::new();
    let mut sorter = DicomSorter::new(&args.source_dir, rule, &args.output_dir, config)?;

    if args.sort {
        let result = sorter.sort(&reporter)?;
        println!();
        info!(
            "Extract: {}, Classify: {}, Copy: {}",
            format!("{:.2}s", result.extract_duration.as_secs_f64()).green(),
            format!("{:.2}s", result.classify_duration.as_secs_f64()).green(),
            format!("{:.2}s", result.copy_duration.as_secs_f64()).green(),
        );
        info!(
            "{} archives extracted, {} files copied into {} directories",
            format!("{}", result.archives_extracted).cyan(),
            format!("{}", result.copied.len()).cyan(),
            format!("{}", result.sorted_dirs.len()).cyan(),
        );
        report_failures(&result.failures, result.report.failures().len());
    } else {
        let depth = args.depth.unwrap_or_else(|| rule.default_depth());
        let result = sorter.tar(depth, &reporter)?;
        println!();
        info!(
            "Extract: {}, Classify: {}, Bundle: {}",
            format!("{:.2}s", result.extract_duration.as_secs_f64()).green(),
            format!("{:.2}s", result.classify_duration.as_secs_f64()).green(),
            format!("{:.2}s", result.bundle_duration.as_secs_f64()).green(),
        );
        info!(
            "{} archives extracted, {} files bundled into {} tar files",
            format!("{}", result.archives_extracted).cyan(),
            format!("{}", result.files_bundled).cyan(),
            format!("{}", result.archives.len()).cyan(),
        );
        report_failures(&result.failures, result.report.failures().len());
    }

    sorter.close()?;
    Ok(())
}

fn report_failures(write_failures: &[Failure], total_failures: usize) {
    for failure in write_failures {
        warn!("Not written: {} ({})", failure.path.display(), failure.reason);
    }
    if total_failures > 0 {
        warn!(
            "{} items failed (archives, files or bundles); see log for details",
            format!("{}", total_failures).red(),
        );
    }
}
