mod bootstrap;

use anyhow::Result;
use bootstrap::OutputPaths;
use downloads_core::settings::Settings;
use downloads_data::analysis::{analyze_files, AnalysisOptions, AnalysisResult};
use downloads_data::writer::{write_filtered_csv, write_monthly_csv, write_unique_csv};

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("release-downloads v{} starting", env!("CARGO_PKG_VERSION"));

    let result = run(&settings)?;

    if settings.summary_json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    }

    Ok(())
}

/// Analyse the configured source and write the three reports next to it.
fn run(settings: &Settings) -> Result<AnalysisResult> {
    let sources = bootstrap::resolve_sources(&settings.source, &settings.usage_prefix)?;
    let outputs = OutputPaths::for_source(&settings.source, &settings.usage_prefix);

    tracing::info!(
        "Analysing {} usage file(s) from {}",
        sources.len(),
        settings.source.display()
    );

    let result = analyze_files(&sources, &AnalysisOptions::from(settings))?;

    write_filtered_csv(&outputs.filtered, &result.headers, &result.records)?;
    write_monthly_csv(&outputs.monthly, &result.monthly)?;
    write_unique_csv(&outputs.unique, &result.unique)?;

    Ok(result)
}
