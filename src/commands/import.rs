use anyhow::{Context, Result};
use archindex::{
    backend::{create_backend, IndexNames},
    config::Config,
    import::{
        DirectorySource, DocumentOutcome, ImportConfig, ImportCoordinator,
        ImportCoordinatorBuilder, RunOutcome, RunReport, RunStore,
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn build_coordinator(config: &Config, quiet: bool) -> Result<ImportCoordinator> {
    let backend = create_backend(&config.backend).context("Failed to create search backend")?;
    let store = RunStore::open(&config.store.path)
        .with_context(|| format!("Failed to open run store {}", config.store.path.display()))?;

    let coordinator = ImportCoordinatorBuilder::new(
        backend,
        IndexNames::new(config.backend.environment.clone()),
        Arc::new(store),
    )
    .with_config(ImportConfig::from_config(config))
    .with_quiet(quiet)
    .build()?;
    Ok(coordinator)
}

fn source_for(config: &Config, data_dir: Option<PathBuf>) -> Result<DirectorySource> {
    let dir = data_dir.unwrap_or_else(|| config.import.data_dir.clone());
    if !dir.is_dir() {
        anyhow::bail!("Finding-aid directory not found: {}", dir.display());
    }
    info!("Importing finding aids from: {}", dir.display());
    Ok(DirectorySource::new(dir))
}

pub fn start_run(config: Config, data_dir: Option<PathBuf>, quiet: bool) -> Result<()> {
    let source = source_for(&config, data_dir)?;
    let coordinator = build_coordinator(&config, quiet)?;
    let report = coordinator.start(&source)?;
    print_report(&report, quiet);
    Ok(())
}

pub fn resume_run(config: Config, id: i64, data_dir: Option<PathBuf>, quiet: bool) -> Result<()> {
    let source = source_for(&config, data_dir)?;
    let coordinator = build_coordinator(&config, quiet)?;
    let report = coordinator.run(id, &source)?;
    print_report(&report, quiet);
    Ok(())
}

pub fn import_file(config: Config, path: PathBuf) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("Document not found: {}", path.display());
    }
    let coordinator = build_coordinator(&config, true)?;
    match coordinator.import_document(&path)? {
        DocumentOutcome::Imported { records } => {
            println!("Imported {} records from {}", records, path.display());
        }
        DocumentOutcome::Skipped { description_type } => {
            println!(
                "Skipped {}: description type is {}, not inventory",
                path.display(),
                description_type.as_deref().unwrap_or("missing")
            );
        }
    }
    Ok(())
}

fn print_report(report: &RunReport, quiet: bool) {
    if quiet {
        return;
    }
    let run = &report.run;
    match report.outcome {
        RunOutcome::Completed => println!(
            "\nRun {} completed: {} documents, {} records",
            run.id, run.completed_files, run.total_records_imported
        ),
        RunOutcome::Cancelled => println!(
            "\nRun {} cancelled after {}/{} documents; live indexes unchanged",
            run.id, run.completed_files, run.total_files
        ),
    }
}
