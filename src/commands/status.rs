use crate::OutputFormat;
use anyhow::{Context, Result};
use archindex::{
    config::Config,
    import::{ImportRun, RunStore},
};

fn open_store(config: &Config) -> Result<RunStore> {
    RunStore::open(&config.store.path)
        .with_context(|| format!("Failed to open run store {}", config.store.path.display()))
}

pub fn show_status(config: Config, id: Option<i64>, limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store(&config)?;
    let runs = match id {
        Some(id) => vec![store.load(id)?],
        None => store.recent(limit)?,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No import runs recorded.");
            }
            for run in &runs {
                print_run(run);
            }
        }
    }
    Ok(())
}

pub fn cancel_run(config: Config, id: i64) -> Result<()> {
    let store = open_store(&config)?;
    let run = store.request_cancel(id)?;
    if run.status.is_finished() {
        println!("Run {} is {}", run.id, run.status);
    } else {
        println!("Run {} will stop after its current document", run.id);
    }
    Ok(())
}

fn print_run(run: &ImportRun) {
    println!("Run {}", run.id);
    println!("=====");
    let pending_cancel = run.cancel_requested && !run.status.is_finished();
    println!(
        "Status:           {}{}",
        run.status,
        if pending_cancel { " (cancel requested)" } else { "" }
    );
    println!(
        "Documents:        {}/{} ({:.1}%)",
        run.completed_files,
        run.total_files,
        run.progress_percent()
    );
    println!("Records imported: {}", run.total_records_imported);
    if let Some(ref file) = run.current_file {
        println!("Current file:     {}", file);
    }
    if let Some(started) = run.started_at {
        println!("Started:          {}", started.to_rfc3339());
    }
    if let Some(elapsed) = run.elapsed() {
        println!("Elapsed:          {}s", elapsed.num_seconds());
    }
    if let Some(ref error) = run.error_message {
        println!("Error:            {}", error);
    }
    println!();
}
