//! Progress tracking for imports
//!
//! The walker reports nodes and files through monotonic counters; the bar (if
//! any) advances per document.

use super::source::ImportStats;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Progress tracker for import operations
pub struct ImportProgress {
    /// Progress bar (None if running in quiet mode)
    progress_bar: Option<ProgressBar>,
    /// Start time
    start_time: Instant,
    documents_imported: AtomicUsize,
    documents_skipped: AtomicUsize,
    documents_resumed: AtomicUsize,
    nodes_processed: AtomicUsize,
    files_processed: AtomicUsize,
    records_written: AtomicUsize,
}

impl ImportProgress {
    /// Create a new progress tracker
    pub fn new(total_documents: Option<u64>, quiet: bool) -> Self {
        let progress_bar = if !quiet {
            let pb = if let Some(total) = total_documents {
                ProgressBar::new(total)
            } else {
                ProgressBar::new_spinner()
            };

            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );

            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            start_time: Instant::now(),
            documents_imported: AtomicUsize::new(0),
            documents_skipped: AtomicUsize::new(0),
            documents_resumed: AtomicUsize::new(0),
            nodes_processed: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            records_written: AtomicUsize::new(0),
        }
    }

    /// Tracker without a bar, for tests and background tasks
    pub fn quiet() -> Self {
        Self::new(None, true)
    }

    /// Set the number of documents once the source has been listed
    pub fn set_total(&self, total: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_length(total);
        }
    }

    pub fn node_processed(&self) {
        self.nodes_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_processed(&self, count: usize) {
        self.files_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records_written(&self, count: usize) {
        self.records_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Show the document currently being walked
    pub fn document_started(&self, name: &str) {
        if let Some(ref pb) = self.progress_bar {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let files = self.files_processed.load(Ordering::Relaxed);
            let rate = if elapsed > 0.0 { files as f64 / elapsed } else { 0.0 };

            // Truncate safely for UTF-8
            let display = if name.chars().count() > 30 {
                let truncated: String = name.chars().take(27).collect();
                format!("{}...", truncated)
            } else {
                name.to_string()
            };
            pb.set_message(format!("{:.1} files/s | {}", rate, display));
        }
    }

    /// Update progress after a document has been imported or skipped
    pub fn document_finished(&self, imported: bool) {
        if imported {
            self.documents_imported.fetch_add(1, Ordering::Relaxed);
        } else {
            self.documents_skipped.fetch_add(1, Ordering::Relaxed);
        }
        self.advance();
    }

    /// A document already listed in the checkpoint
    pub fn document_resumed(&self) {
        self.documents_resumed.fetch_add(1, Ordering::Relaxed);
        self.advance();
    }

    fn advance(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> ImportStats {
        let mut stats = ImportStats {
            documents_imported: self.documents_imported.load(Ordering::Relaxed),
            documents_skipped: self.documents_skipped.load(Ordering::Relaxed),
            documents_resumed: self.documents_resumed.load(Ordering::Relaxed),
            nodes_processed: self.nodes_processed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
            files_per_second: 0.0,
        };
        stats.update_rate();
        stats
    }

    /// Stop the bar without a success message
    pub fn abandon(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message(message.to_string());
        }
    }

    /// Finish the progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} imported, {} skipped, {} records, {:.1} files/s",
                stats.documents_imported,
                stats.documents_skipped,
                stats.records_written,
                stats.files_per_second
            ));
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        let stats = self.get_stats();

        println!("\nImport Summary");
        println!("==============");
        println!("Documents imported:  {}", stats.documents_imported);
        println!("Documents skipped:   {}", stats.documents_skipped);
        println!("Documents resumed:   {}", stats.documents_resumed);
        println!("Nodes processed:     {}", stats.nodes_processed);
        println!("Files processed:     {}", stats.files_processed);
        println!("Records written:     {}", stats.records_written);
        println!("Elapsed time:        {:.1}s", stats.elapsed_seconds);
        println!("Processing rate:     {:.1} files/s", stats.files_per_second);
    }
}
