//! Index command - rebuild the index from the notes database.

use crate::app::App;
use notesift_core::Config;

/// Run the index command.
pub fn run(config: Config, sample: bool) -> anyhow::Result<()> {
    let app = App::new(config)?;

    if sample {
        let seeded = app.store.seed_sample_notes()?;
        if seeded > 0 {
            println!("Added {} sample notes.", seeded);
        }
    }

    if let Some(path) = app.database_path() {
        println!("Indexing notes from {}", path.display());
    }

    let report = app.rebuild()?;
    let stats = app.index.stats();

    println!();
    println!("Indexing complete!");
    println!("  Notes:    {}", report.notes_indexed);
    if report.notes_skipped > 0 {
        println!("  Skipped:  {}", report.notes_skipped);
    }
    println!("  Terms:    {}", stats.terms);
    println!("  Tags:     {}", stats.tags);
    println!("  Time:     {:.3}s", report.elapsed.as_secs_f64());

    if app.config.snapshot.enabled {
        println!("  Snapshot: {}", app.snapshots.snapshot_path().display());
    }

    Ok(())
}
