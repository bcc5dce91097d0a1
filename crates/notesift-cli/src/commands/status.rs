//! Status command - show index statistics.

use crate::app::App;
use notesift_core::Config;

/// Run the status command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::load(config)?;
    let stats = app.index.stats();

    println!("notesift Index Status");
    println!("=====================");
    println!();

    if app.index.is_empty() {
        println!("Index is empty. Add notes and run 'notesift index'.");
    } else {
        println!("Summary:");
        println!("  Notes:          {}", stats.notes);
        println!("  Terms:          {}", stats.terms);
        println!("  Postings:       {}", stats.postings);
        println!("  Tags:           {}", stats.tags);
        println!("  Generation:     {}", stats.generation);
        println!("  Format version: {}", stats.version);

        if let Some(updated) = stats.last_updated {
            println!("  Last updated:   {}", updated.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    println!();
    if let Some(path) = app.database_path() {
        println!("Database: {}", path.display());
    }
    if app.config.snapshot.enabled {
        println!("Snapshot: {}", app.snapshots.snapshot_path().display());
    } else {
        println!("Snapshot: disabled");
    }

    Ok(())
}
