//! Clear command - delete the snapshot cache.

use notesift_core::{Config, SnapshotStore};
use std::io::{self, Write};

/// Run the clear command.
///
/// Only the cache is removed; the notes database is never touched.
pub fn run(config: Config, skip_confirm: bool) -> anyhow::Result<()> {
    let store = SnapshotStore::new(config.snapshot_dir()?);

    if !store.exists() {
        println!("No snapshot found. Nothing to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!("This will delete the index snapshot. Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("Snapshot cleared.");

    Ok(())
}
