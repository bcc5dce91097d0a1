//! Suggest command - complete a prefix to tags and terms.

use crate::app::App;
use notesift_core::{Config, QueryEngine, SuggestionKind};
use std::sync::Arc;

/// Run the suggest command.
pub fn run(config: Config, prefix: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let app = App::load(config)?;
    let limit = limit.unwrap_or(app.config.search.suggest_limit);
    let engine = QueryEngine::new(Arc::clone(&app.index), &app.config);

    let suggestions = engine.suggest(prefix, limit);
    if suggestions.is_empty() {
        eprintln!("No suggestions for '{}'.", prefix);
        return Ok(());
    }

    for s in &suggestions {
        let text = match s.kind {
            SuggestionKind::Tag => format!("#{}", s.text),
            SuggestionKind::Term => s.text.clone(),
        };
        println!("{:<32} {:>5} notes", text, s.note_count);
    }

    Ok(())
}
