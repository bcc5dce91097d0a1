//! Query command - ranked search over notes.

use crate::app::App;
use crate::OutputFormat;
use notesift_core::{parse_query, Config, Field, QueryEngine, SearchFilters, SearchHit, Tokenizer};
use std::sync::Arc;
use std::time::Instant;

/// Run the query command.
pub fn run(
    config: Config,
    text: &str,
    tags: Vec<String>,
    title_only: bool,
    limit: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::load(config)?;

    if app.index.is_empty() {
        eprintln!("Index is empty. Add notes and run 'notesift index'.");
        return Ok(());
    }

    if !has_search_terms(app.index.tokenizer(), text) {
        eprintln!("A search term is required; tag filters only narrow a search.");
        eprintln!("Try 'notesift suggest <prefix>' to browse tags.");
        return Ok(());
    }

    let filters = tags
        .into_iter()
        .fold(SearchFilters::new(), |filters, tag| filters.with_tag(tag))
        .title_only(title_only);
    let limit = limit.unwrap_or(app.config.general.max_results);
    let engine = QueryEngine::new(Arc::clone(&app.index), &app.config);

    let start = Instant::now();
    let hits = engine.search(text, &filters, limit);
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            for hit in &hits {
                let (title, tags) = match app.store.get_note(hit.note_id)? {
                    Some(note) => (note.title, note.tags),
                    None => ("<deleted>".to_string(), Vec::new()),
                };
                let tags: String = tags.iter().map(|t| format!(" #{}", t)).collect();
                println!("{:>6.3}  [{}] {}{}", hit.score, hit.note_id, title, tags);
                if let Some(fields) = matched_fields(hit) {
                    println!("        matched in {}", fields);
                }
            }

            eprintln!();
            eprintln!(
                "Found {} results in {:.3}ms",
                hits.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let json_results: Vec<serde_json::Value> = hits
                .iter()
                .map(|hit| {
                    let title = app
                        .store
                        .get_note(hit.note_id)
                        .ok()
                        .flatten()
                        .map(|note| note.title);
                    serde_json::json!({
                        "id": hit.note_id,
                        "title": title,
                        "score": hit.score,
                        "modified": hit.modified.to_rfc3339(),
                        "highlights": hit.highlights,
                    })
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&json_results)?);
        }
    }

    Ok(())
}

/// Check whether the query text has anything to match beyond filters.
fn has_search_terms(tokenizer: &Tokenizer, text: &str) -> bool {
    !parse_query(text, tokenizer).is_empty()
}

fn matched_fields(hit: &SearchHit) -> Option<String> {
    let fields: Vec<&str> = [Field::Title, Field::Body, Field::Tag]
        .into_iter()
        .filter(|field| hit.highlights.iter().any(|h| h.field == *field))
        .map(|field| match field {
            Field::Title => "title",
            Field::Body => "body",
            Field::Tag => "tags",
        })
        .collect();
    match fields.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [init @ .., last] => Some(format!("{} and {}", init.join(", "), last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesift_core::{Highlight, Note, NoteId};

    fn hit(fields: &[Field]) -> SearchHit {
        SearchHit {
            note_id: NoteId(1),
            score: 1.0,
            modified: Note::new(NoteId(1), "", "").modified,
            highlights: fields
                .iter()
                .map(|field| Highlight {
                    term: "docker".to_string(),
                    field: *field,
                    positions: vec![0],
                })
                .collect(),
        }
    }

    #[test]
    fn test_tag_only_query_has_no_terms() {
        let tokenizer = Tokenizer::default();
        assert!(has_search_terms(&tokenizer, "python tag:web"));
        assert!(!has_search_terms(&tokenizer, "tag:web #python"));
        assert!(!has_search_terms(&tokenizer, "the"));
        assert!(!has_search_terms(&tokenizer, ""));
    }

    #[test]
    fn test_matched_fields() {
        assert_eq!(matched_fields(&hit(&[])), None);
        assert_eq!(matched_fields(&hit(&[Field::Tag])).as_deref(), Some("tags"));
        assert_eq!(
            matched_fields(&hit(&[Field::Body, Field::Title])).as_deref(),
            Some("title and body")
        );
        assert_eq!(
            matched_fields(&hit(&[Field::Title, Field::Body, Field::Tag])).as_deref(),
            Some("title, body and tags")
        );
    }
}
