//! Search latency over a synthetic corpus.
//!
//! Run with: cargo bench --bench search_perf
//!
//! Target: every query below completes well under the default 100 ms
//! budget on 10,000 notes.

use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use notesift_core::{Config, Note, NoteId, NoteIndex, QueryEngine, SearchFilters};
use std::hint::black_box;
use std::sync::Arc;

const NOTE_COUNT: usize = 10_000;

/// Fixed seed for a reproducible corpus
const BENCH_SEED: u64 = 0x5EED_CAFE_F00D_D00D;

const WORDS: &[&str] = &[
    "python", "fastapi", "react", "hooks", "sql", "index", "query", "docker", "compose", "git",
    "branch", "rebase", "rust", "ownership", "async", "await", "cache", "latency", "deploy",
    "kubernetes", "terraform", "testing", "fixture", "mock", "schema", "migration", "token",
    "parser", "lexer", "vector", "embedding", "search", "ranking", "heuristic", "note", "journal",
];
const TAGS: &[&str] = &["backend", "frontend", "devops", "database", "tooling", "ideas"];

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn build_corpus(count: usize) -> Vec<Note> {
    let mut rng = BENCH_SEED;
    let epoch = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

    (0..count)
        .map(|i| {
            let mut pick = || WORDS[(lcg_next(&mut rng) >> 33) as usize % WORDS.len()];
            let title = format!("{} {} {}", pick(), pick(), pick());
            let body: Vec<&str> = (0..120).map(|_| pick()).collect();
            let tags = [
                TAGS[(lcg_next(&mut rng) >> 33) as usize % TAGS.len()],
                TAGS[(lcg_next(&mut rng) >> 33) as usize % TAGS.len()],
            ];
            Note::new(NoteId(i as i64), title, body.join(" "))
                .with_tags(tags)
                .with_modified(epoch + Duration::hours((lcg_next(&mut rng) >> 40) as i64 % 8760))
        })
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let index = Arc::new(NoteIndex::default());
    for note in build_corpus(NOTE_COUNT) {
        index.upsert_note(&note).unwrap();
    }
    let engine = QueryEngine::new(Arc::clone(&index), &Config::default());

    let queries = [
        ("single_term", "python", SearchFilters::new()),
        ("three_terms", "rust async cache", SearchFilters::new()),
        ("phrase", "\"react hooks\"", SearchFilters::new()),
        ("tag_filtered", "docker compose", SearchFilters::new().with_tag("devops")),
        ("title_only", "title:parser", SearchFilters::new()),
    ];

    let mut group = c.benchmark_group("search_10k");
    for (name, query, filters) in &queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| black_box(engine.search(black_box(query), filters, 50)))
        });
    }
    group.finish();

    c.bench_function("suggest_10k", |b| {
        b.iter(|| black_box(engine.suggest(black_box("re"), 10)))
    });
}

fn bench_upsert(c: &mut Criterion) {
    let corpus = build_corpus(NOTE_COUNT);
    let index = NoteIndex::default();
    for note in &corpus {
        index.upsert_note(note).unwrap();
    }

    let mut i = 0usize;
    c.bench_function("upsert_into_10k", |b| {
        b.iter(|| {
            let note = &corpus[i % corpus.len()];
            i += 1;
            index.upsert_note(black_box(note)).unwrap();
        })
    });
}

criterion_group!(benches, bench_search, bench_upsert);
criterion_main!(benches);
