//! Tag → note-set map.
//!
//! Tags are normalized on the way in (trimmed, a leading `#` dropped, inner
//! whitespace collapsed, diacritics-folded lowercase), so `#Rust` and
//! ` rust ` are the same tag. Every operation is idempotent.
//!
//! The words of each tag are indexed too, so free-text search can find a
//! note through `web development` by typing `development`.

use crate::tokenizer::fold;
use crate::types::NoteId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Normalize a tag name, or `None` if nothing is left.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim().trim_start_matches('#');
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(fold(&collapsed))
}

/// Words of a normalized tag, split like note text.
pub fn tag_words(tag: &str) -> impl Iterator<Item = &str> {
    tag.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|w| w.trim_matches('_'))
        .filter(|w| !w.is_empty())
}

/// What a [`TagIndex::set_tags`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TagDelta {
    /// True if the call was a no-op
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The tag index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagIndex {
    /// Tag → notes carrying it
    tags: BTreeMap<String, BTreeSet<NoteId>>,

    /// Note → its tags
    note_tags: HashMap<NoteId, BTreeSet<String>>,

    /// Tag word → tags containing it
    words: BTreeMap<String, BTreeSet<String>>,
}

impl TagIndex {
    /// Create an empty tag index
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a tag to a note. Returns true if the tag was newly attached.
    pub fn attach(&mut self, note_id: NoteId, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return false;
        };
        self.attach_normalized(note_id, tag)
    }

    /// Detach a tag from a note. Detaching an absent tag is a no-op.
    pub fn detach(&mut self, note_id: NoteId, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return false;
        };
        self.detach_normalized(note_id, &tag)
    }

    /// Replace the full tag set of a note.
    ///
    /// Only the symmetric difference against the current set is applied.
    pub fn set_tags<I, S>(&mut self, note_id: NoteId, tags: I) -> TagDelta
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = tags
            .into_iter()
            .filter_map(|t| normalize_tag(t.as_ref()))
            .collect();
        let current = self.note_tags.get(&note_id).cloned().unwrap_or_default();

        let removed: Vec<String> = current.difference(&wanted).cloned().collect();
        let added: Vec<String> = wanted.difference(&current).cloned().collect();

        for tag in &removed {
            self.detach_normalized(note_id, tag);
        }
        for tag in &added {
            self.attach_normalized(note_id, tag.clone());
        }

        TagDelta { added, removed }
    }

    /// Drop every tag of a note
    pub fn remove_note(&mut self, note_id: NoteId) -> bool {
        let Some(tags) = self.note_tags.remove(&note_id) else {
            return false;
        };
        for tag in tags {
            self.unlink(&tag, note_id);
        }
        true
    }

    /// The notes carrying a tag; empty if nobody does.
    pub fn notes_for_tag(&self, tag: &str) -> BTreeSet<NoteId> {
        normalize_tag(tag)
            .and_then(|tag| self.tags.get(&tag).cloned())
            .unwrap_or_default()
    }

    /// Borrow the note set of an already normalized tag
    pub fn note_set(&self, tag: &str) -> Option<&BTreeSet<NoteId>> {
        self.tags.get(tag)
    }

    /// Check whether a note carries an already normalized tag
    pub fn has_tag(&self, note_id: NoteId, tag: &str) -> bool {
        self.note_tags
            .get(&note_id)
            .is_some_and(|tags| tags.contains(tag))
    }

    /// Tags of a note, in lexicographic order
    pub fn tags_for_note(&self, note_id: NoteId) -> Vec<String> {
        self.note_tags
            .get(&note_id)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tags starting with an already normalized prefix, with their note counts
    pub fn prefix_lookup(&self, prefix: &str, limit: usize) -> Vec<(&str, usize)> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.tags
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(tag, _)| tag.starts_with(prefix))
            .take(limit)
            .map(|(tag, notes)| (tag.as_str(), notes.len()))
            .collect()
    }

    /// Notes carrying any tag that contains `word`
    pub fn notes_with_word(&self, word: &str) -> BTreeSet<NoteId> {
        self.words
            .get(word)
            .into_iter()
            .flatten()
            .filter_map(|tag| self.tags.get(tag))
            .flatten()
            .copied()
            .collect()
    }

    /// Tag words starting with an already normalized prefix, at most `limit`
    pub fn word_prefix_lookup(&self, prefix: &str, limit: usize) -> Vec<&str> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.words
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(word, _)| word.as_str())
            .take_while(|word| word.starts_with(prefix))
            .take(limit)
            .collect()
    }

    /// Positions, in [`TagIndex::tags_for_note`] order, of the note's tags
    /// having a word that satisfies `matches`
    pub fn tag_positions<F>(&self, note_id: NoteId, matches: F) -> Vec<u32>
    where
        F: Fn(&str) -> bool,
    {
        self.note_tags
            .get(&note_id)
            .into_iter()
            .flatten()
            .enumerate()
            .filter(|(_, tag)| tag_words(tag).any(&matches))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Check whether one of the note's tags has a word satisfying `matches`
    pub fn has_tag_word<F>(&self, note_id: NoteId, matches: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.note_tags
            .get(&note_id)
            .is_some_and(|tags| tags.iter().any(|tag| tag_words(tag).any(&matches)))
    }

    /// Number of distinct tags in use
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.tags.clear();
        self.note_tags.clear();
        self.words.clear();
    }

    fn attach_normalized(&mut self, note_id: NoteId, tag: String) -> bool {
        let inserted = self
            .note_tags
            .entry(note_id)
            .or_default()
            .insert(tag.clone());
        if inserted {
            let notes = self.tags.entry(tag.clone()).or_default();
            if notes.is_empty() {
                for word in tag_words(&tag) {
                    self.words.entry(word.to_string()).or_default().insert(tag.clone());
                }
            }
            notes.insert(note_id);
        }
        inserted
    }

    fn detach_normalized(&mut self, note_id: NoteId, tag: &str) -> bool {
        let Some(tags) = self.note_tags.get_mut(&note_id) else {
            return false;
        };
        if !tags.remove(tag) {
            return false;
        }
        if tags.is_empty() {
            self.note_tags.remove(&note_id);
        }
        self.unlink(tag, note_id);
        true
    }

    fn unlink(&mut self, tag: &str, note_id: NoteId) {
        let Some(notes) = self.tags.get_mut(tag) else {
            return;
        };
        notes.remove(&note_id);
        if !notes.is_empty() {
            return;
        }
        self.tags.remove(tag);

        for word in tag_words(tag) {
            if let Some(tags) = self.words.get_mut(word) {
                tags.remove(tag);
                if tags.is_empty() {
                    self.words.remove(word);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  #Rust "), Some("rust".to_string()));
        assert_eq!(
            normalize_tag("Version   Control"),
            Some("version control".to_string())
        );
        assert_eq!(normalize_tag("Café"), Some("cafe".to_string()));
        assert_eq!(normalize_tag(" # "), None);
    }

    #[test]
    fn test_attach_and_lookup() {
        let mut index = TagIndex::new();
        assert!(index.attach(NoteId(1), "backend"));
        assert!(!index.attach(NoteId(1), "Backend"));
        index.attach(NoteId(2), "backend");

        let notes: Vec<NoteId> = index.notes_for_tag("BACKEND").into_iter().collect();
        assert_eq!(notes, vec![NoteId(1), NoteId(2)]);
        assert!(index.notes_for_tag("frontend").is_empty());
    }

    #[test]
    fn test_detach_absent_is_noop() {
        let mut index = TagIndex::new();
        assert!(!index.detach(NoteId(1), "missing"));

        index.attach(NoteId(1), "rust");
        assert!(index.detach(NoteId(1), "rust"));
        assert!(!index.detach(NoteId(1), "rust"));
        assert_eq!(index.tag_count(), 0);
        assert_eq!(index, TagIndex::new());
    }

    #[test]
    fn test_set_tags_applies_delta() {
        let mut index = TagIndex::new();
        index.set_tags(NoteId(1), ["python", "web"]);

        let delta = index.set_tags(NoteId(1), ["python", "api"]);
        assert_eq!(delta.added, vec!["api"]);
        assert_eq!(delta.removed, vec!["web"]);

        assert!(index.notes_for_tag("web").is_empty());
        assert_eq!(index.tags_for_note(NoteId(1)), vec!["api", "python"]);
        assert!(index.set_tags(NoteId(1), ["API", "#python"]).is_empty());
    }

    #[test]
    fn test_remove_note_drops_stale_ids() {
        let mut index = TagIndex::new();
        index.set_tags(NoteId(1), ["docker", "devops"]);
        index.set_tags(NoteId(2), ["docker"]);

        assert!(index.remove_note(NoteId(1)));
        assert!(!index.remove_note(NoteId(1)));

        assert_eq!(index.notes_for_tag("docker").len(), 1);
        assert!(index.notes_for_tag("devops").is_empty());
        assert!(!index.has_tag(NoteId(1), "docker"));
    }

    #[test]
    fn test_prefix_lookup() {
        let mut index = TagIndex::new();
        index.set_tags(NoteId(1), ["database", "devops", "data"]);
        index.set_tags(NoteId(2), ["database"]);

        assert_eq!(
            index.prefix_lookup("da", 10),
            vec![("data", 1), ("database", 2)]
        );
        assert_eq!(index.prefix_lookup("d", 1), vec![("data", 1)]);
    }

    #[test]
    fn test_tag_words_are_searchable() {
        let mut index = TagIndex::new();
        index.set_tags(NoteId(1), ["Web Development", "devops"]);
        index.set_tags(NoteId(2), ["development"]);

        let notes: Vec<NoteId> = index.notes_with_word("development").into_iter().collect();
        assert_eq!(notes, vec![NoteId(1), NoteId(2)]);
        assert_eq!(index.word_prefix_lookup("dev", 10), vec!["development", "devops"]);
        assert_eq!(index.tag_positions(NoteId(1), |w| w == "web"), vec![1]);
        assert!(index.has_tag_word(NoteId(1), |w| w.starts_with("devo")));
        assert!(!index.has_tag_word(NoteId(2), |w| w == "web"));

        index.remove_note(NoteId(1));
        index.remove_note(NoteId(2));
        assert!(index.notes_with_word("development").is_empty());
        assert!(index.word_prefix_lookup("de", 10).is_empty());
        assert_eq!(index, TagIndex::new());
    }

    #[test]
    fn test_shared_tag_word_survives_one_detach() {
        let mut index = TagIndex::new();
        index.attach(NoteId(1), "version control");
        index.attach(NoteId(2), "version control");

        index.detach(NoteId(1), "version control");
        assert_eq!(index.notes_with_word("control").len(), 1);
        assert!(index.notes_with_word("control").contains(&NoteId(2)));
    }

    proptest! {
        #[test]
        fn prop_set_tags_equals_detach_then_attach(
            before in proptest::collection::btree_set("[a-e]{1,2}", 0..6),
            after in proptest::collection::btree_set("[a-e]{1,2}", 0..6),
        ) {
            let mut via_set = TagIndex::new();
            via_set.set_tags(NoteId(1), &before);
            via_set.set_tags(NoteId(2), ["shared"]);
            let mut via_ops = via_set.clone();

            via_set.set_tags(NoteId(1), &after);

            for tag in before.difference(&after) {
                via_ops.detach(NoteId(1), tag);
            }
            for tag in after.difference(&before) {
                via_ops.attach(NoteId(1), tag);
            }

            prop_assert_eq!(via_set, via_ops);
        }
    }
}
