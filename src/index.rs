use std::collections::HashMap;

use crate::db::EntityStore;
use crate::errors::{AppError, AppResult};
use crate::policy::RolePolicy;
use crate::types::{Entity, EntityKind, ResultGroup, SearchResult, SearchResults, SearchStatus};

/// Queries shorter than this (after trim) never reach a corpus.
pub const MIN_QUERY_LEN: usize = 2;

/// Anything that can hand over the full snapshot of one corpus.
pub trait CorpusSource {
    fn corpus(&self, kind: EntityKind) -> AppResult<Vec<Entity>>;
}

impl<S: EntityStore + ?Sized> CorpusSource for S {
    fn corpus(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
        self.snapshot(kind)
    }
}

/// Pre-fetched snapshots. A corpus that failed to load is kept as its error text.
#[derive(Debug, Clone, Default)]
pub struct Corpora {
    snapshots: HashMap<EntityKind, Result<Vec<Entity>, String>>,
}

impl Corpora {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups records by their own kind.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut corpora = Self::new();
        for entity in entities {
            if let Ok(items) = corpora
                .snapshots
                .entry(entity.kind())
                .or_insert_with(|| Ok(Vec::new()))
            {
                items.push(entity);
            }
        }
        corpora
    }

    pub fn insert(&mut self, kind: EntityKind, snapshot: AppResult<Vec<Entity>>) {
        self.snapshots
            .insert(kind, snapshot.map_err(|e| e.to_string()));
    }
}

impl CorpusSource for Corpora {
    fn corpus(&self, kind: EntityKind) -> AppResult<Vec<Entity>> {
        match self.snapshots.get(&kind) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(reason)) => Err(AppError::Corpus {
                kind,
                reason: reason.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Case-insensitive substring match of an already lowercased needle against the
/// kind's search fields.
pub fn matches_query(entity: &Entity, needle: &str) -> bool {
    entity
        .search_fields()
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Multi-corpus text search for the header.
#[derive(Debug, Clone, Copy)]
pub struct SearchIndexer {
    min_query_len: usize,
}

impl Default for SearchIndexer {
    fn default() -> Self {
        Self::new(MIN_QUERY_LEN)
    }
}

impl SearchIndexer {
    pub fn new(min_query_len: usize) -> Self {
        Self {
            min_query_len: min_query_len.max(1),
        }
    }

    /// Scan every corpus visible to `policy` and group the matches in display order.
    /// A corpus that fails to load is logged and skipped; the others still contribute.
    pub fn search<C>(&self, query: &str, corpora: &C, policy: &RolePolicy) -> SearchResults
    where
        C: CorpusSource + ?Sized,
    {
        let trimmed = query.trim();
        if trimmed.chars().count() < self.min_query_len {
            return SearchResults {
                query: query.to_string(),
                ..SearchResults::default()
            };
        }
        let needle = trimmed.to_lowercase();

        let mut results = SearchResults {
            query: query.to_string(),
            status: SearchStatus::Ready,
            ..SearchResults::default()
        };
        for kind in policy.visible_kinds() {
            let corpus = match corpora.corpus(kind) {
                Ok(corpus) => corpus,
                Err(e) => {
                    tracing::warn!(kind = kind.as_str(), "Skipping corpus during search: {e}");
                    results.skipped.push(kind);
                    continue;
                }
            };

            let items: Vec<SearchResult> = corpus
                .iter()
                .filter(|entity| entity.kind() == kind)
                .filter(|entity| matches_query(entity, &needle))
                .map(|entity| SearchResult {
                    id: entity.id().to_string(),
                    title: entity.title(),
                    description: entity.description().map(ToString::to_string),
                    kind,
                    link: policy.link(kind, entity.id()),
                })
                .collect();

            if !items.is_empty() {
                results.groups.push(ResultGroup { kind, items });
            }
        }

        tracing::debug!(
            matches = results.len(),
            skipped = results.skipped.len(),
            "quick search finished"
        );
        results
    }
}
