//! Search collaborator seam.
//!
//! The registry feeds a [`SearchIndex`] with `(reference, kind, content)`
//! documents on open and invalidates the impacted references after every
//! commit. [`LexicalSearch`] is the built-in implementation; an embedding
//! engine plugs in through the same trait.

use crate::types::{SearchDocument, SearchHit};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Characters of element content returned with a hit.
const SNIPPET_CHARS: usize = 160;

/// Per-repository document store answering free-text queries.
pub trait SearchIndex: Send + Sync {
    /// Replaces everything known about `repository`.
    fn index_repository(&mut self, repository: &str, documents: Vec<SearchDocument>);

    /// Drops stale documents for `impacted` and stores `fresh` ones.
    fn invalidate(
        &mut self,
        repository: &str,
        impacted: &BTreeSet<String>,
        fresh: Vec<SearchDocument>,
    );

    /// Forgets `repository`.
    fn drop_repository(&mut self, repository: &str);

    /// Best matches for `query`, highest score first.
    fn search(&self, repository: &str, query: &str, limit: usize) -> Vec<SearchHit>;
}

#[derive(Debug, Clone)]
struct Entry {
    document: SearchDocument,
    tokens: HashMap<String, usize>,
}

/// Identifier-token overlap search.
#[derive(Debug, Default, Clone)]
pub struct LexicalSearch {
    repositories: HashMap<String, BTreeMap<String, Entry>>,
}

impl LexicalSearch {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored for `repository`.
    pub fn len(&self, repository: &str) -> usize {
        self.repositories.get(repository).map_or(0, BTreeMap::len)
    }

    fn entry(document: SearchDocument) -> Entry {
        let mut tokens = HashMap::new();
        for token in tokenize(&document.reference)
            .into_iter()
            .chain(tokenize(&document.content))
        {
            *tokens.entry(token).or_insert(0) += 1;
        }
        Entry { document, tokens }
    }
}

impl SearchIndex for LexicalSearch {
    fn index_repository(&mut self, repository: &str, documents: Vec<SearchDocument>) {
        let entries = documents
            .into_iter()
            .map(|d| (d.reference.clone(), Self::entry(d)))
            .collect();
        self.repositories.insert(repository.to_string(), entries);
    }

    fn invalidate(
        &mut self,
        repository: &str,
        impacted: &BTreeSet<String>,
        fresh: Vec<SearchDocument>,
    ) {
        let entries = self.repositories.entry(repository.to_string()).or_default();
        for reference in impacted {
            entries.remove(reference);
        }
        for document in fresh {
            entries.insert(document.reference.clone(), Self::entry(document));
        }
    }

    fn drop_repository(&mut self, repository: &str) {
        self.repositories.remove(repository);
    }

    fn search(&self, repository: &str, query: &str, limit: usize) -> Vec<SearchHit> {
        let Some(entries) = self.repositories.get(repository) else {
            return Vec::new();
        };
        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = entries
            .values()
            .filter_map(|entry| {
                let matched = terms.iter().filter(|t| entry.tokens.contains_key(*t)).count();
                if matched == 0 {
                    return None;
                }
                let frequency: usize = terms.iter().filter_map(|t| entry.tokens.get(t)).sum();
                let coverage = matched as f32 / terms.len() as f32;
                let score = coverage + (frequency as f32).ln_1p() / 10.0;
                Some(SearchHit {
                    reference: entry.document.reference.clone(),
                    kind: entry.document.kind,
                    score,
                    snippet: entry.document.content.chars().take(SNIPPET_CHARS).collect(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.reference.len().cmp(&b.reference.len()))
                .then_with(|| a.reference.cmp(&b.reference))
        });
        hits.truncate(limit);
        hits
    }
}

/// Lowercased identifier tokens; `snake_case` and `camelCase` are split.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens.retain(|t| t.len() > 1);
    tokens
}
