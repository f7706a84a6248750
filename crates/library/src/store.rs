use std::collections::HashSet;
use std::sync::Arc;

use shelf_common::api::{Document, DocumentId};

/// Ordered in-memory collection of documents.
///
/// The contents are an immutable snapshot: every mutation builds a new
/// vector and swaps it in, so a snapshot handed out earlier never changes
/// underneath its holder.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: Arc<Vec<Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Vec<Document>> {
        Arc::clone(&self.docs)
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.docs.iter().find(|d| &d.id == id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.get(id).is_some()
    }

    pub fn total_size(&self) -> u64 {
        self.docs.iter().map(|d| d.size).sum()
    }

    /// Append documents in order. Documents whose id is already present are
    /// dropped; returns how many were added.
    pub fn append(&mut self, new_docs: Vec<Document>) -> usize {
        let mut next = Vec::with_capacity(self.docs.len() + new_docs.len());
        next.extend(self.docs.iter().cloned());
        let added = push_unique(&mut next, new_docs);
        self.docs = Arc::new(next);
        added
    }

    /// Remove every document whose id is in `ids`, returning the removed
    /// documents in store order.
    pub fn remove_ids(&mut self, ids: &HashSet<DocumentId>) -> Vec<Document> {
        if ids.is_empty() {
            return Vec::new();
        }
        let (removed, kept): (Vec<Document>, Vec<Document>) =
            self.docs.iter().cloned().partition(|d| ids.contains(&d.id));
        if !removed.is_empty() {
            self.docs = Arc::new(kept);
        }
        removed
    }

    /// Replace the whole collection. Later duplicates of an id are dropped.
    pub fn replace(&mut self, docs: Vec<Document>) {
        let mut next = Vec::with_capacity(docs.len());
        push_unique(&mut next, docs);
        self.docs = Arc::new(next);
    }
}

fn push_unique(into: &mut Vec<Document>, docs: Vec<Document>) -> usize {
    let mut seen: HashSet<DocumentId> = into.iter().map(|d| d.id.clone()).collect();
    let mut added = 0;
    for doc in docs {
        if seen.insert(doc.id.clone()) {
            into.push(doc);
            added += 1;
        } else {
            tracing::warn!("dropping document with duplicate id {}", doc.id);
        }
    }
    added
}
