use std::collections::HashSet;

use shelf_common::api::{Document, DocumentId};

use crate::store::DocumentStore;

/// Ids of the documents the user has checked. Independent of filtering: a
/// selected document stays selected while hidden by the current filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: HashSet<DocumentId>,
}

/// State of the select-all control for the visible documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAllState {
    Nothing,
    Some(usize),
    All,
}

impl SelectAllState {
    pub fn label(self) -> String {
        match self {
            SelectAllState::Nothing => "Select All".into(),
            SelectAllState::Some(n) => format!("{n} selected"),
            SelectAllState::All => "Deselect All".into(),
        }
    }
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &HashSet<DocumentId> {
        &self.ids
    }

    /// Check or uncheck one document.
    pub fn set(&mut self, id: DocumentId, checked: bool) {
        if checked {
            self.ids.insert(id);
        } else {
            self.ids.remove(&id);
        }
    }

    /// Flip one document; returns whether it is now selected.
    pub fn toggle(&mut self, id: DocumentId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Replace the selection with exactly `docs`.
    pub fn select_only<'a, I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = &'a Document>,
    {
        self.ids = docs.into_iter().map(|d| d.id.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop ids that no longer refer to a stored document.
    pub fn prune(&mut self, store: &DocumentStore) {
        self.ids.retain(|id| store.contains(id));
    }

    /// Select-all state over `visible`. Selected documents hidden by the
    /// current filters are not counted.
    pub fn state_for(&self, visible: &[&Document]) -> SelectAllState {
        let selected = visible.iter().filter(|d| self.ids.contains(&d.id)).count();
        if selected == 0 {
            SelectAllState::Nothing
        } else if selected == visible.len() {
            SelectAllState::All
        } else {
            SelectAllState::Some(selected)
        }
    }
}
