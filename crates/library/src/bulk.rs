use shelf_common::api::Document;

use crate::selection::SelectionSet;

/// Documents a bulk action (download, remove) applies to: the selected
/// documents among those currently visible if anything is selected,
/// otherwise everything visible.
///
/// A selected document hidden by the current filters is never targeted, so
/// a selection that is entirely filtered out yields no targets.
pub fn targets<'a>(visible: &[&'a Document], selection: &SelectionSet) -> Vec<&'a Document> {
    if selection.is_empty() {
        return visible.to_vec();
    }
    visible
        .iter()
        .copied()
        .filter(|d| selection.contains(&d.id))
        .collect()
}
