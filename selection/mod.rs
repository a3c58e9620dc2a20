/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Selection state machine over the tag forests.
//!
//! Root tags obey single-selection-per-zone: selecting one force-
//! unselects the previously selected root, cascading removal of that
//! subtree's dynamically generated descendants and of any hybrids
//! rooted in it. Secondary (non-root) tags toggle freely and feed the
//! hybrid synthesis manager when two or more siblings are selected at
//! once.
//!
//! All writes go through the `NodeStore` mutators, so `hidden` is
//! re-derived inside each mutation and observers never see a
//! half-updated forest.

use uuid::Uuid;

use crate::graph::{GraphError, NodeStore, TagOrigin, ZoneId};
use crate::hybrid;

/// What a toggle did, so the reducer can drive follow-up effects
/// (generation dispatch, hybrid debounce) without re-inspecting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A root entered `Selected(loading)`; children generation should be
    /// requested. `deposed` is the sibling root that was force-unselected.
    RootSelected { deposed: Option<Uuid> },
    RootDeselected,
    /// A secondary tag was selected; `selected_siblings` is the full set
    /// of currently selected children of `parent` (including this one).
    SecondarySelected {
        parent: Uuid,
        selected_siblings: Vec<Uuid>,
    },
    SecondaryDeselected {
        parent: Uuid,
        selected_siblings: Vec<Uuid>,
    },
    /// The toggled tag was a live hybrid; it was torn down (sources
    /// restored) instead of merely deselected.
    HybridRemoved { parent: Uuid },
}

/// Toggle a tag's selection, cascading per the state machine rules.
pub(crate) fn toggle_tag(
    store: &mut NodeStore,
    zone: &ZoneId,
    id: Uuid,
) -> Result<ToggleOutcome, GraphError> {
    let node = store
        .find_node(zone, id)
        .ok_or(GraphError::NodeNotFound(id))?;
    let parent = node.parent;
    let was_selected = node.selected;
    let is_hybrid = node.is_hybrid();

    if let Some(forest) = store.forest_mut(zone) {
        forest.set_last_clicked(Some(id));
    }

    match (parent, was_selected) {
        (None, false) => {
            let deposed = store
                .forest(zone)
                .and_then(|forest| forest.selected_root())
                .filter(|other| *other != id);
            if let Some(other) = deposed {
                deselect_cascade(store, zone, other)?;
            }
            store.set_selected(zone, id, true)?;
            if let Some(forest) = store.forest_mut(zone)
                && let Some(node) = forest.find_mut(id)
            {
                node.loading = true;
            }
            Ok(ToggleOutcome::RootSelected { deposed })
        },
        (None, true) => {
            deselect_cascade(store, zone, id)?;
            Ok(ToggleOutcome::RootDeselected)
        },
        (Some(parent), false) => {
            store.set_selected(zone, id, true)?;
            Ok(ToggleOutcome::SecondarySelected {
                parent,
                selected_siblings: selected_children(store, zone, parent),
            })
        },
        (Some(parent), true) if is_hybrid => {
            hybrid::remove_hybrid(store, zone, id)?;
            Ok(ToggleOutcome::HybridRemoved { parent })
        },
        (Some(parent), true) => {
            deselect_cascade(store, zone, id)?;
            Ok(ToggleOutcome::SecondaryDeselected {
                parent,
                selected_siblings: selected_children(store, zone, parent),
            })
        },
    }
}

/// Currently selected children of `parent`, in display order.
pub(crate) fn selected_children(store: &NodeStore, zone: &ZoneId, parent: Uuid) -> Vec<Uuid> {
    let Some(forest) = store.forest(zone) else {
        return Vec::new();
    };
    forest
        .children_of(parent)
        .into_iter()
        .filter(|child| forest.find(*child).is_some_and(|node| node.selected))
        .collect()
}

/// Deselect `id` and cascade: hybrids rooted in the subtree are torn
/// down first, dynamically generated descendants are removed,
/// predefined descendants are unselected (and hidden by derivation),
/// and any held pins are released.
pub(crate) fn deselect_cascade(
    store: &mut NodeStore,
    zone: &ZoneId,
    id: Uuid,
) -> Result<(), GraphError> {
    store
        .find_node(zone, id)
        .ok_or(GraphError::NodeNotFound(id))?;

    // Hybrid teardown restores source visibility before the rest of the
    // subtree collapses; nested hybrids recurse deepest-first.
    let hybrids: Vec<Uuid> = store
        .forest(zone)
        .map(|forest| {
            forest
                .descendants(id)
                .into_iter()
                .filter(|tag| forest.find(*tag).is_some_and(|node| node.is_hybrid()))
                .collect()
        })
        .unwrap_or_default();
    for hybrid_id in hybrids {
        // Already-removed nested hybrids surface as a no-op.
        hybrid::remove_hybrid(store, zone, hybrid_id)?;
    }

    // Remove generated descendants outright; predefined ones survive.
    let dynamic_roots: Vec<Uuid> = store
        .forest(zone)
        .map(|forest| {
            forest
                .descendants(id)
                .into_iter()
                .filter(|tag| {
                    forest.find(*tag).is_some_and(|node| {
                        node.dynamic
                            && node.origin == TagOrigin::Generated
                            && node
                                .parent
                                .and_then(|parent| forest.find(parent))
                                .is_none_or(|parent| !parent.dynamic)
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    for dynamic_root in dynamic_roots {
        if store.find_node(zone, dynamic_root).is_some() {
            store.remove_subtree(zone, dynamic_root)?;
        }
    }

    // Unselect what remains, deepest nodes implicitly covered by the
    // per-node writes; each write releases pins and refreshes `hidden`.
    let remaining: Vec<Uuid> = store
        .forest(zone)
        .map(|forest| forest.descendants(id))
        .unwrap_or_default();
    for descendant in remaining {
        store.set_selected(zone, descendant, false)?;
    }
    store.set_selected(zone, id, false)?;
    Ok(())
}
