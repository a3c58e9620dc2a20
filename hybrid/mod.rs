/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Hybrid tag synthesis and teardown.
//!
//! When two or more siblings are selected at once, a debounce window
//! coalesces the gesture into a single synthesis request. The resulting
//! hybrid tag records its sources as reference lineage, hides them
//! (retained for restoration), and owns its generated elaboration
//! children outright. Teardown is recursive (nested hybrids first) and
//! idempotent.

use std::time::{Duration, Instant};

use log::debug;
use uuid::Uuid;

use crate::generation::HybridConcept;
use crate::graph::{GraphError, NodeStore, TagSeed, ZoneId};
use crate::selection;

/// A debounce window that has elapsed: synthesize now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSynthesis {
    pub zone: ZoneId,
    pub parent: Uuid,
    pub sources: Vec<Uuid>,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone)]
struct Armed {
    zone: ZoneId,
    parent: Uuid,
    deadline: Instant,
}

/// Single coalescing timer for multi-select gestures. Each qualifying
/// selection re-arms it; dropping below two selected siblings disarms
/// it; the authoritative sibling set is re-read when the window fires.
#[derive(Debug, Default)]
pub struct HybridDebounce {
    armed: Option<Armed>,
}

impl HybridDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// React to a secondary selection change under `parent`.
    pub(crate) fn note_selection_change(
        &mut self,
        store: &NodeStore,
        zone: &ZoneId,
        parent: Uuid,
        now: Instant,
        delay: Duration,
    ) {
        let selected = selection::selected_children(store, zone, parent);
        if selected.len() >= 2 {
            self.armed = Some(Armed {
                zone: zone.clone(),
                parent,
                deadline: now + delay,
            });
        } else if self
            .armed
            .as_ref()
            .is_some_and(|armed| armed.zone == *zone && armed.parent == parent)
        {
            self.armed = None;
        }
    }

    /// Fire the window if its deadline has passed. The selected sibling
    /// set is re-read here; a gesture that fell back below two selected
    /// siblings fizzles silently.
    pub(crate) fn poll(&mut self, store: &NodeStore, now: Instant) -> Option<PendingSynthesis> {
        let armed = self.armed.as_ref()?;
        if armed.deadline > now {
            return None;
        }
        let Armed { zone, parent, .. } = self.armed.take()?;

        let sources = selection::selected_children(store, &zone, parent);
        if sources.len() < 2 {
            debug!("hybrid window fired with <2 selected siblings; dropping");
            return None;
        }
        let forest = store.forest(&zone)?;
        let texts = sources
            .iter()
            .filter_map(|source| forest.find(*source))
            .map(|node| node.text.clone())
            .collect();
        Some(PendingSynthesis {
            zone,
            parent,
            sources,
            texts,
        })
    }
}

/// Deterministic stand-in content when either generation call fails:
/// the source texts joined as the label, and the sources themselves
/// re-offered as elaborations.
pub fn fallback_concept(texts: &[String]) -> HybridConcept {
    HybridConcept {
        label: texts.join(" + "),
        elaborations: texts.to_vec(),
    }
}

/// Materialize a synthesized hybrid under `parent`. Returns `Ok(None)`
/// when the triggering gesture has been superseded (a source vanished
/// or was deselected while generation ran) — the outcome is discarded,
/// not an error.
pub(crate) fn apply_synthesis(
    store: &mut NodeStore,
    zone: &ZoneId,
    parent: Uuid,
    sources: &[Uuid],
    concept: HybridConcept,
) -> Result<Option<Uuid>, GraphError> {
    // The anchor recorded at debounce time may have gone stale while
    // generation ran; re-resolve it from the sibling set (this is what
    // keeps nested hybrids parented under their owning hybrid).
    let parent = if store.find_node(zone, parent).is_some() {
        parent
    } else {
        match parent_hybrid_of(store, zone, sources) {
            Some(owner) => owner,
            None => {
                debug!("hybrid parent vanished before synthesis applied; dropping");
                return Ok(None);
            },
        }
    };
    let sources_live = sources.iter().all(|source| {
        store
            .find_node(zone, *source)
            .is_some_and(|node| node.selected && node.parent == Some(parent))
    });
    if sources.len() < 2 || !sources_live {
        debug!("hybrid sources changed before synthesis applied; dropping");
        return Ok(None);
    }

    let hybrid = store.add_child(zone, parent, TagSeed::generated(concept.label))?;
    if let Some(forest) = store.forest_mut(zone) {
        forest.link_sources(hybrid, sources)?;
    }

    for source in sources {
        store.set_selected(zone, *source, false)?;
        if let Some(forest) = store.forest_mut(zone) {
            forest.set_merged(*source, Some(hybrid))?;
        }
    }

    // Selected before its children arrive so they materialize visible.
    store.set_selected(zone, hybrid, true)?;
    for text in concept.elaborations {
        if !text.trim().is_empty() {
            store.add_child(zone, hybrid, TagSeed::generated(text))?;
        }
    }
    Ok(Some(hybrid))
}

/// Tear down a hybrid: nested hybrids first, then its own children
/// (unselected, removed with the subtree), then source restoration,
/// then the hybrid itself. Safe to call twice and on childless hybrids.
pub(crate) fn remove_hybrid(
    store: &mut NodeStore,
    zone: &ZoneId,
    id: Uuid,
) -> Result<(), GraphError> {
    let Some(node) = store.find_node(zone, id) else {
        return Ok(());
    };
    if !node.is_hybrid() {
        return Ok(());
    }
    let children = node.children.clone();
    let sources = node.source_tags.clone();

    for child in &children {
        if store
            .find_node(zone, *child)
            .is_some_and(|node| node.is_hybrid())
        {
            remove_hybrid(store, zone, *child)?;
        }
    }

    for child in children {
        if store.find_node(zone, child).is_some() {
            store.set_selected(zone, child, false)?;
        }
    }

    for source in sources {
        if store.find_node(zone, source).is_some() {
            store.set_selected(zone, source, false)?;
            if let Some(forest) = store.forest_mut(zone) {
                forest.set_merged(source, None)?;
            }
        }
    }

    store.remove_subtree(zone, id)
}

/// Resolve the hybrid (if any) whose children contain the whole sibling
/// set — the anchor for nested-hybrid layout distance and direction.
pub fn parent_hybrid_of(store: &NodeStore, zone: &ZoneId, siblings: &[Uuid]) -> Option<Uuid> {
    if siblings.is_empty() {
        return None;
    }
    let forest = store.forest(zone)?;
    forest
        .nodes()
        .find(|(_, node)| {
            node.is_hybrid()
                && siblings
                    .iter()
                    .all(|sibling| node.children.contains(sibling))
        })
        .map(|(_, node)| node.id)
}
