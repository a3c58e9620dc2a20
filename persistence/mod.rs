/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session snapshot build and restore.
//!
//! The engine never touches disk: it produces a [`SessionSnapshot`] for
//! the external persistence collaborator and rebuilds state from one on
//! load. Restore is tolerant by construction — unparseable ids are
//! skipped, tags unreachable from a root are dropped, lineage pointing
//! at missing tags is scrubbed, and invariant violations (two selected
//! roots in one zone) are repaired rather than surfaced as failures.

pub mod types;

use euclid::default::Point2D;
use log::warn;
use std::collections::HashMap;
use uuid::Uuid;

use crate::graph::{NodeStore, TagForest, TagOrigin, TagSeed, ZoneId};
use crate::viewport::ViewportStore;
use types::{PersistedOrigin, PersistedTag, SessionSnapshot};

fn origin_to_persisted(origin: TagOrigin) -> PersistedOrigin {
    match origin {
        TagOrigin::Predefined => PersistedOrigin::Predefined,
        TagOrigin::User => PersistedOrigin::User,
        TagOrigin::Generated => PersistedOrigin::Generated,
    }
}

fn origin_from_persisted(origin: PersistedOrigin) -> TagOrigin {
    match origin {
        PersistedOrigin::Predefined => TagOrigin::Predefined,
        PersistedOrigin::User => TagOrigin::User,
        PersistedOrigin::Generated => TagOrigin::Generated,
    }
}

/// Serialize the whole session: every tag in every zone (flat, in
/// root-then-preorder order per zone) plus viewports and focus.
pub fn build_snapshot(
    store: &NodeStore,
    viewports: &ViewportStore,
    focused_zone: Option<&ZoneId>,
    timestamp_secs: u64,
) -> SessionSnapshot {
    let mut tags = Vec::new();
    let mut zone_ids: Vec<&ZoneId> = store.zone_ids().collect();
    zone_ids.sort();
    for zone in zone_ids {
        let Some(forest) = store.forest(zone) else {
            continue;
        };
        for root in forest.roots() {
            let mut order = vec![*root];
            order.extend(forest.descendants(*root));
            for id in order {
                if let Some(node) = forest.find(id) {
                    tags.push(PersistedTag {
                        tag_id: node.id.to_string(),
                        zone: node.zone.as_str().to_string(),
                        text: node.text.clone(),
                        selected: node.selected,
                        dynamic: node.dynamic,
                        origin: origin_to_persisted(node.origin),
                        parent_id: node.parent.map(|parent| parent.to_string()),
                        children: node.children.iter().map(|child| child.to_string()).collect(),
                        source_tag_ids: node
                            .source_tags
                            .iter()
                            .map(|source| source.to_string())
                            .collect(),
                        merged_into: node.merged_into.map(|into| into.to_string()),
                        position_x: node.position.map(|p| p.x),
                        position_y: node.position.map(|p| p.y),
                        pinned_x: node.pinned.map(|p| p.x),
                        pinned_y: node.pinned.map(|p| p.y),
                    });
                }
            }
        }
    }

    let zone_viewports = (!viewports.is_empty()).then(|| {
        viewports
            .to_map()
            .into_iter()
            .filter_map(|(zone, state)| serde_json::to_value(state).ok().map(|v| (zone, v)))
            .collect()
    });

    SessionSnapshot {
        focused_zone: focused_zone.map(|zone| zone.as_str().to_string()),
        tags,
        zone_viewports,
        timestamp_secs,
    }
}

/// Rebuild the forests from a snapshot. Returns the store plus the
/// restored focused zone (when it names a zone that actually exists).
pub fn store_from_snapshot(snapshot: &SessionSnapshot) -> (NodeStore, Option<ZoneId>) {
    let mut store = NodeStore::new();

    // Index records by id, dropping the unparseable up front. First
    // record wins on duplicate ids.
    let mut by_id: HashMap<Uuid, &PersistedTag> = HashMap::new();
    for tag in &snapshot.tags {
        match Uuid::parse_str(&tag.tag_id) {
            Ok(id) => {
                by_id.entry(id).or_insert(tag);
            },
            Err(_) => warn!("Dropping tag with unparseable id '{}'", tag.tag_id),
        }
    }

    // Roots first (in recorded order), then each root's recorded child
    // lists recursively so display order survives. Tags whose parent
    // never materializes are unreachable and get dropped.
    for tag in &snapshot.tags {
        if tag.parent_id.is_some() {
            continue;
        }
        let Ok(id) = Uuid::parse_str(&tag.tag_id) else {
            continue;
        };
        let zone = ZoneId::new(tag.zone.clone());
        let forest = store.ensure_zone(&zone);
        restore_subtree(forest, id, tag, &by_id);
    }
    let restored: usize = store
        .zone_ids()
        .filter_map(|zone| store.forest(zone))
        .map(|forest| forest.node_count())
        .sum();
    if restored < by_id.len() {
        warn!(
            "Dropped {} tag(s) unreachable from any root",
            by_id.len() - restored
        );
    }

    // Second pass: lineage, merge marks, and invariant repair.
    let zones: Vec<ZoneId> = store.zone_ids().cloned().collect();
    for zone in &zones {
        let lineage: Vec<(Uuid, Vec<Uuid>, Option<Uuid>)> = store
            .forest(zone)
            .map(|forest| {
                forest
                    .nodes()
                    .filter_map(|(_, node)| {
                        let record = by_id.get(&node.id)?;
                        let sources: Vec<Uuid> = record
                            .source_tag_ids
                            .iter()
                            .filter_map(|raw| Uuid::parse_str(raw).ok())
                            .filter(|source| forest.find(*source).is_some())
                            .collect();
                        let merged = record
                            .merged_into
                            .as_deref()
                            .and_then(|raw| Uuid::parse_str(raw).ok())
                            .filter(|into| forest.find(*into).is_some());
                        if sources.is_empty() && merged.is_none() {
                            return None;
                        }
                        Some((node.id, sources, merged))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(forest) = store.forest_mut(zone) {
            for (id, sources, merged) in lineage {
                if !sources.is_empty() {
                    let _ = forest.link_sources(id, &sources);
                }
                if merged.is_some()
                    && let Some(node) = forest.find_mut(id)
                {
                    node.merged_into = merged;
                }
            }

            // Single selected root per zone: demote any extras.
            let selected_roots: Vec<Uuid> = forest
                .roots()
                .iter()
                .copied()
                .filter(|root| forest.find(*root).is_some_and(|node| node.selected))
                .collect();
            for extra in selected_roots.iter().skip(1) {
                warn!("Demoting extra selected root {extra} in zone '{zone}'");
                if let Some(node) = forest.find_mut(*extra) {
                    node.selected = false;
                    node.pinned = None;
                }
            }

            forest.refresh_hidden_all();
            forest.bump_revision();
        }
    }

    let focused = snapshot
        .focused_zone
        .as_deref()
        .map(ZoneId::from)
        .filter(|zone| store.forest(zone).is_some());
    (store, focused)
}

fn restore_subtree(
    forest: &mut TagForest,
    id: Uuid,
    tag: &PersistedTag,
    by_id: &HashMap<Uuid, &PersistedTag>,
) {
    // Also the cycle guard: a malformed child list that loops back to
    // an inserted tag stops here.
    if forest.find(id).is_some() {
        warn!("Skipping duplicate tag id {id}");
        return;
    }
    let seed = TagSeed {
        text: tag.text.clone(),
        origin: origin_from_persisted(tag.origin),
        dynamic: tag.dynamic,
    };
    let inserted = match &tag.parent_id {
        None => Some(forest.add_root_with_id(id, seed)),
        Some(raw_parent) => Uuid::parse_str(raw_parent)
            .ok()
            .and_then(|parent| forest.add_child_with_id(parent, id, seed).ok()),
    };
    if inserted.is_none() {
        warn!("Dropping tag {id} with unrestorable parent");
        return;
    }

    if let Some(node) = forest.find_mut(id) {
        node.selected = tag.selected;
        node.position = match (tag.position_x, tag.position_y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point2D::new(x, y)),
            _ => None,
        };
        node.pinned = match (tag.pinned_x, tag.pinned_y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point2D::new(x, y)),
            _ => None,
        };
    }

    for child_raw in &tag.children {
        let Ok(child_id) = Uuid::parse_str(child_raw) else {
            warn!("Dropping child with unparseable id '{child_raw}'");
            continue;
        };
        let Some(child_tag) = by_id.get(&child_id) else {
            warn!("Dropping dangling child reference {child_id}");
            continue;
        };
        restore_subtree(forest, child_id, child_tag, by_id);
    }
}
