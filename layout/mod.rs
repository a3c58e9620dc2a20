/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Incremental force-directed layout over the visible tag set.
//!
//! The controller wraps a hand-rolled iterative solver. On every
//! structural change it re-derives the visible node/link view, seeds
//! positions only for genuinely new nodes (stable parts of the graph
//! never visually reset), re-applies the pinning rules, and briefly
//! re-heats the solver energy so the graph re-settles.
//!
//! The controller is the only writer of `position`/`pinned` — user
//! drags enter through `begin_drag`/`drag_to`/`end_drag` so the solver
//! never fights the pointer.

pub mod profiles;

use std::collections::{HashMap, HashSet};

use euclid::default::{Point2D, Vector2D};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::graph::{TagEdge, TagForest, ZoneId};
use self::profiles::{LayoutProfileRegistry, LayoutProfileResolution};

/// Solver tuning knobs. Everything here is configuration, not contract;
/// profiles in [`profiles`] bundle curated sets.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayoutParams {
    /// Pairwise repulsion constant.
    pub c_repulse: f32,
    /// Repulsion multiplier for selected nodes.
    pub selected_repulse_boost: f32,
    /// Link spring constant.
    pub c_attract: f32,
    /// Ideal-distance scale fed into the repulsion kernel.
    pub k_scale: f32,
    /// Integration step.
    pub dt: f32,
    /// Per-tick displacement clamp.
    pub max_step: f32,
    /// Velocity damping per tick.
    pub damping: f32,
    /// Pull toward the viewport center.
    pub center_gravity: f32,
    /// Collision radius for unselected nodes.
    pub collision_radius: f32,
    /// Collision radius for selected nodes (drawn larger).
    pub collision_radius_selected: f32,
    /// Rest length of a parent link into an unselected child.
    pub link_rest_child: f32,
    /// Rest length of a parent link into a selected child.
    pub link_rest_anchor: f32,
    /// Rest length of a hybrid lineage link.
    pub link_rest_lineage: f32,
    pub link_strength_child: f32,
    pub link_strength_anchor: f32,
    pub link_strength_lineage: f32,
    /// Spread of the random offset applied when seeding new nodes.
    pub seed_jitter: f32,
    /// Energy injected on structural change.
    pub alpha_reheat: f32,
    /// Per-tick energy decay fraction.
    pub alpha_decay: f32,
    /// Energy floor below which the solver rests.
    pub alpha_min: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        // Compact, less jittery default:
        // - lower repulsion and ideal distance to avoid flyaway spread
        // - higher attraction to pull distant components back together
        // - lower step magnitude for more granular, predictable motion
        Self {
            c_repulse: 0.28,
            selected_repulse_boost: 1.6,
            c_attract: 0.22,
            k_scale: 0.42,
            dt: 0.03,
            max_step: 3.0,
            damping: 0.55,
            center_gravity: 0.18,
            collision_radius: 18.0,
            collision_radius_selected: 28.0,
            link_rest_child: 60.0,
            link_rest_anchor: 90.0,
            link_rest_lineage: 140.0,
            link_strength_child: 1.0,
            link_strength_anchor: 0.7,
            link_strength_lineage: 0.35,
            seed_jitter: 8.0,
            alpha_reheat: 1.0,
            alpha_decay: 0.02,
            alpha_min: 0.01,
        }
    }
}

/// Link classes drive rest length and strength: anchors (into a
/// selected node) sit long, direct parent-child links short and stiff,
/// lineage links longest and weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    Anchor,
    ParentChild,
    Lineage,
}

/// Snapshot of one visible node for rendering and solving.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleNode {
    pub id: Uuid,
    pub text: String,
    pub selected: bool,
    pub is_root: bool,
    pub loading: bool,
    pub hybrid: bool,
    pub position: Point2D<f32>,
    pub pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleLink {
    pub from: Uuid,
    pub to: Uuid,
    pub class: LinkClass,
}

/// The render-facing view: visible nodes with positions, plus links.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleGraph {
    pub zone: ZoneId,
    pub nodes: Vec<VisibleNode>,
    pub links: Vec<VisibleLink>,
}

/// Derive the visible node/link view from a forest: nodes with
/// `hidden == false`, a link from each visible parent to each visible
/// child, and lineage links where a hybrid and a source are both
/// visible.
pub fn visible_graph(forest: &TagForest) -> VisibleGraph {
    let mut nodes = Vec::new();
    let mut visible: HashSet<Uuid> = HashSet::new();
    for (_, node) in forest.nodes() {
        if node.hidden {
            continue;
        }
        visible.insert(node.id);
        nodes.push(VisibleNode {
            id: node.id,
            text: node.text.clone(),
            selected: node.selected,
            is_root: node.is_root(),
            loading: node.loading,
            hybrid: node.is_hybrid(),
            position: node.position.unwrap_or_else(Point2D::zero),
            pinned: node.pinned.is_some(),
        });
    }

    let mut links = Vec::new();
    for edge in forest.edges() {
        if !visible.contains(&edge.from) || !visible.contains(&edge.to) {
            continue;
        }
        let class = match edge.kind {
            TagEdge::Child => {
                if forest.find(edge.to).is_some_and(|node| node.selected) {
                    LinkClass::Anchor
                } else {
                    LinkClass::ParentChild
                }
            },
            TagEdge::HybridSource => LinkClass::Lineage,
        };
        links.push(VisibleLink {
            from: edge.from,
            to: edge.to,
            class,
        });
    }

    VisibleGraph {
        zone: forest.zone().clone(),
        nodes,
        links,
    }
}

#[derive(Debug, Default)]
struct ZoneSim {
    alpha: f32,
    last_revision: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DragState {
    zone: ZoneId,
    id: Uuid,
}

/// Adapts the forests to the solver: seeding, pinning, energy, and
/// per-tick integration.
pub struct LayoutController {
    params: LayoutParams,
    profiles: LayoutProfileRegistry,
    sims: HashMap<ZoneId, ZoneSim>,
    drag: Option<DragState>,
    rng: StdRng,
}

impl LayoutController {
    pub fn new() -> Self {
        Self::with_params(LayoutParams::default())
    }

    pub fn with_params(params: LayoutParams) -> Self {
        Self {
            params,
            profiles: LayoutProfileRegistry::default(),
            sims: HashMap::new(),
            drag: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic seeding for reproducible layouts in tests.
    pub fn with_seed(seed: u64) -> Self {
        let mut controller = Self::new();
        controller.rng = StdRng::seed_from_u64(seed);
        controller
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// Switch to a named profile; unknown ids fall back to the default
    /// profile. Returns the resolution so callers can surface fallback.
    pub fn apply_profile(&mut self, layout_id: &str) -> LayoutProfileResolution {
        let resolution = self.profiles.resolve(layout_id);
        self.params = resolution.profile.params;
        resolution
    }

    /// Current solver energy for a zone (0 when the zone is unknown).
    pub fn alpha(&self, zone: &ZoneId) -> f32 {
        self.sims.get(zone).map(|sim| sim.alpha).unwrap_or(0.0)
    }

    pub fn is_resting(&self, zone: &ZoneId) -> bool {
        self.alpha(zone) <= self.params.alpha_min
    }

    /// Inject energy so the zone visibly re-settles.
    pub fn reheat(&mut self, zone: &ZoneId) {
        self.sims.entry(zone.clone()).or_default().alpha = self.params.alpha_reheat;
    }

    /// Drop all per-zone solver state (and any active drag). Used when
    /// the forests are replaced wholesale.
    pub fn forget_zones(&mut self) {
        self.sims.clear();
        self.drag = None;
    }

    /// Re-adapt a zone to its forest after structural change: seed new
    /// nodes near their parent (falling back to the last-clicked tag,
    /// then the center), preserve everyone else's position and
    /// velocity, re-apply the pinning rules, and reheat. No-op while
    /// the revision is unchanged.
    pub fn sync(&mut self, forest: &mut TagForest) -> bool {
        let zone = forest.zone().clone();
        let sim = self.sims.entry(zone.clone()).or_default();
        if sim.last_revision == Some(forest.revision()) {
            return false;
        }
        sim.last_revision = Some(forest.revision());
        sim.alpha = self.params.alpha_reheat.max(sim.alpha);

        let visible: Vec<Uuid> = forest
            .nodes()
            .filter(|(_, node)| !node.hidden)
            .map(|(_, node)| node.id)
            .collect();

        // Seed positions for nodes never placed before.
        let fallback = forest
            .last_clicked()
            .and_then(|id| forest.find(id))
            .and_then(|node| node.position)
            .unwrap_or_else(Point2D::zero);
        let mut seeds: Vec<(Uuid, Point2D<f32>)> = Vec::new();
        for id in &visible {
            let Some(node) = forest.find(*id) else {
                continue;
            };
            if node.position.is_some() {
                continue;
            }
            let base = node
                .parent
                .and_then(|parent| forest.find(parent))
                .and_then(|parent| parent.position)
                .unwrap_or(fallback);
            let jitter = Vector2D::new(
                self.rng.gen_range(-self.params.seed_jitter..=self.params.seed_jitter),
                self.rng.gen_range(-self.params.seed_jitter..=self.params.seed_jitter),
            );
            seeds.push((*id, base + jitter));
        }
        for (id, position) in seeds {
            if let Some(node) = forest.find_mut(id) {
                node.position = Some(position);
                node.velocity = Vector2D::zero();
            }
        }

        // Pinning: a selected root anchors the layout at its current
        // position; anything with a visible parent moves freely; the
        // dragged node keeps its gesture pin.
        for id in visible {
            if self
                .drag
                .as_ref()
                .is_some_and(|drag| drag.zone == zone && drag.id == id)
            {
                continue;
            }
            let Some(node) = forest.find_mut(id) else {
                continue;
            };
            if node.is_root() && node.selected {
                node.pinned = node.position;
            } else {
                node.pinned = None;
            }
        }
        true
    }

    /// One solver tick. Returns false when the zone is at rest.
    pub fn step(&mut self, forest: &mut TagForest) -> bool {
        let zone = forest.zone().clone();
        let sim = self.sims.entry(zone).or_default();
        if sim.alpha <= self.params.alpha_min {
            return false;
        }
        let alpha = sim.alpha;
        sim.alpha = (alpha * (1.0 - self.params.alpha_decay)).max(self.params.alpha_min);

        let view = visible_graph(forest);
        if view.nodes.is_empty() {
            return false;
        }
        let index: HashMap<Uuid, usize> = view
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();
        let mut forces: Vec<Vector2D<f32>> = vec![Vector2D::zero(); view.nodes.len()];
        let k = self.params.k_scale * self.params.link_rest_child;

        // Mutual repulsion + collision separation.
        for i in 0..view.nodes.len() {
            for j in (i + 1)..view.nodes.len() {
                let a = &view.nodes[i];
                let b = &view.nodes[j];
                let delta = a.position - b.position;
                let dist = delta.length().max(0.5);
                let dir = delta / dist;

                let mut boost = 1.0;
                if a.selected {
                    boost *= self.params.selected_repulse_boost;
                }
                if b.selected {
                    boost *= self.params.selected_repulse_boost;
                }
                let repulse = self.params.c_repulse * boost * (k * k) / dist;
                forces[i] += dir * repulse;
                forces[j] -= dir * repulse;

                let radius = |selected: bool| {
                    if selected {
                        self.params.collision_radius_selected
                    } else {
                        self.params.collision_radius
                    }
                };
                let overlap = radius(a.selected) + radius(b.selected) - dist;
                if overlap > 0.0 {
                    let push = dir * (overlap * 0.5);
                    forces[i] += push;
                    forces[j] -= push;
                }
            }
        }

        // Link springs, class-dependent rest length and strength.
        for link in &view.links {
            let (Some(&from), Some(&to)) = (index.get(&link.from), index.get(&link.to)) else {
                continue;
            };
            let (rest, strength) = match link.class {
                LinkClass::Anchor => (self.params.link_rest_anchor, self.params.link_strength_anchor),
                LinkClass::ParentChild => {
                    (self.params.link_rest_child, self.params.link_strength_child)
                },
                LinkClass::Lineage => {
                    (self.params.link_rest_lineage, self.params.link_strength_lineage)
                },
            };
            let delta = view.nodes[to].position - view.nodes[from].position;
            let dist = delta.length().max(0.5);
            let stretch = dist - rest;
            let pull = delta / dist * (self.params.c_attract * strength * stretch);
            forces[from] += pull;
            forces[to] -= pull;
        }

        // Center gravity keeps disconnected clusters on screen.
        for (i, node) in view.nodes.iter().enumerate() {
            forces[i] += -node.position.to_vector() * self.params.center_gravity * 0.01;
        }

        // Semi-implicit integration with damping and step clamp.
        for (i, visible_node) in view.nodes.iter().enumerate() {
            let Some(node) = forest.find_mut(visible_node.id) else {
                continue;
            };
            if let Some(fixed) = node.pinned {
                node.position = Some(fixed);
                node.velocity = Vector2D::zero();
                continue;
            }
            let mut velocity = (node.velocity + forces[i] * self.params.dt) * self.params.damping;
            let mut step = velocity * alpha;
            let magnitude = step.length();
            if magnitude > self.params.max_step {
                step = step / magnitude * self.params.max_step;
                velocity = velocity / magnitude * self.params.max_step;
            }
            node.velocity = velocity;
            node.position = Some(visible_node.position + step);
        }
        true
    }

    /// Pin a node for the duration of a pointer gesture.
    pub fn begin_drag(&mut self, forest: &mut TagForest, id: Uuid) {
        let zone = forest.zone().clone();
        let Some(node) = forest.find_mut(id) else {
            return;
        };
        node.pinned = node.position;
        self.drag = Some(DragState { zone, id });
    }

    /// Move the dragged node; the pin follows the pointer so the solver
    /// routes around it instead of fighting it.
    pub fn drag_to(&mut self, forest: &mut TagForest, id: Uuid, position: Point2D<f32>) {
        let dragging = self
            .drag
            .as_ref()
            .is_some_and(|drag| drag.zone == *forest.zone() && drag.id == id);
        if !dragging {
            return;
        }
        if let Some(node) = forest.find_mut(id) {
            node.position = Some(position);
            node.pinned = Some(position);
            node.velocity = Vector2D::zero();
        }
    }

    /// Drop the gesture pin; selection anchors stay pinned.
    pub fn end_drag(&mut self, forest: &mut TagForest, id: Uuid) {
        let dragging = self
            .drag
            .as_ref()
            .is_some_and(|drag| drag.zone == *forest.zone() && drag.id == id);
        if !dragging {
            return;
        }
        self.drag = None;
        let zone = forest.zone().clone();
        if let Some(node) = forest.find_mut(id)
            && !(node.is_root() && node.selected)
        {
            node.pinned = None;
        }
        self.reheat(&zone);
    }
}

impl Default for LayoutController {
    fn default() -> Self {
        Self::new()
    }
}
