/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Engine facade: state ownership, the intent reducer, and the tick.
//!
//! `DreamGraphApp` owns the forests, layout controller, viewport store,
//! generation coordinator, and hybrid debounce. Every mutation enters
//! through `apply_intent` (or a method it calls), keeping the single-
//! write-path boundary: pointer gestures arrive as [`TagIntent`]s from
//! the rendering collaborator, asynchronous generation results are
//! drained on [`DreamGraphApp::update`], and the layout controller only
//! ever observes complete post-mutation states.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use euclid::default::Point2D;
use log::{debug, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::generation::{
    GenerationCoordinator, GenerationOutcome, GenerationWorker, OutcomePayload, TagGenerator,
    filter_new_texts,
};
use crate::graph::{NodeStore, StoreEvent, TagSeed, TagTemplate, ZoneId};
use crate::hybrid::{self, HybridDebounce};
use crate::layout::{LayoutController, VisibleGraph, visible_graph};
use crate::persistence::{self, types::SessionSnapshot};
use crate::selection::{self, ToggleOutcome};
use crate::viewport::{ViewportState, ViewportStore};

/// Non-fatal events surfaced to the host's notification collaborator.
/// Calls are fire-and-forget; the engine never waits on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotice {
    /// Child generation failed; the tag stays usable with its
    /// predefined children only.
    GenerationFailed {
        zone: ZoneId,
        tag: Uuid,
        message: String,
    },
    /// Hybrid synthesis failed; deterministic fallback content was used
    /// so the merge still completed.
    HybridFellBack {
        zone: ZoneId,
        parent: Uuid,
        message: String,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: EngineNotice);
}

/// Default no-op notifier.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: EngineNotice) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsError(pub String);

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "settings error: {}", self.0)
    }
}

/// Engine tuning. Everything time- or size-sensitive lives here rather
/// than as magic numbers at use sites; setters clamp to sane ranges.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Multi-select coalescing window before hybrid synthesis fires.
    pub hybrid_debounce_ms: u64,
    /// Cap on generated children applied per request.
    pub max_generated_children: usize,
    /// Named layout profile applied at startup.
    pub layout_profile: String,
}

impl EngineSettings {
    pub const DEFAULT_HYBRID_DEBOUNCE_MS: u64 = 1000;
    pub const MIN_HYBRID_DEBOUNCE_MS: u64 = 100;
    pub const MAX_HYBRID_DEBOUNCE_MS: u64 = 10_000;
    pub const DEFAULT_MAX_GENERATED_CHILDREN: usize = 8;
    pub const MIN_MAX_GENERATED_CHILDREN: usize = 1;
    pub const MAX_MAX_GENERATED_CHILDREN: usize = 32;

    pub fn hybrid_debounce(&self) -> Duration {
        Duration::from_millis(self.hybrid_debounce_ms)
    }

    pub fn set_hybrid_debounce_ms(&mut self, ms: u64) {
        self.hybrid_debounce_ms = ms.clamp(
            Self::MIN_HYBRID_DEBOUNCE_MS,
            Self::MAX_HYBRID_DEBOUNCE_MS,
        );
    }

    pub fn set_max_generated_children(&mut self, count: usize) {
        self.max_generated_children = count.clamp(
            Self::MIN_MAX_GENERATED_CHILDREN,
            Self::MAX_MAX_GENERATED_CHILDREN,
        );
    }

    /// Parse from TOML, clamping out-of-range values instead of
    /// rejecting them.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let mut settings: EngineSettings =
            toml::from_str(raw).map_err(|e| SettingsError(e.to_string()))?;
        settings.set_hybrid_debounce_ms(settings.hybrid_debounce_ms);
        settings.set_max_generated_children(settings.max_generated_children);
        Ok(settings)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hybrid_debounce_ms: Self::DEFAULT_HYBRID_DEBOUNCE_MS,
            max_generated_children: Self::DEFAULT_MAX_GENERATED_CHILDREN,
            layout_profile: crate::layout::profiles::LAYOUT_ID_DEFAULT.to_string(),
        }
    }
}

/// Explicit run-once flags for session-scoped side effects, resettable
/// so tests (and fresh sessions) can repeat them.
#[derive(Debug, Default)]
pub struct SessionContext {
    seeded_zones: HashSet<ZoneId>,
}

impl SessionContext {
    pub fn starter_tags_seeded(&self, zone: &ZoneId) -> bool {
        self.seeded_zones.contains(zone)
    }

    fn mark_seeded(&mut self, zone: &ZoneId) {
        self.seeded_zones.insert(zone.clone());
    }

    pub fn reset(&mut self) {
        self.seeded_zones.clear();
    }
}

/// User gestures and host requests, applied through the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum TagIntent {
    ToggleTag {
        zone: ZoneId,
        id: Uuid,
    },
    /// Add a user-typed tag (as a root when `parent` is None).
    AddTag {
        zone: ZoneId,
        parent: Option<Uuid>,
        text: String,
    },
    RemoveHybrid {
        zone: ZoneId,
        id: Uuid,
    },
    BeginDrag {
        zone: ZoneId,
        id: Uuid,
    },
    DragTo {
        zone: ZoneId,
        id: Uuid,
        position: Point2D<f32>,
    },
    EndDrag {
        zone: ZoneId,
        id: Uuid,
    },
    SaveViewport {
        zone: ZoneId,
        state: ViewportState,
    },
    FocusZone {
        zone: ZoneId,
    },
    ReheatLayout {
        zone: ZoneId,
    },
}

/// The interactive tag graph engine.
pub struct DreamGraphApp {
    store: NodeStore,
    store_events: Receiver<StoreEvent>,
    layout: LayoutController,
    viewports: ViewportStore,
    coordinator: GenerationCoordinator,
    debounce: HybridDebounce,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
    session: SessionContext,
    focused_zone: Option<ZoneId>,
}

impl DreamGraphApp {
    /// Build the engine plus the generation worker the host must drive
    /// (spawn `worker.run()` on its runtime, or service the queue by
    /// hand in tests).
    pub fn new(
        settings: EngineSettings,
        generator: Arc<dyn TagGenerator>,
    ) -> (Self, GenerationWorker) {
        Self::with_notifier(settings, generator, Arc::new(NullNotifier))
    }

    pub fn with_notifier(
        settings: EngineSettings,
        generator: Arc<dyn TagGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, GenerationWorker) {
        let mut store = NodeStore::new();
        let store_events = store.subscribe();
        let (coordinator, worker) = GenerationCoordinator::new(generator);
        let mut layout = LayoutController::new();
        layout.apply_profile(&settings.layout_profile);
        (
            Self {
                store,
                store_events,
                layout,
                viewports: ViewportStore::new(),
                coordinator,
                debounce: HybridDebounce::new(),
                notifier,
                settings,
                session: SessionContext::default(),
                focused_zone: None,
            },
            worker,
        )
    }

    /// Deterministic layout seeding for tests.
    pub fn new_for_testing(generator: Arc<dyn TagGenerator>) -> (Self, GenerationWorker) {
        let (mut app, worker) = Self::new(EngineSettings::default(), generator);
        app.layout = LayoutController::with_seed(42);
        app.layout.apply_profile(&app.settings.layout_profile);
        (app, worker)
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn layout(&self) -> &LayoutController {
        &self.layout
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn reset_session(&mut self) {
        self.session.reset();
    }

    pub fn focused_zone(&self) -> Option<&ZoneId> {
        self.focused_zone.as_ref()
    }

    pub fn set_hybrid_debounce_ms(&mut self, ms: u64) {
        self.settings.set_hybrid_debounce_ms(ms);
    }

    /// Switch layout profiles; unknown ids fall back to the default.
    /// Returns true when the requested id matched.
    pub fn set_layout_profile(&mut self, layout_id: &str) -> bool {
        let resolution = self.layout.apply_profile(layout_id);
        if resolution.matched {
            self.settings.layout_profile = resolution.resolved_id.clone();
        }
        resolution.matched
    }

    /// Seed a zone's starter palette once per session; repeat calls are
    /// no-ops until the session context is reset. Returns whether the
    /// seeding ran.
    pub fn seed_zone(&mut self, zone: &ZoneId, templates: &[TagTemplate]) -> bool {
        if self.session.starter_tags_seeded(zone) {
            return false;
        }
        for template in templates {
            let root = self
                .store
                .add_root(zone, TagSeed::predefined(template.text.clone()));
            self.seed_children(zone, root, &template.children);
        }
        self.session.mark_seeded(zone);
        true
    }

    fn seed_children(&mut self, zone: &ZoneId, parent: Uuid, templates: &[TagTemplate]) {
        for template in templates {
            let Ok(child) = self
                .store
                .add_child(zone, parent, TagSeed::predefined(template.text.clone()))
            else {
                continue;
            };
            self.seed_children(zone, child, &template.children);
        }
    }

    pub fn apply_intents<I>(&mut self, intents: I)
    where
        I: IntoIterator<Item = TagIntent>,
    {
        for intent in intents {
            self.apply_intent(intent);
        }
    }

    pub fn apply_intent(&mut self, intent: TagIntent) {
        self.apply_intent_at(intent, Instant::now());
    }

    /// Reducer entry point with an explicit clock, so gesture timing is
    /// reproducible under test.
    pub fn apply_intent_at(&mut self, intent: TagIntent, now: Instant) {
        match intent {
            TagIntent::ToggleTag { zone, id } => self.toggle_tag(&zone, id, now),
            TagIntent::AddTag { zone, parent, text } => self.add_user_tag(&zone, parent, &text),
            TagIntent::RemoveHybrid { zone, id } => {
                if let Err(e) = hybrid::remove_hybrid(&mut self.store, &zone, id) {
                    warn!("Ignoring hybrid removal: {e}");
                }
            },
            TagIntent::BeginDrag { zone, id } => {
                if let Some(forest) = self.store.forest_mut(&zone) {
                    self.layout.begin_drag(forest, id);
                }
            },
            TagIntent::DragTo { zone, id, position } => {
                if let Some(forest) = self.store.forest_mut(&zone) {
                    self.layout.drag_to(forest, id, position);
                }
            },
            TagIntent::EndDrag { zone, id } => {
                if let Some(forest) = self.store.forest_mut(&zone) {
                    self.layout.end_drag(forest, id);
                }
            },
            TagIntent::SaveViewport { zone, state } => {
                self.viewports.save_zone_viewport(&zone, state);
            },
            TagIntent::FocusZone { zone } => {
                self.focused_zone = Some(zone);
            },
            TagIntent::ReheatLayout { zone } => self.layout.reheat(&zone),
        }
    }

    fn toggle_tag(&mut self, zone: &ZoneId, id: Uuid, now: Instant) {
        match selection::toggle_tag(&mut self.store, zone, id) {
            Ok(ToggleOutcome::RootSelected { .. }) => self.request_children_for(zone, id),
            Ok(ToggleOutcome::SecondarySelected { parent, .. })
            | Ok(ToggleOutcome::SecondaryDeselected { parent, .. })
            | Ok(ToggleOutcome::HybridRemoved { parent }) => {
                self.debounce.note_selection_change(
                    &self.store,
                    zone,
                    parent,
                    now,
                    self.settings.hybrid_debounce(),
                );
            },
            Ok(ToggleOutcome::RootDeselected) => {},
            Err(e) => warn!("Ignoring toggle: {e}"),
        }
    }

    /// Insert a user-typed tag, subject to the same case-insensitive
    /// sibling de-duplication as generated content.
    fn add_user_tag(&mut self, zone: &ZoneId, parent: Option<Uuid>, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let siblings: Vec<String> = self
            .store
            .forest(zone)
            .map(|forest| {
                let ids = match parent {
                    Some(parent) => forest.children_of(parent),
                    None => forest.roots().to_vec(),
                };
                ids.into_iter()
                    .filter_map(|id| forest.find(id))
                    .map(|node| node.text.clone())
                    .collect()
            })
            .unwrap_or_default();
        if siblings
            .iter()
            .any(|existing| existing.trim().eq_ignore_ascii_case(trimmed))
        {
            debug!("Ignoring duplicate user tag '{trimmed}'");
            return;
        }
        match parent {
            Some(parent) => {
                if let Err(e) = self.store.add_child(zone, parent, TagSeed::user(trimmed)) {
                    warn!("Ignoring user tag under missing parent: {e}");
                }
            },
            None => {
                self.store.add_root(zone, TagSeed::user(trimmed));
            },
        }
    }

    fn request_children_for(&mut self, zone: &ZoneId, id: Uuid) {
        let Some(forest) = self.store.forest(zone) else {
            return;
        };
        let Some(node) = forest.find(id) else {
            return;
        };
        let context = node.text.clone();
        let existing: Vec<String> = node
            .children
            .iter()
            .filter_map(|child| forest.find(*child))
            .map(|child| child.text.clone())
            .collect();
        self.coordinator.request_children(zone, id, context, existing);
    }

    /// One engine tick: drain completed generation results, fire the
    /// hybrid debounce if due, re-adapt the layout to structural
    /// changes, and advance the simulations that still carry energy.
    pub fn update(&mut self, now: Instant) {
        while let Some(outcome) = self.coordinator.try_next_outcome() {
            self.apply_generation_outcome(outcome);
        }

        if let Some(pending) = self.debounce.poll(&self.store, now) {
            self.coordinator.request_hybrid(
                &pending.zone,
                pending.parent,
                pending.sources,
                pending.texts,
            );
        }

        let dirty: HashSet<ZoneId> = self
            .store_events
            .try_iter()
            .map(|event| event.zone().clone())
            .collect();
        for zone in &dirty {
            if let Some(forest) = self.store.forest_mut(zone) {
                self.layout.sync(forest);
            }
        }

        let zones: Vec<ZoneId> = self.store.zone_ids().cloned().collect();
        for zone in zones {
            if let Some(forest) = self.store.forest_mut(&zone) {
                self.layout.step(forest);
            }
        }
    }

    /// Apply (or discard) one completed generation outcome. The worker
    /// feeds these through the outcome channel; harnesses may inject
    /// them directly.
    pub fn complete_generation(&mut self, outcome: GenerationOutcome) {
        self.apply_generation_outcome(outcome);
    }

    fn apply_generation_outcome(&mut self, outcome: GenerationOutcome) {
        if !self.coordinator.is_current(&outcome.id) {
            debug!("Discarding superseded generation response");
            return;
        }
        self.coordinator.mark_applied(&outcome.id);
        let zone = outcome.zone;

        match outcome.payload {
            OutcomePayload::Children { parent, result } => {
                let Some(node) = self.store.find_node(&zone, parent) else {
                    warn!("Generated children arrived for a missing tag; dropping");
                    return;
                };
                if !node.selected {
                    debug!("Generated children arrived after deselection; dropping");
                    return;
                }
                match result {
                    Ok(candidates) => {
                        let existing: Vec<String> = self
                            .store
                            .forest(&zone)
                            .map(|forest| {
                                forest
                                    .children_of(parent)
                                    .into_iter()
                                    .filter_map(|child| forest.find(child))
                                    .map(|child| child.text.clone())
                                    .collect()
                            })
                            .unwrap_or_default();
                        let fresh = filter_new_texts(
                            &existing,
                            candidates,
                            self.settings.max_generated_children,
                        );
                        for text in fresh {
                            if let Err(e) =
                                self.store.add_child(&zone, parent, TagSeed::generated(text))
                            {
                                warn!("Skipping generated child: {e}");
                            }
                        }
                    },
                    Err(e) => {
                        warn!("Child generation failed for {parent}: {e}");
                        self.notifier.notify(EngineNotice::GenerationFailed {
                            zone: zone.clone(),
                            tag: parent,
                            message: e.to_string(),
                        });
                    },
                }
                if let Some(forest) = self.store.forest_mut(&zone)
                    && let Some(node) = forest.find_mut(parent)
                {
                    node.loading = false;
                }
            },
            OutcomePayload::Hybrid {
                parent,
                sources,
                source_texts,
                result,
            } => {
                let concept = match result {
                    Ok(concept) if !concept.label.trim().is_empty() => concept,
                    Ok(_) => {
                        self.notifier.notify(EngineNotice::HybridFellBack {
                            zone: zone.clone(),
                            parent,
                            message: "empty synthesis label".to_string(),
                        });
                        hybrid::fallback_concept(&source_texts)
                    },
                    Err(e) => {
                        warn!("Hybrid synthesis failed under {parent}: {e}");
                        self.notifier.notify(EngineNotice::HybridFellBack {
                            zone: zone.clone(),
                            parent,
                            message: e.to_string(),
                        });
                        hybrid::fallback_concept(&source_texts)
                    },
                };
                match hybrid::apply_synthesis(&mut self.store, &zone, parent, &sources, concept) {
                    Ok(Some(_)) | Ok(None) => {},
                    Err(e) => warn!("Hybrid application failed: {e}"),
                }
            },
        }
    }

    /// Render-facing view of one zone.
    pub fn visible_graph(&self, zone: &ZoneId) -> Option<VisibleGraph> {
        self.store.forest(zone).map(visible_graph)
    }

    pub fn viewport(&self, zone: &ZoneId) -> Option<ViewportState> {
        self.viewports.get_zone_viewport(zone)
    }

    /// Serialize the session for the persistence collaborator.
    pub fn to_snapshot(&self, timestamp_secs: u64) -> SessionSnapshot {
        persistence::build_snapshot(
            &self.store,
            &self.viewports,
            self.focused_zone.as_ref(),
            timestamp_secs,
        )
    }

    /// Replace the whole session from a saved snapshot. In-flight
    /// generation responses are superseded; malformed snapshot pieces
    /// are dropped by the restore path, never fatal.
    pub fn load_snapshot(&mut self, snapshot: &SessionSnapshot) {
        let (mut store, focused) = persistence::store_from_snapshot(snapshot);
        self.store_events = store.subscribe();
        self.store = store;
        self.focused_zone = focused;
        self.layout.forget_zones();
        self.debounce = HybridDebounce::new();
        self.coordinator.supersede_all();

        match &snapshot.zone_viewports {
            Some(raw) => self.viewports.restore(raw),
            None => self.viewports = ViewportStore::new(),
        }
    }
}
