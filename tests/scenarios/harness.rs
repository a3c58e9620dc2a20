/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;
use std::time::{Duration, Instant};

use dreamgraph::app::{DreamGraphApp, TagIntent};
use dreamgraph::generation::{
    GenerateError, GenerationOutcome, GenerationRequest, GenerationWorker, HybridConcept,
    OutcomePayload, RequestKind, TagGenerator,
};
use dreamgraph::graph::{TagNode, TagTemplate, ZoneId};
use futures_util::future::{self, BoxFuture};
use uuid::Uuid;

/// Generator double with fixed scripted responses; only the worker
/// round-trip tests exercise it — most scenarios service the request
/// queue by hand for full determinism.
pub(crate) struct ScriptedGenerator {
    pub children: Result<Vec<String>, GenerateError>,
    pub label: Result<String, GenerateError>,
    pub elaborations: Result<Vec<String>, GenerateError>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            children: Ok(Vec::new()),
            label: Ok("concept".to_string()),
            elaborations: Ok(Vec::new()),
        }
    }
}

impl ScriptedGenerator {
    pub fn with_children(texts: &[&str]) -> Self {
        Self {
            children: Ok(texts.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }
}

impl TagGenerator for ScriptedGenerator {
    fn generate(
        &self,
        _parent_context: &str,
        _existing: &[String],
    ) -> BoxFuture<'static, Result<Vec<String>, GenerateError>> {
        Box::pin(future::ready(self.children.clone()))
    }

    fn synthesize(&self, _texts: &[String]) -> BoxFuture<'static, Result<String, GenerateError>> {
        Box::pin(future::ready(self.label.clone()))
    }

    fn elaborate(
        &self,
        _concept: &str,
    ) -> BoxFuture<'static, Result<Vec<String>, GenerateError>> {
        Box::pin(future::ready(self.elaborations.clone()))
    }
}

pub(crate) struct TestHarness {
    pub app: DreamGraphApp,
    pub worker: GenerationWorker,
    pub start: Instant,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_generator(ScriptedGenerator::default())
    }

    pub fn with_generator(generator: ScriptedGenerator) -> Self {
        let (app, worker) = DreamGraphApp::new_for_testing(Arc::new(generator));
        Self {
            app,
            worker,
            start: Instant::now(),
        }
    }

    pub fn zone() -> ZoneId {
        ZoneId::from("subject")
    }

    /// Seed the canonical fixture: root "Humans" with predefined
    /// children "Hero" and "Brave". Returns (root, hero, brave).
    pub fn seed_humans(&mut self) -> (Uuid, Uuid, Uuid) {
        self.app.seed_zone(
            &Self::zone(),
            &[TagTemplate::branch(
                "Humans",
                vec![TagTemplate::leaf("Hero"), TagTemplate::leaf("Brave")],
            )],
        );
        (
            self.find_by_text("Humans").unwrap(),
            self.find_by_text("Hero").unwrap(),
            self.find_by_text("Brave").unwrap(),
        )
    }

    pub fn find_by_text(&self, text: &str) -> Option<Uuid> {
        let forest = self.app.store().forest(&Self::zone())?;
        forest
            .nodes()
            .find(|(_, node)| node.text == text)
            .map(|(_, node)| node.id)
    }

    pub fn node(&self, id: Uuid) -> TagNode {
        self.app
            .store()
            .find_node(&Self::zone(), id)
            .expect("tag should exist")
            .clone()
    }

    pub fn toggle(&mut self, id: Uuid) {
        self.toggle_at(id, self.start);
    }

    pub fn toggle_at(&mut self, id: Uuid, at: Instant) {
        self.app.apply_intent_at(
            TagIntent::ToggleTag {
                zone: Self::zone(),
                id,
            },
            at,
        );
    }

    /// Tick the engine at `start + offset`.
    pub fn update_after(&mut self, offset: Duration) {
        self.app.update(self.start + offset);
    }

    pub fn next_request(&mut self) -> Option<GenerationRequest> {
        self.worker.try_next_request()
    }

    /// Service the next queued children request with the given texts.
    /// Panics if the queue is empty or holds a different request kind.
    pub fn service_children(&mut self, texts: &[&str]) {
        let request = self.next_request().expect("expected a queued request");
        let RequestKind::Children { parent, .. } = request.kind else {
            panic!("expected a children request");
        };
        self.app.complete_generation(GenerationOutcome {
            id: request.id,
            zone: request.zone,
            payload: OutcomePayload::Children {
                parent,
                result: Ok(texts.iter().map(|s| s.to_string()).collect()),
            },
        });
    }

    /// Service the next queued hybrid request with a successful concept.
    pub fn service_hybrid(&mut self, label: &str, elaborations: &[&str]) {
        let request = self.next_request().expect("expected a queued request");
        let RequestKind::Hybrid {
            parent, sources, texts,
        } = request.kind
        else {
            panic!("expected a hybrid request");
        };
        self.app.complete_generation(GenerationOutcome {
            id: request.id,
            zone: request.zone,
            payload: OutcomePayload::Hybrid {
                parent,
                sources,
                source_texts: texts,
                result: Ok(HybridConcept {
                    label: label.to_string(),
                    elaborations: elaborations.iter().map(|s| s.to_string()).collect(),
                }),
            },
        });
    }

    /// Service the next queued hybrid request with a failure; the engine
    /// falls back to deterministic content.
    pub fn service_hybrid_failure(&mut self) {
        let request = self.next_request().expect("expected a queued request");
        let RequestKind::Hybrid {
            parent, sources, texts,
        } = request.kind
        else {
            panic!("expected a hybrid request");
        };
        self.app.complete_generation(GenerationOutcome {
            id: request.id,
            zone: request.zone,
            payload: OutcomePayload::Hybrid {
                parent,
                sources,
                source_texts: texts,
                result: Err(GenerateError::Unavailable("offline".to_string())),
            },
        });
    }

    /// Ids of all live hybrids in the zone.
    pub fn hybrids(&self) -> Vec<Uuid> {
        self.app
            .store()
            .forest(&Self::zone())
            .map(|forest| {
                forest
                    .nodes()
                    .filter(|(_, node)| node.is_hybrid())
                    .map(|(_, node)| node.id)
                    .collect()
            })
            .unwrap_or_default()
    }
}
