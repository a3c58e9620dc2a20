/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Asynchronous tag generation pipeline.
//!
//! Every generation call gets a strictly increasing sequence number
//! scoped to its logical slot (a tag's children, a hybrid under one
//! parent, or a session-wide task). Requests run on unbounded tokio
//! tasks; there is no cancellation signal — a response is applied only
//! if its sequence still equals the latest issued for its scope, so
//! slow or out-of-order completions can never corrupt the forest.
//!
//! The `GenerationWorker` owns the collaborator and executes requests;
//! outcomes flow back over a channel and are drained on the reducer
//! thread. Harnesses may bypass the worker loop entirely by servicing
//! the request queue by hand and injecting outcomes.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

use crate::graph::ZoneId;

/// External text-generation collaborator. Calls may fail and must be
/// safe to discard; the engine never retries on its own.
pub trait TagGenerator: Send + Sync {
    /// Suggest additional child tags for a parent tag, given the
    /// sibling texts that already exist under it.
    fn generate(
        &self,
        parent_context: &str,
        existing: &[String],
    ) -> BoxFuture<'static, Result<Vec<String>, GenerateError>>;

    /// Combine the given tag texts into a single concept label.
    fn synthesize(&self, texts: &[String]) -> BoxFuture<'static, Result<String, GenerateError>>;

    /// Produce elaboration tags for a synthesized concept.
    fn elaborate(&self, concept: &str) -> BoxFuture<'static, Result<Vec<String>, GenerateError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// The collaborator call itself failed.
    Unavailable(String),
    /// The collaborator answered with something unusable.
    Malformed(String),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::Unavailable(e) => write!(f, "generator unavailable: {e}"),
            GenerateError::Malformed(e) => write!(f, "malformed generator response: {e}"),
        }
    }
}

/// Logical slot a request competes for. One applied response per slot
/// per gesture; later issues supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Child suggestions for one tag.
    Children(Uuid),
    /// Hybrid synthesis under one parent.
    Hybrid(Uuid),
    /// Session-wide single-flight operation (e.g. final render).
    Session(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId {
    pub scope: Scope,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    issued: u64,
    applied: bool,
}

/// Per-scope monotonic sequence numbers; the sole staleness mechanism.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    slots: HashMap<Scope, SlotState>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number for a scope, superseding any
    /// request still in flight there.
    pub fn issue(&mut self, scope: Scope) -> RequestId {
        let slot = self.slots.entry(scope).or_default();
        slot.issued += 1;
        slot.applied = false;
        RequestId {
            scope,
            seq: slot.issued,
        }
    }

    /// A response may be applied only while it is the latest issued for
    /// its scope and nothing has been applied for that issue yet.
    pub fn is_current(&self, request: &RequestId) -> bool {
        self.slots
            .get(&request.scope)
            .is_some_and(|slot| slot.issued == request.seq && !slot.applied)
    }

    /// Consume the slot after applying (or deliberately swallowing) a
    /// current response, so a duplicate delivery cannot re-apply.
    pub fn mark_applied(&mut self, request: &RequestId) {
        if let Some(slot) = self.slots.get_mut(&request.scope)
            && slot.issued == request.seq
        {
            slot.applied = true;
        }
    }

    /// Invalidate every open slot. Used when the world the requests
    /// were issued against is replaced wholesale (session load).
    pub fn supersede_all(&mut self) {
        for slot in self.slots.values_mut() {
            slot.applied = true;
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub zone: ZoneId,
    pub kind: RequestKind,
}

#[derive(Debug, Clone)]
pub enum RequestKind {
    Children {
        parent: Uuid,
        context: String,
        existing: Vec<String>,
    },
    Hybrid {
        parent: Uuid,
        sources: Vec<Uuid>,
        texts: Vec<String>,
    },
}

/// A synthesized combination: its label plus elaboration child texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridConcept {
    pub label: String,
    pub elaborations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub id: RequestId,
    pub zone: ZoneId,
    pub payload: OutcomePayload,
}

#[derive(Debug, Clone)]
pub enum OutcomePayload {
    Children {
        parent: Uuid,
        result: Result<Vec<String>, GenerateError>,
    },
    Hybrid {
        parent: Uuid,
        sources: Vec<Uuid>,
        source_texts: Vec<String>,
        result: Result<HybridConcept, GenerateError>,
    },
}

/// Reducer-side half of the pipeline: sequences and enqueues requests,
/// drains completed outcomes.
pub struct GenerationCoordinator {
    sequencer: RequestSequencer,
    request_tx: UnboundedSender<GenerationRequest>,
    outcome_rx: UnboundedReceiver<GenerationOutcome>,
}

impl GenerationCoordinator {
    /// Build a coordinator/worker pair sharing request and outcome
    /// channels. The caller spawns `GenerationWorker::run` on its
    /// runtime (or services the queue by hand in tests).
    pub fn new(generator: Arc<dyn TagGenerator>) -> (Self, GenerationWorker) {
        let (request_tx, request_rx) = unbounded_channel();
        let (outcome_tx, outcome_rx) = unbounded_channel();
        (
            Self {
                sequencer: RequestSequencer::new(),
                request_tx,
                outcome_rx,
            },
            GenerationWorker {
                generator,
                request_rx,
                outcome_tx,
            },
        )
    }

    pub(crate) fn request_children(
        &mut self,
        zone: &ZoneId,
        parent: Uuid,
        context: String,
        existing: Vec<String>,
    ) -> RequestId {
        let id = self.sequencer.issue(Scope::Children(parent));
        // A closed worker is not an error: outcomes simply never arrive
        // and the slot stays superseded by the next issue.
        let _ = self.request_tx.send(GenerationRequest {
            id,
            zone: zone.clone(),
            kind: RequestKind::Children {
                parent,
                context,
                existing,
            },
        });
        id
    }

    pub(crate) fn request_hybrid(
        &mut self,
        zone: &ZoneId,
        parent: Uuid,
        sources: Vec<Uuid>,
        texts: Vec<String>,
    ) -> RequestId {
        let id = self.sequencer.issue(Scope::Hybrid(parent));
        let _ = self.request_tx.send(GenerationRequest {
            id,
            zone: zone.clone(),
            kind: RequestKind::Hybrid {
                parent,
                sources,
                texts,
            },
        });
        id
    }

    pub fn is_current(&self, request: &RequestId) -> bool {
        self.sequencer.is_current(request)
    }

    pub(crate) fn mark_applied(&mut self, request: &RequestId) {
        self.sequencer.mark_applied(request);
    }

    pub(crate) fn supersede_all(&mut self) {
        self.sequencer.supersede_all();
    }

    pub(crate) fn try_next_outcome(&mut self) -> Option<GenerationOutcome> {
        self.outcome_rx.try_recv().ok()
    }
}

/// Executes generation requests against the collaborator, one tokio
/// task per request (the UI never waits; staleness is handled at apply
/// time, not here).
pub struct GenerationWorker {
    generator: Arc<dyn TagGenerator>,
    request_rx: UnboundedReceiver<GenerationRequest>,
    outcome_tx: UnboundedSender<GenerationOutcome>,
}

impl GenerationWorker {
    /// Service requests until the coordinator side closes. Spawns each
    /// request onto its own task so slow calls never queue behind each
    /// other.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let generator = Arc::clone(&self.generator);
            let outcome_tx = self.outcome_tx.clone();
            tokio::spawn(async move {
                let outcome = execute(generator, request).await;
                let _ = outcome_tx.send(outcome);
            });
        }
    }

    /// Pull one queued request without a runtime. Harnesses use this to
    /// service the queue deterministically.
    pub fn try_next_request(&mut self) -> Option<GenerationRequest> {
        self.request_rx.try_recv().ok()
    }
}

async fn execute(generator: Arc<dyn TagGenerator>, request: GenerationRequest) -> GenerationOutcome {
    let GenerationRequest { id, zone, kind } = request;
    let payload = match kind {
        RequestKind::Children {
            parent,
            context,
            existing,
        } => OutcomePayload::Children {
            parent,
            result: generator.generate(&context, &existing).await,
        },
        RequestKind::Hybrid {
            parent,
            sources,
            texts,
        } => {
            let result = match generator.synthesize(&texts).await {
                Ok(label) => match generator.elaborate(&label).await {
                    Ok(elaborations) => Ok(HybridConcept {
                        label,
                        elaborations,
                    }),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            OutcomePayload::Hybrid {
                parent,
                sources,
                source_texts: texts,
                result,
            }
        },
    };
    GenerationOutcome { id, zone, payload }
}

/// Filter candidate texts against existing sibling texts: drop empties,
/// case-insensitive duplicates (against siblings and within the batch),
/// and anything past `cap`.
pub fn filter_new_texts(existing: &[String], candidates: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen: Vec<String> = existing
        .iter()
        .map(|text| text.trim().to_lowercase())
        .collect();
    let mut out = Vec::new();
    for candidate in candidates {
        if out.len() >= cap {
            break;
        }
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        let folded = trimmed.to_lowercase();
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        out.push(trimmed.to_string());
    }
    out
}
