/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Interactive tag-graph engine for prompt building.
//!
//! A prompt is assembled by navigating per-zone forests of topic tags
//! (Subject, Style, Mood, ...). Selecting a tag reveals its children —
//! some predefined, some produced on demand by an external generator —
//! while a force-directed layout keeps the visible graph legible as it
//! grows and shrinks.
//!
//! Module map:
//! - [`graph`]: canonical tag forests, one per zone, with
//!   invariant-preserving mutations and structural change events
//! - [`selection`]: toggle semantics and cascading deselection
//! - [`generation`]: asynchronous child-generation pipeline with
//!   stale-response suppression
//! - [`hybrid`]: merged-tag synthesis, lineage tracking, and teardown
//! - [`layout`]: incremental force-directed layout over the visible set
//! - [`viewport`]: per-zone pan-zoom persistence
//! - [`persistence`]: serializable session snapshot shapes
//! - [`app`]: the engine facade tying the above together behind a
//!   single intent-reducer write path
//!
//! Rendering, storage, and the concrete AI generator are collaborators
//! behind traits ([`generation::TagGenerator`], [`app::Notifier`]) and
//! plain data ([`persistence::SessionSnapshot`]); the engine never
//! draws, never touches disk, and never blocks on a generation call.

pub mod app;
pub mod generation;
pub mod graph;
pub mod hybrid;
pub mod layout;
pub mod persistence;
pub mod selection;
pub mod viewport;

pub use app::{DreamGraphApp, EngineSettings, Notifier, TagIntent};
pub use graph::{NodeStore, TagForest, TagNode, TagOrigin, ZoneId};
