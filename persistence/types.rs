/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serialized session shapes handed to the persistence collaborator.
//!
//! Every field that can be absent carries a serde default so partially
//! written or older sessions still load; semantic validation (dangling
//! ids, invariant repair) happens during restore, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One saved session: the focused zone, every tag across all zones
/// (flat; structure is rebuilt from parent/children ids), and per-zone
/// viewports as raw values so one malformed entry cannot fail the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub focused_zone: Option<String>,
    #[serde(default)]
    pub tags: Vec<PersistedTag>,
    #[serde(default)]
    pub zone_viewports: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub timestamp_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTag {
    pub tag_id: String,
    pub zone: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub origin: PersistedOrigin,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub source_tag_ids: Vec<String>,
    #[serde(default)]
    pub merged_into: Option<String>,
    #[serde(default)]
    pub position_x: Option<f32>,
    #[serde(default)]
    pub position_y: Option<f32>,
    #[serde(default)]
    pub pinned_x: Option<f32>,
    #[serde(default)]
    pub pinned_y: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistedOrigin {
    #[default]
    Predefined,
    User,
    #[serde(rename = "ai-generated")]
    Generated,
}
