/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-zone pan-zoom persistence.
//!
//! A plain key-value map, independent of the forests. Absent entries
//! mean "use the default viewport". Restore is tolerant: entries that
//! fail the shape check (non-finite translation, non-positive scale)
//! are dropped with a warning, never fatal.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::graph::ZoneId;

/// Pan-zoom transform: translation plus scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub x: f32,
    pub y: f32,
    pub k: f32,
}

impl ViewportState {
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.k.is_finite() && self.k > 0.0
    }
}

#[derive(Debug, Default)]
pub struct ViewportStore {
    by_zone: HashMap<ZoneId, ViewportState>,
}

impl ViewportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_zone_viewport(&mut self, zone: &ZoneId, state: ViewportState) {
        self.by_zone.insert(zone.clone(), state);
    }

    pub fn get_zone_viewport(&self, zone: &ZoneId) -> Option<ViewportState> {
        self.by_zone.get(zone).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_zone.is_empty()
    }

    /// Serialization shape handed to the persistence collaborator.
    pub fn to_map(&self) -> HashMap<String, ViewportState> {
        self.by_zone
            .iter()
            .map(|(zone, state)| (zone.as_str().to_string(), *state))
            .collect()
    }

    /// Wholesale restore from persisted values. Malformed entries are
    /// ignored; everything previously held is replaced.
    pub fn restore(&mut self, raw: &HashMap<String, serde_json::Value>) {
        self.by_zone.clear();
        for (zone, value) in raw {
            match serde_json::from_value::<ViewportState>(value.clone()) {
                Ok(state) if state.is_well_formed() => {
                    self.by_zone.insert(ZoneId::new(zone.clone()), state);
                },
                Ok(_) => {
                    warn!("Ignoring out-of-range viewport for zone '{zone}'");
                },
                Err(e) => {
                    warn!("Ignoring malformed viewport for zone '{zone}': {e}");
                },
            }
        }
    }
}
