/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Named layout parameter profiles.
//!
//! Force constants are tuning knobs, not contracts; profiles give hosts
//! a small stable vocabulary (`layout:liquid`, `layout:gas`,
//! `layout:solid`) with graceful fallback for unknown ids.

use std::collections::HashMap;

use super::LayoutParams;

pub const LAYOUT_ID_DEFAULT: &str = "layout:liquid";
pub const LAYOUT_ID_GAS: &str = "layout:gas";
pub const LAYOUT_ID_SOLID: &str = "layout:solid";
const LAYOUT_ID_LEGACY_DEFAULT: &str = "layout:default";

#[derive(Debug, Clone)]
pub struct LayoutProfile {
    pub name: String,
    pub params: LayoutParams,
}

impl LayoutProfile {
    /// Compact, less jittery default.
    pub fn liquid() -> Self {
        Self {
            name: "Liquid".to_string(),
            params: LayoutParams::default(),
        }
    }

    /// Loose and floaty: more spread, slower settle.
    pub fn gas() -> Self {
        let mut params = LayoutParams::default();
        params.c_repulse *= 1.8;
        params.k_scale *= 1.5;
        params.damping = 0.75;
        params.alpha_decay = 0.012;
        Self {
            name: "Gas".to_string(),
            params,
        }
    }

    /// Stiff and quick to rest: tight springs, heavy damping.
    pub fn solid() -> Self {
        let mut params = LayoutParams::default();
        params.c_attract *= 1.6;
        params.damping = 0.4;
        params.max_step = 1.5;
        params.alpha_decay = 0.05;
        Self {
            name: "Solid".to_string(),
            params,
        }
    }
}

impl Default for LayoutProfile {
    fn default() -> Self {
        Self::liquid()
    }
}

#[derive(Debug, Clone)]
pub struct LayoutProfileResolution {
    pub requested_id: String,
    pub resolved_id: String,
    pub matched: bool,
    pub fallback_used: bool,
    pub profile: LayoutProfile,
}

pub struct LayoutProfileRegistry {
    profiles: HashMap<String, LayoutProfile>,
    fallback_id: String,
}

impl LayoutProfileRegistry {
    pub fn register(&mut self, layout_id: &str, profile: LayoutProfile) {
        self.profiles
            .insert(layout_id.to_ascii_lowercase(), profile);
    }

    pub fn register_core_seed_defaults(&mut self) {
        self.register(LAYOUT_ID_DEFAULT, LayoutProfile::liquid());
        self.register(LAYOUT_ID_LEGACY_DEFAULT, LayoutProfile::liquid());
        self.register(LAYOUT_ID_GAS, LayoutProfile::gas());
        self.register(LAYOUT_ID_SOLID, LayoutProfile::solid());
    }

    pub fn resolve(&self, layout_id: &str) -> LayoutProfileResolution {
        let requested = layout_id.trim().to_ascii_lowercase();
        let canonical_requested = if requested == LAYOUT_ID_LEGACY_DEFAULT {
            LAYOUT_ID_DEFAULT.to_string()
        } else {
            requested.clone()
        };
        let fallback_profile = self
            .profiles
            .get(&self.fallback_id)
            .cloned()
            .unwrap_or_default();

        if requested.is_empty() {
            return LayoutProfileResolution {
                requested_id: requested,
                resolved_id: self.fallback_id.clone(),
                matched: false,
                fallback_used: true,
                profile: fallback_profile,
            };
        }

        if let Some(profile) = self.profiles.get(&canonical_requested).cloned() {
            return LayoutProfileResolution {
                requested_id: requested,
                resolved_id: canonical_requested,
                matched: true,
                fallback_used: false,
                profile,
            };
        }

        LayoutProfileResolution {
            requested_id: requested,
            resolved_id: self.fallback_id.clone(),
            matched: false,
            fallback_used: true,
            profile: fallback_profile,
        }
    }
}

impl Default for LayoutProfileRegistry {
    fn default() -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
            fallback_id: LAYOUT_ID_DEFAULT.to_string(),
        };
        registry.register_core_seed_defaults();
        registry
    }
}
