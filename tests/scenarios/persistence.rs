/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use super::harness::TestHarness;
use dreamgraph::app::TagIntent;
use dreamgraph::persistence::types::SessionSnapshot;
use dreamgraph::viewport::ViewportState;
use serde_json::json;

#[test]
fn session_round_trip_preserves_forest_selection_and_viewports() {
    let mut harness = TestHarness::new();
    let (root, hero, _) = harness.seed_humans();
    harness.toggle(root);
    harness.service_children(&["Knight"]);
    harness.update_after(Duration::from_millis(16));
    let zone = TestHarness::zone();
    harness.app.apply_intent(TagIntent::FocusZone { zone: zone.clone() });
    harness.app.apply_intent(TagIntent::SaveViewport {
        zone: zone.clone(),
        state: ViewportState { x: 7.0, y: 8.0, k: 1.25 },
    });

    let snapshot = harness.app.to_snapshot(1234);
    let mut restored = TestHarness::new();
    restored.app.load_snapshot(&snapshot);

    assert_eq!(restored.app.focused_zone(), Some(&zone));
    assert_eq!(
        restored.app.viewport(&zone),
        Some(ViewportState { x: 7.0, y: 8.0, k: 1.25 })
    );

    let forest = restored.app.store().forest(&zone).unwrap();
    assert_eq!(forest.selected_root(), Some(root));
    assert_eq!(forest.children_of(root).len(), 3);
    assert!(forest.find(hero).is_some());
    assert!(!forest.find(hero).unwrap().hidden);

    // Positions survive, so the layout does not visually reset on load.
    assert_eq!(
        forest.find(root).unwrap().position,
        harness.node(root).position
    );
}

#[test]
fn snapshot_shape_uses_the_collaborator_field_names() {
    let mut harness = TestHarness::new();
    let (root, ..) = harness.seed_humans();
    harness.toggle(root);
    harness.app.apply_intent(TagIntent::SaveViewport {
        zone: TestHarness::zone(),
        state: ViewportState { x: 0.0, y: 0.0, k: 1.0 },
    });
    harness.app.apply_intent(TagIntent::FocusZone {
        zone: TestHarness::zone(),
    });

    let value = serde_json::to_value(harness.app.to_snapshot(0)).unwrap();
    assert!(value.get("focusedZone").is_some());
    assert!(value.get("zoneViewports").is_some());
    let tags = value.get("tags").unwrap().as_array().unwrap();
    assert!(tags.iter().all(|tag| tag.get("tagId").is_some()));
}

#[test]
fn snapshot_without_viewports_loads_without_error() {
    let snapshot: SessionSnapshot = serde_json::from_value(json!({
        "focusedZone": "subject",
        "tags": []
    }))
    .unwrap();

    let mut harness = TestHarness::new();
    harness.app.load_snapshot(&snapshot);

    assert!(harness.app.viewport(&TestHarness::zone()).is_none());
    // The focused zone named a zone that does not exist; focus resets.
    assert!(harness.app.focused_zone().is_none());
}

#[test]
fn malformed_viewport_entries_are_ignored_on_load() {
    let mut harness = TestHarness::new();
    harness.seed_humans();
    let snapshot_value = json!({
        "tags": serde_json::to_value(harness.app.to_snapshot(0)).unwrap()["tags"],
        "zoneViewports": {
            "subject": {"x": 1.0, "y": 2.0, "k": 1.5},
            "mood": "sideways",
            "style": {"x": 0.0, "y": 0.0, "k": -2.0}
        }
    });
    let snapshot: SessionSnapshot = serde_json::from_value(snapshot_value).unwrap();

    harness.app.load_snapshot(&snapshot);

    assert_eq!(
        harness.app.viewport(&TestHarness::zone()),
        Some(ViewportState { x: 1.0, y: 2.0, k: 1.5 })
    );
    assert!(harness.app.viewport(&"mood".into()).is_none());
    assert!(harness.app.viewport(&"style".into()).is_none());
}

#[test]
fn in_flight_generation_is_superseded_by_a_session_load() {
    let mut harness = TestHarness::new();
    let (root, ..) = harness.seed_humans();
    harness.toggle(root);
    let stale_request = harness.next_request().unwrap();

    let snapshot = harness.app.to_snapshot(0);
    harness.app.load_snapshot(&snapshot);

    harness.app.complete_generation(dreamgraph::generation::GenerationOutcome {
        id: stale_request.id,
        zone: stale_request.zone,
        payload: dreamgraph::generation::OutcomePayload::Children {
            parent: root,
            result: Ok(vec!["Ghost".to_string()]),
        },
    });

    assert!(harness.find_by_text("Ghost").is_none());
}

#[test]
fn malformed_tags_do_not_fail_the_load() {
    let good = uuid::Uuid::new_v4();
    let snapshot: SessionSnapshot = serde_json::from_value(json!({
        "tags": [
            {"tagId": "garbage", "zone": "subject", "text": "Broken"},
            {"tagId": good.to_string(), "zone": "subject", "text": "Fine", "selected": true}
        ]
    }))
    .unwrap();

    let mut harness = TestHarness::new();
    harness.app.load_snapshot(&snapshot);

    let forest = harness.app.store().forest(&TestHarness::zone()).unwrap();
    assert_eq!(forest.node_count(), 1);
    assert_eq!(forest.selected_root(), Some(good));
}
