/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use super::harness::TestHarness;
use dreamgraph::app::TagIntent;

/// Root selected, children revealed, no generated children added.
fn selected_fixture() -> (TestHarness, uuid::Uuid, uuid::Uuid, uuid::Uuid) {
    let mut harness = TestHarness::new();
    let (root, hero, brave) = harness.seed_humans();
    harness.toggle(root);
    harness.service_children(&[]);
    (harness, root, hero, brave)
}

#[test]
fn two_selected_siblings_produce_exactly_one_hybrid() {
    let (mut harness, _, hero, brave) = selected_fixture();

    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));

    harness.service_hybrid("Brave Hero", &["Valor", "Oath"]);
    // The debounce coalesced both clicks into one request.
    assert!(harness.next_request().is_none());

    let hybrids = harness.hybrids();
    assert_eq!(hybrids.len(), 1);
    let hybrid = harness.node(hybrids[0]);
    assert_eq!(hybrid.text, "Brave Hero");
    assert!(hybrid.selected);
    assert_eq!(hybrid.source_tags, vec![hero, brave]);

    for source in [hero, brave] {
        let node = harness.node(source);
        assert!(node.hidden);
        assert!(!node.selected);
    }

    assert!(harness.find_by_text("Valor").is_some());
    assert!(!harness.node(harness.find_by_text("Valor").unwrap()).hidden);
}

#[test]
fn debounce_does_not_fire_before_the_window_elapses() {
    let (mut harness, _, hero, brave) = selected_fixture();

    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(500));

    assert!(harness.next_request().is_none());
    assert!(harness.hybrids().is_empty());

    harness.update_after(Duration::from_millis(1200));
    assert!(harness.next_request().is_some());
}

#[test]
fn reselecting_within_the_window_restarts_it() {
    let (mut harness, _, hero, brave) = selected_fixture();
    let start = harness.start;

    harness.toggle(hero);
    harness.toggle(brave);
    harness.toggle_at(brave, start + Duration::from_millis(600));
    harness.toggle_at(brave, start + Duration::from_millis(700));

    // The first window would have fired at 1000ms; the re-arm moved it
    // to 1700ms.
    harness.update_after(Duration::from_millis(1100));
    assert!(harness.next_request().is_none());

    harness.update_after(Duration::from_millis(1800));
    assert!(harness.next_request().is_some());
}

#[test]
fn dropping_below_two_selected_cancels_the_window() {
    let (mut harness, _, hero, brave) = selected_fixture();
    let start = harness.start;

    harness.toggle(hero);
    harness.toggle(brave);
    harness.toggle_at(hero, start + Duration::from_millis(300));

    harness.update_after(Duration::from_millis(2000));
    assert!(harness.next_request().is_none());
    assert!(harness.hybrids().is_empty());
}

#[test]
fn toggling_the_hybrid_tears_it_down_and_restores_sources() {
    let (mut harness, _, hero, brave) = selected_fixture();
    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));
    harness.service_hybrid("Brave Hero", &["Valor", "Oath"]);
    let hybrid = harness.hybrids()[0];
    let valor = harness.find_by_text("Valor").unwrap();

    harness.toggle(hybrid);

    assert!(harness.app.store().find_node(&TestHarness::zone(), hybrid).is_none());
    assert!(harness.app.store().find_node(&TestHarness::zone(), valor).is_none());
    for source in [hero, brave] {
        let node = harness.node(source);
        assert!(!node.selected);
        assert!(!node.hidden);
        assert!(node.merged_into.is_none());
    }
}

#[test]
fn remove_hybrid_intent_is_idempotent() {
    let (mut harness, _, hero, brave) = selected_fixture();
    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));
    harness.service_hybrid("Brave Hero", &[]);
    let hybrid = harness.hybrids()[0];

    for _ in 0..2 {
        harness.app.apply_intent(TagIntent::RemoveHybrid {
            zone: TestHarness::zone(),
            id: hybrid,
        });
    }

    assert!(harness.hybrids().is_empty());
    assert!(!harness.node(hero).hidden);
}

#[test]
fn chained_hybrid_is_removed_before_its_parent() {
    let (mut harness, _, hero, brave) = selected_fixture();
    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));
    harness.service_hybrid("Brave Hero", &["Valor", "Oath"]);
    let h1 = harness.hybrids()[0];
    let valor = harness.find_by_text("Valor").unwrap();
    let oath = harness.find_by_text("Oath").unwrap();

    // Merge two of the hybrid's own children into a child hybrid.
    let start = harness.start;
    harness.toggle_at(valor, start + Duration::from_millis(2000));
    harness.toggle_at(oath, start + Duration::from_millis(2000));
    harness.update_after(Duration::from_millis(3100));
    harness.service_hybrid("Valorous Oath", &["Creed"]);

    let hybrids = harness.hybrids();
    assert_eq!(hybrids.len(), 2);
    let h2 = hybrids.into_iter().find(|id| *id != h1).unwrap();
    assert_eq!(harness.node(h2).parent, Some(h1));

    harness.app.apply_intent(TagIntent::RemoveHybrid {
        zone: TestHarness::zone(),
        id: h1,
    });

    assert!(harness.hybrids().is_empty());
    assert!(harness.app.store().find_node(&TestHarness::zone(), h2).is_none());
    for source in [hero, brave] {
        let node = harness.node(source);
        assert!(!node.hidden);
        assert!(node.merged_into.is_none());
    }
    // No tag anywhere retains lineage into the removed hybrids.
    let forest = harness.app.store().forest(&TestHarness::zone()).unwrap();
    for (_, node) in forest.nodes() {
        assert!(node.source_tags.is_empty());
        assert!(node.merged_into.is_none());
    }
}

#[test]
fn failed_synthesis_falls_back_to_deterministic_content() {
    let (mut harness, _, hero, brave) = selected_fixture();
    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));

    harness.service_hybrid_failure();

    let hybrids = harness.hybrids();
    assert_eq!(hybrids.len(), 1);
    let hybrid = harness.node(hybrids[0]);
    assert_eq!(hybrid.text, "Hero + Brave");

    let child_texts: Vec<String> = hybrid
        .children
        .iter()
        .map(|child| harness.node(*child).text)
        .collect();
    assert_eq!(child_texts, vec!["Hero".to_string(), "Brave".to_string()]);
}

#[test]
fn deselecting_the_root_cleans_up_live_hybrids() {
    let (mut harness, root, hero, brave) = selected_fixture();
    harness.toggle(hero);
    harness.toggle(brave);
    harness.update_after(Duration::from_millis(1100));
    harness.service_hybrid("Brave Hero", &["Valor"]);
    assert_eq!(harness.hybrids().len(), 1);

    harness.toggle(root);

    assert!(harness.hybrids().is_empty());
    assert!(harness.find_by_text("Valor").is_none());
    // Sources survive as hidden predefined tags under the collapsed root.
    for source in [hero, brave] {
        let node = harness.node(source);
        assert!(node.hidden);
        assert!(node.merged_into.is_none());
    }
}
