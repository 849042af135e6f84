use std::collections::HashSet;

use serde_json::json;

use super::*;
use crate::operation::{OperationBody, Shape, ShapeVariant, Stroke, StrokeMode};

fn stroke_draft(temp_id: Option<&str>, points: Vec<Point>) -> OperationDraft {
    OperationDraft {
        temp_id: temp_id.map(str::to_owned),
        body: OperationBody::Stroke(Stroke {
            mode: StrokeMode::Brush,
            color: "#000000".into(),
            thickness: 4.0,
            points,
        }),
    }
}

fn shape_draft(temp_id: &str) -> OperationDraft {
    OperationDraft {
        temp_id: Some(temp_id.to_owned()),
        body: OperationBody::Shape(Shape {
            variant: ShapeVariant::Line,
            color: "#000000".into(),
            thickness: 2.0,
            properties: serde_json::Map::new(),
        }),
    }
}

fn ids(store: &OperationStore) -> Vec<OperationId> {
    store.snapshot().iter().map(|op| op.id).collect()
}

// =============================================================================
// add_operation
// =============================================================================

#[test]
fn add_operation_returns_distinct_ids() {
    let mut store = OperationStore::new();
    let author = Uuid::new_v4();
    let mut seen = HashSet::new();
    for _ in 0..200 {
        let id = store.add_operation(author, stroke_draft(None, vec![]));
        assert!(seen.insert(id), "duplicate id {id}");
    }
    assert_eq!(store.len(), 200);
}

#[test]
fn ids_are_stable_while_the_log_grows() {
    let mut store = OperationStore::new();
    let author = Uuid::new_v4();
    let first = store.add_operation(author, stroke_draft(None, vec![]));
    for _ in 0..10 {
        store.add_operation(author, stroke_draft(None, vec![]));
    }
    assert_eq!(store.snapshot()[0].id, first);
    assert!(store.get(first).is_some());
}

#[test]
fn add_operation_records_author_and_keeps_points() {
    let mut store = OperationStore::new();
    let author = Uuid::new_v4();
    let id = store.add_operation(author, stroke_draft(Some("t1"), vec![Point::new(0.0, 0.0)]));

    let op = store.get(id).unwrap();
    assert_eq!(op.author, author);
    assert_eq!(op.points().len(), 1);
    assert_eq!(store.alias_count(), 1);
}

#[test]
fn scenario_start_assigns_durable_id_for_temp_id() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![Point::new(0.0, 0.0)]));

    assert_eq!(store.len(), 1);
    assert_eq!(store.snapshot()[0].id, id);
    assert_eq!(store.resolve("t1"), Some(id));
    assert_eq!(store.resolve(&id.to_string()), Some(id));
}

#[test]
fn stored_operations_never_carry_temp_id() {
    let mut store = OperationStore::new();
    store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![]));
    let value = serde_json::to_value(store.snapshot()).unwrap();
    assert!(value[0].get("temp_id").is_none());
}

#[test]
fn add_operation_clears_redo() {
    let mut store = OperationStore::new();
    let author = Uuid::new_v4();
    store.add_operation(author, stroke_draft(None, vec![]));
    store.undo();
    assert!(store.can_redo());

    store.add_operation(author, stroke_draft(None, vec![]));
    assert!(!store.can_redo());
    assert!(store.redo().is_none());
}

// =============================================================================
// append_points / update_operation
// =============================================================================

#[test]
fn scenario_points_grow_in_order() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![Point::new(0.0, 0.0)]));

    assert!(store.append_points(&id.to_string(), &[Point::new(1.0, 1.0), Point::new(2.0, 2.0)]));

    let op = store.get(id).unwrap();
    assert_eq!(op.points(), &[Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
}

#[test]
fn append_points_accepts_temp_id() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t-early"), vec![]));
    assert!(store.append_points("t-early", &[Point::new(5.0, 5.0)]));
    assert_eq!(store.get(id).unwrap().points().len(), 1);
}

#[test]
fn append_points_unknown_key_leaves_log_unchanged() {
    let mut store = OperationStore::new();
    store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![Point::new(0.0, 0.0)]));
    let before = serde_json::to_string(&store.snapshot()).unwrap();

    assert!(!store.append_points("nope", &[Point::new(1.0, 1.0)]));
    assert!(!store.append_points(&Uuid::new_v4().to_string(), &[Point::new(1.0, 1.0)]));

    let after = serde_json::to_string(&store.snapshot()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn append_points_empty_batch_is_rejected() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![]));
    assert!(!store.append_points(&id.to_string(), &[]));
}

#[test]
fn update_operation_unknown_key_leaves_log_unchanged() {
    let mut store = OperationStore::new();
    store.add_operation(Uuid::new_v4(), shape_draft("t1"));
    let before = serde_json::to_string(&store.snapshot()).unwrap();

    let mut props = serde_json::Map::new();
    props.insert("x2".into(), json!(10));
    assert!(!store.update_operation("missing", &[OperationUpdate::PropertiesMerged(props)]));

    assert_eq!(before, serde_json::to_string(&store.snapshot()).unwrap());
}

#[test]
fn update_operation_merges_by_temp_id() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), shape_draft("t-shape"));

    let mut props = serde_json::Map::new();
    props.insert("x1".into(), json!(1));
    props.insert("x2".into(), json!(9));
    assert!(store.update_operation("t-shape", &[OperationUpdate::PropertiesMerged(props)]));

    let OperationBody::Shape(shape) = &store.get(id).unwrap().body else {
        panic!("expected shape");
    };
    assert_eq!(shape.properties["x2"], 9);
}

// =============================================================================
// Alias lifecycle
// =============================================================================

#[test]
fn confirm_prunes_alias() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![]));
    store.confirm(id);

    assert_eq!(store.alias_count(), 0);
    assert!(!store.append_points("t1", &[Point::new(1.0, 1.0)]));
    assert!(store.append_points(&id.to_string(), &[Point::new(1.0, 1.0)]));
}

#[test]
fn temp_id_naming_a_live_durable_id_does_not_shadow_it() {
    let mut store = OperationStore::new();
    let first = store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![]));
    let second = store.add_operation(Uuid::new_v4(), stroke_draft(Some(&first.to_string()), vec![]));

    assert!(store.append_points(&first.to_string(), &[Point::new(1.0, 1.0)]));

    assert_eq!(store.get(first).unwrap().points().len(), 1);
    assert!(store.get(second).unwrap().points().is_empty());
    assert_eq!(store.alias_count(), 0);
}

#[test]
fn reused_temp_id_keeps_first_mapping() {
    let mut store = OperationStore::new();
    let first = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t-1"), vec![]));
    let second = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t-1"), vec![]));

    assert_eq!(store.resolve("t-1"), Some(first));
    assert!(store.append_points("t-1", &[Point::new(2.0, 2.0)]));

    assert_eq!(store.get(first).unwrap().points().len(), 1);
    assert!(store.get(second).unwrap().points().is_empty());
    assert_eq!(store.alias_count(), 1);
}

#[test]
fn temp_id_is_reusable_once_released() {
    let mut store = OperationStore::new();
    let first = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t-1"), vec![]));
    store.confirm(first);
    let second = store.add_operation(Uuid::new_v4(), stroke_draft(Some("t-1"), vec![]));

    assert_eq!(store.resolve("t-1"), Some(second));
}

#[test]
fn undo_prunes_alias_and_redo_does_not_restore_it() {
    let mut store = OperationStore::new();
    store.add_operation(Uuid::new_v4(), stroke_draft(Some("t1"), vec![]));
    store.undo();
    assert_eq!(store.resolve("t1"), None);

    store.redo();
    assert_eq!(store.resolve("t1"), None);
}

#[test]
fn forget_author_only_prunes_that_authors_aliases() {
    let mut store = OperationStore::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    store.add_operation(alice, stroke_draft(Some("ta"), vec![]));
    store.add_operation(bob, stroke_draft(Some("tb"), vec![]));

    store.forget_author(alice);

    assert_eq!(store.len(), 2);
    assert!(store.resolve("ta").is_none());
    assert!(store.resolve("tb").is_some());
}

// =============================================================================
// Undo / redo / clear
// =============================================================================

#[test]
fn scenario_undo_then_redo_restores_log() {
    let mut store = OperationStore::new();
    let s1 = store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![Point::new(0.0, 0.0)]));
    let before = store.snapshot();

    let undone = store.undo().unwrap();
    assert_eq!(undone.id, s1);
    assert!(store.is_empty());
    assert_eq!(store.redo_depth(), 1);

    let redone = store.redo().unwrap();
    assert_eq!(redone.id, s1);
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.redo_depth(), 0);
}

#[test]
fn undo_is_global_across_authors() {
    let mut store = OperationStore::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let a = store.add_operation(alice, stroke_draft(None, vec![]));
    let b = store.add_operation(bob, stroke_draft(None, vec![]));

    assert_eq!(store.undo().map(|op| op.id), Some(b));
    assert_eq!(store.undo().map(|op| op.id), Some(a));
    assert_eq!(store.redo().map(|op| op.id), Some(a));
    assert_eq!(ids(&store), vec![a]);
}

#[test]
fn undo_on_empty_log_is_noop() {
    let mut store = OperationStore::new();
    assert!(store.undo().is_none());
    assert!(store.redo().is_none());
}

#[test]
fn redo_restores_lookup_by_durable_id() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![]));
    store.undo();
    assert!(!store.append_points(&id.to_string(), &[Point::new(1.0, 1.0)]));
    store.redo();
    assert!(store.append_points(&id.to_string(), &[Point::new(1.0, 1.0)]));
}

#[test]
fn scenario_clear_empties_everything() {
    let mut store = OperationStore::new();
    let author = Uuid::new_v4();
    for i in 0..13 {
        store.add_operation(author, stroke_draft(Some(&format!("t{i}")), vec![]));
    }
    for _ in 0..3 {
        store.undo();
    }
    assert_eq!(store.len(), 10);
    assert_eq!(store.redo_depth(), 3);

    store.clear();

    assert!(store.snapshot().is_empty());
    assert!(store.undo().is_none());
    assert!(store.redo().is_none());
    assert_eq!(store.alias_count(), 0);
}

#[test]
fn snapshot_is_independent_of_later_mutation() {
    let mut store = OperationStore::new();
    let id = store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![Point::new(0.0, 0.0)]));
    let sent = store.snapshot();

    store.append_points(&id.to_string(), &[Point::new(1.0, 1.0)]);
    store.add_operation(Uuid::new_v4(), stroke_draft(None, vec![]));

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].points().len(), 1);
}
