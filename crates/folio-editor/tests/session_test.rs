//! Integration tests for the editing session
//!
//! These tests drive an `EditingSession` against the in-memory gateway:
//! - Load, edit and batched save
//! - Failed saves and retries
//! - Undo/redo across edits and saves
//! - Selection, clipboard, duplicate and restore
//! - Edits made while a save is in flight

use std::sync::Arc;

use folio_editor::{
    EditingSession, EditorConfig, Element, ElementId, ElementKind, ElementPatch, Error,
    MemoryGateway, NewElement, Page, Position, ReorderAction, SaveOperation, SessionEventType,
    SessionState, Size,
};
use serde_json::json;
use uuid::Uuid;

struct Fixture {
    gateway: MemoryGateway,
    session: EditingSession,
    seeded: Vec<Element>,
    page_id: Uuid,
}

fn shape(x: f64, y: f64) -> NewElement {
    NewElement::new(ElementKind::Shape, Position::new(x, y), Size::new(20.0, 20.0))
}

async fn open_page(elements: Vec<NewElement>) -> Fixture {
    open_page_with(elements, EditorConfig::default()).await
}

async fn open_page_with(elements: Vec<NewElement>, config: EditorConfig) -> Fixture {
    let gateway = MemoryGateway::new();
    let page = Page::new(Uuid::new_v4(), 1);
    let page_id = page.id;
    let seeded = gateway.seed(page, elements);

    let mut session = EditingSession::with_config(Arc::new(gateway.clone()), config);
    session.load(page_id).await.unwrap();

    Fixture {
        gateway,
        session,
        seeded,
        page_id,
    }
}

fn ids(elements: &[Element]) -> Vec<ElementId> {
    elements.iter().map(|e| e.id).collect()
}

fn uuid_of(id: ElementId) -> Uuid {
    id.as_uuid().unwrap()
}

// ============================================================================
// Load & Save
// ============================================================================

#[tokio::test]
async fn test_load_add_save_assigns_next_z_order() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        page_id,
    } = open_page(vec![shape(0.0, 0.0), shape(10.0, 10.0)]).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(ids(&session.elements()), ids(&seeded));
    assert!(!session.can_undo());

    let c = session
        .add_element(NewElement::text("hello", Position::new(5.0, 5.0), Size::new(40.0, 8.0)))
        .unwrap();
    assert!(c.is_local());
    assert_eq!(session.element(c).unwrap().z_index, 2);
    assert!(session.has_unsaved_changes());

    let report = session.save().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.remaps.len(), 1);
    assert_eq!(report.remaps[0].0, c);

    let elements = session.elements();
    assert_eq!(elements.len(), 3);
    assert_eq!(elements[0].id, seeded[0].id);
    assert_eq!(elements[1].id, seeded[1].id);
    assert_eq!(elements[2].id, report.remaps[0].1);
    assert!(elements.iter().all(|e| !e.id.is_local()));
    assert!(!session.has_unsaved_changes());
    assert_eq!(session.directory().len(), 3);
    assert_eq!(gateway.stored_count(page_id), 3);
}

#[tokio::test]
async fn test_edit_sequence_then_save_keeps_exact_survivors() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        page_id,
    } = open_page(vec![shape(0.0, 0.0), shape(10.0, 10.0)]).await;
    let (a, b) = (seeded[0].id, seeded[1].id);

    let c = session.add_element(shape(30.0, 30.0)).unwrap();
    let d = session.add_element(shape(40.0, 40.0)).unwrap();
    session
        .update_element(a, ElementPatch::new().position(1.0, 2.0))
        .unwrap();
    session.delete_element(b).unwrap();
    session.delete_element(d).unwrap();
    session
        .update_element(c, ElementPatch::new().rotation(90.0))
        .unwrap();

    let report = session.save().await.unwrap();
    assert_eq!((report.created, report.updated, report.deleted), (1, 1, 1));

    let batches = gateway.submitted_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert!(batches[0].iter().all(|op| op.target() != d));

    let c_server = report
        .remaps
        .iter()
        .find(|(old, _)| *old == c)
        .map(|(_, new)| *new)
        .unwrap();
    let elements = session.elements();
    assert_eq!(ids(&elements), vec![a, c_server]);
    assert_eq!(elements[0].position, Position::new(1.0, 2.0));
    assert_eq!(elements[1].rotation, 90.0);
    assert!(session.buffer().is_empty());

    assert_eq!(gateway.stored_count(page_id), 3);
    assert!(!gateway.stored(uuid_of(b)).unwrap().is_active());
}

#[tokio::test]
async fn test_update_then_delete_submits_only_delete() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;
    let a = seeded[0].id;

    session
        .update_element(a, ElementPatch::new().rotation(12.0))
        .unwrap();
    session.delete_element(a).unwrap();
    session.save().await.unwrap();

    assert_eq!(
        gateway.submitted_batches(),
        vec![vec![SaveOperation::Delete { id: uuid_of(a) }]]
    );
    assert!(session.elements().is_empty());
}

#[tokio::test]
async fn test_failed_save_leaves_buffer_identical() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    session
        .update_element(seeded[0].id, ElementPatch::new().size(50.0, 50.0))
        .unwrap();
    session.add_element(shape(5.0, 5.0)).unwrap();

    let buffer_before = session.buffer().clone();
    let elements_before = session.elements();
    let mut events = session.subscribe();

    gateway.fail_next(1);
    let err = session.save().await.unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(session.buffer(), &buffer_before);
    assert_eq!(session.elements(), elements_before);
    assert_eq!(session.last_error(), Some(&err));
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.has_unsaved_changes());
    assert_eq!(
        events.try_recv().unwrap().event_type,
        SessionEventType::SaveFailed
    );

    session.save().await.unwrap();
    assert!(session.last_error().is_none());
    assert!(!session.has_unsaved_changes());
}

#[tokio::test]
async fn test_save_with_nothing_pending_skips_gateway() {
    let Fixture {
        gateway,
        mut session,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    let report = session.save().await.unwrap();
    assert_eq!(report.created + report.updated + report.deleted, 0);
    assert!(gateway.submitted_batches().is_empty());
}

#[tokio::test]
async fn test_load_unknown_page_keeps_session_empty() {
    let gateway = MemoryGateway::new();
    let mut session = EditingSession::new(Arc::new(gateway));
    let missing = Uuid::new_v4();

    assert_eq!(session.load(missing).await, Err(Error::PageNotFound(missing)));
    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.last_error().is_some());
    assert_eq!(session.add_element(shape(0.0, 0.0)), Err(Error::NoActivePage));
}

// ============================================================================
// In-flight saves
// ============================================================================

#[tokio::test]
async fn test_edits_during_save_are_kept_for_next_save() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0), shape(10.0, 10.0)]).await;
    let (a, b) = (seeded[0].id, seeded[1].id);

    let c = session.add_element(shape(20.0, 20.0)).unwrap();
    session
        .update_element(a, ElementPatch::new().rotation(15.0))
        .unwrap();

    let batch = session.begin_save().unwrap().unwrap();
    assert!(session.is_saving());
    assert_eq!(session.save().await, Err(Error::SaveInProgress));

    session
        .update_element(c, ElementPatch::new().rotation(45.0))
        .unwrap();
    session.delete_element(b).unwrap();
    let d = session.add_element(shape(30.0, 30.0)).unwrap();

    let result = {
        use folio_editor::PersistenceGateway;
        gateway
            .batch_save(batch.page_id, batch.operations.clone())
            .await
    };
    let report = session.finish_save(batch, result).unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let c_server = report
        .remaps
        .iter()
        .find(|(old, _)| *old == c)
        .map(|(_, new)| *new)
        .unwrap();
    assert_eq!(session.element(a).unwrap().rotation, 15.0);
    assert_eq!(session.element(c_server).unwrap().rotation, 45.0);
    assert!(session.element(c).is_none());
    assert!(session.element(b).is_none());
    assert!(session.element(d).is_some());
    assert_eq!(session.buffer().len(), 3);

    session.save().await.unwrap();
    assert_eq!(gateway.submitted_batches()[1].len(), 3);
    assert_eq!(session.elements().len(), 3);
    assert!(!session.has_unsaved_changes());
    assert_eq!(gateway.stored(uuid_of(c_server)).unwrap().rotation, 45.0);
}

#[tokio::test]
async fn test_delete_during_save_wins_over_create() {
    let Fixture {
        gateway,
        mut session,
        ..
    } = open_page(Vec::new()).await;

    let c = session.add_element(shape(0.0, 0.0)).unwrap();
    let batch = session.begin_save().unwrap().unwrap();
    session.delete_element(c).unwrap();

    let result = {
        use folio_editor::PersistenceGateway;
        gateway
            .batch_save(batch.page_id, batch.operations.clone())
            .await
    };
    let report = session.finish_save(batch, result).unwrap();
    let server = report.remaps[0].1;

    assert!(session.elements().is_empty());
    assert!(session.has_unsaved_changes());

    session.save().await.unwrap();
    assert!(!gateway.stored(uuid_of(server)).unwrap().is_active());
    assert!(session.elements().is_empty());
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_undo_then_redo_restores_snapshot() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    assert_eq!(session.undo(), Ok(false));

    session
        .update_element(seeded[0].id, ElementPatch::new().position(7.0, 7.0))
        .unwrap();
    session.add_element(shape(9.0, 9.0)).unwrap();
    let after = session.elements();

    assert_eq!(session.undo(), Ok(true));
    assert_eq!(session.elements().len(), 1);
    assert_eq!(session.elements()[0].position, Position::new(7.0, 7.0));

    assert_eq!(session.redo(), Ok(true));
    assert_eq!(session.elements(), after);
    assert_eq!(session.redo(), Ok(false));
}

#[tokio::test]
async fn test_history_evicts_beyond_capacity() {
    let Fixture { mut session, .. } = open_page(Vec::new()).await;

    for i in 0..50 {
        session.add_element(shape(f64::from(i), 0.0)).unwrap();
    }
    assert_eq!(session.history().len(), 50);

    let mut undone = 0;
    while session.undo().unwrap() {
        undone += 1;
    }
    assert_eq!(undone, 49);
    assert!(!session.can_undo());
    assert!(session.can_redo());
    assert_eq!(session.elements().len(), 1);
}

#[tokio::test]
async fn test_history_capacity_is_configurable() {
    let config = EditorConfig::default().with_history_capacity(3);
    let Fixture { mut session, .. } = open_page_with(Vec::new(), config).await;

    for _ in 0..5 {
        session.add_element(shape(1.0, 1.0)).unwrap();
    }
    assert_eq!(session.history().len(), 3);
}

#[tokio::test]
async fn test_undo_across_save_recreates_deleted_element() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;
    let a = seeded[0].id;

    session.delete_element(a).unwrap();
    session.save().await.unwrap();
    assert!(session.elements().is_empty());

    assert_eq!(session.undo(), Ok(true));
    let elements = session.elements();
    assert_eq!(elements.len(), 1);
    assert!(elements[0].id.is_local());
    assert_eq!(elements[0].position, seeded[0].position);
    assert!(session.has_unsaved_changes());
}

// ============================================================================
// Selection & Clipboard
// ============================================================================

#[tokio::test]
async fn test_delete_purges_selection() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0), shape(5.0, 5.0)]).await;
    let a = seeded[0].id;

    session.select(a).unwrap();
    session.delete_element(a).unwrap();
    assert!(session.selection().is_empty());
    assert!(session.primary_selected().is_none());

    assert_eq!(session.select(a), Err(Error::NotFound(a)));
}

#[tokio::test]
async fn test_undo_prunes_selection() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    session.add_element(shape(3.0, 3.0)).unwrap();
    session.select_all().unwrap();
    assert_eq!(session.selection().len(), 2);

    session.undo().unwrap();
    assert_eq!(session.selection(), &[seeded[0].id]);
}

#[tokio::test]
async fn test_delete_selected_is_one_history_step() {
    let Fixture {
        mut session,
        ..
    } = open_page(vec![shape(0.0, 0.0), shape(1.0, 1.0), shape(2.0, 2.0)]).await;

    session.select_all().unwrap();
    assert_eq!(session.delete_selected(), Ok(3));
    assert!(session.elements().is_empty());

    assert_eq!(session.undo(), Ok(true));
    assert_eq!(session.elements().len(), 3);
    assert!(!session.can_undo());
}

#[tokio::test]
async fn test_two_pastes_offset_from_source() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(10.0, 20.0)]).await;

    session.select(seeded[0].id).unwrap();
    assert_eq!(session.copy(), Ok(true));

    let first = session.paste().unwrap().unwrap();
    let second = session.paste().unwrap().unwrap();
    assert_ne!(first, second);

    for id in [first, second] {
        let pasted = session.element(id).unwrap();
        assert_eq!(pasted.position, Position::new(20.0, 30.0));
        assert_eq!(pasted.kind, ElementKind::Shape);
    }
    assert_eq!(session.element(first).unwrap().z_index, 1);
    assert_eq!(session.element(second).unwrap().z_index, 2);
    assert_eq!(session.selection(), &[second]);
}

#[tokio::test]
async fn test_clipboard_survives_page_load() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    session.select(seeded[0].id).unwrap();
    session.copy().unwrap();

    let other = Page::new(Uuid::new_v4(), 2);
    let other_id = other.id;
    gateway.seed(other, Vec::new());
    session.load(other_id).await.unwrap();

    let pasted = session.paste().unwrap().unwrap();
    assert_eq!(session.element(pasted).unwrap().page_id, other_id);
}

#[tokio::test]
async fn test_copy_with_empty_selection() {
    let Fixture { mut session, .. } = open_page(vec![shape(0.0, 0.0)]).await;

    assert_eq!(session.copy(), Ok(false));
    assert_eq!(session.paste(), Ok(None));
}

// ============================================================================
// Reorder
// ============================================================================

#[tokio::test]
async fn test_reorder_actions() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0), shape(1.0, 1.0), shape(2.0, 2.0)]).await;
    let (a, b, c) = (seeded[0].id, seeded[1].id, seeded[2].id);

    session.reorder(a, ReorderAction::BringToFront).unwrap();
    assert_eq!(ids(&session.elements()), vec![b, c, a]);

    session.reorder(a, ReorderAction::SendBackward).unwrap();
    assert_eq!(ids(&session.elements()), vec![b, a, c]);

    session.reorder(c, ReorderAction::SendToBack).unwrap();
    assert_eq!(ids(&session.elements()), vec![c, b, a]);

    session.reorder(c, ReorderAction::SetZ(100)).unwrap();
    assert_eq!(session.element(c).unwrap().z_index, 100);
}

#[tokio::test]
async fn test_z_order_at_limit_is_rejected() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![
        shape(0.0, 0.0).with_z_index(i64::MAX),
        shape(1.0, 1.0).with_z_index(0),
    ])
    .await;
    let bottom = seeded[1].id;
    let before = session.elements();

    assert!(matches!(
        session.reorder(bottom, ReorderAction::BringToFront),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        session.add_element(shape(2.0, 2.0)),
        Err(Error::Validation(_))
    ));

    assert_eq!(session.elements(), before);
    assert!(!session.has_unsaved_changes());
    assert!(!session.can_undo());
}

#[tokio::test]
async fn test_empty_patch_records_nothing() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    assert_eq!(session.update_element(seeded[0].id, ElementPatch::new()), Ok(()));
    assert!(!session.has_unsaved_changes());
    assert!(!session.can_undo());

    let missing = ElementId::Local(99);
    assert_eq!(
        session.update_element(missing, ElementPatch::new()),
        Err(Error::NotFound(missing))
    );
}

// ============================================================================
// Duplicate & Restore
// ============================================================================

#[tokio::test]
async fn test_duplicate_resets_usage_and_selects_copy() {
    let sticker = NewElement::new(
        ElementKind::Sticker,
        Position::new(10.0, 10.0),
        Size::new(15.0, 15.0),
    )
    .with_metadata(json!({ "usage_count": 7, "pack": "spring" }));
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![sticker]).await;
    let a = seeded[0].id;

    let copy = session.duplicate(a).await.unwrap();
    assert_ne!(copy, a);
    assert!(!copy.is_local());

    let duplicated = session.element(copy).unwrap();
    assert_eq!(duplicated.position, Position::new(20.0, 20.0));
    assert_eq!(
        duplicated.metadata,
        Some(json!({ "usage_count": 0, "pack": "spring" }))
    );
    assert_eq!(session.selection(), &[copy]);
    assert!(session.can_undo());
}

#[tokio::test]
async fn test_duplicate_rejects_unsaved_and_deleted() {
    let Fixture {
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;
    let a = seeded[0].id;

    let local = session.add_element(shape(1.0, 1.0)).unwrap();
    assert!(matches!(
        session.duplicate(local).await,
        Err(Error::Validation(_))
    ));

    session.delete_element(a).unwrap();
    assert_eq!(session.duplicate(a).await, Err(Error::NotFound(a)));
}

#[tokio::test]
async fn test_failed_duplicate_leaves_state_unchanged() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        page_id,
    } = open_page(vec![shape(0.0, 0.0), shape(4.0, 4.0)]).await;
    let a = seeded[0].id;

    session.select(seeded[1].id).unwrap();
    let elements = session.elements();
    let selection = session.selection().to_vec();
    let history_len = session.history().len();

    gateway.fail_next(1);
    let err = session.duplicate(a).await.unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(session.elements(), elements);
    assert_eq!(session.selection(), selection.as_slice());
    assert_eq!(session.history().len(), history_len);
    assert_eq!(session.last_error(), Some(&err));
    assert_eq!(gateway.stored_count(page_id), 2);
}

#[tokio::test]
async fn test_restore_from_other_page_is_rejected() {
    use folio_editor::PersistenceGateway;

    let Fixture {
        gateway,
        mut session,
        page_id,
        ..
    } = open_page(vec![shape(0.0, 0.0)]).await;

    let other = Page::new(Uuid::new_v4(), 2);
    let other_id = other.id;
    let foreign = gateway.seed(other, vec![shape(9.0, 9.0)]).remove(0);
    gateway
        .soft_delete_element(uuid_of(foreign.id))
        .await
        .unwrap();

    let before = session.elements();
    assert_eq!(
        session.restore(foreign.id).await,
        Err(Error::NotFound(foreign.id))
    );
    assert!(!session.directory().contains(&foreign.id));
    assert_eq!(session.elements(), before);
    assert!(session.elements().iter().all(|e| e.page_id == page_id));
    assert_eq!(gateway.stored(uuid_of(foreign.id)).unwrap().page_id, other_id);
}

#[tokio::test]
async fn test_restore_success_and_failure() {
    let Fixture {
        gateway,
        mut session,
        seeded,
        ..
    } = open_page(vec![shape(0.0, 0.0), shape(5.0, 5.0)]).await;
    let (x, y) = (seeded[0].id, seeded[1].id);

    session.delete_element(x).unwrap();
    session.delete_element(y).unwrap();
    session.save().await.unwrap();
    assert!(session.directory().is_empty());

    let mut events = session.subscribe();
    let restored = session.restore(x).await.unwrap();
    assert!(restored.is_active());
    assert!(session.directory().contains(&x));
    assert_eq!(ids(&session.elements()), vec![x]);
    assert_eq!(
        events.try_recv().unwrap().event_type,
        SessionEventType::Restored
    );

    gateway.fail_next(1);
    let err = session.restore(y).await.unwrap_err();
    assert!(!session.directory().contains(&y));
    assert_eq!(session.last_error(), Some(&err));
    assert_eq!(ids(&session.elements()), vec![x]);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_local_edits_publish_events() {
    let Fixture { mut session, .. } = open_page(Vec::new()).await;
    let mut events = session.subscribe();

    let id = session.add_element(shape(0.0, 0.0)).unwrap();
    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, SessionEventType::Changed);
    assert_eq!(event.element_ids, vec![id]);

    session.select(id).unwrap();
    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, SessionEventType::SelectionChanged);
    assert!(event.sequence_num > 1);

    session.undo().unwrap();
    let kinds: Vec<SessionEventType> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.event_type)
        .collect();
    assert!(kinds.contains(&SessionEventType::HistoryMoved));
}
