//! Integration tests for undo/redo history integration.

use arbor_core::{
    Application, Change, CoreError, History, NodeInit, Payload, Phase, Reaction, Write,
};
use arbor_testkit::prelude::*;
use arbor_testkit::HistoryEvent::{EnterBatch, ExitBatch, Flush, Push};

fn name(s: &str) -> String {
    s.to_string()
}

#[test]
fn each_write_is_its_own_atomic_batch() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let owner = init_value_with_history(&app, &value_kind(), 0, handle);
    assert!(history.events().is_empty());

    app.write_context(|tx| set_value(tx, &owner, 1)).unwrap();

    assert_eq!(
        history.events(),
        vec![
            EnterBatch(name(SET_VALUE)),
            Push(name(SET_VALUE)),
            ExitBatch(name(SET_VALUE)),
        ]
    );
    assert_eq!(app.read(&owner).unwrap().history_provider(), Some(owner.id()));
}

#[test]
fn explicit_batch_groups_inner_writes() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let owner = init_value_with_history(&app, &value_kind(), 0, handle);

    app.batch_context(&owner, Change::batch("Edit"), |tx| {
        set_value(tx, &owner, 1)?;
        set_value(tx, &owner, 2)
    })
    .unwrap()
    .unwrap();

    assert_eq!(
        history.events(),
        vec![
            EnterBatch(name("Edit")),
            Push(name(SET_VALUE)),
            Push(name(SET_VALUE)),
            ExitBatch(name("Edit")),
        ]
    );
    assert!(!history.in_batch());
}

#[test]
fn executing_history_gets_no_atomic_batch() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let owner = init_value_with_history(&app, &value_kind(), 0, handle);
    history.set_executing(true);

    app.write_context(|tx| set_value(tx, &owner, 1)).unwrap();

    assert_eq!(history.events(), vec![Push(name(SET_VALUE))]);
}

#[test]
fn initialization_is_not_recorded() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();

    let owner = app
        .init_node_with(
            &value_kind(),
            NodeInit::new(Payload::new(ValueState::default())).history(handle),
            |tx, node| set_value(tx, node, 9),
        )
        .unwrap();

    assert_eq!(value_of(&app, &owner), 9);
    assert!(history.events().is_empty());
}

#[test]
fn history_adopters_report_to_writer() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let owner = init_value_with_history(&app, &value_kind(), 0, handle);
    let adopter = init_value(&app, &value_kind(), 0);

    let state = app.read(&owner).unwrap().state().clone();
    app.write(
        &owner,
        Write::new(
            state,
            Change::new("Adopt history").with_history_adopters([adopter.clone()]),
        ),
    )
    .unwrap();
    assert_eq!(
        app.read(&adopter).unwrap().history_provider(),
        Some(owner.id())
    );
    history.clear();

    app.write_context(|tx| set_value(tx, &adopter, 3)).unwrap();

    assert_eq!(
        history.events(),
        vec![
            EnterBatch(name(SET_VALUE)),
            Push(name(SET_VALUE)),
            ExitBatch(name(SET_VALUE)),
        ]
    );
}

#[test]
fn owners_of_a_history_are_not_adopted() {
    let app = Application::new();
    let (_first, first_handle) = RecordingHistory::shared();
    let (_second, second_handle) = RecordingHistory::shared();
    let writer = init_value_with_history(&app, &value_kind(), 0, first_handle);
    let owner = init_value_with_history(&app, &value_kind(), 0, second_handle);

    let state = app.read(&writer).unwrap().state().clone();
    app.write(
        &writer,
        Write::new(
            state,
            Change::new("Adopt history").with_history_adopters([owner.clone()]),
        ),
    )
    .unwrap();

    assert_eq!(app.read(&owner).unwrap().history_provider(), Some(owner.id()));
}

#[test]
fn moving_child_between_histories_flushes_the_old_one() {
    let app = Application::new();
    let (first, first_handle) = RecordingHistory::shared();
    let (second, second_handle) = RecordingHistory::shared();
    let first_owner = init_value_with_history(&app, &value_kind(), 0, first_handle);
    let second_owner = init_value_with_history(&app, &value_kind(), 0, second_handle);
    let child = init_value(&app, &value_kind(), 1);

    app.write_context(|tx| set_child(tx, &first_owner, "child", Some(&child)))
        .unwrap();
    assert!(!first.events().contains(&Flush));

    app.write_context(|tx| {
        set_child(tx, &first_owner, "child", None)?;
        set_child(tx, &second_owner, "child", Some(&child))
    })
    .unwrap();

    assert!(first.events().contains(&Flush));
    assert!(!second.events().contains(&Flush));
    let expected = app.read(&second_owner).unwrap().history().cloned().unwrap();
    let record = app.read(&child).unwrap();
    assert!(record.last_parent_history().unwrap().points_to(&expected));
}

#[test]
fn readopting_under_same_history_does_not_flush() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let owner = init_value_with_history(&app, &value_kind(), 0, handle);
    let child = init_value(&app, &value_kind(), 1);

    app.write_context(|tx| set_child(tx, &owner, "child", Some(&child)))
        .unwrap();
    app.write_context(|tx| set_child(tx, &owner, "child", None))
        .unwrap();
    app.write_context(|tx| set_child(tx, &owner, "child", Some(&child)))
        .unwrap();

    assert!(!history.events().contains(&Flush));
}

#[test]
fn failing_write_still_closes_its_batch() {
    let app = Application::new();
    let (history, handle) = RecordingHistory::shared();
    let kind = value_kind_builder("Broken")
        .reaction(Reaction::new("broken", |_, _, _, phase| {
            if phase == Phase::Post {
                return Err(CoreError::reaction("broken"));
            }
            Ok(())
        }))
        .build();
    let owner = init_value_with_history(&app, &kind, 0, handle);

    let result = app.write_context(|tx| set_value(tx, &owner, 1));

    assert!(result.is_err());
    assert!(!history.in_batch());
    assert_eq!(history.events().last(), Some(&ExitBatch(name(SET_VALUE))));
    assert_eq!(value_of(&app, &owner), 0);
}
