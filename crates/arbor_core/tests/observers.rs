//! Integration tests for publishing committed actions to observers.

use arbor_core::{
    Application, Change, Config, CoreError, NodeRef, Notification, Observer, ObserverError,
    ObserverToken, Phase, Subject,
};
use arbor_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

struct Chained {
    index: usize,
    next: OnceLock<ObserverToken<u32>>,
    calls: Mutex<usize>,
    completed: Arc<Mutex<Vec<usize>>>,
}

impl Observer<u32> for Chained {
    fn observe(&self, _: &u32) -> Result<(), ObserverError> {
        *self.calls.lock() += 1;
        if let Some(next) = self.next.get() {
            next.wait()?;
        }
        self.completed.lock().push(self.index);
        Ok(())
    }
}

#[test]
fn chained_waits_complete_last_first() {
    let subject: Subject<u32> = Subject::new();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let observers: Vec<Arc<Chained>> = (0..100)
        .map(|index| {
            Arc::new(Chained {
                index,
                next: OnceLock::new(),
                calls: Mutex::new(0),
                completed: Arc::clone(&completed),
            })
        })
        .collect();
    let tokens: Vec<_> = observers.iter().map(|o| subject.register(o)).collect();
    for (observer, token) in observers.iter().zip(tokens.iter().skip(1)) {
        observer.next.set(token.clone()).unwrap();
    }

    let failures = subject.send(7).unwrap();

    assert!(failures.is_empty());
    assert!(observers.iter().all(|o| *o.calls.lock() == 1));
    let completed = completed.lock();
    assert_eq!(completed.len(), 100);
    assert_eq!(completed.first(), Some(&99));
    assert_eq!(completed.last(), Some(&0));
    assert!(completed.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn observers_see_every_node_on_the_path() {
    let app = Application::new();
    let kind = value_kind();
    let parent = init_value(&app, &kind, 0);
    let child = init_value(&app, &kind, 1);
    app.write_context(|tx| set_child(tx, &parent, "child", Some(&child)))
        .unwrap();
    let on_parent = RecordingObserver::new();
    let on_child = RecordingObserver::new();
    parent.subject().register(&on_parent);
    child.subject().register(&on_child);

    app.write_context(|tx| set_value(tx, &child, 2)).unwrap();

    let phases = |seen: Vec<Seen>| seen.into_iter().map(|s| s.phase).collect::<Vec<_>>();
    assert_eq!(phases(on_child.seen()), vec![Phase::Pre, Phase::Post]);
    assert_eq!(phases(on_parent.seen()), vec![Phase::Pre, Phase::Post]);
    let seen = on_parent.seen();
    assert_eq!(seen[0].sender, child);
    assert_eq!(seen[0].receiver, parent);
    assert_eq!(seen[0].change, SET_VALUE);
}

#[test]
fn nothing_is_published_until_outermost_context_ends() {
    let app = Application::new();
    let nodes = value_pool(&app, 1);
    let observer = RecordingObserver::new();
    nodes[0].subject().register(&observer);

    app.write_context(|tx| {
        set_value(tx, &nodes[0], 1)?;
        set_value(tx, &nodes[0], 2)?;
        assert!(observer.seen().is_empty());
        Ok(())
    })
    .unwrap();

    assert_eq!(observer.seen().len(), 4);
}

#[test]
fn reverted_writes_are_never_published() {
    let app = Application::new();
    let nodes = value_pool(&app, 1);
    let observer = RecordingObserver::new();
    nodes[0].subject().register(&observer);

    let _ = app.write_context(|tx| {
        set_value(tx, &nodes[0], 1)?;
        Err::<(), _>(CoreError::reaction("abort"))
    });
    let _ = app.temporary_context(|tx| set_value(tx, &nodes[0], 2));

    assert!(observer.seen().is_empty());
}

#[test]
fn batch_markers_are_published_around_inner_writes() {
    let app = Application::new();
    let kind = value_kind();
    let parent = init_value(&app, &kind, 0);
    let child = init_value(&app, &kind, 0);
    app.write_context(|tx| set_child(tx, &parent, "child", Some(&child)))
        .unwrap();
    let observer = RecordingObserver::new();
    parent.subject().register(&observer);

    app.batch_context(&parent, Change::batch("Edit"), |tx| {
        set_value(tx, &child, 1)
    })
    .unwrap();

    let seen: Vec<(String, Phase)> = observer
        .seen()
        .into_iter()
        .map(|s| (s.change, s.phase))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("Edit".to_string(), Phase::Pre),
            (SET_VALUE.to_string(), Phase::Pre),
            (SET_VALUE.to_string(), Phase::Post),
            ("Edit".to_string(), Phase::Post),
        ]
    );
}

#[test]
fn failing_observers_are_aggregated_after_the_store_is_updated() {
    let app = Application::with_config(Config::new().log_observer_failures(false));
    let nodes = value_pool(&app, 1);
    let failing = RecordingObserver::failing();
    let healthy = RecordingObserver::new();
    nodes[0].subject().register(&failing);
    nodes[0].subject().register(&healthy);

    let err = app
        .write_context(|tx| set_value(tx, &nodes[0], 5))
        .unwrap_err();

    let failed = match err {
        CoreError::ObserversFailed(failed) => failed,
        other => panic!("expected observer failures, got {other}"),
    };
    assert_eq!(failed.failures.len(), 2);
    assert_eq!(healthy.seen().len(), 2);
    assert_eq!(value_of(&app, &nodes[0]), 5);
    assert_eq!(app.stats().observer_failures(), 2);
    assert!(!app.is_writing());
    assert!(!app.is_reading());
}

#[test]
fn dropped_observers_stop_receiving() {
    let app = Application::new();
    let nodes = value_pool(&app, 1);
    let observer = RecordingObserver::new();
    nodes[0].subject().register(&observer);
    assert_eq!(nodes[0].subject().observer_count(), 1);

    drop(observer);
    assert_eq!(nodes[0].subject().observer_count(), 0);
    app.write_context(|tx| set_value(tx, &nodes[0], 1)).unwrap();
}

#[test]
fn logged_observer_failures_are_still_returned() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("arbor_core=debug"))
        .with_test_writer()
        .try_init();
    let app = Application::with_config(Config::new().label("logged"));
    let nodes = value_pool(&app, 1);
    let failing = RecordingObserver::failing();
    nodes[0].subject().register(&failing);

    let err = app
        .write_context(|tx| set_value(tx, &nodes[0], 1))
        .unwrap_err();

    assert!(matches!(err, CoreError::ObserversFailed(_)));
    assert!(err.to_string().contains("2 observer(s) failed"));
}

#[derive(Default)]
struct Capture(Mutex<Option<Notification>>);

impl Observer<Notification> for Capture {
    fn observe(&self, notification: &Notification) -> Result<(), ObserverError> {
        self.0.lock().get_or_insert_with(|| notification.clone());
        Ok(())
    }
}

/// Writes `busy` and `other` once, from inside a send on `busy`'s subject.
struct WriteWhileSending {
    app: Arc<Application>,
    busy: NodeRef,
    other: NodeRef,
    armed: AtomicBool,
    outcome: Mutex<Option<(usize, usize)>>,
}

impl Observer<Notification> for WriteWhileSending {
    fn observe(&self, _: &Notification) -> Result<(), ObserverError> {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.app.write_context(|tx| {
            set_value(tx, &self.other, 1)?;
            set_value(tx, &self.busy, 1)
        });
        *self.outcome.lock() = match result {
            Err(CoreError::ObserversFailed(failed)) => {
                Some((failed.failures.len(), failed.refused.len()))
            }
            _ => None,
        };
        Ok(())
    }
}

#[test]
fn busy_subject_does_not_stop_the_merge() {
    let app = Arc::new(Application::with_config(
        Config::new().log_observer_failures(false),
    ));
    let nodes = value_pool(&app, 2);
    let capture = Arc::new(Capture::default());
    nodes[0].subject().register(&capture);
    app.write_context(|tx| set_value(tx, &nodes[0], 0)).unwrap();
    let notification = capture.0.lock().take().unwrap();
    drop(capture);

    let writer = Arc::new(WriteWhileSending {
        app: Arc::clone(&app),
        busy: nodes[0].clone(),
        other: nodes[1].clone(),
        armed: AtomicBool::new(true),
        outcome: Mutex::new(None),
    });
    nodes[0].subject().register(&writer);

    let failures = nodes[0].subject().send(notification).unwrap();

    assert!(failures.is_empty());
    assert_eq!(*writer.outcome.lock(), Some((0, 2)));
    assert_eq!(value_of(&app, &nodes[0]), 1);
    assert_eq!(value_of(&app, &nodes[1]), 1);
    assert_eq!(app.stats().observer_failures(), 2);
    assert!(!app.is_writing());
    assert!(!app.is_reading());
}
