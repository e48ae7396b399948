use super::{ProviderError, TaskProvider};
use crate::db::{self, Selection, DEMO_TASK_DESCRIPTION};
use crate::domain::sort::SortOrder;
use crate::domain::task::{Task, TaskValues};
use crate::resource::{Resource, UriRouter};
use rusqlite::types::Value;

struct Fixture {
    provider: TaskProvider,
    path: String,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path));
        }
    }
}

fn fixture() -> Fixture {
    let path = std::env::temp_dir()
        .join(format!("taskmaker-provider-{}.sqlite", uuid::Uuid::now_v7()))
        .display()
        .to_string();
    let (conn, _) = db::open_connection(&path).expect("database should open");
    Fixture {
        provider: TaskProvider::new(conn, UriRouter::default()),
        path,
    }
}

fn empty_fixture() -> Fixture {
    let fx = fixture();
    let all = fx.provider.collection_uri();
    fx.provider
        .delete(&all, None)
        .expect("clearing seed row should succeed");
    fx
}

#[test]
fn insert_then_query_by_id_round_trips_fields() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let cases = [
        Task::new("Call dentist", false, false, 1_700_000_000_000),
        Task::new("File taxes", true, true, 0),
        Task::without_due_date("", false, true),
        Task::new("Négative", true, false, -86_400_000),
    ];

    for case in cases {
        let id = p.insert_task(&case).expect("insert should succeed");
        let rows = p
            .query(&p.task_uri(id), &Selection::all(), None)
            .expect("query should succeed");
        assert_eq!(rows, vec![Task { id, ..case }]);
    }
}

#[test]
fn insert_returns_collection_uri_and_notifies() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let list = p
        .register_observer(&p.collection_uri(), true)
        .expect("collection should be observable");

    let returned = p
        .insert(
            &p.collection_uri(),
            &TaskValues::default()
                .description("Buy milk")
                .priority(true),
        )
        .expect("insert should succeed");
    assert_eq!(returned, p.collection_uri());
    assert_eq!(list.drain(), 1);

    let rows = p
        .query(&p.collection_uri(), &Selection::all(), Some(SortOrder::Default))
        .expect("query should succeed");
    let matching: Vec<_> = rows.iter().filter(|t| t.description == "Buy milk").collect();
    assert_eq!(matching.len(), 1);
    assert!(matching[0].is_priority);
    assert!(!matching[0].is_complete);
    assert!(!matching[0].has_due_date());
}

#[test]
fn insert_rejects_item_uri_and_missing_description() {
    let fx = fixture();
    let p = &fx.provider;

    let err = p
        .insert(&p.task_uri(1), &TaskValues::default().description("x"))
        .expect_err("item insert should fail");
    assert!(matches!(err, ProviderError::UnsupportedUri(_)));

    let err = p
        .insert(&p.collection_uri(), &TaskValues::default().priority(true))
        .expect_err("insert without description should fail");
    assert!(matches!(err, ProviderError::MissingDescription));
}

#[test]
fn fresh_provider_exposes_seeded_demo_task() {
    let fx = fixture();
    let p = &fx.provider;
    let rows = p
        .query(&p.collection_uri(), &Selection::all(), None)
        .expect("query should succeed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].description, DEMO_TASK_DESCRIPTION);
    assert!(rows[0].is_priority);
    assert!(!rows[0].is_complete);
    assert!(!rows[0].has_due_date());
}

#[test]
fn update_changes_only_the_named_task() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let first = p
        .insert_task(&Task::without_due_date("first", false, false))
        .expect("insert should succeed");
    let second = p
        .insert_task(&Task::without_due_date("second", false, false))
        .expect("insert should succeed");

    let everything = Selection::new("1 = 1", Vec::new());
    let count = p
        .update(
            &p.task_uri(first),
            &TaskValues::default().complete(true),
            Some(&everything),
        )
        .expect("update should succeed");
    assert_eq!(count, 1);

    let first_row = p
        .query(&p.task_uri(first), &Selection::all(), None)
        .expect("query should succeed");
    assert!(first_row[0].is_complete);
    let second_row = p
        .query(&p.task_uri(second), &Selection::all(), None)
        .expect("query should succeed");
    assert!(!second_row[0].is_complete);
}

#[test]
fn update_of_missing_task_returns_zero_without_notifying() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let list = p
        .register_observer(&p.collection_uri(), true)
        .expect("collection should be observable");

    let count = p
        .update(&p.task_uri(5), &TaskValues::default().complete(true), None)
        .expect("update should succeed");
    assert_eq!(count, 0);
    assert_eq!(list.drain(), 0);
}

#[test]
fn update_requires_item_uri_and_values() {
    let fx = fixture();
    let p = &fx.provider;

    let err = p
        .update(&p.collection_uri(), &TaskValues::default().complete(true), None)
        .expect_err("collection update should fail");
    assert!(matches!(
        err,
        ProviderError::IllegalUri {
            operation: "update",
            ..
        }
    ));

    let err = p
        .update(&p.task_uri(1), &TaskValues::default(), None)
        .expect_err("empty update should fail");
    assert!(matches!(err, ProviderError::EmptyValues("update")));
}

#[test]
fn toggling_twice_keeps_last_state_and_notifies_each_change() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let id = p
        .insert_task(&Task::without_due_date("toggle me", false, false))
        .expect("insert should succeed");
    let detail = p
        .register_observer(&p.task_uri(id), false)
        .expect("item should be observable");

    for complete in [true, false, true] {
        let count = p
            .update(&p.task_uri(id), &TaskValues::default().complete(complete), None)
            .expect("update should succeed");
        assert_eq!(count, 1);
    }

    assert_eq!(detail.drain(), 3);
    let rows = p
        .query(&p.task_uri(id), &Selection::all(), None)
        .expect("query should succeed");
    assert!(rows[0].is_complete);
}

#[test]
fn delete_single_task_removes_one_row_or_none() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let id = p
        .insert_task(&Task::without_due_date("delete me", false, false))
        .expect("insert should succeed");
    p.insert_task(&Task::without_due_date("keep me", false, false))
        .expect("insert should succeed");
    let detail = p
        .register_observer(&p.task_uri(id), false)
        .expect("item should be observable");

    let ignored = Selection::new("1 = 1", Vec::new());
    assert_eq!(
        p.delete(&p.task_uri(id), Some(&ignored))
            .expect("delete should succeed"),
        1
    );
    assert_eq!(detail.drain(), 1);
    assert_eq!(
        p.delete(&p.task_uri(id), None).expect("delete should succeed"),
        0
    );
    assert_eq!(detail.drain(), 0);

    let remaining = p
        .query(&p.collection_uri(), &Selection::all(), None)
        .expect("query should succeed");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].description, "keep me");
}

#[test]
fn delete_collection_without_selection_removes_every_row() {
    for n in [0usize, 1, 7] {
        let fx = empty_fixture();
        let p = &fx.provider;
        for i in 0..n {
            p.insert_task(&Task::without_due_date(format!("task {i}"), false, false))
                .expect("insert should succeed");
        }

        let count = p
            .delete(&p.collection_uri(), None)
            .expect("delete should succeed");
        assert_eq!(count, n);
        let rows = p
            .query(&p.collection_uri(), &Selection::all(), None)
            .expect("query should succeed");
        assert!(rows.is_empty());
    }
}

#[test]
fn delete_collection_honors_selection() {
    let fx = empty_fixture();
    let p = &fx.provider;
    p.insert_task(&Task::without_due_date("done", true, false))
        .expect("insert should succeed");
    p.insert_task(&Task::without_due_date("open", false, false))
        .expect("insert should succeed");

    let completed = Selection::new("is_complete = ?", vec![Value::Integer(1)]);
    let count = p
        .delete(&p.collection_uri(), Some(&completed))
        .expect("delete should succeed");
    assert_eq!(count, 1);
}

#[test]
fn unknown_uris_fail_every_operation() {
    let fx = fixture();
    let p = &fx.provider;
    let bogus = "content://com.google.developer.taskmaker/notes";

    assert!(matches!(
        p.query(bogus, &Selection::all(), None),
        Err(ProviderError::UnsupportedUri(_))
    ));
    assert!(matches!(
        p.delete(bogus, None),
        Err(ProviderError::IllegalUri {
            operation: "delete",
            ..
        })
    ));
    assert!(matches!(
        p.register_observer(bogus, true),
        Err(ProviderError::UnsupportedUri(_))
    ));
}

#[test]
fn sort_orders_put_open_priority_tasks_first() {
    let fx = empty_fixture();
    let p = &fx.provider;
    p.insert_task(&Task::new("late", false, false, 3_000))
        .expect("insert should succeed");
    p.insert_task(&Task::new("urgent", false, true, 5_000))
        .expect("insert should succeed");
    p.insert_task(&Task::new("finished", true, true, 1_000))
        .expect("insert should succeed");
    p.insert_task(&Task::without_due_date("someday", false, false))
        .expect("insert should succeed");

    let by_default: Vec<_> = p
        .query(&p.collection_uri(), &Selection::all(), Some(SortOrder::Default))
        .expect("query should succeed")
        .into_iter()
        .map(|t| t.description)
        .collect();
    assert_eq!(by_default, ["urgent", "late", "someday", "finished"]);

    let by_date: Vec<_> = p
        .query(&p.collection_uri(), &Selection::all(), Some(SortOrder::Date))
        .expect("query should succeed")
        .into_iter()
        .map(|t| t.description)
        .collect();
    assert_eq!(by_date, ["late", "urgent", "someday", "finished"]);
}

#[test]
fn collection_observer_hears_item_changes() {
    let fx = empty_fixture();
    let p = &fx.provider;
    let id = p
        .insert_task(&Task::without_due_date("watched", false, false))
        .expect("insert should succeed");

    let subscription = p
        .register_observer(&p.collection_uri(), true)
        .expect("collection uri should register");
    assert!(p.register_observer("content://elsewhere/tasks", true).is_err());

    p.update(&p.task_uri(id), &TaskValues::default().priority(true), None)
        .expect("update should succeed");
    let event = subscription
        .try_next()
        .expect("item change should reach collection observer");
    assert_eq!(event.resource, Resource::Task(id));
}

#[test]
fn commits_from_another_connection_reach_collection_observers() {
    let fx = fixture();
    let p = &fx.provider;
    let list = p
        .register_observer(&p.collection_uri(), true)
        .expect("collection uri should register");

    p.insert_task(&Task::without_due_date("own write", false, false))
        .expect("insert should succeed");
    assert_eq!(list.drain(), 1);
    assert!(!p.notify_external_changes().expect("check should succeed"));
    assert_eq!(list.drain(), 0);

    let (other, _) = db::open_connection(&fx.path).expect("second connection should open");
    db::insert_task(&other, &TaskValues::default().description("from elsewhere"))
        .expect("foreign insert should succeed");

    assert!(p.notify_external_changes().expect("check should succeed"));
    assert_eq!(list.try_next().map(|e| e.resource), Some(Resource::Tasks));
    assert!(!p.notify_external_changes().expect("second check should succeed"));

    let rows = p
        .query(&p.collection_uri(), &Selection::all(), None)
        .expect("query should succeed");
    assert!(rows.iter().any(|t| t.description == "from elsewhere"));
}
