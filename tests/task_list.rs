// End-to-end behaviour of the task list across storage backends

use std::sync::Arc;
use tasklist::codec;
use tasklist::{
    Backend, Confirmation, DEFAULT_STORAGE_KEY, KeyValueStorage, MemoryStorage, PersistMode, PersistOptions,
    TaskFilter, TaskList, open_storage,
};
use tempfile::TempDir;

const IMMEDIATE: PersistOptions = PersistOptions {
    mode: PersistMode::Immediate,
    debounce_ms: 0,
};

const BACKGROUND: PersistOptions = PersistOptions {
    mode: PersistMode::Background,
    debounce_ms: 5,
};

#[test]
fn test_buy_milk_walk_dog_scenario() {
    let storage = MemoryStorage::new();
    let mut list = TaskList::open(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY, &IMMEDIATE).unwrap();
    assert!(list.is_empty());

    let milk = list.add("buy milk").unwrap();
    list.add("walk dog").unwrap();
    assert!(list.toggle(milk));

    list.set_filter(TaskFilter::Completed);
    let visible = list.visible_tasks();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].text, "buy milk");
    assert!(visible[0].completed);
    assert_eq!(list.completed_count(), 1);
    assert_eq!(list.len(), 2);

    let raw = storage.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
    assert_eq!(codec::decode(&raw).unwrap().tasks, list.tasks());
}

fn check_survives_reopen(backend: Backend, options: &PersistOptions) {
    let temp = TempDir::new().unwrap();

    let expected = {
        let storage = open_storage(backend, temp.path()).unwrap();
        let mut list = TaskList::open(storage, DEFAULT_STORAGE_KEY, options).unwrap();

        let a = list.add("write report").unwrap();
        let b = list.add("call mum").unwrap();
        list.add("book flights").unwrap();
        list.toggle(a);
        list.toggle(b);
        list.remove(b);
        list.set_filter(TaskFilter::Pending);

        assert!(list.flush().is_synced());
        list.tasks().to_vec()
    };

    let storage = open_storage(backend, temp.path()).unwrap();
    let reopened = TaskList::open(storage, DEFAULT_STORAGE_KEY, options).unwrap();

    assert_eq!(reopened.tasks(), expected.as_slice());
    assert_eq!(reopened.last_load().loaded, 2);
    // The filter is view state and is not persisted
    assert_eq!(reopened.filter(), TaskFilter::All);
}

#[test]
fn test_file_backend_survives_reopen() {
    check_survives_reopen(Backend::File, &IMMEDIATE);
}

#[test]
fn test_file_backend_background_survives_reopen() {
    check_survives_reopen(Backend::File, &BACKGROUND);
}

#[test]
fn test_sqlite_backend_survives_reopen() {
    check_survives_reopen(Backend::Sqlite, &IMMEDIATE);
}

#[test]
fn test_sqlite_backend_background_survives_reopen() {
    check_survives_reopen(Backend::Sqlite, &BACKGROUND);
}

#[test]
fn test_drop_persists_pending_background_writes() {
    let temp = TempDir::new().unwrap();
    let slow = PersistOptions {
        mode: PersistMode::Background,
        debounce_ms: 60_000,
    };

    {
        let storage = open_storage(Backend::File, temp.path()).unwrap();
        let mut list = TaskList::open(storage, DEFAULT_STORAGE_KEY, &slow).unwrap();
        list.add("last words").unwrap();
    }

    let storage = open_storage(Backend::File, temp.path()).unwrap();
    let list = TaskList::open(storage, DEFAULT_STORAGE_KEY, &IMMEDIATE).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.tasks()[0].text, "last words");
}

#[test]
fn test_lists_under_different_keys_are_independent() {
    let temp = TempDir::new().unwrap();
    let storage = open_storage(Backend::File, temp.path()).unwrap();

    let mut work = TaskList::open(Arc::clone(&storage), "work:tasks", &IMMEDIATE).unwrap();
    let mut home = TaskList::open(Arc::clone(&storage), "home:tasks", &IMMEDIATE).unwrap();
    work.add("deploy").unwrap();
    home.add("water plants").unwrap();
    home.add("cook").unwrap();

    drop(work);
    drop(home);

    let work = TaskList::open(Arc::clone(&storage), "work:tasks", &IMMEDIATE).unwrap();
    let home = TaskList::open(storage, "home:tasks", &IMMEDIATE).unwrap();
    assert_eq!(work.len(), 1);
    assert_eq!(home.len(), 2);
}

#[test]
fn test_clear_completed_round_trip() {
    let temp = TempDir::new().unwrap();
    let storage = open_storage(Backend::Sqlite, temp.path()).unwrap();
    let mut list = TaskList::open(Arc::clone(&storage), DEFAULT_STORAGE_KEY, &IMMEDIATE).unwrap();

    let ids: Vec<_> = ["a", "b", "c"].iter().map(|t| list.add(t).unwrap()).collect();
    list.toggle(ids[0]);
    list.toggle(ids[2]);

    assert_eq!(list.clear_completed_with(&mut Confirmation::Cancelled).unwrap(), 0);
    assert_eq!(list.len(), 3);

    assert_eq!(list.clear_completed_with(&mut Confirmation::Confirmed).unwrap(), 2);
    drop(list);

    let list = TaskList::open(storage, DEFAULT_STORAGE_KEY, &IMMEDIATE).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.tasks()[0].id, ids[1]);
    assert!(!list.tasks()[0].completed);
}

#[test]
fn test_reads_values_written_by_other_clients() {
    let temp = TempDir::new().unwrap();
    let storage = open_storage(Backend::File, temp.path()).unwrap();
    storage
        .set(
            DEFAULT_STORAGE_KEY,
            r#"[{"id":1700000000000,"text":"from the phone","completed":false}]"#,
        )
        .unwrap();

    let mut list = TaskList::open(storage, DEFAULT_STORAGE_KEY, &IMMEDIATE).unwrap();
    assert_eq!(list.tasks()[0].text, "from the phone");

    let id = list.add("from the terminal").unwrap();
    assert!(id > 1_700_000_000_000);
}
