//! Basic task list usage
//!
//! Adds, toggles and clears tasks against in-memory storage and shows what
//! ends up stored.
//!
//! Run with: cargo run --example basic_usage

use eyre::Result;
use std::sync::Arc;
use tasklist::{
    Confirmation, DEFAULT_STORAGE_KEY, KeyValueStorage, MemoryStorage, PersistMode, PersistOptions, TaskFilter,
    TaskList,
};

fn main() -> Result<()> {
    let storage = MemoryStorage::new();
    let options = PersistOptions {
        mode: PersistMode::Immediate,
        debounce_ms: 0,
    };

    println!("Tasklist Basic Usage Example");
    println!("============================\n");

    let mut list = TaskList::open(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY, &options)?;

    println!("1. ADD - three tasks, plus an empty one that is ignored");
    let milk = list.add("buy milk").expect("non-empty text");
    list.add("walk dog");
    list.add("water plants");
    assert!(list.add("   ").is_none());
    println!("   {} tasks\n", list.len());

    println!("2. TOGGLE - complete \"buy milk\"");
    list.toggle(milk);

    println!("3. FILTER - completed tasks:");
    list.set_filter(TaskFilter::Completed);
    for task in list.visible_tasks() {
        println!("   [x] {}", task.text);
    }
    println!("   completed count: {}\n", list.completed_count());

    println!("4. CLEAR COMPLETED");
    if let Some(request) = list.request_clear_completed() {
        println!("   {}: {}", request.title(), request.message());
        let removed = list.resolve_clear_completed(request, Confirmation::Confirmed);
        println!("   removed {}\n", removed);
    }

    println!("5. STORED VALUE");
    if let Some(raw) = storage.get(DEFAULT_STORAGE_KEY)? {
        println!("   {}", raw);
    }

    Ok(())
}
