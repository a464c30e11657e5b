use super::*;
use std::sync::{Arc, Mutex};

#[test]
fn test_dispatch_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher: EventDispatcher<u32> = EventDispatcher::new();

    for tag in ["first", "second", "third"] {
        let log = log.clone();
        dispatcher.add(Box::new(move |value: &u32| {
            log.lock().unwrap().push(format!("{}:{}", tag, value));
        }));
    }

    dispatcher.dispatch(&7);
    assert_eq!(*log.lock().unwrap(), vec!["first:7", "second:7", "third:7"]);
}

#[test]
fn test_remove_listener() {
    let hits = Arc::new(Mutex::new(0));
    let mut dispatcher: EventDispatcher<()> = EventDispatcher::default();

    let counter = hits.clone();
    let id = dispatcher.add(Box::new(move |_| *counter.lock().unwrap() += 1));
    dispatcher.dispatch(&());
    assert!(dispatcher.remove(id));
    assert!(!dispatcher.remove(id));
    dispatcher.dispatch(&());

    assert_eq!(*hits.lock().unwrap(), 1);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_listener_can_mutate_captured_state() {
    let mut dispatcher: EventDispatcher<(u32, u32)> = EventDispatcher::new();
    let last = Arc::new(Mutex::new((0, 0)));
    let sink = last.clone();
    dispatcher.add(Box::new(move |size| *sink.lock().unwrap() = *size));

    dispatcher.dispatch(&(1280, 720));
    dispatcher.dispatch(&(640, 480));

    assert_eq!(*last.lock().unwrap(), (640, 480));
    assert_eq!(dispatcher.len(), 1);
}
