use fsindex_core::{Database, RequestBus, RequestEvent, StoreHandle};
use serde_json::json;
use std::sync::mpsc;
use std::time::Duration;

fn setup() -> (StoreHandle, RequestBus, mpsc::Receiver<RequestEvent>) {
    let store = StoreHandle::spawn(Database::open_in_memory().unwrap()).unwrap();
    let (tx, rx) = mpsc::channel();
    let bus = RequestBus::new(store.clone(), tx).unwrap();
    (store, bus, rx)
}

fn next(rx: &mpsc::Receiver<RequestEvent>) -> RequestEvent {
    rx.recv_timeout(Duration::from_secs(5)).expect("no reply")
}

#[test]
fn test_insert_select_delete_round_trip() {
    let (store, bus, rx) = setup();

    let insert = bus.submit(&json!({
        "command": "sql_command",
        "sql": "insert",
        "table": "folders_to_index",
        "column_names": ["path"],
        "values": ["/home/me/projects"]
    }));
    let reply = next(&rx);
    assert_eq!(reply.request_id(), insert);
    assert_eq!(reply.body(), &json!({ "result": 1 }));

    let select = bus.submit(&json!({
        "command": "sql_command",
        "sql": "select",
        "table": "folders_to_index",
        "columns": ["path"]
    }));
    let reply = next(&rx);
    assert_eq!(
        reply,
        RequestEvent::Response {
            request_id: select,
            body: json!({ "result": [["/home/me/projects"]] }),
        }
    );

    bus.submit(&json!({
        "command": "sql_command",
        "sql": "delete",
        "table": "folders_to_index",
        "column": "path",
        "value": "/home/me/projects"
    }));
    assert_eq!(next(&rx).body(), &json!({ "result": 1 }));
    assert_eq!(bus.in_flight(), 0);

    store.shutdown();
}

#[test]
fn test_replies_carry_their_own_ids() {
    let (store, bus, rx) = setup();
    let payload = json!({ "command": "sql_command", "sql": "select", "table": "favorites" });
    let ids: Vec<_> = (0..5).map(|_| bus.submit(&payload)).collect();

    let mut replied: Vec<_> = (0..5).map(|_| next(&rx).request_id()).collect();
    let mut expected = ids.clone();
    replied.sort();
    expected.sort();
    expected.dedup();
    assert_eq!(expected.len(), 5);
    assert_eq!(replied, expected);

    store.shutdown();
}

#[test]
fn test_malformed_payloads_fail_without_a_store() {
    let (store, bus, rx) = setup();
    // Nothing reaches the store after this.
    store.shutdown();

    let cases = vec![
        json!({ "command": "sql_command", "sql": "DROP TABLE files" }),
        json!({ "command": "shell", "sql": "select", "table": "files" }),
        json!({ "command": "sql_command", "sql": "select", "table": "sqlite_master" }),
        json!({ "command": "sql_command", "sql": "insert", "table": "files",
                "column_names": ["path"], "values": ["/x"] }),
        json!({ "command": "sql_command", "sql": "delete", "table": "favorites",
                "column": "path; DROP TABLE files", "value": "/x" }),
    ];
    for payload in cases {
        let id = bus.submit(&payload);
        match next(&rx) {
            RequestEvent::Failed { request_id, body } => {
                assert_eq!(request_id, id);
                assert!(body["error"].as_str().unwrap().starts_with("Invalid command"));
            }
            other => panic!("expected failure for {}, got {:?}", payload, other),
        }
    }
    assert_eq!(bus.in_flight(), 0);
}

#[test]
fn test_store_shutdown_surfaces_as_error() {
    let (store, bus, rx) = setup();
    store.shutdown();

    bus.submit(&json!({ "command": "sql_command", "sql": "select", "table": "favorites" }));
    match next(&rx) {
        RequestEvent::Failed { body, .. } => {
            assert_eq!(body, json!({ "error": "Store worker has shut down" }));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}
