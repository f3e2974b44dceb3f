//! Node Tests
//!
//! Tests verify command dispatch without sockets:
//! - GET/SET/GETALL replies
//! - JOIN sends the snapshot and registers the child
//! - RECOVER applies entries and forwards changes downward only
//! - Attaching a parent is atomic with respect to local writes
//! - Writes are forwarded to every link except the origin
//! - Format errors leave the node untouched

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use arborkv::network::{Peer, Role};
use arborkv::node::{Node, Outcome};
use arborkv::protocol::Entry;
use arborkv::store::{MemoryStore, Storage};
use arborkv::ArborError;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn recording_peer(addr: &str) -> (Peer, SharedBuf) {
    let buf = SharedBuf::default();
    (Peer::new(addr, buf.clone()), buf)
}

fn reply(outcome: Outcome) -> String {
    match outcome {
        Outcome::Reply(line) => line,
        other => panic!("expected a reply, got {:?}", other),
    }
}

// =============================================================================
// Basic Dispatch Tests
// =============================================================================

#[test]
fn test_set_then_get() {
    let node = Node::in_memory();
    let (client, _) = recording_peer("client:1");

    let set = node
        .process(r#"SET||{"key":"k","value":"v1"}"#, &client, Role::Client)
        .unwrap();
    assert_eq!(reply(set), r#"{"key":"k","value":"v1"}"#);

    let get = node.process(r#"GET||{"key":"k"}"#, &client, Role::Client).unwrap();
    assert_eq!(reply(get), r#"{"key":"k","value":"v1"}"#);
}

#[test]
fn test_get_absent_key_soft_miss() {
    let node = Node::in_memory();
    let (client, _) = recording_peer("client:1");

    let get = node.process(r#"GET||{"key":"nope"}"#, &client, Role::Client).unwrap();
    assert_eq!(reply(get), r#"{"key":"nope","value":""}"#);
}

#[test]
fn test_getall() {
    let node = Node::new(Arc::new(MemoryStore::with_entries(vec![("b", "2"), ("a", "1")])));
    let (client, _) = recording_peer("client:1");

    let all = node.process("GETALL", &client, Role::Client).unwrap();
    assert_eq!(
        reply(all),
        r#"[{"key":"a","value":"1"},{"key":"b","value":"2"}]"#
    );
}

#[test]
fn test_format_errors_do_not_mutate() {
    let node = Node::in_memory();
    let (client, _) = recording_peer("client:1");

    for line in ["SET||not-json", "SET", "GET", "RECOVER", "BOGUS||{}"] {
        let err = node.process(line, &client, Role::Client).unwrap_err();
        assert!(matches!(err, ArborError::ProtocolFormat(_)), "{}: {:?}", line, err);
        assert!(err.is_recoverable());
    }
    assert!(node.store().is_empty());
}

// =============================================================================
// Join / Recover Tests
// =============================================================================

#[test]
fn test_join_sends_snapshot_and_registers_child() {
    let node = Node::in_memory();
    node.set("k", "v1").unwrap();
    let (child, child_buf) = recording_peer("child:1");

    let outcome = node.process("JOIN", &child, Role::Client).unwrap();
    assert_eq!(outcome, Outcome::Joined);
    assert_eq!(child_buf.lines(), vec![r#"RECOVER||[{"key":"k","value":"v1"}]"#]);
    assert_eq!(node.registry().child_addrs(), vec!["child:1"]);

    // Later writes follow the snapshot on the same link
    node.set("k", "v2").unwrap();
    assert_eq!(
        child_buf.lines()[1],
        r#"SET||{"key":"k","value":"v2"}"#
    );
}

#[test]
fn test_join_from_parent_link_is_rejected() {
    let node = Node::in_memory();
    let (parent, _) = recording_peer("parent:1");

    let err = node.process("JOIN", &parent, Role::Parent).unwrap_err();
    assert!(matches!(err, ArborError::ProtocolFormat(_)));
    assert_eq!(node.registry().child_count(), 0);
}

#[test]
fn test_recover_applies_entries_without_reply() {
    let node = Node::in_memory();
    let (parent, _) = recording_peer("parent:1");

    let outcome = node
        .process(
            r#"RECOVER||[{"key":"a","value":"1"},{"key":"b","value":"2"}]"#,
            &parent,
            Role::Parent,
        )
        .unwrap();
    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(node.get("a").unwrap().value, "1");
    assert_eq!(node.get("b").unwrap().value, "2");
}

#[test]
fn test_recover_forwards_only_changes_to_children() {
    let node = Node::in_memory();
    node.set("same", "x").unwrap();
    let (child, child_buf) = recording_peer("child:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&child).unwrap();
    node.registry().add_parent(parent.clone());

    let changed = node
        .recover(
            vec![Entry::new("same", "x"), Entry::new("new", "y")],
            Some(parent.id()),
        )
        .unwrap();

    assert_eq!(changed, 1);
    let lines = child_buf.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], r#"SET||{"key":"new","value":"y"}"#);
    assert!(parent_buf.lines().is_empty());
}

#[test]
fn test_recover_from_client_never_goes_upward() {
    let node = Node::in_memory();
    let (client, _) = recording_peer("client:1");
    let (child, child_buf) = recording_peer("child:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&child).unwrap();
    node.registry().add_parent(parent);

    let outcome = node
        .process(r#"RECOVER||[{"key":"k","value":"pushed"}]"#, &client, Role::Client)
        .unwrap();

    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(node.get("k").unwrap().value, "pushed");
    assert_eq!(
        child_buf.lines().last().map(String::as_str),
        Some(r#"SET||{"key":"k","value":"pushed"}"#)
    );
    assert!(parent_buf.lines().is_empty());
}

#[test]
fn test_attach_parent_applies_snapshot() {
    let node = Node::in_memory();
    let (child, child_buf) = recording_peer("child:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&child).unwrap();

    let count = node
        .attach_parent(&parent, || Ok(vec![Entry::new("a", "1"), Entry::new("b", "2")]))
        .unwrap();

    assert_eq!(count, 2);
    assert!(node.registry().has_parent());
    assert_eq!(node.get("b").unwrap().value, "2");
    assert_eq!(child_buf.lines().len(), 3);
    assert!(parent_buf.lines().is_empty());
}

#[test]
fn test_failed_attach_clears_parent() {
    let node = Node::in_memory();
    let (parent, _) = recording_peer("parent:1");

    let err = node
        .attach_parent(&parent, || Err(ArborError::Bootstrap("no snapshot".to_string())))
        .unwrap_err();

    assert!(matches!(err, ArborError::Bootstrap(_)));
    assert!(!node.registry().has_parent());
}

#[test]
fn test_local_write_waits_for_parent_snapshot() {
    let node = Arc::new(Node::in_memory());
    let (parent, parent_buf) = recording_peer("parent:1");
    let (started_tx, started_rx) = std::sync::mpsc::channel();

    let writer = {
        let node = Arc::clone(&node);
        thread::spawn(move || {
            started_rx.recv().unwrap();
            node.set("x", "new").unwrap();
        })
    };

    node.attach_parent(&parent, || {
        started_tx.send(()).unwrap();
        // Give the writer time to hit the write lock
        thread::sleep(Duration::from_millis(100));
        Ok(vec![Entry::new("x", "old")])
    })
    .unwrap();
    writer.join().unwrap();

    assert_eq!(node.get("x").unwrap().value, "new");
    assert_eq!(parent_buf.lines(), vec![r#"SET||{"key":"x","value":"new"}"#]);
}

// =============================================================================
// Propagation Tests
// =============================================================================

#[test]
fn test_set_from_client_reaches_children_and_parent() {
    let node = Node::in_memory();
    let (client, client_buf) = recording_peer("client:1");
    let (child, child_buf) = recording_peer("child:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&child).unwrap();
    node.registry().add_parent(parent);

    let line = r#"SET||{"key":"k","value":"v"}"#;
    node.process(line, &client, Role::Client).unwrap();

    assert_eq!(child_buf.lines().last().map(String::as_str), Some(line));
    assert_eq!(parent_buf.lines(), vec![line.to_string()]);
    // The node never writes to the client itself; the connection does
    assert!(client_buf.lines().is_empty());
}

#[test]
fn test_set_from_parent_is_not_echoed_back() {
    let node = Node::in_memory();
    let (child, child_buf) = recording_peer("child:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&child).unwrap();
    node.registry().add_parent(parent.clone());

    let line = r#"SET||{"key":"k","value":"down"}"#;
    node.process(line, &parent, Role::Parent).unwrap();

    assert_eq!(node.get("k").unwrap().value, "down");
    assert_eq!(child_buf.lines().last().map(String::as_str), Some(line));
    assert!(parent_buf.lines().is_empty());
}

#[test]
fn test_set_from_child_goes_to_siblings_and_parent() {
    let node = Node::in_memory();
    let (a, a_buf) = recording_peer("a:1");
    let (b, b_buf) = recording_peer("b:1");
    let (parent, parent_buf) = recording_peer("parent:1");
    node.join(&a).unwrap();
    node.join(&b).unwrap();
    node.registry().add_parent(parent);

    let line = r#"SET||{"key":"k","value":"up"}"#;
    node.process(line, &a, Role::Child).unwrap();

    assert_eq!(a_buf.lines().len(), 1); // only its RECOVER line
    assert_eq!(b_buf.lines().last().map(String::as_str), Some(line));
    assert_eq!(parent_buf.lines(), vec![line.to_string()]);
}

#[test]
fn test_concurrent_sets_forward_in_apply_order() {
    let node = Arc::new(Node::in_memory());
    let (child, child_buf) = recording_peer("child:1");
    node.join(&child).unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let node = Arc::clone(&node);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                node.set("hot", format!("{}-{}", t, i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // The last forwarded value is the value the node kept
    let last = child_buf.lines().pop().unwrap();
    let expected = format!(
        r#"SET||{{"key":"hot","value":"{}"}}"#,
        node.get("hot").unwrap().value
    );
    assert_eq!(last, expected);
    assert_eq!(child_buf.lines().len(), 401);
}
