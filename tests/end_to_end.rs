//! End-to-end exercises of the publish -> diff -> fan-out -> dispatch path
//! (component integration, no network — the wire codec and transport have
//! their own focused tests). Mirrors scenarios 1, 3 and 6 of SPEC_FULL §8.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use filemq::patch::Patch;
use filemq::server::mount::{self, ClientId, Mount};
use filemq::server::session::ClientSession;
use filemq::wire::{Message, Op as WireOp};

fn drain_transfer(session: &mut ClientSession, credit: u64) -> Vec<u8> {
    session.on_nom(credit).unwrap();
    let mut out = Vec::new();
    loop {
        match session.next_patch().unwrap() {
            Some(Message::Cheezburger { chunk, eof, operation, .. }) => {
                assert_eq!(operation, WireOp::Create);
                out.extend_from_slice(&chunk);
                if eof {
                    break;
                }
            }
            _ => break,
        }
    }
    out
}

#[test]
fn scenario_1_new_file_is_mirrored_to_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let mut mount = Mount::new(dir.path().to_path_buf(), "/".to_string());
    mount::mount_sub_store(&mut mount, 1, "/".to_string(), HashMap::new());

    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

    let mut queues: HashMap<ClientId, VecDeque<Patch>> = HashMap::new();
    let produced = mount::mount_refresh(&mut mount, &mut queues).unwrap();
    assert!(produced);

    let mut session = ClientSession::new(1);
    session.patch_queue.append(queues.get_mut(&1).unwrap());

    let received = drain_transfer(&mut session, 1_000_000);
    assert_eq!(received, b"hello");
}

#[test]
fn scenario_3_cache_elision_skips_known_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"hello").unwrap();
    let mut mount = Mount::new(dir.path().to_path_buf(), "/".to_string());

    // Establish the baseline snapshot with no subscriber yet listening.
    let mut queues: HashMap<ClientId, VecDeque<Patch>> = HashMap::new();
    mount::mount_refresh(&mut mount, &mut queues).unwrap();

    let mut cache = HashMap::new();
    cache.insert("/a.txt".to_string(), digest_of(&path));
    mount::mount_sub_store(&mut mount, 2, "/".to_string(), cache);

    // Rewrite the same bytes: mtime changes (so the diff still proposes a
    // Create for /a.txt) but content, and therefore digest, does not.
    std::fs::write(&path, b"hello").unwrap();
    let mut queues: HashMap<ClientId, VecDeque<Patch>> = HashMap::new();
    let produced = mount::mount_refresh(&mut mount, &mut queues).unwrap();
    assert!(produced, "diff should still see a changed mtime");

    let queue = queues.get(&2).cloned().unwrap_or_default();
    assert!(queue.is_empty(), "subscription's digest cache should have elided the re-send");
}

fn digest_of(path: &PathBuf) -> String {
    use sha2::{Digest, Sha256};
    let bytes = std::fs::read(path).unwrap();
    format!("{:x}", Sha256::digest(&bytes))
}

#[test]
fn scenario_6_delete_propagates_to_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    let mut mount = Mount::new(dir.path().to_path_buf(), "/".to_string());
    mount::mount_sub_store(&mut mount, 1, "/".to_string(), HashMap::new());

    let mut queues: HashMap<ClientId, VecDeque<Patch>> = HashMap::new();
    mount::mount_refresh(&mut mount, &mut queues).unwrap();
    queues.clear();

    std::fs::remove_file(dir.path().join("a.txt")).unwrap();
    mount::mount_refresh(&mut mount, &mut queues).unwrap();

    let mut session = ClientSession::new(1);
    session.patch_queue.append(queues.get_mut(&1).unwrap());

    let msg = session.next_patch().unwrap().unwrap();
    match msg {
        Message::Cheezburger { operation, filename, eof, .. } => {
            assert_eq!(operation, WireOp::Delete);
            assert_eq!(filename, "/a.txt");
            assert!(eof);
        }
        _ => panic!("expected a delete Cheezburger"),
    }
}
