//! Per-client state machine on the server side (component E).
//!
//! `START -> HANDLING_OHAI -> CONNECTED -> DISPATCHING <-> SENDING_CHUNK ->
//! (DISPATCHING|FINISHED) -> DISCONNECTED`. File reads are blocking
//! (`std::fs::File`); the actor that owns a `ClientSession` is expected to
//! drive these calls from a context that tolerates brief blocking I/O, the
//! same way the teacher's `vfs_task` treats file access as the expensive
//! step worth isolating from socket I/O.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::patch::{Op, Patch, VirtualPath};
use crate::wire::{Message, Op as WireOp};

/// Fixed chunk size for CREATE transfers, matching the original protocol's
/// non-configurable constant.
pub const CHUNK_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    HandlingOhai,
    Connected,
    Dispatching,
    SendingChunk,
    Disconnected,
}

#[derive(Debug)]
pub enum Error {
    /// A syntactically valid frame arrived that this state does not expect.
    UnexpectedMessage(State),
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedMessage(state) => write!(f, "unexpected message in state {state:?}"),
            Error::Io(e) => write!(f, "io error during transfer: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// An in-flight CREATE transfer. Dropping this (on session teardown, whether
/// by normal EOF or by the session being abandoned mid-transfer) closes the
/// underlying file descriptor, so no explicit cleanup path can leak one.
struct Transfer {
    vpath: VirtualPath,
    file: File,
    offset: u64,
}

pub struct ClientSession {
    pub id: u64,
    pub state: State,
    pub credit: u64,
    pub patch_queue: VecDeque<Patch>,
    pub sequence: u64,
    transfer: Option<Transfer>,
}

impl ClientSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: State::Start,
            credit: 0,
            patch_queue: VecDeque::new(),
            sequence: 0,
            transfer: None,
        }
    }

    pub fn on_ohai(&mut self) -> Result<Message, Error> {
        if self.state != State::Start {
            return Err(Error::UnexpectedMessage(self.state));
        }
        self.state = State::HandlingOhai;
        Ok(Message::OhaiOk)
    }

    /// Called once the server actor has resolved the ICANHAZ against its
    /// mount list (mount lookup lives in the actor, not here, since only the
    /// actor has access to the mount list).
    pub fn on_icanhaz_ok(&mut self) -> Result<Message, Error> {
        if !matches!(self.state, State::HandlingOhai | State::Connected) {
            return Err(Error::UnexpectedMessage(self.state));
        }
        self.state = State::Connected;
        Ok(Message::IcanhazOk)
    }

    pub fn on_nom(&mut self, credit: u64) -> Result<(), Error> {
        if !matches!(self.state, State::Connected | State::SendingChunk) {
            return Err(Error::UnexpectedMessage(self.state));
        }
        self.credit += credit;
        Ok(())
    }

    pub fn on_kthxbai(&mut self) {
        self.state = State::Disconnected;
    }

    /// Attempts to advance one step of dispatch: pop the next queued patch
    /// (if not already mid-transfer) and emit the next frame for it. A CREATE
    /// chunk is always read at full `CHUNK_SIZE` (capped by remaining file
    /// bytes) before it is offered against `credit`; if it doesn't fit, the
    /// read is discarded and dispatch waits (SENDING_CHUNK) rather than
    /// sending a partial, undersized chunk. Returns `Ok(None)` when the queue
    /// is drained (back to CONNECTED) or while waiting for credit.
    pub fn next_patch(&mut self) -> Result<Option<Message>, Error> {
        self.state = State::Dispatching;

        if self.transfer.is_none() {
            let patch = match self.patch_queue.pop_front() {
                Some(p) => p,
                None => {
                    self.state = State::Connected;
                    return Ok(None);
                }
            };

            match patch.op {
                Op::Delete => {
                    let sequence = self.sequence;
                    self.sequence += 1;
                    self.state = State::Connected;
                    return Ok(Some(Message::Cheezburger {
                        sequence,
                        operation: WireOp::Delete,
                        filename: patch.vpath,
                        offset: 0,
                        eof: true,
                        headers: HashMap::new(),
                        chunk: Vec::new(),
                    }));
                }
                Op::Create => {
                    let handle = patch.handle.expect("create patch always carries a handle");
                    let file = File::open(handle.as_path())?;
                    self.transfer = Some(Transfer { vpath: patch.vpath, file, offset: 0 });
                }
            }
        }

        let transfer = self.transfer.as_mut().expect("ensured present above");
        transfer.file.seek(SeekFrom::Start(transfer.offset))?;
        let mut buf = vec![0u8; CHUNK_SIZE as usize];
        let n = read_fully(&mut transfer.file, &mut buf)?;
        buf.truncate(n);

        if n as u64 > self.credit {
            self.state = State::SendingChunk;
            return Ok(None);
        }

        let transfer = self.transfer.as_mut().expect("ensured present above");
        let offset = transfer.offset;
        let vpath = transfer.vpath.clone();
        transfer.offset += n as u64;
        self.credit -= n as u64;
        let sequence = self.sequence;
        self.sequence += 1;
        let eof = n == 0;

        if eof {
            self.transfer = None;
        }
        self.state = State::Connected;

        Ok(Some(Message::Cheezburger {
            sequence,
            operation: WireOp::Create,
            filename: vpath,
            offset,
            eof,
            headers: HashMap::new(),
            chunk: buf,
        }))
    }
}

fn read_fully(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;
    use std::path::PathBuf;

    fn create_patch(vpath: &str, path: PathBuf) -> Patch {
        Patch::create(vpath.to_string(), path, "irrelevant".to_string())
    }

    #[test]
    fn handshake_and_subscribe() {
        let mut session = ClientSession::new(1);
        assert_eq!(session.on_ohai().unwrap(), Message::OhaiOk);
        assert_eq!(session.state, State::HandlingOhai);
        assert_eq!(session.on_icanhaz_ok().unwrap(), Message::IcanhazOk);
        assert_eq!(session.state, State::Connected);
    }

    #[test]
    fn ohai_out_of_state_is_unexpected() {
        let mut session = ClientSession::new(1);
        session.on_ohai().unwrap();
        session.on_icanhaz_ok().unwrap();
        assert!(matches!(session.on_ohai(), Err(Error::UnexpectedMessage(State::Connected))));
    }

    #[test]
    fn delete_patch_consumes_no_credit() {
        let mut session = ClientSession::new(1);
        session.patch_queue.push_back(Patch::delete("/a.txt".to_string()));
        let msg = session.next_patch().unwrap().unwrap();
        assert_eq!(session.credit, 0);
        match msg {
            Message::Cheezburger { operation, eof, .. } => {
                assert_eq!(operation, WireOp::Delete);
                assert!(eof);
            }
            _ => panic!("expected Cheezburger"),
        }
    }

    #[test]
    fn create_transfer_waits_without_credit_then_streams_and_ends_with_zero_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let mut session = ClientSession::new(1);
        session.patch_queue.push_back(create_patch("/a.txt", path));

        assert!(session.next_patch().unwrap().is_none());
        assert_eq!(session.state, State::SendingChunk);

        session.on_nom(CHUNK_SIZE).unwrap();
        let first = session.next_patch().unwrap().unwrap();
        match first {
            Message::Cheezburger { chunk, eof, offset, .. } => {
                assert_eq!(chunk, b"hello");
                assert!(!eof);
                assert_eq!(offset, 0);
            }
            _ => panic!("expected Cheezburger"),
        }

        let second = session.next_patch().unwrap().unwrap();
        match second {
            Message::Cheezburger { chunk, eof, .. } => {
                assert!(chunk.is_empty());
                assert!(eof);
            }
            _ => panic!("expected Cheezburger"),
        }
    }

    #[test]
    fn credit_never_goes_negative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 2_000_000]).unwrap();

        let mut session = ClientSession::new(1);
        session.patch_queue.push_back(create_patch("/big.bin", path));
        session.on_nom(CHUNK_SIZE * 4 + 1).unwrap();

        let mut total_sent = 0u64;
        loop {
            match session.next_patch().unwrap() {
                Some(Message::Cheezburger { chunk, eof, .. }) => {
                    total_sent += chunk.len() as u64;
                    if eof {
                        break;
                    }
                }
                _ => break,
            }
        }
        assert_eq!(total_sent, 2_000_000);
    }
}
