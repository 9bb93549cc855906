//! Client-side state machine (component G): handshake bookkeeping, credit
//! replenishment, and file materialization into the inbox.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::wire::{Message, Op};

/// Non-configurable by design (see SPEC_FULL §9): refilling in whole slices
/// keeps every NOM worth sending, and the minimum keeps one slice of
/// headroom at all times.
pub const CREDIT_SLICE: u64 = 1_000_000;
pub const CREDIT_MINIMUM: u64 = CREDIT_SLICE * 4 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Connecting,
    Connected,
    Subscribed,
    Terminated,
}

#[derive(Debug)]
pub enum Error {
    InboxAlreadySet,
    PathEscapesInbox(String),
    SequenceRegression { last: u64, got: u64 },
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
            Error::InboxAlreadySet => write!(f, "inbox already set"),
            Error::PathEscapesInbox(name) => write!(f, "filename escapes inbox: {name}"),
            Error::SequenceRegression { last, got } => {
                write!(f, "sequence went backwards: last {last}, got {got}")
            }
            Error::Io(e) => write!(f, "io error materializing patch: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// All state owned by the client actor: inbox location, subscription list,
/// outstanding credit, sequence tracking, and the currently open writer.
pub struct ClientState {
    pub state: State,
    pub inbox: Option<PathBuf>,
    pub subs: Vec<String>,
    pub credit: u64,
    last_sequence: Option<u64>,
    open_writer: Option<File>,
    open_vpath: Option<String>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            inbox: None,
            subs: Vec::new(),
            credit: 0,
            last_sequence: None,
            open_writer: None,
            open_vpath: None,
        }
    }

    /// `setup_inbox`: succeeds once; a second call fails with
    /// "inbox already set", matching the original client.
    pub fn set_inbox(&mut self, path: PathBuf) -> Result<(), Error> {
        if self.inbox.is_some() {
            return Err(Error::InboxAlreadySet);
        }
        self.inbox = Some(path);
        Ok(())
    }

    pub fn subscribe(&mut self, path: String) {
        self.subs.push(path);
        self.state = State::Subscribed;
    }

    /// `format_icanhaz_command`: builds the ICANHAZ frame for one
    /// subscription, attaching whatever cache hints the caller supplies.
    pub fn format_icanhaz(&self, path: &str, cache: HashMap<String, String>) -> Message {
        Message::Icanhaz { path: path.to_string(), options: HashMap::new(), cache }
    }

    /// `refill_credit_as_needed`: tops outstanding credit back up to at
    /// least `CREDIT_MINIMUM`, in whole `CREDIT_SLICE` steps. Returns the
    /// NOM frame to send, or `None` if no top-up was needed.
    pub fn refill_credit_as_needed(&mut self) -> Option<Message> {
        let mut credit_to_send = 0u64;
        while self.credit < CREDIT_MINIMUM {
            credit_to_send += CREDIT_SLICE;
            self.credit += CREDIT_SLICE;
        }
        if credit_to_send == 0 {
            return None;
        }
        Some(Message::Nom { credit: credit_to_send, sequence: self.last_sequence.unwrap_or(0) })
    }

    /// `process_the_patch`: materializes one CHEEZBURGER into the inbox,
    /// checking sequence continuity and debiting local credit bookkeeping.
    pub fn process_the_patch(&mut self, msg: &Message) -> Result<(), Error> {
        let Message::Cheezburger { sequence, operation, filename, offset, eof, chunk, .. } = msg else {
            return Ok(());
        };

        if let Some(last) = self.last_sequence {
            if *sequence <= last {
                return Err(Error::SequenceRegression { last, got: *sequence });
            }
        }
        self.last_sequence = Some(*sequence);
        self.credit = self.credit.saturating_sub(chunk.len() as u64);

        let inbox = self.inbox.as_ref().expect("inbox set before the first subscription is sent");
        let dest = safe_join(inbox, filename)?;

        match operation {
            Op::Delete => {
                if self.open_vpath.as_deref() == Some(filename.as_str()) {
                    self.open_writer = None;
                    self.open_vpath = None;
                }
                match fs::remove_file(&dest) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
            }
            Op::Create => {
                if *offset == 0 {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let file = OpenOptions::new().create(true).write(true).truncate(true).open(&dest)?;
                    self.open_writer = Some(file);
                    self.open_vpath = Some(filename.clone());
                } else if self.open_vpath.as_deref() != Some(filename.as_str()) {
                    let file = OpenOptions::new().write(true).open(&dest)?;
                    self.open_writer = Some(file);
                    self.open_vpath = Some(filename.clone());
                }

                let writer = self.open_writer.as_mut().expect("a writer was opened above");
                writer.seek(SeekFrom::Start(*offset))?;
                writer.write_all(chunk)?;

                if *eof {
                    self.open_writer = None;
                    self.open_vpath = None;
                }
            }
        }

        Ok(())
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins `filename` (a server-supplied vpath) onto `inbox`, rejecting any
/// path that would escape it. The original C client trusts the server's
/// vpath verbatim; here it's treated as a protocol violation instead, since
/// this FSM is a reusable library component rather than one fixed
/// deployment (see SPEC_FULL §4.G).
fn safe_join(inbox: &Path, filename: &str) -> Result<PathBuf, Error> {
    let relative = filename.trim_start_matches('/');
    let candidate = Path::new(relative);
    if candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(Error::PathEscapesInbox(filename.to_string()));
    }
    Ok(inbox.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheezburger(sequence: u64, op: Op, filename: &str, offset: u64, eof: bool, chunk: &[u8]) -> Message {
        Message::Cheezburger {
            sequence,
            operation: op,
            filename: filename.to_string(),
            offset,
            eof,
            headers: HashMap::new(),
            chunk: chunk.to_vec(),
        }
    }

    #[test]
    fn inbox_can_only_be_set_once() {
        let mut state = ClientState::new();
        state.set_inbox(PathBuf::from("/tmp/in")).unwrap();
        assert!(matches!(state.set_inbox(PathBuf::from("/tmp/in2")), Err(Error::InboxAlreadySet)));
    }

    #[test]
    fn refill_credit_tops_up_in_whole_slices() {
        let mut state = ClientState::new();
        let msg = state.refill_credit_as_needed().unwrap();
        assert_eq!(state.credit, CREDIT_MINIMUM.div_ceil(CREDIT_SLICE) * CREDIT_SLICE);
        match msg {
            Message::Nom { credit, .. } => assert_eq!(credit % CREDIT_SLICE, 0),
            _ => panic!("expected Nom"),
        }
        assert!(state.refill_credit_as_needed().is_none());
    }

    #[test]
    fn materializes_single_chunk_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ClientState::new();
        state.set_inbox(dir.path().to_path_buf()).unwrap();

        state.process_the_patch(&cheezburger(1, Op::Create, "/a.txt", 0, false, b"hello")).unwrap();
        state.process_the_patch(&cheezburger(2, Op::Create, "/a.txt", 0, true, b"")).unwrap();

        let contents = std::fs::read(dir.path().join("a.txt")).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn delete_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let mut state = ClientState::new();
        state.set_inbox(dir.path().to_path_buf()).unwrap();

        state.process_the_patch(&cheezburger(1, Op::Delete, "/a.txt", 0, true, b"")).unwrap();
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn sequence_regression_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ClientState::new();
        state.set_inbox(dir.path().to_path_buf()).unwrap();

        state.process_the_patch(&cheezburger(5, Op::Create, "/a.txt", 0, true, b"")).unwrap();
        let err = state.process_the_patch(&cheezburger(5, Op::Create, "/b.txt", 0, true, b""));
        assert!(matches!(err, Err(Error::SequenceRegression { last: 5, got: 5 })));
    }

    #[test]
    fn rejects_path_escaping_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ClientState::new();
        state.set_inbox(dir.path().to_path_buf()).unwrap();

        let err = state.process_the_patch(&cheezburger(1, Op::Create, "/../escape.txt", 0, true, b""));
        assert!(matches!(err, Err(Error::PathEscapesInbox(_))));
    }
}
