//! Per-connection I/O tasks: pure framing, no domain logic. One reader and
//! one writer task per accepted peer, talking to the single `ServerActor`
//! task over `mpsc` channels — the same reader/writer split as the teacher's
//! `ReadTask`/`StreamWriter`, generalized from RPC record marking to FILEMQ's
//! flat 4-byte length-prefixed framing.

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::framing::{read_frame, write_frame};
use crate::wire::{self, Message};

pub type ClientId = u64;

/// Events the reader side (and the acceptor) reports up to the actor.
#[derive(Debug)]
pub enum Inbound {
    /// A new peer connection was accepted; `outbox` feeds its `FrameWriter`.
    Connected(ClientId, mpsc::Sender<Message>),
    Message(ClientId, Message),
    Closed(ClientId),
    DecodeError(ClientId, wire::DecodeError),
}

#[derive(Clone)]
pub struct InboundSender(mpsc::Sender<Inbound>);

pub struct InboundReceiver(mpsc::Receiver<Inbound>);

pub fn create_inbound_channel(capacity: usize) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (InboundSender(tx), InboundReceiver(rx))
}

impl InboundSender {
    pub async fn send_connected(&self, id: ClientId, outbox: mpsc::Sender<Message>) -> Result<(), ()> {
        self.0.send(Inbound::Connected(id, outbox)).await.map_err(|_| ())
    }
}

impl InboundReceiver {
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.0.recv().await
    }
}

/// Reads length-prefixed frames from `read_half` and forwards them until the
/// peer disconnects or a decode error occurs.
pub struct FrameReader {
    id: ClientId,
    read_half: OwnedReadHalf,
    out: InboundSender,
}

impl FrameReader {
    pub fn spawn(id: ClientId, read_half: OwnedReadHalf, out: InboundSender) -> JoinHandle<()> {
        tokio::spawn(Self { id, read_half, out }.run())
    }

    async fn run(mut self) {
        loop {
            match read_frame(&mut self.read_half).await {
                Ok(Some(message)) => {
                    if self.out.0.send(Inbound::Message(self.id, message)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    let _ = self.out.0.send(Inbound::Closed(self.id)).await;
                    return;
                }
                Err(e) => {
                    let _ = self.out.0.send(Inbound::DecodeError(self.id, e)).await;
                    return;
                }
            }
        }
    }
}

/// Writes frames handed to it over `inbox` to `write_half` until the channel
/// closes or a write fails.
pub struct FrameWriter {
    write_half: OwnedWriteHalf,
    inbox: mpsc::Receiver<Message>,
}

impl FrameWriter {
    pub fn spawn(write_half: OwnedWriteHalf, inbox: mpsc::Receiver<Message>) -> JoinHandle<()> {
        tokio::spawn(Self { write_half, inbox }.run())
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            if write_frame(&mut self.write_half, &message).await.is_err() {
                return;
            }
        }
    }
}

