//! Per-connection I/O tasks for the client actor — pure framing, mirroring
//! `server::connection`'s reader/writer split for a single outbound peer.

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::framing::{read_frame, write_frame};
use crate::wire::{self, Message};

#[derive(Debug)]
pub enum Inbound {
    Message(Message),
    Closed,
    DecodeError(wire::DecodeError),
}

pub struct FrameReader {
    read_half: OwnedReadHalf,
    out: mpsc::Sender<Inbound>,
}

impl FrameReader {
    pub fn spawn(read_half: OwnedReadHalf, out: mpsc::Sender<Inbound>) -> JoinHandle<()> {
        tokio::spawn(Self { read_half, out }.run())
    }

    async fn run(mut self) {
        loop {
            match read_frame(&mut self.read_half).await {
                Ok(Some(message)) => {
                    if self.out.send(Inbound::Message(message)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    let _ = self.out.send(Inbound::Closed).await;
                    return;
                }
                Err(e) => {
                    let _ = self.out.send(Inbound::DecodeError(e)).await;
                    return;
                }
            }
        }
    }
}

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
