//! Client actor (component H): the single task owning the connection,
//! inbox, and subscription list, exposing the CONNECT/SET INBOX/SUBSCRIBE/
//! VERBOSE/$TERM command API (§6).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::connection::{FrameReader, FrameWriter, Inbound};
use crate::client::session::ClientState;
use crate::transport::TcpTransport;
use crate::wire::Message;

pub enum ClientCommand {
    Connect { endpoint: String, timeout: Duration, reply: oneshot::Sender<Result<(), String>> },
    SetInbox { path: PathBuf, reply: oneshot::Sender<Result<(), String>> },
    Subscribe { path: String },
    Verbose,
    Terminate,
}

#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub async fn connect(&self, endpoint: String, timeout: Duration) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Connect { endpoint, timeout, reply })
            .await
            .map_err(|_| "client actor gone".to_string())?;
        rx.await.map_err(|_| "client actor gone".to_string())?
    }

    pub async fn set_inbox(&self, path: PathBuf) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::SetInbox { path, reply })
            .await
            .map_err(|_| "client actor gone".to_string())?;
        rx.await.map_err(|_| "client actor gone".to_string())?
    }

    pub async fn subscribe(&self, path: String) {
        let _ = self.commands.send(ClientCommand::Subscribe { path }).await;
    }

    pub async fn verbose(&self) {
        let _ = self.commands.send(ClientCommand::Verbose).await;
    }

    pub async fn terminate(&self) {
        let _ = self.commands.send(ClientCommand::Terminate).await;
    }
}

pub struct ClientActor {
    state: ClientState,
    commands: mpsc::Receiver<ClientCommand>,
    outbox: Option<mpsc::Sender<Message>>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
}

impl ClientActor {
    pub fn spawn() -> (ClientHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let actor = Self {
            state: ClientState::new(),
            commands: command_rx,
            outbox: None,
            inbound_tx,
            inbound_rx,
        };

        let handle = ClientHandle { commands: command_tx };
        let join = tokio::spawn(actor.run());
        (handle, join)
    }

    async fn run(mut self) {
        loop {
            let have_connection = self.outbox.is_some();
            tokio::select! {
                Some(cmd) = self.commands.recv() => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                Some(event) = self.inbound_rx.recv(), if have_connection => {
                    self.handle_inbound(event).await;
                }
                else => break,
            }
        }
        info!("client actor terminating");
    }

    async fn handle_command(&mut self, cmd: ClientCommand) -> bool {
        match cmd {
            ClientCommand::Connect { endpoint, timeout, reply } => {
                self.do_connect(endpoint, timeout, reply).await;
            }
            ClientCommand::SetInbox { path, reply } => {
                let result = self.state.set_inbox(path).map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            ClientCommand::Subscribe { path } => {
                self.state.subscribe(path.clone());
                if self.outbox.is_some() {
                    let icanhaz = self.state.format_icanhaz(&path, HashMap::new());
                    self.send(icanhaz).await;
                }
            }
            ClientCommand::Verbose => debug!("verbose logging requested"),
            ClientCommand::Terminate => return true,
        }
        false
    }

    async fn do_connect(
        &mut self,
        endpoint: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<(), String>>,
    ) {
        let transport = TcpTransport::new();
        match tokio::time::timeout(timeout, transport.connect(&endpoint)).await {
            Ok(Ok(stream)) => {
                let (read_half, write_half) = stream.into_split();
                let (outbox_tx, outbox_rx) = mpsc::channel(64);
                FrameReader::spawn(read_half, self.inbound_tx.clone());
                FrameWriter::spawn(write_half, outbox_rx);
                self.outbox = Some(outbox_tx);
                self.send(Message::Ohai).await;
                info!(%endpoint, "connected to server");
                let _ = reply.send(Ok(()));
            }
            Ok(Err(e)) => {
                warn!(%endpoint, error = %e, "could not connect");
                let _ = reply.send(Err(format!("server is not reachable: {e}")));
            }
            Err(_) => {
                warn!(%endpoint, "connect timed out");
                let _ = reply.send(Err("server is not reachable".to_string()));
            }
        }
    }

    async fn handle_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Message(Message::OhaiOk) => {
                let subs = self.state.subs.clone();
                for path in subs {
                    let icanhaz = self.state.format_icanhaz(&path, HashMap::new());
                    self.send(icanhaz).await;
                }
            }
            // signal_subscribe_success: no synchronous reply exists on the
            // command channel for SUBSCRIBE, matching the original client.
            // This is also where the original state machine establishes
            // initial credit, before any CHEEZBURGER has arrived to prompt it.
            Inbound::Message(Message::IcanhazOk) => {
                if let Some(nom) = self.state.refill_credit_as_needed() {
                    self.send(nom).await;
                }
            }
            Inbound::Message(msg @ Message::Cheezburger { .. }) => {
                if let Err(e) = self.state.process_the_patch(&msg) {
                    warn!(error = %e, "failed to materialize patch");
                }
                if let Some(nom) = self.state.refill_credit_as_needed() {
                    self.send(nom).await;
                }
            }
            Inbound::Message(Message::Hugz) => self.send(Message::HugzOk).await,
            Inbound::Message(Message::HugzOk) => {}
            Inbound::Message(Message::Srsly { reason }) | Inbound::Message(Message::Rtfm { reason }) => {
                warn!(%reason, "server reported a protocol error");
            }
            Inbound::Message(_) => {}
            Inbound::Closed => {
                info!("server closed the connection");
                self.outbox = None;
            }
            Inbound::DecodeError(e) => {
                warn!(error = %e, "decode error from server");
                self.outbox = None;
            }
        }
    }

    async fn send(&self, message: Message) {
        if let Some(outbox) = &self.outbox {
            let _ = outbox.send(message).await;
        }
    }
}
