//! Server actor (component F): the single task that owns the mount list,
//! every connected client's session, and the 1000ms refresh timer. No lock
//! is needed anywhere in this file because nothing outside this task ever
//! touches `mounts` or `sessions` (see SPEC_FULL §5) — grounded on the
//! teacher's `lib.rs::handle_forever`/`process_socket` wiring, collapsed
//! into one owning task instead of three per-connection ones.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::patch::Patch;
use crate::server::connection::{
    create_inbound_channel, FrameReader, FrameWriter, Inbound, InboundReceiver, InboundSender,
};
use crate::server::mount::{self, ClientId, Mount};
use crate::server::session::{self, ClientSession, State};
use crate::transport::TcpTransport;
use crate::wire::Message;

const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

pub enum ServerCommand {
    Publish { location: PathBuf, alias: String, reply: oneshot::Sender<Result<(), String>> },
    Bind { endpoint: String, reply: oneshot::Sender<Result<std::net::SocketAddr, String>> },
    Verbose,
    Terminate,
}

#[derive(Clone)]
pub struct ServerHandle {
    commands: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    pub async fn publish(&self, location: PathBuf, alias: String) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ServerCommand::Publish { location, alias, reply })
            .await
            .map_err(|_| "server actor gone".to_string())?;
        rx.await.map_err(|_| "server actor gone".to_string())?
    }

    pub async fn bind(&self, endpoint: String) -> Result<std::net::SocketAddr, String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ServerCommand::Bind { endpoint, reply })
            .await
            .map_err(|_| "server actor gone".to_string())?;
        rx.await.map_err(|_| "server actor gone".to_string())?
    }

    pub async fn verbose(&self) {
        let _ = self.commands.send(ServerCommand::Verbose).await;
    }

    pub async fn terminate(&self) {
        let _ = self.commands.send(ServerCommand::Terminate).await;
    }
}

enum Outcome {
    Reply(Message),
    Error(session::Error),
    Disconnect,
    None,
}

pub struct ServerActor {
    mounts: Vec<Mount>,
    sessions: HashMap<ClientId, ClientSession>,
    outboxes: HashMap<ClientId, mpsc::Sender<Message>>,
    next_client_id: Arc<AtomicU64>,
    transport: Arc<TcpTransport>,
    commands: mpsc::Receiver<ServerCommand>,
    inbound: InboundReceiver,
    inbound_tx: InboundSender,
}

impl ServerActor {
    /// Spawns the actor task; the connection acceptor is spawned separately,
    /// the first time a `BIND` succeeds.
    pub fn spawn() -> (ServerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = create_inbound_channel(256);

        let actor = Self {
            mounts: Vec::new(),
            sessions: HashMap::new(),
            outboxes: HashMap::new(),
            next_client_id: Arc::new(AtomicU64::new(1)),
            transport: Arc::new(TcpTransport::new()),
            commands: command_rx,
            inbound: inbound_rx,
            inbound_tx,
        };

        let handle = ServerHandle { commands: command_tx };
        let join = tokio::spawn(actor.run());
        (handle, join)
    }

    async fn run(mut self) {
        let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
        let mut acceptor_started = false;

        loop {
            tokio::select! {
                Some(cmd) = self.commands.recv() => {
                    if self.handle_command(cmd, &mut acceptor_started).await {
                        break;
                    }
                }
                Some(event) = self.inbound.recv() => {
                    self.handle_inbound(event).await;
                }
                _ = refresh.tick() => {
                    self.refresh_mounts().await;
                }
                else => break,
            }
        }

        info!("server actor terminating");
    }

    async fn handle_command(&mut self, cmd: ServerCommand, acceptor_started: &mut bool) -> bool {
        match cmd {
            ServerCommand::Publish { location, alias, reply } => {
                info!(?location, %alias, "publishing mount");
                self.mounts.push(Mount::new(location, alias));
                let _ = reply.send(Ok(()));
            }
            ServerCommand::Bind { endpoint, reply } => match self.transport.bind_and_report(&endpoint).await {
                Ok(addr) => {
                    if !*acceptor_started {
                        *acceptor_started = true;
                        spawn_acceptor(self.transport.clone(), self.next_client_id.clone(), self.inbound_tx.clone());
                    }
                    let _ = reply.send(Ok(addr));
                }
                Err(e) => {
                    let _ = reply.send(Err(e.to_string()));
                }
            },
            ServerCommand::Verbose => debug!("verbose logging requested"),
            ServerCommand::Terminate => return true,
        }
        false
    }

    async fn handle_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Connected(id, outbox) => {
                self.sessions.insert(id, ClientSession::new(id));
                self.outboxes.insert(id, outbox);
            }
            Inbound::Message(id, message) => self.handle_message(id, message).await,
            Inbound::Closed(id) => self.disconnect(id).await,
            Inbound::DecodeError(id, e) => {
                warn!(client = id, error = %e, "decode error, dropping connection");
                self.send(id, Message::Rtfm { reason: e.to_string() }).await;
                self.disconnect(id).await;
            }
        }
    }

    async fn handle_message(&mut self, id: ClientId, message: Message) {
        let outcome = {
            let Some(session) = self.sessions.get_mut(&id) else { return };
            match message {
                Message::Ohai => match session.on_ohai() {
                    Ok(m) => Outcome::Reply(m),
                    Err(e) => Outcome::Error(e),
                },
                Message::Icanhaz { path, options: _, cache } => {
                    match mount::select_mount(&mut self.mounts, &path) {
                        Some(mount) => {
                            mount::mount_sub_store(mount, id, path, cache);
                            match session.on_icanhaz_ok() {
                                Ok(m) => Outcome::Reply(m),
                                Err(e) => Outcome::Error(e),
                            }
                        }
                        // No mount covers this path: silently ignored, per §4.D.
                        None => Outcome::None,
                    }
                }
                Message::Nom { credit, sequence: _ } => match session.on_nom(credit) {
                    Ok(()) => match session.next_patch() {
                        Ok(Some(m)) => Outcome::Reply(m),
                        Ok(None) => Outcome::None,
                        Err(e) => Outcome::Error(e),
                    },
                    Err(e) => Outcome::Error(e),
                },
                Message::Hugz => Outcome::Reply(Message::HugzOk),
                Message::HugzOk => Outcome::None,
                Message::Kthxbai => {
                    session.on_kthxbai();
                    Outcome::Disconnect
                }
                _ => Outcome::Error(session::Error::UnexpectedMessage(session.state)),
            }
        };

        match outcome {
            Outcome::Reply(m) => self.send(id, m).await,
            Outcome::Error(e) => {
                warn!(client = id, error = %e, "protocol error");
                self.send(id, Message::Srsly { reason: e.to_string() }).await;
            }
            Outcome::Disconnect => self.disconnect(id).await,
            Outcome::None => {}
        }
    }

    async fn send(&self, id: ClientId, message: Message) {
        if let Some(outbox) = self.outboxes.get(&id) {
            let _ = outbox.send(message).await;
        }
    }

    async fn disconnect(&mut self, id: ClientId) {
        self.sessions.remove(&id);
        self.outboxes.remove(&id);
        for mount in &mut self.mounts {
            mount::mount_sub_purge(mount, id);
        }
    }

    async fn refresh_mounts(&mut self) {
        let mut staged: HashMap<ClientId, VecDeque<Patch>> = HashMap::new();

        for mount in &mut self.mounts {
            if let Err(e) = mount::mount_refresh(mount, &mut staged) {
                error!(alias = %mount.alias, error = %e, "mount refresh failed");
            }
        }

        if staged.is_empty() {
            return;
        }

        for (id, mut queue) in staged {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.patch_queue.append(&mut queue);
            }
        }

        let ids: Vec<ClientId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.dispatch_one(id).await;
        }
    }

    async fn dispatch_one(&mut self, id: ClientId) {
        let outcome = {
            let Some(session) = self.sessions.get_mut(&id) else { return };
            if session.state != State::Connected {
                return;
            }
            match session.next_patch() {
                Ok(Some(m)) => Outcome::Reply(m),
                Ok(None) => Outcome::None,
                Err(e) => Outcome::Error(e),
            }
        };
        match outcome {
            Outcome::Reply(m) => self.send(id, m).await,
            Outcome::Error(e) => warn!(client = id, error = %e, "dispatch failed"),
            _ => {}
        }
    }
}

fn spawn_acceptor(transport: Arc<TcpTransport>, next_id: Arc<AtomicU64>, inbound_tx: InboundSender) {
    tokio::spawn(async move {
        loop {
            match transport.accept().await {
                Ok((stream, peer)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    info!(client = id, %peer, "accepted connection");
                    let (read_half, write_half) = stream.into_split();
                    let (outbox_tx, outbox_rx) = mpsc::channel(64);
                    FrameReader::spawn(id, read_half, inbound_tx.clone());
                    FrameWriter::spawn(write_half, outbox_rx);
                    if inbound_tx.send_connected(id, outbox_tx).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "accept failed, acceptor stopping");
                    return;
                }
            }
        }
    });
}
