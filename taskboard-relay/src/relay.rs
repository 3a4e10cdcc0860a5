//! Relay server core: shared state, WebSocket handler and per-connection
//! message handling.
//!
//! A connection must authenticate with its first frame. After that it may
//! join the rooms of projects it can see, leave them again, and publish
//! board events which the [`RoomBroadcaster`] fans out to every other
//! subscriber of the room. Board mutations made through the attached
//! [`Board`] reach the same rooms through its event sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskboard::Board;
use taskboard::credentials::CredentialService;
use taskboard::events::ConnectionId;
use taskboard::identity::Principal;
use taskboard_proto::event::{BoardEvent, EntityRef, RoomId};
use taskboard_proto::socket::{self, ClientMessage, ErrorKind, ServerMessage};
use tokio::sync::mpsc;

use crate::rooms::RoomBroadcaster;

/// Default maximum encoded size of a published event (64 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// How long a new connection has to send `Authenticate`.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared relay state: the board, the broadcaster and the connection
/// policy.
pub struct RelayState {
    board: Arc<Board>,
    broadcaster: Arc<RoomBroadcaster>,
    credentials: Arc<dyn CredentialService>,
    max_payload_size: usize,
    require_membership: bool,
    next_conn: AtomicU64,
}

impl RelayState {
    /// Creates relay state with the default payload limit and membership
    /// checks on join.
    ///
    /// `board` should publish into `broadcaster` (see
    /// [`Board::with_events`]) for board mutations to reach clients.
    #[must_use]
    pub fn new(
        board: Arc<Board>,
        broadcaster: Arc<RoomBroadcaster>,
        credentials: Arc<dyn CredentialService>,
    ) -> Self {
        Self {
            board,
            broadcaster,
            credentials,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            require_membership: true,
            next_conn: AtomicU64::new(1),
        }
    }

    /// Overrides the publish size limit.
    #[must_use]
    pub const fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Turns the join-time membership check on or off.
    #[must_use]
    pub const fn with_require_membership(mut self, require: bool) -> Self {
        self.require_membership = require;
        self
    }

    /// The attached board.
    #[must_use]
    pub const fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// The room broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &Arc<RoomBroadcaster> {
        &self.broadcaster
    }

    fn next_connection(&self) -> ConnectionId {
        ConnectionId::new(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }
}

/// One authenticated connection.
struct Session {
    conn: ConnectionId,
    principal: Principal,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    fn reply(&self, msg: ServerMessage) {
        if self.outbox.send(msg).is_err() {
            tracing::debug!(conn = %self.conn, "writer gone, reply dropped");
        }
    }

    fn reject(&self, kind: ErrorKind, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(conn = %self.conn, kind = %kind, reason = %reason, "request rejected");
        self.reply(ServerMessage::error(kind, reason));
    }
}

/// Outcome of waiting for the first frame.
enum Handshake {
    Token(String),
    Rejected(String),
    Closed,
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Wait for `Authenticate` and resolve the token.
/// 2. Register with the broadcaster and answer `Authenticated`.
/// 3. Run a reader task (client requests) and a writer task (replies and
///    room events) until either side stops.
/// 4. Drop every subscription.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let token = match tokio::time::timeout(AUTH_TIMEOUT, wait_for_authenticate(&mut ws_receiver))
        .await
    {
        Ok(Handshake::Token(token)) => token,
        Ok(Handshake::Rejected(reason)) => {
            reject_handshake(&mut ws_sender, reason).await;
            return;
        }
        Ok(Handshake::Closed) => {
            tracing::debug!("connection closed before authentication");
            return;
        }
        Err(_) => {
            tracing::warn!("authentication timed out");
            reject_handshake(&mut ws_sender, "authentication timed out".to_string()).await;
            return;
        }
    };

    let principal = match state.credentials.authenticate(&token).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, "authentication failed");
            reject_handshake(&mut ws_sender, e.to_string()).await;
            return;
        }
    };
    state.board.register_principal(principal.clone()).await;

    let conn = state.next_connection();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.broadcaster.connect(conn, tx.clone());

    let ack = ServerMessage::Authenticated { user: principal.id };
    if let Err(e) = send_server_msg(&mut ws_sender, &ack).await {
        tracing::warn!(conn = %conn, error = %e, "failed to send Authenticated");
        state.broadcaster.disconnect(conn);
        return;
    }
    tracing::info!(conn = %conn, user = %principal.id, "connection authenticated");

    // Writer: replies and room events, in channel order. Events for rooms
    // the connection has since left are dropped here, and so are events of
    // projects the user no longer belongs to, which also ends the
    // subscription.
    let writer_state = Arc::clone(&state);
    let user = principal.id;
    let mut write_task = tokio::spawn(async move {
        while let Some(mut msg) = rx.recv().await {
            let event_room = match &msg {
                ServerMessage::Event { room, .. } => Some(*room),
                _ => None,
            };
            if let Some(room) = event_room {
                if !writer_state.broadcaster.is_subscribed(conn, room) {
                    tracing::trace!(conn = %conn, room = %room, "dropping event for left room");
                    continue;
                }
                if writer_state.require_membership
                    && !writer_state.board.retains_subscriber(user, room.project()).await
                {
                    writer_state.broadcaster.leave(conn, room);
                    tracing::info!(conn = %conn, user = %user, room = %room, "access revoked, leaving room");
                    msg = ServerMessage::Left { room };
                }
            }
            if let Err(e) = send_server_msg(&mut ws_sender, &msg).await {
                tracing::warn!(conn = %conn, error = %e, "WebSocket write failed");
                break;
            }
        }
    });

    let session = Session {
        conn,
        principal,
        outbox: tx,
    };
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_client_frame(&session, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::debug!(conn = %session.conn, "received close frame");
                    break;
                }
                _ => {
                    // Text, ping and pong frames carry nothing for us.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let rooms = state.broadcaster.disconnect(conn);
    tracing::info!(conn = %conn, rooms, "connection closed");
}

/// Waits for the first binary frame and expects `Authenticate`.
async fn wait_for_authenticate(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Handshake {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                return match socket::decode_client(&data) {
                    Ok(ClientMessage::Authenticate { token }) => Handshake::Token(token),
                    Ok(other) => {
                        tracing::warn!(msg = ?other, "expected Authenticate");
                        Handshake::Rejected("authenticate first".to_string())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable first frame");
                        Handshake::Rejected("authenticate first".to_string())
                    }
                };
            }
            Message::Close(_) => return Handshake::Closed,
            _ => {}
        }
    }
    Handshake::Closed
}

async fn reject_handshake(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    reason: String,
) {
    let err = ServerMessage::error(ErrorKind::Unauthenticated, reason);
    if send_server_msg(ws_sender, &err).await.is_ok() {
        let _ = ws_sender.send(Message::Close(None)).await;
    }
}

/// Handles one binary frame from an authenticated connection.
async fn handle_client_frame(session: &Session, data: &[u8], state: &RelayState) {
    let msg = match socket::decode_client(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(conn = %session.conn, error = %e, "failed to decode client message");
            session.reject(ErrorKind::Validation, "malformed message");
            return;
        }
    };

    match msg {
        ClientMessage::Authenticate { .. } => {
            session.reject(ErrorKind::Validation, "already authenticated");
        }
        ClientMessage::JoinRoom { room } => {
            if state.require_membership
                && !state
                    .board
                    .can_view_project(session.principal.id, room.project())
                    .await
            {
                session.reject(ErrorKind::Forbidden, format!("no access to {room}"));
                return;
            }
            match state.broadcaster.join(session.conn, room) {
                Ok(_) => session.reply(ServerMessage::Joined { room }),
                Err(e) => session.reject(ErrorKind::Unavailable, e.to_string()),
            }
        }
        ClientMessage::LeaveRoom { room } => {
            state.broadcaster.leave(session.conn, room);
            session.reply(ServerMessage::Left { room });
        }
        ClientMessage::Publish { room, event } => {
            if data.len() > state.max_payload_size {
                session.reject(
                    ErrorKind::Validation,
                    format!(
                        "payload too large: {} bytes (max {})",
                        data.len(),
                        state.max_payload_size
                    ),
                );
                return;
            }
            if !state.broadcaster.is_subscribed(session.conn, room) {
                session.reject(ErrorKind::Forbidden, format!("join {room} before publishing"));
                return;
            }
            if state.require_membership
                && !state
                    .board
                    .retains_subscriber(session.principal.id, room.project())
                    .await
            {
                state.broadcaster.leave(session.conn, room);
                session.reject(ErrorKind::Forbidden, format!("no access to {room}"));
                return;
            }
            if let Err(reason) = check_event_room(room, &event) {
                session.reject(ErrorKind::Validation, reason);
                return;
            }
            tracing::debug!(conn = %session.conn, room = %room, kind = %event.kind(), "client publish");
            state.broadcaster.broadcast(Some(session.conn), room, &event);
        }
    }
}

/// An event may only be published to the room of the project it concerns.
fn check_event_room(room: RoomId, event: &BoardEvent) -> Result<(), String> {
    let project = match event {
        BoardEvent::Created(entity) | BoardEvent::Updated(entity) => match entity.project() {
            Some(p) => p,
            None => return Err("personal tasks are not shared".to_string()),
        },
        BoardEvent::Deleted(EntityRef::Project(p)) => *p,
        BoardEvent::Deleted(EntityRef::Task(_)) => return Ok(()),
    };
    if project == room.project() {
        Ok(())
    } else {
        Err(format!("event belongs to project {project}, not {room}"))
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = socket::encode_server(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server with the given state and returns the bound
/// address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
