//! Integration tests for realtime project rooms.
//!
//! Starts a real relay server on a random port and drives it with
//! `tokio-tungstenite` clients: authentication, join authorization,
//! origin-excluding fan-out, leave/disconnect cancellation, and board
//! mutations reaching subscribed clients.
//!
//! Verification command: `cargo test --test room_broadcast`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskboard::Board;
use taskboard::board::{NewProject, NewTask, ProjectPatch};
use taskboard::credentials::StaticCredentials;
use taskboard::identity::{Caller, Email, Principal};
use taskboard_proto::board::{Priority, Task};
use taskboard_proto::event::{BoardEvent, Entity, EntityRef, RoomId};
use taskboard_proto::id::{ProjectId, TaskId, Timestamp, UserId};
use taskboard_proto::role::MemberRole;
use taskboard_proto::socket::{self, ClientMessage, ErrorKind, ServerMessage};
use taskboard_relay::relay::{self, RelayState};
use taskboard_relay::rooms::RoomBroadcaster;
use tokio_tungstenite::tungstenite;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    addr: SocketAddr,
    state: Arc<RelayState>,
    alice: Caller,
    bob: Caller,
    carol: Caller,
    project: ProjectId,
    _server: tokio::task::JoinHandle<()>,
}

fn principal(name: &str) -> Principal {
    Principal {
        id: UserId::new(),
        email: Email::parse(&format!("{name}@x.com")).unwrap(),
        name: name.to_string(),
    }
}

/// alice owns a project, bob was invited into it as a member, carol is a
/// stranger. Each authenticates with the token `<name>-token`.
async fn start(require_membership: bool, max_payload_size: usize) -> Harness {
    let (alice, bob, carol) = (principal("alice"), principal("bob"), principal("carol"));
    let mut creds = StaticCredentials::new();
    for p in [&alice, &bob, &carol] {
        creds.insert(format!("{}-token", p.name), p.clone());
    }

    let broadcaster = Arc::new(RoomBroadcaster::new());
    let board = Arc::new(Board::new().with_events(broadcaster.clone()));
    let (alice, bob, carol) = (Caller::new(alice), Caller::new(bob), Caller::new(carol));

    let project = board
        .create_project(&alice, NewProject::named("Realtime"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&alice, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();
    board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap();

    let state = Arc::new(
        RelayState::new(board, broadcaster, Arc::new(creds))
            .with_require_membership(require_membership)
            .with_max_payload_size(max_payload_size),
    );
    let (addr, server) = relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    Harness {
        addr,
        state,
        alice,
        bob,
        carol,
        project: project.id,
        _server: server,
    }
}

async fn send(ws: &mut Ws, msg: &ClientMessage) {
    let bytes = socket::encode_client(msg).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("connection closed")
            .unwrap();
        if let tungstenite::Message::Binary(data) = frame {
            return socket::decode_server(&data).unwrap();
        }
    }
}

/// Asserts nothing arrives for a short while.
async fn assert_silent(ws: &mut Ws) {
    if let Ok(Some(Ok(tungstenite::Message::Binary(data)))) =
        tokio::time::timeout(QUIET_PERIOD, ws.next()).await
    {
        panic!("unexpected message: {:?}", socket::decode_server(&data));
    }
}

async fn connect(addr: SocketAddr, token: &str) -> Ws {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    send(
        &mut ws,
        &ClientMessage::Authenticate {
            token: token.to_string(),
        },
    )
    .await;
    ws
}

async fn connect_as(h: &Harness, who: &Caller) -> Ws {
    let mut ws = connect(h.addr, &format!("{}-token", who.principal.name)).await;
    assert_eq!(
        recv(&mut ws).await,
        ServerMessage::Authenticated { user: who.user() }
    );
    ws
}

async fn join(ws: &mut Ws, room: RoomId) {
    send(ws, &ClientMessage::JoinRoom { room }).await;
    assert_eq!(recv(ws).await, ServerMessage::Joined { room });
}

fn task_event(project: ProjectId, title: &str) -> BoardEvent {
    BoardEvent::Updated(Entity::Task(Task {
        id: TaskId::new(),
        title: title.to_string(),
        description: String::new(),
        project: Some(project),
        category: None,
        priority: Priority::Low,
        status: "To Do".to_string(),
        assignee: None,
        deadline: None,
        tags: Vec::new(),
        created_by: UserId::new(),
        is_archived: false,
        archived_at: None,
        order: 0,
        created_at: Timestamp::from_millis(1),
        updated_at: Timestamp::from_millis(1),
    }))
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn valid_token_is_authenticated() {
    let h = start(true, 64 * 1024).await;
    let _ws = connect_as(&h, &h.alice).await;
}

#[tokio::test]
async fn unknown_token_is_rejected_and_closed() {
    let h = start(true, 64 * 1024).await;
    let mut ws = connect(h.addr, "nope").await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Unauthenticated),
        other => panic!("expected Error, got {other:?}"),
    }
    let next = tokio::time::timeout(RECV_TIMEOUT, ws.next()).await.unwrap();
    assert!(matches!(
        next,
        None | Some(Err(_)) | Some(Ok(tungstenite::Message::Close(_)))
    ));
}

#[tokio::test]
async fn first_frame_must_authenticate() {
    let h = start(true, 64 * 1024).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", h.addr))
        .await
        .unwrap();
    send(
        &mut ws,
        &ClientMessage::JoinRoom {
            room: RoomId::for_project(h.project),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Unauthenticated),
        other => panic!("expected Error, got {other:?}"),
    }
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test]
async fn publish_reaches_others_but_not_origin_and_stops_after_leave() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut a, room).await;
    join(&mut b, room).await;

    let event = task_event(h.project, "first");
    send(
        &mut a,
        &ClientMessage::Publish {
            room,
            event: event.clone(),
        },
    )
    .await;
    assert_eq!(recv(&mut b).await, ServerMessage::Event { room, event });
    assert_silent(&mut a).await;

    send(&mut b, &ClientMessage::LeaveRoom { room }).await;
    assert_eq!(recv(&mut b).await, ServerMessage::Left { room });

    send(
        &mut a,
        &ClientMessage::Publish {
            room,
            event: task_event(h.project, "second"),
        },
    )
    .await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn events_from_one_origin_arrive_in_order() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut a, room).await;
    join(&mut b, room).await;

    let ids: Vec<TaskId> = (0..10).map(|_| TaskId::new()).collect();
    for id in &ids {
        send(
            &mut a,
            &ClientMessage::Publish {
                room,
                event: BoardEvent::Deleted(EntityRef::Task(*id)),
            },
        )
        .await;
    }
    for id in ids {
        assert_eq!(
            recv(&mut b).await,
            ServerMessage::Event {
                room,
                event: BoardEvent::Deleted(EntityRef::Task(id)),
            }
        );
    }
}

#[tokio::test]
async fn board_mutations_reach_subscribers() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut b, room).await;

    let task = h
        .state
        .board()
        .create_task(&h.alice, NewTask::titled("From the API").in_project(h.project))
        .await
        .unwrap();

    assert_eq!(
        recv(&mut b).await,
        ServerMessage::Event {
            room,
            event: BoardEvent::Created(Entity::Task(task)),
        }
    );
}

#[tokio::test]
async fn disconnect_drops_subscriptions() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut a, room).await;
    join(&mut b, room).await;
    assert_eq!(h.state.broadcaster().subscriber_count(room), 2);

    b.close(None).await.unwrap();
    drop(b);

    let mut remaining = 0;
    for _ in 0..50 {
        remaining = h.state.broadcaster().subscriber_count(room);
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 1);
}

// =============================================================================
// Authorization and validation
// =============================================================================

#[tokio::test]
async fn stranger_cannot_join_project_room() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut c = connect_as(&h, &h.carol).await;

    send(&mut c, &ClientMessage::JoinRoom { room }).await;
    match recv(&mut c).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Forbidden),
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(h.state.broadcaster().subscriber_count(room), 0);
}

#[tokio::test]
async fn removed_member_stops_receiving_room_events() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut b, room).await;

    let board = h.state.board();
    board
        .remove_member(&h.alice, h.project, h.bob.user())
        .await
        .unwrap();
    assert_eq!(recv(&mut b).await, ServerMessage::Left { room });
    assert_eq!(h.state.broadcaster().subscriber_count(room), 0);

    board
        .update_project(
            &h.alice,
            h.project,
            ProjectPatch {
                name: Some("Renamed".to_string()),
                ..ProjectPatch::default()
            },
        )
        .await
        .unwrap();
    board
        .create_task(&h.alice, NewTask::titled("secret").in_project(h.project))
        .await
        .unwrap();
    assert_silent(&mut b).await;

    send(
        &mut b,
        &ClientMessage::Publish {
            room,
            event: task_event(h.project, "after removal"),
        },
    )
    .await;
    match recv(&mut b).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Forbidden),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn project_deletion_reaches_members() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut b, room).await;

    h.state
        .board()
        .delete_project(&h.alice, h.project)
        .await
        .unwrap();
    assert_eq!(
        recv(&mut b).await,
        ServerMessage::Event {
            room,
            event: BoardEvent::Deleted(EntityRef::Project(h.project)),
        }
    );
}

#[tokio::test]
async fn open_rooms_admit_anyone() {
    let h = start(false, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut c = connect_as(&h, &h.carol).await;
    join(&mut c, room).await;
}

#[tokio::test]
async fn publish_without_join_is_forbidden() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    let mut b = connect_as(&h, &h.bob).await;
    join(&mut b, room).await;

    send(
        &mut a,
        &ClientMessage::Publish {
            room,
            event: task_event(h.project, "sneaky"),
        },
    )
    .await;
    match recv(&mut a).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Forbidden),
        other => panic!("expected Error, got {other:?}"),
    }
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn oversized_publish_is_rejected() {
    let h = start(true, 256).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    join(&mut a, room).await;

    send(
        &mut a,
        &ClientMessage::Publish {
            room,
            event: task_event(h.project, &"x".repeat(1024)),
        },
    )
    .await;
    match recv(&mut a).await {
        ServerMessage::Error { kind, reason } => {
            assert_eq!(kind, ErrorKind::Validation);
            assert!(reason.contains("payload too large"), "got: {reason}");
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn event_for_another_project_is_rejected() {
    let h = start(true, 64 * 1024).await;
    let room = RoomId::for_project(h.project);
    let mut a = connect_as(&h, &h.alice).await;
    join(&mut a, room).await;

    send(
        &mut a,
        &ClientMessage::Publish {
            room,
            event: task_event(ProjectId::new(), "elsewhere"),
        },
    )
    .await;
    match recv(&mut a).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Validation),
        other => panic!("expected Error, got {other:?}"),
    }
}
