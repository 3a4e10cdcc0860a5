//! Integration tests for the invitation lifecycle.
//!
//! Covers issuing, previewing and accepting invitations against a real
//! board: recipient checks, lazy expiry, single use under concurrency,
//! and the one-live-invitation-per-address rule.
//!
//! Verification command: `cargo test --test invitation_flow`

use std::sync::Arc;
use std::time::Duration;

use taskboard::board::{BoardPolicy, NewProject, NewTask};
use taskboard::identity::{Caller, Email, Principal};
use taskboard::invitation::InvitationStatus;
use taskboard::roster::RosterError;
use taskboard::{Board, BoardError};
use taskboard_proto::id::UserId;
use taskboard_proto::role::{MemberRole, Role};
use taskboard_proto::socket::ErrorKind;

// =============================================================================
// Helpers
// =============================================================================

fn caller(name: &str) -> Caller {
    Caller::new(Principal {
        id: UserId::new(),
        email: Email::parse(&format!("{name}@x.com")).unwrap(),
        name: name.to_string(),
    })
}

fn board_with_ttl(ttl: Duration) -> Board {
    Board::new().with_policy(BoardPolicy {
        invitation_ttl: ttl,
        ..BoardPolicy::default()
    })
}

// =============================================================================
// Issue and accept
// =============================================================================

#[tokio::test]
async fn invited_user_joins_with_granted_role() {
    let board = Board::new();
    let u1 = caller("u1");
    let bob = caller("bob");
    let project = board
        .create_project(&u1, NewProject::named("Launch"))
        .await
        .unwrap();

    let inv = board
        .create_invitation(&u1, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();
    assert_eq!(inv.status, InvitationStatus::Pending);
    assert_eq!(inv.token.as_str().len(), 64);

    let joined = board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap();
    assert_eq!(joined.members.len(), 1);
    assert_eq!(joined.members[0].user, bob.user());
    assert_eq!(joined.members[0].role, MemberRole::Member);

    let resolved = board.resolve_invitation(inv.token.as_str()).await.unwrap();
    assert_eq!(resolved.status, InvitationStatus::Accepted);

    // Member access lets bob work on tasks but not manage the project.
    assert!(board.get_project(&bob, project.id).await.is_ok());
    assert!(
        board
            .create_task(&bob, NewTask::titled("first").in_project(project.id))
            .await
            .is_ok()
    );
    let err = board
        .create_invitation(&bob, project.id, "carol@x.com", MemberRole::Viewer)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn second_accept_is_already_used() {
    let board = Board::new();
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Viewer)
        .await
        .unwrap();

    board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap();
    let err = board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::AlreadyUsed);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let project = board.get_project(&owner, project.id).await.unwrap();
    let count = project
        .members
        .iter()
        .filter(|m| m.user == bob.user())
        .count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn wrong_recipient_leaves_invitation_pending() {
    let board = Board::new();
    let owner = caller("owner");
    let carol = caller("carol");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();

    let err = board
        .accept_invitation(&carol, inv.token.as_str())
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::WrongRecipient);
    assert_eq!(
        board
            .resolve_invitation(inv.token.as_str())
            .await
            .unwrap()
            .status,
        InvitationStatus::Pending
    );
    assert!(board.get_project(&carol, project.id).await.is_err());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let board = Board::new();
    let err = board
        .accept_invitation(&caller("bob"), "0".repeat(64).as_str())
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::InvitationNotFound);
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn past_horizon_invitation_is_expired() {
    let board = board_with_ttl(Duration::from_millis(20));
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    let resolved = board.resolve_invitation(inv.token.as_str()).await.unwrap();
    assert_eq!(resolved.status, InvitationStatus::Expired);
    let err = board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::Expired);
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert!(
        board
            .get_project(&owner, project.id)
            .await
            .unwrap()
            .members
            .is_empty()
    );
}

#[tokio::test]
async fn duplicate_invitation_conflicts_until_first_expires() {
    let board = board_with_ttl(Duration::from_millis(40));
    let owner = caller("owner");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();

    let err = board
        .create_invitation(&owner, project.id, "BOB@x.com", MemberRole::Viewer)
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::DuplicateInvitation);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // A different address is unaffected.
    assert!(
        board
            .create_invitation(&owner, project.id, "carol@x.com", MemberRole::Viewer)
            .await
            .is_ok()
    );

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        board
            .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Viewer)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn purge_only_drops_expired_invitations() {
    let board = board_with_ttl(Duration::from_millis(20));
    let owner = caller("owner");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let old = board
        .create_invitation(&owner, project.id, "old@x.com", MemberRole::Member)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let fresh = board
        .create_invitation(&owner, project.id, "fresh@x.com", MemberRole::Member)
        .await
        .unwrap();

    assert_eq!(board.purge_expired_invitations().await, 1);
    assert_eq!(
        board.resolve_invitation(old.token.as_str()).await,
        Err(BoardError::InvitationNotFound)
    );
    assert!(board.resolve_invitation(fresh.token.as_str()).await.is_ok());
}

#[tokio::test]
async fn accepted_invitation_reads_as_expired_past_horizon() {
    let board = board_with_ttl(Duration::from_millis(50));
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();
    board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let resolved = board.resolve_invitation(inv.token.as_str()).await.unwrap();
    assert_eq!(resolved.status, InvitationStatus::Expired);
    assert_eq!(
        board.accept_invitation(&bob, inv.token.as_str()).await,
        Err(BoardError::Expired)
    );
    // Membership granted before the horizon stays.
    assert!(board.get_project(&bob, project.id).await.is_ok());
}

// =============================================================================
// Membership checks
// =============================================================================

#[tokio::test]
async fn inviting_an_existing_member_is_rejected() {
    let board = Board::new();
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();

    let err = board
        .create_invitation(&owner, project.id, "owner@x.com", MemberRole::Member)
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::Roster(RosterError::AlreadyMember));

    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();
    board
        .accept_invitation(&bob, inv.token.as_str())
        .await
        .unwrap();
    let err = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Viewer)
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::Roster(RosterError::AlreadyMember));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn owner_cannot_invite_their_own_address() {
    let board = Board::new();
    let owner = caller("owner");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();

    let err = board
        .create_invitation(&owner, project.id, "OWNER@x.com", MemberRole::Member)
        .await
        .unwrap_err();
    assert_eq!(err, BoardError::Roster(RosterError::AlreadyMember));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn invite_by_member_checks_their_own_address() {
    let board = Board::new();
    let owner = caller("owner");
    let collab = caller("collab");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "collab@x.com", MemberRole::Collaborator)
        .await
        .unwrap();
    board
        .accept_invitation(&collab, inv.token.as_str())
        .await
        .unwrap();

    // The owner's address is known once they have created a project.
    assert_eq!(
        board
            .create_invitation(&collab, project.id, "owner@x.com", MemberRole::Viewer)
            .await,
        Err(BoardError::Roster(RosterError::AlreadyMember))
    );
    assert_eq!(
        board
            .create_invitation(&collab, project.id, "collab@x.com", MemberRole::Viewer)
            .await,
        Err(BoardError::Roster(RosterError::AlreadyMember))
    );
}

#[tokio::test]
async fn collaborator_can_invite_viewer_cannot() {
    let board = Board::new();
    let owner = caller("owner");
    let collab = caller("collab");
    let viewer = caller("viewer");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    for (who, role) in [(&collab, MemberRole::Collaborator), (&viewer, MemberRole::Viewer)] {
        let inv = board
            .create_invitation(&owner, project.id, who.email().as_str(), role)
            .await
            .unwrap();
        board
            .accept_invitation(who, inv.token.as_str())
            .await
            .unwrap();
    }

    assert!(
        board
            .create_invitation(&collab, project.id, "dave@x.com", MemberRole::Member)
            .await
            .is_ok()
    );
    assert!(matches!(
        board
            .create_invitation(&viewer, project.id, "erin@x.com", MemberRole::Member)
            .await,
        Err(BoardError::Forbidden(_))
    ));
}

#[tokio::test]
async fn accepting_into_a_deleted_project_fails() {
    let board = Board::new();
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Member)
        .await
        .unwrap();
    board.delete_project(&owner, project.id).await.unwrap();

    assert_eq!(
        board.accept_invitation(&bob, inv.token.as_str()).await,
        Err(BoardError::InvitationNotFound)
    );
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_yield_exactly_one_success() {
    let board = Arc::new(Board::new());
    let owner = caller("owner");
    let bob = caller("bob");
    let project = board
        .create_project(&owner, NewProject::named("P"))
        .await
        .unwrap();
    let inv = board
        .create_invitation(&owner, project.id, "bob@x.com", MemberRole::Collaborator)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let board = Arc::clone(&board);
        let bob = bob.clone();
        let token = inv.token.as_str().to_string();
        handles.push(tokio::spawn(async move {
            board.accept_invitation(&bob, &token).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e, BoardError::AlreadyUsed),
        }
    }
    assert_eq!(successes, 1);

    let project = board.get_project(&bob, project.id).await.unwrap();
    assert_eq!(project.members.len(), 1);
    assert_eq!(Role::from(project.members[0].role), Role::Collaborator);
}
