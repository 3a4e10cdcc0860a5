//! Property tests for roster invariants.
//!
//! Applies random sequences of add / remove / change-role operations to a
//! roster and verifies after every step:
//! 1. The owner always resolves to `Owner` and passes every access check.
//! 2. The owner never appears among member records.
//! 3. Each identity appears at most once.
//! 4. `has_access` agrees with `resolve_role` and the role order.

use std::collections::HashSet;

use proptest::prelude::*;
use taskboard::roster::{Roster, RosterError};
use taskboard_proto::id::{Timestamp, UserId};
use taskboard_proto::role::{MemberRole, Role};
use uuid::Uuid;

/// Index 0 is the owner; the rest are potential members.
const POOL: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Add(usize, MemberRole),
    Remove(usize),
    Change(usize, MemberRole),
}

fn arb_member_role() -> impl Strategy<Value = MemberRole> {
    prop_oneof![
        Just(MemberRole::Viewer),
        Just(MemberRole::Member),
        Just(MemberRole::Collaborator),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..POOL, arb_member_role()).prop_map(|(u, r)| Op::Add(u, r)),
        (0..POOL).prop_map(Op::Remove),
        (0..POOL, arb_member_role()).prop_map(|(u, r)| Op::Change(u, r)),
    ]
}

fn users() -> Vec<UserId> {
    (1..=POOL as u128)
        .map(|n| UserId::from_uuid(Uuid::from_u128(n)))
        .collect()
}

fn check_invariants(roster: &Roster, owner: UserId, pool: &[UserId]) -> Result<(), TestCaseError> {
    prop_assert_eq!(roster.owner(), owner);
    prop_assert_eq!(roster.resolve_role(owner), Some(Role::Owner));
    for role in Role::ALL {
        prop_assert!(roster.has_access(owner, Some(role)));
    }

    let records = roster.member_records();
    prop_assert!(records.iter().all(|m| m.user != owner));
    prop_assert_eq!(records.len() + 1, roster.len());

    let unique: HashSet<UserId> = roster.entries().map(|e| e.user).collect();
    prop_assert_eq!(unique.len(), roster.len());

    for &user in pool {
        match roster.resolve_role(user) {
            None => prop_assert!(!roster.has_access(user, None)),
            Some(actual) => {
                prop_assert!(roster.has_access(user, None));
                for required in Role::ALL {
                    prop_assert_eq!(roster.has_access(user, Some(required)), actual >= required);
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn roster_invariants_hold(ops in prop::collection::vec(arb_op(), 0..40)) {
        let pool = users();
        let owner = pool[0];
        let mut roster = Roster::new(owner, Timestamp::from_millis(1));

        for (step, op) in ops.into_iter().enumerate() {
            let now = Timestamp::from_millis(2 + step as u64);
            match op {
                Op::Add(u, role) => {
                    let user = pool[u];
                    let before = roster.resolve_role(user);
                    let result = roster.add_member(user, role, now);
                    if before.is_some() {
                        prop_assert_eq!(result, Err(RosterError::AlreadyMember));
                        prop_assert_eq!(roster.resolve_role(user), before);
                    } else {
                        prop_assert_eq!(result, Ok(()));
                        prop_assert_eq!(roster.resolve_role(user), Some(Role::from(role)));
                    }
                }
                Op::Remove(u) => {
                    let user = pool[u];
                    let result = roster.remove_member(user);
                    if user == owner {
                        prop_assert_eq!(result, Err(RosterError::CannotRemoveOwner));
                    } else {
                        prop_assert!(result.is_ok());
                        prop_assert_eq!(roster.resolve_role(user), None);
                    }
                }
                Op::Change(u, role) => {
                    let user = pool[u];
                    let before = roster.resolve_role(user);
                    let result = roster.change_role(user, role);
                    match before {
                        Some(Role::Owner) => prop_assert_eq!(result, Err(RosterError::CannotModifyOwner)),
                        None => prop_assert_eq!(result, Err(RosterError::MemberNotFound)),
                        Some(_) => {
                            prop_assert_eq!(result, Ok(()));
                            prop_assert_eq!(roster.resolve_role(user), Some(Role::from(role)));
                        }
                    }
                }
            }
            check_invariants(&roster, owner, &pool)?;
        }
    }
}
