//! Property tests for role ordering and room labels.
//!
//! Uses proptest to verify:
//! 1. `satisfies` agrees with the total order `Viewer < Member < Collaborator < Owner`.
//! 2. Parsing arbitrary strings as roles never panics.
//! 3. Any room label produced by `RoomId` parses back to the same room.
//! 4. Random bytes never cause a panic in socket decoding.

use proptest::prelude::*;
use taskboard_proto::event::RoomId;
use taskboard_proto::id::ProjectId;
use taskboard_proto::role::{MemberRole, Role};
use taskboard_proto::socket;
use uuid::Uuid;

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Viewer),
        Just(Role::Member),
        Just(Role::Collaborator),
        Just(Role::Owner),
    ]
}

proptest! {
    #[test]
    fn satisfies_follows_total_order(r1 in arb_role(), r2 in arb_role()) {
        let (low, high) = if r1.rank() <= r2.rank() { (r1, r2) } else { (r2, r1) };
        prop_assert!(high.satisfies(low));
        prop_assert_eq!(low.satisfies(high), low == high);
    }

    #[test]
    fn ord_agrees_with_rank(r1 in arb_role(), r2 in arb_role()) {
        prop_assert_eq!(r1.cmp(&r2), r1.rank().cmp(&r2.rank()));
    }

    #[test]
    fn role_parsing_never_panics(s in ".*") {
        let _ = s.parse::<Role>();
        let _ = s.parse::<MemberRole>();
    }

    #[test]
    fn role_names_parse_back(r in arb_role()) {
        prop_assert_eq!(r.to_string().parse::<Role>(), Ok(r));
    }

    #[test]
    fn room_label_round_trips(n in any::<u128>()) {
        let room = RoomId::for_project(ProjectId::from_uuid(Uuid::from_u128(n)));
        prop_assert_eq!(room.to_string().parse::<RoomId>(), Ok(room));
    }

    #[test]
    fn random_bytes_never_panic_socket_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = socket::decode_client(&bytes);
        let _ = socket::decode_server(&bytes);
    }
}
