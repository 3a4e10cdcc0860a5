//! Shared protocol definitions for the Taskboard wire format.
//!
//! Everything a realtime client needs to talk to the relay lives here:
//! identifiers, roles, board snapshots, room events and socket messages.

pub mod board;
pub mod codec;
pub mod event;
pub mod id;
pub mod role;
pub mod socket;
