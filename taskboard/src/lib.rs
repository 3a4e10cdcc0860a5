//! Taskboard core library.
//!
//! Owns the rules layered on top of the document store: the project roster,
//! the invitation lifecycle, the access guard, and the board service that
//! applies guarded project and task mutations and announces them to the
//! realtime layer.

pub mod board;
pub mod category;
pub mod credentials;
pub mod error;
pub mod events;
pub mod guard;
pub mod identity;
pub mod invitation;
pub mod notify;
pub mod project;
pub mod roster;
pub mod store;

pub use board::{Board, BoardPolicy};
pub use error::BoardError;
