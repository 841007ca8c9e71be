//! Media-transport collaborator: connection state, participants, and track
//! state, modeled abstractly so the engine never depends on a live SFU.

mod connection;
mod participant;
mod room;

pub use connection::ConnectionState;
pub use participant::{MediaRoomEvent, ParticipantState};
pub use room::MediaRoomState;
