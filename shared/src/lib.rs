//! # Shared Board Types
//!
//! Types shared between the synchronization server and board clients:
//!
//! - **Model** (`model`): rooms, teams, players and snapshots, plus the
//!   field validation rules (unit-square positions, hex color codes).
//! - **Lifecycle** (`lifecycle`): the pure match state machine that gates
//!   structural edits once a match has started.
//! - **Protocol** (`protocol`): the tagged JSON wire events exchanged over
//!   a room's WebSocket channel.
//! - **Errors** (`error`): the failure taxonomy surfaced to clients.
//!
//! Both crates depend on these definitions so that the server's
//! authoritative state and the client's view of it can never drift apart
//! structurally.

pub mod error;
pub mod lifecycle;
pub mod model;
pub mod protocol;

pub use error::SyncError;
pub use lifecycle::{LifecyclePolicy, MatchCommand};
pub use model::{MatchStatus, Player, Room, Snapshot, Team, TeamSide};
pub use protocol::{ClientEvent, ServerEvent};
