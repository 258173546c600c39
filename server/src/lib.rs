//! # Board Synchronization Server
//!
//! Authoritative server for shared, real-time tactical boards. Multiple
//! clients attach to a named room over WebSocket, edit a roster of
//! players positioned on a pitch, and see each other's changes live. A
//! match lifecycle gates which mutations are legal, and a monotonic
//! per-room version counter backs optimistic concurrency and reconnect
//! snapshots.
//!
//! ## Module Organization
//!
//! ### Registry (`registry`)
//! Tracks which connections are attached to which room. The only
//! component allowed to attach or detach a connection; holds identifiers
//! and handles, never room data.
//!
//! ### Hub (`hub`)
//! Best-effort fan-out of one event to every connection in a room, minus
//! an optional excluded sender. Per-connection delivery failures are
//! logged and swallowed.
//!
//! ### Store (`store`)
//! The authoritative in-memory room state: teams, players, match status,
//! version counter and snapshot log. Mutations for one room are applied
//! strictly serialized, with compare-and-increment versioning inside that
//! serialization domain.
//!
//! ### Resolver (`resolver`)
//! Maps an opaque identifier (canonical room id or human-chosen slug)
//! to one canonical room identity, hiding soft-deleted rooms.
//!
//! ### Rooms (`rooms`)
//! The service surface external CRUD sits on: room creation with default
//! teams and formation, team edits, roster edits, lifecycle commands and
//! soft deletion, all routed through the store so versioning and
//! broadcast stay consistent.
//!
//! ### Gateway (`gateway`)
//! The WebSocket boundary: handshake, room resolution, session receive
//! loop, and presence events on disconnect.
//!
//! ## Concurrency Model
//!
//! Every connection runs an independent receive-loop task plus a writer
//! task draining its outbound queue. Room state lives behind one async
//! mutex per room, so versions are gap-free and every member observes one
//! total order of mutations per room; rooms never serialize each other.
//! No mutation already accepted is rolled back when its connection drops.

pub mod gateway;
pub mod hub;
pub mod registry;
pub mod resolver;
pub mod rooms;
pub mod store;
