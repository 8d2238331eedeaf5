//! Wire protocol types for the ClipNest daemon.
//!
//! The daemon and its clients exchange newline-delimited JSON over a Unix
//! socket. Every line, in both directions, is a [`Frame`]:
//!
//! ```text
//! client ──{"type":"list","data":{"limit":10}}──────────────────────▶ clipnestd
//! client ◀─{"type":"response","data":{"success":true,"data":{...}}}── clipnestd
//! client ◀─{"type":"new_clip","data":{"id":7,...}}─────────────────── clipnestd  (push)
//! ```
//!
//! Requests decode in two steps: the envelope first, then the payload for the
//! named type. That keeps "unknown type" and "bad payload for a known type"
//! distinguishable, and gives every request variant a statically typed body.
//!
//! Pushes and responses share one connection, so a client waiting for a
//! response must be ready to skip `new_clip` frames that arrive first.

pub mod clip;
pub mod frame;
pub mod messages;

pub use clip::{ClipData, ClipKind, ContentEncoding};
pub use frame::{
    ClearRequest, DEFAULT_LIMIT, Frame, FrameError, IdRequest, ListRequest, Request,
    SearchRequest, effective_limit,
};
pub use messages::{ClipList, ErrorCode, ResponseBody, ServerMessage};
