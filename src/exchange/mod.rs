//! Connect-back exchange over `/nattest/1.0.0`
//!
//! The requester sends one [`ConnectBackRequest`](crate::protocol::ConnectBackRequest)
//! frame and waits for one [`ConnectBackResult`](crate::protocol::ConnectBackResult)
//! frame. The responder dials the requester's listener on every candidate
//! address it can build and reports which one, if any, got through.

pub mod requester;
pub mod responder;

pub use requester::request_connect_back;
pub use responder::{build_candidates, ConnectBackResponder, DEFAULT_REQUEST_TIMEOUT};
