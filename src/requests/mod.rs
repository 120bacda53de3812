//! Request/response correlation for outbound requests

pub mod dispatcher;
pub mod tracker;

pub use dispatcher::{ChannelDispatcher, RequestDispatcher};
pub use tracker::{RequestKind, RequestStats, RequestTracker, ResponseCallback};
