//! Request and response models for intercepted resource loads.
//!
//! - `ResourceRequest`, `Method`, `RequestKey`: the identity a cache record is
//!   stored under (method + URL)
//! - `ResourceResponse`: a fully buffered response snapshot

pub mod request;
pub mod response;

pub use request::{Method, RequestKey, ResourceRequest};
pub use response::ResourceResponse;
