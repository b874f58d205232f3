//! Network capability.
//!
//! `Network` is the seam the fetch path and the precache loader use to reach
//! the origin. `HttpNetwork` implements it over reqwest; tests substitute
//! scripted fakes.

pub mod client;

use async_trait::async_trait;

use crate::error::NetworkResult;
use crate::models::{ResourceRequest, ResourceResponse};

pub use client::HttpNetwork;

#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Fetch `request` from the network. Any HTTP status is a successful
    /// fetch; only transport failures (timeout, DNS, offline) are errors.
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult<ResourceResponse>;
}
