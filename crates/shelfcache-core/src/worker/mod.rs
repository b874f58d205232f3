//! The install / activate / fetch lifecycle.
//!
//! - `PrecacheLoader`: fills a new generation from the manifest on install
//! - `GenerationReaper`: deletes every other generation on activation
//! - `FetchInterceptor`: cache-first routing for each intercepted request
//! - `CacheManager`: lifecycle state machine dispatching to the three above

pub mod interceptor;
pub mod manager;
pub mod precache;
pub mod reaper;

pub use interceptor::FetchInterceptor;
pub use manager::{CacheManager, LifecycleSnapshot, LifecycleState};
pub use precache::{PrecacheLoader, Ready};
pub use reaper::{GenerationReaper, ReapReport};
