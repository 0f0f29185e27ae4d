//! Optimization primitives.
//!
//! Each primitive is independent and owns its state outright; callers
//! compose them around their own tool calls.

pub mod balancer;
pub mod cache;
pub mod dag;
pub mod monitor;

pub use balancer::{LoadBalancer, Provider};
pub use cache::{cache_key, CacheStats, Context, ContextCache};
pub use dag::TaskGraph;
pub use monitor::{MonitorSnapshot, PerformanceMonitor};
