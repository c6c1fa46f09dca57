//! Helpers for testing the call cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - The message types in this crate mirror a tiny "demo" RPC service. They are plain
//!    [`prost`] messages, so their encoding is exactly what a generated gRPC client would send.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `callcache_service` crate and
///    mutes all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("callcache_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// The request of the demo `CreateDemo` call.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateDemoRequest {
    #[prost(string, tag = "1")]
    pub demo_id: String,
}

impl CreateDemoRequest {
    pub fn new(demo_id: impl Into<String>) -> Self {
        Self {
            demo_id: demo_id.into(),
        }
    }
}

/// The response of the demo `CreateDemo` call.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Demo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub revision: u32,
}

impl Demo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: 0,
        }
    }
}

/// A response shape that is incompatible with [`Demo`] on the wire.
///
/// Field `1` is a varint here, while [`Demo`] encodes it as a length-delimited string.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Counter {
    #[prost(uint64, tag = "1")]
    pub count: u64,
}
