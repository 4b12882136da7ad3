//! Yadoma Protocol Buffers
//!
//! Generated protobuf code for the Yadoma agent gRPC API.
//!
//! This crate contains:
//! - `ContainerService` for log and stats streaming
//! - `ImageService` for pull and build progress streaming

#![allow(clippy::derive_partial_eq_without_eq)]

/// Yadoma v1 API definitions.
///
/// All generated types and services are included here.
pub mod v1 {
    tonic::include_proto!("yadoma.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;
