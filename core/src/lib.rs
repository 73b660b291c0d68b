//! Synchronous client core for the HubSpot CRM v3/v4 batch API.
//!
//! # Overview
//! Builds `HttpRequest` values and interprets `HttpResponse` values without
//! touching the network (host-does-IO pattern). The host supplies an
//! [`HttpExecutor`] that performs the actual round-trip; everything above it
//! (pagination, chunking, rate-limit backoff and invalid-email recovery) is
//! deterministic and testable with scripted responses.
//!
//! # Design
//! - `CrmClient` is stateless: base URL plus static token.
//! - `BatchEngine` owns the executor and runs multi-request operations
//!   strictly sequentially.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod backoff;
pub mod batch;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod pagination;
pub mod recovery;
pub mod types;

pub use backoff::{send_with_backoff, RateLimitPolicy};
pub use batch::{batches, Batch};
pub use client::{BatchOperation, CrmClient};
pub use config::ClientConfig;
pub use engine::BatchEngine;
pub use error::ApiError;
pub use http::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse};
pub use pagination::{PageRequestFn, Pages};
pub use recovery::{ChunkOutcome, ValidationFailure};
pub use types::{
    AssociationArchive, AssociationCategory, AssociationId, AssociationLabel, AssociationLink,
    AssociationResult, AssociationSpec, AssociationTarget, AssociationType, AssociationsOf,
    BatchInput, BatchReadQuery, CrmObject, ListObjectsQuery, ObjectType, PropertyError,
};
