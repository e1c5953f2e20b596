//! Blocking client for the DeepDetect machine-learning server REST API.
//!
//! # Overview
//! Maps the server's four resource families (info, services, train,
//! predict) onto method calls. Each call issues one HTTP request, waits for
//! the answer, and returns the body as parsed JSON, raw text or nothing,
//! depending on the client's `ReturnFormat`.
//!
//! # Design
//! - `build_*` methods produce plain-data `HttpRequest` values, so payload
//!   shapes are testable without a server.
//! - A `Transport` performs the round-trip; `UreqTransport` is the default.
//! - No retries: transport failures and non-2xx statuses surface as
//!   `DdError` on the first attempt.
//! - Payload structs mirror the server schema; the mock-server crate defines
//!   its own and integration tests catch drift.

pub mod api;
pub mod client;
pub mod error;
pub mod format;
pub mod http;
pub mod types;

pub use api::{ApiUrls, ClientConfig, Protocol, DEFAULT_TIMEOUT};
pub use client::DdClient;
pub use error::DdError;
pub use format::{DdResponse, ReturnFormat};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use types::{
    ClearMode, CreateService, ModelDescriptor, Parameters, PredictRequest, TaskType, TrainJob,
    TrainStatusQuery,
};
