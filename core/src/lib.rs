//! Asynchronous API client core for the content studio service.
//!
//! # Overview
//! `api` builds `RequestDescriptor` values and parses `HttpResponse` values
//! without touching the network (host-does-IO pattern). `StudioClient`
//! executes descriptors through an injected `Transport`, adding the
//! transport-layer behaviour every call shares:
//!
//! - identical in-flight GET/HEAD/OPTIONS calls share one network request
//!   (`key`, `registry`)
//! - bearer credentials are attached from the session (`auth`, `session`)
//! - failures are translated into `StructuredError`; a 401 tears down the
//!   session through the installed `SessionSink` (`error`)
//! - response bodies can be read with ISO-8601 strings turned into dates
//!   (`normalize`)
//!
//! # Design
//! - The pending-request registry is a context object owned by the client,
//!   not a global; clients that should de-duplicate together share a clone.
//! - Browser-side effects (storage, navigation) live behind `SessionSink`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod key;
pub mod normalize;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

pub use auth::{AuthInterceptor, AuthState};
pub use client::{PendingRequest, StudioClient};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ServerMessage, StructuredError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestDescriptor};
pub use key::RequestKey;
pub use normalize::{normalize, Normalized};
pub use registry::PendingRegistry;
pub use session::{MemorySession, SessionSink, SessionStore};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    AuthTokens, CaptionBatch, CaptionRequest, CreatePost, Credentials, GeneratedCaption, Platform,
    Post, PostStatus, UpdatePost, User,
};
