//! De-duplicating HTTP client for the studio API.
//!
//! # Design
//! `dispatch` is synchronous: it derives the request key, joins an existing
//! in-flight call for idempotent methods, and otherwise attaches credentials
//! and registers a new shared call before returning. Nothing touches the
//! network until the returned `PendingRequest` is polled. Dropping the last
//! handle on a call before it settles aborts it and frees its key.
//!
//! The shared call translates failures into `StructuredError`, runs the 401
//! session teardown, and removes its own registry entry when it settles.
//! Because it runs once per dispatched call, every side effect happens once
//! no matter how many callers joined it.
//!
//! Mutating methods are dispatched independently and never registered.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{abortable, FutureExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api;
use crate::auth::AuthInterceptor;
use crate::config::ClientConfig;
use crate::error::{ApiError, StructuredError};
use crate::http::{HttpRequest, HttpResponse, RequestDescriptor};
use crate::key::RequestKey;
use crate::normalize::{normalize, Normalized};
use crate::registry::{PendingEntry, PendingRegistry, SharedResponse, WeakRegistry};
use crate::session::{SessionSink, SessionStore};
use crate::transport::Transport;
use crate::types::{
    AuthTokens, CaptionBatch, CaptionRequest, CreatePost, Credentials, Post, UpdatePost, User,
};

pub struct StudioClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: PendingRegistry,
    auth: AuthInterceptor,
    session: Arc<dyn SessionStore>,
    sink: Option<Arc<dyn SessionSink>>,
}

impl StudioClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        let auth = AuthInterceptor::new(&config.refresh_path);
        Self {
            config,
            transport,
            registry: PendingRegistry::new(),
            auth,
            session,
            sink: None,
        }
    }

    /// Share de-duplication state with other clients built on `registry`.
    pub fn with_registry(mut self, registry: PendingRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Install host hooks run when a call fails with 401.
    pub fn with_session_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    /// Start a call, or join the identical idempotent call already in flight.
    pub fn dispatch(&self, descriptor: RequestDescriptor) -> PendingRequest {
        let url = self.config.url(&descriptor.path);
        let key = RequestKey::derive(descriptor.method, &url, descriptor.body.as_ref());
        let dedup = descriptor.method.is_idempotent();

        if dedup {
            if let Some(entry) = self.registry.join(&key) {
                debug!(key = %key, "joining in-flight request");
                return PendingRequest {
                    key,
                    entry,
                    registry: self.registry.clone(),
                    joined: true,
                };
            }
        }

        let mut request = HttpRequest {
            method: descriptor.method,
            path: url,
            headers: Vec::new(),
            body: descriptor.body.as_ref().map(|body| body.to_string()),
        };
        if request.body.is_some() {
            request.set_header("content-type", "application/json".to_string());
        }
        let auth = self.auth.apply(&mut request, self.session.as_ref());
        debug!(method = %request.method, url = %request.path, ?auth, "dispatching request");

        let id = self.registry.next_id();
        let call = settle(
            self.transport.clone(),
            request,
            self.sink.clone(),
            dedup.then(|| (self.registry.downgrade(), key.clone(), id)),
        );
        let (call, abort) = abortable(call);
        let response: SharedResponse = call
            .map(|outcome| outcome.unwrap_or_else(|_aborted| Err(ApiError::Cancelled)))
            .boxed()
            .shared();
        let entry = PendingEntry::new(id, response, abort);

        if dedup {
            self.registry.register(key.clone(), entry.clone());
        }

        PendingRequest {
            key,
            entry,
            registry: self.registry.clone(),
            joined: false,
        }
    }

    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<HttpResponse, ApiError> {
        self.dispatch(descriptor).await
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ApiError> {
        let response = self.send(descriptor).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// Send and return the body with ISO-8601 strings converted to dates.
    pub async fn send_normalized(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<Normalized, ApiError> {
        let value: serde_json::Value = self.send_json(descriptor).await?;
        Ok(normalize(value))
    }

    /// Log in and persist the returned tokens.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthTokens, ApiError> {
        let response = self.send(api::build_login(credentials)?).await?;
        let tokens = api::parse_login(response)?;
        self.session
            .store_tokens(&tokens.access_token, &tokens.refresh_token);
        Ok(tokens)
    }

    /// Exchange the stored refresh token for a new token pair and persist it.
    pub async fn refresh_session(&self) -> Result<AuthTokens, ApiError> {
        let response = self
            .send(api::build_refresh(&self.config.refresh_path))
            .await?;
        let tokens = api::parse_refresh(response)?;
        self.session
            .store_tokens(&tokens.access_token, &tokens.refresh_token);
        Ok(tokens)
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        api::parse_me(self.send(api::build_me()).await?)
    }

    pub async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        api::parse_list_posts(self.send(api::build_list_posts()).await?)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Post, ApiError> {
        api::parse_get_post(self.send(api::build_get_post(id)).await?)
    }

    pub async fn create_post(&self, input: &CreatePost) -> Result<Post, ApiError> {
        api::parse_create_post(self.send(api::build_create_post(input)?).await?)
    }

    pub async fn update_post(&self, id: Uuid, input: &UpdatePost) -> Result<Post, ApiError> {
        api::parse_update_post(self.send(api::build_update_post(id, input)?).await?)
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), ApiError> {
        api::parse_delete_post(self.send(api::build_delete_post(id)).await?)
    }

    pub async fn generate_captions(&self, input: &CaptionRequest) -> Result<CaptionBatch, ApiError> {
        api::parse_generate_captions(self.send(api::build_generate_captions(input)?).await?)
    }
}

/// Run the transport call and everything that happens when it settles.
async fn settle(
    transport: Arc<dyn Transport>,
    request: HttpRequest,
    sink: Option<Arc<dyn SessionSink>>,
    registration: Option<(WeakRegistry, RequestKey, u64)>,
) -> Result<HttpResponse, ApiError> {
    let method = request.method;
    let url = request.path.clone();
    let result = match transport.execute(request).await {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(StructuredError::from_response(&response)),
        Err(err) => Err(StructuredError::from_transport(&err)),
    };

    if let Some((registry, key, id)) = registration {
        registry.remove_if_current(&key, id);
    }

    match result {
        Ok(response) => {
            debug!(%method, %url, status = response.status, "request settled");
            Ok(response)
        }
        Err(err) => {
            debug!(%method, %url, status = err.status, messages = ?err.messages, "request failed");
            if err.is_unauthorized() {
                if let Some(sink) = sink {
                    tear_down_session(sink.as_ref());
                }
            }
            Err(err.into())
        }
    }
}

fn tear_down_session(sink: &dyn SessionSink) {
    warn!("authentication rejected, clearing session");
    sink.clear_session();
    if !sink.on_auth_view() {
        sink.redirect_to_login();
    }
}

/// Handle to a dispatched (or joined) call.
///
/// Awaiting it yields the call's settled result; every handle on the same
/// call yields the same value.
#[must_use = "a pending request does nothing unless awaited"]
pub struct PendingRequest {
    key: RequestKey,
    entry: PendingEntry,
    registry: PendingRegistry,
    joined: bool,
}

impl PendingRequest {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Whether this handle joined a call that was already in flight.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Abort the underlying call and drop its registry entry.
    ///
    /// Every handle on the call resolves to `ApiError::Cancelled`. A later
    /// identical call is dispatched fresh.
    pub fn cancel(&self) {
        debug!(key = %self.key, "cancelling request");
        self.entry.abort.abort();
        self.registry.remove_if_current(&self.key, self.entry.id);
    }
}

impl Future for PendingRequest {
    type Output = Result<HttpResponse, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.entry.response.poll_unpin(cx)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.registry.release(&self.key, &self.entry) {
            return;
        }
        if self.entry.response.peek().is_none() {
            debug!(key = %self.key, "last handle dropped, abandoning request");
        }
        self.entry.abort.abort();
    }
}
