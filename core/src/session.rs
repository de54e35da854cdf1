//! Session credentials and the hooks invoked on authentication failure.
//!
//! `SessionStore` is where the client reads the bearer tokens it attaches.
//! `SessionSink` is the environment side of a 401: clearing whatever the
//! host persists and navigating to the login view. A headless client runs
//! without a sink and only reports the error.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;

/// Read/write access to the persisted credentials.
pub trait SessionStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn store_tokens(&self, access_token: &str, refresh_token: &str);

    fn clear(&self);
}

/// Host hooks for session teardown after a 401.
pub trait SessionSink: Send + Sync {
    fn clear_session(&self);

    fn redirect_to_login(&self);

    /// Whether the host is already showing an authentication view.
    fn on_auth_view(&self) -> bool {
        false
    }
}

/// Persisted session blob, `{"state":{"refreshToken":..}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionBlob {
    pub state: SessionBlobState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionBlobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct Slots {
    access_token: Option<String>,
    session_blob: Option<String>,
    current_view: String,
    redirects: usize,
}

/// In-memory session modelled on two storage slots: a plain access-token
/// string and a JSON session blob.
///
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct MemorySession {
    slots: Arc<Mutex<Slots>>,
    login_path: String,
    auth_views: Vec<String>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new("/login")
    }
}

impl MemorySession {
    pub fn new(login_path: &str) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                current_view: "/".to_string(),
                ..Slots::default()
            })),
            login_path: login_path.to_string(),
            auth_views: vec![login_path.to_string(), "/register".to_string()],
        }
    }

    /// Session whose login redirect targets `config.login_path`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.login_path)
    }

    pub fn with_tokens(self, access_token: &str, refresh_token: &str) -> Self {
        self.store_tokens(access_token, refresh_token);
        self
    }

    /// Raw contents of the session blob slot.
    pub fn session_blob(&self) -> Option<String> {
        self.slots().session_blob.clone()
    }

    /// Overwrite the session blob slot with arbitrary text.
    pub fn set_session_blob(&self, raw: Option<String>) {
        self.slots().session_blob = raw;
    }

    pub fn current_view(&self) -> String {
        self.slots().current_view.clone()
    }

    pub fn navigate(&self, view: &str) {
        self.slots().current_view = view.to_string();
    }

    pub fn redirect_count(&self) -> usize {
        self.slots().redirects
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Slots hold plain strings; a poisoned lock still has usable data.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySession {
    fn access_token(&self) -> Option<String> {
        self.slots().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        let raw = self.slots().session_blob.clone()?;
        serde_json::from_str::<SessionBlob>(&raw)
            .ok()
            .and_then(|blob| blob.state.refresh_token)
    }

    fn store_tokens(&self, access_token: &str, refresh_token: &str) {
        let blob = SessionBlob {
            state: SessionBlobState {
                refresh_token: Some(refresh_token.to_string()),
            },
        };
        let mut slots = self.slots();
        slots.access_token = Some(access_token.to_string());
        slots.session_blob = serde_json::to_string(&blob).ok();
    }

    fn clear(&self) {
        let mut slots = self.slots();
        slots.access_token = None;
        slots.session_blob = None;
    }
}

impl SessionSink for MemorySession {
    fn clear_session(&self) {
        self.clear();
    }

    fn redirect_to_login(&self) {
        let mut slots = self.slots();
        slots.current_view = self.login_path.clone();
        slots.redirects += 1;
    }

    fn on_auth_view(&self) -> bool {
        let view = self.current_view();
        self.auth_views.iter().any(|auth| view.starts_with(auth.as_str()))
    }
}
