//! Bearer credential attachment.

use crate::http::HttpRequest;
use crate::session::SessionStore;

/// Which credential, if any, was attached to an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Access,
    Refresh,
}

/// Attaches `authorization: Bearer <token>` to outbound requests.
///
/// Calls to the refresh endpoint carry the refresh token; every other call
/// carries the access token. A missing credential leaves the request
/// unauthenticated and the server decides whether to reject it.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    refresh_path: String,
}

impl AuthInterceptor {
    pub fn new(refresh_path: &str) -> Self {
        Self {
            refresh_path: refresh_path.to_string(),
        }
    }

    pub fn is_refresh_call(&self, url: &str) -> bool {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.ends_with(&self.refresh_path)
    }

    pub fn apply(&self, request: &mut HttpRequest, session: &dyn SessionStore) -> AuthState {
        let (token, state) = if self.is_refresh_call(&request.path) {
            (session.refresh_token(), AuthState::Refresh)
        } else {
            (session.access_token(), AuthState::Access)
        };

        match token {
            Some(token) if !token.is_empty() => {
                request.set_header("authorization", format!("Bearer {token}"));
                state
            }
            _ => AuthState::Unauthenticated,
        }
    }
}
