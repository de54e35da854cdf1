//! Request builders and response parsers for the studio API.
//!
//! # Design
//! Each endpoint is split into a `build_*` function that produces a
//! `RequestDescriptor` and a `parse_*` function that consumes an
//! `HttpResponse`. Neither touches the network; `StudioClient` executes the
//! descriptor in between. Paths are relative to the configured base URL.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, StructuredError};
use crate::http::{HttpMethod, HttpResponse, RequestDescriptor};
use crate::types::{
    AuthTokens, CaptionBatch, CaptionRequest, CreatePost, Credentials, Post, UpdatePost, User,
};

pub fn build_login(credentials: &Credentials) -> Result<RequestDescriptor, ApiError> {
    json_request(HttpMethod::Post, "/auth/login".to_string(), credentials)
}

/// The refresh endpoint takes no body; the refresh token travels as the
/// bearer credential.
pub fn build_refresh(refresh_path: &str) -> RequestDescriptor {
    RequestDescriptor::new(HttpMethod::Post, refresh_path)
}

pub fn build_me() -> RequestDescriptor {
    RequestDescriptor::get("/users/me")
}

pub fn build_list_posts() -> RequestDescriptor {
    RequestDescriptor::get("/posts")
}

pub fn build_get_post(id: Uuid) -> RequestDescriptor {
    RequestDescriptor::get(format!("/posts/{id}"))
}

pub fn build_create_post(input: &CreatePost) -> Result<RequestDescriptor, ApiError> {
    json_request(HttpMethod::Post, "/posts".to_string(), input)
}

pub fn build_update_post(id: Uuid, input: &UpdatePost) -> Result<RequestDescriptor, ApiError> {
    json_request(HttpMethod::Patch, format!("/posts/{id}"), input)
}

pub fn build_delete_post(id: Uuid) -> RequestDescriptor {
    RequestDescriptor::new(HttpMethod::Delete, format!("/posts/{id}"))
}

pub fn build_generate_captions(input: &CaptionRequest) -> Result<RequestDescriptor, ApiError> {
    json_request(HttpMethod::Post, "/content/captions".to_string(), input)
}

pub fn parse_login(response: HttpResponse) -> Result<AuthTokens, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_refresh(response: HttpResponse) -> Result<AuthTokens, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_me(response: HttpResponse) -> Result<User, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_list_posts(response: HttpResponse) -> Result<Vec<Post>, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_get_post(response: HttpResponse) -> Result<Post, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_create_post(response: HttpResponse) -> Result<Post, ApiError> {
    parse_json(&response, 201)
}

pub fn parse_update_post(response: HttpResponse) -> Result<Post, ApiError> {
    parse_json(&response, 200)
}

pub fn parse_delete_post(response: HttpResponse) -> Result<(), ApiError> {
    check_status(&response, 204)
}

pub fn parse_generate_captions(response: HttpResponse) -> Result<CaptionBatch, ApiError> {
    parse_json(&response, 200)
}

fn json_request<T: Serialize>(
    method: HttpMethod,
    path: String,
    input: &T,
) -> Result<RequestDescriptor, ApiError> {
    let body =
        serde_json::to_value(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
    Ok(RequestDescriptor::new(method, path).with_body(body))
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    response: &HttpResponse,
    expected: u16,
) -> Result<T, ApiError> {
    check_status(response, expected)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map any status other than `expected` through the error translator.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(StructuredError::from_response(response).into())
}
