use std::{collections::HashMap, collections::HashSet, sync::Arc, time::Duration};

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEMO_EMAIL: &str = "owner@corner-bakery.test";
pub const DEMO_PASSWORD: &str = "sourdough";
pub const DEMO_USER_ID: Uuid = Uuid::from_u128(0x1);

const MAX_HASHTAGS: usize = 30;
const MAX_CAPTIONS: u8 = 5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Twitter,
    Linkedin,
    Tiktok,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub platform: Platform,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub platform: Platform,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePost {
    pub caption: Option<String>,
    pub hashtags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub business_name: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CaptionRequest {
    pub topic: String,
    pub platform: Platform,
    pub tone: Option<String>,
    pub count: u8,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GeneratedCaption {
    pub hook: String,
    pub text: String,
    pub hashtags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CaptionBatch {
    pub captions: Vec<GeneratedCaption>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub delay_ms: Option<u64>,
}

#[derive(Default)]
pub struct Sessions {
    access: HashSet<String>,
    refresh: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct AppState {
    pub posts: Arc<RwLock<HashMap<Uuid, Post>>>,
    pub sessions: Arc<RwLock<Sessions>>,
    pub hits: Arc<RwLock<HashMap<String, usize>>>,
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/users/me", get(me))
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/content/captions", post(generate_captions))
        .route_layer(middleware::from_fn_with_state(state.clone(), record_hit))
        .route("/debug/hits", get(hits))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// NestJS-style error body: `{"statusCode":..,"message":..,"error":..}`.
fn error(status: StatusCode, message: serde_json::Value) -> Response {
    let body = json!({
        "statusCode": status.as_u16(),
        "message": message,
        "error": status.canonical_reason().unwrap_or("Error"),
    });
    (status, Json(body)).into_response()
}

fn unauthorized() -> Response {
    error(StatusCode::UNAUTHORIZED, json!("Unauthorized"))
}

fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, json!("Post not found"))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let token = bearer(headers).ok_or_else(unauthorized)?;
    if state.sessions.read().await.access.contains(token) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

async fn issue_tokens(state: &AppState) -> AuthTokens {
    let tokens = AuthTokens {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
    };
    let mut sessions = state.sessions.write().await;
    sessions.access.insert(tokens.access_token.clone());
    sessions.refresh.insert(tokens.refresh_token.clone());
    tokens
}

async fn record_hit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!("{} {route}", request.method());
    tracing::debug!(route = %key, "handling request");
    *state.hits.write().await.entry(key).or_insert(0) += 1;
    next.run(request).await
}

async fn hits(State(state): State<AppState>) -> Json<HashMap<String, usize>> {
    Json(state.hits.read().await.clone())
}

async fn login(State(state): State<AppState>, Json(input): Json<Credentials>) -> Response {
    if input.email != DEMO_EMAIL || input.password != DEMO_PASSWORD {
        return error(StatusCode::UNAUTHORIZED, json!("Invalid email or password"));
    }
    Json(issue_tokens(&state).await).into_response()
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return unauthorized();
    };
    // Refresh tokens are single use.
    if !state.sessions.write().await.refresh.remove(token) {
        return unauthorized();
    }
    Json(issue_tokens(&state).await).into_response()
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    Json(User {
        id: DEMO_USER_ID,
        email: DEMO_EMAIL.to_string(),
        business_name: "Corner Bakery".to_string(),
        plan: "starter".to_string(),
        created_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
    })
    .into_response()
}

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    if let Some(ms) = query.delay_ms {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    let posts = state.posts.read().await;
    let mut posts: Vec<Post> = posts.values().cloned().collect();
    posts.sort_by_key(|post| post.created_at);
    Json(posts).into_response()
}

fn validate_post(caption: Option<&str>, hashtags: Option<&[String]>) -> Vec<String> {
    let mut problems = Vec::new();
    if caption.is_some_and(|caption| caption.trim().is_empty()) {
        problems.push("caption should not be empty".to_string());
    }
    if let Some(hashtags) = hashtags {
        if hashtags.len() > MAX_HASHTAGS {
            problems.push(format!("hashtags must contain no more than {MAX_HASHTAGS} elements"));
        }
        if hashtags.iter().any(|tag| !tag.starts_with('#')) {
            problems.push("each value in hashtags must start with #".to_string());
        }
    }
    problems
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreatePost>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    let problems = validate_post(Some(input.caption.as_str()), Some(input.hashtags.as_slice()));
    if !problems.is_empty() {
        return error(StatusCode::BAD_REQUEST, json!(problems));
    }
    let status = if input.scheduled_at.is_some() {
        PostStatus::Scheduled
    } else {
        PostStatus::Draft
    };
    let post = Post {
        id: Uuid::new_v4(),
        caption: input.caption,
        hashtags: input.hashtags,
        platform: input.platform,
        status,
        scheduled_at: input.scheduled_at,
        created_at: Utc::now(),
    };
    state.posts.write().await.insert(post.id, post.clone());
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn get_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    match state.posts.read().await.get(&id) {
        Some(post) => Json(post.clone()).into_response(),
        None => not_found(),
    }
}

async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePost>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    let problems = validate_post(input.caption.as_deref(), input.hashtags.as_deref());
    if !problems.is_empty() {
        return error(StatusCode::BAD_REQUEST, json!(problems));
    }
    let mut posts = state.posts.write().await;
    let Some(post) = posts.get_mut(&id) else {
        return not_found();
    };
    if let Some(caption) = input.caption {
        post.caption = caption;
    }
    if let Some(hashtags) = input.hashtags {
        post.hashtags = hashtags;
    }
    if let Some(scheduled_at) = input.scheduled_at {
        post.scheduled_at = Some(scheduled_at);
        post.status = PostStatus::Scheduled;
    }
    if let Some(status) = input.status {
        post.status = status;
    }
    Json(post.clone()).into_response()
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    match state.posts.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

fn caption_hashtags(topic: &str, platform: Platform) -> Vec<String> {
    let mut tags: Vec<String> = topic
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .map(|word| format!("#{word}"))
        .collect();
    if platform == Platform::Linkedin {
        tags.truncate(3);
    }
    tags
}

async fn generate_captions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CaptionRequest>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers).await {
        return rejection;
    }
    if input.topic.trim().is_empty() || input.count == 0 || input.count > MAX_CAPTIONS {
        let mut problems = Vec::new();
        if input.topic.trim().is_empty() {
            problems.push("topic should not be empty".to_string());
        }
        if input.count == 0 || input.count > MAX_CAPTIONS {
            problems.push(format!("count must be between 1 and {MAX_CAPTIONS}"));
        }
        return error(StatusCode::BAD_REQUEST, json!(problems));
    }
    let tone = input.tone.as_deref().unwrap_or("friendly");
    let hashtags = caption_hashtags(&input.topic, input.platform);
    let captions = (1..=input.count)
        .map(|n| GeneratedCaption {
            hook: format!("{n}. Have you heard about {}?", input.topic),
            text: format!("A {tone} take on {}: come see us this week.", input.topic),
            hashtags: hashtags.clone(),
        })
        .collect();
    Json(CaptionBatch {
        captions,
        generated_at: Utc::now(),
    })
    .into_response()
}
