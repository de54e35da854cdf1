//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port and drives
//! `StudioClient` over real HTTP through `ReqwestTransport`. Per-route hit
//! counters exposed by the server show how many calls actually reached it.

use std::collections::HashMap;
use std::sync::Arc;

use studio_core::{
    ApiError, CaptionRequest, ClientConfig, CreatePost, Credentials, MemorySession, Platform,
    PostStatus, ReqwestTransport, RequestDescriptor, SessionStore, StudioClient, UpdatePost,
};

/// Start a fresh mock server and return its base URL.
async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { mock_server::run(listener).await });
    format!("http://{addr}")
}

fn client(base_url: &str, session: &MemorySession) -> StudioClient {
    let config = ClientConfig::new(base_url);
    let transport = Arc::new(ReqwestTransport::new(config.timeout).unwrap());
    StudioClient::new(config, transport, Arc::new(session.clone()))
        .with_session_sink(Arc::new(session.clone()))
}

fn demo_credentials() -> Credentials {
    Credentials {
        email: mock_server::DEMO_EMAIL.to_string(),
        password: mock_server::DEMO_PASSWORD.to_string(),
    }
}

async fn hits(client: &StudioClient) -> HashMap<String, usize> {
    client
        .send_json(RequestDescriptor::get("/debug/hits"))
        .await
        .unwrap()
}

#[tokio::test]
async fn post_lifecycle() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);

    // Step 1: log in; tokens land in the session.
    let tokens = client.login(&demo_credentials()).await.unwrap();
    assert_eq!(session.access_token(), Some(tokens.access_token.clone()));
    assert_eq!(session.refresh_token(), Some(tokens.refresh_token.clone()));

    // Step 2: current user.
    let me = client.me().await.unwrap();
    assert_eq!(me.email, mock_server::DEMO_EMAIL);

    // Step 3: list should be empty.
    assert!(client.list_posts().await.unwrap().is_empty());

    // Step 4: create a draft.
    let created = client
        .create_post(&CreatePost {
            caption: "Pumpkin loaves are back".to_string(),
            hashtags: vec!["#autumn".to_string()],
            platform: Platform::Instagram,
            scheduled_at: None,
        })
        .await
        .unwrap();
    assert_eq!(created.status, PostStatus::Draft);

    // Step 5: get it back.
    let fetched = client.get_post(created.id).await.unwrap();
    assert_eq!(fetched, created);

    // Step 6: schedule it.
    let when = "2030-05-01T09:00:00Z".parse().unwrap();
    let updated = client
        .update_post(
            created.id,
            &UpdatePost {
                scheduled_at: Some(when),
                ..UpdatePost::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, PostStatus::Scheduled);
    assert_eq!(updated.scheduled_at, Some(when));

    // Step 7: delete, then get returns NotFound.
    client.delete_post(created.id).await.unwrap();
    let err = client.get_post(created.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.structured().unwrap().messages, vec!["Post not found"]);
}

#[tokio::test]
async fn concurrent_identical_gets_reach_server_once() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let slow = || RequestDescriptor::get("/posts?delay_ms=200");
    let first = client.dispatch(slow());
    let second = client.dispatch(slow());
    assert!(second.is_joined());

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap(), b.unwrap());
    assert!(client.registry().is_empty());
    assert_eq!(hits(&client).await.get("GET /posts"), Some(&1));
}

#[tokio::test]
async fn concurrent_identical_creates_all_reach_server() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let input = CreatePost {
        caption: "Two for one Tuesday".to_string(),
        hashtags: vec![],
        platform: Platform::Facebook,
        scheduled_at: None,
    };
    let (a, b) = tokio::join!(client.create_post(&input), client.create_post(&input));
    assert_ne!(a.unwrap().id, b.unwrap().id);
    assert_eq!(client.list_posts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_get_is_redispatched() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let pending = client.dispatch(RequestDescriptor::get("/posts"));
    pending.cancel();
    assert!(client.registry().is_empty());
    assert!(matches!(pending.await, Err(ApiError::Cancelled)));

    let fresh = client.dispatch(RequestDescriptor::get("/posts"));
    assert!(!fresh.is_joined());
    fresh.await.unwrap();
}

#[tokio::test]
async fn timed_out_get_frees_its_key() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let slow = || RequestDescriptor::get("/posts?delay_ms=500");
    let outcome =
        tokio::time::timeout(std::time::Duration::from_millis(20), client.dispatch(slow())).await;
    assert!(outcome.is_err());
    assert!(client.registry().is_empty());

    let fresh = client.dispatch(slow());
    assert!(!fresh.is_joined());
    assert!(fresh.await.unwrap().is_success());
}

#[tokio::test]
async fn validation_errors_keep_every_message() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let err = client
        .create_post(&CreatePost {
            caption: " ".to_string(),
            hashtags: vec!["nohash".to_string()],
            platform: Platform::Twitter,
            scheduled_at: None,
        })
        .await
        .unwrap_err();
    let structured = err.structured().unwrap();
    assert_eq!(structured.status, 400);
    assert_eq!(
        structured.messages,
        vec![
            "caption should not be empty",
            "each value in hashtags must start with #"
        ]
    );
    assert_eq!(structured.data["statusCode"], 400);
}

#[tokio::test]
async fn refresh_session_rotates_stored_tokens() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    let original = client.login(&demo_credentials()).await.unwrap();

    let rotated = client.refresh_session().await.unwrap();
    assert_ne!(rotated.refresh_token, original.refresh_token);
    assert_eq!(session.access_token(), Some(rotated.access_token));
    assert_eq!(session.refresh_token(), Some(rotated.refresh_token));
}

#[tokio::test]
async fn rejected_token_tears_down_session() {
    let base_url = start_server().await;
    let config = ClientConfig {
        login_path: "/sign-in".to_string(),
        ..ClientConfig::new(&base_url)
    };
    let session = MemorySession::from_config(&config).with_tokens("access-stale", "refresh-stale");
    session.navigate("/dashboard");
    let transport = Arc::new(ReqwestTransport::new(config.timeout).unwrap());
    let client = StudioClient::new(config, transport, Arc::new(session.clone()))
        .with_session_sink(Arc::new(session.clone()));

    let err = client.me().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(session.access_token().is_none());
    assert!(session.refresh_token().is_none());
    assert_eq!(session.current_view(), "/sign-in");
    assert_eq!(session.redirect_count(), 1);
}

#[tokio::test]
async fn generated_captions_normalize_dates() {
    let base_url = start_server().await;
    let session = MemorySession::default();
    let client = client(&base_url, &session);
    client.login(&demo_credentials()).await.unwrap();

    let batch = client
        .generate_captions(&CaptionRequest {
            topic: "cinnamon rolls".to_string(),
            platform: Platform::Tiktok,
            tone: Some("playful".to_string()),
            count: 2,
        })
        .await
        .unwrap();
    assert_eq!(batch.captions.len(), 2);

    let me = client
        .send_normalized(RequestDescriptor::get("/users/me"))
        .await
        .unwrap();
    assert!(me.get("createdAt").and_then(|v| v.as_date()).is_some());
    assert_eq!(me.get("plan").and_then(|v| v.as_str()), Some("starter"));
}

#[tokio::test]
async fn unreachable_server_reports_status_500() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = MemorySession::default();
    let client = client(&format!("http://{addr}"), &session);
    let err = client.list_posts().await.unwrap_err();
    let structured = err.structured().unwrap();
    assert_eq!(structured.status, 500);
    assert_eq!(structured.messages.len(), 1);
}
