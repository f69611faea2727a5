use std::{net::TcpListener, sync::Arc};

use murmur_client::{
    api::{self, AuthToken, ContentId, ContentType, NewComment, Reaction, Role, UserId},
    Config, Error, HttpService, Session, Viewer,
};
use murmur_mock_server::{MockServer, SharedServer};

fn init_logs() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }
}

/// Serves `server` on a random local port, returning the host to reach it at
fn serve(server: SharedServer) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("binding local port");
    let addr = listener.local_addr().expect("retrieving local address");
    let app = murmur_mock_server::router(server);
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .expect("listening on local port")
            .serve(app.into_make_service())
            .await
            .expect("serving mock server")
    });
    format!("http://{addr}")
}

fn session(host: &str, viewer: Viewer, token: Option<AuthToken>, config: Config) -> Session<HttpService> {
    Session::new(
        Arc::new(HttpService::new(String::from(host), token)),
        viewer,
        config,
    )
}

fn new_comment(parent: Option<&api::CommentId>, body: &str, moderator_only: bool) -> NewComment {
    NewComment {
        content_id: ContentId::new("c1"),
        content_type: ContentType::GuideSession,
        parent_id: parent.cloned(),
        body: String::from(body),
        moderator_only,
    }
}

#[tokio::test]
async fn conversation_over_http() {
    init_logs();
    let server = MockServer::shared(2);
    let alice_token = server.lock().add_user(UserId::new("alice"), Role::Scholar);
    let guide_token = server.lock().add_user(UserId::new("gina"), Role::Guide);
    let host = serve(server.clone());
    let c1 = ContentId::new("c1");

    let alice = session(
        &host,
        Viewer::new(UserId::new("alice"), Role::Scholar),
        Some(alice_token),
        Config::default(),
    );
    let gina = session(
        &host,
        Viewer::new(UserId::new("gina"), Role::Guide),
        Some(guide_token),
        Config::default(),
    );

    let root = alice
        .coordinator
        .submit(new_comment(None, "what about lifetimes?", false))
        .await
        .unwrap();
    assert_eq!(root.id.0, "p1");

    gina.open(&c1).await.unwrap();
    let reply = gina
        .coordinator
        .submit(new_comment(Some(&root.id), "read the book", false))
        .await
        .unwrap();
    assert_eq!(reply.depth, 1);
    let note = gina
        .coordinator
        .submit(new_comment(None, "recurring question", true))
        .await
        .unwrap();
    assert!(note.moderator_only);

    alice.fetcher.refresh(&c1).await.unwrap();
    let shown = alice.visible_thread(&c1);
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|v| v.comment.id != note.id));
    assert_eq!(gina.visible_thread(&c1).len(), 3);

    let edited = alice
        .coordinator
        .edit(&root.id, String::from("what about lifetimes, really?"))
        .await
        .unwrap();
    assert!(edited.edited_at.is_some());
    let reacted = alice.coordinator.react(&reply.id, Reaction::Like).await.unwrap();
    assert_eq!(reacted.reaction_count(), 1);
    assert_eq!(alice.store.comment(&reply.id), Some(reacted));

    // alice cannot delete gina's reply, but gina can
    assert_eq!(
        alice.coordinator.delete(&reply.id).await,
        Err(Error::PermissionDenied)
    );
    let deleted = gina.coordinator.delete(&reply.id).await.unwrap();
    assert!(deleted.deleted);

    alice.fetcher.refresh(&c1).await.unwrap();
    let shown = alice.visible_thread(&c1);
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().any(|v| v.comment.id == reply.id && v.placeholder));
    assert_eq!(server.lock().num_comments(), 3);
}

#[tokio::test]
async fn anonymous_readers_only_read() {
    init_logs();
    let server = MockServer::shared(2);
    let token = server.lock().add_user(UserId::new("gina"), Role::Guide);
    let root = server
        .lock()
        .submit(Some(token), new_comment(None, "welcome", false))
        .unwrap();
    server
        .lock()
        .submit(Some(token), new_comment(Some(&root.id), "guides only", true))
        .unwrap();
    let host = serve(server);
    let c1 = ContentId::new("c1");

    let anon = session(&host, Viewer::anonymous(), None, Config::default());
    anon.open(&c1).await.unwrap();
    let shown = anon.visible_thread(&c1);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].comment.body, "welcome");

    assert_eq!(
        anon.coordinator
            .submit(new_comment(None, "hi", false))
            .await,
        Err(Error::PermissionDenied)
    );

    // the service refuses writes without a token even if the client is fooled
    let lying = session(
        &host,
        Viewer::new(UserId::new("mallory"), Role::Scholar),
        None,
        Config::default(),
    );
    let res = lying
        .coordinator
        .submit(new_comment(None, "hi", false))
        .await;
    assert_eq!(
        res,
        Err(Error::SubmissionFailed {
            source: api::Error::PermissionDenied
        })
    );
    assert_eq!(lying.store.len(&c1), 0);
}

#[tokio::test]
async fn service_side_depth_limit_rolls_back() {
    init_logs();
    let server = MockServer::shared(1);
    let token = server.lock().add_user(UserId::new("alice"), Role::Scholar);
    let host = serve(server.clone());
    let c1 = ContentId::new("c1");

    let alice = session(
        &host,
        Viewer::new(UserId::new("alice"), Role::Scholar),
        Some(token),
        Config {
            max_depth: 2,
            ..Config::default()
        },
    );
    let root = alice
        .coordinator
        .submit(new_comment(None, "root", false))
        .await
        .unwrap();
    let reply = alice
        .coordinator
        .submit(new_comment(Some(&root.id), "reply", false))
        .await
        .unwrap();

    let res = alice
        .coordinator
        .submit(new_comment(Some(&reply.id), "too deep", false))
        .await;
    assert_eq!(
        res,
        Err(Error::SubmissionFailed {
            source: api::Error::DepthExceeded { max: 1 }
        })
    );
    assert!(!res.unwrap_err().is_retryable());
    assert_eq!(alice.store.len(&c1), 2);
    assert!(alice.coordinator.pending().is_empty());
    assert_eq!(server.lock().num_comments(), 2);
}

#[tokio::test]
async fn unreachable_service_is_a_retryable_failure() {
    init_logs();
    // bind then drop, so nothing listens on the port anymore
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let anon = session(
        &format!("http://{addr}"),
        Viewer::anonymous(),
        None,
        Config {
            retry_limit: 1,
            retry_backoff_ms: 1,
            ..Config::default()
        },
    );
    let c1 = ContentId::new("c1");
    let err = anon.open(&c1).await.unwrap_err();
    assert!(matches!(
        err,
        Error::FetchFailed {
            retryable: true,
            source: api::Error::Unavailable(_),
            ..
        }
    ));
    assert_eq!(anon.fetcher.has_more(&c1), None);
}
