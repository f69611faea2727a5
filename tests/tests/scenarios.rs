use std::{collections::HashSet, panic::AssertUnwindSafe, sync::Arc};

use chrono::{TimeZone, Utc};
use murmur_client::{
    api::{self, Comment, CommentId, ContentId, ContentType, NewComment, Role, UserId},
    visible_thread, CommentStore, Config, Error, Order, Origin, Session, SubmissionState, Viewer,
};
use murmur_mock_server::{MockServer, MockService, SharedServer};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn new_comment(content: &str, parent: Option<&CommentId>, body: &str) -> NewComment {
    NewComment {
        content_id: ContentId::new(content),
        content_type: ContentType::IdeasLab,
        parent_id: parent.cloned(),
        body: String::from(body),
        moderator_only: false,
    }
}

struct World {
    server: SharedServer,
    service: Arc<MockService>,
    session: Session<MockService>,
}

fn world(config: Config) -> World {
    let server = MockServer::shared(2);
    let token = server.lock().add_user(UserId::new("alice"), Role::Scholar);
    let service = Arc::new(MockService::new(server.clone(), Some(token)));
    let session = Session::new(
        service.clone(),
        Viewer::new(UserId::new("alice"), Role::Scholar),
        config,
    );
    World {
        server,
        service,
        session,
    }
}

/// Has bob post `n` top-level comments on `content`, returning their ids
fn seed(server: &SharedServer, content: &str, n: usize) -> Vec<CommentId> {
    let mut server = server.lock();
    let bob = server.add_user(UserId::new("bob"), Role::Scholar);
    (0..n)
        .map(|i| {
            server
                .submit(Some(bob), new_comment(content, None, &format!("{content} #{i}")))
                .expect("seeding comment")
                .id
        })
        .collect()
}

fn config() -> Config {
    Config {
        retry_backoff_ms: 1,
        ..Config::default()
    }
}

#[tokio::test]
async fn two_pages_of_two() {
    let w = world(config());
    seed(&w.server, "c1", 4);
    let c1 = ContentId::new("c1");
    assert!(w.session.store.get(&c1).is_empty());

    let first = w.session.fetcher.fetch_page(&c1, None, 2).await.unwrap();
    assert_eq!(first.comments.len(), 2);
    let k2 = first.next_cursor.clone().expect("first page has a next cursor");
    assert_eq!(k2.token, "k2");

    let second = w.session.fetcher.fetch_page(&c1, Some(&k2), 2).await.unwrap();
    assert_eq!(second.comments.len(), 2);
    let first_ids = first.comments.iter().map(|c| &c.id).collect::<HashSet<_>>();
    assert!(second.comments.iter().all(|c| !first_ids.contains(&c.id)));

    let all = w.session.store.get(&c1);
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].created_at > w[1].created_at));
}

#[tokio::test]
async fn hello_is_confirmed_as_p1() {
    let w = world(config());
    let c1 = ContentId::new("c1");
    let submission = w
        .session
        .coordinator
        .prepare_submit(new_comment("c1", None, "hello"))
        .unwrap();
    let temp_id = submission.temp_id.clone();
    assert!(temp_id.is_temporary());
    assert_eq!(
        w.session.coordinator.state(&temp_id),
        Some(SubmissionState::Pending)
    );
    assert!(w.session.store.get(&c1)[0].pending);

    w.session.coordinator.finish_submit(submission).await.unwrap();
    let all = w.session.store.get(&c1);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, CommentId::new("p1"));
    assert_eq!(all[0].body, "hello");
    assert!(!w.session.store.contains(&temp_id));
    assert_eq!(
        w.session.coordinator.state(&temp_id),
        Some(SubmissionState::Confirmed(CommentId::new("p1")))
    );
}

#[tokio::test]
async fn fourth_level_reply_is_rejected_locally() {
    let w = world(config());
    let coordinator = &w.session.coordinator;
    let mut parent = None;
    for level in 0..3 {
        let c = coordinator
            .submit(new_comment("c1", parent.as_ref(), &format!("level {level}")))
            .await
            .unwrap();
        parent = Some(c.id);
    }
    let calls = w.service.calls();
    let res = coordinator
        .submit(new_comment("c1", parent.as_ref(), "level 3"))
        .await;
    assert_eq!(res, Err(Error::DepthExceeded { depth: 3, max: 2 }));
    assert_eq!(w.service.calls(), calls);
    assert_eq!(w.session.store.len(&ContentId::new("c1")), 3);
}

#[tokio::test]
async fn switching_content_discards_the_inflight_fetch() {
    let w = Arc::new(world(config()));
    seed(&w.server, "c1", 3);
    seed(&w.server, "c2", 2);
    let (c1, c2) = (ContentId::new("c1"), ContentId::new("c2"));

    w.session.open(&c1).await.unwrap();
    let before = w.session.store.get(&c1);
    assert_eq!(before.len(), 3);

    // a new comment shows up on c1, and a refresh starts but stalls
    seed(&w.server, "c1", 1);
    w.service.pause();
    let refresh = tokio::spawn({
        let w = w.clone();
        let c1 = c1.clone();
        async move { w.session.fetcher.refresh(&c1).await }
    });
    while w.service.waiting() == 0 {
        tokio::task::yield_now().await;
    }

    w.session.fetcher.set_active(c2.clone());
    assert!(w.session.fetcher.cursor(&c1).is_none());
    w.service.resume();
    assert_eq!(
        refresh.await.expect("refresh task panicked"),
        Err(Error::Stale(c1.clone()))
    );
    assert_eq!(w.session.store.get(&c1), before);

    w.session.open(&c2).await.unwrap();
    let shown = w.session.visible_thread(&c2);
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|v| v.comment.content_id == c2));
}

#[tokio::test]
async fn failed_submission_leaves_no_trace() {
    let w = world(config());
    seed(&w.server, "c1", 2);
    let c1 = ContentId::new("c1");
    w.session.open(&c1).await.unwrap();
    let before = w.session.store.get(&c1);

    w.service
        .fail_next(1, api::Error::Unavailable(String::from("down")));
    let submission = w
        .session
        .coordinator
        .prepare_submit(new_comment("c1", Some(&before[0].id), "lost reply"))
        .unwrap();
    assert_eq!(w.session.store.len(&c1), 3);
    let res = w.session.coordinator.finish_submit(submission.clone()).await;
    assert!(matches!(res, Err(Error::SubmissionFailed { .. })));
    assert_eq!(w.session.store.get(&c1), before);
    assert!(matches!(
        w.session.coordinator.state(&submission.temp_id),
        Some(SubmissionState::Failed(_))
    ));
    // nothing was retried behind the caller's back
    assert_eq!(w.server.lock().num_comments(), 2);
}

#[tokio::test]
async fn confirmation_does_not_reorder_around_remote_comments() {
    let w = world(config());
    seed(&w.server, "c1", 1);
    let c1 = ContentId::new("c1");
    w.session.open(&c1).await.unwrap();

    let submission = w
        .session
        .coordinator
        .prepare_submit(new_comment("c1", None, "mine"))
        .unwrap();
    seed(&w.server, "c1", 1);
    w.session.fetcher.refresh(&c1).await.unwrap();
    let bodies = |store: &CommentStore| {
        store
            .get(&c1)
            .into_iter()
            .map(|c| c.body)
            .collect::<Vec<_>>()
    };
    let before = bodies(&w.session.store);
    assert_eq!(before, ["c1 #0", "mine", "c1 #0"]);

    w.session.coordinator.finish_submit(submission).await.unwrap();
    assert_eq!(bodies(&w.session.store), before);

    // the service now has it too, refetching does not duplicate it
    w.session.fetcher.refresh(&c1).await.unwrap();
    assert_eq!(bodies(&w.session.store), before);
}

do_tokio_test!(
    paging_with_any_page_sizes_loads_everything_once,
    Vec<u8>,
    |sizes: Vec<u8>| async move {
        let w = world(Config {
            page_size: 7,
            ..config()
        });
        let ids = seed(&w.server, "c1", 23);
        let c1 = ContentId::new("c1");
        let fetcher = &w.session.fetcher;

        let mut seen = HashSet::new();
        for size in sizes.into_iter().take(16) {
            let cursor = fetcher.cursor(&c1);
            match size % 5 {
                0 => fetcher.refresh(&c1).await.unwrap(),
                _ => fetcher
                    .fetch_page(&c1, cursor.as_ref(), usize::from(size))
                    .await
                    .unwrap(),
            };
            let stored = w
                .session
                .store
                .get(&c1)
                .into_iter()
                .map(|c| c.id)
                .collect::<HashSet<_>>();
            assert!(stored.is_superset(&seen));
            seen = stored;
            if let (Some(before), Some(after)) = (cursor, fetcher.cursor(&c1)) {
                assert!(after.seq >= before.seq);
            }
        }
        while fetcher.has_more(&c1) != Some(false) {
            fetcher.fetch_next(&c1).await.unwrap();
        }

        let stored = w.session.store.get(&c1);
        assert_eq!(stored.len(), ids.len());
        assert_eq!(
            stored.into_iter().map(|c| c.id).collect::<HashSet<_>>(),
            ids.into_iter().collect::<HashSet<_>>()
        );
    }
);

#[test]
fn anonymous_views_never_nest_past_the_limit() {
    bolero::check!()
        .with_type::<Vec<(u8, bool)>>()
        .cloned()
        .for_each(|ops| {
            let store = CommentStore::new(Order::OldestFirst);
            let mut ids: Vec<CommentId> = Vec::new();
            let mut annotations = HashSet::new();
            for (i, (parent, annotation)) in ops.into_iter().enumerate() {
                let id = CommentId::new(format!("x{i}"));
                let parent_id = match (parent % 4, ids.is_empty()) {
                    (0, _) | (_, true) => None,
                    _ => Some(ids[usize::from(parent) % ids.len()].clone()),
                };
                let hidden = annotation
                    || parent_id
                        .as_ref()
                        .map_or(false, |p| annotations.contains(p));
                if hidden {
                    annotations.insert(id.clone());
                }
                store
                    .upsert(
                        Comment {
                            id: id.clone(),
                            content_id: ContentId::new("c1"),
                            content_type: ContentType::GuideSession,
                            author_id: UserId::new("bob"),
                            author_role: Role::Guide,
                            body: format!("comment {i}"),
                            parent_id,
                            created_at: Utc
                                .timestamp_opt(1_700_000_000 + i as i64, 0)
                                .unwrap(),
                            edited_at: None,
                            depth: 0,
                            deleted: false,
                            pending: false,
                            moderator_only: annotation,
                            reactions: Default::default(),
                        },
                        Origin::Remote,
                    )
                    .unwrap();
                ids.push(id);
            }

            let c1 = ContentId::new("c1");
            for max_depth in 0..4 {
                let view = visible_thread(&store, &c1, Role::Anonymous, max_depth);
                assert!(view.iter().all(|v| v.comment.depth <= max_depth));
                assert!(view.iter().all(|v| !v.comment.moderator_only));
                let shown = view.len() + view.iter().map(|v| v.hidden_replies).sum::<usize>();
                assert_eq!(shown, ids.len() - annotations.len());
            }
        });
}
