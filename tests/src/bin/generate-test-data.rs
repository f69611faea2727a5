use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use murmur_api::{Comment, CommentId, ContentId, ContentType, Reaction, Role, UserId};
use rand::{seq::SliceRandom, Rng};

const NUM_USERS: usize = 6;
const NUM_GUIDES: usize = 1;

const NUM_CONTENTS: usize = 4;
const NUM_COMMENTS_PER_CONTENT: usize = 60;
const MAX_DEPTH: usize = 2;

const COMMENT_WORD_COUNT: usize = 25;
const SPAN_DAYS: i64 = 30;

const REPLY_RATIO: f64 = 0.6;
const DELETED_RATIO: f64 = 0.05;
const EDITED_RATIO: f64 = 0.1;
const ANNOTATION_RATIO: f64 = 0.05;

fn gen_reactions(rng: &mut impl Rng) -> BTreeMap<Reaction, u32> {
    let mut res = BTreeMap::new();
    for r in [
        Reaction::Like,
        Reaction::Love,
        Reaction::Insightful,
        Reaction::Question,
    ] {
        if rng.gen_bool(0.3) {
            res.insert(r, rng.gen_range(1..10));
        }
    }
    res
}

fn main() {
    let mut rng = rand::thread_rng();
    let users = (0..NUM_USERS)
        .map(|i| {
            let role = match i < NUM_GUIDES {
                true => Role::Guide,
                false => Role::Scholar,
            };
            (UserId::new(format!("user{i}")), role)
        })
        .collect::<Vec<_>>();
    let content_types = [
        ContentType::IdeasLab,
        ContentType::GuideSession,
        ContentType::ScholarSession,
    ];

    let start = Utc::now() - Duration::days(SPAN_DAYS);
    let mut comments = Vec::new();
    let mut next_id = 1;
    for c in 0..NUM_CONTENTS {
        let content_id = ContentId::new(format!("c{}", c + 1));
        let content_type = content_types[c % content_types.len()];

        // (id, depth) of the comments generated so far for this content
        let mut known: Vec<(CommentId, usize)> = Vec::new();
        let max_gap = SPAN_DAYS * 24 * 60 / NUM_COMMENTS_PER_CONTENT as i64;
        let mut date = start;
        for _ in 0..NUM_COMMENTS_PER_CONTENT {
            date = date + Duration::minutes(rng.gen_range(1..max_gap));
            let parent = match rng.gen_bool(REPLY_RATIO) {
                false => None,
                true => known
                    .iter()
                    .filter(|(_, depth)| *depth < MAX_DEPTH)
                    .collect::<Vec<_>>()
                    .choose(&mut rng)
                    .map(|(id, depth)| (id.clone(), *depth)),
            };
            let (author_id, author_role) = users
                .choose(&mut rng)
                .cloned()
                .expect("there are users");
            let id = CommentId::new(format!("p{next_id}"));
            next_id += 1;

            let deleted = rng.gen_bool(DELETED_RATIO);
            let edited_at = match deleted || rng.gen_bool(EDITED_RATIO) {
                true => Some(date + Duration::minutes(rng.gen_range(1..120))),
                false => None,
            };
            let body = match deleted {
                true => String::new(),
                false => lipsum::lipsum_words(rng.gen_range(1..COMMENT_WORD_COUNT)),
            };
            let depth = parent.as_ref().map_or(0, |(_, d)| d + 1);
            known.push((id.clone(), depth));
            comments.push(Comment {
                id,
                content_id: content_id.clone(),
                content_type,
                author_id,
                author_role,
                body,
                parent_id: parent.map(|(p, _)| p),
                created_at: date,
                edited_at,
                depth: 0,
                deleted,
                pending: false,
                moderator_only: author_role == Role::Guide && rng.gen_bool(ANNOTATION_RATIO),
                reactions: gen_reactions(&mut rng),
            });
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&comments).expect("serializing comments")
    );
}
