//! Row-to-model conversions between agora-db and agora-types.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use agora_db::models::{PostRow, PostVotesRow, UserRow};
use agora_types::api::PostOut;
use agora_types::models::{Post, User};

pub fn user(row: UserRow) -> User {
    User {
        created_at: timestamp(&row.created_at, "user", row.id),
        id: row.id,
        email: row.email,
    }
}

pub fn post(row: PostRow) -> Post {
    Post {
        created_at: timestamp(&row.created_at, "post", row.id),
        id: row.id,
        title: row.title,
        content: row.content,
        published: row.published,
        owner_id: row.owner_id,
    }
}

pub fn post_out(row: PostVotesRow) -> PostOut {
    PostOut {
        post: post(row.post),
        votes: row.votes,
    }
}

fn timestamp(raw: &str, kind: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written with SQLite's datetime('now') have no timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} {}: {}", raw, kind, id, e);
            DateTime::default()
        })
}
