use crate::Database;
use crate::models::{
    Inserted, PostFields, PostMutation, PostRow, PostVotesRow, SentimentLogRow, UserRow,
    VoteDirection, VoteOutcome,
};
use anyhow::Result;
use rusqlite::{Connection, Row, ffi};

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.published, p.owner_id, p.created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<Inserted<UserRow>> {
        self.with_tx(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO users (email, password) VALUES (?1, ?2)
                 RETURNING id, email, password, created_at",
                (email, password_hash),
                map_user,
            );
            match inserted {
                Ok(row) => Ok(Inserted::Created(row)),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => Ok(Inserted::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Exact-match lookup; emails are compared byte for byte.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Removes a user. Their posts and votes go with them via ON DELETE CASCADE.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_tx(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Posts --

    /// `None` when the owner no longer exists.
    pub fn create_post(&self, owner_id: i64, fields: &PostFields<'_>) -> Result<Option<PostRow>> {
        self.with_tx(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO posts (title, content, published, owner_id) VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, title, content, published, owner_id, created_at",
                rusqlite::params![fields.title, fields.content, fields.published, owner_id],
                map_post,
            );
            match inserted {
                Ok(row) => Ok(Some(row)),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// One page of posts with their vote counts, in id order. An empty
    /// `search` matches every title; otherwise the match is a case-sensitive
    /// substring test.
    pub fn list_posts_with_votes(
        &self,
        limit: u32,
        offset: u32,
        search: &str,
    ) -> Result<Vec<PostVotesRow>> {
        self.with_conn(|conn| query_posts_with_votes(conn, limit, offset, search))
    }

    /// `None` means the post does not exist, as opposed to a post with zero votes.
    pub fn get_post_with_votes(&self, id: i64) -> Result<Option<PostVotesRow>> {
        self.with_conn(|conn| query_post_with_votes(conn, id))
    }

    pub fn update_post(
        &self,
        id: i64,
        caller_id: i64,
        fields: &PostFields<'_>,
    ) -> Result<PostMutation<PostRow>> {
        self.with_tx(|conn| {
            match owner_of(conn, id)? {
                None => return Ok(PostMutation::Missing),
                Some(owner) if owner != caller_id => return Ok(PostMutation::NotOwner),
                Some(_) => {}
            }

            let row = conn.query_row(
                "UPDATE posts SET title = ?1, content = ?2, published = ?3 WHERE id = ?4
                 RETURNING id, title, content, published, owner_id, created_at",
                rusqlite::params![fields.title, fields.content, fields.published, id],
                map_post,
            )?;
            Ok(PostMutation::Done(row))
        })
    }

    pub fn delete_post(&self, id: i64, caller_id: i64) -> Result<PostMutation<()>> {
        self.with_tx(|conn| {
            match owner_of(conn, id)? {
                None => return Ok(PostMutation::Missing),
                Some(owner) if owner != caller_id => return Ok(PostMutation::NotOwner),
                Some(_) => {}
            }

            conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(PostMutation::Done(()))
        })
    }

    // -- Votes --

    /// Insert-if-absent for `Cast`, delete-if-present for `Uncast`. There is
    /// no overwrite: a duplicate cast is rejected by the (user_id, post_id)
    /// primary key, so two racing casts cannot both succeed.
    pub fn cast_vote(
        &self,
        user_id: i64,
        post_id: i64,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        self.with_tx(|conn| {
            let post_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
                [post_id],
                |row| row.get(0),
            )?;
            if !post_exists {
                return Ok(VoteOutcome::PostMissing);
            }

            match direction {
                VoteDirection::Cast => {
                    let inserted = conn.execute(
                        "INSERT INTO votes (user_id, post_id) VALUES (?1, ?2)",
                        [user_id, post_id],
                    );
                    match inserted {
                        Ok(_) => Ok(VoteOutcome::Added),
                        Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                            Ok(VoteOutcome::AlreadyVoted)
                        }
                        // The post was checked above, so this is the voter.
                        Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                            Ok(VoteOutcome::VoterMissing)
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                VoteDirection::Uncast => {
                    let removed = conn.execute(
                        "DELETE FROM votes WHERE user_id = ?1 AND post_id = ?2",
                        [user_id, post_id],
                    )?;
                    if removed == 0 {
                        Ok(VoteOutcome::NotVoted)
                    } else {
                        Ok(VoteOutcome::Removed)
                    }
                }
            }
        })
    }

    // -- Call sentiment logs --

    pub fn insert_sentiment_log(
        &self,
        related_to_id: &str,
        call_id: &str,
        overall_sentiment: &str,
    ) -> Result<Inserted<SentimentLogRow>> {
        self.with_tx(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO call_sentiment_logs (related_to_id, call_id, overall_sentiment)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, related_to_id, call_id, overall_sentiment, created_at",
                (related_to_id, call_id, overall_sentiment),
                |row| {
                    Ok(SentimentLogRow {
                        id: row.get(0)?,
                        related_to_id: row.get(1)?,
                        call_id: row.get(2)?,
                        overall_sentiment: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            );
            match inserted {
                Ok(row) => Ok(Inserted::Created(row)),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => Ok(Inserted::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        published: row.get(3)?,
        owner_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_post_votes(row: &Row<'_>) -> rusqlite::Result<PostVotesRow> {
    Ok(PostVotesRow {
        post: map_post(row)?,
        votes: row.get(6)?,
    })
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, created_at FROM users WHERE email = ?1")?;

    let row = stmt.query_row([email], map_user).optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, created_at FROM users WHERE id = ?1")?;

    let row = stmt.query_row([id], map_user).optional()?;

    Ok(row)
}

fn query_posts_with_votes(
    conn: &Connection,
    limit: u32,
    offset: u32,
    search: &str,
) -> Result<Vec<PostVotesRow>> {
    // LEFT JOIN keeps posts without votes; COUNT(v.post_id) ignores the NULLs
    // those rows produce, so they report 0.
    let sql = format!(
        "SELECT {POST_COLUMNS}, COUNT(v.post_id) AS votes
         FROM posts p
         LEFT JOIN votes v ON v.post_id = p.id
         WHERE ?1 = '' OR instr(p.title, ?1) > 0
         GROUP BY p.id
         ORDER BY p.id
         LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(rusqlite::params![search, limit, offset], map_post_votes)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_post_with_votes(conn: &Connection, id: i64) -> Result<Option<PostVotesRow>> {
    let sql = format!(
        "SELECT {POST_COLUMNS}, COUNT(v.post_id) AS votes
         FROM posts p
         LEFT JOIN votes v ON v.post_id = p.id
         WHERE p.id = ?1
         GROUP BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt.query_row([id], map_post_votes).optional()?;

    Ok(row)
}

fn owner_of(conn: &Connection, post_id: i64) -> Result<Option<i64>> {
    conn.query_row("SELECT owner_id FROM posts WHERE id = ?1", [post_id], |row| {
        row.get(0)
    })
    .optional()
}

fn is_constraint(err: &rusqlite::Error, extended_code: std::os::raw::c_int) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation && e.extended_code == extended_code
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Inserted, PostFields, PostMutation, UserRow, VoteDirection, VoteOutcome};
    use crate::test_support;

    fn user(db: &crate::Database, email: &str) -> UserRow {
        match db.create_user(email, "hash").unwrap() {
            Inserted::Created(row) => row,
            Inserted::Duplicate => panic!("duplicate {email}"),
        }
    }

    fn fields(title: &str) -> PostFields<'_> {
        PostFields {
            title,
            content: "body",
            published: true,
        }
    }

    #[test]
    fn duplicate_email_is_reported() {
        let t = test_support::open();
        user(&t.db, "a@agora.dev");
        assert!(matches!(
            t.db.create_user("a@agora.dev", "other").unwrap(),
            Inserted::Duplicate
        ));
    }

    #[test]
    fn email_lookup_is_exact() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        assert_eq!(t.db.get_user_by_email("a@agora.dev").unwrap().unwrap().id, u.id);
        assert!(t.db.get_user_by_email("A@agora.dev").unwrap().is_none());
        assert!(t.db.get_user_by_id(u.id + 100).unwrap().is_none());
    }

    #[test]
    fn posts_without_votes_count_zero() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        let p1 = t.db.create_post(u.id, &fields("first")).unwrap().unwrap();
        let p2 = t.db.create_post(u.id, &fields("second")).unwrap().unwrap();
        assert_eq!(t.db.cast_vote(u.id, p2.id, VoteDirection::Cast).unwrap(), VoteOutcome::Added);

        let rows = t.db.list_posts_with_votes(10, 0, "").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].post.id, p1.id);
        assert_eq!(rows[0].votes, 0);
        assert_eq!(rows[1].post.id, p2.id);
        assert_eq!(rows[1].votes, 1);
    }

    #[test]
    fn vote_counts_span_users() {
        let t = test_support::open();
        let a = user(&t.db, "a@agora.dev");
        let b = user(&t.db, "b@agora.dev");
        let p = t.db.create_post(a.id, &fields("shared")).unwrap().unwrap();
        t.db.cast_vote(a.id, p.id, VoteDirection::Cast).unwrap();
        t.db.cast_vote(b.id, p.id, VoteDirection::Cast).unwrap();

        assert_eq!(t.db.get_post_with_votes(p.id).unwrap().unwrap().votes, 2);
    }

    #[test]
    fn pagination_edges_return_empty() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        for i in 0..3 {
            t.db.create_post(u.id, &fields(&format!("post {i}"))).unwrap().unwrap();
        }

        assert!(t.db.list_posts_with_votes(0, 0, "").unwrap().is_empty());
        assert!(t.db.list_posts_with_votes(10, 3, "").unwrap().is_empty());
        assert!(t.db.list_posts_with_votes(10, 50, "").unwrap().is_empty());

        let page1 = t.db.list_posts_with_votes(2, 0, "").unwrap();
        let page2 = t.db.list_posts_with_votes(2, 2, "").unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 1);
        assert!(page1[1].post.id < page2[0].post.id);
    }

    #[test]
    fn search_is_case_sensitive_substring() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        t.db.create_post(u.id, &fields("Rust tips")).unwrap().unwrap();
        t.db.create_post(u.id, &fields("gardening")).unwrap().unwrap();

        let hits = t.db.list_posts_with_votes(10, 0, "Rust").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].post.title, "Rust tips");
        assert!(t.db.list_posts_with_votes(10, 0, "rust").unwrap().is_empty());
        assert_eq!(t.db.list_posts_with_votes(10, 0, "den").unwrap().len(), 1);
    }

    #[test]
    fn missing_post_is_distinct_from_zero_votes() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        let p = t.db.create_post(u.id, &fields("lonely")).unwrap().unwrap();

        assert_eq!(t.db.get_post_with_votes(p.id).unwrap().unwrap().votes, 0);
        assert!(t.db.get_post_with_votes(p.id + 1).unwrap().is_none());
    }

    #[test]
    fn vote_toggle_is_strict() {
        let t = test_support::open();
        let u = user(&t.db, "a@agora.dev");
        let p = t.db.create_post(u.id, &fields("vote me")).unwrap().unwrap();

        assert_eq!(t.db.cast_vote(u.id, p.id, VoteDirection::Uncast).unwrap(), VoteOutcome::NotVoted);
        assert_eq!(t.db.cast_vote(u.id, p.id, VoteDirection::Cast).unwrap(), VoteOutcome::Added);
        assert_eq!(
            t.db.cast_vote(u.id, p.id, VoteDirection::Cast).unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(t.db.cast_vote(u.id, p.id, VoteDirection::Uncast).unwrap(), VoteOutcome::Removed);
        assert_eq!(t.db.cast_vote(u.id, p.id, VoteDirection::Uncast).unwrap(), VoteOutcome::NotVoted);
        assert_eq!(
            t.db.cast_vote(u.id, p.id + 1, VoteDirection::Cast).unwrap(),
            VoteOutcome::PostMissing
        );
    }

    #[test]
    fn only_owner_mutates_posts() {
        let t = test_support::open();
        let owner = user(&t.db, "owner@agora.dev");
        let other = user(&t.db, "other@agora.dev");
        let p = t.db.create_post(owner.id, &fields("mine")).unwrap().unwrap();

        let update = PostFields {
            title: "edited",
            content: "new body",
            published: false,
        };
        assert!(matches!(
            t.db.update_post(p.id, other.id, &update).unwrap(),
            PostMutation::NotOwner
        ));
        match t.db.update_post(p.id, owner.id, &update).unwrap() {
            PostMutation::Done(row) => {
                assert_eq!(row.title, "edited");
                assert!(!row.published);
                assert_eq!(row.owner_id, owner.id);
            }
            unexpected => panic!("unexpected {unexpected:?}"),
        }

        assert!(matches!(t.db.delete_post(p.id, other.id).unwrap(), PostMutation::NotOwner));
        assert!(matches!(t.db.delete_post(p.id, owner.id).unwrap(), PostMutation::Done(())));
        assert!(matches!(t.db.delete_post(p.id, owner.id).unwrap(), PostMutation::Missing));
    }

    #[test]
    fn deleting_user_cascades_to_posts_and_votes() {
        let t = test_support::open();
        let a = user(&t.db, "a@agora.dev");
        let b = user(&t.db, "b@agora.dev");
        let pa = t.db.create_post(a.id, &fields("by a")).unwrap().unwrap();
        let pb = t.db.create_post(b.id, &fields("by b")).unwrap().unwrap();
        t.db.cast_vote(a.id, pb.id, VoteDirection::Cast).unwrap();
        t.db.cast_vote(b.id, pa.id, VoteDirection::Cast).unwrap();

        assert!(t.db.delete_user(a.id).unwrap());

        assert!(t.db.get_post_with_votes(pa.id).unwrap().is_none());
        assert_eq!(t.db.get_post_with_votes(pb.id).unwrap().unwrap().votes, 0);
    }

    #[test]
    fn writes_for_a_vanished_user_are_reported() {
        let t = test_support::open();
        let a = user(&t.db, "a@agora.dev");
        let b = user(&t.db, "b@agora.dev");
        let p = t.db.create_post(b.id, &fields("still here")).unwrap().unwrap();
        assert!(t.db.delete_user(a.id).unwrap());

        assert!(t.db.create_post(a.id, &fields("orphan")).unwrap().is_none());
        assert_eq!(
            t.db.cast_vote(a.id, p.id, VoteDirection::Cast).unwrap(),
            VoteOutcome::VoterMissing
        );
        assert_eq!(t.db.get_post_with_votes(p.id).unwrap().unwrap().votes, 0);
    }

    #[test]
    fn duplicate_call_id_is_reported() {
        let t = test_support::open();
        assert!(matches!(
            t.db.insert_sentiment_log("SF1", "call.wav", "positive").unwrap(),
            Inserted::Created(_)
        ));
        assert!(matches!(
            t.db.insert_sentiment_log("SF2", "call.wav", "negative").unwrap(),
            Inserted::Duplicate
        ));
    }
}
