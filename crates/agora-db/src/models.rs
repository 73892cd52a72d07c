/// Database row types. These map directly to SQLite rows and stay
/// independent of the agora-types API models.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub owner_id: i64,
    pub created_at: String,
}

/// A post joined with its vote count. `votes` is zero for posts nobody
/// has voted on.
#[derive(Debug, Clone)]
pub struct PostVotesRow {
    pub post: PostRow,
    pub votes: i64,
}

#[derive(Debug, Clone)]
pub struct SentimentLogRow {
    pub id: i64,
    pub related_to_id: String,
    pub call_id: String,
    pub overall_sentiment: String,
    pub created_at: String,
}

/// Title/content/published payload for post inserts and updates.
#[derive(Debug, Clone)]
pub struct PostFields<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub published: bool,
}

/// Result of an insert guarded by a uniqueness constraint.
#[derive(Debug)]
pub enum Inserted<T> {
    Created(T),
    Duplicate,
}

/// Result of an owner-only post mutation.
#[derive(Debug)]
pub enum PostMutation<T> {
    Done(T),
    Missing,
    NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Cast,
    Uncast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Added,
    Removed,
    AlreadyVoted,
    NotVoted,
    PostMissing,
    /// The voting user was deleted after their token was resolved.
    VoterMissing,
}
