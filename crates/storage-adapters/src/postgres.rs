//! # Postgres stores
//!
//! Maps the relational model onto the domain models with runtime `sqlx`
//! queries. Voter sets are `UUID[]` columns updated in a single conditional
//! `UPDATE`, so concurrent votes never overwrite each other. Reply lists are
//! derived from `parent_id`, so linking a reply is the insert itself.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use domains::search::post_matches;
use domains::{
    AppError, Comment, CommentChanges, CommentFilter, CommentRepository, NewComment, NewPost, NewUser, Post,
    PostChanges, PostRepository, Result, User, UserRepository, VoteDirection, VoterSets,
};

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(db_err)?;
    info!(max_connections, "connected to postgres");
    Ok(pool)
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(AppError::persistence)
}

fn db_err(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::Conflict(match db.constraint() {
                Some("users_username_key") => "username is already taken".into(),
                Some("users_email_key") => "email is already registered".into(),
                _ => db.message().to_string(),
            });
        }
        if db.is_foreign_key_violation() {
            return AppError::validation(db.message().to_string());
        }
    }
    AppError::persistence(err)
}

/// Columns written / cleared for a vote in `direction`.
fn vote_columns(direction: VoteDirection) -> (&'static str, &'static str) {
    match direction {
        VoteDirection::Up => ("upvoters", "downvoters"),
        VoteDirection::Down => ("downvoters", "upvoters"),
    }
}

fn voter_sets(row: &PgRow) -> std::result::Result<VoterSets, sqlx::Error> {
    Ok(VoterSets {
        upvoters: row.try_get("upvoters")?,
        downvoters: row.try_get("downvoters")?,
    })
}

// ── Users ───────────────────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, username, email, password_hash, password_salt, session_token, created_at";

fn user_from_row(row: &PgRow) -> std::result::Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        password_salt: row.try_get("password_salt")?,
        session_token: row.try_get("session_token")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, password_hash, password_salt) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.password_salt)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        user_from_row(&row).map_err(db_err)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose().map_err(db_err)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower($1) OR username = $1 \
             ORDER BY (email = lower($1)) DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(login)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose().map_err(db_err)
    }

    async fn set_session_token(&self, id: Uuid, token: Option<String>) -> Result<()> {
        let done = sqlx::query("UPDATE users SET session_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(AppError::not_found("User", id));
        }
        Ok(())
    }
}

// ── Posts ───────────────────────────────────────────────────────────────────

const POST_COLUMNS: &str = "id, title, content, media_key, created_by, created_at, upvoters, downvoters";

fn post_from_row(row: &PgRow) -> std::result::Result<Post, sqlx::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        media_key: row.try_get("media_key")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        votes: voter_sets(row)?,
    })
}

pub struct PostgresPostRepository {
    pool: PgPool,
}

impl PostgresPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PostgresPostRepository {
    async fn create(&self, post: NewPost) -> Result<Post> {
        let sql = format!(
            "INSERT INTO posts (id, title, content, media_key, created_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.media_key)
            .bind(post.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        post_from_row(&row).map_err(db_err)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(post_from_row).transpose().map_err(db_err)
    }

    /// Search runs the shared fuzzy matcher over the ordered rows, so both
    /// stores return the same hits for the same query.
    async fn list(&self, search: Option<String>) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(db_err)?;
        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let post = post_from_row(row).map_err(db_err)?;
            if search.as_deref().map_or(true, |q| post_matches(&post, q)) {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>> {
        let sql = format!(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content) \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(post_from_row).transpose().map_err(db_err)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!("DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(post_from_row).transpose().map_err(db_err)
    }

    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Post> {
        let (target, opposite) = vote_columns(direction);
        let sql = format!(
            "UPDATE posts SET {target} = array_append({target}, $2), {opposite} = array_remove({opposite}, $2) \
             WHERE id = $1 AND NOT ($2 = ANY({target})) RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(voter)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => post_from_row(&row).map_err(db_err),
            None => Err(vote_rejection(&self.pool, "posts", "Post", id, voter, direction).await),
        }
    }
}

/// Tells a missing row apart from a duplicate vote after a no-op `UPDATE`.
async fn vote_rejection(
    pool: &PgPool,
    table: &str,
    kind: &str,
    id: Uuid,
    voter: Uuid,
    direction: VoteDirection,
) -> AppError {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    match sqlx::query_scalar::<_, bool>(&sql).bind(id).fetch_one(pool).await {
        Ok(true) => AppError::AlreadyVoted(format!("user {voter} has already voted {direction}")),
        Ok(false) => AppError::not_found(kind, id),
        Err(err) => db_err(err),
    }
}

// ── Comments ────────────────────────────────────────────────────────────────

/// Selects comment rows from `source` (a table or CTE aliased `c`) with the
/// reply ids aggregated from `parent_id`.
fn select_comments_from(source: &str) -> String {
    format!(
        "SELECT c.id, c.body, c.post_id, c.parent_id, c.created_by, c.created_at, c.upvoters, c.downvoters, \
         ARRAY(SELECT r.id FROM comments r WHERE r.parent_id = c.id ORDER BY r.created_at, r.id) AS replies \
         FROM {source} c"
    )
}

fn comment_from_row(row: &PgRow) -> std::result::Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        body: row.try_get("body")?,
        post_id: row.try_get("post_id")?,
        parent_id: row.try_get("parent_id")?,
        replies: row.try_get("replies")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        votes: voter_sets(row)?,
    })
}

pub struct PostgresCommentRepository {
    pool: PgPool,
}

impl PostgresCommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PostgresCommentRepository {
    /// The parent row is locked for the duration of the insert so it cannot
    /// disappear between the check and the link.
    async fn create(&self, comment: NewComment) -> Result<Comment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(parent_id) = comment.parent_id {
            let parent_post: Option<Uuid> = sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1 FOR UPDATE")
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            match parent_post {
                None => return Err(AppError::not_found("Comment", parent_id)),
                Some(post_id) if post_id != comment.post_id => {
                    return Err(AppError::validation(format!(
                        "parent comment {parent_id} belongs to a different post"
                    )))
                }
                Some(_) => {}
            }
        }

        let row = sqlx::query(
            "INSERT INTO comments (id, body, post_id, parent_id, created_by) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, body, post_id, parent_id, created_by, created_at, upvoters, downvoters, \
             ARRAY[]::uuid[] AS replies",
        )
        .bind(Uuid::new_v4())
        .bind(&comment.body)
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        comment_from_row(&row).map_err(db_err)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE c.id = $1", select_comments_from("comments"));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(comment_from_row).transpose().map_err(db_err)
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Comment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE c.id = ANY($1) ORDER BY array_position($1, c.id)",
            select_comments_from("comments")
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect::<std::result::Result<_, _>>().map_err(db_err)
    }

    async fn list(&self, filter: CommentFilter) -> Result<Vec<Comment>> {
        let base = select_comments_from("comments");
        let order = "ORDER BY c.created_at, c.id";
        let rows = match filter {
            CommentFilter::All => sqlx::query(&format!("{base} {order}")).fetch_all(&self.pool).await,
            CommentFilter::RootsOf(post_id) => {
                sqlx::query(&format!("{base} WHERE c.post_id = $1 AND c.parent_id IS NULL {order}"))
                    .bind(post_id)
                    .fetch_all(&self.pool)
                    .await
            }
            CommentFilter::ChildrenOf(parent_id) => {
                sqlx::query(&format!("{base} WHERE c.parent_id = $1 {order}"))
                    .bind(parent_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect::<std::result::Result<_, _>>().map_err(db_err)
    }

    async fn update(&self, id: Uuid, changes: CommentChanges) -> Result<Option<Comment>> {
        let sql = format!(
            "WITH changed AS (UPDATE comments SET body = COALESCE($2, body) WHERE id = $1 RETURNING *) {}",
            select_comments_from("changed")
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(changes.body)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(comment_from_row).transpose().map_err(db_err)
    }

    async fn delete(&self, id: Uuid) -> Result<usize> {
        let done = sqlx::query(
            "WITH RECURSIVE subtree AS ( \
                 SELECT id FROM comments WHERE id = $1 \
                 UNION ALL \
                 SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id \
             ) \
             DELETE FROM comments WHERE id IN (SELECT id FROM subtree)",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected() as usize)
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<usize> {
        let done = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected() as usize)
    }

    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Comment> {
        let (target, opposite) = vote_columns(direction);
        let sql = format!(
            "WITH voted AS ( \
                 UPDATE comments SET {target} = array_append({target}, $2), {opposite} = array_remove({opposite}, $2) \
                 WHERE id = $1 AND NOT ($2 = ANY({target})) RETURNING * \
             ) {}",
            select_comments_from("voted")
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(voter)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => comment_from_row(&row).map_err(db_err),
            None => Err(vote_rejection(&self.pool, "comments", "Comment", id, voter, direction).await),
        }
    }
}
