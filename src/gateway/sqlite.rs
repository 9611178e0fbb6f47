// Local backend over SQLite: enforces the rules the client trusts the
// remote gateway to enforce.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{Connect, Gateway, GatewayError, GatewayResult};
use crate::blob::{BlobSource, ExternalBlob};
use crate::db::DbPool;
use crate::models::{
    Comment, CommentId, ImageRef, Post, PostId, PostMetadata, Principal, UserProfile, UserRole,
};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

impl ToSql for Principal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Principal {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Principal::from_text(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

// Helper to parse datetime from database string
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Hands out gateways bound to a caller over one shared pool.
#[derive(Clone)]
pub struct SqliteConnector {
    pool: DbPool,
    uploads_dir: PathBuf,
}

impl SqliteConnector {
    pub fn new(pool: DbPool, uploads_dir: PathBuf) -> Self {
        Self { pool, uploads_dir }
    }
}

impl Connect for SqliteConnector {
    fn connect(&self, caller: Option<Principal>) -> Arc<dyn Gateway> {
        Arc::new(SqliteGateway::new(
            self.pool.clone(),
            self.uploads_dir.clone(),
            caller,
        ))
    }
}

pub struct SqliteGateway {
    pool: DbPool,
    uploads_dir: PathBuf,
    caller: Option<Principal>,
}

impl SqliteGateway {
    pub fn new(pool: DbPool, uploads_dir: PathBuf, caller: Option<Principal>) -> Self {
        Self {
            pool,
            uploads_dir,
            caller,
        }
    }

    pub fn caller(&self) -> Option<&Principal> {
        self.caller.as_ref()
    }

    fn require_caller(&self, action: &str) -> GatewayResult<&Principal> {
        self.caller.as_ref().ok_or_else(|| {
            GatewayError::Unauthorized(format!("Only authenticated users can {}", action))
        })
    }

    fn require_profile(&self, conn: &Connection, action: &str) -> GatewayResult<Principal> {
        let caller = self.require_caller(action)?.clone();
        if load_profile(conn, &caller)?.is_none() {
            return Err(GatewayError::Unauthorized(format!(
                "Only users with a profile can {}",
                action
            )));
        }
        Ok(caller)
    }

    fn require_admin(&self, conn: &Connection, action: &str) -> GatewayResult<()> {
        let is_admin = match &self.caller {
            Some(caller) => load_role(conn, caller)? == UserRole::Admin,
            None => false,
        };
        if is_admin {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized(format!(
                "Only admins can {}",
                action
            )))
        }
    }

    /// Persist byte blobs under the uploads directory and return the stored
    /// references in the original order. Files already written are removed
    /// again if a later upload fails.
    async fn store_images(&self, images: Vec<ExternalBlob>) -> GatewayResult<Vec<ImageRef>> {
        let mut refs = Vec::with_capacity(images.len());
        for blob in images {
            match blob.source() {
                BlobSource::Url(url) => {
                    blob.report_progress(100);
                    refs.push(ImageRef { url: url.clone() });
                }
                BlobSource::Bytes { data, content_type } => {
                    match self.upload(&blob, data, content_type).await {
                        Ok(url) => refs.push(ImageRef { url }),
                        Err(e) => {
                            self.discard_uploads(&refs).await;
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(refs)
    }

    /// Remove files this gateway wrote for `refs`. Linked URLs are left alone.
    async fn discard_uploads(&self, refs: &[ImageRef]) {
        let uploads_dir =
            std::path::absolute(&self.uploads_dir).unwrap_or_else(|_| self.uploads_dir.clone());
        for image in refs {
            let Ok(path) = image.url.to_file_path() else {
                continue;
            };
            if !path.starts_with(&uploads_dir) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed orphaned upload {}", path.display()),
                Err(e) => tracing::warn!("Failed to remove upload {}: {}", path.display(), e),
            }
        }
    }

    fn insert_post(
        &self,
        author: &Principal,
        metadata: &PostMetadata,
        images: &[ImageRef],
    ) -> GatewayResult<PostId> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (author, description, created_at) VALUES (?1, ?2, ?3)",
            params![author, metadata.description, now_string()],
        )?;
        let id = PostId(tx.last_insert_rowid() as u64);
        for (position, image) in images.iter().enumerate() {
            tx.execute(
                "INSERT INTO post_images (post_id, position, url) VALUES (?1, ?2, ?3)",
                params![id.0 as i64, position as i64, image.url.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    async fn upload(
        &self,
        blob: &ExternalBlob,
        data: &[u8],
        content_type: &str,
    ) -> GatewayResult<Url> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;

        let extension = mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        let path = self
            .uploads_dir
            .join(format!("{}.{}", uuid::Uuid::now_v7(), extension));

        blob.report_progress(0);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0usize;
        for chunk in data.chunks(UPLOAD_CHUNK_BYTES) {
            file.write_all(chunk).await?;
            written += chunk.len();
            blob.report_progress(((written * 100) / data.len()) as u8);
        }
        file.flush().await?;
        blob.report_progress(100);

        let absolute = std::path::absolute(&path)?;
        tracing::debug!("Stored {} bytes at {}", data.len(), absolute.display());
        Url::from_file_path(&absolute).map_err(|_| {
            GatewayError::Rejected(format!("Invalid upload path: {}", absolute.display()))
        })
    }
}

fn load_profile(conn: &Connection, user: &Principal) -> GatewayResult<Option<UserProfile>> {
    let profile = conn
        .query_row(
            "SELECT username, email FROM profiles WHERE principal = ?1",
            params![user],
            |row| {
                Ok(UserProfile {
                    username: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

fn load_role(conn: &Connection, user: &Principal) -> GatewayResult<UserRole> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM roles WHERE principal = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?;
    Ok(role
        .and_then(|r| r.parse().ok())
        .unwrap_or(UserRole::Guest))
}

fn post_exists(conn: &Connection, id: PostId) -> GatewayResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id.0 as i64],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn load_post(conn: &Connection, id: PostId) -> GatewayResult<Option<Post>> {
    let row = conn
        .query_row(
            "SELECT author, description, created_at FROM posts WHERE id = ?1",
            params![id.0 as i64],
            |row| {
                Ok((
                    row.get::<_, Principal>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((author, description, created_at)) = row else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT url FROM post_images WHERE post_id = ?1 ORDER BY position")?;
    let images = stmt
        .query_map(params![id.0 as i64], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .filter_map(|url| Url::parse(&url).ok())
        .map(|url| ImageRef { url })
        .collect();

    let mut stmt = conn.prepare(
        "SELECT id FROM comments WHERE post_id = ?1 AND parent_id IS NULL ORDER BY id",
    )?;
    let comments = stmt
        .query_map(params![id.0 as i64], |row| row.get::<_, i64>(0))?
        .filter_map(|r| r.ok())
        .map(|id| CommentId(id as u64))
        .collect();

    Ok(Some(Post {
        id,
        metadata: PostMetadata {
            description,
            author: Some(author.clone()),
        },
        author,
        timestamp: parse_datetime(created_at),
        comments,
        images,
    }))
}

struct CommentRow {
    id: CommentId,
    post_id: PostId,
    author: Principal,
    content: String,
    parent_id: Option<CommentId>,
    created_at: String,
}

impl CommentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: CommentId(row.get::<_, i64>(0)? as u64),
            post_id: PostId(row.get::<_, i64>(1)? as u64),
            author: row.get(2)?,
            content: row.get(3)?,
            parent_id: row.get::<_, Option<i64>>(4)?.map(|id| CommentId(id as u64)),
            created_at: row.get(5)?,
        })
    }

    fn into_comment(self, replies: Vec<CommentId>) -> Comment {
        Comment {
            id: self.id,
            post_id: self.post_id,
            author: self.author,
            content: self.content,
            parent_id: self.parent_id,
            replies,
            timestamp: parse_datetime(self.created_at),
        }
    }
}

fn load_replies(conn: &Connection, parent: CommentId) -> GatewayResult<Vec<CommentId>> {
    let mut stmt = conn.prepare("SELECT id FROM comments WHERE parent_id = ?1 ORDER BY id")?;
    let replies = stmt
        .query_map(params![parent.0 as i64], |row| row.get::<_, i64>(0))?
        .filter_map(|r| r.ok())
        .map(|id| CommentId(id as u64))
        .collect();
    Ok(replies)
}

fn load_principals(conn: &Connection, sql: &str, user: &Principal) -> GatewayResult<Vec<Principal>> {
    let mut stmt = conn.prepare(sql)?;
    let principals = stmt
        .query_map(params![user], |row| row.get::<_, Principal>(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(principals)
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn get_all_posts(&self) -> GatewayResult<Vec<(PostId, Post)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM posts ORDER BY id")?;
        let ids: Vec<PostId> = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .map(|id| PostId(id as u64))
            .collect();

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(post) = load_post(&conn, id)? {
                posts.push((id, post));
            }
        }
        Ok(posts)
    }

    async fn get_post(&self, id: PostId) -> GatewayResult<Option<Post>> {
        let conn = self.pool.get()?;
        load_post(&conn, id)
    }

    async fn get_user_posts(&self, user: &Principal) -> GatewayResult<Vec<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM posts WHERE author = ?1 ORDER BY id")?;
        let ids: Vec<PostId> = stmt
            .query_map(params![user], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .map(|id| PostId(id as u64))
            .collect();

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(post) = load_post(&conn, id)? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    async fn create_nft_post(
        &self,
        metadata: PostMetadata,
        images: Vec<ExternalBlob>,
    ) -> GatewayResult<PostId> {
        let author = {
            let conn = self.pool.get()?;
            self.require_profile(&conn, "create posts")?
        };
        if images.is_empty() {
            return Err(GatewayError::Rejected(
                "A post needs at least one image".to_string(),
            ));
        }

        let stored = self.store_images(images).await?;
        let id = match self.insert_post(&author, &metadata, &stored) {
            Ok(id) => id,
            Err(e) => {
                self.discard_uploads(&stored).await;
                return Err(e);
            }
        };

        tracing::info!("Post {} created by {} with {} images", id, author, stored.len());
        Ok(id)
    }

    async fn delete_post(&self, id: PostId) -> GatewayResult<()> {
        let conn = self.pool.get()?;
        self.require_admin(&conn, "delete posts")?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id.0 as i64])?;
        if rows == 0 {
            return Err(GatewayError::NotFound(format!("Post {}", id)));
        }
        tracing::info!("Post {} deleted", id);
        Ok(())
    }

    async fn get_comment(&self, id: CommentId) -> GatewayResult<Option<Comment>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, post_id, author, content, parent_id, created_at
                 FROM comments WHERE id = ?1",
                params![id.0 as i64],
                CommentRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let replies = load_replies(&conn, id)?;
                Ok(Some(row.into_comment(replies)))
            }
            None => Ok(None),
        }
    }

    async fn get_post_comments(&self, post_id: PostId) -> GatewayResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, post_id, author, content, parent_id, created_at
             FROM comments WHERE post_id = ?1 ORDER BY id",
        )?;
        let rows: Vec<CommentRow> = stmt
            .query_map(params![post_id.0 as i64], CommentRow::from_row)?
            .filter_map(|r| r.ok())
            .collect();

        let mut replies: HashMap<CommentId, Vec<CommentId>> = HashMap::new();
        for row in &rows {
            if let Some(parent) = row.parent_id {
                replies.entry(parent).or_default().push(row.id);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let children = replies.remove(&row.id).unwrap_or_default();
                row.into_comment(children)
            })
            .collect())
    }

    async fn add_comment(
        &self,
        post_id: PostId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> GatewayResult<CommentId> {
        let conn = self.pool.get()?;
        let author = self.require_profile(&conn, "comment")?;

        let content = content.trim();
        if content.is_empty() {
            return Err(GatewayError::Rejected("Comment cannot be empty".to_string()));
        }
        if !post_exists(&conn, post_id)? {
            return Err(GatewayError::NotFound(format!("Post {}", post_id)));
        }
        if let Some(parent) = parent_id {
            let parent_post: Option<i64> = conn
                .query_row(
                    "SELECT post_id FROM comments WHERE id = ?1",
                    params![parent.0 as i64],
                    |row| row.get(0),
                )
                .optional()?;
            match parent_post {
                None => return Err(GatewayError::NotFound(format!("Comment {}", parent))),
                Some(p) if p as u64 != post_id.0 => {
                    return Err(GatewayError::Rejected(
                        "Parent comment belongs to a different post".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        conn.execute(
            "INSERT INTO comments (post_id, author, content, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                post_id.0 as i64,
                author,
                content,
                parent_id.map(|p| p.0 as i64),
                now_string()
            ],
        )?;
        let id = CommentId(conn.last_insert_rowid() as u64);
        tracing::info!("Comment {} added to post {} by {}", id, post_id, author);
        Ok(id)
    }

    async fn delete_comment(&self, id: CommentId) -> GatewayResult<()> {
        let conn = self.pool.get()?;
        self.require_admin(&conn, "delete comments")?;
        // Replies go with their parent via ON DELETE CASCADE
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id.0 as i64])?;
        if rows == 0 {
            return Err(GatewayError::NotFound(format!("Comment {}", id)));
        }
        tracing::info!("Comment {} deleted", id);
        Ok(())
    }

    async fn get_post_likes(&self, post_id: PostId) -> GatewayResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id.0 as i64],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn has_user_liked(&self, post_id: PostId, user: &Principal) -> GatewayResult<bool> {
        let conn = self.pool.get()?;
        let liked: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM likes WHERE post_id = ?1 AND principal = ?2",
            params![post_id.0 as i64, user],
            |row| row.get(0),
        )?;
        Ok(liked)
    }

    async fn like_post(&self, post_id: PostId) -> GatewayResult<()> {
        let caller = self.require_caller("like posts")?;
        let conn = self.pool.get()?;
        if !post_exists(&conn, post_id)? {
            return Err(GatewayError::NotFound(format!("Post {}", post_id)));
        }
        let removed = conn.execute(
            "DELETE FROM likes WHERE post_id = ?1 AND principal = ?2",
            params![post_id.0 as i64, caller],
        )?;
        if removed == 0 {
            conn.execute(
                "INSERT INTO likes (post_id, principal) VALUES (?1, ?2)",
                params![post_id.0 as i64, caller],
            )?;
        }
        Ok(())
    }

    async fn follow_user(&self, target: &Principal) -> GatewayResult<()> {
        let caller = self.require_caller("follow users")?;
        if caller == target {
            return Err(GatewayError::Rejected("Cannot follow yourself".to_string()));
        }
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO follows (follower, followee) VALUES (?1, ?2)",
            params![caller, target],
        )?;
        Ok(())
    }

    async fn unfollow_user(&self, target: &Principal) -> GatewayResult<()> {
        let caller = self.require_caller("unfollow users")?;
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM follows WHERE follower = ?1 AND followee = ?2",
            params![caller, target],
        )?;
        Ok(())
    }

    async fn is_following_user(&self, target: &Principal) -> GatewayResult<bool> {
        let Some(caller) = &self.caller else {
            return Ok(false);
        };
        let conn = self.pool.get()?;
        let following: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM follows WHERE follower = ?1 AND followee = ?2",
            params![caller, target],
            |row| row.get(0),
        )?;
        Ok(following)
    }

    async fn get_following(&self) -> GatewayResult<Vec<Principal>> {
        let Some(caller) = &self.caller else {
            return Ok(Vec::new());
        };
        let conn = self.pool.get()?;
        load_principals(
            &conn,
            "SELECT followee FROM follows WHERE follower = ?1 ORDER BY created_at, followee",
            caller,
        )
    }

    async fn get_followers(&self) -> GatewayResult<Vec<Principal>> {
        let Some(caller) = &self.caller else {
            return Ok(Vec::new());
        };
        let conn = self.pool.get()?;
        load_principals(
            &conn,
            "SELECT follower FROM follows WHERE followee = ?1 ORDER BY created_at, follower",
            caller,
        )
    }

    async fn get_caller_user_profile(&self) -> GatewayResult<Option<UserProfile>> {
        let Some(caller) = &self.caller else {
            return Ok(None);
        };
        let conn = self.pool.get()?;
        load_profile(&conn, caller)
    }

    async fn get_user_profile(&self, user: &Principal) -> GatewayResult<Option<UserProfile>> {
        let conn = self.pool.get()?;
        load_profile(&conn, user)
    }

    async fn save_caller_user_profile(&self, profile: UserProfile) -> GatewayResult<()> {
        let caller = self.require_caller("save a profile")?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO profiles (principal, username, email, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(principal) DO UPDATE SET
               username = excluded.username,
               email = excluded.email,
               updated_at = excluded.updated_at",
            params![caller, profile.username, profile.email],
        )?;

        // The first registered user administers the gallery
        let has_admin: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM roles WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        let role = if has_admin { UserRole::User } else { UserRole::Admin };
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO roles (principal, role) VALUES (?1, ?2)",
            params![caller, role.as_str()],
        )?;
        tx.commit()?;

        if inserted > 0 {
            tracing::info!("Registered {} as {}", caller, role);
        }
        Ok(())
    }

    async fn get_caller_user_role(&self) -> GatewayResult<UserRole> {
        let Some(caller) = &self.caller else {
            return Ok(UserRole::Guest);
        };
        let conn = self.pool.get()?;
        load_role(&conn, caller)
    }

    async fn is_caller_admin(&self) -> GatewayResult<bool> {
        Ok(self.get_caller_user_role().await? == UserRole::Admin)
    }

    async fn assign_caller_user_role(
        &self,
        user: &Principal,
        role: UserRole,
    ) -> GatewayResult<()> {
        let conn = self.pool.get()?;
        self.require_admin(&conn, "assign roles")?;
        conn.execute(
            "INSERT INTO roles (principal, role) VALUES (?1, ?2)
             ON CONFLICT(principal) DO UPDATE SET role = excluded.role",
            params![user, role.as_str()],
        )?;
        tracing::info!("Assigned role {} to {}", role, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{run_migrations, test_pool};

    struct Fixture {
        connector: SqliteConnector,
        _uploads: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let uploads = tempfile::tempdir().unwrap();
        Fixture {
            connector: SqliteConnector::new(pool, uploads.path().to_path_buf()),
            _uploads: uploads,
        }
    }

    async fn registered(fx: &Fixture, name: &str) -> (Principal, Arc<dyn Gateway>) {
        let who = Principal::generate();
        let gw = fx.connector.connect(Some(who.clone()));
        gw.save_caller_user_profile(UserProfile {
            username: name.to_string(),
            email: format!("{}@example.com", name),
        })
        .await
        .unwrap();
        (who, gw)
    }

    fn url_image() -> ExternalBlob {
        ExternalBlob::from_url(Url::parse("https://example.com/ape.png").unwrap())
    }

    async fn post(gw: &Arc<dyn Gateway>) -> PostId {
        gw.create_nft_post(
            PostMetadata {
                description: "gm".to_string(),
                author: None,
            },
            vec![url_image()],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn first_profile_becomes_admin() {
        let fx = fixture();
        let (_, alice) = registered(&fx, "alice").await;
        let (_, bob) = registered(&fx, "bob").await;
        assert_eq!(alice.get_caller_user_role().await.unwrap(), UserRole::Admin);
        assert_eq!(bob.get_caller_user_role().await.unwrap(), UserRole::User);
        assert!(!bob.is_caller_admin().await.unwrap());
    }

    #[tokio::test]
    async fn anonymous_caller_is_guest() {
        let fx = fixture();
        let anon = fx.connector.connect(None);
        assert_eq!(anon.get_caller_user_role().await.unwrap(), UserRole::Guest);
        assert!(anon.get_caller_user_profile().await.unwrap().is_none());
        assert!(anon.get_following().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn posting_requires_profile() {
        let fx = fixture();
        let gw = fx.connector.connect(Some(Principal::generate()));
        let err = gw
            .create_nft_post(
                PostMetadata {
                    description: "gm".to_string(),
                    author: None,
                },
                vec![url_image()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn byte_images_are_uploaded_with_progress() {
        let fx = fixture();
        let (_, gw) = registered(&fx, "alice").await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let blob = ExternalBlob::from_bytes(vec![7u8; UPLOAD_CHUNK_BYTES * 2 + 10], "image/png")
            .with_upload_progress(Arc::new(move |p| sink.lock().unwrap().push(p)));

        let id = gw
            .create_nft_post(
                PostMetadata {
                    description: "bytes".to_string(),
                    author: None,
                },
                vec![blob],
            )
            .await
            .unwrap();

        let post = gw.get_post(id).await.unwrap().unwrap();
        assert_eq!(post.images.len(), 1);
        assert_eq!(post.images[0].url.scheme(), "file");
        let path = post.images[0].url.to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap().len(), UPLOAD_CHUNK_BYTES * 2 + 10);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn failed_post_insert_removes_uploaded_files() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let fx = Fixture {
            connector: SqliteConnector::new(pool.clone(), uploads.path().to_path_buf()),
            _uploads: uploads,
        };
        let (_, gw) = registered(&fx, "alice").await;
        pool.get()
            .unwrap()
            .execute_batch("DROP TABLE post_images")
            .unwrap();

        let err = gw
            .create_nft_post(
                PostMetadata {
                    description: "gm".to_string(),
                    author: None,
                },
                vec![ExternalBlob::from_bytes(vec![1u8; 16], "image/png"), url_image()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Storage(_)));

        let left: Vec<_> = std::fs::read_dir(fx._uploads.path()).unwrap().collect();
        assert!(left.is_empty());
        let posts: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(posts, 0);
    }

    #[tokio::test]
    async fn replies_list_matches_parent_ids() {
        let fx = fixture();
        let (_, gw) = registered(&fx, "alice").await;
        let post_id = post(&gw).await;

        let root = gw.add_comment(post_id, "root".into(), None).await.unwrap();
        let a = gw.add_comment(post_id, "a".into(), Some(root)).await.unwrap();
        let b = gw.add_comment(post_id, "b".into(), Some(root)).await.unwrap();
        let a1 = gw.add_comment(post_id, "a1".into(), Some(a)).await.unwrap();

        let root_comment = gw.get_comment(root).await.unwrap().unwrap();
        assert_eq!(root_comment.replies, vec![a, b]);
        assert!(root_comment.is_top_level());

        let all = gw.get_post_comments(post_id).await.unwrap();
        assert_eq!(all.len(), 4);
        for comment in &all {
            let expected: Vec<CommentId> = all
                .iter()
                .filter(|c| c.parent_id == Some(comment.id))
                .map(|c| c.id)
                .collect();
            assert_eq!(comment.replies, expected);
        }

        let post = gw.get_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.comments, vec![root]);
        assert_eq!(gw.get_comment(a1).await.unwrap().unwrap().parent_id, Some(a));
    }

    #[tokio::test]
    async fn reply_parent_must_share_post() {
        let fx = fixture();
        let (_, gw) = registered(&fx, "alice").await;
        let first = post(&gw).await;
        let second = post(&gw).await;
        let root = gw.add_comment(first, "root".into(), None).await.unwrap();
        let err = gw
            .add_comment(second, "stray".into(), Some(root))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn deleting_comment_removes_its_subtree() {
        let fx = fixture();
        let (_, admin) = registered(&fx, "alice").await;
        let post_id = post(&admin).await;
        let root = admin.add_comment(post_id, "root".into(), None).await.unwrap();
        let child = admin
            .add_comment(post_id, "child".into(), Some(root))
            .await
            .unwrap();

        admin.delete_comment(root).await.unwrap();
        assert!(admin.get_comment(child).await.unwrap().is_none());
        assert!(admin.get_post_comments(post_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_admins_delete() {
        let fx = fixture();
        let (_, admin) = registered(&fx, "alice").await;
        let (_, bob) = registered(&fx, "bob").await;
        let post_id = post(&bob).await;

        let err = bob.delete_post(post_id).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        admin.delete_post(post_id).await.unwrap();
        assert!(admin.get_post(post_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn like_post_toggles() {
        let fx = fixture();
        let (alice, gw) = registered(&fx, "alice").await;
        let post_id = post(&gw).await;

        gw.like_post(post_id).await.unwrap();
        assert_eq!(gw.get_post_likes(post_id).await.unwrap(), 1);
        assert!(gw.has_user_liked(post_id, &alice).await.unwrap());

        gw.like_post(post_id).await.unwrap();
        assert_eq!(gw.get_post_likes(post_id).await.unwrap(), 0);
        assert!(!gw.has_user_liked(post_id, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn follow_edges_are_directed() {
        let fx = fixture();
        let (alice, alice_gw) = registered(&fx, "alice").await;
        let (bob, bob_gw) = registered(&fx, "bob").await;

        alice_gw.follow_user(&bob).await.unwrap();
        alice_gw.follow_user(&bob).await.unwrap();
        assert_eq!(alice_gw.get_following().await.unwrap(), vec![bob.clone()]);
        assert_eq!(bob_gw.get_followers().await.unwrap(), vec![alice.clone()]);
        assert!(bob_gw.get_following().await.unwrap().is_empty());
        assert!(alice_gw.is_following_user(&bob).await.unwrap());
        assert!(!bob_gw.is_following_user(&alice).await.unwrap());

        alice_gw.unfollow_user(&bob).await.unwrap();
        assert!(!alice_gw.is_following_user(&bob).await.unwrap());
    }

    #[tokio::test]
    async fn cannot_follow_self() {
        let fx = fixture();
        let (alice, gw) = registered(&fx, "alice").await;
        assert!(matches!(
            gw.follow_user(&alice).await.unwrap_err(),
            GatewayError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn admin_assigns_roles() {
        let fx = fixture();
        let (_, admin) = registered(&fx, "alice").await;
        let (bob, bob_gw) = registered(&fx, "bob").await;

        assert!(bob_gw
            .assign_caller_user_role(&bob, UserRole::Admin)
            .await
            .is_err());
        admin
            .assign_caller_user_role(&bob, UserRole::Admin)
            .await
            .unwrap();
        assert!(bob_gw.is_caller_admin().await.unwrap());
    }
}
