//! Post creation, search and assembly of the per-viewer `PostView`.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use domains::{
    AppError, CommentRepository, MediaStorage, MediaUpload, NewPost, Post, PostChanges, PostRepository, PostView,
    Result,
};

use crate::{optional, required};

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    pub media: Option<MediaUpload>,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    media: Arc<dyn MediaStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        comments: Arc<dyn CommentRepository>,
        media: Arc<dyn MediaStorage>,
    ) -> Self {
        Self { posts, comments, media }
    }

    #[instrument(skip(self, input), fields(author = %author))]
    pub async fn create(&self, author: Uuid, input: CreatePost) -> Result<PostView> {
        let title = required("title", &input.title)?;
        let content = required("content", &input.content)?;

        // Upload first so the key can be stored with the post.
        let media_key = match input.media {
            Some(upload) => Some(self.media.upload(upload).await?),
            None => None,
        };

        let created = self
            .posts
            .create(NewPost { title, content, media_key: media_key.clone(), created_by: author })
            .await;
        let post = match created {
            Ok(post) => post,
            Err(err) => {
                if let Some(key) = media_key {
                    self.discard_media(&key).await;
                }
                return Err(err);
            }
        };

        info!(post_id = %post.id, has_media = post.media_key.is_some(), "post created");
        self.view(post, author).await
    }

    /// Every post (newest first), or those matching `query` when one is given.
    pub async fn list(&self, viewer: Uuid, query: Option<String>) -> Result<Vec<PostView>> {
        let search = query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
        let posts = self.posts.list(search).await?;

        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            views.push(self.view(post, viewer).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, viewer: Uuid, id: Uuid) -> Result<PostView> {
        let post = self.find(id).await?;
        self.view(post, viewer).await
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, viewer: Uuid, id: Uuid, changes: PostChanges) -> Result<PostView> {
        let changes = PostChanges {
            title: optional("title", changes.title)?,
            content: optional("content", changes.content)?,
        };
        if changes.is_empty() {
            return Err(AppError::validation("nothing to update"));
        }

        let existing = self.find(id).await?;
        ensure_owner(&existing, viewer)?;

        let post = self
            .posts
            .update(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("Post", id))?;
        info!(post_id = %id, "post updated");
        self.view(post, viewer).await
    }

    /// Deletes the post together with its comments and media object.
    #[instrument(skip(self))]
    pub async fn delete(&self, viewer: Uuid, id: Uuid) -> Result<()> {
        let existing = self.find(id).await?;
        ensure_owner(&existing, viewer)?;

        let removed_comments = self.comments.delete_for_post(id).await?;
        let post = self
            .posts
            .delete(id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", id))?;
        if let Some(key) = post.media_key.as_deref() {
            self.discard_media(key).await;
        }
        info!(post_id = %id, removed_comments, "post deleted");
        Ok(())
    }

    /// Attaches a fresh signed URL and the viewer's vote summary.
    pub async fn view(&self, post: Post, viewer: Uuid) -> Result<PostView> {
        let signed_url = match post.media_key.as_deref() {
            Some(key) => Some(self.media.signed_url(key).await?),
            None => None,
        };
        Ok(PostView {
            votes: post.votes.summary_for(viewer),
            post,
            signed_url,
        })
    }

    async fn find(&self, id: Uuid) -> Result<Post> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", id))
    }

    async fn discard_media(&self, key: &str) {
        if let Err(err) = self.media.remove(key).await {
            warn!(media_key = key, error = %err, "failed to remove media object");
        }
    }
}

fn ensure_owner(post: &Post, viewer: Uuid) -> Result<()> {
    if post.created_by != viewer {
        return Err(AppError::Forbidden(format!("post {} belongs to another user", post.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockCommentRepository, MockMediaStorage, MockPostRepository, NewPost};

    fn post_by(author: Uuid, media_key: Option<&str>) -> Post {
        NewPost {
            title: "Hello".into(),
            content: "World".into(),
            media_key: media_key.map(str::to_string),
            created_by: author,
        }
        .into_post(Uuid::new_v4())
    }

    fn service(posts: MockPostRepository, comments: MockCommentRepository, media: MockMediaStorage) -> PostService {
        PostService::new(Arc::new(posts), Arc::new(comments), Arc::new(media))
    }

    #[tokio::test]
    async fn create_uploads_media_and_signs_url() {
        let author = Uuid::new_v4();
        let mut media = MockMediaStorage::new();
        media.expect_upload().times(1).returning(|_| Ok("k1".to_string()));
        media
            .expect_signed_url()
            .returning(|key| Ok(format!("https://media.test/{key}?sig=1")));
        let mut posts = MockPostRepository::new();
        posts
            .expect_create()
            .withf(|p| p.media_key.as_deref() == Some("k1") && p.title == "Hello")
            .returning(|p| Ok(p.into_post(Uuid::new_v4())));

        let view = service(posts, MockCommentRepository::new(), media)
            .create(
                author,
                CreatePost {
                    title: " Hello ".into(),
                    content: "World".into(),
                    media: Some(MediaUpload { data: bytes::Bytes::from_static(b"png"), content_type: mime::IMAGE_PNG }),
                },
            )
            .await
            .unwrap();

        assert_eq!(view.signed_url.as_deref(), Some("https://media.test/k1?sig=1"));
        assert_eq!(view.votes.upvote_count, 0);
    }

    #[tokio::test]
    async fn create_requires_title() {
        let err = service(MockPostRepository::new(), MockCommentRepository::new(), MockMediaStorage::new())
            .create(Uuid::new_v4(), CreatePost { title: "  ".into(), content: "c".into(), media: None })
            .await
            .unwrap_err();
        assert_eq!(err, AppError::validation("title is required"));
    }

    #[tokio::test]
    async fn create_discards_upload_when_store_fails() {
        let mut media = MockMediaStorage::new();
        media.expect_upload().returning(|_| Ok("k1".to_string()));
        media.expect_remove().times(1).returning(|_| Ok(()));
        let mut posts = MockPostRepository::new();
        posts
            .expect_create()
            .returning(|_| Err(AppError::persistence("disk full")));

        let err = service(posts, MockCommentRepository::new(), media)
            .create(
                Uuid::new_v4(),
                CreatePost {
                    title: "t".into(),
                    content: "c".into(),
                    media: Some(MediaUpload { data: bytes::Bytes::new(), content_type: mime::IMAGE_JPEG }),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn list_drops_blank_query() {
        let mut posts = MockPostRepository::new();
        posts
            .expect_list()
            .withf(|search| search.is_none())
            .returning(|_| Ok(vec![]));
        let views = service(posts, MockCommentRepository::new(), MockMediaStorage::new())
            .list(Uuid::new_v4(), Some("   ".into()))
            .await
            .unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn get_missing_post_is_not_found() {
        let mut posts = MockPostRepository::new();
        posts.expect_find_by_id().returning(|_| Ok(None));
        let err = service(posts, MockCommentRepository::new(), MockMediaStorage::new())
            .get(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(kind, _) if kind == "Post"));
    }

    #[tokio::test]
    async fn update_by_other_user_is_forbidden() {
        let post = post_by(Uuid::new_v4(), None);
        let id = post.id;
        let mut posts = MockPostRepository::new();
        posts.expect_find_by_id().returning(move |_| Ok(Some(post.clone())));
        posts.expect_update().never();

        let err = service(posts, MockCommentRepository::new(), MockMediaStorage::new())
            .update(Uuid::new_v4(), id, PostChanges { title: Some("new".into()), content: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_without_fields_is_rejected() {
        let err = service(MockPostRepository::new(), MockCommentRepository::new(), MockMediaStorage::new())
            .update(Uuid::new_v4(), Uuid::new_v4(), PostChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn delete_cascades_comments_and_media() {
        let author = Uuid::new_v4();
        let post = post_by(author, Some("k9"));
        let id = post.id;
        let stored = post.clone();
        let mut posts = MockPostRepository::new();
        posts.expect_find_by_id().returning(move |_| Ok(Some(stored.clone())));
        posts.expect_delete().returning(move |_| Ok(Some(post.clone())));
        let mut comments = MockCommentRepository::new();
        comments
            .expect_delete_for_post()
            .withf(move |post_id| *post_id == id)
            .times(1)
            .returning(|_| Ok(3));
        let mut media = MockMediaStorage::new();
        // cleanup failures are logged, not surfaced
        media
            .expect_remove()
            .times(1)
            .returning(|_| Err(AppError::upstream("bucket gone")));

        service(posts, comments, media).delete(author, id).await.unwrap();
    }
}
