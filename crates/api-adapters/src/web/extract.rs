//! Extractors that turn every rejection into an envelope `ValidationError`
//! instead of axum's plain-text default.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::Json;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use domains::{AppError, MediaUpload, User};
use services::CreatePost;

use super::{ApiError, AppState};

pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// The `{id}` segment of a route, parsed as a UUID.
pub struct EntityId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for EntityId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| AppError::validation(rejection.body_text()))?;
        let id = raw.parse().map_err(|_| AppError::validation(format!("invalid id {raw:?}")))?;
        Ok(Self(id))
    }
}

/// The caller, resolved from `Authorization: Bearer <token>`.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let user = state.auth.authenticate(token).await?;
        Ok(Self(user))
    }
}

#[derive(Debug, Deserialize)]
struct CreatePostBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// A new post from either a JSON body or a multipart form with `title`,
/// `content` and an optional `file` part.
pub struct CreatePostForm(pub CreatePost);

impl<S: Send + Sync> FromRequest<S> for CreatePostForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));
        if !multipart {
            let JsonBody(body) = JsonBody::<CreatePostBody>::from_request(req, state).await?;
            return Ok(Self(CreatePost { title: body.title, content: body.content, media: None }));
        }

        let mut form = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        let mut post = CreatePost { title: String::new(), content: String::new(), media: None };
        while let Some(field) = form.next_field().await.map_err(|err| AppError::validation(err.body_text()))? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("title") => post.title = field.text().await.map_err(|err| AppError::validation(err.body_text()))?,
                Some("content") => {
                    post.content = field.text().await.map_err(|err| AppError::validation(err.body_text()))?
                }
                Some("file") => {
                    let content_type = upload_type(field.content_type(), field.file_name());
                    let data = field.bytes().await.map_err(|err| AppError::validation(err.body_text()))?;
                    if !data.is_empty() {
                        post.media = Some(MediaUpload { data, content_type });
                    }
                }
                _ => {}
            }
        }
        Ok(Self(post))
    }
}

/// Declared part type, then a guess from the file name.
fn upload_type(declared: Option<&str>, file_name: Option<&str>) -> Mime {
    declared
        .and_then(|value| value.parse::<Mime>().ok())
        .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM)
        .or_else(|| file_name.and_then(|name| mime_guess::from_path(name).first()))
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_type_prefers_the_declared_type() {
        assert_eq!(upload_type(Some("image/png"), Some("a.jpg")), mime::IMAGE_PNG);
        assert_eq!(upload_type(Some("application/octet-stream"), Some("a.jpg")), mime::IMAGE_JPEG);
        assert_eq!(upload_type(None, None), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(upload_type(Some("not a mime"), Some("clip.mp4")).essence_str(), "video/mp4");
    }
}
