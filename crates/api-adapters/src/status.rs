use domains::AppError;

/// HTTP status code for each error kind.
pub fn status_for(err: &AppError) -> u16 {
    match err {
        AppError::ValidationError(_)
        | AppError::AlreadyVoted(_)
        | AppError::Conflict(_)
        | AppError::PersistenceError(_) => 400,
        AppError::Unauthorized(_) => 401,
        AppError::Forbidden(_) => 403,
        AppError::NotFound(..) => 404,
        AppError::UpstreamError(_) => 502,
    }
}
