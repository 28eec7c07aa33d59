use axum::{extract::State, routing::delete, Json, Router};

use crate::{
    error::Result, extract::AppPath, middleware::auth::AuthUser, services::interactions, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", delete(delete_comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<()>> {
    interactions::delete_comment(&state.db.pool, &user, &id).await?;
    Ok(Json(()))
}
