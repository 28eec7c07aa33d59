use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    db::models::{Author, UserProfile},
    error::Result,
    extract::{AppPath, AppQuery},
    middleware::auth::AuthUser,
    services::{
        interactions,
        users::{self, PageQuery},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:username", get(get_profile))
        .route("/:username/follow-status", get(follow_status))
        .route("/:username/follow", post(follow_user).delete(unfollow_user))
        .route("/:username/followers", get(list_followers))
        .route("/:username/following", get(list_following))
}

#[derive(Debug, Serialize)]
pub struct FollowStatusResponse {
    pub following: bool,
}

async fn get_profile(
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> Result<Json<UserProfile>> {
    let profile = users::get_profile(&state.db.pool, &username).await?;
    Ok(Json(profile))
}

async fn follow_status(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(username): AppPath<String>,
) -> Result<Json<FollowStatusResponse>> {
    let following = interactions::follow_status(&state.db.pool, &user, &username).await?;
    Ok(Json(FollowStatusResponse { following }))
}

async fn follow_user(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(username): AppPath<String>,
) -> Result<Json<FollowStatusResponse>> {
    interactions::follow_user(&state.db.pool, &user, &username).await?;
    Ok(Json(FollowStatusResponse { following: true }))
}

async fn unfollow_user(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(username): AppPath<String>,
) -> Result<Json<FollowStatusResponse>> {
    interactions::unfollow_user(&state.db.pool, &user, &username).await?;
    Ok(Json(FollowStatusResponse { following: false }))
}

async fn list_followers(
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<Json<Vec<Author>>> {
    let followers = users::list_followers(&state.db.pool, &username, &page).await?;
    Ok(Json(followers))
}

async fn list_following(
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<Json<Vec<Author>>> {
    let following = users::list_following(&state.db.pool, &username, &page).await?;
    Ok(Json(following))
}
