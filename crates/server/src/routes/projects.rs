use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{CommentData, FeaturedProjects, ProjectData},
    error::Result,
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::AuthUser,
    services::{
        interactions::{self, LikeState},
        projects::{self, CreateProject, CreatedProject, ProjectQuery, UpdateProject},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/featured", get(featured_projects))
        .route(
            "/:public_id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:public_id/views", post(increment_views))
        .route("/:public_id/like-status", get(like_status))
        .route("/:public_id/like", post(like_project).delete(unlike_project))
        .route(
            "/:public_id/comments",
            get(list_comments).post(create_comment),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProjectQuery {
    pub include_files: Option<bool>,
    pub include_comments: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    pub views: i64,
}

#[derive(Debug, Serialize)]
pub struct LikeStatusResponse {
    pub liked: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

async fn list_projects(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    AppQuery(query): AppQuery<ProjectQuery>,
) -> Result<Json<Vec<ProjectData>>> {
    let projects = projects::list_projects(&state.db.pool, user.as_ref(), &query).await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(body): AppJson<CreateProject>,
) -> Result<Json<CreatedProject>> {
    let created = projects::create_project(&state.db.pool, &user, body).await?;
    state.featured.invalidate().await;
    Ok(Json(created))
}

async fn featured_projects(State(state): State<AppState>) -> Result<Json<FeaturedProjects>> {
    let featured = state.featured.get_or_load(&state.db.pool).await?;
    Ok(Json(featured))
}

async fn get_project(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    AppPath(public_id): AppPath<String>,
    AppQuery(query): AppQuery<GetProjectQuery>,
) -> Result<Json<ProjectData>> {
    let project = projects::get_project(
        &state.db.pool,
        user.as_ref(),
        &public_id,
        query.include_files.unwrap_or(true),
        query.include_comments.unwrap_or(true),
    )
    .await?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
    AppJson(body): AppJson<UpdateProject>,
) -> Result<Json<ProjectData>> {
    projects::update_project(&state.db.pool, &user, &public_id, body).await?;
    state.featured.invalidate().await;

    let project =
        projects::get_project(&state.db.pool, Some(&user), &public_id, true, false).await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<()>> {
    projects::delete_project(&state.db.pool, &user, &public_id).await?;
    state.featured.invalidate().await;
    Ok(Json(()))
}

async fn increment_views(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<ViewsResponse>> {
    let views = projects::increment_views(&state.db.pool, user.as_ref(), &public_id).await?;
    Ok(Json(ViewsResponse { views }))
}

async fn like_status(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<LikeStatusResponse>> {
    let liked = interactions::like_status(&state.db.pool, &user, &public_id).await?;
    Ok(Json(LikeStatusResponse { liked }))
}

async fn like_project(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<LikeState>> {
    let like = interactions::like_project(&state.db.pool, &user, &public_id).await?;
    Ok(Json(like))
}

async fn unlike_project(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<LikeState>> {
    let like = interactions::unlike_project(&state.db.pool, &user, &public_id).await?;
    Ok(Json(like))
}

async fn list_comments(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    AppPath(public_id): AppPath<String>,
) -> Result<Json<Vec<CommentData>>> {
    let comments = interactions::list_comments(&state.db.pool, user.as_ref(), &public_id).await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(public_id): AppPath<String>,
    AppJson(body): AppJson<CreateCommentRequest>,
) -> Result<Json<CommentData>> {
    let comment =
        interactions::create_comment(&state.db.pool, &user, &public_id, &body.content).await?;
    Ok(Json(comment))
}
