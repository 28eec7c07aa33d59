use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{AdminProjectRow, AdminUserRow, Role},
    error::Result,
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::AuthUser,
    services::admin::{self, AdminProjectQuery, Statistic, UserQuery},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats/total-users", get(total_users))
        .route("/stats/total-projects", get(total_projects))
        .route("/stats/total-comments", get(total_comments))
        .route("/stats/total-views", get(total_views))
        .route("/users", get(list_users))
        .route("/users/total", get(count_users))
        .route("/users/:username/role", put(set_role))
        .route("/projects", get(list_projects))
        .route("/projects/total", get(count_projects))
}

#[derive(Debug, Serialize)]
pub struct TotalResponse {
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

async fn stat(state: &AppState, user: &AuthUser, stat: Statistic) -> Result<Json<TotalResponse>> {
    let total = admin::statistic(&state.db.pool, user, stat).await?;
    Ok(Json(TotalResponse { total }))
}

async fn total_users(State(state): State<AppState>, user: AuthUser) -> Result<Json<TotalResponse>> {
    stat(&state, &user, Statistic::TotalUsers).await
}

async fn total_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TotalResponse>> {
    stat(&state, &user, Statistic::TotalProjects).await
}

async fn total_comments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TotalResponse>> {
    stat(&state, &user, Statistic::TotalComments).await
}

async fn total_views(State(state): State<AppState>, user: AuthUser) -> Result<Json<TotalResponse>> {
    stat(&state, &user, Statistic::TotalViews).await
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<UserQuery>,
) -> Result<Json<Vec<AdminUserRow>>> {
    let users = admin::list_users(&state.db.pool, &user, &query).await?;
    Ok(Json(users))
}

async fn count_users(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<UserQuery>,
) -> Result<Json<TotalResponse>> {
    let total = admin::count_users(&state.db.pool, &user, &query).await?;
    Ok(Json(TotalResponse { total }))
}

async fn set_role(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(username): AppPath<String>,
    AppJson(body): AppJson<SetRoleRequest>,
) -> Result<Json<AdminUserRow>> {
    let updated = admin::set_role(&state.db.pool, &user, &username, body.role).await?;
    Ok(Json(updated))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<AdminProjectQuery>,
) -> Result<Json<Vec<AdminProjectRow>>> {
    let projects = admin::list_projects(&state.db.pool, &user, &query).await?;
    Ok(Json(projects))
}

async fn count_projects(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<AdminProjectQuery>,
) -> Result<Json<TotalResponse>> {
    let total = admin::count_projects(&state.db.pool, &user, &query).await?;
    Ok(Json(TotalResponse { total }))
}
