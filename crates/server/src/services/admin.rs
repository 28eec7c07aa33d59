//! Dashboard statistics and moderation listings. Every operation checks the
//! caller against the permission table; project listings ignore visibility.

use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    authz::{self, Action, Resource},
    db::models::{AdminProjectRow, AdminUserRow, ProjectType, Role, Visibility},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    validation::{self, SortOrder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    TotalUsers,
    TotalProjects,
    TotalComments,
    TotalViews,
}

impl Statistic {
    fn sql(self) -> &'static str {
        match self {
            Statistic::TotalUsers => "SELECT COUNT(*) FROM users",
            Statistic::TotalProjects => "SELECT COUNT(*) FROM projects",
            Statistic::TotalComments => "SELECT COUNT(*) FROM comments",
            Statistic::TotalViews => "SELECT COALESCE(SUM(views), 0) FROM projects",
        }
    }
}

pub async fn statistic(pool: &SqlitePool, user: &AuthUser, stat: Statistic) -> Result<i64> {
    authz::authorize(user, Action::ViewStatistics, Resource::AdminDashboard, None)?;

    let value = sqlx::query_scalar::<_, i64>(stat.sql())
        .fetch_one(pool)
        .await?;
    Ok(value)
}

// Users

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserSort {
    #[default]
    Username,
    Email,
    CreatedAt,
    Role,
}

impl UserSort {
    fn column(self) -> &'static str {
        match self {
            UserSort::Username => "username",
            UserSort::Email => "email",
            UserSort::CreatedAt => "created_at",
            UserSort::Role => "role",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub order: Option<SortOrder>,
    pub sort_by: Option<UserSort>,
    pub search_text: Option<String>,
    pub role: Option<Role>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &UserQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(text) = validation::non_blank(query.search_text.as_deref()) {
        qb.push(" AND username LIKE ");
        qb.push_bind(validation::like_pattern(text));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(role) = query.role {
        qb.push(" AND role = ");
        qb.push_bind(role);
    }
}

pub async fn list_users(
    pool: &SqlitePool,
    user: &AuthUser,
    query: &UserQuery,
) -> Result<Vec<AdminUserRow>> {
    authz::authorize(user, Action::Manage, Resource::User, None)?;

    let limit = validation::limit(query.limit, 10, 100)?;
    let offset = validation::offset(query.offset)?;
    let order = query.order.unwrap_or(SortOrder::Asc);
    let sort = query.sort_by.unwrap_or_default();

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, username, email, avatar_url, role, created_at FROM users",
    );
    push_user_filters(&mut qb, query);
    qb.push(format!(
        " ORDER BY {} {}, id ASC LIMIT ",
        sort.column(),
        order.as_sql()
    ));
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build_query_as::<AdminUserRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Number of users matching the same filters as [`list_users`], ignoring paging.
pub async fn count_users(pool: &SqlitePool, user: &AuthUser, query: &UserQuery) -> Result<i64> {
    authz::authorize(user, Action::Manage, Resource::User, None)?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut qb, query);

    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

pub async fn set_role(
    pool: &SqlitePool,
    user: &AuthUser,
    username: &str,
    role: Role,
) -> Result<AdminUserRow> {
    authz::authorize(user, Action::Manage, Resource::User, None)?;

    let updated = sqlx::query_as::<_, AdminUserRow>(
        "UPDATE users SET role = ? WHERE username = ? RETURNING id, username, email, avatar_url, role, created_at",
    )
    .bind(role)
    .bind(username)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(username = %username, role = ?role, admin_id = %user.id, "role changed");
    Ok(updated)
}

// Projects

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdminProjectSort {
    #[default]
    Title,
    Username,
    Visibility,
    Type,
    UpdatedAt,
    CreatedAt,
    Views,
    CommentsCount,
    LikesCount,
}

impl AdminProjectSort {
    fn column(self) -> &'static str {
        match self {
            AdminProjectSort::Title => "p.title",
            AdminProjectSort::Username => "u.username",
            AdminProjectSort::Visibility => "p.visibility",
            AdminProjectSort::Type => "p.type",
            AdminProjectSort::UpdatedAt => "p.updated_at",
            AdminProjectSort::CreatedAt => "p.created_at",
            AdminProjectSort::Views => "p.views",
            AdminProjectSort::CommentsCount => "p.comments_count",
            AdminProjectSort::LikesCount => "p.likes_count",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProjectQuery {
    pub order: Option<SortOrder>,
    pub sort_by: Option<AdminProjectSort>,
    pub search_text: Option<String>,
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub project_type: Option<ProjectType>,
    pub visibility: Option<Visibility>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const ADMIN_PROJECT_FROM: &str = " FROM projects p JOIN users u ON u.id = p.user_id WHERE 1 = 1";

fn push_project_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &AdminProjectQuery) {
    if let Some(text) = validation::non_blank(query.search_text.as_deref()) {
        qb.push(" AND p.title LIKE ");
        qb.push_bind(validation::like_pattern(text));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(username) = validation::non_blank(query.username.as_deref()) {
        qb.push(" AND u.username = ");
        qb.push_bind(username.to_string());
    }
    if let Some(project_type) = query.project_type {
        qb.push(" AND p.type = ");
        qb.push_bind(project_type);
    }
    if let Some(visibility) = query.visibility {
        qb.push(" AND p.visibility = ");
        qb.push_bind(visibility);
    }
}

pub async fn list_projects(
    pool: &SqlitePool,
    user: &AuthUser,
    query: &AdminProjectQuery,
) -> Result<Vec<AdminProjectRow>> {
    authz::authorize(user, Action::Manage, Resource::Post, None)?;

    let limit = validation::limit(query.limit, 10, 50)?;
    let offset = validation::offset(query.offset)?;
    let order = query.order.unwrap_or(SortOrder::Asc);
    let sort = query.sort_by.unwrap_or_default();

    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT p.id, p.public_id, p.title, p.type, p.visibility, p.views,
               p.likes_count, p.comments_count, p.created_at, p.updated_at,
               p.user_id, u.username
        "#,
    );
    qb.push(ADMIN_PROJECT_FROM);
    push_project_filters(&mut qb, query);
    qb.push(format!(
        " ORDER BY {} {}, p.id ASC LIMIT ",
        sort.column(),
        order.as_sql()
    ));
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build_query_as::<AdminProjectRow>().fetch_all(pool).await?;
    Ok(rows)
}

pub async fn count_projects(
    pool: &SqlitePool,
    user: &AuthUser,
    query: &AdminProjectQuery,
) -> Result<i64> {
    authz::authorize(user, Action::Manage, Resource::Post, None)?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    qb.push(ADMIN_PROJECT_FROM);
    push_project_filters(&mut qb, query);

    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}
