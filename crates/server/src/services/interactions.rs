//! Likes, comments and follows.
//!
//! Counter updates share a transaction with the row they count, and the
//! duplicate check is the insert or delete itself, so concurrent requests
//! from the same user cannot push a counter out of step with its rows.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    authz::{self, Action, Resource},
    db::models::{Author, CommentData, CommentWithAuthor},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::projects,
    validation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i64,
}

// Likes

pub async fn like_project(pool: &SqlitePool, user: &AuthUser, public_id: &str) -> Result<LikeState> {
    authz::authorize(user, Action::Like, Resource::Post, None)?;
    let project = projects::find_visible(pool, Some(user), public_id).await?.project;

    let likes_count = add_like(pool, &project.id, &user.id).await?;

    tracing::debug!(public_id = %public_id, user_id = %user.id, "project liked");
    Ok(LikeState {
        liked: true,
        likes_count,
    })
}

/// A row referencing a project failed its foreign key: the project was
/// deleted after it was looked up.
fn project_gone(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::NotFound("Project not found".to_string())
        }
        other => other.into(),
    }
}

async fn add_like(pool: &SqlitePool, project_id: &str, user_id: &str) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO project_likes (project_id, user_id, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(project_gone)?
    .rows_affected();

    if inserted == 0 {
        return Err(AppError::Conflict("Already liked this project".to_string()));
    }

    let likes_count = sqlx::query_scalar::<_, i64>(
        "UPDATE projects SET likes_count = likes_count + 1 WHERE id = ? RETURNING likes_count",
    )
    .bind(project_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(likes_count)
}

pub async fn unlike_project(
    pool: &SqlitePool,
    user: &AuthUser,
    public_id: &str,
) -> Result<LikeState> {
    authz::authorize(user, Action::Like, Resource::Post, None)?;
    let project = projects::find_visible(pool, Some(user), public_id).await?.project;

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM project_likes WHERE project_id = ? AND user_id = ?")
        .bind(&project.id)
        .bind(&user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::Conflict(
            "You haven't liked this project".to_string(),
        ));
    }

    let likes_count = sqlx::query_scalar::<_, i64>(
        "UPDATE projects SET likes_count = likes_count - 1 WHERE id = ? RETURNING likes_count",
    )
    .bind(&project.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(public_id = %public_id, user_id = %user.id, "project unliked");
    Ok(LikeState {
        liked: false,
        likes_count,
    })
}

pub async fn like_status(pool: &SqlitePool, user: &AuthUser, public_id: &str) -> Result<bool> {
    let project = projects::find_visible(pool, Some(user), public_id).await?.project;

    let liked = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM project_likes WHERE project_id = ? AND user_id = ?)",
    )
    .bind(&project.id)
    .bind(&user.id)
    .fetch_one(pool)
    .await?;

    Ok(liked)
}

// Comments

/// Comments of a project, newest first, flagged for the viewer.
pub(crate) async fn load_comments(
    pool: &SqlitePool,
    project_id: &str,
    viewer_id: Option<&str>,
) -> Result<Vec<CommentData>> {
    let rows = sqlx::query_as::<_, CommentWithAuthor>(
        r#"
        SELECT c.id, c.user_id, c.content, c.created_at, u.username, u.avatar_url
        FROM comments c
        JOIN users u ON c.user_id = u.id
        WHERE c.project_id = ?
        ORDER BY c.created_at DESC, c.id ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CommentData::from_row(row, viewer_id))
        .collect())
}

pub async fn list_comments(
    pool: &SqlitePool,
    viewer: Option<&AuthUser>,
    public_id: &str,
) -> Result<Vec<CommentData>> {
    let project = projects::find_visible(pool, viewer, public_id).await?.project;
    load_comments(pool, &project.id, viewer.map(|v| v.id.as_str())).await
}

pub async fn create_comment(
    pool: &SqlitePool,
    user: &AuthUser,
    public_id: &str,
    content: &str,
) -> Result<CommentData> {
    validation::comment(content)?;
    authz::authorize(user, Action::Create, Resource::Comment, None)?;
    let project = projects::find_visible(pool, Some(user), public_id).await?.project;

    let comment = add_comment(pool, &project.id, user, content.trim()).await?;

    tracing::debug!(public_id = %public_id, user_id = %user.id, "comment created");
    Ok(comment)
}

async fn add_comment(
    pool: &SqlitePool,
    project_id: &str,
    user: &AuthUser,
    content: &str,
) -> Result<CommentData> {
    let comment_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO comments (id, project_id, user_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&comment_id)
    .bind(project_id)
    .bind(&user.id)
    .bind(content)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(project_gone)?;

    sqlx::query("UPDATE projects SET comments_count = comments_count + 1 WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(CommentData {
        id: comment_id,
        is_owner: true,
        user: Author {
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
        },
        content: content.to_string(),
        created_at: now,
    })
}

pub async fn delete_comment(pool: &SqlitePool, user: &AuthUser, comment_id: &str) -> Result<()> {
    validation::comment_id(comment_id)?;

    let (project_id, author_id) = sqlx::query_as::<_, (String, String)>(
        "SELECT project_id, user_id FROM comments WHERE id = ?",
    )
    .bind(comment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    authz::authorize(user, Action::Delete, Resource::Comment, Some(&author_id))?;

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(comment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    // Lost a race with another delete
    if deleted == 0 {
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    sqlx::query("UPDATE projects SET comments_count = comments_count - 1 WHERE id = ?")
        .bind(&project_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(comment_id = %comment_id, user_id = %user.id, "comment deleted");
    Ok(())
}

// Follows

async fn user_id_by_username(pool: &SqlitePool, username: &str) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn follow_user(pool: &SqlitePool, user: &AuthUser, username: &str) -> Result<()> {
    authz::authorize(user, Action::Follow, Resource::User, None)?;
    let following_id = user_id_by_username(pool, username).await?;

    if following_id == user.id {
        return Err(AppError::Validation("Cannot follow yourself".to_string()));
    }

    let inserted = sqlx::query(
        "INSERT INTO user_follows (follower_id, following_id, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(&user.id)
    .bind(&following_id)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Err(AppError::Conflict("Already following this user".to_string()));
    }

    tracing::debug!(follower = %user.id, following = %following_id, "user followed");
    Ok(())
}

pub async fn unfollow_user(pool: &SqlitePool, user: &AuthUser, username: &str) -> Result<()> {
    authz::authorize(user, Action::Follow, Resource::User, None)?;
    let following_id = user_id_by_username(pool, username).await?;

    let deleted =
        sqlx::query("DELETE FROM user_follows WHERE follower_id = ? AND following_id = ?")
            .bind(&user.id)
            .bind(&following_id)
            .execute(pool)
            .await?
            .rows_affected();

    if deleted == 0 {
        return Err(AppError::Conflict("Not following this user".to_string()));
    }

    tracing::debug!(follower = %user.id, following = %following_id, "user unfollowed");
    Ok(())
}

pub async fn follow_status(pool: &SqlitePool, user: &AuthUser, username: &str) -> Result<bool> {
    let following_id = user_id_by_username(pool, username).await?;

    if following_id == user.id {
        return Err(AppError::Validation("Cannot follow yourself".to_string()));
    }

    let following = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM user_follows WHERE follower_id = ? AND following_id = ?)",
    )
    .bind(&user.id)
    .bind(&following_id)
    .fetch_one(pool)
    .await?;

    Ok(following)
}
