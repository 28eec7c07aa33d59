use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    db::models::{Author, UserProfile},
    error::{AppError, Result},
    validation,
};

const PAGE_DEFAULT: i64 = 10;
const PAGE_MAX: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn get_profile(pool: &SqlitePool, username: &str) -> Result<UserProfile> {
    // Totals span every project the user owns, private ones included
    let profile = sqlx::query_as::<_, (String, Option<String>, i64, i64, i64)>(
        r#"
        SELECT
            u.username,
            u.avatar_url,
            (SELECT COUNT(*) FROM project_likes l
                JOIN projects p ON p.id = l.project_id
                WHERE p.user_id = u.id),
            (SELECT COUNT(*) FROM user_follows f WHERE f.following_id = u.id),
            (SELECT COALESCE(SUM(p.views), 0) FROM projects p WHERE p.user_id = u.id)
        FROM users u
        WHERE u.username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (username, avatar_url, total_likes, total_follows, total_views) = profile;
    Ok(UserProfile {
        username,
        avatar_url,
        total_likes,
        total_follows,
        total_views,
    })
}

#[derive(Clone, Copy)]
enum Direction {
    Followers,
    Following,
}

async fn list_relations(
    pool: &SqlitePool,
    username: &str,
    page: &PageQuery,
    direction: Direction,
) -> Result<Vec<Author>> {
    let limit = validation::limit(page.limit, PAGE_DEFAULT, PAGE_MAX)?;
    let offset = validation::offset(page.offset)?;

    let user_id = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    // (column matching the user, column naming the listed side)
    let (anchor, listed) = match direction {
        Direction::Followers => ("following_id", "follower_id"),
        Direction::Following => ("follower_id", "following_id"),
    };

    let sql = format!(
        r#"
        SELECT u.username, u.avatar_url
        FROM user_follows f
        JOIN users u ON u.id = f.{listed}
        WHERE f.{anchor} = ?
        ORDER BY f.created_at DESC, u.username ASC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query_as::<_, Author>(&sql)
        .bind(&user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn list_followers(
    pool: &SqlitePool,
    username: &str,
    page: &PageQuery,
) -> Result<Vec<Author>> {
    list_relations(pool, username, page, Direction::Followers).await
}

pub async fn list_following(
    pool: &SqlitePool,
    username: &str,
    page: &PageQuery,
) -> Result<Vec<Author>> {
    list_relations(pool, username, page, Direction::Following).await
}
