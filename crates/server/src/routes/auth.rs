use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{Role, User},
    error::{AppError, Result},
    extract::AppJson,
    middleware::auth::{create_token, AuthUser},
    validation, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    // An unparsable stored hash fails like a wrong password
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn session(state: &AppState, user: AuthUser) -> Result<AuthResponse> {
    let token = create_token(&user, &state.config.jwt_secret, state.config.token_ttl_days)?;
    Ok(AuthResponse { token, user })
}

async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    let email = body.email.trim().to_lowercase();
    let username = body.username.trim().to_string();

    validation::email(&email)?;
    validation::username(&username)?;
    validation::password(&body.password)?;

    let (email_taken, username_taken) = sqlx::query_as::<_, (bool, bool)>(
        r#"
        SELECT
            EXISTS(SELECT 1 FROM users WHERE email = ?),
            EXISTS(SELECT 1 FROM users WHERE username = ?)
        "#,
    )
    .bind(&email)
    .bind(&username)
    .fetch_one(&state.db.pool)
    .await?;

    if email_taken {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }
    if username_taken {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    let password_hash = hash_password(&body.password)?;
    let user_id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::User)
    .bind(Utc::now())
    .execute(&state.db.pool)
    .await
    .map_err(|e| match e {
        // Lost a race with a concurrent registration
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Email or username already exists".to_string())
        }
        other => other.into(),
    })?;

    tracing::info!(user_id = %user_id, username = %username, "user registered");

    let user = AuthUser {
        id: user_id,
        username,
        role: Role::User,
        avatar_url: None,
    };
    Ok(Json(session(&state, user)?))
}

async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(body.email.trim().to_lowercase())
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let user = AuthUser {
        id: user.id,
        username: user.username,
        role: user.role,
        avatar_url: user.avatar_url,
    };
    Ok(Json(session(&state, user)?))
}

async fn me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("correct horse", "not-a-real-hash"));
    }
}
