use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Role,
    error::{AppError, Result},
    AppState,
};

/// The signed-in caller, decoded from the bearer token.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub exp: usize,
}

pub fn create_token(user: &AuthUser, secret: &str, ttl_days: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(ttl_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        role: user.role,
        avatar_url: user.avatar_url.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let claims = token_data.claims;
    Ok(AuthUser {
        id: claims.sub,
        username: claims.username,
        role: claims.role,
        avatar_url: claims.avatar_url,
    })
}

/// Attaches the caller to the request when a bearer token is present.
/// Requests without a token pass through as anonymous; a bad token is a 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        let user = decode_token(bearer.token(), &state.config.jwt_secret)?;
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

// Extractor for getting the authenticated user from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AuthUser {
        AuthUser {
            id: "a1".to_string(),
            username: "alice".to_string(),
            role: Role::Admin,
            avatar_url: Some("/a.png".to_string()),
        }
    }

    #[test]
    fn token_carries_identity_and_role() {
        let token = create_token(&alice(), "secret", 7).unwrap();
        assert_eq!(decode_token(&token, "secret").unwrap(), alice());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token(&alice(), "secret", 7).unwrap();
        assert!(matches!(
            decode_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token(&alice(), "secret", -2).unwrap();
        assert!(matches!(
            decode_token(&token, "secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
