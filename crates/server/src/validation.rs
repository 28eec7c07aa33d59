//! Input checks shared by the services. Each returns a `Validation` error
//! with a message fit for the client.

use serde::Deserialize;

use crate::error::{AppError, Result};

pub const PUBLIC_ID_LEN: usize = 12;
pub const TITLE_MAX: usize = 100;
pub const COMMENT_MAX: usize = 250;
pub const USERNAME_MIN: usize = 5;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub fn public_id(value: &str) -> Result<()> {
    let well_formed = value.len() == PUBLIC_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if well_formed {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid project identifier".to_string()))
    }
}

pub fn title(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation("Title cannot be empty".to_string()));
    }
    if value.chars().count() > TITLE_MAX {
        return Err(AppError::Validation(format!(
            "Title cannot exceed {TITLE_MAX} characters"
        )));
    }
    Ok(())
}

pub fn comment(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    if value.chars().count() > COMMENT_MAX {
        return Err(AppError::Validation(format!(
            "Comment cannot exceed {COMMENT_MAX} characters"
        )));
    }
    Ok(())
}

pub fn comment_id(value: &str) -> Result<()> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| AppError::Validation("Invalid comment identifier".to_string()))
}

pub fn username(value: &str) -> Result<()> {
    let len = value.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid email address".to_string()))
    }
}

pub fn password(value: &str) -> Result<()> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(AppError::Validation(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

/// Resolves an optional page size against its default and upper bound.
pub fn limit(value: Option<i64>, default: i64, max: i64) -> Result<i64> {
    match value {
        None => Ok(default),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(_) => Err(AppError::Validation(format!(
            "limit must be between 1 and {max}"
        ))),
    }
}

pub fn offset(value: Option<i64>) -> Result<i64> {
    match value {
        None => Ok(0),
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(AppError::Validation(
            "offset cannot be negative".to_string(),
        )),
    }
}

/// Case-insensitive substring pattern for `LIKE ... ESCAPE '\'`.
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Treats blank search text as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
