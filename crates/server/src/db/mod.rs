pub mod models;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // An in-memory database lives only as long as its one connection
        if url.contains(":memory:") {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await?;
            return Ok(Self { pool });
        }

        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use uuid::Uuid;

    use super::Database;
    use crate::{db::models::Role, middleware::auth::AuthUser};

    pub async fn database() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    /// A file-backed database with a multi-connection pool, for tests that
    /// need statements to really interleave. Keep the directory alive.
    pub async fn file_database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        (dir, db)
    }

    /// Inserts a user row directly and returns the matching caller identity.
    pub async fn user(db: &Database, username: &str, role: Role) -> AuthUser {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(format!("{username}@example.com"))
        .bind("not-a-real-hash")
        .bind(role)
        .bind(Utc::now())
        .execute(&db.pool)
        .await
        .unwrap();

        AuthUser {
            id,
            username: username.to_string(),
            role,
            avatar_url: None,
        }
    }
}
