// In-process cache for the featured projects query

use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::{db::models::FeaturedProjects, error::Result, services::projects};

pub struct FeaturedCache {
    ttl: Duration,
    entry: RwLock<Option<(Instant, FeaturedProjects)>>,
}

impl FeaturedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    fn fresh(&self, entry: &Option<(Instant, FeaturedProjects)>) -> Option<FeaturedProjects> {
        match entry {
            Some((loaded_at, featured)) if loaded_at.elapsed() < self.ttl => Some(featured.clone()),
            _ => None,
        }
    }

    /// Returns the cached value, reloading it when missing or stale.
    pub async fn get_or_load(&self, pool: &SqlitePool) -> Result<FeaturedProjects> {
        let cached = self.fresh(&*self.entry.read().await);
        if let Some(featured) = cached {
            return Ok(featured);
        }

        let mut entry = self.entry.write().await;
        // Another request may have reloaded while we waited for the lock
        if let Some(featured) = self.fresh(&entry) {
            return Ok(featured);
        }

        let featured = projects::featured_projects(pool).await?;
        *entry = Some((Instant::now(), featured.clone()));
        tracing::debug!("featured projects reloaded");

        Ok(featured)
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}
