use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{ResolvedTrack, Resolver};
use crate::{
    audio::error::MediaError,
    cache::{cache_key, CacheMetrics, ResolverCache},
};

/// Decorador que cachea las resoluciones exitosas de otro resolvedor
pub struct CachedResolver<R> {
    inner: R,
    cache: Arc<ResolverCache>,
}

impl<R: Resolver> CachedResolver<R> {
    pub fn new(inner: R, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(ResolverCache::new(capacity, ttl)),
        }
    }

    pub fn cache(&self) -> Arc<ResolverCache> {
        self.cache.clone()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

#[async_trait]
impl<R: Resolver> Resolver for CachedResolver<R> {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, MediaError> {
        let key = cache_key(query);

        if let Some(track) = self.cache.get(&key) {
            debug!("💾 Cache hit para '{}'", query);
            return Ok(track);
        }

        // Los fallos no se cachean: el siguiente intento vuelve a resolver
        let track = self.inner.resolve(query).await?;
        self.cache.insert(key, track.clone());
        Ok(track)
    }
}
