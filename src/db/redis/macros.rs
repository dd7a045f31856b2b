/// Read-through caching around an async computation.
///
/// `$cache` is an `Option<&Cache>`; with `None` the block simply runs. A
/// cache read failure is logged and treated as a miss. Computed values are
/// written back in the background with the given TTL (seconds).
///
/// ```rust,ignore
/// let genres: Vec<String> = cached!(self.cache.as_ref(), CacheKey::Genres, ttl, async {
///     self.load_genres().await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let cache = $cache;
        let key = $key;
        let hit = match cache {
            Some(cache) => cache.get_from_cache(&key).await.unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "Cache read failed, recomputing");
                None
            }),
            None => None,
        };
        match hit {
            Some(hit) => Ok(hit),
            None => match $block.await {
                Ok(value) => {
                    if let Some(cache) = cache {
                        cache.set_in_background(&key, &value, $ttl);
                    }
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
