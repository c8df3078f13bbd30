/// Serves a value from the cache, computing and caching it on a miss.
///
/// Evaluates to an `AppResult` of the value. The computed value is written in
/// the background, so the caller never waits on Redis for a miss.
///
/// # Arguments
/// * `$cache`: a `Cache` (anything with `get_from_cache` and `set_in_background`).
/// * `$key`: the `CacheKey` to look up and store under.
/// * `$ttl`: time-to-live of the stored value in seconds.
/// * `$block`: future computing the value on a miss.
///
/// # Example
/// ```rust,ignore
/// let batch: RecommendationBatch = cached!(cache, key, ttl, async move {
///     compute_batch(user_id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => Ok(cached),
            Ok(None) => match $block.await {
                Ok(value) => {
                    $cache.set_in_background(&$key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }};
}
