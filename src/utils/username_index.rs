//! Username availability: a cuckoo filter answers "definitely free" without
//! touching the database, a moka cache answers "recently seen as taken", and
//! only the remaining cases go to MySQL.

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;
use std::time::Duration;

/// Expected capacity and false-positive rate of the filter.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static USERNAME_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Usernames known to be taken.
static TAKEN_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(200_000)
        .time_to_live(Duration::from_secs(86_400))
        .build()
});

#[inline]
pub fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

/// False positives possible, false negatives not.
pub fn might_exist(username: &str) -> bool {
    let username = normalize(username);
    match USERNAME_FILTER.read() {
        Ok(filter) => filter.contains(&username),
        // a poisoned filter can't rule anything out
        Err(_) => true,
    }
}

/// Records a username that now exists.
pub async fn mark_taken(username: &str) {
    let username = normalize(username);
    if let Ok(mut filter) = USERNAME_FILTER.write() {
        filter.add(&username);
    }
    TAKEN_CACHE.insert(username, ()).await;
}

/// true => username AVAILABLE
pub async fn is_available(username: &str, pool: &MySqlPool) -> Result<bool> {
    let username = normalize(username);

    if !might_exist(&username) {
        return Ok(true);
    }

    if TAKEN_CACHE.contains_key(&username) {
        return Ok(false);
    }

    let exists: i64 =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1)")
            .bind(&username)
            .fetch_one(pool)
            .await?;

    if exists != 0 {
        TAKEN_CACHE.insert(username, ()).await;
        return Ok(false);
    }

    Ok(true)
}

/// Streams every username into the filter in batches.
pub async fn warmup(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT username FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;
        batch.push(normalize(&username));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Username filter warmup complete: {} users", total);
    Ok(())
}

fn insert_batch(usernames: &[String]) {
    if let Ok(mut filter) = USERNAME_FILTER.write() {
        for username in usernames {
            filter.add(username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize("  Sari.W "), "sari.w");
    }

    #[actix_web::test]
    async fn marked_names_are_reported_by_filter() {
        assert!(!might_exist("filter-test-unused-name"));
        mark_taken("Filter-Test-Taken").await;
        assert!(might_exist("filter-test-taken"));
        assert!(TAKEN_CACHE.contains_key("filter-test-taken"));
    }
}
