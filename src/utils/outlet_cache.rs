//! Active outlets are read on every check-in and change rarely, so they are
//! kept in a short-lived moka cache that write handlers invalidate.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::model::outlet::Outlet;

static ACTIVE_OUTLETS: Lazy<Cache<(), Arc<Vec<Outlet>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(1)
        .time_to_live(Duration::from_secs(300))
        .build()
});

pub async fn active_outlets(pool: &MySqlPool) -> Result<Arc<Vec<Outlet>>, sqlx::Error> {
    if let Some(cached) = ACTIVE_OUTLETS.get(&()).await {
        return Ok(cached);
    }

    let outlets = sqlx::query_as::<_, Outlet>(
        r#"
        SELECT id, name, address, latitude, longitude, radius_m, is_active
        FROM outlets
        WHERE is_active = 1
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let outlets = Arc::new(outlets);
    ACTIVE_OUTLETS.insert((), outlets.clone()).await;
    tracing::debug!(count = outlets.len(), "Active outlet cache refreshed");
    Ok(outlets)
}

pub async fn invalidate() {
    ACTIVE_OUTLETS.invalidate(&()).await;
}
