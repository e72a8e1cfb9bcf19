use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::AuthUser,
    domain::geofence::{GeoPoint, rank_by_distance},
    error::{ApiError, ApiResult},
    model::outlet::Outlet,
    utils::{
        db_utils::{Column, ColumnKind, build_update_sql, execute_update},
        outlet_cache,
    },
};

const OUTLET_COLUMNS: &str = "id, name, address, latitude, longitude, radius_m, is_active";

const UPDATABLE: &[Column] = &[
    Column::new("name", ColumnKind::Text),
    Column::nullable("address", ColumnKind::Text),
    Column::new("latitude", ColumnKind::Float),
    Column::new("longitude", ColumnKind::Float),
    Column::new("radius_m", ColumnKind::Float),
    Column::new("is_active", ColumnKind::Bool),
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Outlet Braga",
    "address": "Jl. Braga No. 10, Bandung",
    "latitude": -6.9175,
    "longitude": 107.6091,
    "radius_m": 100.0
}))]
pub struct CreateOutlet {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 1.0, max = 10000.0))]
    pub radius_m: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OutletQuery {
    /// Include inactive outlets (HR/Admin)
    pub all: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "outlet": { "id": 2, "name": "Outlet Braga", "address": null, "latitude": -6.9175,
                "longitude": 107.6091, "radius_m": 100.0, "is_active": true },
    "distance_m": 42.0,
    "within_radius": true
}))]
pub struct NearbyOutlet {
    pub outlet: Outlet,
    pub distance_m: f64,
    pub within_radius: bool,
}

/// Active outlets ranked from `at`, nearest first.
pub fn nearby(outlets: &[Outlet], at: GeoPoint) -> Vec<NearbyOutlet> {
    rank_by_distance(outlets, at)
        .into_iter()
        .map(|m| NearbyOutlet {
            within_radius: m.within_radius(),
            distance_m: m.distance_m.round(),
            outlet: m.fence.clone(),
        })
        .collect()
}

fn check_coordinates(lat: f64, lon: f64) -> ApiResult<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::validation("Coordinates out of range"));
    }
    Ok(())
}

async fn fetch_outlet(pool: &MySqlPool, id: u64) -> ApiResult<Outlet> {
    let sql = format!("SELECT {OUTLET_COLUMNS} FROM outlets WHERE id = ?");
    sqlx::query_as::<_, Outlet>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Outlet not found"))
}

/// Create outlet
#[utoipa::path(
    post,
    path = "/api/outlets",
    request_body = CreateOutlet,
    responses((status = 201, body = Outlet), (status = 400)),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
#[instrument(skip(pool, payload), fields(admin = auth.user_id))]
pub async fn create_outlet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateOutlet>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    payload.validate()?;

    let id = sqlx::query(
        "INSERT INTO outlets (name, address, latitude, longitude, radius_m) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(&payload.address)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.radius_m)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    outlet_cache::invalidate().await;
    info!(outlet_id = id, "Outlet created");
    Ok(HttpResponse::Created().json(fetch_outlet(pool.get_ref(), id).await?))
}

/// List outlets
#[utoipa::path(
    get,
    path = "/api/outlets",
    params(OutletQuery),
    responses((status = 200, body = [Outlet])),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
pub async fn list_outlets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OutletQuery>,
) -> ApiResult<HttpResponse> {
    if query.all.unwrap_or(false) && auth.role.is_hr_or_admin() {
        let sql = format!("SELECT {OUTLET_COLUMNS} FROM outlets ORDER BY name");
        let outlets = sqlx::query_as::<_, Outlet>(&sql)
            .fetch_all(pool.get_ref())
            .await?;
        return Ok(HttpResponse::Ok().json(outlets));
    }

    let outlets = outlet_cache::active_outlets(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(outlets.as_ref()))
}

/// Active outlets around a point
#[utoipa::path(
    get,
    path = "/api/outlets/nearby",
    params(NearbyQuery),
    responses((status = 200, body = [NearbyOutlet])),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
pub async fn nearby_outlets(
    pool: web::Data<MySqlPool>,
    query: web::Query<NearbyQuery>,
) -> ApiResult<HttpResponse> {
    check_coordinates(query.lat, query.lon)?;
    let outlets = outlet_cache::active_outlets(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(nearby(&outlets, GeoPoint::new(query.lat, query.lon))))
}

/// Get outlet
#[utoipa::path(
    get,
    path = "/api/outlets/{id}",
    params(("id", Path, description = "Outlet ID")),
    responses((status = 200, body = Outlet), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
pub async fn get_outlet(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_outlet(pool.get_ref(), path.into_inner()).await?))
}

/// Partial update
#[utoipa::path(
    put,
    path = "/api/outlets/{id}",
    params(("id", Path, description = "Outlet ID")),
    request_body(content = Object, example = json!({ "radius_m": 150.0 })),
    responses((status = 200, body = Outlet), (status = 400), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
#[instrument(skip(pool, body), fields(admin = auth.user_id))]
pub async fn update_outlet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let current = fetch_outlet(pool.get_ref(), id).await?;
    let lat = body.get("latitude").and_then(Value::as_f64).unwrap_or(current.latitude);
    let lon = body.get("longitude").and_then(Value::as_f64).unwrap_or(current.longitude);
    check_coordinates(lat, lon)?;
    if body
        .get("radius_m")
        .and_then(Value::as_f64)
        .is_some_and(|r| r <= 0.0)
    {
        return Err(ApiError::validation("radius_m must be positive"));
    }

    let update = build_update_sql("outlets", &body, UPDATABLE, "id", id)?;
    execute_update(pool.get_ref(), update).await?;
    outlet_cache::invalidate().await;
    info!(outlet_id = id, "Outlet updated");

    Ok(HttpResponse::Ok().json(fetch_outlet(pool.get_ref(), id).await?))
}

/// Deactivate outlet
#[utoipa::path(
    delete,
    path = "/api/outlets/{id}",
    params(("id", Path, description = "Outlet ID")),
    responses((status = 204, description = "Deactivated"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Outlets"
)]
#[instrument(skip(pool), fields(admin = auth.user_id))]
pub async fn delete_outlet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    // Soft delete; attendance rows keep pointing at it.
    let result = sqlx::query("UPDATE outlets SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        fetch_outlet(pool.get_ref(), id).await?;
    }

    outlet_cache::invalidate().await;
    info!(outlet_id = id, "Outlet deactivated");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outlet(id: u64, lat: f64, lon: f64) -> Outlet {
        Outlet {
            id,
            name: format!("Outlet {id}"),
            address: None,
            latitude: lat,
            longitude: lon,
            radius_m: 100.0,
            is_active: true,
        }
    }

    #[test]
    fn nearby_ranks_and_flags_radius() {
        let outlets = vec![outlet(1, -6.9300, 107.6200), outlet(2, -6.9175, 107.6091)];
        let ranked = nearby(&outlets, GeoPoint::new(-6.9176, 107.6092));
        assert_eq!(ranked[0].outlet.id, 2);
        assert!(ranked[0].within_radius);
        assert!(!ranked[1].within_radius);
        assert!(ranked[0].distance_m < ranked[1].distance_m);
    }

    #[test]
    fn rejects_impossible_coordinates() {
        assert!(check_coordinates(91.0, 0.0).is_err());
        assert!(check_coordinates(-6.9, 107.6).is_ok());
    }
}
