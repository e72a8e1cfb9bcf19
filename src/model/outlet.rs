use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::geofence::{Fence, GeoPoint};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 2,
    "name": "Outlet Braga",
    "address": "Jl. Braga No. 10, Bandung",
    "latitude": -6.9175,
    "longitude": 107.6091,
    "radius_m": 100.0,
    "is_active": true
}))]
pub struct Outlet {
    pub id: u64,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
    pub is_active: bool,
}

impl Fence for Outlet {
    fn id(&self) -> u64 {
        self.id
    }

    fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    fn radius_m(&self) -> f64 {
        self.radius_m
    }
}
