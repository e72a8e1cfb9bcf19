use serde::Serialize;

use crate::error::{ApiError, ErrorCode};

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// A circular area a punch has to fall into.
pub trait Fence {
    fn id(&self) -> u64;
    fn center(&self) -> GeoPoint;
    fn radius_m(&self) -> f64;
}

#[derive(Debug)]
pub struct FenceMatch<'a, T> {
    pub fence: &'a T,
    pub distance_m: f64,
}

impl<T: Fence> FenceMatch<'_, T> {
    pub fn within_radius(&self) -> bool {
        self.distance_m <= self.fence.radius_m()
    }
}

/// All fences ordered nearest first.
pub fn rank_by_distance<T: Fence>(fences: &[T], at: GeoPoint) -> Vec<FenceMatch<'_, T>> {
    let mut ranked: Vec<_> = fences
        .iter()
        .map(|fence| FenceMatch {
            fence,
            distance_m: haversine_m(fence.center(), at),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    ranked
}

/// Resolves the fence a punch belongs to.
///
/// With `preferred` set only that fence is considered. Otherwise the nearest
/// fence whose radius contains the point wins.
pub fn locate<T: Fence>(
    fences: &[T],
    at: GeoPoint,
    preferred: Option<u64>,
) -> Result<FenceMatch<'_, T>, ApiError> {
    let mut ranked = rank_by_distance(fences, at);
    if let Some(id) = preferred {
        ranked.retain(|m| m.fence.id() == id);
    }

    let Some(nearest) = ranked.first() else {
        return Err(ApiError::new(
            ErrorCode::NoActiveOutlet,
            "No active outlet is available for attendance",
        ));
    };
    let nearest_id = nearest.fence.id();
    let nearest_distance = nearest.distance_m;
    let nearest_radius = nearest.fence.radius_m();

    match ranked.into_iter().find(|m| m.within_radius()) {
        Some(found) => Ok(found),
        None => Err(ApiError::new(
            ErrorCode::OutsideGeofence,
            "You are outside the allowed outlet radius",
        )
        .with_details(serde_json::json!({
            "nearest_outlet_id": nearest_id,
            "distance_m": nearest_distance.round(),
            "radius_m": nearest_radius,
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Site {
        id: u64,
        at: GeoPoint,
        radius: f64,
    }

    impl Fence for Site {
        fn id(&self) -> u64 {
            self.id
        }
        fn center(&self) -> GeoPoint {
            self.at
        }
        fn radius_m(&self) -> f64 {
            self.radius
        }
    }

    fn sites() -> Vec<Site> {
        vec![
            // Bandung, Jl. Braga
            Site { id: 1, at: GeoPoint::new(-6.9175, 107.6091), radius: 100.0 },
            // Bandung, Dago (roughly 3 km north)
            Site { id: 2, at: GeoPoint::new(-6.8915, 107.6107), radius: 150.0 },
        ]
    }

    #[test]
    fn zero_distance_to_self() {
        let p = GeoPoint::new(-6.2, 106.8);
        assert_eq!(haversine_m(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(-6.9175, 107.6091);
        let b = GeoPoint::new(-6.8915, 107.6107);
        assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
    }

    #[test]
    fn picks_nearest_containing_fence() {
        let sites = sites();
        let near_braga = GeoPoint::new(-6.9178, 107.6093);
        let found = locate(&sites, near_braga, None).unwrap();
        assert_eq!(found.fence.id, 1);
        assert!(found.distance_m < 100.0);
    }

    #[test]
    fn preferred_fence_must_contain_point() {
        let sites = sites();
        let near_braga = GeoPoint::new(-6.9178, 107.6093);
        let err = locate(&sites, near_braga, Some(2)).unwrap_err();
        assert_eq!(err.code, ErrorCode::OutsideGeofence);
        assert_eq!(err.details.unwrap()["nearest_outlet_id"], 2);
    }

    #[test]
    fn outside_every_fence_reports_nearest() {
        let sites = sites();
        let midway = GeoPoint::new(-6.9050, 107.6100);
        let err = locate(&sites, midway, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::OutsideGeofence);
        assert!(err.details.unwrap()["distance_m"].as_f64().unwrap() > 150.0);
    }

    #[test]
    fn no_fences_is_its_own_error() {
        let none: Vec<Site> = Vec::new();
        let err = locate(&none, GeoPoint::new(0.0, 0.0), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoActiveOutlet);
    }

    #[test]
    fn ranking_is_nearest_first() {
        let sites = sites();
        let north = GeoPoint::new(-6.8900, 107.6100);
        let ranked = rank_by_distance(&sites, north);
        assert_eq!(ranked[0].fence.id, 2);
        assert_eq!(ranked[1].fence.id, 1);
    }
}
