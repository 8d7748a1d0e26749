//! Great-circle distance on a spherical Earth.

use crate::model::Position;

/// Mean Earth radius in meters (IUGG mean radius, 6 371.0088 km).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two positions, in meters.
///
/// Total over finite inputs. The haversine term is clamped to `[0, 1]` so
/// rounding near antipodal points cannot produce `NaN`.
#[must_use]
pub fn distance(a: Position, b: Position) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Human-readable distance: whole meters below one kilometer, otherwise
/// kilometers with two decimals.
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round())
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(latitude: f64, longitude: f64) -> Position {
        Position {
            latitude,
            longitude,
        }
    }

    #[test]
    fn identical_points_are_zero_apart() {
        let p = pos(6.3703, 2.3912);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (pos(6.40, 2.35), pos(6.50, 2.30)),
            (pos(-33.86, 151.21), pos(51.5, -0.12)),
            (pos(89.9, 10.0), pos(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            assert!((distance(a, b) - distance(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = distance(pos(0.0, 0.0), pos(0.0, 180.0));
        assert!(d.is_finite());
        let half = std::f64::consts::PI * EARTH_RADIUS_M;
        assert!((d - half).abs() < 1.0, "got {d}, expected {half}");
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance(pos(0.0, 0.0), pos(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn cotonou_to_porto_novo_is_about_30_km() {
        let cotonou = pos(6.3703, 2.3912);
        let porto_novo = pos(6.4969, 2.6289);
        let d = distance(cotonou, porto_novo);
        assert!((25_000.0..32_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn format_distance_switches_units_at_one_km() {
        assert_eq!(format_distance(0.0), "0 m");
        assert_eq!(format_distance(849.6), "850 m");
        assert_eq!(format_distance(1000.0), "1.00 km");
        assert_eq!(format_distance(12_346.0), "12.35 km");
    }
}
