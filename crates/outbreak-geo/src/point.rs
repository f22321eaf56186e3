//! Geographic points and great-circle distance.

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    /// Latitude in degrees, -90..=90
    pub lat: f64,
    /// Longitude in degrees, -180..=180
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that both coordinates are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        // Rounding can push `a` marginally past 1 for antipodal points
        let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
        EARTH_RADIUS_KM * c
    }

    /// Point displaced `km` kilometres due north (test and bench helper).
    pub fn offset_north_km(&self, km: f64) -> Self {
        let dlat = (km / EARTH_RADIUS_KM).to_degrees();
        Self {
            lat: (self.lat + dlat).clamp(-90.0, 90.0),
            lng: self.lng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERLIN: GeoPoint = GeoPoint::new(52.5200, 13.4050);
    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(BERLIN.distance_km(&BERLIN), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = BERLIN.distance_km(&PARIS);
        let ba = PARIS.distance_km(&BERLIN);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn berlin_paris_distance() {
        // ~878 km
        let d = BERLIN.distance_km(&PARIS);
        assert!((870.0..890.0).contains(&d), "got {}", d);
    }

    #[test]
    fn offset_north_roundtrips_distance() {
        let moved = BERLIN.offset_north_km(2.5);
        let d = BERLIN.distance_km(&moved);
        assert!((d - 2.5).abs() < 1e-6, "got {}", d);
    }

    #[test]
    fn validity_bounds() {
        assert!(BERLIN.is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }
}
