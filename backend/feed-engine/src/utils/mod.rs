// Utility functions for feed-engine

/// Proximity score: 1.0 at distance 0, falling linearly to 0.0 at the radius.
pub fn locality_match(distance_meters: f64, max_radius_meters: f64) -> f64 {
    if !distance_meters.is_finite() || !max_radius_meters.is_finite() || max_radius_meters <= 0.0
    {
        return 0.0;
    }
    let distance_km = distance_meters.max(0.0) / 1000.0;
    let radius_km = max_radius_meters / 1000.0;
    (1.0 - distance_km / radius_km).clamp(0.0, 1.0)
}
