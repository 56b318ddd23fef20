use super::domain::{open_ring, GeoPoint};

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Shape measurements of a parcel boundary on a local planar projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMetrics {
    pub area_sqm: f64,
    pub perimeter_m: f64,
    /// Isoperimetric quotient `4πA / P²`: 1 for a circle, about 0.785 for a square.
    pub compactness: f64,
}

/// Measures a boundary ring. Returns `None` for rings with fewer than three distinct vertices.
pub fn shape_metrics(ring: &[GeoPoint]) -> Option<ShapeMetrics> {
    let ring = open_ring(ring);
    if ring.len() < 3 {
        return None;
    }

    let projected = project(ring);
    let area_sqm = shoelace_area(&projected);
    let perimeter_m = perimeter(&projected);
    if area_sqm <= 0.0 || perimeter_m <= 0.0 {
        return None;
    }

    Some(ShapeMetrics {
        area_sqm,
        perimeter_m,
        compactness: 4.0 * std::f64::consts::PI * area_sqm / (perimeter_m * perimeter_m),
    })
}

// Equirectangular projection around the ring's mean latitude; parcels are small enough
// for the distortion to be negligible.
fn project(ring: &[GeoPoint]) -> Vec<(f64, f64)> {
    let mean_lat = ring.iter().map(|point| point.lat).sum::<f64>() / ring.len() as f64;
    let lon_scale = mean_lat.to_radians().cos();
    ring.iter()
        .map(|point| {
            (
                point.lon.to_radians() * lon_scale * EARTH_RADIUS_M,
                point.lat.to_radians() * EARTH_RADIUS_M,
            )
        })
        .collect()
}

fn shoelace_area(points: &[(f64, f64)]) -> f64 {
    let twice_area: f64 = edges(points)
        .map(|((x1, y1), (x2, y2))| x1 * y2 - x2 * y1)
        .sum();
    twice_area.abs() / 2.0
}

fn perimeter(points: &[(f64, f64)]) -> f64 {
    edges(points)
        .map(|((x1, y1), (x2, y2))| (x2 - x1).hypot(y2 - y1))
        .sum()
}

fn edges(points: &[(f64, f64)]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}
