//! Lambert-93 (EPSG:2154) to WGS84 conversion.
//!
//! The WFS provider serves geometries in the French national planar grid.
//! This is the standard inverse Lambert conformal conic computation with
//! the IGN-published projection constants; the iterative latitude solve
//! converges in a handful of rounds at millimetre precision.

use std::f64::consts::FRAC_PI_2;

/// GRS80 first eccentricity.
const E: f64 = 0.081_819_191_042_8;
/// Projection exponent.
const N: f64 = 0.725_607_765_053_267;
/// Projection constant (m).
const C: f64 = 11_754_255.426_096;
/// False easting of the projection pole (m).
const XS: f64 = 700_000.0;
/// False northing of the projection pole (m).
const YS: f64 = 12_655_612.049_876;
/// Central meridian, 3° east, in radians.
const LON0: f64 = 0.052_359_877_559_829_89;

/// Converts Lambert-93 planar coordinates (metres) to `(longitude,
/// latitude)` in degrees.
#[must_use]
pub fn lambert93_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let dx = x - XS;
    let dy = YS - y;
    let r = dx.hypot(dy);
    let gamma = dx.atan2(dy);

    let lon = LON0 + gamma / N;
    let lat_iso = (C / r).ln() / N;

    let mut lat = 2.0 * lat_iso.exp().atan() - FRAC_PI_2;
    for _ in 0..8 {
        let s = E * lat.sin();
        let correction = ((1.0 + s) / (1.0 - s)).powf(E / 2.0);
        lat = 2.0 * (correction * lat_iso.exp()).atan() - FRAC_PI_2;
    }

    (lon.to_degrees(), lat.to_degrees())
}
