//! Common test fixtures for fire-tiles tests.
//!
//! This module provides pre-defined extents, ramps and legends that
//! represent common scenarios in tile rendering.

/// Common bounding box definitions for testing, as
/// (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Default enforced extent: the continental United States
    pub const CONUS: (f64, f64, f64, f64) = (-128.0, 22.0, -64.0, 52.0);

    /// A small source inside CONUS (northern California)
    pub const NORCAL: (f64, f64, f64, f64) = (-124.0, 38.0, -120.0, 42.0);

    /// Invalid bbox (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// Tiles with known relationships to the fixture extents.
pub mod tiles {
    /// z=4 tile over arctic Canada, north of CONUS.
    pub const OUTSIDE_CONUS: (u32, u32, u32) = (4, 2, 3);

    /// z=6 tile over northern California, overlapping [`super::bbox::NORCAL`].
    pub const NORCAL_Z6: (u32, u32, u32) = (6, 10, 24);

    /// z=6 tile over Texas: inside CONUS, outside NORCAL.
    pub const TEXAS_Z6: (u32, u32, u32) = (6, 14, 26);
}

/// Color ramps and legends.
pub mod colors {
    /// Black to white over 0..10.
    pub const GRAY_RAMP: [(f64, &str); 2] = [(0.0, "#000000"), (10.0, "#ffffff")];

    /// Slope ramp in degrees.
    pub const SLOPE_RAMP: [(f64, &str); 4] = [
        (0.0, "#1a9850"),
        (15.0, "#fee08b"),
        (30.0, "#f46d43"),
        (60.0, "#a50026"),
    ];

    /// A small fuel-model legend as served by the legend service.
    pub const FUEL_LEGEND_JSON: &str = r##"{
        "1": {"label": "Short grass", "color": "#ffffbe"},
        "2": {"label": "Timber grass", "color": "#addd8e"},
        "91": {"label": "Urban", "color": "#686868"},
        "98": {"label": "Water", "color": "#0000ff"}
    }"##;
}
