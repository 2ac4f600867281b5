//! GPS contract and the running-aggregate fold used by the
//! tracker to attach a position trail to networks and clients.

use anyhow::Result;

/// One GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub spd: f64,
    pub mode: i32,
}

impl GpsFix {
    pub const NONE: GpsFix = GpsFix {
        lat: 0.0,
        lon: 0.0,
        alt: 0.0,
        spd: 0.0,
        mode: 0,
    };

    pub fn has_fix(&self) -> bool {
        self.mode > 0
    }
}

/// GPS device contract.
pub trait GpsSource {
    /// Positive = have fix, 0 = no fix, negative = error.
    fn scan(&mut self) -> Result<i32>;
    fn fetch_loc(&self) -> GpsFix;
    fn fetch_mode(&self) -> i32;
}

/// GPS disabled (`gps_enable = 0` in the configuration).
pub struct NullGpsSource;

impl GpsSource for NullGpsSource {
    fn scan(&mut self) -> Result<i32> {
        Ok(0)
    }

    fn fetch_loc(&self) -> GpsFix {
        GpsFix::NONE
    }

    fn fetch_mode(&self) -> i32 {
        0
    }
}

/// Deterministic fix for tests.
pub struct StaticFixGpsSource(pub GpsFix);

impl GpsSource for StaticFixGpsSource {
    fn scan(&mut self) -> Result<i32> {
        Ok(if self.0.has_fix() { 1 } else { 0 })
    }

    fn fetch_loc(&self) -> GpsFix {
        self.0
    }

    fn fetch_mode(&self) -> i32 {
        self.0.mode
    }
}

/// Running {min,max,best} aggregate folded into a network or client
/// record as fixes arrive, plus the first-fix snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsTrail {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    pub best_alt: f64,
    pub best_spd: f64,
    pub first: GpsFix,
}

impl GpsTrail {
    pub fn first_fix(fix: GpsFix) -> Self {
        Self {
            min_lat: fix.lat,
            min_lon: fix.lon,
            max_lat: fix.lat,
            max_lon: fix.lon,
            best_alt: fix.alt,
            best_spd: fix.spd,
            first: fix,
        }
    }

    /// Fold a later fix into the running aggregate. Widens the lat/lon
    /// bounding box and keeps the highest altitude/speed ever observed;
    /// the first-fix snapshot never changes after creation.
    pub fn fold(&mut self, fix: GpsFix) {
        self.min_lat = self.min_lat.min(fix.lat);
        self.min_lon = self.min_lon.min(fix.lon);
        self.max_lat = self.max_lat.max(fix.lat);
        self.max_lon = self.max_lon.max(fix.lon);
        self.best_alt = self.best_alt.max(fix.alt);
        self.best_spd = self.best_spd.max(fix.spd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_widens_bounds_and_keeps_best() {
        let mut trail = GpsTrail::first_fix(GpsFix {
            lat: 10.0,
            lon: 10.0,
            alt: 5.0,
            spd: 1.0,
            mode: 2,
        });
        trail.fold(GpsFix {
            lat: 12.0,
            lon: 8.0,
            alt: 2.0,
            spd: 9.0,
            mode: 2,
        });
        assert_eq!(trail.min_lat, 10.0);
        assert_eq!(trail.max_lat, 12.0);
        assert_eq!(trail.min_lon, 8.0);
        assert_eq!(trail.max_lon, 10.0);
        assert_eq!(trail.best_alt, 5.0);
        assert_eq!(trail.best_spd, 9.0);
        assert_eq!(trail.first.lat, 10.0);
    }
}
