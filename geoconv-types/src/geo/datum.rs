/// Geodetic datum together with its reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    name: &'static str,
    ellipsoid: &'static str,
    semimajor: f64,
    inv_flattening: f64,
}

impl Datum {
    /// World Geodetic System 1984.
    pub const WGS84: Self = Datum {
        name: "WGS_1984",
        ellipsoid: "WGS84",
        semimajor: 6_378_137.0,
        inv_flattening: 298.257223563,
    };

    /// European Terrestrial Reference System 1989 on the GRS 1980 ellipsoid.
    pub const ETRS89: Self = Datum {
        name: "ETRS_1989",
        ellipsoid: "GRS80",
        semimajor: 6_378_137.0,
        inv_flattening: 298.257222101,
    };

    /// ESRI style datum name without the `D_` prefix, e.g. `WGS_1984`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ellipsoid identifier understood by the projection library, e.g. `GRS80`.
    pub fn ellipsoid(&self) -> &'static str {
        self.ellipsoid
    }

    /// ESRI style spheroid name, e.g. `GRS_1980`.
    pub fn spheroid_name(&self) -> &'static str {
        match self.ellipsoid {
            "GRS80" => "GRS_1980",
            _ => "WGS_1984",
        }
    }

    /// Semimajor axis of the ellipsoid in metres.
    pub fn semimajor(&self) -> f64 {
        self.semimajor
    }

    /// Inverse flattening of the ellipsoid.
    pub fn inv_flattening(&self) -> f64 {
        self.inv_flattening
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::WGS84
    }
}
