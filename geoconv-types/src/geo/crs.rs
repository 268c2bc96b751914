use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::GeoconvTypesError;
use crate::geo::datum::Datum;
use crate::geo::projection::{GeodesyProjection, Projection, WebMercator};

/// Coordinate reference system identified by an `EPSG:<code>` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crs {
    code: u32,
    datum: Datum,
    projection_type: ProjectionType,
}

/// Map projection used by a [`Crs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    /// Plain longitude and latitude in degrees.
    None,
    /// Spherical mercator used by web maps.
    WebMercator,
    /// Universal Transverse Mercator zone.
    Utm {
        /// Zone number, `1..=60`.
        zone: u8,
        /// True for southern hemisphere zones (false northing of 10 000 km).
        south: bool,
    },
}

impl Crs {
    /// WGS 84 geographic coordinates.
    pub const EPSG4326: Crs = Crs {
        code: 4326,
        datum: Datum::WGS84,
        projection_type: ProjectionType::None,
    };

    /// ETRS89 geographic coordinates.
    pub const EPSG4258: Crs = Crs {
        code: 4258,
        datum: Datum::ETRS89,
        projection_type: ProjectionType::None,
    };

    /// Web Mercator.
    pub const EPSG3857: Crs = Crs {
        code: 3857,
        datum: Datum::WGS84,
        projection_type: ProjectionType::WebMercator,
    };

    /// Looks up a CRS by its EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self, GeoconvTypesError> {
        let crs = match code {
            4326 => Self::EPSG4326,
            4258 => Self::EPSG4258,
            3857 => Self::EPSG3857,
            32601..=32660 => Self::utm(code, Datum::WGS84, code - 32600, false),
            32701..=32760 => Self::utm(code, Datum::WGS84, code - 32700, true),
            25828..=25838 => Self::utm(code, Datum::ETRS89, code - 25800, false),
            _ => return Err(GeoconvTypesError::UnsupportedCrs(format!("EPSG:{code}"))),
        };

        Ok(crs)
    }

    fn utm(code: u32, datum: Datum, zone: u32, south: bool) -> Self {
        Self {
            code,
            datum,
            projection_type: ProjectionType::Utm {
                zone: zone as u8,
                south,
            },
        }
    }

    /// EPSG code of the system, e.g. `32717`.
    pub fn epsg_code(&self) -> u32 {
        self.code
    }

    /// Datum the system is based on.
    pub fn datum(&self) -> Datum {
        self.datum
    }

    /// Projection of the system.
    pub fn projection_type(&self) -> ProjectionType {
        self.projection_type
    }

    /// True if coordinates in this CRS are longitude and latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        self.projection_type == ProjectionType::None
    }

    /// Projection from geographic coordinates into this CRS, or `None` if the CRS is geographic itself.
    pub fn get_projection(&self) -> Result<Option<Box<dyn Projection>>, GeoconvTypesError> {
        match self.projection_type {
            ProjectionType::None => Ok(None),
            ProjectionType::WebMercator => Ok(Some(Box::new(WebMercator::new(self.datum)))),
            ProjectionType::Utm { zone, south } => {
                let mut definition = format!("utm zone={zone} ellps={}", self.datum.ellipsoid());
                if south {
                    definition.push_str(" south");
                }

                let projection = GeodesyProjection::new(&definition).map_err(|reason| {
                    GeoconvTypesError::Transformation {
                        from: Self::EPSG4326.to_string(),
                        to: self.to_string(),
                        reason,
                    }
                })?;
                Ok(Some(Box::new(projection)))
            }
        }
    }

    /// Definition of the CRS in ESRI WKT flavour, as expected in shapefile `.prj` sidecars.
    pub fn esri_wkt(&self) -> String {
        let datum = self.datum;
        let geogcs = format!(
            "GEOGCS[\"GCS_{name}\",DATUM[\"D_{name}\",SPHEROID[\"{spheroid}\",{a:?},{rf:?}]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]",
            name = datum.name(),
            spheroid = datum.spheroid_name(),
            a = datum.semimajor(),
            rf = datum.inv_flattening(),
        );

        match self.projection_type {
            ProjectionType::None => geogcs,
            ProjectionType::WebMercator => format!(
                "PROJCS[\"WGS_1984_Web_Mercator_Auxiliary_Sphere\",{geogcs},PROJECTION[\"Mercator_Auxiliary_Sphere\"],PARAMETER[\"False_Easting\",0.0],PARAMETER[\"False_Northing\",0.0],PARAMETER[\"Central_Meridian\",0.0],PARAMETER[\"Standard_Parallel_1\",0.0],PARAMETER[\"Auxiliary_Sphere_Type\",0.0],UNIT[\"Meter\",1.0]]"
            ),
            ProjectionType::Utm { zone, south } => {
                let hemisphere = if south { 'S' } else { 'N' };
                let false_northing = if south { 10_000_000.0 } else { 0.0 };
                let central_meridian = f64::from(zone) * 6.0 - 183.0;
                format!(
                    "PROJCS[\"{name}_UTM_Zone_{zone}{hemisphere}\",{geogcs},PROJECTION[\"Transverse_Mercator\"],PARAMETER[\"False_Easting\",500000.0],PARAMETER[\"False_Northing\",{false_northing:?}],PARAMETER[\"Central_Meridian\",{central_meridian:?}],PARAMETER[\"Scale_Factor\",0.9996],PARAMETER[\"Latitude_Of_Origin\",0.0],UNIT[\"Meter\",1.0]]",
                    name = datum.name(),
                )
            }
        }
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

impl FromStr for Crs {
    type Err = GeoconvTypesError;

    /// Parses an `authority:code` pair. The authority is matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (authority, code) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| GeoconvTypesError::InvalidCrs(s.to_string()))?;

        if !authority.trim().eq_ignore_ascii_case("epsg") {
            return Err(GeoconvTypesError::UnsupportedCrs(s.trim().to_string()));
        }

        let code = code
            .trim()
            .parse::<u32>()
            .map_err(|_| GeoconvTypesError::InvalidCrs(s.to_string()))?;
        Self::from_epsg(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("epsg:32717".parse::<Crs>().ok(), Crs::from_epsg(32717).ok());
        assert_eq!(
            "EPSG:32717".parse::<Crs>().map(|crs| crs.projection_type()),
            Ok(ProjectionType::Utm {
                zone: 17,
                south: true
            })
        );
    }

    #[test]
    fn parse_rejects_unknown_codes() {
        assert_matches!(
            "EPSG:99999".parse::<Crs>(),
            Err(GeoconvTypesError::UnsupportedCrs(_))
        );
        assert_matches!(
            "ESRI:102100".parse::<Crs>(),
            Err(GeoconvTypesError::UnsupportedCrs(_))
        );
        assert_matches!("4326".parse::<Crs>(), Err(GeoconvTypesError::InvalidCrs(_)));
        assert_matches!(
            "EPSG:abc".parse::<Crs>(),
            Err(GeoconvTypesError::InvalidCrs(_))
        );
    }

    #[test]
    fn etrs89_zones() {
        let crs = Crs::from_epsg(25830).expect("known code");
        assert_eq!(crs.datum(), Datum::ETRS89);
        assert!(crs.esri_wkt().starts_with("PROJCS[\"ETRS_1989_UTM_Zone_30N\""));
        assert!(crs.esri_wkt().contains("SPHEROID[\"GRS_1980\",6378137.0,298.257222101]"));
    }

    #[test]
    fn utm_south_wkt() {
        let wkt = Crs::from_epsg(32717).expect("known code").esri_wkt();
        assert!(wkt.contains("PARAMETER[\"False_Northing\",10000000.0]"));
        assert!(wkt.contains("PARAMETER[\"Central_Meridian\",-81.0]"));
    }

    #[test]
    fn geographic_wkt() {
        assert_eq!(
            Crs::EPSG4326.esri_wkt(),
            "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]"
        );
    }
}
