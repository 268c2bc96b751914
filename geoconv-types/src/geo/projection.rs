use std::fmt::{Debug, Formatter};

use geodesy::prelude::*;

use crate::collection::FeatureCollection;
use crate::coord::Coord;
use crate::error::GeoconvTypesError;
use crate::geo::crs::Crs;
use crate::geo::datum::Datum;

/// Conversion between geographic coordinates (`x = lon`, `y = lat`, degrees) and projected coordinates.
///
/// Only the first two components are converted, the z component is carried over unchanged.
pub trait Projection {
    /// Projects a geographic coordinate. Returns `None` if the coordinate cannot be projected.
    fn project(&self, input: &Coord) -> Option<Coord>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, input: &Coord) -> Option<Coord>;
}

/// Projection backed by a `geodesy` operator definition, e.g. `utm zone=32 ellps=WGS84`.
pub struct GeodesyProjection {
    context: Minimal,
    op: OpHandle,
    definition: String,
}

impl GeodesyProjection {
    /// Builds a projection from a geodesy operator definition, e.g. `utm zone=17 south`.
    pub fn new(definition: &str) -> Result<Self, String> {
        let mut context = Minimal::new();
        let op = context.op(definition).map_err(|err| err.to_string())?;
        Ok(Self {
            context,
            op,
            definition: definition.to_string(),
        })
    }
}

impl Debug for GeodesyProjection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeodesyProjection")
            .field("definition", &self.definition)
            .finish()
    }
}

impl Projection for GeodesyProjection {
    fn project(&self, input: &Coord) -> Option<Coord> {
        let mut data = [Coor2D::geo(input.y, input.x)];
        self.context.apply(self.op, Fwd, &mut data).ok()?;

        let [x, y] = data[0].0;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        Some(Coord { x, y, z: input.z })
    }

    fn unproject(&self, input: &Coord) -> Option<Coord> {
        let mut data = [Coor2D([input.x, input.y])];
        self.context.apply(self.op, Inv, &mut data).ok()?;

        let [lon, lat] = data[0].0;
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }

        Some(Coord {
            x: lon.to_degrees(),
            y: lat.to_degrees(),
            z: input.z,
        })
    }
}

/// Spherical mercator on the datum's semimajor axis.
#[derive(Debug, Copy, Clone)]
pub struct WebMercator {
    datum: Datum,
}

impl WebMercator {
    /// Web Mercator on the sphere of the datum semimajor axis.
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new(Datum::WGS84)
    }
}

impl Projection for WebMercator {
    fn project(&self, input: &Coord) -> Option<Coord> {
        let a = self.datum.semimajor();
        let x = a * input.x.to_radians();
        let y = a * (std::f64::consts::FRAC_PI_4 + input.y.to_radians() / 2.0)
            .tan()
            .ln();

        if x.is_finite() && y.is_finite() {
            Some(Coord { x, y, z: input.z })
        } else {
            None
        }
    }

    fn unproject(&self, input: &Coord) -> Option<Coord> {
        let a = self.datum.semimajor();
        let lat = 2.0 * (input.y / a).exp().atan() - std::f64::consts::FRAC_PI_2;
        let lon = input.x / a;

        if lat.is_finite() && lon.is_finite() {
            Some(Coord {
                x: lon.to_degrees(),
                y: lat.to_degrees(),
                z: input.z,
            })
        } else {
            None
        }
    }
}

/// Source and target coordinate systems of one conversion job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialReference {
    /// System of the decoded coordinates.
    pub input: Crs,
    /// System of the encoded coordinates.
    pub output: Crs,
}

impl SpatialReference {
    /// Creates a pair from the input and output systems.
    pub fn new(input: Crs, output: Crs) -> Self {
        Self { input, output }
    }

    /// Parses both `authority:code` strings.
    pub fn parse(input: &str, output: &str) -> Result<Self, GeoconvTypesError> {
        Ok(Self::new(input.parse()?, output.parse()?))
    }
}

/// Transformer derived from a [`SpatialReference`].
///
/// It is stateless, so one instance can be reused for every coordinate of a job. Note that reprojecting an already
/// reprojected collection transforms it again, unless the input and output systems are the same.
pub struct Reprojector {
    source: Crs,
    target: Crs,
    from_source: Option<Box<dyn Projection>>,
    into_target: Option<Box<dyn Projection>>,
}

impl Debug for Reprojector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl Reprojector {
    /// Prepares the projections of both systems. Fails if either system cannot be projected.
    pub fn new(spatial_ref: &SpatialReference) -> Result<Self, GeoconvTypesError> {
        let source = spatial_ref.input;
        let target = spatial_ref.output;

        if source.epsg_code() == target.epsg_code() {
            return Ok(Self {
                source,
                target,
                from_source: None,
                into_target: None,
            });
        }

        let wrap = |err: GeoconvTypesError| match err {
            GeoconvTypesError::Transformation { reason, .. } => GeoconvTypesError::Transformation {
                from: source.to_string(),
                to: target.to_string(),
                reason,
            },
            other => other,
        };

        Ok(Self {
            source,
            target,
            from_source: source.get_projection().map_err(wrap)?,
            into_target: target.get_projection().map_err(wrap)?,
        })
    }

    /// System coordinates are transformed from.
    pub fn source(&self) -> Crs {
        self.source
    }

    /// System coordinates are transformed to.
    pub fn target(&self) -> Crs {
        self.target
    }

    /// True if the transformer leaves every coordinate unchanged.
    pub fn is_identity(&self) -> bool {
        self.from_source.is_none() && self.into_target.is_none()
    }

    /// Transforms a single coordinate.
    pub fn transform(&self, c: &Coord) -> Result<Coord, GeoconvTypesError> {
        let failed = || GeoconvTypesError::Coordinate { x: c.x, y: c.y };

        let lonlat = match &self.from_source {
            Some(projection) => projection.unproject(c).ok_or_else(failed)?,
            None => *c,
        };

        match &self.into_target {
            Some(projection) => projection.project(&lonlat).ok_or_else(failed),
            None => Ok(lonlat),
        }
    }

    /// Transforms every coordinate of the collection in place. Attributes are not touched.
    ///
    /// If any coordinate fails, the error is returned and the collection is left partially transformed.
    pub fn reproject_in_place(
        &self,
        collection: &mut FeatureCollection,
    ) -> Result<(), GeoconvTypesError> {
        if self.is_identity() {
            return Ok(());
        }

        for c in collection.coords_mut() {
            *c = self.transform(c)?;
        }

        Ok(())
    }

    /// Consumes the collection and returns its reprojected copy.
    pub fn reproject(
        &self,
        mut collection: FeatureCollection,
    ) -> Result<FeatureCollection, GeoconvTypesError> {
        self.reproject_in_place(&mut collection)?;
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureKind};
    use crate::geometry::Geometry;
    use approx::assert_abs_diff_eq;

    fn reprojector(from: &str, to: &str) -> Reprojector {
        Reprojector::new(&SpatialReference::parse(from, to).expect("valid codes"))
            .expect("supported transformation")
    }

    #[test]
    fn utm_central_meridian_on_equator() {
        let r = reprojector("EPSG:4326", "EPSG:32717");
        let projected = r.transform(&Coord::lonlat(-81.0, 0.0)).expect("projectable");
        assert_abs_diff_eq!(projected.x, 500_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(projected.y, 10_000_000.0, epsilon = 1e-3);
    }

    #[test]
    fn reprojected_geographic_coordinates_are_lon_lat() {
        let r = reprojector("EPSG:32633", "EPSG:4326");
        let back = reprojector("EPSG:4326", "EPSG:32633");

        let source = Coord::xyz(15.0, 52.0, 120.0);
        let projected = back.transform(&source).expect("projectable");
        let lonlat = r.transform(&projected).expect("projectable");

        assert_abs_diff_eq!(lonlat.x, 15.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lonlat.y, 52.0, epsilon = 1e-7);
        assert_eq!(lonlat.z, Some(120.0));
    }

    #[test]
    fn web_mercator() {
        let r = reprojector("EPSG:4326", "EPSG:3857");
        let projected = r.transform(&Coord::lonlat(180.0, 0.0)).expect("projectable");
        assert_abs_diff_eq!(projected.x, 20_037_508.342789244, epsilon = 1e-6);
        assert_abs_diff_eq!(projected.y, 0.0, epsilon = 1e-6);

        let r = reprojector("EPSG:3857", "EPSG:4326");
        let lonlat = r
            .transform(&Coord::xy(1_113_194.9079327357, 6_446_275.841017158))
            .expect("projectable");
        assert_abs_diff_eq!(lonlat.x, 10.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lonlat.y, 50.0, epsilon = 1e-7);
    }

    #[test]
    fn same_crs_is_identity() {
        let r = reprojector("EPSG:32717", "epsg:32717");
        assert!(r.is_identity());

        let collection: FeatureCollection =
            vec![Feature::new(Coord::xy(1.0, 2.0), FeatureKind::Point)].into();
        assert_eq!(r.reproject(collection.clone()), Ok(collection));
    }

    #[test]
    fn reproject_keeps_attributes() {
        let r = reprojector("EPSG:4326", "EPSG:32630");
        let collection: FeatureCollection = vec![Feature::new(
            Geometry::LineString(vec![Coord::lonlat(-3.0, 40.0), Coord::lonlat(-3.1, 40.1)]),
            FeatureKind::Track,
        )
        .with_name("morning")]
        .into();

        let reprojected = r.reproject(collection).expect("projectable");
        let feature = &reprojected.features()[0];
        assert_eq!(feature.attributes.name.as_deref(), Some("morning"));
        assert!(feature.geometry.coords().all(|c| c.x > 100_000.0));
    }
}
