//! One conversion job: decode, reproject once, then write every requested artifact.
//!
//! A failing artifact does not stop the job. Its error is recorded in the [`ConversionReport`] and the remaining
//! artifacts are still written.

use std::path::{Path, PathBuf};

use geoconv_types::geo::{Crs, Reprojector, SpatialReference};
use geoconv_types::FeatureCollection;

use crate::config::{ConversionConfig, Dimension};
use crate::decode::{self, InputFormat};
use crate::diagnostics::Diagnostics;
use crate::encode::shapefile::WriterSummary;
use crate::encode::{self, Artifact};
use crate::error::GeoconvError;
use crate::heatmap::{self, RasterGrid};

/// Outcome of one artifact of a job.
#[derive(Debug)]
pub struct ArtifactReport {
    /// Requested artifact.
    pub artifact: Artifact,
    /// Written file, or directory for [`Artifact::Shapefile`].
    pub path: PathBuf,
    /// `Ok` if the artifact was written completely.
    pub result: Result<(), GeoconvError>,
    /// Per-writer counts of shapefile artifacts.
    pub writers: Vec<WriterSummary>,
}

impl ArtifactReport {
    /// True if the artifact was written.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a conversion job.
#[derive(Debug)]
pub struct ConversionReport {
    /// Format the input was decoded as.
    pub input_format: InputFormat,
    /// Number of features after decoding.
    pub feature_count: usize,
    /// Entities and rows skipped by the decoder.
    pub diagnostics: Diagnostics,
    pub artifacts: Vec<ArtifactReport>,
}

impl ConversionReport {
    /// True if every artifact was written.
    pub fn is_complete(&self) -> bool {
        self.artifacts.iter().all(ArtifactReport::is_ok)
    }

    /// Report of the given artifact, if it was requested.
    pub fn artifact(&self, artifact: Artifact) -> Option<&ArtifactReport> {
        self.artifacts.iter().find(|a| a.artifact == artifact)
    }
}

/// Collection ready for encoding together with the heatmap input taken from it before z values were dropped.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Reprojected collection, without z values for 2d output.
    pub collection: FeatureCollection,
    /// Decoder diagnostics.
    pub diagnostics: Diagnostics,
    /// Points with elevation in the output CRS.
    pub heatmap_points: Vec<geoconv_types::Coord>,
}

/// Conversion job settings.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: ConversionConfig,
    spatial_ref: SpatialReference,
    artifacts: Vec<Artifact>,
}

impl Pipeline {
    /// Creates a pipeline writing every artifact. The GeoTIFF heatmap is only produced if it is enabled in the
    /// configuration.
    pub fn new(config: ConversionConfig) -> Result<Self, GeoconvError> {
        config.validate()?;
        let spatial_ref = config.spatial_reference()?;

        Ok(Self {
            config,
            spatial_ref,
            artifacts: Artifact::ALL.to_vec(),
        })
    }

    /// Limits the job to the given artifacts.
    pub fn with_artifacts(mut self, artifacts: &[Artifact]) -> Self {
        self.artifacts = artifacts.to_vec();
        self
    }

    /// Configuration of the job.
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Decodes the input, reprojects it into the output CRS and extracts the heatmap points. Z values are
    /// dropped afterwards if the output is 2d.
    pub fn prepare(&self, bytes: &[u8], format: InputFormat) -> Result<Prepared, GeoconvError> {
        let decoded = decode::decode(bytes, format, &self.config)?;
        let mut collection = decoded.collection;

        let reprojector = Reprojector::new(&self.spatial_ref)?;
        reprojector.reproject_in_place(&mut collection)?;
        if !reprojector.is_identity() {
            log::debug!(
                "reprojected {} features from {} to {}",
                collection.len(),
                reprojector.source(),
                reprojector.target()
            );
        }

        let heatmap_points = heatmap::heatmap_points(&collection);
        if self.config.dimension == Dimension::TwoD {
            collection.strip_z();
        }

        Ok(Prepared {
            collection,
            diagnostics: decoded.diagnostics,
            heatmap_points,
        })
    }

    /// Converts a file. Artifacts are written into `output_dir` and named after the input file.
    pub fn convert_file(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<ConversionReport, GeoconvError> {
        let input = input.as_ref();
        let bytes = std::fs::read(input)?;
        let format = input
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(InputFormat::from_extension)
            .unwrap_or_else(|| InputFormat::sniff(&bytes));
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        self.convert(&bytes, format, output_dir, &stem)
    }

    /// Converts an in-memory input. Artifacts are written into `output_dir` with names derived from `stem`.
    ///
    /// Decoding and reprojection errors fail the whole job. Errors of single artifacts are recorded in the
    /// report.
    pub fn convert(
        &self,
        bytes: &[u8],
        format: InputFormat,
        output_dir: impl AsRef<Path>,
        stem: &str,
    ) -> Result<ConversionReport, GeoconvError> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let prepared = self.prepare(bytes, format)?;
        let output_crs = self.spatial_ref.output;

        let mut artifacts = vec![];
        for &artifact in &self.artifacts {
            if artifact == Artifact::GeoTiff && !self.config.heatmap.enabled {
                continue;
            }

            let path = output_dir.join(artifact.file_name(stem));
            let mut writers = vec![];
            let result = self.write_artifact(artifact, &prepared, &path, output_crs, &mut writers);
            match &result {
                Ok(()) => log::info!("{artifact} written to {}", path.display()),
                Err(err) => log::warn!("{artifact} not written: {err}"),
            }

            artifacts.push(ArtifactReport {
                artifact,
                path,
                result,
                writers,
            });
        }

        Ok(ConversionReport {
            input_format: format,
            feature_count: prepared.collection.len(),
            diagnostics: prepared.diagnostics,
            artifacts,
        })
    }

    fn projected_crs(&self) -> Option<Crs> {
        [self.spatial_ref.output, self.spatial_ref.input]
            .into_iter()
            .find(|crs| !crs.is_geographic())
    }

    fn write_artifact(
        &self,
        artifact: Artifact,
        prepared: &Prepared,
        path: &Path,
        output_crs: Crs,
        writers: &mut Vec<WriterSummary>,
    ) -> Result<(), GeoconvError> {
        let collection = &prepared.collection;
        let config = &self.config;

        match artifact {
            Artifact::GeoJson => encode::geojson::write_geojson(collection, path),
            Artifact::Shapefile => {
                *writers = encode::shapefile::write_shapefiles(
                    collection,
                    path,
                    config.grouping,
                    &output_crs,
                )?;
                Ok(())
            }
            Artifact::ShapefileZip => {
                *writers = encode::shapefile::write_shapefile_zip(
                    collection,
                    path,
                    config.grouping,
                    &output_crs,
                )?;
                Ok(())
            }
            Artifact::Kml => encode::kml::write_kml(collection, path, config.kml_style.as_ref()),
            Artifact::Kmz => encode::kml::write_kmz(collection, path, config.kml_style.as_ref()),
            Artifact::Dxf => encode::dxf::write_dxf(
                collection,
                path,
                &config.dxf_style,
                self.projected_crs(),
            )
            .map(|_| ()),
            Artifact::GeoTiff => {
                let grid = self.heatmap(prepared, output_crs)?;
                heatmap::geotiff::write_geotiff(&grid, path)
            }
        }
    }

    fn heatmap(&self, prepared: &Prepared, crs: Crs) -> Result<RasterGrid, GeoconvError> {
        heatmap::generate(&prepared.heatmap_points, crs, &self.config.heatmap)
    }
}
