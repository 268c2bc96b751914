//! GeoTIFF writer of heatmap rasters.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::error::GeoconvError;
use crate::heatmap::RasterGrid;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Content of the GeoKeyDirectory tag for the CRS of the grid.
pub fn geo_keys(grid: &RasterGrid) -> Vec<u16> {
    let code = grid.crs.epsg_code() as u16;
    let (model_type, crs_key) = if grid.crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };

    vec![
        // version, revision, minor revision, number of keys
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, code,
    ]
}

/// GDAL metadata XML with the band statistics.
pub fn gdal_metadata(grid: &RasterGrid) -> String {
    let mut xml = String::from("<GDALMetadata>");
    if let Some(stats) = grid.statistics {
        for (name, value) in [
            ("STATISTICS_MINIMUM", stats.min),
            ("STATISTICS_MAXIMUM", stats.max),
            ("STATISTICS_MEAN", stats.mean),
            ("STATISTICS_STDDEV", stats.std_dev),
        ] {
            xml.push_str(&format!(
                "<Item name=\"{name}\" sample=\"0\" role=\"statistics\">{value}</Item>"
            ));
        }
        xml.push_str(&format!(
            "<Item name=\"STATISTICS_VALID_PERCENT\" sample=\"0\" role=\"statistics\">{}</Item>",
            100.0 * stats.valid_count as f64 / grid.band.len().max(1) as f64
        ));
    }
    xml.push_str("</GDALMetadata>");
    xml
}

/// Encodes the grid as a single band Float32 GeoTIFF.
pub fn encode<W: Write + Seek>(grid: &RasterGrid, writer: W) -> Result<(), GeoconvError> {
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;

    let (dx, dy) = grid.pixel_size;
    let pixel_scale = [dx, -dy, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, grid.origin.0, grid.origin.1, 0.0];

    let directory = image.encoder();
    directory.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])?;
    directory.write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    directory.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys(grid)[..])?;
    directory.write_tag(Tag::Unknown(GDAL_METADATA), gdal_metadata(grid).as_str())?;
    directory.write_tag(Tag::Unknown(GDAL_NODATA), "nan")?;

    image.write_data(&grid.band)?;
    Ok(())
}

/// Writes the grid into a GeoTIFF file.
pub fn write_geotiff(grid: &RasterGrid, path: impl AsRef<Path>) -> Result<(), GeoconvError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    encode(grid, &mut writer)?;
    writer.flush()?;

    log::info!(
        "wrote {}x{} heatmap to {}",
        grid.width,
        grid.height,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heatmap::BandStatistics;
    use geoconv_types::geo::Crs;
    use tiff::decoder::{Decoder, DecodingResult};

    fn grid() -> RasterGrid {
        let band = vec![1.0, 2.0, f32::NAN, 4.0];
        RasterGrid {
            origin: (500000.0, 9800020.0),
            pixel_size: (10.0, -10.0),
            width: 2,
            height: 2,
            crs: Crs::from_epsg(32717).expect("supported"),
            statistics: BandStatistics::compute(&band),
            band,
        }
    }

    #[test]
    fn geo_keys_of_projected_crs() {
        assert_eq!(
            geo_keys(&grid()),
            vec![1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32717]
        );
    }

    #[test]
    fn writes_georeferenced_float_band() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("heatmap.tif");
        write_geotiff(&grid(), &path).expect("written");

        let mut decoder = Decoder::new(File::open(&path).expect("file")).expect("decoder");
        assert_eq!(decoder.dimensions().expect("dimensions"), (2, 2));
        assert_eq!(
            decoder
                .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
                .expect("pixel scale"),
            vec![10.0, 10.0, 0.0]
        );
        assert_eq!(
            decoder
                .get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT))
                .expect("tiepoint"),
            vec![0.0, 0.0, 0.0, 500000.0, 9800020.0, 0.0]
        );
        let metadata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_METADATA))
            .expect("metadata");
        assert!(metadata.contains("<Item name=\"STATISTICS_MAXIMUM\" sample=\"0\" role=\"statistics\">4</Item>"));

        let DecodingResult::F32(values) = decoder.read_image().expect("image") else {
            panic!("expected f32 band");
        };
        assert_eq!(values[0], 1.0);
        assert!(values[2].is_nan());
    }
}
