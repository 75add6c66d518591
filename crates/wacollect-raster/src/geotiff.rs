//! GeoTIFF reading and writing.
//!
//! Files are written as single-band 32-bit float images, deflate compressed,
//! with ModelPixelScale / ModelTiepoint tags for placement, a GeoKey directory
//! for the CRS and a GDAL_NODATA tag declaring `nan` as missing data.

use crate::{GeoTransform, Raster, RasterError, RasterMetadata, Result, SpatialReference};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::compression::{Deflate, DeflateLevel};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// GeoTIFF tag IDs
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_MODELTRANSFORMATION: u16 = 34264;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;

// GeoKey values
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Tiles are 10080 x 10080 f32 = ~400 MB, well above the decoder defaults.
const DECODE_LIMIT_BYTES: usize = 2 * 1024 * 1024 * 1024;

fn tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    let mut limits = Limits::default();
    limits.decoding_buffer_size = DECODE_LIMIT_BYTES;
    limits.intermediate_buffer_size = DECODE_LIMIT_BYTES;
    limits.ifd_value_size = DECODE_LIMIT_BYTES;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(limits))
}

/// Write a raster as a single-band float GeoTIFF.
///
/// Parent directories must already exist.
pub fn save_raster<P: AsRef<Path>>(path: P, raster: &Raster) -> Result<()> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(RasterError::Empty);
    }

    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image_with_compression::<Gray32Float, _>(
        width as u32,
        height as u32,
        Deflate::with_level(DeflateLevel::Balanced),
    )?;

    let gt = raster.geotransform();
    let pixel_scale = [gt.pixel_width, -gt.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];

    {
        let dir = image.encoder();
        dir.write_tag(tag(GEOTIFF_MODELPIXELSCALE), &pixel_scale[..])?;
        dir.write_tag(tag(GEOTIFF_MODELTIEPOINT), &tiepoint[..])?;
        if let Some(epsg) = raster.spatial_reference().epsg() {
            let geokeys: [u16; 16] = [
                1, 1, 0, 3, // version, revision, minor, number of keys
                GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
                GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, epsg,
            ];
            dir.write_tag(tag(GEOTIFF_GEOKEYDIRECTORY), &geokeys[..])?;
        }
        dir.write_tag(tag(GDAL_NODATA), "nan")?;
    }

    image.write_data(raster.data())?;
    Ok(())
}

/// Read a single-band GeoTIFF into memory.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let mut decoder = open_decoder(path)?;
    let metadata = read_metadata_from(&mut decoder, path)?;
    let nodata = read_nodata_value(&mut decoder);
    let mut data = decode_band(&mut decoder)?;

    if let Some(nodata) = nodata.filter(|v| !v.is_nan()) {
        for value in data.iter_mut() {
            if *value == nodata {
                *value = f32::NAN;
            }
        }
    }

    Ok(Raster::new(metadata.width, metadata.height, data, metadata.geotransform)?
        .with_spatial_reference(metadata.spatial_reference))
}

/// Read the geotransform, CRS and dimensions without decoding pixels.
pub fn read_raster_metadata<P: AsRef<Path>>(path: P) -> Result<RasterMetadata> {
    let path = path.as_ref();
    let mut decoder = open_decoder(path)?;
    read_metadata_from(&mut decoder, path)
}

/// Read the pixels of one band (numbered from 1).
pub fn read_raster_band<P: AsRef<Path>>(path: P, band_index: usize) -> Result<Vec<f32>> {
    if band_index != 1 {
        return Err(RasterError::NoSuchBand(band_index));
    }
    Ok(read_raster(path)?.into_data())
}

fn read_metadata_from<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<RasterMetadata> {
    let (width, height) = decoder.dimensions()?;
    let geotransform = read_geotransform(decoder, path)?;
    let spatial_reference = read_spatial_reference(decoder);
    Ok(RasterMetadata {
        geotransform,
        spatial_reference,
        width: width as usize,
        height: height as usize,
    })
}

/// Read the geotransform from tiepoint + pixel scale, or from the
/// transformation matrix when the file uses that instead.
fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(tag(GEOTIFF_MODELTIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(tag(GEOTIFF_MODELPIXELSCALE));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint format: [i, j, k, x, y, z], pixel (i, j) sits at world (x, y)
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(GeoTransform::new(origin_x, scale[0], origin_y, -scale[1]));
        }
    }

    if let Ok(matrix) = decoder.get_tag_f64_vec(tag(GEOTIFF_MODELTRANSFORMATION)) {
        if matrix.len() >= 8 {
            return Ok(GeoTransform::new(matrix[3], matrix[0], matrix[7], matrix[5]));
        }
    }

    Err(RasterError::InvalidGeoTiff(format!(
        "{}: no tiepoint/pixel-scale or transformation tags",
        path.display()
    )))
}

fn read_spatial_reference<R: Read + Seek>(decoder: &mut Decoder<R>) -> SpatialReference {
    let Ok(keys) = decoder.get_tag_u16_vec(tag(GEOTIFF_GEOKEYDIRECTORY)) else {
        return SpatialReference::Undefined;
    };
    // Header is 4 shorts, then 4 shorts per key: id, location, count, value
    keys.get(4..)
        .unwrap_or(&[])
        .chunks_exact(4)
        .find(|entry| entry[0] == GEOGRAPHIC_TYPE_GEO_KEY && entry[1] == 0)
        .map(|entry| SpatialReference::from_epsg(entry[3]))
        .unwrap_or(SpatialReference::Undefined)
}

/// Read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
}

fn decode_band<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;

    match result {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
    }
}
