//! Raster decoding: encoded bytes in, [`Raster`] out.
//!
//! TIFF input (including GeoTIFF) goes through the `tiff` crate so the
//! GeoTIFF tags can be read alongside the pixels. Everything else is
//! handed to the `image` crate and comes back without georeferencing.
//!
//! Channel layout is normalized here so later stages see a fixed order:
//!
//! | samples | result |
//! |---------|--------|
//! | 1 | [`Pixels::Mask`] when binary, [`Pixels::Gray`] otherwise |
//! | 2 (TIFF) | [`Pixels::Rgb`] with channels read as red, green (blue = 0) |
//! | 2 (gray + alpha) | see [`Raster::from_gray_alpha`] |
//! | 3 | [`Pixels::Rgb`] |
//! | 4 | [`Pixels::Rgba`]; alpha `0` marks no-data |
//!
//! Non-TIFF formats only produce two channels for gray plus alpha, so
//! those are read as a single band with a no-data mask. 16-bit samples
//! are reduced to 8 bits by keeping the high byte.

use std::io::Cursor;

use image::DynamicImage;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::georef::{Crs, GeoTransform, Georeference};
use crate::types::{Dimensions, GrayImage, Pixels, PipelineError, Raster, RgbImage, RgbaImage};

/// `ModelPixelScaleTag`.
pub const TAG_PIXEL_SCALE: u16 = 33550;
/// `ModelTiepointTag`.
pub const TAG_TIEPOINT: u16 = 33922;
/// `ModelTransformationTag`.
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
/// `GeoKeyDirectoryTag`.
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

/// `ProjectedCSTypeGeoKey`.
pub const KEY_PROJECTED_CRS: u16 = 3072;
/// `GeographicTypeGeoKey`.
pub const KEY_GEOGRAPHIC_CRS: u16 = 2048;
/// GeoKey value meaning "user-defined", which carries no EPSG code.
const KEY_USER_DEFINED: u16 = 32767;

/// A source of one raster, identified by a stable name.
///
/// The orchestrator loads each source at most once and reports failures
/// against [`id`](Self::id).
pub trait RasterSource {
    /// Identifier used in records and failure reports.
    fn id(&self) -> &str;

    /// Decode the raster.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the source cannot be read or
    /// decoded.
    fn load(&self) -> Result<Raster, PipelineError>;
}

/// An in-memory encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Identifier used in records and failure reports.
    pub id: String,
    /// Encoded image bytes (TIFF, PNG, JPEG, ...).
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// Wrap encoded bytes under an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }
}

impl RasterSource for EncodedImage {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Raster, PipelineError> {
        decode(&self.bytes)
    }
}

/// Whether `bytes` begin with a classic or BigTIFF header.
#[must_use]
pub fn is_tiff(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some(b"II*\0" | b"MM\0*" | b"II+\0" | b"MM\0+")
    )
}

/// Decode raw image bytes into a [`Raster`].
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::TiffDecode`] or [`PipelineError::ImageDecode`]
/// if the data is corrupt or the format is unrecognized.
/// Returns [`PipelineError::InvalidRaster`] for sample layouts that
/// cannot carry red and green channels (floating-point samples, more
/// than four samples per pixel).
#[must_use = "returns the decoded raster"]
pub fn decode(bytes: &[u8]) -> Result<Raster, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    if is_tiff(bytes) {
        decode_tiff(bytes)
    } else {
        let image = image::load_from_memory(bytes)?;
        Ok(from_dynamic(&image))
    }
}

fn decode_tiff(bytes: &[u8]) -> Result<Raster, PipelineError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let georeference = read_georeference(&mut decoder)?;

    let samples = match decoder.read_image()? {
        DecodingResult::U8(data) => data,
        DecodingResult::U16(data) => data.into_iter().map(high_byte).collect(),
        _ => {
            return Err(PipelineError::InvalidRaster(
                "only 8- and 16-bit integer samples are supported".to_string(),
            ));
        }
    };

    let dimensions = Dimensions { width, height };
    let pixels = pixels_from_interleaved(dimensions, samples)?;
    Ok(Raster::new(pixels, georeference))
}

#[allow(clippy::cast_possible_truncation)]
const fn high_byte(sample: u16) -> u8 {
    (sample >> 8) as u8
}

/// Build pixels from chunky interleaved 8-bit samples.
fn pixels_from_interleaved(
    dimensions: Dimensions,
    samples: Vec<u8>,
) -> Result<Pixels, PipelineError> {
    let pixel_count = usize::try_from(dimensions.pixel_count())
        .map_err(|_| PipelineError::InvalidRaster("image too large".to_string()))?;
    if pixel_count == 0 {
        return Err(PipelineError::InvalidRaster("image has no pixels".to_string()));
    }
    if samples.len() % pixel_count != 0 {
        return Err(PipelineError::InvalidRaster(format!(
            "{} samples do not divide evenly into {pixel_count} pixels",
            samples.len()
        )));
    }

    let Dimensions { width, height } = dimensions;
    let short = || PipelineError::InvalidRaster("sample buffer shorter than image".to_string());
    match samples.len() / pixel_count {
        1 => {
            let image = GrayImage::from_raw(width, height, samples).ok_or_else(short)?;
            Ok(Raster::from_single_channel(image, None).pixels().clone())
        }
        2 => {
            let rgb = samples
                .chunks_exact(2)
                .flat_map(|px| [px[0], px[1], 0])
                .collect();
            Ok(Pixels::Rgb(RgbImage::from_raw(width, height, rgb).ok_or_else(short)?))
        }
        3 => Ok(Pixels::Rgb(
            RgbImage::from_raw(width, height, samples).ok_or_else(short)?,
        )),
        4 => Ok(Pixels::Rgba(
            RgbaImage::from_raw(width, height, samples).ok_or_else(short)?,
        )),
        n => Err(PipelineError::InvalidRaster(format!(
            "unsupported sample count {n}; expected 1 to 4"
        ))),
    }
}

/// Convert an `image`-crate decode into a [`Raster`] without georeferencing.
fn from_dynamic(image: &DynamicImage) -> Raster {
    match image.color().channel_count() {
        1 => {
            let gray = match image {
                DynamicImage::ImageLuma16(img) => GrayImage::from_fn(img.width(), img.height(), |x, y| {
                    image::Luma([high_byte(img.get_pixel(x, y).0[0])])
                }),
                other => other.to_luma8(),
            };
            Raster::from_single_channel(gray, None)
        }
        2 => Raster::from_gray_alpha(&image.to_luma_alpha8(), None),
        _ if image.color().has_alpha() => Raster::new(Pixels::Rgba(image.to_rgba8()), None),
        _ => Raster::new(Pixels::Rgb(image.to_rgb8()), None),
    }
}

/// Read GeoTIFF tags into a [`Georeference`].
///
/// `ModelTransformationTag` wins over tiepoint plus scale. Returns
/// `None` when neither is present.
fn read_georeference<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<Georeference>, PipelineError> {
    let transform = if let Some(matrix) = read_f64_tag(decoder, TAG_MODEL_TRANSFORMATION)? {
        GeoTransform::from_model_transformation(&matrix)
    } else {
        match (
            read_f64_tag(decoder, TAG_TIEPOINT)?,
            read_f64_tag(decoder, TAG_PIXEL_SCALE)?,
        ) {
            (Some(tiepoint), Some(scale)) => GeoTransform::from_tiepoint_and_scale(&tiepoint, &scale),
            _ => None,
        }
    };

    let Some(transform) = transform else {
        return Ok(None);
    };

    let crs = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))?
        .map(|value| value.into_u16_vec())
        .transpose()?
        .and_then(|keys| crs_from_geo_keys(&keys));

    Ok(Some(Georeference { transform, crs }))
}

fn read_f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> Result<Option<Vec<f64>>, PipelineError> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|value| value.into_f64_vec())
        .transpose()?)
}

/// Extract the EPSG code from a `GeoKeyDirectoryTag`.
///
/// The directory is a 4-value header followed by 4-value entries
/// `(key, location, count, value)`. Only inline values (location `0`)
/// can hold an EPSG code. A projected CRS takes precedence over a
/// geographic one.
#[must_use]
pub fn crs_from_geo_keys(keys: &[u16]) -> Option<Crs> {
    let entries = keys.get(4..)?;
    let lookup = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
            .filter(|&code| code != 0 && code != KEY_USER_DEFINED)
    };
    lookup(KEY_PROJECTED_CRS)
        .or_else(|| lookup(KEY_GEOGRAPHIC_CRS))
        .map(|code| Crs::epsg(u32::from(code)))
}
