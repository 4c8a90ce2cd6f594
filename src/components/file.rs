use geo::{AffineTransform, Coord, Rect};
use ndarray::{Array2, Array3, Axis, ErrorKind, ShapeError};
use std::{fmt::Debug, path::Path};

use crate::errors::Result;

/// Georeferenced raster a cube can be built from.
pub trait RasterSource: Debug {
    fn description(&self) -> String;
    /// (width, height) in pixels.
    fn size(&self) -> (usize, usize);
    fn crs(&self) -> String;
    fn transform(&self) -> Result<AffineTransform>;
    fn num_bands(&self) -> usize;
    /// Full band as (H, W), `index` is 1-based.
    fn read_band(&self, index: usize) -> Result<Array2<f64>>;

    /// Bands stacked as (C, H, W).
    fn read_bands(&self, indexes: &[usize]) -> Result<Array3<f64>> {
        let (width, height) = self.size();
        let mut array = Array3::zeros((indexes.len(), height, width));
        for (mut band_array, index) in array.axis_iter_mut(Axis(0)).zip(indexes) {
            let band = self.read_band(*index)?;
            if band.dim() != band_array.dim() {
                Err(ShapeError::from_kind(ErrorKind::IncompatibleShape))?
            }
            band_array.assign(&band);
        }
        Ok(array)
    }

    /// Area covered in the raster crs.
    fn bounds(&self) -> Result<Rect> {
        let transform = self.transform()?;
        let (width, height) = self.size();
        Ok(Rect::new(
            transform.apply(Coord { x: 0., y: 0. }),
            transform.apply(Coord {
                x: width as f64,
                y: height as f64,
            }),
        ))
    }
}

/// [RasterSource] that can be opened from a path.
pub trait OpenRaster: RasterSource + Sized {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>;
}
