//! In-memory rasters for unit tests.

use geo::AffineTransform;
use ndarray::{Array2, Array3, Axis};
use std::path::Path;

use crate::{
    components::file::{OpenRaster, RasterSource},
    errors::{CuberError, Result},
};

#[derive(Debug, Clone)]
pub struct MemRaster {
    pub name: String,
    /// (C, H, W)
    pub data: Array3<f64>,
    pub transform: AffineTransform,
    pub crs: String,
}

impl MemRaster {
    pub fn new(data: Array3<f64>, transform: AffineTransform, crs: &str) -> Self {
        Self {
            name: "mem".to_string(),
            data,
            transform,
            crs: crs.to_string(),
        }
    }

    pub fn constant(
        bands: usize,
        height: usize,
        width: usize,
        transform: AffineTransform,
        crs: &str,
        value: f64,
    ) -> Self {
        Self::new(
            Array3::from_elem((bands, height, width), value),
            transform,
            crs,
        )
    }

    /// Pixel value is `band * 10_000 + row * 100 + col`.
    pub fn indexed(
        bands: usize,
        height: usize,
        width: usize,
        transform: AffineTransform,
        crs: &str,
    ) -> Self {
        Self::new(
            Array3::from_shape_fn((bands, height, width), |(band, row, col)| {
                (band * 10_000 + row * 100 + col) as f64
            }),
            transform,
            crs,
        )
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl RasterSource for MemRaster {
    fn description(&self) -> String {
        self.name.clone()
    }
    fn size(&self) -> (usize, usize) {
        let (_, height, width) = self.data.dim();
        (width, height)
    }
    fn crs(&self) -> String {
        self.crs.clone()
    }
    fn transform(&self) -> Result<AffineTransform> {
        Ok(self.transform)
    }
    fn num_bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }
    fn read_band(&self, index: usize) -> Result<Array2<f64>> {
        if index == 0 || index > self.num_bands() {
            Err(gdal::errors::GdalError::BadArgument(format!(
                "band {index} out of range"
            )))?
        }
        Ok(self.data.index_axis(Axis(0), index - 1).to_owned())
    }
}

impl OpenRaster for MemRaster {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Err(CuberError::GdalError(gdal::errors::GdalError::BadArgument(
            format!("{:?} is not an in-memory raster", path.as_ref()),
        )))
    }
}
