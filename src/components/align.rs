use geo::Coord;
use log::debug;
use ndarray::{parallel::prelude::*, Array2, Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::{
    components::{file::RasterSource, transforms::GridTransform},
    crs_geo::CrsTransformer,
    errors::{AlignmentError, Result},
};

/// How destination pixels are computed from the source ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
}

impl Resampling {
    /// Value of `band` at fractional pixel coords `pixel`
    /// (`x` along columns, `y` along rows, origin at the upper left corner).
    ///
    /// `None` outside of the band.
    fn sample(&self, band: &ArrayView2<f64>, pixel: Coord) -> Option<f64> {
        let (height, width) = band.dim();
        let inside = (0. ..width as f64).contains(&pixel.x) && (0. ..height as f64).contains(&pixel.y);
        if !inside {
            return None;
        }
        match self {
            Resampling::Nearest => Some(band[[pixel.y as usize, pixel.x as usize]]),
            Resampling::Bilinear => {
                // centre based coords, clamped to the outer pixel centres
                let x = (pixel.x - 0.5).clamp(0., (width - 1) as f64);
                let y = (pixel.y - 0.5).clamp(0., (height - 1) as f64);
                let (col0, row0) = (x.floor() as usize, y.floor() as usize);
                let (col1, row1) = ((col0 + 1).min(width - 1), (row0 + 1).min(height - 1));
                let (tx, ty) = (x - col0 as f64, y - row0 as f64);
                let top = band[[row0, col0]] * (1. - tx) + band[[row0, col1]] * tx;
                let bottom = band[[row1, col0]] * (1. - tx) + band[[row1, col1]] * tx;
                Some(top * (1. - ty) + bottom * ty)
            }
        }
    }
}

/// Reprojects rasters onto a [GridTransform].
#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    resampling: Resampling,
    nodata: f64,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(Resampling::default(), f64::NAN)
    }
}

impl Aligner {
    /// `nodata` fills pixels the source does not cover.
    pub fn new(resampling: Resampling, nodata: f64) -> Self {
        Self { resampling, nodata }
    }

    pub fn resampling(&self) -> Resampling {
        self.resampling
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// Array (C, H, W) of the `grid` bands of `source` resampled onto `grid`.
    pub fn align(&self, source: &impl RasterSource, grid: &GridTransform) -> Result<Array3<f64>> {
        let (width, height) = (grid.width(), grid.height());
        if width == 0 || height == 0 {
            Err(AlignmentError::UnsetDimensions { width, height })?
        }
        let description = source.description();
        let available = source.num_bands();
        if grid.bands().iter().any(|band| *band == 0 || *band > available) {
            Err(AlignmentError::MissingBands {
                description: description.clone(),
                available,
                expected: grid.bands().to_vec(),
            })?
        }

        let read_error = |err| AlignmentError::Read {
            description: description.clone(),
            source: Box::new(err),
        };
        let source_transform = source.transform().map_err(read_error)?;
        let inverse = source_transform
            .inverse()
            .ok_or_else(|| AlignmentError::NonInvertible {
                description: description.clone(),
            })?;
        let data = source.read_bands(grid.bands()).map_err(read_error)?;

        debug!(
            "aligning {description} onto {width} x {height} grid with {:?}",
            self.resampling
        );
        let source_crs = source.crs();
        let transformer = CrsTransformer::new(grid.crs(), &source_crs).map_err(|err| {
            AlignmentError::Reprojection {
                description: description.clone(),
                from: grid.crs().to_string(),
                to: source_crs.clone(),
                source: Box::new(err),
            }
        })?;
        // Source pixel coords of every destination pixel centre.
        let lookup = Array2::from_shape_fn((height, width), |(row, col)| {
            let centre = grid.transform().apply(Coord {
                x: col as f64 + 0.5,
                y: row as f64 + 0.5,
            });
            transformer
                .convert_lossy(centre)
                .map(|coord| inverse.apply(coord))
        });

        let mut aligned = Array3::from_elem((grid.bands().len(), height, width), self.nodata);
        aligned
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(data.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut aligned_band, source_band)| {
                Zip::from(&mut aligned_band)
                    .and(&lookup)
                    .for_each(|value, pixel| {
                        if let Some(sampled) =
                            pixel.and_then(|pixel| self.resampling.sample(&source_band, pixel))
                        {
                            *value = sampled;
                        }
                    })
            });
        Ok(aligned)
    }
}
