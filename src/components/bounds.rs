use std::path::Path;

use gdal::{vector::LayerAccess, Dataset as GdalDataset};
use geo::BoundingRect;
use log::debug;
use serde::Serialize;

use crate::{
    crs_geo::CrsTransformer,
    errors::{InputError, Result},
};

/// CRS assumed for bounding boxes when none is given.
pub const DEFAULT_CRS: &str = "EPSG:4326";

/// Points sampled along each edge when moving a box between CRS.
const DENSIFY_PTS: i32 = 21;

/// Geographic rectangle clipping a cube.
///
/// Corner points are kept as `(y, x)` pairs, i.e. `(lat, lon)` for
/// geographic CRS:
///     - `upper_left`: `(top, left)`,
///     - `lower_right`: `(bottom, right)`.
///
/// Boxes crossing the antimeridian or a pole have `right < left` or
/// `top < bottom`. They are kept as given, see [BoundingBox::is_wrapping].
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
    crs: String,
    upper_left: (f64, f64),
    lower_right: (f64, f64),
}

impl BoundingBox {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64, crs: impl Into<String>) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
            crs: crs.into(),
            upper_left: (top, left),
            lower_right: (bottom, right),
        }
    }

    /// Box in [DEFAULT_CRS].
    pub fn geographic(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self::new(left, bottom, right, top, DEFAULT_CRS)
    }

    /// Enclosing rectangle of the first feature in a vector file (e.g. GeoJSON).
    pub fn from_geometry_file(path: impl AsRef<Path>, crs: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let dataset = GdalDataset::open(path)?;
        if dataset.layer_count() == 0 {
            Err(InputError::NoFeatures { path: path.into() })?
        }
        let mut layer = dataset.layer(0)?;
        let feature = layer
            .features()
            .next()
            .ok_or_else(|| InputError::NoFeatures { path: path.into() })?;
        let geometry = feature
            .geometry()
            .ok_or_else(|| InputError::NullGeometry { path: path.into() })?
            .to_geo()?;
        let rect = geometry
            .bounding_rect()
            .ok_or_else(|| InputError::EmptyGeometry { path: path.into() })?;
        debug!("bounds of {path:?}: {rect:?}");
        Ok(Self::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
            crs.unwrap_or(DEFAULT_CRS),
        ))
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// `(top, left)`
    pub fn upper_left(&self) -> (f64, f64) {
        self.upper_left
    }

    /// `(bottom, right)`
    pub fn lower_right(&self) -> (f64, f64) {
        self.lower_right
    }

    /// Crosses the antimeridian or a pole.
    pub fn is_wrapping(&self) -> bool {
        self.right < self.left || self.top < self.bottom
    }

    /// Clones if crs is same.
    pub fn in_crs(&self, crs: &str) -> Result<Self> {
        let transformer = CrsTransformer::new(&self.crs, crs)?;
        if transformer.is_identity() {
            return Ok(self.clone());
        }
        let [left, bottom, right, top] = transformer
            .convert_bounds([self.left, self.bottom, self.right, self.top], DENSIFY_PTS)?;
        Ok(Self::new(left, bottom, right, top, crs))
    }

    /// Rejects wrapping boxes, which can not be sliced out of a single grid.
    pub(crate) fn ensure_not_wrapping(&self) -> Result<()> {
        if self.is_wrapping() {
            Err(InputError::WrappingBounds {
                left: self.left,
                bottom: self.bottom,
                right: self.right,
                top: self.top,
            })?
        }
        Ok(())
    }
}
