use geo::{AffineTransform, Coord, Rect};
use log::{info, warn};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::file::RasterSource,
    crs_geo::{same_crs, CrsTransformer},
    errors::{GeometryError, Result},
};

/// Points sampled along each edge of the source grid
/// when estimating the output extent.
const EDGE_SAMPLES: usize = 21;

/// Pixel grid every raster of a cube is aligned onto.
///
/// Dereferences to its [AffineTransform]:
///     - `a`: pixel width,
///     - `b`, `d`: rotation, always `0`,
///     - `xoff` (`c`): x of the upper left corner,
///     - `e`: pixel height, negative for north up grids,
///     - `yoff` (`f`): y of the upper left corner.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct GridTransform {
    #[shrinkwrap(main_field)]
    transform: AffineTransform,
    width: usize,
    height: usize,
    crs: String,
    bands: Vec<usize>,
}

impl GridTransform {
    pub fn new(
        transform: AffineTransform,
        width: usize,
        height: usize,
        crs: impl Into<String>,
        bands: Vec<usize>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            Err(GeometryError::DegenerateGrid {
                width: width as f64,
                height: height as f64,
            })?
        }
        if transform.b() != 0. || transform.d() != 0. {
            Err(GeometryError::RotatedGrid {
                b: transform.b(),
                d: transform.d(),
            })?
        }
        let (a, e) = (transform.a(), transform.e());
        if !(a.is_finite() && e.is_finite()) || a == 0. || e == 0. {
            Err(GeometryError::DegeneratePixel { a, e })?
        }
        Ok(Self {
            transform,
            width,
            height,
            crs: crs.into(),
            bands,
        })
    }

    /// Grid covering `reference` once reprojected into `crs`.
    ///
    /// Keeps the reference grid as is when it already is in `crs`.
    /// Otherwise picks square pixels approximating the reference
    /// ground resolution over the smallest extent enclosing it.
    pub fn derive(reference: &impl RasterSource, crs: &str) -> Result<Self> {
        let transform = reference.transform()?;
        let (width, height) = reference.size();
        let bands = (1..=reference.num_bands()).collect();
        let reference_crs = reference.crs();
        if same_crs(&reference_crs, crs) {
            info!("{} already in {crs}", reference.description());
            return Self::new(transform, width, height, crs, bands);
        }

        let transformer = CrsTransformer::new(&reference_crs, crs)?;
        let points: Vec<Coord> = edge_points(width, height)
            .filter_map(|pixel| transformer.convert_lossy(transform.apply(pixel)))
            .collect();
        if points.len() < 2 {
            Err(GeometryError::UntransformableExtent {
                crs: reference_crs.clone(),
                target: crs.to_string(),
            })?
        }
        let skipped = 4 * EDGE_SAMPLES - points.len();
        if skipped > 0 {
            warn!("{skipped} edge points of {reference_crs} could not be transformed into {crs}");
        }

        let (min, max) = points.iter().fold(
            (points[0], points[0]),
            |(min, max), point| {
                (
                    Coord { x: min.x.min(point.x), y: min.y.min(point.y) },
                    Coord { x: max.x.max(point.x), y: max.y.max(point.y) },
                )
            },
        );
        let extent = max - min;
        let pixel_diagonal = ((width * width + height * height) as f64).sqrt();
        let pixel_size = extent.x.hypot(extent.y) / pixel_diagonal;
        let out_width = (extent.x / pixel_size).round();
        let out_height = (extent.y / pixel_size).round();
        if !(out_width.is_finite() && out_height.is_finite()) || out_width < 1. || out_height < 1. {
            Err(GeometryError::DegenerateGrid {
                width: out_width,
                height: out_height,
            })?
        }

        let transform = AffineTransform::new(pixel_size, 0., min.x, 0., -pixel_size, max.y);
        let grid = Self::new(transform, out_width as usize, out_height as usize, crs, bands)?;
        info!(
            "derived {} x {} grid in {crs} from {}",
            grid.width,
            grid.height,
            reference.description()
        );
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// 1-based band indexes.
    pub fn bands(&self) -> &[usize] {
        &self.bands
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    /// `(row, col)` of the pixel containing `(lat, lon)`.
    ///
    /// Offsets are taken as absolute values, so points before the
    /// grid origin mirror onto positive indexes.
    pub fn to_row_col(&self, lat: f64, lon: f64) -> (usize, usize) {
        let col = ((lon - self.xoff()) / self.a()).abs().floor();
        let row = ((self.yoff() - lat) / self.e()).abs().floor();
        (row as usize, col as usize)
    }

    /// `[(row0, col0), (row1, col1)]` of the two `(lat, lon)` corners.
    ///
    /// Indexes are not ordered, spans are `row1.abs_diff(row0)`
    /// and `col1.abs_diff(col0)`.
    pub fn slice_bounds(
        &self,
        upper_left: (f64, f64),
        lower_right: (f64, f64),
    ) -> [(usize, usize); 2] {
        [upper_left, lower_right].map(|(lat, lon)| self.to_row_col(lat, lon))
    }

    /// `(lat, lon)` of the upper left corner of pixel `(row, col)`.
    pub fn pixel_corner(&self, row: usize, col: usize) -> (f64, f64) {
        let coord = self.transform.apply(Coord {
            x: col as f64,
            y: row as f64,
        });
        (coord.y, coord.x)
    }

    /// Area covered by the grid in its CRS.
    pub fn extent(&self) -> Rect {
        Rect::new(
            self.transform.apply(Coord { x: 0., y: 0. }),
            self.transform.apply(Coord {
                x: self.width as f64,
                y: self.height as f64,
            }),
        )
    }
}

/// Pixel coords along the border of a `width` x `height` grid,
/// [EDGE_SAMPLES] per edge, corners included.
fn edge_points(width: usize, height: usize) -> impl Iterator<Item = Coord> {
    let (width, height) = (width as f64, height as f64);
    let steps = (EDGE_SAMPLES - 1) as f64;
    (0..EDGE_SAMPLES).flat_map(move |idx| {
        let ratio = idx as f64 / steps;
        [
            Coord { x: ratio * width, y: 0. },
            Coord { x: ratio * width, y: height },
            Coord { x: 0., y: ratio * height },
            Coord { x: width, y: ratio * height },
        ]
    })
}
