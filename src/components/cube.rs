use log::{debug, info};
use ndarray::{s, Array3, Array4, ArrayView3, Axis};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::{
    components::{
        align::Aligner,
        bounds::BoundingBox,
        file::OpenRaster,
        store::{ArrayStore, ArrayWriter, MemoryStore},
        transforms::GridTransform,
    },
    config::CubeConfig,
    errors::{AlignmentError, CuberError, GeometryError, InputError, Result, StorageError},
};

/// Uri of cubes built by [CubeBuilder::build_in_memory].
const MEMORY_URI: &str = "memory://cube";

/// Rasters to stack, one per time step.
///
/// Either every raster is already open, or every raster is a path
/// each worker opens on its own.
#[derive(Debug)]
pub enum Sources<R> {
    Open(Vec<R>),
    Paths(Vec<PathBuf>),
}

impl<R> Sources<R> {
    pub fn len(&self) -> usize {
        match self {
            Sources::Open(rasters) => rasters.len(),
            Sources::Paths(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> From<Vec<PathBuf>> for Sources<R> {
    fn from(paths: Vec<PathBuf>) -> Self {
        Sources::Paths(paths)
    }
}

/// Pixel region of the aligned grid kept in the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub height: usize,
    pub width: usize,
}

impl PixelWindow {
    /// Normalise the corner indexes of [GridTransform::slice_bounds]
    /// into a window lying inside `grid`.
    pub fn new(bounds: [(usize, usize); 2], grid: &GridTransform) -> Result<Self> {
        let [(row0, col0), (row1, col1)] = bounds;
        let window = Self {
            row_off: row0.min(row1),
            col_off: col0.min(col1),
            height: row0.abs_diff(row1),
            width: col0.abs_diff(col1),
        };
        if window.height == 0 || window.width == 0 {
            Err(GeometryError::EmptyWindow { window: bounds })?
        }
        if window.row_off + window.height > grid.height()
            || window.col_off + window.width > grid.width()
        {
            Err(GeometryError::WindowOutsideGrid {
                window: bounds,
                height: grid.height(),
                width: grid.width(),
            })?
        }
        Ok(window)
    }

    /// View of the window over an aligned (C, H, W) array.
    pub fn crop<'a>(&self, array: &'a Array3<f64>) -> ArrayView3<'a, f64> {
        array.slice(s![
            ..,
            self.row_off..self.row_off + self.height,
            self.col_off..self.col_off + self.width
        ])
    }
}

/// Whether `bbox`, in the grid CRS, lies inside the grid extent.
///
/// `to_row_col` mirrors points before the grid origin onto positive
/// indexes, so those have to be caught here.
fn covers(grid: &GridTransform, bbox: &BoundingBox) -> bool {
    let extent = grid.extent();
    let tolerance = 1e-9 * grid.a().abs().max(grid.e().abs());
    bbox.left() >= extent.min().x - tolerance
        && bbox.right() <= extent.max().x + tolerance
        && bbox.bottom() >= extent.min().y - tolerance
        && bbox.top() <= extent.max().y + tolerance
}

/// Description of a band × row × col × time cube.
///
/// Everything is known before pixels are read, so storage
/// can be allocated up front.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cube {
    uri: String,
    attr: String,
    width: usize,
    height: usize,
    bands: Vec<usize>,
    labels: Vec<String>,
    crs: String,
    bbox: BoundingBox,
    window: PixelWindow,
    /// Gdal ordered geotransform of the cube pixels.
    geo_transform: [f64; 6],
}

impl Cube {
    pub fn new(
        uri: &str,
        attr: &str,
        grid: &GridTransform,
        bbox: &BoundingBox,
        labels: Vec<String>,
    ) -> Result<Self> {
        let grid_bbox = bbox.in_crs(grid.crs())?;
        let bounds = grid.slice_bounds(grid_bbox.upper_left(), grid_bbox.lower_right());
        if !covers(grid, &grid_bbox) {
            Err(GeometryError::WindowOutsideGrid {
                window: bounds,
                height: grid.height(),
                width: grid.width(),
            })?
        }
        let window = PixelWindow::new(bounds, grid)?;
        let (origin_y, origin_x) = grid.pixel_corner(window.row_off, window.col_off);
        Ok(Self {
            uri: uri.to_string(),
            attr: attr.to_string(),
            width: window.width,
            height: window.height,
            bands: grid.bands().to_vec(),
            labels,
            crs: grid.crs().to_string(),
            bbox: grid_bbox,
            window,
            geo_transform: [origin_x, grid.a(), 0., origin_y, 0., grid.e()],
        })
    }

    /// (C, H, W, T)
    pub fn shape(&self) -> [usize; 4] {
        [self.bands.len(), self.height, self.width, self.labels.len()]
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> &[usize] {
        &self.bands
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// Requested box in the cube CRS.
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn window(&self) -> &PixelWindow {
        &self.window
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        self.geo_transform
    }

    /// Attributes written once when the cube storage is created.
    pub fn metadata(&self) -> Vec<(&'static str, Value)> {
        let (top, left) = self.bbox.upper_left();
        let (bottom, right) = self.bbox.lower_right();
        vec![
            ("crs", json!(self.crs)),
            ("upper_left", json!([top, left])),
            ("lower_right", json!([bottom, right])),
            ("attr", json!(self.attr)),
            ("bands", json!(self.bands)),
            ("time_labels", json!(self.labels)),
            ("geo_transform", json!(self.geo_transform)),
        ]
    }
}

/// Where a cube is written.
#[derive(Debug)]
pub struct CubeTarget<'a, S> {
    pub store: &'a S,
    pub uri: &'a str,
    /// Allocate the array and write metadata, otherwise
    /// write into an existing array of the same shape.
    pub create: bool,
}

impl<'a, S: ArrayStore> CubeTarget<'a, S> {
    pub fn create(store: &'a S, uri: &'a str) -> Self {
        Self {
            store,
            uri,
            create: true,
        }
    }

    pub fn existing(store: &'a S, uri: &'a str) -> Self {
        Self {
            store,
            uri,
            create: false,
        }
    }
}

/// Progress of [CubeBuilder::build].
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStage {
    Validating,
    GridDerived,
    StorageAllocated,
    /// Source at this index is being aligned and written.
    Writing(usize),
    Complete,
    Failed(String),
}

/// Receives build progress, possibly from several workers at once.
pub trait CubeObserver: Sync {
    fn on_stage(&self, _stage: &BuildStage) {}
    fn on_source_written(&self, _index: usize, _label: &str) {}
}

/// Logs build progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CubeObserver for LogObserver {
    fn on_stage(&self, stage: &BuildStage) {
        match stage {
            BuildStage::Writing(index) => debug!("writing source {index}"),
            BuildStage::Failed(reason) => log::error!("cube build failed: {reason}"),
            stage => info!("cube build: {stage:?}"),
        }
    }

    fn on_source_written(&self, index: usize, label: &str) {
        info!("source {index} written at {label}");
    }
}

fn source_error(index: usize, description: String, err: CuberError) -> CuberError {
    AlignmentError::Source {
        index,
        description,
        source: Box::new(err),
    }
    .into()
}

/// Aligns rasters onto the grid of the first one and stacks them into a [Cube].
pub struct CubeBuilder<'o> {
    config: CubeConfig,
    observer: &'o dyn CubeObserver,
}

impl CubeBuilder<'static> {
    pub fn new(config: CubeConfig) -> Self {
        Self {
            config,
            observer: &LogObserver,
        }
    }
}

impl Default for CubeBuilder<'static> {
    fn default() -> Self {
        Self::new(CubeConfig::default())
    }
}

impl<'o> CubeBuilder<'o> {
    pub fn with_observer<'n>(self, observer: &'n dyn CubeObserver) -> CubeBuilder<'n> {
        CubeBuilder {
            config: self.config,
            observer,
        }
    }

    pub fn config(&self) -> &CubeConfig {
        &self.config
    }

    /// Build the cube of `sources` in `output_crs` clipped to `bbox`,
    /// `labels` names the time step of each source.
    ///
    /// Slices written before a failing source are kept, the cube
    /// is only complete when this returns `Ok`.
    pub fn build<R, S>(
        &self,
        sources: Sources<R>,
        output_crs: &str,
        bbox: &BoundingBox,
        labels: &[String],
        target: CubeTarget<S>,
    ) -> Result<Cube>
    where
        R: OpenRaster + Send,
        S: ArrayStore,
    {
        let result = self.try_build(sources, output_crs, bbox, labels, target);
        if let Err(err) = &result {
            self.observer.on_stage(&BuildStage::Failed(err.to_string()));
        }
        result
    }

    /// Same as [CubeBuilder::build], keeping the cube in memory.
    pub fn build_in_memory<R>(
        &self,
        sources: Sources<R>,
        output_crs: &str,
        bbox: &BoundingBox,
        labels: &[String],
    ) -> Result<(Cube, Array4<f64>)>
    where
        R: OpenRaster + Send,
    {
        let store = MemoryStore::default();
        let cube = self.build(
            sources,
            output_crs,
            bbox,
            labels,
            CubeTarget::create(&store, MEMORY_URI),
        )?;
        let array = store.take(MEMORY_URI)?;
        Ok((cube, array))
    }

    fn try_build<R, S>(
        &self,
        sources: Sources<R>,
        output_crs: &str,
        bbox: &BoundingBox,
        labels: &[String],
        target: CubeTarget<S>,
    ) -> Result<Cube>
    where
        R: OpenRaster + Send,
        S: ArrayStore,
    {
        self.observer.on_stage(&BuildStage::Validating);
        if sources.is_empty() {
            Err(InputError::NoSources)?
        }
        if sources.len() != labels.len() {
            Err(InputError::LabelCountMismatch {
                sources: sources.len(),
                labels: labels.len(),
            })?
        }
        bbox.ensure_not_wrapping()?;
        if self.config.overwrite {
            Err(StorageError::OverwriteUnsupported {
                uri: target.uri.to_string(),
            })?
        }

        let grid = Self::derive_grid(&sources, output_crs)?;
        self.observer.on_stage(&BuildStage::GridDerived);

        let cube = Cube::new(target.uri, &self.config.attr, &grid, bbox, labels.to_vec())?;
        info!("cube {} of shape {:?} in {}", cube.uri, cube.shape(), cube.crs);
        let writer = Self::open_writer(&cube, &target)?;
        self.observer.on_stage(&BuildStage::StorageAllocated);

        self.write_sources(sources, &grid, &cube, &writer)?;
        self.observer.on_stage(&BuildStage::Complete);
        Ok(cube)
    }

    fn derive_grid<R: OpenRaster>(sources: &Sources<R>, crs: &str) -> Result<GridTransform> {
        match sources {
            Sources::Open(rasters) => GridTransform::derive(&rasters[0], crs),
            Sources::Paths(paths) => {
                let reference = R::open(&paths[0])
                    .map_err(|err| source_error(0, paths[0].display().to_string(), err))?;
                GridTransform::derive(&reference, crs)
            }
        }
    }

    /// Metadata is written here, before the writer is shared with workers.
    fn open_writer<S: ArrayStore>(cube: &Cube, target: &CubeTarget<S>) -> Result<S::Writer> {
        if target.create {
            target.store.allocate(target.uri, cube.shape())?;
            let mut writer = target.store.open_for_write(target.uri)?;
            for (key, value) in cube.metadata() {
                writer.set_metadata(key, value)?;
            }
            Ok(writer)
        } else {
            let writer = target.store.open_for_write(target.uri)?;
            if writer.shape() != cube.shape() {
                Err(StorageError::ShapeMismatch {
                    uri: target.uri.to_string(),
                    expected: cube.shape(),
                    found: writer.shape().iter().map(|dim| *dim as u64).collect(),
                })?
            }
            Ok(writer)
        }
    }

    fn write_sources<R, W>(
        &self,
        sources: Sources<R>,
        grid: &GridTransform,
        cube: &Cube,
        writer: &W,
    ) -> Result<()>
    where
        R: OpenRaster + Send,
        W: ArrayWriter,
    {
        let aligner = Aligner::new(self.config.resampling, self.config.nodata_value());
        let write = |index: usize, source: &R| -> Result<()> {
            self.observer.on_stage(&BuildStage::Writing(index));
            let aligned = aligner
                .align(source, grid)
                .map_err(|err| source_error(index, source.description(), err))?;
            let slab = cube.window.crop(&aligned).insert_axis(Axis(3));
            writer.write_region([0, 0, 0, index], slab)?;
            self.observer.on_source_written(index, &cube.labels[index]);
            Ok(())
        };
        let open_and_write = |(index, path): (usize, &PathBuf)| -> Result<()> {
            let source =
                R::open(path).map_err(|err| source_error(index, path.display().to_string(), err))?;
            write(index, &source)
        };

        match (sources, self.config.parallel) {
            (Sources::Open(rasters), true) => rasters
                .into_par_iter()
                .enumerate()
                .try_for_each(|(index, source)| write(index, &source)),
            (Sources::Open(rasters), false) => rasters
                .iter()
                .enumerate()
                .try_for_each(|(index, source)| write(index, source)),
            (Sources::Paths(paths), true) => {
                paths.par_iter().enumerate().try_for_each(open_and_write)
            }
            (Sources::Paths(paths), false) => paths.iter().enumerate().try_for_each(open_and_write),
        }
    }
}
