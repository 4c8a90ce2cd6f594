use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CuberError>;

#[derive(thiserror::Error, Debug)]
pub enum CuberError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    ProjError(#[from] proj::ProjError),
    #[error(transparent)]
    ProjCreateError(#[from] proj::ProjCreateError),
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
}

/// Malformed or inconsistent caller input.
#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("no raster sources were given")]
    NoSources,
    #[error("{sources} sources but {labels} time labels")]
    LabelCountMismatch { sources: usize, labels: usize },
    #[error("{path:?} contains no features")]
    NoFeatures { path: PathBuf },
    #[error("first feature of {path:?} has no geometry")]
    NullGeometry { path: PathBuf },
    #[error("first feature of {path:?} has an empty geometry")]
    EmptyGeometry { path: PathBuf },
    #[error("bounding box wraps around (left {left}, bottom {bottom}, right {right}, top {top})")]
    WrappingBounds {
        left: f64,
        bottom: f64,
        right: f64,
        top: f64,
    },
    #[error("parent of {uri:?} does not exist")]
    MissingParent { uri: String },
    #[error("no files matching {pattern:?} in {dir:?}")]
    NoDatedFiles { dir: PathBuf, pattern: String },
    #[error("could not parse {value:?} with {template:?}: {source}")]
    UnparseableDate {
        value: String,
        template: String,
        source: chrono::ParseError,
    },
    #[error("invalid date pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Grids and windows that can not be represented as whole pixels.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("computed grid of {width} x {height} pixels is not a positive integer size")]
    DegenerateGrid { width: f64, height: f64 },
    #[error("grid transform is rotated (b = {b}, d = {d})")]
    RotatedGrid { b: f64, d: f64 },
    #[error("grid pixel size ({a}, {e}) is zero or not finite")]
    DegeneratePixel { a: f64, e: f64 },
    #[error("extent of {crs:?} could not be transformed into {target:?}")]
    UntransformableExtent { crs: String, target: String },
    #[error("pixel window {window:?} is outside of the {height} x {width} grid")]
    WindowOutsideGrid {
        window: [(usize, usize); 2],
        height: usize,
        width: usize,
    },
    #[error("pixel window {window:?} is empty")]
    EmptyWindow { window: [(usize, usize); 2] },
}

/// Failures while reprojecting a source onto a grid.
#[derive(thiserror::Error, Debug)]
pub enum AlignmentError {
    #[error("grid dimensions {width} x {height} are unset")]
    UnsetDimensions { width: usize, height: usize },
    #[error("could not read {description:?}: {source}")]
    Read {
        description: String,
        source: Box<CuberError>,
    },
    #[error("{description:?} can not be reprojected from {from:?} to {to:?}: {source}")]
    Reprojection {
        description: String,
        from: String,
        to: String,
        source: Box<CuberError>,
    },
    #[error("transform of {description:?} is not invertible")]
    NonInvertible { description: String },
    #[error("{description:?} has {available} bands, grid expects {expected:?}")]
    MissingBands {
        description: String,
        available: usize,
        expected: Vec<usize>,
    },
    #[error("source {index} ({description}) failed: {source}")]
    Source {
        index: usize,
        description: String,
        source: Box<CuberError>,
    },
}

/// Failures of the backing array store.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("array at {uri:?} already exists")]
    AlreadyExists { uri: String },
    #[error("no array at {uri:?}")]
    NotFound { uri: String },
    #[error("overwriting an existing array is not supported ({uri:?})")]
    OverwriteUnsupported { uri: String },
    #[error("array at {uri:?} has shape {found:?}, cube needs {expected:?}")]
    ShapeMismatch {
        uri: String,
        expected: [usize; 4],
        found: Vec<u64>,
    },
    #[error("region at {offset:?} with shape {shape:?} does not fit array of shape {array:?}")]
    RegionOutOfBounds {
        offset: [usize; 4],
        shape: [usize; 4],
        array: [usize; 4],
    },
    #[error("array at {uri:?} was poisoned by a panicking writer")]
    Poisoned { uri: String },
    #[error("{uri:?}: {message}")]
    Backend { uri: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn backend(uri: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            uri: uri.to_string(),
            message: err.to_string(),
        }
    }
}
