pub mod align;
pub mod bounds;
pub mod cube;
pub mod engines;
pub mod file;
pub mod store;
pub mod transforms;

pub use align::{Aligner, Resampling};
pub use bounds::{BoundingBox, DEFAULT_CRS};
pub use cube::{BuildStage, Cube, CubeBuilder, CubeObserver, CubeTarget, LogObserver, PixelWindow, Sources};
pub use engines::gdal_engine::GdalRaster;
pub use file::{OpenRaster, RasterSource};
pub use store::{zarr_store, zarr_store::ZarrStore, ArrayStore, ArrayWriter, MemoryStore};
pub use transforms::GridTransform;
