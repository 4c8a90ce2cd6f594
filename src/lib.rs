//! Stack dated rasters into band × row × col × time cubes.
//!
//! Every raster is reprojected and resampled onto the grid of the first one,
//! clipped to a bounding box, and written as one time slice of the cube.

mod components;
pub mod config;
pub mod crs_geo;
pub mod dates;
mod errors;
#[cfg(test)]
mod testing;

pub use components::{
    zarr_store, Aligner, ArrayStore, ArrayWriter, BoundingBox, BuildStage, Cube, CubeBuilder,
    CubeObserver, CubeTarget, GdalRaster, GridTransform, LogObserver, MemoryStore, OpenRaster,
    PixelWindow, RasterSource, Resampling, Sources, ZarrStore, DEFAULT_CRS,
};
pub use config::CubeConfig;
pub use dates::{DateGlob, DatedFile};
pub use errors::{AlignmentError, CuberError, GeometryError, InputError, Result, StorageError};
