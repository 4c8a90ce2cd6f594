use std::{fmt::Debug, path::Path};

use geo::AffineTransform;
use ndarray::Array2;

use crate::{
    components::file::{OpenRaster, RasterSource},
    errors::Result,
};

/// Implementations for gdal
pub mod gdal_engine {
    use super::*;
    use gdal::{Dataset as GdalDataset, Metadata as GdalMetadata};
    use std::path::PathBuf;

    fn affine_from_gdal(gdal_transform: [f64; 6]) -> AffineTransform {
        AffineTransform::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    /// Raster dataset opened through gdal.
    ///
    /// Any gdal readable raster works (GeoTIFF, VRT, `MEM`, ...).
    pub struct GdalRaster {
        path: Option<PathBuf>,
        dataset: GdalDataset,
    }

    impl Debug for GdalRaster {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("GdalRaster")
                .field("description", &self.description())
                .field("size", &self.size())
                .field("bands", &self.num_bands())
                .finish()
        }
    }

    impl GdalRaster {
        /// Wrap an already open dataset.
        pub fn from_dataset(dataset: GdalDataset) -> Self {
            Self {
                path: None,
                dataset,
            }
        }

        pub fn path(&self) -> Option<&Path> {
            self.path.as_deref()
        }

        pub fn dataset(&self) -> &GdalDataset {
            &self.dataset
        }
    }

    impl OpenRaster for GdalRaster {
        fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            Ok(GdalRaster {
                path: Some(path.as_ref().to_path_buf()),
                dataset: GdalDataset::open(&path)?,
            })
        }
    }

    impl RasterSource for GdalRaster {
        fn description(&self) -> String {
            match &self.path {
                Some(path) => path.display().to_string(),
                None => GdalMetadata::description(&self.dataset).unwrap_or_default(),
            }
        }
        fn size(&self) -> (usize, usize) {
            self.dataset.raster_size()
        }
        /// `AUTHORITY:CODE` when gdal knows it, the WKT otherwise.
        fn crs(&self) -> String {
            self.dataset
                .spatial_ref()
                .ok()
                .and_then(|srs| Some(format!("{}:{}", srs.auth_name()?, srs.auth_code().ok()?)))
                .unwrap_or_else(|| self.dataset.projection())
        }
        fn transform(&self) -> Result<AffineTransform> {
            Ok(affine_from_gdal(self.dataset.geo_transform()?))
        }
        fn num_bands(&self) -> usize {
            self.dataset.raster_count()
        }
        fn read_band(&self, index: usize) -> Result<Array2<f64>> {
            let size = self.size();
            let buffer = self
                .dataset
                .rasterband(index)?
                .read_as::<f64>((0, 0), size, size, None)?;
            let (cols, rows) = buffer.shape();
            Ok(Array2::from_shape_vec((rows, cols), buffer.data().to_vec())?)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use gdal::{raster::Buffer, spatial_ref::SpatialRef, DriverManager};

        #[test]
        fn reads_georeferenced_mem_dataset() {
            let driver = DriverManager::get_driver_by_name("MEM").unwrap();
            let mut dataset = driver
                .create_with_band_type::<f64, _>("", 4, 3, 2)
                .unwrap();
            dataset
                .set_geo_transform(&[10., 0.5, 0., 45., 0., -0.25])
                .unwrap();
            dataset
                .set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
                .unwrap();
            for index in 1..=2 {
                let data = (0..12).map(|value| (value * index) as f64).collect();
                let mut buffer = Buffer::new((4, 3), data);
                dataset
                    .rasterband(index)
                    .unwrap()
                    .write((0, 0), (4, 3), &mut buffer)
                    .unwrap();
            }

            let raster = GdalRaster::from_dataset(dataset);
            assert_eq!(raster.size(), (4, 3));
            assert_eq!(raster.num_bands(), 2);
            assert!(raster.path().is_none());
            assert_eq!(
                raster.transform().unwrap(),
                AffineTransform::new(0.5, 0., 10., 0., -0.25, 45.)
            );
            assert_eq!(raster.crs(), "EPSG:4326");

            let bands = raster.read_bands(&[2, 1]).unwrap();
            assert_eq!(bands.shape(), &[2, 3, 4]);
            assert_eq!(bands[[0, 1, 2]], 12.);
            assert_eq!(bands[[1, 2, 3]], 11.);

            let bounds = raster.bounds().unwrap();
            assert_eq!(bounds.min().x, 10.);
            assert_eq!(bounds.max().y, 45.);
            assert_eq!(bounds.min().y, 44.25);
        }

        #[test]
        fn crs_without_authority_falls_back_to_wkt() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("laea.tif");
            {
                let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
                let mut dataset = driver
                    .create_with_band_type::<f64, _>(&path, 2, 2, 1)
                    .unwrap();
                dataset
                    .set_geo_transform(&[4_000_000., 100., 0., 3_000_000., 0., -100.])
                    .unwrap();
                let srs = SpatialRef::from_proj4(
                    "+proj=laea +lat_0=47.5 +lon_0=11.25 +x_0=0 +y_0=0 +ellps=GRS80 +units=m +no_defs",
                )
                .unwrap();
                dataset.set_spatial_ref(&srs).unwrap();
            }

            let raster = GdalRaster::open(&path).unwrap();
            let crs = raster.crs();
            assert!(!crs.starts_with("EPSG:"));
            assert_eq!(crs, raster.dataset().projection());
            assert!(crs.contains("Lambert"));
            assert_eq!(raster.path(), Some(path.as_path()));
        }

        #[test]
        fn fails_to_open_missing_file() {
            assert!(GdalRaster::open("/nonexistent/raster.tif").is_err());
        }
    }
}
