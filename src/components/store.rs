//! Backing array stores a cube is written to.

use log::{debug, info};
use ndarray::{s, Array4, ArrayView4};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::errors::{Result, StorageError};

/// Store holding 4-D `f64` arrays addressed by uri.
pub trait ArrayStore: Sync {
    type Writer: ArrayWriter;

    fn exists(&self, uri: &str) -> bool;

    /// Create an empty array of `shape`, fails if one already exists at `uri`.
    fn allocate(&self, uri: &str, shape: [usize; 4]) -> Result<()>;

    fn open_for_write(&self, uri: &str) -> Result<Self::Writer>;
}

/// Write session on one array.
///
/// Metadata needs exclusive access, while regions can be written
/// concurrently as long as they do not overlap.
pub trait ArrayWriter: Sync {
    fn shape(&self) -> [usize; 4];

    fn set_metadata(&mut self, key: &str, value: Value) -> Result<()>;

    fn write_region(&self, offset: [usize; 4], data: ArrayView4<f64>) -> Result<()>;
}

fn check_region(offset: [usize; 4], shape: [usize; 4], array: [usize; 4]) -> Result<()> {
    let fits = (0..4).all(|axis| offset[axis] + shape[axis] <= array[axis]);
    if !fits {
        Err(StorageError::RegionOutOfBounds {
            offset,
            shape,
            array,
        })?
    }
    Ok(())
}

fn view_shape(data: &ArrayView4<f64>) -> [usize; 4] {
    let (d0, d1, d2, d3) = data.dim();
    [d0, d1, d2, d3]
}

#[derive(Debug)]
struct MemoryArray {
    data: Mutex<Array4<f64>>,
    metadata: Mutex<Map<String, Value>>,
}

/// Arrays kept in process memory, filled with `NaN` on allocation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    arrays: Mutex<HashMap<String, Arc<MemoryArray>>>,
}

impl MemoryStore {
    fn get(&self, uri: &str) -> Result<Arc<MemoryArray>> {
        let arrays = self.arrays.lock().map_err(|_| StorageError::Poisoned {
            uri: uri.to_string(),
        })?;
        arrays
            .get(uri)
            .map(Arc::clone)
            .ok_or_else(|| StorageError::NotFound { uri: uri.to_string() }.into())
    }

    /// Remove the array at `uri` from the store.
    pub fn take(&self, uri: &str) -> Result<Array4<f64>> {
        let poisoned = || StorageError::Poisoned {
            uri: uri.to_string(),
        };
        let array = self
            .arrays
            .lock()
            .map_err(|_| poisoned())?
            .remove(uri)
            .ok_or_else(|| StorageError::NotFound { uri: uri.to_string() })?;
        let data = std::mem::take(&mut *array.data.lock().map_err(|_| poisoned())?);
        Ok(data)
    }

    pub fn metadata(&self, uri: &str) -> Result<Map<String, Value>> {
        let array = self.get(uri)?;
        let metadata = array.metadata.lock().map_err(|_| StorageError::Poisoned {
            uri: uri.to_string(),
        })?;
        Ok(metadata.clone())
    }
}

impl ArrayStore for MemoryStore {
    type Writer = MemoryWriter;

    fn exists(&self, uri: &str) -> bool {
        self.get(uri).is_ok()
    }

    fn allocate(&self, uri: &str, shape: [usize; 4]) -> Result<()> {
        let mut arrays = self.arrays.lock().map_err(|_| StorageError::Poisoned {
            uri: uri.to_string(),
        })?;
        if arrays.contains_key(uri) {
            Err(StorageError::AlreadyExists { uri: uri.to_string() })?
        }
        debug!("allocating {shape:?} in memory for {uri}");
        arrays.insert(
            uri.to_string(),
            Arc::new(MemoryArray {
                data: Mutex::new(Array4::from_elem(shape, f64::NAN)),
                metadata: Mutex::new(Map::new()),
            }),
        );
        Ok(())
    }

    fn open_for_write(&self, uri: &str) -> Result<MemoryWriter> {
        let array = self.get(uri)?;
        let shape = {
            let data = array.data.lock().map_err(|_| StorageError::Poisoned {
                uri: uri.to_string(),
            })?;
            let (d0, d1, d2, d3) = data.dim();
            [d0, d1, d2, d3]
        };
        Ok(MemoryWriter {
            uri: uri.to_string(),
            shape,
            array,
        })
    }
}

#[derive(Debug)]
pub struct MemoryWriter {
    uri: String,
    shape: [usize; 4],
    array: Arc<MemoryArray>,
}

impl MemoryWriter {
    fn poisoned(&self) -> StorageError {
        StorageError::Poisoned {
            uri: self.uri.clone(),
        }
    }
}

impl ArrayWriter for MemoryWriter {
    fn shape(&self) -> [usize; 4] {
        self.shape
    }

    fn set_metadata(&mut self, key: &str, value: Value) -> Result<()> {
        self.array
            .metadata
            .lock()
            .map_err(|_| self.poisoned())?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn write_region(&self, offset: [usize; 4], data: ArrayView4<f64>) -> Result<()> {
        let shape = view_shape(&data);
        check_region(offset, shape, self.shape)?;
        let [o0, o1, o2, o3] = offset;
        let [d0, d1, d2, d3] = shape;
        self.array
            .data
            .lock()
            .map_err(|_| self.poisoned())?
            .slice_mut(s![o0..o0 + d0, o1..o1 + d1, o2..o2 + d2, o3..o3 + d3])
            .assign(&data);
        Ok(())
    }
}

/// Zarr v3 arrays on the local filesystem, one directory per uri.
pub mod zarr_store {
    use super::*;
    use std::path::Path;
    use zarrs::{
        array::{Array, ArrayBuilder, ChunkGrid, DataType, FillValue},
        array_subset::ArraySubset,
    };
    use zarrs_filesystem::FilesystemStore;

    use crate::{config::CubeConfig, errors::InputError};

    const ARRAY_PATH: &str = "/";

    /// Spatial chunk edge used when none is configured.
    pub const DEFAULT_CHUNK_SIZE: usize = 512;

    /// Chunks hold every band of one spatial block at one time index,
    /// so writers of different time slices never touch the same chunk.
    #[derive(Debug, Clone, Copy)]
    pub struct ZarrStore {
        chunk_size: usize,
    }

    impl Default for ZarrStore {
        fn default() -> Self {
            Self::new(DEFAULT_CHUNK_SIZE)
        }
    }

    impl ZarrStore {
        pub fn new(chunk_size: usize) -> Self {
            Self {
                chunk_size: chunk_size.max(1),
            }
        }

        /// Store chunked as configured by [CubeConfig::chunk_size].
        pub fn from_config(config: &CubeConfig) -> Self {
            Self::new(config.chunk_size)
        }

        pub fn chunk_size(&self) -> usize {
            self.chunk_size
        }

        fn filesystem(uri: &str) -> Result<Arc<FilesystemStore>> {
            let store = FilesystemStore::new(uri).map_err(|err| StorageError::backend(uri, err))?;
            Ok(Arc::new(store))
        }

        fn chunk_shape(&self, shape: [usize; 4]) -> Vec<u64> {
            let [bands, height, width, _] = shape;
            vec![
                bands.max(1) as u64,
                height.clamp(1, self.chunk_size) as u64,
                width.clamp(1, self.chunk_size) as u64,
                1,
            ]
        }
    }

    impl ArrayStore for ZarrStore {
        type Writer = ZarrWriter;

        fn exists(&self, uri: &str) -> bool {
            Path::new(uri).join("zarr.json").exists()
        }

        fn allocate(&self, uri: &str, shape: [usize; 4]) -> Result<()> {
            let path = Path::new(uri);
            let parent_exists = path
                .parent()
                .map(|parent| parent.as_os_str().is_empty() || parent.exists())
                .unwrap_or(false);
            if !parent_exists {
                Err(InputError::MissingParent {
                    uri: uri.to_string(),
                })?
            }
            if self.exists(uri) {
                Err(StorageError::AlreadyExists {
                    uri: uri.to_string(),
                })?
            }
            std::fs::create_dir_all(path).map_err(StorageError::Io)?;

            let chunk_grid: ChunkGrid = self
                .chunk_shape(shape)
                .try_into()
                .map_err(|err| StorageError::backend(uri, format!("{err:?}")))?;
            let array = ArrayBuilder::new(
                shape.iter().map(|dim| *dim as u64).collect::<Vec<_>>(),
                DataType::Float64,
                chunk_grid,
                FillValue::from(f64::NAN),
            )
            .build(Self::filesystem(uri)?, ARRAY_PATH)
            .map_err(|err| StorageError::backend(uri, err))?;
            array
                .store_metadata()
                .map_err(|err| StorageError::backend(uri, err))?;
            info!("allocated zarr array {shape:?} at {uri}");
            Ok(())
        }

        fn open_for_write(&self, uri: &str) -> Result<ZarrWriter> {
            if !self.exists(uri) {
                Err(StorageError::NotFound {
                    uri: uri.to_string(),
                })?
            }
            let array = Array::open(Self::filesystem(uri)?, ARRAY_PATH)
                .map_err(|err| StorageError::backend(uri, err))?;
            let shape = match array.shape() {
                [d0, d1, d2, d3] => [*d0 as usize, *d1 as usize, *d2 as usize, *d3 as usize],
                found => Err(StorageError::ShapeMismatch {
                    uri: uri.to_string(),
                    expected: [0; 4],
                    found: found.to_vec(),
                })?,
            };
            Ok(ZarrWriter {
                uri: uri.to_string(),
                shape,
                array,
            })
        }
    }

    pub struct ZarrWriter {
        uri: String,
        shape: [usize; 4],
        array: Array<FilesystemStore>,
    }

    impl std::fmt::Debug for ZarrWriter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ZarrWriter")
                .field("uri", &self.uri)
                .field("shape", &self.shape)
                .finish()
        }
    }

    impl ArrayWriter for ZarrWriter {
        fn shape(&self) -> [usize; 4] {
            self.shape
        }

        fn set_metadata(&mut self, key: &str, value: Value) -> Result<()> {
            self.array.attributes_mut().insert(key.to_string(), value);
            self.array
                .store_metadata()
                .map_err(|err| StorageError::backend(&self.uri, err))?;
            Ok(())
        }

        fn write_region(&self, offset: [usize; 4], data: ArrayView4<f64>) -> Result<()> {
            let shape = view_shape(&data);
            check_region(offset, shape, self.shape)?;
            let subset = ArraySubset::new_with_start_shape(
                offset.iter().map(|dim| *dim as u64).collect(),
                shape.iter().map(|dim| *dim as u64).collect(),
            )
            .map_err(|err| StorageError::backend(&self.uri, err))?;
            // row major order of the subset
            let elements: Vec<f64> = data.iter().copied().collect();
            self.array
                .store_array_subset_elements(&subset, &elements)
                .map_err(|err| StorageError::backend(&self.uri, err))?;
            Ok(())
        }
    }

    /// Read back a region, mostly useful to inspect written cubes.
    pub fn read_region(uri: &str, offset: [usize; 4], shape: [usize; 4]) -> Result<Array4<f64>> {
        let array = Array::open(ZarrStore::filesystem(uri)?, ARRAY_PATH)
            .map_err(|err| StorageError::backend(uri, err))?;
        let subset = ArraySubset::new_with_start_shape(
            offset.iter().map(|dim| *dim as u64).collect(),
            shape.iter().map(|dim| *dim as u64).collect(),
        )
        .map_err(|err| StorageError::backend(uri, err))?;
        let elements = array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(|err| StorageError::backend(uri, err))?;
        Ok(Array4::from_shape_vec(shape, elements)?)
    }

    /// Attributes written next to the array.
    pub fn read_metadata(uri: &str) -> Result<Map<String, Value>> {
        let array = Array::open(ZarrStore::filesystem(uri)?, ARRAY_PATH)
            .map_err(|err| StorageError::backend(uri, err))?;
        Ok(array.attributes().clone())
    }
}
