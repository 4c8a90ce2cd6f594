use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    components::{align::Resampling, store::zarr_store::DEFAULT_CHUNK_SIZE},
    errors::{InputError, Result},
};

/// Options of a cube build.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// let config = cuber::CubeConfig::from_json(r#"{"resampling": "bilinear"}"#).unwrap();
/// assert!(config.parallel);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// Name of the value attribute, recorded in the cube metadata.
    pub attr: String,
    pub resampling: Resampling,
    /// Value of pixels no source covers, `NaN` when unset.
    pub nodata: Option<f64>,
    /// Align and write sources on the rayon pool.
    pub parallel: bool,
    /// Spatial chunk edge of persisted cubes.
    pub chunk_size: usize,
    /// Replace an existing cube. Not supported, requesting it fails the build.
    pub overwrite: bool,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            attr: "value".to_string(),
            resampling: Resampling::default(),
            nodata: None,
            parallel: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
        }
    }
}

impl CubeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json).map_err(InputError::Config)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(crate::errors::StorageError::Io)?;
        Self::from_json(&json)
    }

    pub fn nodata_value(&self) -> f64 {
        self.nodata.unwrap_or(f64::NAN)
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = attr.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CuberError;

    #[test]
    fn fills_missing_fields_with_defaults() {
        let config = CubeConfig::from_json(r#"{"resampling": "bilinear", "nodata": -9999}"#).unwrap();
        assert_eq!(config.resampling, Resampling::Bilinear);
        assert_eq!(config.nodata_value(), -9999.);
        assert_eq!(config.attr, "value");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.parallel);
        assert!(!config.overwrite);
        assert!(CubeConfig::default().nodata_value().is_nan());
    }

    #[test]
    fn rejects_unknown_resampling() {
        assert!(matches!(
            CubeConfig::from_json(r#"{"resampling": "cubic"}"#),
            Err(CuberError::Input(InputError::Config(_)))
        ));
    }
}
