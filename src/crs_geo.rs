use geo::Coord;
use log::debug;
use proj::Proj;

use crate::errors::Result;

/// Whether two CRS identifiers name the same reference system.
///
/// Only textual equality is considered, so `EPSG:4326` and its WKT
/// are treated as different and go through proj.
pub fn same_crs(lhs: &str, rhs: &str) -> bool {
    lhs.trim().eq_ignore_ascii_case(rhs.trim())
}

/// Converts `x`/`y` coordinates from one CRS into another.
///
/// Holds no [Proj] when both CRS are the same, in which case
/// coordinates pass through untouched.
#[derive(Debug)]
pub struct CrsTransformer {
    proj: Option<Proj>,
}

impl CrsTransformer {
    pub fn new(from: &str, to: &str) -> Result<Self> {
        let proj = if same_crs(from, to) {
            None
        } else {
            debug!("building proj pipeline {from} -> {to}");
            Some(Proj::new_known_crs(from, to, None)?)
        };
        Ok(Self { proj })
    }

    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    pub fn convert(&self, coord: Coord) -> Result<Coord> {
        match &self.proj {
            None => Ok(coord),
            Some(proj) => {
                let (x, y) = proj.convert((coord.x, coord.y))?;
                Ok(Coord { x, y })
            }
        }
    }

    /// Points that fail to transform, or land on non finite values, are `None`.
    pub fn convert_lossy(&self, coord: Coord) -> Option<Coord> {
        self.convert(coord)
            .ok()
            .filter(|coord| coord.x.is_finite() && coord.y.is_finite())
    }

    /// `[left, bottom, right, top]` in the target CRS, densified along the edges.
    pub fn convert_bounds(&self, bounds: [f64; 4], densify_pts: i32) -> Result<[f64; 4]> {
        match &self.proj {
            None => Ok(bounds),
            Some(proj) => {
                let [left, bottom, right, top] = bounds;
                Ok(proj.transform_bounds(left, bottom, right, top, densify_pts)?)
            }
        }
    }
}
