//! Output pixel grid derived from the region, CRS and scale.

use serde::Serialize;

use super::{parse_epsg, Polygon};
use crate::error::{Error, Result};

/// Length of one degree of longitude at the equator on the WGS84 ellipsoid.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

const GEOGRAPHIC_CODES: [u32; 4] = [4326, 4269, 4267, 4258];

/// Largest grid accepted, in cells (200 MB of `f32` per band).
pub const MAX_CELLS: u64 = 50_000_000;

/// North-up pixel grid. `origin` is the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    pub crs: String,
    pub epsg: u32,
    pub width: u32,
    pub height: u32,
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel edge length in CRS units
    pub pixel_size: f64,
}

impl Grid {
    /// Covers the region's bounding box with square pixels of `scale` meters.
    ///
    /// Only geographic CRSs are supported: region vertices are lon/lat and
    /// projecting them is left to the remote service.
    pub fn for_region(region: &Polygon, crs: &str, scale: f64) -> Result<Self> {
        let epsg = parse_epsg(crs)
            .ok_or_else(|| Error::Export(format!("unsupported CRS `{}`", crs)))?;
        if !GEOGRAPHIC_CODES.contains(&epsg) {
            return Err(Error::Export(format!(
                "CRS `{}` is projected; only geographic output CRSs are supported",
                crs
            )));
        }

        let pixel_size = scale / METERS_PER_DEGREE;
        let bbox = region.bounding_box();
        let columns = pixel_count(bbox.max_lon - bbox.min_lon, pixel_size);
        let rows = pixel_count(bbox.max_lat - bbox.min_lat, pixel_size);
        if columns * rows > MAX_CELLS as f64 {
            return Err(Error::InvalidRequest(format!(
                "a scale of {} m gives a {} x {} grid, more than {} cells",
                scale, columns, rows, MAX_CELLS
            )));
        }
        let (width, height) = (columns as u32, rows as u32);

        Ok(Grid {
            crs: crs.to_string(),
            epsg,
            width,
            height,
            origin_x: bbox.min_lon,
            origin_y: bbox.max_lat,
            pixel_size,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Affine transform in the order scaleX, shearX, translateX, shearY,
    /// scaleY, translateY.
    pub fn affine(&self) -> [f64; 6] {
        [
            self.pixel_size,
            0.0,
            self.origin_x,
            0.0,
            -self.pixel_size,
            self.origin_y,
        ]
    }

    pub fn is_geographic(&self) -> bool {
        GEOGRAPHIC_CODES.contains(&self.epsg)
    }
}

fn pixel_count(extent: f64, pixel_size: f64) -> f64 {
    (extent / pixel_size).ceil().max(1.0)
}

#[cfg(test)]
mod tests {

    use super::*;

    fn region() -> Polygon {
        Polygon::new(&[
            (14.30578, -25.82906),
            (17.56269, -25.82906),
            (17.56269, -22.18359),
            (14.30578, -22.18359),
        ])
        .unwrap()
    }

    #[test]
    fn should_cover_region_at_tenth_of_degree() {
        let grid = Grid::for_region(&region(), "EPSG:4326", 11132.0).unwrap();

        assert!((grid.pixel_size - 0.1).abs() < 1e-3);
        assert_eq!(grid.width, 33);
        assert_eq!(grid.height, 37);
        assert_eq!(grid.origin_x, 14.30578);
        assert_eq!(grid.origin_y, -22.18359);
        assert_eq!(grid.affine()[4], -grid.pixel_size);
    }

    #[test]
    fn should_reject_projected_crs() {
        let result = Grid::for_region(&region(), "EPSG:32633", 1000.0);
        assert!(matches!(result, Err(Error::Export(_))));
    }

    #[test]
    fn should_have_at_least_one_pixel() {
        let grid = Grid::for_region(&region(), "EPSG:4326", 10_000_000.0).unwrap();
        assert_eq!((grid.width, grid.height), (1, 1));
    }

    #[test]
    fn should_reject_oversized_grid() {
        let result = Grid::for_region(&region(), "EPSG:4326", 1.0);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));

        let tiny = Grid::for_region(&region(), "EPSG:4326", 1e-9);
        assert!(matches!(tiny, Err(Error::InvalidRequest(_))));
    }
}
