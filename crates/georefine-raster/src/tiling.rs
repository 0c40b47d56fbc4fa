//! Splitting a raster export into tiles no larger than a pixel limit.

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tile-size limits for one raster export.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TilingParams {
    /// Largest allowed tile edge, in pixels.
    #[serde(default = "default_max_tile_pixels")]
    pub max_tile_pixels: u32,
    /// Added to `pixels / max_tile_pixels` before rounding up, so a raster
    /// just under a multiple of the limit is split one step earlier.
    #[serde(default = "default_block_offset")]
    pub block_offset: f64,
}

fn default_max_tile_pixels() -> u32 {
    30_000
}

fn default_block_offset() -> f64 {
    0.2
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            max_tile_pixels: default_max_tile_pixels(),
            block_offset: default_block_offset(),
        }
    }
}

impl TilingParams {
    pub fn validate(&self) -> Result<(), TilingError> {
        if self.max_tile_pixels == 0 {
            return Err(TilingError::InvalidMaxTilePixels);
        }
        if !(self.block_offset.is_finite() && (0.0..1.0).contains(&self.block_offset)) {
            return Err(TilingError::InvalidBlockOffset(self.block_offset));
        }
        Ok(())
    }

    fn tile_count(&self, pixels: u32) -> u32 {
        let raw = (pixels as f64 / self.max_tile_pixels as f64 + self.block_offset).ceil();
        (raw as u32).max(1)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TilingError {
    #[error("raster extent must be finite and > 0 (got {size_x} x {size_y})")]
    InvalidExtent { size_x: f64, size_y: f64 },
    #[error("ground sample distance must be finite and > 0 (got {0})")]
    InvalidGsd(f64),
    #[error("max_tile_pixels must be > 0")]
    InvalidMaxTilePixels,
    #[error("block_offset must be in [0, 1) (got {0})")]
    InvalidBlockOffset(f64),
    #[error("raster has no pixels ({width} x {height})")]
    EmptyRaster { width: u32, height: u32 },
    #[error("raster edge of {0} pixels does not fit in u32")]
    RasterTooLarge(f64),
}

/// Pixel and tile layout of one raster. Built once per export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlan {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Block counts handed to the exporter. With very small tiles the
    /// rounded-up edge can cover the raster in fewer columns or rows; see
    /// [`TilePlan::columns`].
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// One tile of a [`TilePlan`], clipped to the raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub col: u32,
    pub row: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TilePlan {
    /// Plan tiles for a raster whose pixel size is already known.
    pub fn from_pixels(
        pixel_width: u32,
        pixel_height: u32,
        params: &TilingParams,
    ) -> Result<Self, TilingError> {
        params.validate()?;
        if pixel_width == 0 || pixel_height == 0 {
            return Err(TilingError::EmptyRaster {
                width: pixel_width,
                height: pixel_height,
            });
        }

        let tile_count_x = params.tile_count(pixel_width);
        let tile_count_y = params.tile_count(pixel_height);
        Ok(Self {
            pixel_width,
            pixel_height,
            tile_count_x,
            tile_count_y,
            tile_width: pixel_width.div_ceil(tile_count_x),
            tile_height: pixel_height.div_ceil(tile_count_y),
        })
    }

    /// `true` when the export has to be written tile by tile.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.tile_count_x > 1 || self.tile_count_y > 1
    }

    /// Tile counts as `"X:Y"`.
    pub fn block_count_tag(&self) -> String {
        format!("{}:{}", self.tile_count_x, self.tile_count_y)
    }

    /// Columns of non-empty tiles, at most `tile_count_x`.
    #[inline]
    pub fn columns(&self) -> u32 {
        self.pixel_width.div_ceil(self.tile_width)
    }

    /// Rows of non-empty tiles, at most `tile_count_y`.
    #[inline]
    pub fn rows(&self) -> u32 {
        self.pixel_height.div_ceil(self.tile_height)
    }

    /// Number of tiles yielded by [`TilePlan::tiles`].
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    /// Tiles in row-major order; edge tiles are clipped to the raster.
    pub fn tiles(&self) -> impl Iterator<Item = TileRect> + '_ {
        (0..self.rows()).flat_map(move |row| {
            (0..self.columns()).map(move |col| {
                let x = col * self.tile_width;
                let y = row * self.tile_height;
                TileRect {
                    col,
                    row,
                    x,
                    y,
                    width: self.tile_width.min(self.pixel_width - x),
                    height: self.tile_height.min(self.pixel_height - y),
                }
            })
        })
    }
}

fn pixel_count(size: f64, gsd: f64) -> Result<u32, TilingError> {
    let pixels = (size / gsd).ceil();
    if pixels > u32::MAX as f64 {
        return Err(TilingError::RasterTooLarge(pixels));
    }
    Ok(pixels as u32)
}

/// Plan tiles for a metric extent of `size_x` by `size_y` metres exported
/// at `gsd` metres per pixel.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(params)))]
pub fn plan_tiles(
    size_x: f64,
    size_y: f64,
    gsd: f64,
    params: &TilingParams,
) -> Result<TilePlan, TilingError> {
    if !(size_x.is_finite() && size_y.is_finite() && size_x > 0.0 && size_y > 0.0) {
        return Err(TilingError::InvalidExtent { size_x, size_y });
    }
    if !(gsd.is_finite() && gsd > 0.0) {
        return Err(TilingError::InvalidGsd(gsd));
    }
    let plan = TilePlan::from_pixels(pixel_count(size_x, gsd)?, pixel_count(size_y, gsd)?, params)?;
    log::debug!(
        "{}x{} px at {gsd} m/px -> {} tiles of {}x{} px",
        plan.pixel_width,
        plan.pixel_height,
        plan.block_count_tag(),
        plan.tile_width,
        plan.tile_height
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_km_at_half_metre_splits_into_four() {
        let plan = plan_tiles(50_000.0, 50_000.0, 0.5, &TilingParams::default()).expect("plan");
        assert_eq!(plan.pixel_width, 100_000);
        assert_eq!(plan.tile_count_x, 4);
        assert_eq!(plan.tile_width, 25_000);
        assert_eq!(plan.block_count_tag(), "4:4");
        assert!(plan.is_blocked());
    }

    #[test]
    fn small_raster_is_unblocked() {
        let plan = TilePlan::from_pixels(8_000, 6_000, &TilingParams::default()).expect("plan");
        assert!(!plan.is_blocked());
        assert_eq!((plan.tile_width, plan.tile_height), (8_000, 6_000));
        assert_eq!(plan.tiles().count(), 1);
    }

    #[test]
    fn offset_splits_just_below_the_limit() {
        // 25000 / 30000 + 0.2 = 1.033 -> two tiles although one would fit.
        let plan = TilePlan::from_pixels(25_000, 100, &TilingParams::default()).expect("plan");
        assert_eq!(plan.tile_count_x, 2);
        assert_eq!(plan.tile_width, 12_500);
        assert_eq!(plan.tile_count_y, 1);

        let bare = TilingParams {
            block_offset: 0.0,
            ..TilingParams::default()
        };
        assert_eq!(TilePlan::from_pixels(25_000, 100, &bare).expect("plan").tile_count_x, 1);
    }

    #[test]
    fn tiles_cover_the_raster_without_overlap() {
        let params = TilingParams {
            max_tile_pixels: 1_000,
            block_offset: 0.2,
        };
        let plan = TilePlan::from_pixels(3_001, 1_999, &params).expect("plan");
        assert!(plan.tile_width * plan.tile_count_x >= plan.pixel_width);
        assert!(plan.tile_height * plan.tile_count_y >= plan.pixel_height);

        let area: u64 = plan
            .tiles()
            .map(|t| t.width as u64 * t.height as u64)
            .sum();
        assert_eq!(area, 3_001 * 1_999);
        for t in plan.tiles() {
            assert!(t.x + t.width <= plan.pixel_width);
            assert!(t.y + t.height <= plan.pixel_height);
        }
    }

    #[test]
    fn tile_count_matches_emitted_tiles() {
        // ceil(5 / 1 + 0.2) = 6 blocks per axis, but 1 px tiles cover 5 px
        // in five.
        let params = TilingParams {
            max_tile_pixels: 1,
            block_offset: 0.2,
        };
        let plan = TilePlan::from_pixels(5, 5, &params).expect("plan");
        assert_eq!(plan.block_count_tag(), "6:6");
        assert_eq!((plan.columns(), plan.rows()), (5, 5));
        assert_eq!(plan.tile_count(), 25);
        assert_eq!(plan.tiles().count(), plan.tile_count());
        assert!(plan.tiles().all(|t| t.width == 1 && t.height == 1));

        let plan = TilePlan::from_pixels(3_001, 1_999, &TilingParams {
            max_tile_pixels: 1_000,
            ..params
        })
        .expect("plan");
        assert_eq!(plan.tiles().count(), plan.tile_count());
    }

    #[test]
    fn fractional_extent_rounds_pixels_up() {
        let plan = plan_tiles(10.01, 5.0, 0.02, &TilingParams::default()).expect("plan");
        assert_eq!(plan.pixel_width, 501);
        assert_eq!(plan.pixel_height, 250);
    }

    #[test]
    fn rejects_bad_inputs() {
        let params = TilingParams::default();
        assert!(matches!(
            plan_tiles(0.0, 10.0, 0.1, &params),
            Err(TilingError::InvalidExtent { .. })
        ));
        assert_eq!(
            plan_tiles(10.0, 10.0, -1.0, &params),
            Err(TilingError::InvalidGsd(-1.0))
        );
        assert!(matches!(
            plan_tiles(1e12, 10.0, 1e-3, &params),
            Err(TilingError::RasterTooLarge(_))
        ));
        let zero = TilingParams {
            max_tile_pixels: 0,
            ..params
        };
        assert_eq!(
            TilePlan::from_pixels(10, 10, &zero),
            Err(TilingError::InvalidMaxTilePixels)
        );
    }
}
