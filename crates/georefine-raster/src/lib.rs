//! Tile planning for orthomosaic and elevation-model exports.
//!
//! A raster footprint (metric extent, or a lon/lat box converted through
//! [`MetresPerUnit`]) and a ground sample distance give a pixel size; the
//! pixel size is split into tiles no larger than
//! [`TilingParams::max_tile_pixels`]. Each product is planned on its own
//! since the orthomosaic and the elevation model usually differ in GSD.

mod export;
mod resolution;
mod tiling;

pub use export::{
    plan_export, ExportPlan, ProductPlan, RasterExportConfig, RasterIoError, RasterProduct,
};
pub use resolution::{GeoBounds, MetresPerUnit, MetricExtent};
pub use tiling::{plan_tiles, TilePlan, TileRect, TilingError, TilingParams};
