//! Per-product tile plans for one raster export run.

use crate::resolution::{MetresPerUnit, MetricExtent};
use crate::tiling::{plan_tiles, TilePlan, TilingError, TilingParams};
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Raster products planned independently over the same footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterProduct {
    Orthomosaic,
    ElevationModel,
}

impl RasterProduct {
    pub fn short_name(self) -> &'static str {
        match self {
            RasterProduct::Orthomosaic => "ortho",
            RasterProduct::ElevationModel => "dem",
        }
    }
}

/// Which products to export, and at what resolution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterExportConfig {
    /// Orthomosaic ground sample distance in metres; `None` skips it.
    #[serde(default)]
    pub ortho_gsd: Option<f64>,
    /// Elevation-model ground sample distance in metres; `None` skips it.
    #[serde(default)]
    pub dem_gsd: Option<f64>,
    #[serde(default)]
    pub tiling: TilingParams,
}

#[derive(thiserror::Error, Debug)]
pub enum RasterIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RasterExportConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RasterIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RasterIoError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn gsd(&self, product: RasterProduct) -> Option<f64> {
        match product {
            RasterProduct::Orthomosaic => self.ortho_gsd,
            RasterProduct::ElevationModel => self.dem_gsd,
        }
    }
}

/// Tile plan of one product plus the pixel step to hand to the exporter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductPlan {
    pub product: RasterProduct,
    pub gsd: f64,
    /// Pixel size in CRS units.
    pub dx: f64,
    pub dy: f64,
    pub tiles: TilePlan,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPlan {
    pub ortho: Option<ProductPlan>,
    pub dem: Option<ProductPlan>,
}

impl ExportPlan {
    pub fn products(&self) -> impl Iterator<Item = &ProductPlan> {
        self.ortho.iter().chain(self.dem.iter())
    }
}

/// Plan every configured product over `extent`.
///
/// `scale` converts metres to CRS units for the reported pixel step; the
/// tile layout itself only depends on the metric extent.
pub fn plan_export(
    extent: &MetricExtent,
    scale: &MetresPerUnit,
    config: &RasterExportConfig,
) -> Result<ExportPlan, TilingError> {
    let plan_product = |product: RasterProduct| -> Result<Option<ProductPlan>, TilingError> {
        let Some(gsd) = config.gsd(product) else {
            return Ok(None);
        };
        let tiles = plan_tiles(extent.size_x, extent.size_y, gsd, &config.tiling)?;
        let (dx, dy) = scale.crs_step(gsd);
        info!(
            "{}: {}x{} px, blocks {} of {}x{} px",
            product.short_name(),
            tiles.pixel_width,
            tiles.pixel_height,
            tiles.block_count_tag(),
            tiles.tile_width,
            tiles.tile_height
        );
        Ok(Some(ProductPlan {
            product,
            gsd,
            dx,
            dy,
            tiles,
        }))
    };

    Ok(ExportPlan {
        ortho: plan_product(RasterProduct::Orthomosaic)?,
        dem: plan_product(RasterProduct::ElevationModel)?,
    })
}
