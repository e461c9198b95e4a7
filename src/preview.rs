use std::collections::BTreeMap;

use tracing::debug;

use crate::config::PreviewConfig;
use crate::element::{Asset, AssetId, SceneElement};
use crate::error::RenderError;
use crate::raster::{Bitmap, RasterRequest, Rasterizer};

/// A bitmap that has already been through the encode check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBitmap {
    pub bitmap: Bitmap,
    pub png: Vec<u8>,
}

/// Result of a successful render that has not yet been shown.
#[derive(Debug, Clone)]
pub struct PreparedPreview {
    image: PreviewBitmap,
    background: String,
}

impl PreparedPreview {
    pub fn image(&self) -> &PreviewBitmap {
        &self.image
    }
}

/// The bounded region showing the preview. It holds either one complete
/// bitmap or nothing.
#[derive(Debug, Default)]
pub struct PreviewSurface {
    image: Option<PreviewBitmap>,
    background: Option<String>,
    presentations: u64,
}

impl PreviewSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present(&mut self, prepared: PreparedPreview) {
        self.background = Some(prepared.background);
        self.image = Some(prepared.image);
        self.presentations += 1;
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.background = None;
    }

    pub fn image(&self) -> Option<&PreviewBitmap> {
        self.image.as_ref()
    }

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    /// Number of bitmaps shown so far.
    pub fn presentations(&self) -> u64 {
        self.presentations
    }
}

pub struct PreviewRenderer<R> {
    rasterizer: R,
    config: PreviewConfig,
}

impl<R: Rasterizer> PreviewRenderer<R> {
    pub fn new(rasterizer: R, config: PreviewConfig) -> Self {
        Self { rasterizer, config }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Rasterizes and runs the PNG encode as a validation step. Nothing is
    /// shown until the result is presented.
    ///
    /// # Errors
    ///
    /// Returns the [`RenderError`] from either stage.
    pub async fn prepare(
        &self,
        elements: &[SceneElement],
        assets: &BTreeMap<AssetId, Asset>,
        fit_dimension: u32,
    ) -> Result<PreparedPreview, RenderError> {
        let request = RasterRequest {
            elements,
            assets,
            max_edge: fit_dimension,
            padding: self.config.padding,
        };
        let bitmap = self.rasterizer.rasterize(&request).await?;
        let png = self.rasterizer.encode_png(&bitmap).await?;
        Ok(PreparedPreview {
            image: PreviewBitmap { bitmap, png },
            background: self.config.background.clone(),
        })
    }

    /// Prepares and presents in one step, clearing the surface on failure.
    ///
    /// # Errors
    ///
    /// Returns the [`RenderError`] after the surface has been cleared.
    pub async fn render(
        &self,
        surface: &mut PreviewSurface,
        elements: &[SceneElement],
        assets: &BTreeMap<AssetId, Asset>,
        fit_dimension: u32,
    ) -> Result<(), RenderError> {
        match self.prepare(elements, assets, fit_dimension).await {
            Ok(prepared) => {
                surface.present(prepared);
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "preview render failed");
                surface.clear();
                Err(err)
            }
        }
    }
}
