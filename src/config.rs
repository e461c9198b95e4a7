use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Key the draft text is persisted under.
pub const DRAFT_STORAGE_KEY: &str = "mermaid-to-scene";

/// Font size handed to the conversion service when nothing overrides it.
pub const DEFAULT_FONT_SIZE: f32 = 20.0;

/// Options passed to each conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    pub font_size: f32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub node_padding_x: f32,
    pub node_padding_y: f32,
    pub label_line_height: f32,
    pub max_label_width_chars: usize,
    pub min_node_width: f32,
    pub min_node_height: f32,
    pub subgraph_padding: f32,
    pub subgraph_label_height: f32,
    pub order_passes: usize,
    pub image_size: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing: 50.0,
            rank_spacing: 60.0,
            node_padding_x: 30.0,
            node_padding_y: 15.0,
            label_line_height: 1.25,
            max_label_width_chars: 22,
            min_node_width: 80.0,
            min_node_height: 44.0,
            subgraph_padding: 20.0,
            subgraph_label_height: 28.0,
            order_passes: 4,
            image_size: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Padding around the scene when rasterizing, in scene units.
    pub padding: f32,
    /// Margin kept free on the width axis when a portrait container is clamped.
    pub fit_inset: f32,
    /// Landscape containers are clamped to their height only past this width/height ratio.
    pub landscape_clamp_ratio: f32,
    /// Background painted behind a successfully rendered preview.
    pub background: String,
    pub max_canvas_edge: u32,
    pub max_canvas_area: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            padding: 10.0,
            fit_inset: 10.0,
            landscape_clamp_ratio: 2.0,
            background: "#fff".to_string(),
            max_canvas_edge: 16_384,
            max_canvas_area: 16_777_216,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftConfig {
    pub storage_key: String,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            storage_key: DRAFT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Quiescence delay before a text change is converted. Zero converts immediately.
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub theme: Theme,
    pub convert: ConvertOptions,
    pub layout: LayoutConfig,
    pub preview: PreviewConfig,
    pub draft: DraftConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    primary_color: Option<String>,
    primary_text_color: Option<String>,
    primary_border_color: Option<String>,
    line_color: Option<String>,
    cluster_bkg: Option<String>,
    cluster_border: Option<String>,
    background: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    convert: Option<ConvertOptions>,
    layout: Option<LayoutConfig>,
    preview: Option<PreviewConfig>,
    draft: Option<DraftConfig>,
    session: Option<SessionConfig>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(_) => json5::from_str(contents)?,
    };
    let mut config = Config::default();

    if let Some(theme_name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(theme_name)
            .ok_or_else(|| anyhow::anyhow!("unknown theme '{theme_name}'"))?;
    }
    if let Some(convert) = parsed.convert {
        config.convert = convert;
    }
    if let Some(layout) = parsed.layout {
        config.layout = layout;
    }
    if let Some(preview) = parsed.preview {
        config.preview = preview;
    }
    if let Some(draft) = parsed.draft {
        config.draft = draft;
    }
    if let Some(session) = parsed.session {
        config.session = session;
    }
    if let Some(vars) = parsed.theme_variables {
        apply_theme_variables(&mut config, vars);
    }

    if config.convert.font_size <= 0.0 {
        anyhow::bail!("convert.fontSize must be positive");
    }
    if config.preview.landscape_clamp_ratio < 1.0 {
        anyhow::bail!("preview.landscapeClampRatio must be at least 1");
    }
    Ok(config)
}

/// Mermaid `themeVariables` names mapped onto the element palette.
fn apply_theme_variables(config: &mut Config, vars: ThemeVariables) {
    let theme = &mut config.theme;
    if let Some(v) = vars.font_family {
        theme.font_family = v;
    }
    if let Some(v) = vars.primary_color {
        theme.node_background = v;
    }
    if let Some(v) = vars.primary_text_color {
        theme.text_color = v;
    }
    if let Some(v) = vars.primary_border_color {
        theme.stroke_color = v;
    }
    if let Some(v) = vars.line_color {
        theme.line_color = v;
    }
    if let Some(v) = vars.cluster_bkg {
        theme.frame_background = v;
    }
    if let Some(v) = vars.cluster_border {
        theme.frame_stroke = v;
    }
    if let Some(v) = vars.font_size {
        config.convert.font_size = v;
    }
    if let Some(v) = vars.background {
        config.preview.background = v;
    }
}
