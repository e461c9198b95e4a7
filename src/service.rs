use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, ConvertOptions, LayoutConfig};
use crate::error::ParseError;
use crate::ir::Graph;
use crate::parser::parse_mermaid;
use crate::scene::{RawScene, to_scene};
use crate::theme::Theme;

/// Turns diagram text into raw scene descriptors. Implementations may suspend
/// while parsing; scene synthesis is synchronous and cannot fail.
#[async_trait(?Send)]
pub trait ConversionService {
    /// # Errors
    ///
    /// Returns a [`ParseError`] whose message is shown to the user verbatim.
    async fn parse(&self, text: &str, options: &ConvertOptions) -> Result<Graph, ParseError>;

    fn to_scene(&self, graph: &Graph) -> RawScene;
}

/// Built-in flowchart service backed by the crate's parser and layered layout.
#[derive(Debug, Clone, Default)]
pub struct MermaidService {
    theme: Theme,
    layout: LayoutConfig,
}

impl MermaidService {
    pub fn new(theme: Theme, layout: LayoutConfig) -> Self {
        Self { theme, layout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.theme.clone(), config.layout.clone())
    }
}

#[async_trait(?Send)]
impl ConversionService for MermaidService {
    async fn parse(&self, text: &str, options: &ConvertOptions) -> Result<Graph, ParseError> {
        let output = parse_mermaid(text, options)?;
        debug!(
            nodes = output.graph.nodes.len(),
            edges = output.graph.edges.len(),
            font_size = output.graph.font_size,
            "parsed diagram"
        );
        Ok(output.graph)
    }

    fn to_scene(&self, graph: &Graph) -> RawScene {
        to_scene(graph, &self.theme, &self.layout)
    }
}
