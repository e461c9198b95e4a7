//! Mermaid flowchart text to host scene elements, with a live bitmap preview
//! and insertion into the host document.

pub mod config;
pub mod draft;
pub mod element;
pub mod error;
pub mod fit;
pub mod gate;
pub mod insert;
pub mod ir;
pub mod layout;
pub mod parser;
pub mod pipeline;
pub mod preview;
pub mod raster;
pub mod scene;
pub mod service;
pub mod session;
pub mod text_metrics;
pub mod theme;

pub use config::{Config, ConvertOptions, load_config};
pub use draft::{DraftStore, FileStore, KeyValueStore, MemoryStore};
pub use element::{Asset, AssetId, ElementKind, SceneElement, normalize};
pub use error::{InsertError, LoadError, ParseError, RenderError, StorageError};
pub use fit::{FitCalculator, compute_fit_dimension};
pub use gate::LibraryGate;
pub use insert::{HostScene, InsertReport, MemoryScene, ToolSelection};
pub use pipeline::{ConversionOutcome, ConversionRun, convert};
pub use preview::{PreparedPreview, PreviewRenderer, PreviewSurface};
#[cfg(feature = "png")]
pub use raster::SvgRasterizer;
pub use raster::{Bitmap, RasterRequest, Rasterizer};
pub use scene::{RawElement, RawScene};
pub use service::{ConversionService, MermaidService};
pub use session::{Session, SessionState};

/// Example shown when no draft has been saved.
pub const DEFAULT_DIAGRAM: &str = "flowchart TD
 A[Christmas] -->|Get money| B(Go shopping)
 B --> C{Let me think}
 C -->|One| D[Laptop]
 C -->|Two| E[iPhone]
 C -->|Three| F[Car]";
