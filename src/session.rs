//! Dialog-lifetime state machine tying the gate, pipeline, preview and insert
//! steps together.
//!
//! Everything runs on one task. Interior mutability is `Cell`/`RefCell`, and
//! no borrow is held across an `.await`: each suspension point is followed by
//! a generation check, and a run that is no longer the latest returns without
//! touching the outcome slot, the error display or the preview surface.

use std::cell::{Cell, Ref, RefCell};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Config, ConvertOptions};
use crate::draft::DraftStore;
use crate::element::SceneElement;
use crate::error::{InsertError, LoadError};
use crate::fit::FitCalculator;
use crate::gate::LibraryGate;
use crate::insert::{HostScene, InsertReport, insert};
use crate::pipeline::{ConversionOutcome, ConversionRun, Generation, GenerationCounter, OutcomeSlot, convert};
use crate::preview::{PreviewRenderer, PreviewSurface};
use crate::raster::Rasterizer;
use crate::service::ConversionService;
use crate::DEFAULT_DIAGRAM;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready,
    Converting,
    Previewing,
    ErrorShown,
    /// The conversion service failed to load. Only `close` leaves this state.
    Unavailable(LoadError),
    Closed,
}

pub struct Session<S, R> {
    gate: LibraryGate<S>,
    renderer: PreviewRenderer<R>,
    draft: DraftStore,
    fit: FitCalculator,
    options: ConvertOptions,
    debounce: Duration,
    state: RefCell<SessionState>,
    text: RefCell<String>,
    error: RefCell<Option<String>>,
    generations: GenerationCounter,
    outcome: OutcomeSlot,
    surface: RefCell<PreviewSurface>,
    target: Cell<(u32, u32)>,
    mounted: Cell<bool>,
}

impl<S, R> Session<S, R>
where
    S: ConversionService + 'static,
    R: Rasterizer,
{
    /// Opens a session. The text starts from the saved draft, or the built-in
    /// example when there is none.
    pub fn new(gate: LibraryGate<S>, rasterizer: R, draft: DraftStore, config: &Config) -> Self {
        let text = draft.load().unwrap_or_else(|| DEFAULT_DIAGRAM.to_string());
        Self {
            gate,
            renderer: PreviewRenderer::new(rasterizer, config.preview.clone()),
            draft,
            fit: FitCalculator::from_config(&config.preview),
            options: config.convert,
            debounce: Duration::from_millis(config.session.debounce_ms),
            state: RefCell::new(SessionState::Loading),
            text: RefCell::new(text),
            error: RefCell::new(None),
            generations: GenerationCounter::new(),
            outcome: OutcomeSlot::new(),
            surface: RefCell::new(PreviewSurface::new()),
            target: Cell::new((0, 0)),
            mounted: Cell::new(false),
        }
    }

    /// Loads the conversion service and converts the initial text. Calling it
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] if the service cannot be loaded. The session
    /// is then `Unavailable`.
    pub async fn mount(&self) -> Result<(), LoadError> {
        if self.mounted.replace(true) {
            return Ok(());
        }
        self.set_state(SessionState::Loading);
        if let Err(err) = self.gate.acquire().await {
            if !self.is_closed() {
                self.set_state(SessionState::Unavailable(err.clone()));
            }
            return Err(err);
        }
        if self.is_closed() {
            return Ok(());
        }
        info!("session ready");
        self.set_state(SessionState::Ready);
        let generation = self.generations.next();
        let text = self.text.borrow().clone();
        self.run(generation, &text).await;
        Ok(())
    }

    /// Replaces the text and converts it, unless a newer edit arrives during
    /// the debounce window.
    pub async fn set_text(&self, text: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        let text = text.into();
        *self.text.borrow_mut() = text.clone();
        if !self.can_convert() {
            return;
        }
        let generation = self.generations.next();
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if !self.generations.is_current(generation) {
                debug!(generation = generation.value(), "edit superseded during debounce");
                return;
            }
        }
        self.run(generation, &text).await;
    }

    /// Updates the preview container size used by subsequent renders.
    pub fn resize(&self, width: u32, height: u32) {
        self.target.set((width, height));
    }

    /// Inserts the current successful conversion into the host scene.
    ///
    /// # Errors
    ///
    /// Returns an [`InsertError`] when there is no current success to insert.
    pub fn insert<H: HostScene + ?Sized>(
        &self,
        host: &mut H,
        existing: &[SceneElement],
    ) -> Result<InsertReport, InsertError> {
        if self.is_closed() {
            return Err(InsertError::Closed);
        }
        let Some(held) = self.outcome.generation() else {
            return Err(InsertError::NoConversion);
        };
        if held != self.generations.latest() {
            return Err(InsertError::Stale);
        }
        let outcome = self.outcome.get().ok_or(InsertError::NoConversion)?;
        let text = self.text.borrow().clone();
        let report = insert(existing, &outcome, host, &self.draft, &text)?;
        self.set_state(SessionState::Closed);
        Ok(report)
    }

    /// Persists the draft and ends the session.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.draft.save(&self.text.borrow());
        self.set_state(SessionState::Closed);
        info!("session closed");
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn current_outcome(&self) -> Option<ConversionOutcome> {
        self.outcome.get()
    }

    pub fn surface(&self) -> Ref<'_, PreviewSurface> {
        self.surface.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.borrow_mut() = state;
    }

    fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Closed)
    }

    fn can_convert(&self) -> bool {
        self.mounted.get()
            && !matches!(
                *self.state.borrow(),
                SessionState::Loading | SessionState::Unavailable(_) | SessionState::Closed
            )
    }

    fn is_stale(&self, generation: Generation) -> bool {
        if self.is_closed() || !self.generations.is_current(generation) {
            debug!(
                generation = generation.value(),
                latest = self.generations.latest().value(),
                "discarding stale run"
            );
            return true;
        }
        false
    }

    async fn run(&self, generation: Generation, text: &str) {
        self.set_state(SessionState::Converting);
        let service = match self.gate.acquire().await {
            Ok(service) => service,
            Err(err) => {
                self.set_state(SessionState::Unavailable(err));
                return;
            }
        };
        let run = convert(text, service.as_ref(), &self.options).await;
        if self.is_stale(generation) {
            return;
        }

        let (elements, assets) = match run {
            ConversionRun::Empty => {
                self.outcome.clear();
                self.error.borrow_mut().take();
                self.surface.borrow_mut().clear();
                self.set_state(SessionState::Ready);
                return;
            }
            ConversionRun::Done(ConversionOutcome::Failure { message }) => {
                self.outcome.store(
                    generation,
                    ConversionOutcome::Failure {
                        message: message.clone(),
                    },
                );
                *self.error.borrow_mut() = Some(message);
                self.surface.borrow_mut().clear();
                self.set_state(SessionState::ErrorShown);
                return;
            }
            ConversionRun::Done(ConversionOutcome::Success { elements, assets }) => (elements, assets),
        };

        self.outcome.store(
            generation,
            ConversionOutcome::Success {
                elements: elements.clone(),
                assets: assets.clone(),
            },
        );
        self.error.borrow_mut().take();
        self.set_state(SessionState::Previewing);

        let (width, height) = self.target.get();
        let fit_dimension = self.fit.fit_dimension(width, height);
        let prepared = self.renderer.prepare(&elements, &assets, fit_dimension).await;
        if self.is_stale(generation) {
            return;
        }
        match prepared {
            Ok(prepared) => {
                self.surface.borrow_mut().present(prepared);
                debug!(generation = generation.value(), fit_dimension, "preview updated");
            }
            Err(err) => {
                debug!(generation = generation.value(), error = %err, "preview render failed");
                self.surface.borrow_mut().clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::draft::{KeyValueStore, MemoryStore};
    use crate::insert::MemoryScene;
    use crate::raster::{Bitmap, RasterRequest};
    use crate::error::RenderError;
    use crate::service::MermaidService;
    use async_trait::async_trait;

    struct SolidRasterizer;

    #[async_trait(?Send)]
    impl Rasterizer for SolidRasterizer {
        async fn rasterize(&self, request: &RasterRequest<'_>) -> Result<Bitmap, RenderError> {
            if request.elements.is_empty() {
                return Err(RenderError::EmptyScene);
            }
            Ok(Bitmap {
                width: request.max_edge,
                height: request.max_edge,
                pixels: Vec::new(),
            })
        }

        async fn encode_png(&self, _bitmap: &Bitmap) -> Result<Vec<u8>, RenderError> {
            Ok(vec![0x89])
        }
    }

    fn session(store: MemoryStore) -> Session<MermaidService, SolidRasterizer> {
        let config = Config::default();
        Session::new(
            LibraryGate::ready(MermaidService::default()),
            SolidRasterizer,
            DraftStore::new(store, &config.draft),
            &config,
        )
    }

    #[test]
    fn starts_from_draft_or_default() {
        let store = MemoryStore::new();
        assert_eq!(session(store.clone()).text(), DEFAULT_DIAGRAM);
        store.set("mermaid-to-scene", "flowchart LR\nX").unwrap();
        assert_eq!(session(store).text(), "flowchart LR\nX");
    }

    #[tokio::test]
    async fn mount_converts_initial_text() {
        let session = session(MemoryStore::new());
        assert_eq!(session.state(), SessionState::Loading);
        session.resize(500, 300);
        session.mount().await.unwrap();
        assert_eq!(session.state(), SessionState::Previewing);
        assert!(session.current_outcome().unwrap().is_success());
        assert_eq!(session.surface().image().unwrap().bitmap.width, 500);
        session.mount().await.unwrap();
        assert_eq!(session.surface().presentations(), 1);
    }

    #[tokio::test]
    async fn failure_then_recovery() {
        let session = session(MemoryStore::new());
        session.mount().await.unwrap();
        session.set_text("flowchart TD\nA[oops").await;
        assert_eq!(session.state(), SessionState::ErrorShown);
        assert!(session.error().unwrap().starts_with("Parse error on line 2"));
        assert!(session.surface().is_empty());

        session.set_text("flowchart TD\nA --> B").await;
        assert_eq!(session.state(), SessionState::Previewing);
        assert_eq!(session.error(), None);
        assert!(!session.surface().is_empty());
    }

    #[tokio::test]
    async fn header_only_text_shows_an_error() {
        let session = session(MemoryStore::new());
        session.mount().await.unwrap();
        session.set_text("flowchart TD").await;
        assert_eq!(session.state(), SessionState::ErrorShown);
        assert_eq!(session.error().as_deref(), Some("Parse error on line 1: diagram has no nodes"));
        assert!(session.surface().is_empty());

        session.set_text("flowchart TD\nsubgraph S\nend").await;
        assert_eq!(session.state(), SessionState::Previewing);
        assert!(!session.surface().is_empty());
        let mut host = MemoryScene::new();
        assert_eq!(session.insert(&mut host, &[]).unwrap().inserted.len(), 1);
    }

    #[tokio::test]
    async fn empty_text_clears_everything() {
        let session = session(MemoryStore::new());
        session.mount().await.unwrap();
        session.set_text("   ").await;
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.surface().is_empty());
        assert_eq!(session.error(), None);
        assert_eq!(session.current_outcome(), None);
        let mut host = MemoryScene::new();
        assert_eq!(session.insert(&mut host, &[]), Err(InsertError::NoConversion));
    }

    #[tokio::test]
    async fn close_persists_latest_text() {
        let store = MemoryStore::new();
        let session = session(store.clone());
        session.mount().await.unwrap();
        session.set_text("flowchart TD\nsaved").await;
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(store.get("mermaid-to-scene").unwrap().as_deref(), Some("flowchart TD\nsaved"));

        session.set_text("ignored").await;
        assert_eq!(session.text(), "flowchart TD\nsaved");
        let mut host = MemoryScene::new();
        assert_eq!(session.insert(&mut host, &[]), Err(InsertError::Closed));
    }

    #[tokio::test]
    async fn load_failure_makes_session_unavailable() {
        let config = Config::default();
        let gate: LibraryGate<MermaidService> =
            LibraryGate::new(|| async { Err(LoadError::new("script blocked")) });
        let session = Session::new(
            gate,
            SolidRasterizer,
            DraftStore::new(MemoryStore::new(), &config.draft),
            &config,
        );
        let err = session.mount().await.unwrap_err();
        assert_eq!(err.message, "script blocked");
        assert_eq!(session.state(), SessionState::Unavailable(err));
        session.set_text("flowchart TD\nA").await;
        assert!(matches!(session.state(), SessionState::Unavailable(_)));
        assert_eq!(session.current_outcome(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_drops_superseded_edits() {
        let config = Config {
            session: crate::config::SessionConfig { debounce_ms: 200 },
            ..Config::default()
        };
        let session = Session::new(
            LibraryGate::ready(MermaidService::default()),
            SolidRasterizer,
            DraftStore::new(MemoryStore::new(), &config.draft),
            &config,
        );
        session.mount().await.unwrap();
        let presented = session.surface().presentations();
        tokio::join!(
            session.set_text("flowchart TD\nA"),
            session.set_text("flowchart TD\nA --> B"),
        );
        assert_eq!(session.surface().presentations(), presented + 1);
        let Some(ConversionOutcome::Success { elements, .. }) = session.current_outcome() else {
            panic!("expected success");
        };
        assert!(elements.iter().any(|e| e.kind.is_linear()));
    }
}
