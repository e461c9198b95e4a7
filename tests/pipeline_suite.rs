use std::time::Duration;

use async_trait::async_trait;
use mermaid_scene_preview::config::SessionConfig;
use mermaid_scene_preview::element::equivalent;
use mermaid_scene_preview::ir::Graph;
use mermaid_scene_preview::{
    Bitmap, Config, ConversionOutcome, ConversionRun, ConversionService, ConvertOptions, DraftStore, ElementKind,
    FileStore, InsertError, KeyValueStore, LibraryGate, MemoryScene, MemoryStore, MermaidService, ParseError,
    RasterRequest, Rasterizer, RawElement, RawScene, RenderError, SceneElement, Session, SessionState, convert,
};

/// Sleeps before parsing: long for text containing "slow", short otherwise.
struct DelayedService {
    inner: MermaidService,
}

#[async_trait(?Send)]
impl ConversionService for DelayedService {
    async fn parse(&self, text: &str, options: &ConvertOptions) -> Result<Graph, ParseError> {
        let delay = if text.contains("slow") { 500 } else { 20 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.parse(text, options).await
    }

    fn to_scene(&self, graph: &Graph) -> RawScene {
        self.inner.to_scene(graph)
    }
}

/// Bitmap sized to the request; refuses edges over 1000 pixels at encode time.
struct StubRasterizer;

#[async_trait(?Send)]
impl Rasterizer for StubRasterizer {
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

    async fn encode_png(&self, bitmap: &Bitmap) -> Result<Vec<u8>, RenderError> {
        if bitmap.width > 1000 {
            return Err(RenderError::CanvasLimit {
                width: bitmap.width,
                height: bitmap.height,
            });
        }
        Ok(b"\x89PNG".to_vec())
    }
}

/// Takes 500ms when a label reads "slow"; bitmap width is the element count.
struct SlowRasterizer;

#[async_trait(?Send)]
impl Rasterizer for SlowRasterizer {
    async fn rasterize(&self, request: &RasterRequest<'_>) -> Result<Bitmap, RenderError> {
        let slow = request.elements.iter().any(|e| e.text().is_some_and(|t| t.text == "slow"));
        tokio::time::sleep(Duration::from_millis(if slow { 500 } else { 10 })).await;
        Ok(Bitmap {
            width: request.elements.len() as u32,
            height: 1,
            pixels: Vec::new(),
        })
    }

    async fn encode_png(&self, _bitmap: &Bitmap) -> Result<Vec<u8>, RenderError> {
        Ok(b"\x89PNG".to_vec())
    }
}

fn delayed_session(config: &Config) -> Session<DelayedService, StubRasterizer> {
    Session::new(
        LibraryGate::ready(DelayedService {
            inner: MermaidService::default(),
        }),
        StubRasterizer,
        DraftStore::new(MemoryStore::new(), &config.draft),
        config,
    )
}

fn stub_session() -> Session<MermaidService, StubRasterizer> {
    let config = Config::default();
    Session::new(
        LibraryGate::ready(MermaidService::default()),
        StubRasterizer,
        DraftStore::new(MemoryStore::new(), &config.draft),
        &config,
    )
}

fn success_elements(outcome: Option<ConversionOutcome>) -> Vec<SceneElement> {
    match outcome {
        Some(ConversionOutcome::Success { elements, .. }) => elements,
        other => panic!("expected success, got {other:?}"),
    }
}

fn labels(elements: &[SceneElement]) -> Vec<String> {
    elements
        .iter()
        .filter_map(|e| e.text().map(|t| t.text.clone()))
        .collect()
}

#[cfg(feature = "png")]
#[tokio::test]
async fn end_to_end_minimal_flowchart() {
    use mermaid_scene_preview::SvgRasterizer;

    let config = Config::default();
    let store = MemoryStore::new();
    let session = Session::new(
        LibraryGate::new(|| async { Ok(MermaidService::default()) }),
        SvgRasterizer::new(&config.preview, &config.theme.font_family),
        DraftStore::new(store.clone(), &config.draft),
        &config,
    );
    session.resize(500, 300);
    session.mount().await.unwrap();
    session.set_text("flowchart TD\n A-->B").await;

    assert_eq!(session.state(), SessionState::Previewing);
    let elements = success_elements(session.current_outcome());
    let nodes = elements.iter().filter(|e| matches!(e.kind, ElementKind::Rectangle)).count();
    let arrows = elements.iter().filter(|e| matches!(e.kind, ElementKind::Arrow(_))).count();
    assert!(nodes >= 2);
    assert!(arrows >= 1);
    {
        let surface = session.surface();
        assert_eq!(surface.background(), Some("#fff"));
        let image = surface.image().unwrap();
        assert!(image.bitmap.width <= 500 && image.bitmap.height <= 500);
        assert_eq!(&image.png[1..4], b"PNG");
    }

    let existing = mermaid_scene_preview::normalize(vec![RawElement {
        kind: "ellipse".to_string(),
        x: -200.0,
        y: 0.0,
        width: 80.0,
        height: 80.0,
        props: serde_json::json!({"backgroundColor": "#ffc9c9"}),
    }]);
    let mut host = MemoryScene::with_elements(existing.clone());
    let report = session.insert(&mut host, &existing).unwrap();
    assert!(host.elements.len() >= 3);
    assert_eq!(host.elements[0], existing[0]);
    let new_ids: Vec<String> = host.elements[1..].iter().map(|e| e.id.clone()).collect();
    assert_eq!(host.selection, new_ids);
    assert_eq!(report.inserted, new_ids);
    assert!(!host.dialog_open);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        store.get("mermaid-to-scene").unwrap().as_deref(),
        Some("flowchart TD\n A-->B")
    );
}

#[tokio::test(start_paused = true)]
async fn later_edit_wins_even_when_earlier_run_finishes_last() {
    let session = delayed_session(&Config::default());
    session.resize(400, 400);
    session.mount().await.unwrap();
    let presented = session.surface().presentations();

    tokio::join!(
        session.set_text("flowchart TD\nslow --> first"),
        session.set_text("flowchart TD\nfast --> second"),
    );

    let elements = success_elements(session.current_outcome());
    assert_eq!(labels(&elements), ["fast", "second"]);
    assert_eq!(session.text(), "flowchart TD\nfast --> second");
    assert_eq!(session.surface().presentations(), presented + 1);
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test(start_paused = true)]
async fn stale_failure_does_not_override_newer_success() {
    let session = delayed_session(&Config::default());
    session.mount().await.unwrap();

    tokio::join!(
        session.set_text("flowchart TD\nslow[broken"),
        session.set_text("flowchart TD\nok --> fine"),
    );

    assert_eq!(session.error(), None);
    assert!(!session.surface().is_empty());
    assert_eq!(labels(&success_elements(session.current_outcome())), ["ok", "fine"]);
}

#[tokio::test(start_paused = true)]
async fn slow_rasterize_of_older_run_never_reaches_surface() {
    let config = Config::default();
    let session = Session::new(
        LibraryGate::ready(MermaidService::default()),
        SlowRasterizer,
        DraftStore::new(MemoryStore::new(), &config.draft),
        &config,
    );
    session.mount().await.unwrap();
    let presented = session.surface().presentations();

    tokio::join!(
        session.set_text("flowchart TD\nslow"),
        session.set_text("flowchart TD\nfast --> other"),
    );

    let elements = success_elements(session.current_outcome());
    assert_eq!(labels(&elements), ["fast", "other"]);
    let surface = session.surface();
    assert_eq!(surface.presentations(), presented + 1);
    assert_eq!(surface.image().unwrap().bitmap.width, elements.len() as u32);
}

#[tokio::test(start_paused = true)]
async fn insert_during_pending_edit_is_stale() {
    let config = Config {
        session: SessionConfig { debounce_ms: 100 },
        ..Config::default()
    };
    let session = delayed_session(&config);
    session.mount().await.unwrap();
    let mut host = MemoryScene::new();

    let (_, result) = tokio::join!(session.set_text("flowchart TD\nX --> Y"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.insert(&mut host, &[])
    });
    assert_eq!(result, Err(InsertError::Stale));
    assert!(host.calls.is_empty());

    let report = session.insert(&mut host, &[]).unwrap();
    assert_eq!(report.total, host.elements.len());
    assert_eq!(labels(&host.elements), ["X", "Y"]);
}

#[tokio::test]
async fn malformed_input_clears_preview_and_shows_message() {
    let session = stub_session();
    session.resize(300, 700);
    session.mount().await.unwrap();
    assert!(!session.surface().is_empty());
    assert_eq!(session.surface().image().unwrap().bitmap.width, 290);

    session.set_text("flowchart TD\nA --> B\nsubgraph open").await;
    assert_eq!(session.state(), SessionState::ErrorShown);
    assert_eq!(
        session.error().as_deref(),
        Some("Parse error on line 3: subgraph 'open' is missing 'end'")
    );
    assert!(session.surface().is_empty());
    assert!(matches!(
        session.current_outcome(),
        Some(ConversionOutcome::Failure { .. })
    ));
    let mut host = MemoryScene::new();
    assert_eq!(session.insert(&mut host, &[]), Err(InsertError::NoConversion));
}

#[tokio::test]
async fn render_failure_clears_surface_but_keeps_outcome() {
    let session = stub_session();
    session.resize(500, 300);
    session.mount().await.unwrap();
    assert!(!session.surface().is_empty());

    session.resize(3000, 2000);
    session.set_text("flowchart LR\nA --> B").await;
    assert!(session.surface().is_empty());
    assert_eq!(session.error(), None);
    assert!(session.current_outcome().unwrap().is_success());
}

#[tokio::test]
async fn conversion_is_idempotent_modulo_ids() {
    let service = MermaidService::default();
    let text = "flowchart LR\nsubgraph S\nA -->|go| B{Check}\nend\nB -.-> C((Done))";
    let options = ConvertOptions::default();
    let (ConversionRun::Done(first), ConversionRun::Done(second)) =
        (convert(text, &service, &options).await, convert(text, &service, &options).await)
    else {
        panic!("expected completed runs");
    };
    let (first, second) = (success_elements(Some(first)), success_elements(Some(second)));
    assert_ne!(first[0].id, second[0].id);
    assert!(equivalent(&first, &second));
}

#[tokio::test]
async fn insertion_leaves_existing_elements_untouched() {
    let session = stub_session();
    session.mount().await.unwrap();
    session.set_text("flowchart TD\nP --> Q --> R").await;
    let new = success_elements(session.current_outcome());

    let existing = {
        let other = stub_session();
        other.mount().await.unwrap();
        success_elements(other.current_outcome())
    };
    let snapshot = existing.clone();
    let mut host = MemoryScene::with_elements(existing.clone());
    session.insert(&mut host, &existing).unwrap();

    assert_eq!(existing, snapshot);
    assert_eq!(host.elements.len(), existing.len() + new.len());
    assert_eq!(&host.elements[..existing.len()], &snapshot[..]);
    assert_eq!(&host.elements[existing.len()..], &new[..]);
}

#[tokio::test]
async fn draft_survives_sessions_in_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drafts.json");
    let config = Config::default();

    let first = Session::new(
        LibraryGate::ready(MermaidService::default()),
        StubRasterizer,
        DraftStore::new(FileStore::new(&path), &config.draft),
        &config,
    );
    first.mount().await.unwrap();
    first.set_text("flowchart LR\nkept --> draft").await;
    first.close();

    let second = Session::new(
        LibraryGate::ready(MermaidService::default()),
        StubRasterizer,
        DraftStore::new(FileStore::new(&path), &config.draft),
        &config,
    );
    assert_eq!(second.text(), "flowchart LR\nkept --> draft");
}
