//! Text to scene elements, plus the bookkeeping that keeps only the latest
//! run's result.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ConvertOptions;
use crate::element::{Asset, AssetId, SceneElement, normalize};
use crate::service::ConversionService;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Success {
        elements: Vec<SceneElement>,
        assets: BTreeMap<AssetId, Asset>,
    },
    Failure {
        message: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message),
            Self::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionRun {
    /// Blank input. Nothing to show and nothing to report.
    Empty,
    Done(ConversionOutcome),
}

pub async fn convert<S>(text: &str, service: &S, options: &ConvertOptions) -> ConversionRun
where
    S: ConversionService + ?Sized,
{
    if text.trim().is_empty() {
        return ConversionRun::Empty;
    }
    let graph = match service.parse(text, options).await {
        Ok(graph) => graph,
        Err(err) => {
            debug!(error = %err, "conversion failed");
            return ConversionRun::Done(ConversionOutcome::Failure {
                message: err.message,
            });
        }
    };
    let scene = service.to_scene(&graph);
    let elements = normalize(scene.elements);
    debug!(elements = elements.len(), assets = scene.assets.len(), "conversion succeeded");
    ConversionRun::Done(ConversionOutcome::Success {
        elements,
        assets: scene.assets,
    })
}

/// Identifies one pipeline run. Later runs compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct GenerationCounter {
    latest: Cell<u64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Generation {
        let next = self.latest.get() + 1;
        self.latest.set(next);
        Generation(next)
    }

    pub fn latest(&self) -> Generation {
        Generation(self.latest.get())
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.latest()
    }
}

/// Holds the outcome of the most recently applied run.
#[derive(Debug, Default)]
pub struct OutcomeSlot {
    current: RefCell<Option<(Generation, ConversionOutcome)>>,
}

impl OutcomeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses outcomes older than the one already held.
    pub fn store(&self, generation: Generation, outcome: ConversionOutcome) -> bool {
        let mut current = self.current.borrow_mut();
        if current.as_ref().is_some_and(|(held, _)| *held > generation) {
            return false;
        }
        *current = Some((generation, outcome));
        true
    }

    pub fn clear(&self) {
        self.current.borrow_mut().take();
    }

    pub fn generation(&self) -> Option<Generation> {
        self.current.borrow().as_ref().map(|(generation, _)| *generation)
    }

    pub fn get(&self) -> Option<ConversionOutcome> {
        self.current.borrow().as_ref().map(|(_, outcome)| outcome.clone())
    }
}
