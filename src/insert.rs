//! Commits a successful conversion into the host scene.

use std::collections::BTreeMap;

use tracing::info;

use crate::draft::DraftStore;
use crate::element::{Asset, AssetId, SceneElement};
use crate::error::InsertError;
use crate::pipeline::ConversionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSelection {
    Selection,
}

/// The surrounding drawing application as seen by the insert step.
pub trait HostScene {
    fn replace_all_elements(&mut self, elements: Vec<SceneElement>);
    fn add_assets(&mut self, assets: Vec<Asset>);
    fn scroll_to_content(&mut self, elements: &[SceneElement]);
    fn set_selection(&mut self, element_ids: &[String]);
    fn set_active_tool(&mut self, tool: ToolSelection);
    fn close_dialog(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    ReplaceAll(usize),
    AddAssets(usize),
    ScrollTo(usize),
    Select(usize),
    ActiveTool(ToolSelection),
    CloseDialog,
}

/// In-memory host that records every call it receives.
#[derive(Debug, Default)]
pub struct MemoryScene {
    pub elements: Vec<SceneElement>,
    pub assets: BTreeMap<AssetId, Asset>,
    pub selection: Vec<String>,
    pub scrolled_to: Vec<String>,
    pub active_tool: Option<ToolSelection>,
    pub dialog_open: bool,
    pub calls: Vec<HostCall>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self {
            dialog_open: true,
            ..Self::default()
        }
    }

    pub fn with_elements(elements: Vec<SceneElement>) -> Self {
        Self {
            elements,
            ..Self::new()
        }
    }
}

impl HostScene for MemoryScene {
    fn replace_all_elements(&mut self, elements: Vec<SceneElement>) {
        self.calls.push(HostCall::ReplaceAll(elements.len()));
        self.elements = elements;
    }

    fn add_assets(&mut self, assets: Vec<Asset>) {
        self.calls.push(HostCall::AddAssets(assets.len()));
        for asset in assets {
            self.assets.insert(asset.id.clone(), asset);
        }
    }

    fn scroll_to_content(&mut self, elements: &[SceneElement]) {
        self.calls.push(HostCall::ScrollTo(elements.len()));
        self.scrolled_to = elements.iter().map(|e| e.id.clone()).collect();
    }

    fn set_selection(&mut self, element_ids: &[String]) {
        self.calls.push(HostCall::Select(element_ids.len()));
        self.selection = element_ids.to_vec();
    }

    fn set_active_tool(&mut self, tool: ToolSelection) {
        self.calls.push(HostCall::ActiveTool(tool));
        self.active_tool = Some(tool);
    }

    fn close_dialog(&mut self) {
        self.calls.push(HostCall::CloseDialog);
        self.dialog_open = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: Vec<String>,
    pub total: usize,
    pub assets: usize,
}

/// Appends the outcome's elements after `existing` and hands control back to
/// the host. The draft is saved before the dialog closes.
///
/// # Errors
///
/// Returns [`InsertError::NoConversion`] unless the outcome is a success.
pub fn insert<H: HostScene + ?Sized>(
    existing: &[SceneElement],
    outcome: &ConversionOutcome,
    host: &mut H,
    draft: &DraftStore,
    text: &str,
) -> Result<InsertReport, InsertError> {
    let ConversionOutcome::Success { elements, assets } = outcome else {
        return Err(InsertError::NoConversion);
    };
    if elements.is_empty() {
        return Err(InsertError::NoConversion);
    }

    let mut merged = Vec::with_capacity(existing.len() + elements.len());
    merged.extend_from_slice(existing);
    merged.extend(elements.iter().cloned());
    let total = merged.len();
    host.replace_all_elements(merged);
    host.add_assets(assets.values().cloned().collect());
    host.scroll_to_content(elements);
    let inserted: Vec<String> = elements.iter().map(|e| e.id.clone()).collect();
    host.set_selection(&inserted);

    draft.save(text);
    host.set_active_tool(ToolSelection::Selection);
    host.close_dialog();
    info!(inserted = inserted.len(), total, assets = assets.len(), "diagram inserted");
    Ok(InsertReport {
        inserted,
        total,
        assets: assets.len(),
    })
}
