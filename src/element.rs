//! Host scene elements and normalization of raw service descriptors.
//!
//! A `RawElement` is an open-ended descriptor: a kind string, a bounding box,
//! and a JSON `props` bag. `normalize` resolves it into the host's canonical
//! `SceneElement`, assigning fresh random ids and seeds, splitting labels into
//! bound text elements, and wiring connector bindings to their endpoints.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::scene::RawElement;
use crate::text_metrics::measure_text_width;

/// Identifier of an embedded binary asset, referenced by image elements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    /// Content-addressed id, so inserting the same image twice reuses one asset.
    pub fn for_content(mime_type: &str, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(mime_type.as_bytes());
        hasher.update(b";");
        hasher.update(data);
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Asset {
    pub fn new(mime_type: String, data: Vec<u8>) -> Self {
        Self {
            id: AssetId::for_content(&mime_type, &data),
            mime_type,
            data,
        }
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeStyle {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    pub text: String,
    pub font_size: f32,
    pub text_align: TextAlign,
    /// Element the text is bound inside, if any.
    pub container_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearData {
    /// Offsets from the element origin.
    pub points: Vec<[f32; 2]>,
    pub start_binding: Option<Binding>,
    pub end_binding: Option<Binding>,
    pub start_arrowhead: Option<String>,
    pub end_arrowhead: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub file_id: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    pub name: Option<String>,
}

/// Element kind together with its per-kind data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Frame(FrameData),
    Text(TextData),
    Arrow(LinearData),
    Line(LinearData),
    Image(ImageRef),
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Frame(_) => "frame",
            Self::Text(_) => "text",
            Self::Arrow(_) => "arrow",
            Self::Line(_) => "line",
            Self::Image(_) => "image",
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Arrow(_) | Self::Line(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The host's canonical drawable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneElement {
    pub id: String,
    #[serde(flatten)]
    pub kind: ElementKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub stroke_color: String,
    pub background_color: String,
    pub stroke_width: f32,
    pub stroke_style: StrokeStyle,
    pub rounded: bool,
    pub seed: u32,
    pub version: u32,
    pub group_ids: Vec<String>,
    pub frame_id: Option<String>,
    pub bound_elements: Vec<BoundElement>,
}

impl SceneElement {
    fn blank(kind: ElementKind, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            x,
            y,
            width,
            height,
            stroke_color: "#1e1e1e".to_string(),
            background_color: "transparent".to_string(),
            stroke_width: 2.0,
            stroke_style: StrokeStyle::Solid,
            rounded: false,
            seed: rand::random(),
            version: 1,
            group_ids: Vec::new(),
            frame_id: None,
            bound_elements: Vec::new(),
        }
    }

    pub fn text(&self) -> Option<&TextData> {
        match &self.kind {
            ElementKind::Text(data) => Some(data),
            _ => None,
        }
    }

    pub fn linear(&self) -> Option<&LinearData> {
        match &self.kind {
            ElementKind::Arrow(data) | ElementKind::Line(data) => Some(data),
            _ => None,
        }
    }
}

/// Typed access to a raw descriptor's `props` bag.
struct Props<'a> {
    value: &'a Value,
}

impl<'a> Props<'a> {
    fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn str(&self, key: &str) -> Option<&'a str> {
        self.value.get(key).and_then(Value::as_str)
    }

    fn f32(&self, key: &str) -> Option<f32> {
        self.value.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    fn stroke_style(&self) -> StrokeStyle {
        match self.str("strokeStyle") {
            Some("dashed") => StrokeStyle::Dashed,
            Some("dotted") => StrokeStyle::Dotted,
            _ => StrokeStyle::Solid,
        }
    }

    fn points(&self) -> Vec<[f32; 2]> {
        self.value
            .get("points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|point| {
                        let x = point.get(0)?.as_f64()?;
                        let y = point.get(1)?.as_f64()?;
                        Some([x as f32, y as f32])
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn label(&self) -> Option<Label<'a>> {
        let label = self.value.get("label")?;
        let text = label.get("text")?.as_str()?;
        let anchor = label.get("anchor").and_then(Value::as_array).and_then(|a| {
            Some((a.first()?.as_f64()? as f32, a.get(1)?.as_f64()? as f32))
        });
        Some(Label {
            text,
            font_size: Props::new(label).f32("fontSize").unwrap_or(20.0),
            font_family: Props::new(label).str("fontFamily").unwrap_or_default(),
            color: Props::new(label).str("color"),
            anchor,
        })
    }
}

struct Label<'a> {
    text: &'a str,
    font_size: f32,
    font_family: &'a str,
    color: Option<&'a str>,
    anchor: Option<(f32, f32)>,
}

/// Converts raw descriptors into host elements. Descriptors of unknown kind
/// are dropped. Bindings to unknown refs are left unbound.
pub fn normalize(raw: Vec<RawElement>) -> Vec<SceneElement> {
    let mut elements: Vec<SceneElement> = Vec::with_capacity(raw.len() * 2);
    let mut ids: HashMap<String, String> = HashMap::new();
    // (element index, start ref, end ref) resolved once every ref has an id.
    let mut pending: Vec<(usize, Option<String>, Option<String>)> = Vec::new();
    let mut frames: Vec<(usize, String)> = Vec::new();

    for item in &raw {
        let props = Props::new(&item.props);
        let Some(kind) = element_kind(item, &props) else {
            debug!(kind = %item.kind, "dropping raw element of unknown kind");
            continue;
        };
        let mut element = SceneElement::blank(kind, item.x, item.y, item.width, item.height);
        if let Some(color) = props.str("strokeColor") {
            element.stroke_color = color.to_string();
        }
        if let Some(color) = props.str("backgroundColor") {
            element.background_color = color.to_string();
        }
        if let Some(width) = props.f32("strokeWidth") {
            element.stroke_width = width;
        }
        element.stroke_style = props.stroke_style();
        element.rounded = item.props.get("rounded").and_then(Value::as_bool).unwrap_or(false);
        if let Some(reference) = props.str("ref") {
            ids.insert(reference.to_string(), element.id.clone());
        }
        if element.kind.is_linear() {
            pending.push((
                elements.len(),
                props.str("startRef").map(str::to_string),
                props.str("endRef").map(str::to_string),
            ));
        }
        if let Some(frame) = props.str("frame") {
            frames.push((elements.len(), frame.to_string()));
        }

        let label = props.label();
        let container_idx = elements.len();
        elements.push(element);
        if let Some(label) = label {
            let text = bound_text(&elements[container_idx], &label);
            if let Some(frame) = props.str("frame") {
                frames.push((elements.len(), frame.to_string()));
            }
            let bound = BoundElement {
                id: text.id.clone(),
                kind: "text".to_string(),
            };
            elements[container_idx].bound_elements.push(bound);
            elements.push(text);
        }
    }

    for (idx, start, end) in pending {
        let resolve = |reference: Option<String>| reference.and_then(|r| ids.get(&r).cloned());
        let start_id = resolve(start);
        let end_id = resolve(end);
        let connector_id = elements[idx].id.clone();
        let connector_kind = elements[idx].kind.name().to_string();
        for target in [&start_id, &end_id].into_iter().flatten() {
            if let Some(node) = elements.iter_mut().find(|e| &e.id == target)
                && !node.bound_elements.iter().any(|b| b.id == connector_id)
            {
                node.bound_elements.push(BoundElement {
                    id: connector_id.clone(),
                    kind: connector_kind.clone(),
                });
            }
        }
        if let ElementKind::Arrow(data) | ElementKind::Line(data) = &mut elements[idx].kind {
            data.start_binding = start_id.map(|element_id| Binding { element_id });
            data.end_binding = end_id.map(|element_id| Binding { element_id });
        }
    }

    for (idx, frame) in frames {
        elements[idx].frame_id = ids.get(&frame).cloned();
    }
    elements
}

fn element_kind(item: &RawElement, props: &Props<'_>) -> Option<ElementKind> {
    let linear = || LinearData {
        points: {
            let points = props.points();
            if points.is_empty() {
                vec![[0.0, 0.0], [item.width, item.height]]
            } else {
                points
            }
        },
        start_binding: None,
        end_binding: None,
        start_arrowhead: props.str("startArrowhead").map(str::to_string),
        end_arrowhead: props.str("endArrowhead").map(str::to_string),
    };
    Some(match item.kind.as_str() {
        "rectangle" => ElementKind::Rectangle,
        "ellipse" => ElementKind::Ellipse,
        "diamond" => ElementKind::Diamond,
        "frame" => ElementKind::Frame(FrameData {
            name: props.str("name").map(str::to_string),
        }),
        "text" => ElementKind::Text(TextData {
            text: props.str("text").unwrap_or_default().to_string(),
            font_size: props.f32("fontSize").unwrap_or(20.0),
            text_align: TextAlign::Center,
            container_id: None,
        }),
        "arrow" => ElementKind::Arrow(linear()),
        "line" => ElementKind::Line(linear()),
        "image" => ElementKind::Image(ImageRef {
            file_id: AssetId(props.str("fileId")?.to_string()),
        }),
        _ => return None,
    })
}

/// Text bound inside a container. Connector labels sit on their anchor,
/// shape labels are centred in the shape.
fn bound_text(container: &SceneElement, label: &Label<'_>) -> SceneElement {
    let line_count = label.text.lines().count().max(1) as f32;
    let height = line_count * label.font_size * 1.25;
    let longest = label
        .text
        .lines()
        .map(|line| measure_text_width(line, label.font_size, label.font_family))
        .fold(0.0f32, f32::max);
    let (cx, cy, width) = match label.anchor {
        Some((ax, ay)) => (ax, ay, longest),
        None => (
            container.x + container.width / 2.0,
            container.y + container.height / 2.0,
            longest.min(container.width.max(1.0)),
        ),
    };
    let mut text = SceneElement::blank(
        ElementKind::Text(TextData {
            text: label.text.to_string(),
            font_size: label.font_size,
            text_align: TextAlign::Center,
            container_id: Some(container.id.clone()),
        }),
        cx - width / 2.0,
        cy - height / 2.0,
        width,
        height,
    );
    if let Some(color) = label.color {
        text.stroke_color = color.to_string();
    }
    text
}

/// Structural equality that ignores the random parts of elements: ids are
/// compared by position and seeds are ignored.
pub fn equivalent(a: &[SceneElement], b: &[SceneElement]) -> bool {
    a.len() == b.len() && canonical(a) == canonical(b)
}

fn canonical(elements: &[SceneElement]) -> Vec<SceneElement> {
    let index: HashMap<&str, String> = elements
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.id.as_str(), format!("#{idx}")))
        .collect();
    let map = |id: &str| index.get(id).cloned().unwrap_or_else(|| id.to_string());
    elements
        .iter()
        .map(|element| {
            let mut copy = element.clone();
            copy.id = map(&element.id);
            copy.seed = 0;
            copy.frame_id = element.frame_id.as_deref().map(map);
            copy.group_ids = element.group_ids.iter().map(|g| map(g)).collect();
            for bound in &mut copy.bound_elements {
                bound.id = map(&bound.id);
            }
            match &mut copy.kind {
                ElementKind::Text(data) => {
                    data.container_id = data.container_id.as_deref().map(map);
                }
                ElementKind::Arrow(data) | ElementKind::Line(data) => {
                    for binding in [&mut data.start_binding, &mut data.end_binding].into_iter().flatten() {
                        binding.element_id = map(&binding.element_id);
                    }
                }
                _ => {}
            }
            copy
        })
        .collect()
}
