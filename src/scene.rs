//! Scene synthesis: positions a parsed graph and describes it as raw element
//! descriptors that `element::normalize` turns into host elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::LayoutConfig;
use crate::element::{Asset, AssetId};
use crate::ir::{EdgeStyle, Graph, NodeShape};
use crate::layout::{EdgeLayout, Layout, NodeLayout, SubgraphLayout, compute_layout};
use crate::theme::Theme;

/// Service-side element descriptor. `props` carries per-kind data and uses
/// `ref` / `startRef` / `endRef` / `frame` to link descriptors to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub props: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScene {
    pub elements: Vec<RawElement>,
    pub assets: BTreeMap<AssetId, Asset>,
}

/// Frames come first so they paint beneath their members, then nodes, then
/// connectors on top.
pub fn to_scene(graph: &Graph, theme: &Theme, config: &LayoutConfig) -> RawScene {
    let layout = compute_layout(graph, theme, config);
    let font_size = graph.font_size;
    let mut scene = RawScene::default();

    for (idx, sub) in layout.subgraphs.iter().enumerate() {
        scene.elements.push(frame_element(idx, sub, theme));
    }

    for node in &layout.nodes {
        let frame = innermost_frame(&layout, &node.id);
        if let Some(image) = &node.image {
            let asset = Asset::new(image.mime_type.clone(), image.data.clone());
            let mut props = json!({
                "ref": node_ref(&node.id),
                "fileId": asset.id.as_str(),
                "strokeColor": "transparent",
            });
            set_frame(&mut props, frame);
            scene
                .elements
                .push(raw("image", node.x, node.y, node.width, node.height, props));
            scene.assets.insert(asset.id.clone(), asset);
            if node.label.lines.join("\n") != node.id {
                scene.elements.push(caption_element(node, font_size, theme, frame));
            }
            continue;
        }
        scene.elements.push(node_element(node, font_size, theme, frame));
    }

    for (idx, edge) in layout.edges.iter().enumerate() {
        if let Some(element) = edge_element(idx, edge, font_size, theme) {
            scene.elements.push(element);
        }
    }
    scene
}

fn raw(kind: &str, x: f32, y: f32, width: f32, height: f32, props: Value) -> RawElement {
    RawElement {
        kind: kind.to_string(),
        x,
        y,
        width,
        height,
        props,
    }
}

fn node_ref(id: &str) -> String {
    format!("node:{id}")
}

fn frame_ref(idx: usize) -> String {
    format!("frame:{idx}")
}

fn set_frame(props: &mut Value, frame: Option<usize>) {
    if let (Some(idx), Some(map)) = (frame, props.as_object_mut()) {
        map.insert("frame".to_string(), Value::String(frame_ref(idx)));
    }
}

/// Subgraphs nest in declaration order, so the last one holding the node is
/// the innermost.
fn innermost_frame(layout: &Layout, node_id: &str) -> Option<usize> {
    layout
        .subgraphs
        .iter()
        .rposition(|sub| sub.nodes.iter().any(|n| n == node_id))
}

fn frame_element(idx: usize, sub: &SubgraphLayout, theme: &Theme) -> RawElement {
    let props = json!({
        "ref": frame_ref(idx),
        "name": sub.label,
        "strokeColor": theme.frame_stroke,
        "backgroundColor": theme.frame_background,
    });
    raw("frame", sub.x, sub.y, sub.width, sub.height, props)
}

fn node_element(node: &NodeLayout, font_size: f32, theme: &Theme, frame: Option<usize>) -> RawElement {
    let kind = match node.shape {
        NodeShape::Diamond | NodeShape::Hexagon => "diamond",
        NodeShape::Circle | NodeShape::DoubleCircle => "ellipse",
        _ => "rectangle",
    };
    let rounded = matches!(node.shape, NodeShape::RoundRect | NodeShape::Stadium);
    let mut props = json!({
        "ref": node_ref(&node.id),
        "strokeColor": theme.stroke_color,
        "backgroundColor": theme.node_background,
        "rounded": rounded,
        "label": {
            "text": node.label.lines.join("\n"),
            "fontSize": font_size,
            "fontFamily": theme.font_family,
            "color": theme.text_color,
        },
    });
    set_frame(&mut props, frame);
    raw(kind, node.x, node.y, node.width, node.height, props)
}

fn caption_element(node: &NodeLayout, font_size: f32, theme: &Theme, frame: Option<usize>) -> RawElement {
    let mut props = json!({
        "text": node.label.lines.join("\n"),
        "fontSize": font_size,
        "fontFamily": theme.font_family,
        "color": theme.text_color,
    });
    set_frame(&mut props, frame);
    let x = node.x + (node.width - node.label.width) / 2.0;
    raw("text", x, node.y + node.height + 4.0, node.label.width, node.label.height, props)
}

/// Points are stored relative to the first one, which becomes the element origin.
fn edge_element(idx: usize, edge: &EdgeLayout, font_size: f32, theme: &Theme) -> Option<RawElement> {
    let (x0, y0) = *edge.points.first()?;
    let relative: Vec<[f32; 2]> = edge.points.iter().map(|(x, y)| [x - x0, y - y0]).collect();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for [x, y] in &relative {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }

    let kind = if edge.arrow_start || edge.arrow_end { "arrow" } else { "line" };
    let (stroke_style, stroke_width) = match edge.style {
        EdgeStyle::Solid => ("solid", 2.0),
        EdgeStyle::Dotted => ("dotted", 2.0),
        EdgeStyle::Thick => ("solid", 4.0),
    };
    let arrowhead = |on: bool| if on { json!("arrow") } else { Value::Null };
    let mut props = json!({
        "ref": format!("edge:{idx}"),
        "strokeColor": theme.line_color,
        "strokeStyle": stroke_style,
        "strokeWidth": stroke_width,
        "points": relative,
        "startRef": node_ref(&edge.from),
        "endRef": node_ref(&edge.to),
        "startArrowhead": arrowhead(edge.arrow_start),
        "endArrowhead": arrowhead(edge.arrow_end),
    });
    if let (Some(label), Some(map)) = (&edge.label, props.as_object_mut()) {
        let (ax, ay) = edge.label_anchor.unwrap_or((x0, y0));
        map.insert(
            "label".to_string(),
            json!({
                "text": label.lines.join("\n"),
                "fontSize": font_size,
                "fontFamily": theme.font_family,
                "color": theme.text_color,
                "anchor": [ax, ay],
            }),
        );
    }
    Some(raw(kind, x0, y0, max_x - min_x, max_y - min_y, props))
}
