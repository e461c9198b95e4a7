//! Layered layout for flowchart graphs: rank assignment, crossing reduction,
//! then coordinate placement along the diagram direction.

mod ranking;
mod text;

use std::collections::HashMap;

use crate::config::LayoutConfig;
use crate::ir::{Direction, EdgeStyle, Graph, ImageData, NodeShape};
use crate::theme::Theme;

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct NodeLayout {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: TextBlock,
    pub shape: NodeShape,
    pub image: Option<ImageData>,
}

impl NodeLayout {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone)]
pub struct EdgeLayout {
    pub from: String,
    pub to: String,
    pub label: Option<TextBlock>,
    pub label_anchor: Option<(f32, f32)>,
    pub points: Vec<(f32, f32)>,
    pub arrow_start: bool,
    pub arrow_end: bool,
    pub style: EdgeStyle,
}

#[derive(Debug, Clone)]
pub struct SubgraphLayout {
    pub id: Option<String>,
    pub label: String,
    pub nodes: Vec<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct Layout {
    /// Nodes in declaration order.
    pub nodes: Vec<NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    pub subgraphs: Vec<SubgraphLayout>,
    pub width: f32,
    pub height: f32,
}

impl Layout {
    pub fn node(&self, id: &str) -> Option<&NodeLayout> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

pub fn compute_layout(graph: &Graph, theme: &Theme, config: &LayoutConfig) -> Layout {
    let font_size = graph.font_size;
    let mut nodes: Vec<NodeLayout> = graph
        .ordered_nodes()
        .map(|node| {
            let label = text::measure_label(&node.label, font_size, &theme.font_family, config);
            let (width, height) = node_size(node.shape, node.image.is_some(), &label, config);
            NodeLayout {
                id: node.id.clone(),
                x: 0.0,
                y: 0.0,
                width,
                height,
                label,
                shape: node.shape,
                image: node.image.clone(),
            }
        })
        .collect();

    let ranks = ranking::compute_ranks(&graph.node_order, &graph.edges);
    let rank_count = ranks.values().copied().max().map_or(0, |max| max + 1);
    let mut rank_nodes: Vec<Vec<String>> = vec![Vec::new(); rank_count];
    for id in &graph.node_order {
        if let Some(rank) = ranks.get(id) {
            rank_nodes[*rank].push(id.clone());
        }
    }
    ranking::order_rank_nodes(&mut rank_nodes, &graph.edges, config.order_passes);

    place_nodes(&mut nodes, &rank_nodes, graph.direction, config);
    let subgraphs = place_subgraphs(graph, &nodes, font_size, &theme.font_family, config);
    // Frames must not overlap the origin-anchored bounds, so shift everything
    // once the frames are known.
    let (min_x, min_y) = subgraphs
        .iter()
        .map(|s| (s.x, s.y))
        .chain(nodes.iter().map(|n| (n.x, n.y)))
        .fold((0.0f32, 0.0f32), |(ax, ay), (x, y)| (ax.min(x), ay.min(y)));
    for node in &mut nodes {
        node.x -= min_x;
        node.y -= min_y;
    }
    let subgraphs: Vec<SubgraphLayout> = subgraphs
        .into_iter()
        .map(|mut s| {
            s.x -= min_x;
            s.y -= min_y;
            s
        })
        .collect();

    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(idx, n)| (n.id.as_str(), idx)).collect();
    let edges: Vec<EdgeLayout> = graph
        .edges
        .iter()
        .filter_map(|edge| {
            let from = &nodes[*index.get(edge.from.as_str())?];
            let to = &nodes[*index.get(edge.to.as_str())?];
            let points = route_edge(from, to);
            let label = edge
                .label
                .as_ref()
                .map(|text| text::measure_label(text, font_size, &theme.font_family, config));
            let label_anchor = label.as_ref().map(|_| polyline_midpoint(&points));
            Some(EdgeLayout {
                from: edge.from.clone(),
                to: edge.to.clone(),
                label,
                label_anchor,
                points,
                arrow_start: edge.arrow_start,
                arrow_end: edge.arrow_end,
                style: edge.style,
            })
        })
        .collect();

    let (mut width, mut height) = (0.0f32, 0.0f32);
    for node in &nodes {
        width = width.max(node.x + node.width);
        height = height.max(node.y + node.height);
    }
    for sub in &subgraphs {
        width = width.max(sub.x + sub.width);
        height = height.max(sub.y + sub.height);
    }
    for point in edges.iter().flat_map(|e| e.points.iter()) {
        width = width.max(point.0);
        height = height.max(point.1);
    }

    Layout {
        nodes,
        edges,
        subgraphs,
        width,
        height,
    }
}

fn node_size(shape: NodeShape, has_image: bool, label: &TextBlock, config: &LayoutConfig) -> (f32, f32) {
    if has_image {
        return (config.image_size, config.image_size);
    }
    let base_w = (label.width + config.node_padding_x * 2.0).max(config.min_node_width);
    let base_h = (label.height + config.node_padding_y * 2.0).max(config.min_node_height);
    match shape {
        // The label has to fit inside the inscribed rhombus.
        NodeShape::Diamond | NodeShape::Hexagon => (base_w * 1.5, base_h * 1.5),
        NodeShape::Circle | NodeShape::DoubleCircle => {
            let d = base_w.max(base_h);
            (d, d)
        }
        NodeShape::Parallelogram
        | NodeShape::ParallelogramAlt
        | NodeShape::Trapezoid
        | NodeShape::TrapezoidAlt => (base_w + base_h, base_h),
        _ => (base_w, base_h),
    }
}

/// Ranks stack along the main axis; nodes within a rank spread along the cross
/// axis and each rank is centred against the widest one.
fn place_nodes(nodes: &mut [NodeLayout], rank_nodes: &[Vec<String>], direction: Direction, config: &LayoutConfig) {
    let horizontal = direction.is_horizontal();
    let index: HashMap<String, usize> = nodes.iter().enumerate().map(|(idx, n)| (n.id.clone(), idx)).collect();
    let main_of = |n: &NodeLayout| if horizontal { n.width } else { n.height };
    let cross_of = |n: &NodeLayout| if horizontal { n.height } else { n.width };

    let rank_cross: Vec<f32> = rank_nodes
        .iter()
        .map(|bucket| {
            let sum: f32 = bucket.iter().map(|id| cross_of(&nodes[index[id]])).sum();
            sum + config.node_spacing * bucket.len().saturating_sub(1) as f32
        })
        .collect();
    let widest = rank_cross.iter().copied().fold(0.0, f32::max);

    let mut main_cursor = 0.0f32;
    for (rank, bucket) in rank_nodes.iter().enumerate() {
        let thickness = bucket.iter().map(|id| main_of(&nodes[index[id]])).fold(0.0, f32::max);
        let mut cross_cursor = (widest - rank_cross[rank]) / 2.0;
        for id in bucket {
            let node = &mut nodes[index[id]];
            let main = main_cursor + (thickness - main_of(node)) / 2.0;
            if horizontal {
                node.x = main;
                node.y = cross_cursor;
            } else {
                node.x = cross_cursor;
                node.y = main;
            }
            cross_cursor += cross_of(node) + config.node_spacing;
        }
        main_cursor += thickness + config.rank_spacing;
    }

    let total_main = (main_cursor - config.rank_spacing).max(0.0);
    if matches!(direction, Direction::BottomTop | Direction::RightLeft) {
        for node in nodes.iter_mut() {
            if horizontal {
                node.x = total_main - node.x - node.width;
            } else {
                node.y = total_main - node.y - node.height;
            }
        }
    }
}

fn place_subgraphs(
    graph: &Graph,
    nodes: &[NodeLayout],
    font_size: f32,
    font_family: &str,
    config: &LayoutConfig,
) -> Vec<SubgraphLayout> {
    let mut boxes: Vec<Option<(f32, f32, f32, f32)>> = vec![None; graph.subgraphs.len()];
    // Later subgraphs nest inside earlier ones, so resolve inner frames first.
    for idx in (0..graph.subgraphs.len()).rev() {
        let sub = &graph.subgraphs[idx];
        let mut bounds: Option<(f32, f32, f32, f32)> = None;
        for node in nodes.iter().filter(|n| sub.nodes.contains(&n.id)) {
            bounds = Some(union(bounds, (node.x, node.y, node.x + node.width, node.y + node.height)));
        }
        for inner in idx + 1..graph.subgraphs.len() {
            let members = &graph.subgraphs[inner].nodes;
            let nested = !members.is_empty() && members.iter().all(|n| sub.nodes.contains(n));
            if nested && let Some(inner_box) = boxes[inner] {
                bounds = Some(union(bounds, inner_box));
            }
        }
        boxes[idx] = bounds.map(|(x1, y1, x2, y2)| {
            (
                x1 - config.subgraph_padding,
                y1 - config.subgraph_padding - config.subgraph_label_height,
                x2 + config.subgraph_padding,
                y2 + config.subgraph_padding,
            )
        });
    }
    place_empty_subgraphs(graph, nodes, &mut boxes, font_size, font_family, config);

    graph
        .subgraphs
        .iter()
        .zip(boxes)
        .filter_map(|(sub, bounds)| {
            let (x1, y1, x2, y2) = bounds?;
            Some(SubgraphLayout {
                id: sub.id.clone(),
                label: sub.label.clone(),
                nodes: sub.nodes.clone(),
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            })
        })
        .collect()
}

/// Subgraphs without members get a minimum-size frame in a row beside the
/// rest of the diagram.
fn place_empty_subgraphs(
    graph: &Graph,
    nodes: &[NodeLayout],
    boxes: &mut [Option<(f32, f32, f32, f32)>],
    font_size: f32,
    font_family: &str,
    config: &LayoutConfig,
) {
    let content = nodes
        .iter()
        .map(|n| (n.x, n.y, n.x + n.width, n.y + n.height))
        .chain(boxes.iter().flatten().copied())
        .fold(None, |acc, b| Some(union(acc, b)));
    let (mut cursor, top) = match content {
        Some((_, y1, x2, _)) => (x2 + config.node_spacing, y1),
        None => (0.0, 0.0),
    };
    for (sub, slot) in graph.subgraphs.iter().zip(boxes.iter_mut()) {
        if slot.is_some() {
            continue;
        }
        let label = text::measure_label(&sub.label, font_size, font_family, config);
        let width = label.width.max(config.min_node_width) + config.subgraph_padding * 2.0;
        let height = config.min_node_height + config.subgraph_padding * 2.0 + config.subgraph_label_height;
        *slot = Some((cursor, top, cursor + width, top + height));
        cursor += width + config.node_spacing;
    }
}

fn union(acc: Option<(f32, f32, f32, f32)>, b: (f32, f32, f32, f32)) -> (f32, f32, f32, f32) {
    match acc {
        Some(a) => (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)),
        None => b,
    }
}

fn route_edge(from: &NodeLayout, to: &NodeLayout) -> Vec<(f32, f32)> {
    if from.id == to.id {
        let (_, cy) = from.center();
        let right = from.x + from.width;
        let loop_out = 30.0;
        let quarter = from.height / 4.0;
        return vec![
            (right, cy - quarter),
            (right + loop_out, cy - quarter),
            (right + loop_out, cy + quarter),
            (right, cy + quarter),
        ];
    }
    let start = boundary_point(from, to.center());
    let end = boundary_point(to, from.center());
    vec![start, end]
}

/// Point where the segment from the node centre toward `target` leaves the node box.
fn boundary_point(node: &NodeLayout, target: (f32, f32)) -> (f32, f32) {
    let (cx, cy) = node.center();
    let dx = target.0 - cx;
    let dy = target.1 - cy;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        return (cx, cy);
    }
    let half_w = node.width / 2.0;
    let half_h = node.height / 2.0;
    let scale_x = if dx.abs() > f32::EPSILON { half_w / dx.abs() } else { f32::INFINITY };
    let scale_y = if dy.abs() > f32::EPSILON { half_h / dy.abs() } else { f32::INFINITY };
    let scale = scale_x.min(scale_y);
    (cx + dx * scale, cy + dy * scale)
}

fn polyline_midpoint(points: &[(f32, f32)]) -> (f32, f32) {
    match points {
        [] => (0.0, 0.0),
        [only] => *only,
        [first, .., last] if points.len() == 2 => ((first.0 + last.0) / 2.0, (first.1 + last.1) / 2.0),
        _ => {
            let mid = points.len() / 2;
            let (a, b) = (points[mid - 1], points[mid]);
            ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::parser::parse_mermaid;

    fn layout_of(input: &str) -> Layout {
        let graph = parse_mermaid(input, &ConvertOptions::default()).unwrap().graph;
        compute_layout(&graph, &Theme::sketch(), &LayoutConfig::default())
    }

    #[test]
    fn top_down_stacks_ranks_vertically() {
        let layout = layout_of("flowchart TD\nA --> B");
        let a = layout.node("A").unwrap();
        let b = layout.node("B").unwrap();
        assert!(b.y >= a.y + a.height);
        assert_eq!(layout.edges.len(), 1);
        let end = layout.edges[0].points.last().copied().unwrap();
        assert!((end.1 - b.y).abs() < 1e-3, "edge should end on B's top edge");
    }

    #[test]
    fn left_right_stacks_ranks_horizontally() {
        let layout = layout_of("flowchart LR\nA --> B");
        let a = layout.node("A").unwrap();
        let b = layout.node("B").unwrap();
        assert!(b.x >= a.x + a.width);
    }

    #[test]
    fn bottom_top_reverses_main_axis() {
        let layout = layout_of("flowchart BT\nA --> B");
        let a = layout.node("A").unwrap();
        let b = layout.node("B").unwrap();
        assert!(a.y >= b.y + b.height);
    }

    #[test]
    fn layout_starts_at_origin_and_bounds_content() {
        let layout = layout_of("flowchart TD\nsubgraph S\nA --> B\nend\nB --> C");
        let min_x = layout.subgraphs.iter().map(|s| s.x).fold(f32::MAX, f32::min);
        let min_y = layout.subgraphs.iter().map(|s| s.y).fold(f32::MAX, f32::min);
        assert!(min_x.abs() < 1e-3 && min_y.abs() < 1e-3);
        for node in &layout.nodes {
            assert!(node.x + node.width <= layout.width + 1e-3);
            assert!(node.y + node.height <= layout.height + 1e-3);
        }
    }

    #[test]
    fn subgraph_frames_enclose_members() {
        let layout = layout_of("flowchart TD\nsubgraph Outer\nsubgraph Inner\nA --> B\nend\nC\nend");
        let outer = &layout.subgraphs[0];
        let inner = &layout.subgraphs[1];
        assert!(outer.x <= inner.x && outer.y <= inner.y);
        assert!(outer.x + outer.width >= inner.x + inner.width);
        for id in ["A", "B"] {
            let node = layout.node(id).unwrap();
            assert!(node.x >= inner.x && node.x + node.width <= inner.x + inner.width);
        }
    }

    #[test]
    fn empty_subgraph_gets_a_minimum_frame() {
        let config = LayoutConfig::default();
        let alone = layout_of("flowchart TD\nsubgraph S\nend");
        assert_eq!(alone.subgraphs.len(), 1);
        let frame = &alone.subgraphs[0];
        assert_eq!((frame.x, frame.y), (0.0, 0.0));
        assert!(frame.width >= config.min_node_width + config.subgraph_padding * 2.0);
        assert!(frame.height >= config.min_node_height + config.subgraph_label_height);
        assert!(alone.width >= frame.width && alone.height >= frame.height);

        let beside = layout_of("flowchart TD\nsubgraph Full\nA --> B\nend\nsubgraph Empty\nend");
        let (full, empty) = (&beside.subgraphs[0], &beside.subgraphs[1]);
        assert_eq!(empty.label, "Empty");
        assert!(empty.x >= full.x + full.width, "empty frame sits beside the content");
    }

    #[test]
    fn diamond_is_larger_than_rectangle_for_same_label() {
        let layout = layout_of("flowchart TD\nA[Same]\nB{Same}");
        assert!(layout.node("B").unwrap().width > layout.node("A").unwrap().width);
    }

    #[test]
    fn self_loop_produces_polyline() {
        let layout = layout_of("flowchart TD\nA --> A");
        assert_eq!(layout.edges[0].points.len(), 4);
    }
}
