use crate::config::ConvertOptions;
use crate::error::ParseError;
use crate::ir::{Direction, EdgeStyle, Graph, ImageData, NodeShape, Subgraph};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use regex::Regex;

type NodeTokenParts = (String, Option<String>, Option<NodeShape>);

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:flowchart|graph)(?:\s+([A-Za-z]+))?\s*;?$").unwrap());
static SUBGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^subgraph(?:\s+(.*))?$").unwrap());
static INIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%%\{\s*init\s*:\s*(\{.*\})\s*\}%%").unwrap());
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-]+$").unwrap());
static IMAGE_NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<id>[\w.\-]+)\s*@\{(?P<body>.*)\}$").unwrap());
static DATA_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(?P<mime>[\w.+\-]+/[\w.+\-]+);base64,(?P<data>.*)$").unwrap());
static BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

const ARROW: &str = r"<?(?:-\.+-|={2,}|-{2,})>?";

static PIPE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<left>.+?)\s*(?P<arrow>{ARROW})\s*\|(?P<label>[^|]*)\|\s*(?P<right>\w.*)$"
    ))
    .unwrap()
});
static LABEL_ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<left>.+?)\s*(?P<open><?(?:--|==|-\.))\s+(?P<label>[^<>|]+?)\s+(?P<close>(?:-{2,}|={2,}|\.+-)>?)\s*(?P<right>\w.*)$",
    )
    .unwrap()
});
static ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<left>.+?)\s*(?P<arrow>{ARROW})\s*(?P<right>\w.*)$"
    ))
    .unwrap()
});
static ARROW_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(ARROW).unwrap());

/// Diagram keywords the flowchart subset recognises but does not convert.
const FOREIGN_DIAGRAMS: [&str; 12] = [
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "pie",
    "mindmap",
    "journey",
    "timeline",
    "gantt",
    "gitGraph",
    "quadrantChart",
    "xychart",
];

#[derive(Debug)]
pub struct ParseOutput {
    pub graph: Graph,
    pub init_config: Option<serde_json::Value>,
}

pub fn parse_mermaid(input: &str, options: &ConvertOptions) -> Result<ParseOutput, ParseError> {
    let (lines, init_config) = preprocess_input(input);
    let Some((header_line, header)) = lines.first() else {
        return Err(ParseError::new("No diagram type detected"));
    };

    let caps = HEADER_RE.captures(header).ok_or_else(|| unknown_header(header))?;
    let font_size = init_font_size(init_config.as_ref()).unwrap_or(options.font_size);
    let mut graph = Graph::new(font_size);
    if let Some(token) = caps.get(1).map(|m| m.as_str()) {
        graph.direction = Direction::from_token(&token.to_ascii_uppercase()).ok_or_else(|| {
            ParseError::at_line(*header_line, format!("unknown direction '{token}'"))
        })?;
    }

    parse_flowchart_body(&lines[1..], &mut graph)?;
    if graph.nodes.is_empty() && graph.subgraphs.is_empty() {
        return Err(ParseError::at_line(*header_line, "diagram has no nodes"));
    }
    Ok(ParseOutput { graph, init_config })
}

fn unknown_header(header: &str) -> ParseError {
    let keyword = header.split_whitespace().next().unwrap_or(header);
    for foreign in FOREIGN_DIAGRAMS {
        if keyword.eq_ignore_ascii_case(foreign)
            || keyword.to_ascii_lowercase().starts_with(&foreign.to_ascii_lowercase())
        {
            return ParseError::new(format!("Unsupported diagram type: {foreign}"));
        }
    }
    ParseError::new("No diagram type detected")
}

fn init_font_size(init: Option<&serde_json::Value>) -> Option<f32> {
    let value = init?.get("themeVariables")?.get("fontSize")?;
    let size = match value {
        serde_json::Value::Number(n) => n.as_f64()? as f32,
        serde_json::Value::String(s) => s.trim().trim_end_matches("px").parse::<f32>().ok()?,
        _ => return None,
    };
    (size > 0.0).then_some(size)
}

/// Strips comments and blank lines, keeping 1-based source line numbers.
fn preprocess_input(input: &str) -> (Vec<(usize, String)>, Option<serde_json::Value>) {
    let mut init_config: Option<serde_json::Value> = None;
    let mut lines = Vec::new();

    for (idx, raw_line) in input.lines().enumerate() {
        let trimmed_line = raw_line.trim();
        if trimmed_line.is_empty() {
            continue;
        }
        if let Some(caps) = INIT_RE.captures(trimmed_line) {
            if let Some(json_str) = caps.get(1).map(|m| m.as_str()) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
                    init_config = Some(value);
                } else if let Ok(value) = json5::from_str::<serde_json::Value>(json_str) {
                    init_config = Some(value);
                }
            }
            continue;
        }
        if trimmed_line.starts_with("%%") {
            continue;
        }
        let without_comment = strip_trailing_comment(trimmed_line);
        if without_comment.is_empty() {
            continue;
        }
        lines.push((idx + 1, without_comment));
    }

    (lines, init_config)
}

fn parse_flowchart_body(lines: &[(usize, String)], graph: &mut Graph) -> Result<(), ParseError> {
    let mut subgraph_stack: Vec<(usize, usize)> = Vec::new();

    for (line_no, raw_line) in lines {
        let line_no = *line_no;
        for line in split_statements(raw_line) {
            check_balanced(&line).map_err(|detail| ParseError::at_line(line_no, detail))?;

            if line == "end" {
                if subgraph_stack.pop().is_none() {
                    return Err(ParseError::at_line(line_no, "unexpected 'end'"));
                }
                continue;
            }

            if let Some(caps) = SUBGRAPH_RE.captures(&line) {
                let rest = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let (id, label) = parse_subgraph_header(rest);
                graph.subgraphs.push(Subgraph {
                    id,
                    label,
                    nodes: Vec::new(),
                });
                subgraph_stack.push((graph.subgraphs.len() - 1, line_no));
                continue;
            }

            if parse_direction_line(&line).is_some() {
                // Per-subgraph direction is not honoured by the layered layout.
                continue;
            }

            if is_presentation_statement(&line) {
                continue;
            }

            let stack: Vec<usize> = subgraph_stack.iter().map(|(idx, _)| *idx).collect();

            if let Some(caps) = IMAGE_NODE_RE.captures(&line) {
                let id = caps.name("id").map(|m| m.as_str()).unwrap_or("");
                let body = caps.name("body").map(|m| m.as_str()).unwrap_or("");
                add_image_node(graph, id, body, &stack)
                    .map_err(|detail| ParseError::at_line(line_no, detail))?;
                continue;
            }

            if let Some(chain_lines) = split_edge_chain(&line) {
                for edge_line in chain_lines {
                    add_flowchart_edge(&edge_line, graph, &stack)
                        .map_err(|detail| ParseError::at_line(line_no, detail))?;
                }
                continue;
            }

            if parse_edge_line(&line).is_some() {
                add_flowchart_edge(&line, graph, &stack)
                    .map_err(|detail| ParseError::at_line(line_no, detail))?;
                continue;
            }

            if let Some((node_id, node_label, node_shape)) = parse_node_only(&line) {
                graph.ensure_node(&node_id, node_label, node_shape);
                add_node_to_subgraphs(graph, &stack, &node_id);
                continue;
            }

            return Err(ParseError::at_line(
                line_no,
                format!("unrecognized statement '{line}'"),
            ));
        }
    }

    if let Some((idx, line_no)) = subgraph_stack.pop() {
        let label = graph
            .subgraphs
            .get(idx)
            .map(|s| s.label.clone())
            .unwrap_or_default();
        return Err(ParseError::at_line(
            line_no,
            format!("subgraph '{label}' is missing 'end'"),
        ));
    }
    Ok(())
}

/// Styling and interaction statements carry nothing the scene uses.
fn is_presentation_statement(line: &str) -> bool {
    ["classDef ", "class ", "style ", "linkStyle ", "click ", "accTitle", "accDescr", "title "]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn add_flowchart_edge(line: &str, graph: &mut Graph, subgraph_stack: &[usize]) -> Result<(), String> {
    let Some((left, label, right, edge_meta)) = parse_edge_line(line) else {
        return Err(format!("incomplete edge '{line}'"));
    };

    let mut source_ids = Vec::new();
    for source in left.split('&').map(str::trim) {
        source_ids.push(ensure_token_node(graph, source, subgraph_stack)?);
    }
    let mut target_ids = Vec::new();
    for target in right.split('&').map(str::trim) {
        target_ids.push(ensure_token_node(graph, target, subgraph_stack)?);
    }

    let label = label.map(|l| normalize_label(&l)).filter(|l| !l.is_empty());
    for left_id in &source_ids {
        for right_id in &target_ids {
            graph.edges.push(crate::ir::Edge {
                from: left_id.clone(),
                to: right_id.clone(),
                label: label.clone(),
                arrow_start: edge_meta.arrow_start,
                arrow_end: edge_meta.arrow_end,
                style: edge_meta.style,
            });
        }
    }
    Ok(())
}

fn ensure_token_node(graph: &mut Graph, token: &str, subgraph_stack: &[usize]) -> Result<String, String> {
    let (id, label, shape) = parse_node_token(token);
    if !ID_RE.is_match(&id) {
        return Err(format!("invalid node '{token}'"));
    }
    graph.ensure_node(&id, label, shape);
    add_node_to_subgraphs(graph, subgraph_stack, &id);
    Ok(id)
}

fn add_image_node(graph: &mut Graph, id: &str, body: &str, subgraph_stack: &[usize]) -> Result<(), String> {
    let attrs: serde_json::Value = json5::from_str(&format!("{{{body}}}"))
        .map_err(|err| format!("invalid node metadata: {err}"))?;
    let uri = attrs
        .get("img")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("node '{id}' metadata needs an 'img' entry"))?;
    let caps = DATA_URI_RE
        .captures(uri.trim())
        .ok_or_else(|| format!("node '{id}' image must be a base64 data: URI"))?;
    let data = BASE64
        .decode(caps["data"].trim())
        .map_err(|err| format!("node '{id}' image is not valid base64: {err}"))?;
    let label = attrs
        .get("label")
        .and_then(|v| v.as_str())
        .map(normalize_label);

    graph.ensure_node(id, label, None);
    if let Some(node) = graph.nodes.get_mut(id) {
        node.image = Some(ImageData {
            mime_type: caps["mime"].to_string(),
            data,
        });
    }
    add_node_to_subgraphs(graph, subgraph_stack, id);
    Ok(())
}

fn add_node_to_subgraphs(graph: &mut Graph, subgraph_stack: &[usize], node_id: &str) {
    for idx in subgraph_stack {
        if let Some(subgraph) = graph.subgraphs.get_mut(*idx)
            && !subgraph.nodes.iter().any(|n| n == node_id)
        {
            subgraph.nodes.push(node_id.to_string());
        }
    }
}

fn check_balanced(line: &str) -> Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut in_pipe = false;
    let mut prev = ' ';
    for ch in line.chars() {
        let before = std::mem::replace(&mut prev, ch);
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        if ch == '|' && stack.is_empty() {
            in_pipe = !in_pipe;
            continue;
        }
        if in_pipe {
            continue;
        }
        match ch {
            '"' => quote = Some(ch),
            '[' | '(' | '{' => stack.push(ch),
            // `id>label]` opens an asymmetric node.
            '>' if before.is_alphanumeric() || before == '_' => stack.push('['),
            ']' | ')' | '}' => {
                let expected = match ch {
                    ']' => '[',
                    ')' => '(',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(format!("unexpected '{ch}'"));
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err("unterminated string".to_string());
    }
    if let Some(open) = stack.pop() {
        return Err(format!("unclosed '{open}'"));
    }
    Ok(())
}

fn split_statements(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            current.push(ch);
            continue;
        }
        match ch {
            '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '(' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ';' if depth <= 0 => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts
}

fn strip_trailing_comment(line: &str) -> String {
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    let mut out = String::new();
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            quote = Some(ch);
            out.push(ch);
            continue;
        }
        if ch == '%'
            && let Some('%') = chars.peek().copied()
        {
            break;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

fn parse_subgraph_header(input: &str) -> (Option<String>, String) {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return (None, "Subgraph".to_string());
    }
    if let Some((id, label, _shape)) = split_id_label(trimmed) {
        return (Some(id.to_string()), label);
    }
    if !trimmed.contains('"') && !trimmed.contains(char::is_whitespace) {
        return (Some(trimmed.to_string()), trimmed.to_string());
    }
    (None, strip_quotes(trimmed))
}

fn parse_node_only(line: &str) -> Option<NodeTokenParts> {
    let masked = mask_bracket_content(line);
    if ARROW_TOKEN_RE.is_match(&masked) {
        return None;
    }
    let (id, label, shape) = parse_node_token(line);
    if ID_RE.is_match(&id) {
        Some((id, label, shape))
    } else {
        None
    }
}

fn parse_direction_line(line: &str) -> Option<Direction> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() == 2 && parts[0] == "direction" {
        return Direction::from_token(parts[1]);
    }
    None
}

/// Replaces characters inside brackets and quotes with spaces so arrow detection
/// never matches dashes that belong to a label like `A[wi-fi]`.
fn mask_bracket_content(line: &str) -> String {
    let mut result = String::with_capacity(line.len());
    let mut depth = 0usize;
    let mut in_quote = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quote = !in_quote;
                result.push(if depth > 0 { ' ' } else { ch });
            }
            '[' | '(' | '{' if !in_quote => {
                depth += 1;
                result.push(if depth > 1 { ' ' } else { ch });
            }
            ']' | ')' | '}' if !in_quote && depth > 0 => {
                depth -= 1;
                result.push(if depth > 0 { ' ' } else { ch });
            }
            _ if in_quote || depth > 0 => {
                // Keep byte offsets aligned with the original line.
                result.push_str(&" ".repeat(ch.len_utf8()));
            }
            _ => result.push(ch),
        }
    }
    result
}

fn split_edge_chain(line: &str) -> Option<Vec<String>> {
    let masked = mask_bracket_content(line);
    if LABEL_ARROW_RE.is_match(&masked) {
        return None;
    }

    let matches: Vec<regex::Match> = ARROW_TOKEN_RE.find_iter(&masked).collect();
    if matches.len() < 2 {
        return None;
    }

    let mut nodes: Vec<String> = Vec::with_capacity(matches.len() + 1);
    let mut arrows: Vec<String> = Vec::with_capacity(matches.len());
    let mut last_idx = 0usize;

    for m in matches {
        nodes.push(line[last_idx..m.start()].trim().to_string());
        arrows.push(line[m.start()..m.end()].trim().to_string());
        last_idx = m.end();
    }
    nodes.push(line[last_idx..].trim().to_string());

    // Leading pipe labels belong to the preceding arrow.
    for i in 1..nodes.len() {
        let trimmed = nodes[i].trim_start();
        if let Some(stripped) = trimmed.strip_prefix('|')
            && let Some(end_idx) = stripped.find('|')
        {
            let label_len = end_idx + 2;
            let label = trimmed[..label_len].to_string();
            let rest = trimmed[label_len..].trim_start().to_string();
            arrows[i - 1].push_str(&label);
            nodes[i] = rest;
        }
    }

    if nodes.iter().any(|node| node.is_empty()) {
        return None;
    }

    let mut statements = Vec::with_capacity(arrows.len());
    for i in 0..arrows.len() {
        statements.push(format!("{} {} {}", nodes[i], arrows[i], nodes[i + 1]));
    }
    Some(statements)
}

fn parse_edge_line(line: &str) -> Option<(String, Option<String>, String, EdgeMeta)> {
    let masked = mask_bracket_content(line);
    let extract = |m: regex::Match| -> &str { &line[m.start()..m.end()] };

    if let Some(caps) = PIPE_LABEL_RE.captures(&masked) {
        let left = extract(caps.name("left")?).trim();
        let right = extract(caps.name("right")?).trim();
        let label = extract(caps.name("label")?).trim();
        let arrow = extract(caps.name("arrow")?).trim();
        if !left.is_empty() && !right.is_empty() {
            return Some((
                left.to_string(),
                Some(label.to_string()),
                right.to_string(),
                parse_edge_meta(arrow),
            ));
        }
    }

    if let Some(caps) = LABEL_ARROW_RE.captures(&masked) {
        let left = extract(caps.name("left")?).trim();
        let right = extract(caps.name("right")?).trim();
        let label = extract(caps.name("label")?).trim();
        if !label.is_empty() && !left.is_empty() && !right.is_empty() {
            let arrow = format!("{}{}", caps.name("open")?.as_str(), caps.name("close")?.as_str());
            return Some((
                left.to_string(),
                Some(label.to_string()),
                right.to_string(),
                parse_edge_meta(&arrow),
            ));
        }
    }

    let caps = ARROW_RE.captures(&masked)?;
    let left = extract(caps.name("left")?).trim();
    let arrow = caps.name("arrow")?.as_str().trim();
    let right = extract(caps.name("right")?).trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_string(), None, right.to_string(), parse_edge_meta(arrow)))
}

#[derive(Debug, Clone, Copy)]
struct EdgeMeta {
    arrow_start: bool,
    arrow_end: bool,
    style: EdgeStyle,
}

fn parse_edge_meta(arrow: &str) -> EdgeMeta {
    let trimmed = arrow.trim();
    let style = if trimmed.contains('=') {
        EdgeStyle::Thick
    } else if trimmed.contains('.') {
        EdgeStyle::Dotted
    } else {
        EdgeStyle::Solid
    };
    EdgeMeta {
        arrow_start: trimmed.starts_with('<'),
        arrow_end: trimmed.ends_with('>'),
        style,
    }
}

fn parse_node_token(token: &str) -> NodeTokenParts {
    let trimmed = token.trim();
    if let Some((id, label, shape)) = split_asymmetric_label(trimmed) {
        return (id, Some(label), Some(shape));
    }
    if let Some((id, label, shape)) = split_id_label(trimmed) {
        return (id.to_string(), Some(label), Some(shape));
    }
    (trimmed.to_string(), None, None)
}

fn split_asymmetric_label(token: &str) -> Option<(String, String, NodeShape)> {
    if token.contains('[') || !token.ends_with(']') {
        return None;
    }
    let pos = token.find('>')?;
    let id = token[..pos].trim();
    let label = token[pos + 1..token.len() - 1].trim();
    if id.is_empty() || label.is_empty() {
        return None;
    }
    Some((id.to_string(), normalize_label(label), NodeShape::Asymmetric))
}

fn split_id_label(token: &str) -> Option<(&str, String, NodeShape)> {
    for (open, close) in [('[', ']'), ('(', ')'), ('{', '}')] {
        if let Some(start) = token.find(open)
            && token.ends_with(close)
        {
            let id = token[..start].trim();
            if id.is_empty() {
                continue;
            }
            let raw = &token[start..];
            let (label, shape) = match open {
                '[' => parse_shape_from_brackets(raw),
                '(' => parse_shape_from_parens(raw),
                _ => parse_shape_from_braces(raw),
            };
            return Some((id, normalize_label(&label), shape));
        }
    }
    None
}

fn inner(raw: &str, trim: usize) -> String {
    strip_quotes(&raw[trim..raw.len() - trim])
}

fn parse_shape_from_brackets(raw: &str) -> (String, NodeShape) {
    let t = raw.trim();
    if t.len() >= 4 {
        if t.starts_with("[/") && t.ends_with("/]") {
            return (inner(t, 2), NodeShape::Parallelogram);
        }
        if t.starts_with("[\\") && t.ends_with("\\]") {
            return (inner(t, 2), NodeShape::ParallelogramAlt);
        }
        if t.starts_with("[/") && t.ends_with("\\]") {
            return (inner(t, 2), NodeShape::Trapezoid);
        }
        if t.starts_with("[\\") && t.ends_with("/]") {
            return (inner(t, 2), NodeShape::TrapezoidAlt);
        }
        if t.starts_with("[[") && t.ends_with("]]") {
            return (inner(t, 2), NodeShape::Subroutine);
        }
        if t.starts_with("[(") && t.ends_with(")]") {
            return (inner(t, 2), NodeShape::Cylinder);
        }
    }
    (inner(t, 1), NodeShape::Rectangle)
}

fn parse_shape_from_parens(raw: &str) -> (String, NodeShape) {
    let t = raw.trim();
    if t.len() >= 6 && t.starts_with("(((") && t.ends_with(")))") {
        return (inner(t, 3), NodeShape::DoubleCircle);
    }
    if t.len() >= 4 && t.starts_with("((") && t.ends_with("))") {
        return (inner(t, 2), NodeShape::Circle);
    }
    if t.len() >= 4 && t.starts_with("([") && t.ends_with("])") {
        return (inner(t, 2), NodeShape::Stadium);
    }
    (inner(t, 1), NodeShape::RoundRect)
}

fn parse_shape_from_braces(raw: &str) -> (String, NodeShape) {
    let t = raw.trim();
    if t.len() >= 4 && t.starts_with("{{") && t.ends_with("}}") {
        return (inner(t, 2), NodeShape::Hexagon);
    }
    (inner(t, 1), NodeShape::Diamond)
}

fn strip_quotes(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_label(label: &str) -> String {
    BREAK_RE.replace_all(label.trim(), "\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Graph, ParseError> {
        parse_mermaid(input, &ConvertOptions::default()).map(|out| out.graph)
    }

    #[test]
    fn parse_simple_flowchart() {
        let graph = parse("flowchart lr\nA[Start] -->|go| B(End)").unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].label.as_deref(), Some("go"));
        assert_eq!(graph.direction, Direction::LeftRight);
        assert_eq!(graph.nodes["A"].label, "Start");
        assert_eq!(graph.nodes["B"].shape, NodeShape::RoundRect);
    }

    #[test]
    fn parse_minimal_edge() {
        let graph = parse("flowchart TD\n A-->B").unwrap();
        assert_eq!(graph.node_order, ["A", "B"]);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges[0].arrow_end);
        assert!(!graph.edges[0].arrow_start);
    }

    #[test]
    fn parse_ids_containing_arrow_letters() {
        let graph = parse("graph TD\nbox-->fox").unwrap();
        assert_eq!(graph.edges[0].from, "box");
        assert_eq!(graph.edges[0].to, "fox");
    }

    #[test]
    fn parse_chains_and_fan_out() {
        let graph = parse("flowchart LR\nA --> B -->|two| C\nD & E --> F").unwrap();
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.edges[1].label.as_deref(), Some("two"));
        assert_eq!(graph.edges[3].from, "E");
        assert_eq!(graph.edges[3].to, "F");
    }

    #[test]
    fn parse_edge_styles() {
        let graph = parse("flowchart LR\nA -.-> B\nC ==> D\nE <--> F\nG --- H\nI -- text --> J").unwrap();
        assert_eq!(graph.edges.len(), 5);
        assert_eq!(graph.edges[0].style, EdgeStyle::Dotted);
        assert_eq!(graph.edges[1].style, EdgeStyle::Thick);
        assert!(graph.edges[2].arrow_start && graph.edges[2].arrow_end);
        assert!(!graph.edges[3].arrow_end);
        assert_eq!(graph.edges[4].label.as_deref(), Some("text"));
    }

    #[test]
    fn parse_shapes() {
        let graph = parse(
            "flowchart TD\nA{Decide}\nB((Circle))\nC[(Db)]\nD{{Hex}}\nE([Pill])\nF>Flag]\nG[\"Quoted - label\"]",
        )
        .unwrap();
        assert_eq!(graph.nodes["A"].shape, NodeShape::Diamond);
        assert_eq!(graph.nodes["B"].shape, NodeShape::Circle);
        assert_eq!(graph.nodes["C"].shape, NodeShape::Cylinder);
        assert_eq!(graph.nodes["D"].shape, NodeShape::Hexagon);
        assert_eq!(graph.nodes["E"].shape, NodeShape::Stadium);
        assert_eq!(graph.nodes["F"].shape, NodeShape::Asymmetric);
        assert_eq!(graph.nodes["G"].label, "Quoted - label");
    }

    #[test]
    fn parse_subgraphs() {
        let graph = parse("flowchart LR\nsubgraph Outer\n  subgraph Inner[\"In\"]\n    A --> B\n  end\n  C\nend").unwrap();
        assert_eq!(graph.subgraphs.len(), 2);
        assert_eq!(graph.subgraphs[0].nodes, ["A", "B", "C"]);
        assert_eq!(graph.subgraphs[1].label, "In");
        assert_eq!(graph.subgraphs[1].nodes, ["A", "B"]);
    }

    #[test]
    fn skips_styling_and_comments() {
        let graph = parse("flowchart TD\n%% note\nA --> B %% trailing\nclassDef hot fill:#f00\nstyle A fill:#0f0\nlinkStyle 0 stroke:#00f").unwrap();
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn init_directive_overrides_font_size() {
        let graph = parse("%%{init: {\"themeVariables\": {\"fontSize\": \"28px\"}}}%%\nflowchart TD\nA").unwrap();
        assert_eq!(graph.font_size, 28.0);
        let graph = parse("flowchart TD\nA").unwrap();
        assert_eq!(graph.font_size, ConvertOptions::default().font_size);
    }

    #[test]
    fn line_breaks_in_labels() {
        let graph = parse("flowchart TD\nA[one<br/>two]").unwrap();
        assert_eq!(graph.nodes["A"].label, "one\ntwo");
    }

    #[test]
    fn image_node_decodes_data_uri() {
        let graph = parse("flowchart TD\nlogo@{ img: \"data:image/png;base64,aGVsbG8=\", label: \"Logo\" }\nlogo --> B").unwrap();
        let image = graph.nodes["logo"].image.as_ref().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, b"hello");
        assert_eq!(graph.nodes["logo"].label, "Logo");
    }

    #[test]
    fn rejects_malformed_input() {
        let cases = [
            ("", "No diagram type detected"),
            ("hello world", "No diagram type detected"),
            ("flowchart TD", "Parse error on line 1: diagram has no nodes"),
            ("%% note\ngraph LR\n%% nothing here", "Parse error on line 2: diagram has no nodes"),
            ("sequenceDiagram\nA->>B: hi", "Unsupported diagram type: sequenceDiagram"),
            ("flowchart XY\nA", "Parse error on line 1: unknown direction 'XY'"),
            ("flowchart TD\nA-->", "Parse error on line 2: unrecognized statement 'A-->'"),
            ("flowchart TD\nA[open --> B", "Parse error on line 2: unclosed '['"),
            ("flowchart TD\nend", "Parse error on line 2: unexpected 'end'"),
            ("flowchart TD\nsubgraph S\nA", "Parse error on line 2: subgraph 'S' is missing 'end'"),
            ("flowchart TD\nA B C", "Parse error on line 2: unrecognized statement 'A B C'"),
        ];
        for (input, expected) in cases {
            let err = parse(input).unwrap_err();
            assert_eq!(err.message, expected, "input: {input:?}");
        }
    }

    #[test]
    fn rejects_bad_image_uri() {
        let err = parse("flowchart TD\nA@{ img: \"https://example.com/a.png\" }").unwrap_err();
        assert!(err.message.contains("data: URI"), "{}", err.message);
    }
}
