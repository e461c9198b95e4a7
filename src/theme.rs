use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    pub font_family: String,
    pub stroke_color: String,
    pub node_background: String,
    pub text_color: String,
    pub line_color: String,
    pub frame_stroke: String,
    pub frame_background: String,
}

impl Theme {
    /// Hand-drawn palette used by canvas hosts: transparent fills, near-black ink.
    pub fn sketch() -> Self {
        Self {
            font_family: "Virgil, Segoe UI Emoji, sans-serif".to_string(),
            stroke_color: "#1e1e1e".to_string(),
            node_background: "transparent".to_string(),
            text_color: "#1e1e1e".to_string(),
            line_color: "#1e1e1e".to_string(),
            frame_stroke: "#bbbbbb".to_string(),
            frame_background: "transparent".to_string(),
        }
    }

    pub fn mermaid_default() -> Self {
        Self {
            font_family: "\"trebuchet ms\", verdana, arial, sans-serif".to_string(),
            stroke_color: "#9370DB".to_string(),
            node_background: "#ECECFF".to_string(),
            text_color: "#333333".to_string(),
            line_color: "#333333".to_string(),
            frame_stroke: "#AAAA33".to_string(),
            frame_background: "#FFFFDE".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "sketch" => Some(Self::sketch()),
            "base" | "default" | "mermaid" => Some(Self::mermaid_default()),
            _ => None,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::sketch()
    }
}
