use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ttf_parser::Face;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

/// Width of a single line of text. Uses an installed font when one matches the
/// family list, and calibrated per-character factors otherwise.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> f32 {
    if text.is_empty() || font_size <= 0.0 {
        return 0.0;
    }
    let measured = TEXT_MEASURER
        .lock()
        .ok()
        .and_then(|mut guard| guard.measure(text, font_size, font_family));
    measured.unwrap_or_else(|| estimate_text_width(text, font_size))
}

/// Font-independent estimate, stable across machines.
pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(char_width_factor).sum::<f32>() * font_size
}

fn char_width_factor(ch: char) -> f32 {
    match ch {
        ' ' => 0.306,
        '.' | ',' | ':' | ';' | '|' | '!' | '\'' | 'i' | 'j' | 'l' | 'I' => 0.28,
        '(' | ')' | '[' | ']' | '{' | '}' | 'f' | 't' | 'r' => 0.36,
        'm' | 'w' | 'M' | 'W' => 0.86,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.56,
        c if c.is_ascii() => 0.52,
        // CJK and other wide glyphs.
        _ => 1.0,
    }
}

struct LoadedFace {
    data: Arc<Vec<u8>>,
    index: u32,
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<LoadedFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = font_family.trim().to_string();
        if !self.cache.contains_key(&key) {
            let face = self.load_face(font_family);
            self.cache.insert(key.clone(), face);
        }
        let loaded = self.cache.get(&key)?.as_ref()?;
        let face = Face::parse(&loaded.data, loaded.index).ok()?;
        let scale = font_size / f32::from(face.units_per_em().max(1));

        let mut width = 0.0f32;
        for ch in text.chars() {
            match face.glyph_index(ch).and_then(|id| face.glyph_hor_advance(id)) {
                Some(advance) => width += f32::from(advance) * scale,
                None => width += char_width_factor(ch) * font_size,
            }
        }
        Some(width)
    }

    fn load_face(&mut self, font_family: &str) -> Option<LoadedFace> {
        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let names: Vec<String> = font_family
            .split(',')
            .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|part| !part.is_empty())
            .collect();
        let mut families: Vec<Family<'_>> = names
            .iter()
            .map(|name| match name.to_ascii_lowercase().as_str() {
                "serif" => Family::Serif,
                "monospace" | "ui-monospace" => Family::Monospace,
                "sans-serif" | "system-ui" | "-apple-system" => Family::SansSerif,
                _ => Family::Name(name.as_str()),
            })
            .collect();
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db.with_face_data(id, |data, index| LoadedFace {
            data: Arc::new(data.to_vec()),
            index,
        })
    }
}
