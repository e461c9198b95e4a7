use crate::config::PreviewConfig;

/// Reduces the preview container size to the single bound applied to both
/// bitmap axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitCalculator {
    pub inset: f32,
    pub landscape_clamp_ratio: f32,
}

impl Default for FitCalculator {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

impl FitCalculator {
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            inset: config.fit_inset,
            landscape_clamp_ratio: config.landscape_clamp_ratio,
        }
    }

    /// Portrait containers are bounded by their width less the inset. Landscape
    /// containers keep their width unless it overflows the height by more than
    /// the clamp ratio, in which case the height bounds them.
    pub fn fit_dimension(&self, width: u32, height: u32) -> u32 {
        let (w, h) = (width as f32, height as f32);
        let longest = w.max(h);
        let dimension = if longest > w {
            w - self.inset
        } else if w > h * self.landscape_clamp_ratio {
            h
        } else {
            longest
        };
        dimension.floor().max(1.0) as u32
    }
}

pub fn compute_fit_dimension(width: u32, height: u32) -> u32 {
    FitCalculator::default().fit_dimension(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_examples() {
        assert_eq!(compute_fit_dimension(500, 300), 500);
        assert_eq!(compute_fit_dimension(500, 200), 200);
        assert_eq!(compute_fit_dimension(300, 700), 290);
    }

    #[test]
    fn square_keeps_its_edge() {
        assert_eq!(compute_fit_dimension(400, 400), 400);
    }

    #[test]
    fn never_below_one() {
        assert_eq!(compute_fit_dimension(0, 0), 1);
        assert_eq!(compute_fit_dimension(5, 100), 1);
    }

    #[test]
    fn honours_configured_inset_and_ratio() {
        let calc = FitCalculator {
            inset: 0.0,
            landscape_clamp_ratio: 1.0,
        };
        assert_eq!(calc.fit_dimension(300, 700), 300);
        assert_eq!(calc.fit_dimension(500, 300), 300);
    }
}
