//! Point budget selection by rendering surface size

use serde::{Deserialize, Serialize};

/// Widths below this are narrow (phones, side panels)
pub const NARROW_MAX_WIDTH_PX: u32 = 640;

/// Widths below this are medium (tablets, half-width cards)
pub const MEDIUM_MAX_WIDTH_PX: u32 = 1024;

/// Surface size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Narrow,
    Medium,
    Wide,
}

impl SizeClass {
    /// Classify a measured width; unmeasurable surfaces are wide
    pub fn from_width(width_px: Option<u32>) -> Self {
        match width_px {
            Some(w) if w < NARROW_MAX_WIDTH_PX => SizeClass::Narrow,
            Some(w) if w < MEDIUM_MAX_WIDTH_PX => SizeClass::Medium,
            _ => SizeClass::Wide,
        }
    }

    /// Target number of chart points for this class
    pub fn point_budget(&self) -> usize {
        match self {
            SizeClass::Narrow => 400,
            SizeClass::Medium => 600,
            SizeClass::Wide => 1000,
        }
    }
}

/// Pick a point budget for a surface width
///
/// This is a target, not a cap: series already under budget pass through
/// unbinned.
pub fn select(surface_width_px: Option<u32>) -> usize {
    SizeClass::from_width(surface_width_px).point_budget()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(select(Some(320)), 400);
        assert_eq!(select(Some(639)), 400);
        assert_eq!(select(Some(640)), 600);
        assert_eq!(select(Some(1023)), 600);
        assert_eq!(select(Some(1024)), 1000);
        assert_eq!(select(Some(2560)), 1000);
    }

    #[test]
    fn test_headless_defaults_to_wide() {
        assert_eq!(SizeClass::from_width(None), SizeClass::Wide);
        assert_eq!(select(None), 1000);
    }

    #[test]
    fn test_monotonic_in_width() {
        let mut previous = 0;
        for width in (0..3000).step_by(7) {
            let budget = select(Some(width));
            assert!(budget >= previous, "budget dropped at {}px", width);
            previous = budget;
        }
    }
}
