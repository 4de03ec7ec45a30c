use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size assumed for an overlay that has not been measured yet.
pub const FALLBACK_SIZE: Size = Size {
    width: 200.0,
    height: 40.0,
};

/// Side of the trigger the overlay is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Top,
    Left,
    Right,
    Bottom,
}

impl Placement {
    pub const ALL: [Placement; 4] = [
        Placement::Top,
        Placement::Left,
        Placement::Right,
        Placement::Bottom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Left => "left",
            Self::Right => "right",
            Self::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "bottom" => Ok(Self::Bottom),
            other => Err(format!("unknown placement '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Absolute overlay position in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub top: f64,
    pub left: f64,
}

/// Bounding box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Rect of the given size with its top-left corner at `position`.
    pub fn at(position: Position, size: Size) -> Self {
        Self::new(position.top, position.left, size.width, size.height)
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Edges are inclusive, so a pointer on the border counts as inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }
}

/// Resolved side plus the absolute position for that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub placement: Placement,
    pub position: Position,
}

/// Position for `placement` without any viewport checks.
///
/// `offset` is the gap between trigger and overlay along the placement axis;
/// the other axis is centered on the trigger.
pub fn base_position(trigger: &Rect, overlay: Size, placement: Placement, offset: f64) -> Position {
    let centered_left = trigger.left + (trigger.width - overlay.width) / 2.0;
    let centered_top = trigger.top + (trigger.height - overlay.height) / 2.0;

    match placement {
        Placement::Top => Position {
            top: trigger.top - overlay.height - offset,
            left: centered_left,
        },
        Placement::Bottom => Position {
            top: trigger.bottom() + offset,
            left: centered_left,
        },
        Placement::Left => Position {
            top: centered_top,
            left: trigger.left - overlay.width - offset,
        },
        Placement::Right => Position {
            top: centered_top,
            left: trigger.right() + offset,
        },
    }
}

/// Side to flip to when the base position for a placement overflows.
///
/// Single-axis and first-match: horizontal overflow is checked before
/// vertical overflow, whatever the requested placement was. Returns `None`
/// when the overlay fits.
fn flip_target(position: Position, overlay: Size, viewport: Size) -> Option<Placement> {
    if position.left < 0.0 {
        Some(Placement::Right)
    } else if position.left + overlay.width > viewport.width {
        Some(Placement::Left)
    } else if position.top < 0.0 {
        Some(Placement::Bottom)
    } else if position.top + overlay.height > viewport.height {
        Some(Placement::Top)
    } else {
        None
    }
}

/// Compute where an overlay goes relative to its trigger.
///
/// With `allow_flip` unset the requested placement is returned even when it
/// overflows. Otherwise at most one flip happens; a flipped position that
/// still overflows is accepted as-is.
pub fn compute_position(
    trigger: &Rect,
    overlay: Size,
    placement: Placement,
    offset: f64,
    viewport: Size,
    allow_flip: bool,
) -> Layout {
    let position = base_position(trigger, overlay, placement, offset);
    if !allow_flip {
        return Layout {
            placement,
            position,
        };
    }

    match flip_target(position, overlay, viewport) {
        Some(flipped) => Layout {
            placement: flipped,
            position: base_position(trigger, overlay, flipped, offset),
        },
        None => Layout {
            placement,
            position,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VIEWPORT: Size = Size {
        width: 1024.0,
        height: 768.0,
    };

    fn centered_trigger() -> Rect {
        Rect::new(300.0, 400.0, 80.0, 30.0)
    }

    fn fits(position: Position, overlay: Size, viewport: Size) -> bool {
        position.left >= 0.0
            && position.top >= 0.0
            && position.left + overlay.width <= viewport.width
            && position.top + overlay.height <= viewport.height
    }

    // --- base positions ---

    #[test]
    fn top_sits_above_and_centered() {
        let pos = base_position(&centered_trigger(), FALLBACK_SIZE, Placement::Top, 8.0);
        assert_eq!(pos.top, 300.0 - 40.0 - 8.0);
        assert_eq!(pos.left, 400.0 + (80.0 - 200.0) / 2.0);
    }

    #[test]
    fn bottom_starts_below_trigger_plus_offset() {
        let pos = base_position(&centered_trigger(), FALLBACK_SIZE, Placement::Bottom, 8.0);
        assert_eq!(pos.top, 330.0 + 8.0);
        assert_eq!(pos.left, 340.0);
    }

    #[test]
    fn left_sits_before_trigger_and_vertically_centered() {
        let overlay = Size::new(100.0, 20.0);
        let pos = base_position(&centered_trigger(), overlay, Placement::Left, 4.0);
        assert_eq!(pos.left, 400.0 - 100.0 - 4.0);
        assert_eq!(pos.top, 300.0 + (30.0 - 20.0) / 2.0);
    }

    #[test]
    fn right_starts_after_trigger_plus_offset() {
        let overlay = Size::new(100.0, 20.0);
        let pos = base_position(&centered_trigger(), overlay, Placement::Right, 4.0);
        assert_eq!(pos.left, 480.0 + 4.0);
        assert_eq!(pos.top, 305.0);
    }

    // --- flip table ---

    #[test]
    fn overflowing_left_edge_flips_to_right() {
        let trigger = Rect::new(300.0, 10.0, 40.0, 20.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Left, 8.0, VIEWPORT, true);
        assert_eq!(layout.placement, Placement::Right);
        assert_eq!(layout.position.left, 50.0 + 8.0);
    }

    #[test]
    fn overflowing_right_edge_flips_to_left() {
        let trigger = Rect::new(300.0, 980.0, 40.0, 20.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Right, 8.0, VIEWPORT, true);
        assert_eq!(layout.placement, Placement::Left);
        assert_eq!(layout.position.left, 980.0 - 200.0 - 8.0);
    }

    #[test]
    fn overflowing_top_edge_flips_to_bottom() {
        let trigger = Rect::new(10.0, 400.0, 80.0, 30.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Top, 8.0, VIEWPORT, true);
        assert_eq!(layout.placement, Placement::Bottom);
        assert_eq!(layout.position.top, 40.0 + 8.0);
    }

    #[test]
    fn overflowing_bottom_edge_flips_to_top() {
        let trigger = Rect::new(740.0, 400.0, 80.0, 20.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Bottom, 8.0, VIEWPORT, true);
        assert_eq!(layout.placement, Placement::Top);
        assert_eq!(layout.position.top, 740.0 - 40.0 - 8.0);
    }

    #[test]
    fn horizontal_overflow_wins_over_vertical() {
        // A top tooltip near the top-left corner overflows both axes; the
        // left edge is checked first.
        let trigger = Rect::new(5.0, 0.0, 20.0, 20.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Top, 8.0, VIEWPORT, true);
        assert_eq!(layout.placement, Placement::Right);
    }

    #[test]
    fn flipped_position_is_not_flipped_again() {
        // Tall overlay in a short viewport: top overflows, bottom overflows too.
        let viewport = Size::new(1024.0, 100.0);
        let overlay = Size::new(50.0, 90.0);
        let trigger = Rect::new(40.0, 400.0, 20.0, 20.0);
        let layout = compute_position(&trigger, overlay, Placement::Top, 0.0, viewport, true);
        assert_eq!(layout.placement, Placement::Bottom);
        assert!(layout.position.top + overlay.height > viewport.height);
    }

    #[test]
    fn disabled_flip_keeps_overflowing_placement() {
        let trigger = Rect::new(10.0, 400.0, 80.0, 30.0);
        let layout = compute_position(&trigger, FALLBACK_SIZE, Placement::Top, 8.0, VIEWPORT, false);
        assert_eq!(layout.placement, Placement::Top);
        assert!(layout.position.top < 0.0);
    }

    // --- misc ---

    #[test]
    fn rect_contains_is_edge_inclusive() {
        let rect = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert!(rect.contains(Point::new(10.0, 10.0)));
        assert!(rect.contains(Point::new(20.0, 20.0)));
        assert!(!rect.contains(Point::new(20.5, 15.0)));
    }

    #[test]
    fn placement_parses_case_insensitively() {
        assert_eq!("TOP".parse::<Placement>(), Ok(Placement::Top));
        assert_eq!("bottom".parse::<Placement>(), Ok(Placement::Bottom));
        assert!("middle".parse::<Placement>().is_err());
    }

    proptest! {
        #[test]
        fn roomy_triggers_never_flip(
            top in 200.0f64..500.0,
            left in 300.0f64..600.0,
            tw in 10.0f64..100.0,
            th in 10.0f64..100.0,
            ow in 1.0f64..100.0,
            oh in 1.0f64..50.0,
            offset in 0.0f64..20.0,
            idx in 0usize..4,
        ) {
            let trigger = Rect::new(top, left, tw, th);
            let overlay = Size::new(ow, oh);
            let placement = Placement::ALL[idx];
            let layout = compute_position(&trigger, overlay, placement, offset, VIEWPORT, true);
            prop_assert_eq!(layout.placement, placement);
            prop_assert!(fits(layout.position, overlay, VIEWPORT));
        }
    }
}
