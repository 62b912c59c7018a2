//! Screen-pixel rectangles as they appear in hierarchy dumps.
//!
//! The canonical textual form is `[left,top][right,bottom]`. Callers that hand
//! a bounds string to another layer must pass the original string through
//! untouched; [`Bounds`] is only a parsed view for geometry.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds string used by the dumper for zero-area (hidden) nodes.
pub const HIDDEN_BOUNDS: &str = "[0,0][0,0]";

lazy_static! {
    static ref STANDARD_FORM: Regex =
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").unwrap();
    static ref FLAT_FORM: Regex =
        Regex::new(r"^\[(-?\d+),(-?\d+),(-?\d+),(-?\d+)\]$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Parse `[l,t][r,b]`, or the flat `[l,t,r,b]` form some dumpers emit.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let caps = STANDARD_FORM
            .captures(raw)
            .or_else(|| FLAT_FORM.captures(raw))?;

        let coord = |i: usize| caps.get(i)?.as_str().parse::<i32>().ok();
        Some(Self {
            left: coord(1)?,
            top: coord(2)?,
            right: coord(3)?,
            bottom: coord(4)?,
        })
    }

    /// Signed width; inverted rectangles report a negative value.
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// Positive width and height.
    pub fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Exact textual check for the hidden-element marker.
pub fn is_hidden_bounds(raw: Option<&str>) -> bool {
    raw == Some(HIDDEN_BOUNDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_form() {
        let b = Bounds::parse("[100,200][300,400]").unwrap();
        assert_eq!(b, Bounds::new(100, 200, 300, 400));
        assert_eq!(b.center(), (200, 300));
        assert_eq!(b.area(), 40000);
    }

    #[test]
    fn test_parse_flat_form() {
        let b = Bounds::parse("[100,200,300,400]").unwrap();
        assert_eq!(b, Bounds::new(100, 200, 300, 400));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Bounds::parse("").is_none());
        assert!(Bounds::parse("[1,2][3]").is_none());
        assert!(Bounds::parse("100,200,300,400").is_none());
    }

    #[test]
    fn test_inverted_bounds_are_invalid() {
        let b = Bounds::parse("[100,200][50,400]").unwrap();
        assert!(!b.is_valid());
        assert_eq!(b.area(), 0);
        let zero = Bounds::parse(HIDDEN_BOUNDS).unwrap();
        assert!(!zero.is_valid());
    }

    #[test]
    fn test_display_matches_dump_form() {
        let raw = "[864,2240][1080,2358]";
        assert_eq!(Bounds::parse(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn test_hidden_marker_is_exact() {
        assert!(is_hidden_bounds(Some("[0,0][0,0]")));
        assert!(!is_hidden_bounds(Some("[0,0][0,1]")));
        assert!(!is_hidden_bounds(Some(" [0,0][0,0]")));
        assert!(!is_hidden_bounds(None));
    }
}
