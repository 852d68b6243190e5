use serde::{Deserialize, Serialize};

/// A point on the rendered surface, relative to its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// On-screen size of the displayed source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when both sides are finite and strictly positive
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }
}

/// Rectangle in display space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    /// Normalized rectangle spanning two corners, in any drag direction
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Both sides strictly larger than `min_side`
    pub fn exceeds(&self, min_side: f64) -> bool {
        self.width > min_side && self.height > min_side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_any_direction() {
        let forward = DisplayRect::from_corners(Point::new(50.0, 50.0), Point::new(150.0, 120.0));
        let backward = DisplayRect::from_corners(Point::new(150.0, 120.0), Point::new(50.0, 50.0));
        assert_eq!(forward, backward);
        assert_eq!(
            forward,
            DisplayRect {
                x: 50.0,
                y: 50.0,
                width: 100.0,
                height: 70.0
            }
        );
    }

    #[test]
    fn test_exceeds_is_strict() {
        let rect = DisplayRect::from_corners(Point::new(0.0, 0.0), Point::new(10.0, 30.0));
        assert!(!rect.exceeds(10.0));
        let rect = DisplayRect::from_corners(Point::new(0.0, 0.0), Point::new(10.5, 30.0));
        assert!(rect.exceeds(10.0));
    }

    #[test]
    fn test_surface_usable() {
        assert!(SurfaceSize::new(500.0, 300.0).is_usable());
        assert!(!SurfaceSize::new(0.0, 300.0).is_usable());
        assert!(!SurfaceSize::new(f64::NAN, 300.0).is_usable());
    }
}
