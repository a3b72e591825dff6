//! Overlay placement inside a terminal-like grid.
//!
//! Overlays are drawn over the text area, anchored at a buffer position. They prefer the rows
//! below the anchor, flip above when that side has more room, and never start inside the
//! reserved strip at the bottom of the screen (status and command lines).

/// A cell position on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    /// Row, 0 at the top of the screen.
    pub row: u16,
    /// Column, 0 at the left of the screen.
    pub col: u16,
}

impl ScreenPoint {
    /// Create a new point.
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// A rectangle of cells. Used both for the visible region and for placed overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRect {
    /// Left column.
    pub x: u16,
    /// Top row.
    pub y: u16,
    /// Columns.
    pub width: u16,
    /// Rows.
    pub height: u16,
}

impl ScreenRect {
    /// Create a new rectangle.
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// First column to the right of the rectangle.
    pub fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    /// First row below the rectangle.
    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }
}

/// Compute where an overlay of `width` x `height` cells anchored at `anchor` goes.
///
/// * Horizontally the overlay starts at the anchor column, or is right-aligned to `region` when it
///   would cross the region's right edge. The width is never reduced.
/// * Vertically the overlay starts one row below the anchor. When fewer than `height` rows are
///   free between that row and `reserved_bottom_y - safety_margin`, it moves above the anchor if
///   more rows are free there, otherwise it stays below with a clipped height.
/// * The result never starts left of or above `region` and is at least 1x1.
pub fn place(
    anchor: ScreenPoint,
    width: u16,
    height: u16,
    region: ScreenRect,
    reserved_bottom_y: u16,
    safety_margin: u16,
) -> ScreenRect {
    let anchor_row = i32::from(anchor.row);
    let anchor_col = i32::from(anchor.col);
    let width_i = i32::from(width);
    let height_i = i32::from(height);
    let region_left = i32::from(region.x);
    let region_top = i32::from(region.y);
    let region_right = i32::from(region.right());

    let x = if anchor_col + width_i <= region_right {
        anchor_col
    } else {
        region_right - width_i
    };

    let below = anchor_row + 1;
    let space_below = i32::from(reserved_bottom_y) - below - i32::from(safety_margin);
    let space_above = anchor_row - region_top;

    let (y, placed_height) = if space_below >= height_i {
        (below, height_i)
    } else if space_above > space_below {
        let clipped = height_i.min(space_above);
        (anchor_row - clipped, clipped)
    } else {
        (below, space_below)
    };

    ScreenRect {
        x: clamp_to_u16(x.max(region_left)),
        y: clamp_to_u16(y.max(region_top)),
        width: width.max(1),
        height: clamp_to_u16(placed_height.max(1)),
    }
}

fn clamp_to_u16(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REGION: ScreenRect = ScreenRect {
        x: 0,
        y: 0,
        width: 80,
        height: 21,
    };

    #[test]
    fn test_fits_below() {
        let rect = place(ScreenPoint::new(3, 10), 20, 5, REGION, 19, 1);
        assert_eq!(rect, ScreenRect::new(10, 4, 20, 5));
    }

    #[test]
    fn test_exact_fit_below_stays_below() {
        // Rows 4..=17 are free: 19 - 4 - 1 = 14.
        let rect = place(ScreenPoint::new(3, 0), 10, 14, REGION, 19, 1);
        assert_eq!(rect, ScreenRect::new(0, 4, 10, 14));
    }

    #[test]
    fn test_right_aligned_when_crossing_edge() {
        let rect = place(ScreenPoint::new(0, 70), 20, 3, REGION, 19, 1);
        assert_eq!(rect.x, 60);
        assert_eq!(rect.width, 20);
    }

    #[test]
    fn test_wider_than_region_floors_at_left_edge() {
        let region = ScreenRect::new(5, 0, 30, 21);
        let rect = place(ScreenPoint::new(0, 10), 50, 3, region, 19, 1);
        assert_eq!(rect.x, 5);
        assert_eq!(rect.width, 50);
    }

    #[test]
    fn test_clipped_below_when_above_is_smaller() {
        // Below: 19 - 3 - 1 = 15 rows. Above: 2 rows.
        let rect = place(ScreenPoint::new(2, 0), 10, 30, REGION, 19, 1);
        assert_eq!(rect, ScreenRect::new(0, 3, 10, 15));
    }

    #[test]
    fn test_no_space_still_yields_one_row() {
        // Nothing free on either side: the overlay degenerates to one row at the region top.
        let region = ScreenRect::new(0, 18, 80, 3);
        let rect = place(ScreenPoint::new(18, 0), 10, 4, region, 19, 1);
        assert_eq!(rect.height, 1);
        assert_eq!(rect.y, 18);
    }
}
