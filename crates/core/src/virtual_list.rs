//! Windowing for long card lists: only rows intersecting the viewport (plus a
//! small overscan) are materialized.

use std::ops::Range;

/// Visible region of the scroll container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub offset: u32,
    pub height: u32,
}

/// Fixed-height rows laid out in `columns` (1 for the carousel list, more for
/// the manage grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualList {
    row_height: u32,
    overscan_rows: u32,
    columns: u32,
}

impl Default for VirtualList {
    fn default() -> Self {
        Self {
            row_height: 160,
            overscan_rows: 3,
            columns: 1,
        }
    }
}

impl VirtualList {
    /// Zero heights or column counts are clamped to 1.
    #[must_use]
    pub fn new(row_height: u32, overscan_rows: u32, columns: u32) -> Self {
        Self {
            row_height: row_height.max(1),
            overscan_rows,
            columns: columns.max(1),
        }
    }

    fn rows(&self, len: usize) -> u64 {
        (len as u64).div_ceil(u64::from(self.columns))
    }

    #[must_use]
    pub fn total_height(&self, len: usize) -> u64 {
        self.rows(len) * u64::from(self.row_height)
    }

    /// Item indices to render for `viewport`.
    #[must_use]
    pub fn window(&self, len: usize, viewport: Viewport) -> Range<usize> {
        let rows = self.rows(len);
        if rows == 0 {
            return 0..0;
        }
        let row_height = u64::from(self.row_height);
        let first_row = u64::from(viewport.offset) / row_height;
        let last_row = (u64::from(viewport.offset) + u64::from(viewport.height)).div_ceil(row_height);

        let start_row = first_row.saturating_sub(u64::from(self.overscan_rows)).min(rows);
        let end_row = (last_row + u64::from(self.overscan_rows)).min(rows);

        let columns = u64::from(self.columns);
        let start = usize::try_from(start_row * columns).unwrap_or(len).min(len);
        let end = usize::try_from(end_row * columns).unwrap_or(len).min(len);
        start..end
    }

    /// Scroll offset of the row holding item `index`.
    #[must_use]
    pub fn offset_for(&self, index: usize) -> u64 {
        (index as u64 / u64::from(self.columns)) * u64::from(self.row_height)
    }

    /// Smallest scroll change that brings item `index` fully into view.
    #[must_use]
    pub fn scroll_into_view(&self, index: usize, viewport: Viewport) -> u32 {
        let top = self.offset_for(index);
        let bottom = top + u64::from(self.row_height);
        let current = u64::from(viewport.offset);
        let target = if top < current {
            top
        } else if bottom > current + u64::from(viewport.height) {
            bottom.saturating_sub(u64::from(viewport.height))
        } else {
            current
        };
        u32::try_from(target).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_has_empty_window() {
        let list = VirtualList::default();
        assert_eq!(list.window(0, Viewport { offset: 0, height: 800 }), 0..0);
        assert_eq!(list.total_height(0), 0);
    }

    #[test]
    fn window_covers_viewport_plus_overscan() {
        let list = VirtualList::new(100, 2, 1);
        let range = list.window(1_000, Viewport { offset: 1_000, height: 300 });
        assert_eq!(range, 8..15);
    }

    #[test]
    fn grid_window_is_row_aligned_and_clamped() {
        let list = VirtualList::new(100, 1, 3);
        assert_eq!(list.total_height(10), 400);
        let range = list.window(10, Viewport { offset: 250, height: 200 });
        assert_eq!(range, 3..10);
        assert_eq!(list.offset_for(7), 200);
    }

    #[test]
    fn scroll_into_view_moves_minimally() {
        let list = VirtualList::new(100, 0, 1);
        let viewport = Viewport { offset: 500, height: 300 };
        assert_eq!(list.scroll_into_view(6, viewport), 500);
        assert_eq!(list.scroll_into_view(2, viewport), 200);
        assert_eq!(list.scroll_into_view(9, viewport), 700);
    }
}
