// SPDX-License-Identifier: GPL-3.0-only

//! Monitor set and workarea computation. Monitors come from RandR (or the
//! core screen size when the extension is absent); workareas are each
//! monitor's geometry minus the struts whose partial ranges intersect it.

use crate::model::StrutPartial;
use crate::util::Rect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub rect: Rect,
    pub workarea: Rect,
    pub primary: bool,
}

impl Monitor {
    pub fn new(rect: Rect, primary: bool) -> Self {
        Self { rect, workarea: rect, primary }
    }
}

#[derive(Debug, Default)]
pub struct Monitors {
    pub list: Vec<Monitor>,
}

impl Monitors {
    pub fn single(width: u16, height: u16) -> Self {
        Self { list: vec![Monitor::new(Rect::new(0, 0, width as u32, height as u32), true)] }
    }

    pub fn primary(&self) -> &Monitor {
        self.list.iter().find(|m| m.primary).unwrap_or(&self.list[0])
    }

    /// Monitor containing the point, else the primary.
    pub fn at(&self, x: i32, y: i32) -> &Monitor {
        self.list.iter().find(|m| m.rect.contains(x, y)).unwrap_or_else(|| self.primary())
    }

    /// Monitor with the largest overlap with `rect`, else the primary.
    pub fn for_rect(&self, rect: &Rect) -> &Monitor {
        self.list
            .iter()
            .max_by_key(|m| m.rect.overlap_area(rect))
            .filter(|m| m.rect.overlap_area(rect) > 0)
            .unwrap_or_else(|| self.primary())
    }

    pub fn by_index(&self, index: usize) -> Option<&Monitor> {
        self.list.get(index)
    }

    /// Bounding box of all monitors, the "screen" struts measure from.
    pub fn bounding(&self) -> Rect {
        self.list.iter().skip(1).fold(self.list[0].rect, |acc, m| acc.union(&m.rect))
    }

    /// Recompute every monitor's workarea from the active struts.
    pub fn apply_struts<'a>(&mut self, struts: impl Iterator<Item = &'a StrutPartial> + Clone) {
        let screen = self.bounding();
        for monitor in &mut self.list {
            let mut area = monitor.rect;
            for strut in struts.clone() {
                area = subtract_strut(&area, strut, &screen);
            }
            monitor.workarea = area;
        }
    }

    /// Bounding workarea across all monitors, for the root property.
    pub fn combined_workarea(&self) -> Rect {
        self.list.iter().skip(1).fold(self.list[0].workarea, |acc, m| acc.union(&m.workarea))
    }
}

/// Shrink `area` by one strut. Strut depths are measured from the screen
/// edges; a strut only affects a monitor whose geometry reaches into the
/// reserved band and whose perpendicular range intersects it.
fn subtract_strut(area: &Rect, strut: &StrutPartial, screen: &Rect) -> Rect {
    let mut r = *area;
    if strut.top > 0 && ranges_intersect(r.x, r.right(), strut.top_start_x, strut.top_end_x) {
        let band = screen.y + strut.top as i32;
        if band > r.y {
            let cut = (band - r.y).min(r.h as i32);
            r.y += cut;
            r.h -= cut as u32;
        }
    }
    if strut.bottom > 0
        && ranges_intersect(r.x, r.right(), strut.bottom_start_x, strut.bottom_end_x)
    {
        let band = screen.bottom() - strut.bottom as i32;
        if r.bottom() > band {
            let cut = (r.bottom() - band).min(r.h as i32);
            r.h -= cut as u32;
        }
    }
    if strut.left > 0 && ranges_intersect(r.y, r.bottom(), strut.left_start_y, strut.left_end_y) {
        let band = screen.x + strut.left as i32;
        if band > r.x {
            let cut = (band - r.x).min(r.w as i32);
            r.x += cut;
            r.w -= cut as u32;
        }
    }
    if strut.right > 0
        && ranges_intersect(r.y, r.bottom(), strut.right_start_y, strut.right_end_y)
    {
        let band = screen.right() - strut.right as i32;
        if r.right() > band {
            let cut = (r.right() - band).min(r.w as i32);
            r.w -= cut as u32;
        }
    }
    r
}

fn ranges_intersect(a_start: i32, a_end: i32, b_start: u32, b_end: u32) -> bool {
    // an empty declared range means "the whole edge"
    if b_start == b_end {
        return true;
    }
    (b_start as i32) < a_end && a_start < b_end as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_strut_shrinks_workarea() {
        let mut monitors = Monitors::single(1920, 1080);
        let strut = StrutPartial {
            top: 30,
            top_start_x: 0,
            top_end_x: 1920,
            ..Default::default()
        };
        monitors.apply_struts([&strut].into_iter());
        assert_eq!(monitors.primary().workarea, Rect::new(0, 30, 1920, 1050));
        assert_eq!(monitors.combined_workarea(), Rect::new(0, 30, 1920, 1050));
    }

    #[test]
    fn strut_outside_range_is_ignored() {
        let mut monitors = Monitors {
            list: vec![
                Monitor::new(Rect::new(0, 0, 1920, 1080), true),
                Monitor::new(Rect::new(1920, 0, 1280, 1024), false),
            ],
        };
        // dock only over the first monitor
        let strut = StrutPartial {
            top: 30,
            top_start_x: 0,
            top_end_x: 1920,
            ..Default::default()
        };
        monitors.apply_struts([&strut].into_iter());
        assert_eq!(monitors.list[0].workarea, Rect::new(0, 30, 1920, 1050));
        assert_eq!(monitors.list[1].workarea, Rect::new(1920, 0, 1280, 1024));
    }

    #[test]
    fn opposing_struts_stack() {
        let mut monitors = Monitors::single(1000, 1000);
        let top = StrutPartial { top: 20, top_start_x: 0, top_end_x: 1000, ..Default::default() };
        let left =
            StrutPartial { left: 50, left_start_y: 0, left_end_y: 1000, ..Default::default() };
        monitors.apply_struts([&top, &left].into_iter());
        assert_eq!(monitors.primary().workarea, Rect::new(50, 20, 950, 980));
    }

    #[test]
    fn monitor_selection_by_overlap() {
        let monitors = Monitors {
            list: vec![
                Monitor::new(Rect::new(0, 0, 1000, 1000), true),
                Monitor::new(Rect::new(1000, 0, 1000, 1000), false),
            ],
        };
        let mostly_right = Rect::new(900, 100, 400, 400);
        assert_eq!(monitors.for_rect(&mostly_right).rect.x, 1000);
        assert_eq!(monitors.at(50, 50).rect.x, 0);
        // off-screen rect falls back to primary
        assert_eq!(monitors.for_rect(&Rect::new(5000, 5000, 10, 10)).rect.x, 0);
    }
}
