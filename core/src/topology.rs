//! Grid geometry shared by the world and the query systems.
//!
//! A [`Topology`] knows the extent of the patch grid and whether each axis
//! wraps. It maps integer query boxes onto slices of the row-major patch
//! array, folds coordinates through the wrap, and measures wrap-aware
//! distances and bearings.

use std::ops::Range;

use thiserror::Error;

use crate::{PatchId, WorldConfig};

/// Failures produced by geometric helpers.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum TopologyError {
    /// A bearing was requested between two identical points.
    #[error("no bearing exists between coincident points ({x}, {y})")]
    CoincidentPoints {
        /// Shared x coordinate.
        x: f64,
        /// Shared y coordinate.
        y: f64,
    },
}

/// Extent, wrap behaviour, and lookup tables of a patch grid.
///
/// Patches are laid out row-major starting from the top row, so the patch at
/// `(pxcor, pycor)` lives at index
/// `(max_pycor - pycor) * width + (pxcor - min_pxcor)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    min_pxcor: i32,
    max_pxcor: i32,
    min_pycor: i32,
    max_pycor: i32,
    wrap_x: bool,
    wrap_y: bool,
    roots: Vec<f64>,
}

impl Topology {
    /// Builds the topology for a validated configuration.
    ///
    /// The square-root table covers every squared integer offset that can
    /// occur between two patches of the world.
    #[must_use]
    pub fn new(config: &WorldConfig) -> Self {
        let width = u64::from(config.width().max(0).unsigned_abs());
        let height = u64::from(config.height().max(0).unsigned_abs());
        let entries = usize::try_from(width * width + height * height).unwrap_or(0);
        let roots = (0..entries).map(|value| (value as f64).sqrt()).collect();

        Self {
            min_pxcor: config.min_pxcor,
            max_pxcor: config.max_pxcor,
            min_pycor: config.min_pycor,
            max_pycor: config.max_pycor,
            wrap_x: config.wrap_x,
            wrap_y: config.wrap_y,
            roots,
        }
    }

    /// Number of patch columns.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.max_pxcor - self.min_pxcor + 1
    }

    /// Number of patch rows.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.max_pycor - self.min_pycor + 1
    }

    /// Smallest patch x coordinate.
    #[must_use]
    pub const fn min_pxcor(&self) -> i32 {
        self.min_pxcor
    }

    /// Largest patch x coordinate.
    #[must_use]
    pub const fn max_pxcor(&self) -> i32 {
        self.max_pxcor
    }

    /// Smallest patch y coordinate.
    #[must_use]
    pub const fn min_pycor(&self) -> i32 {
        self.min_pycor
    }

    /// Largest patch y coordinate.
    #[must_use]
    pub const fn max_pycor(&self) -> i32 {
        self.max_pycor
    }

    /// Whether the world wraps horizontally.
    #[must_use]
    pub const fn wraps_x(&self) -> bool {
        self.wrap_x
    }

    /// Whether the world wraps vertically.
    #[must_use]
    pub const fn wraps_y(&self) -> bool {
        self.wrap_y
    }

    /// Total number of patches.
    #[must_use]
    pub fn patch_count(&self) -> usize {
        self.width_usize() * self.height_usize()
    }

    /// Returns the patch at the provided coordinates without folding through the wrap.
    #[must_use]
    pub fn patch_index(&self, pxcor: i32, pycor: i32) -> Option<PatchId> {
        if pxcor < self.min_pxcor
            || pxcor > self.max_pxcor
            || pycor < self.min_pycor
            || pycor > self.max_pycor
        {
            return None;
        }

        let row = i64::from(self.max_pycor) - i64::from(pycor);
        let column = i64::from(pxcor) - i64::from(self.min_pxcor);
        let index = row * i64::from(self.width()) + column;
        u32::try_from(index).ok().map(PatchId::new)
    }

    /// Returns the patch at the provided coordinates, folding wrapping axes.
    #[must_use]
    pub fn wrapped_patch(&self, pxcor: i32, pycor: i32) -> Option<PatchId> {
        let pxcor = fold_integer(pxcor, self.min_pxcor, self.width(), self.wrap_x);
        let pycor = fold_integer(pycor, self.min_pycor, self.height(), self.wrap_y);
        self.patch_index(pxcor, pycor)
    }

    /// Integer coordinates of a patch.
    #[must_use]
    pub fn patch_coords(&self, patch: PatchId) -> (i32, i32) {
        let width = i64::from(self.width().max(1));
        let index = i64::from(patch.get());
        let column = index % width;
        let row = index / width;
        (
            self.min_pxcor + column as i32,
            self.max_pycor - row as i32,
        )
    }

    /// Patch containing the continuous point, or `None` outside the world.
    ///
    /// The point must already be folded through the wrap.
    #[must_use]
    pub fn patch_at(&self, xcor: f64, ycor: f64) -> Option<PatchId> {
        let pxcor = round_to_patch(xcor)?;
        let pycor = round_to_patch(ycor)?;
        self.patch_index(pxcor, pycor)
    }

    /// Folds a continuous x coordinate into the world.
    ///
    /// Returns `None` when the value lies outside a non-wrapping axis.
    #[must_use]
    pub fn wrap_coordinate_x(&self, xcor: f64) -> Option<f64> {
        fold_continuous(
            xcor,
            f64::from(self.min_pxcor) - 0.5,
            f64::from(self.max_pxcor) + 0.5,
            self.wrap_x,
        )
    }

    /// Folds a continuous y coordinate into the world.
    ///
    /// Returns `None` when the value lies outside a non-wrapping axis.
    #[must_use]
    pub fn wrap_coordinate_y(&self, ycor: f64) -> Option<f64> {
        fold_continuous(
            ycor,
            f64::from(self.min_pycor) - 0.5,
            f64::from(self.max_pycor) + 0.5,
            self.wrap_y,
        )
    }

    /// Distance between two points, taking the shortest route on wrapping axes when `wrap` is set.
    #[must_use]
    pub fn distance(&self, x1: f64, y1: f64, x2: f64, y2: f64, wrap: bool) -> f64 {
        let (dx, dy) = self.offsets(x1, y1, x2, y2, wrap);
        dx.hypot(dy)
    }

    /// Heading from the first point to the second in `[0, 360)`, 0 being north.
    ///
    /// Cardinal bearings are exact.
    pub fn towards(
        &self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        wrap: bool,
    ) -> Result<f64, TopologyError> {
        let (dx, dy) = self.offsets(x1, y1, x2, y2, wrap);

        if dx == 0.0 {
            if dy == 0.0 {
                return Err(TopologyError::CoincidentPoints { x: x1, y: y1 });
            }
            return Ok(if dy > 0.0 { 0.0 } else { 180.0 });
        }
        if dy == 0.0 {
            return Ok(if dx > 0.0 { 90.0 } else { 270.0 });
        }

        let heading = dx.atan2(dy).to_degrees();
        if heading < 0.0 {
            Ok((heading + 360.0) % 360.0)
        } else {
            Ok(heading)
        }
    }

    /// Approximates the square root of a squared integer offset.
    #[must_use]
    pub fn grid_root(&self, squared: u64) -> f64 {
        usize::try_from(squared)
            .ok()
            .and_then(|index| self.roots.get(index).copied())
            .unwrap_or_else(|| (squared as f64).sqrt())
    }

    /// Writes the slices of the patch array covered by a square box.
    ///
    /// The box spans `radius` patches on every side of `(center_x, center_y)`.
    /// Axes fold through the wrap only when `wrap` is set and the axis allows
    /// it; otherwise the box is clipped to the world. The written ranges are
    /// ascending, disjoint, and merged where they touch, and no patch is
    /// covered twice.
    pub fn region_into(
        &self,
        center_x: i32,
        center_y: i32,
        radius: i32,
        wrap: bool,
        out: &mut Vec<Range<usize>>,
    ) {
        out.clear();

        let columns = axis_spans(
            center_x,
            radius,
            self.min_pxcor,
            self.max_pxcor,
            wrap && self.wrap_x,
        );
        let rows = axis_spans(
            center_y,
            radius,
            self.min_pycor,
            self.max_pycor,
            wrap && self.wrap_y,
        );

        let width = self.width_usize();
        for &(low_y, high_y) in rows.as_slice() {
            for pycor in low_y..=high_y {
                let row = offset_from(self.max_pycor, pycor) * width;
                for &(low_x, high_x) in columns.as_slice() {
                    let start = row + offset_from(low_x, self.min_pxcor);
                    let end = row + offset_from(high_x, self.min_pxcor) + 1;
                    out.push(start..end);
                }
            }
        }

        out.sort_unstable_by_key(|range| range.start);

        let mut merged = 0;
        for index in 1..out.len() {
            let next = out[index].clone();
            if out[merged].end == next.start {
                out[merged].end = next.end;
            } else {
                merged += 1;
                out[merged] = next;
            }
        }
        out.truncate(merged + 1);
    }

    fn offsets(&self, x1: f64, y1: f64, x2: f64, y2: f64, wrap: bool) -> (f64, f64) {
        let dx = axis_offset(x1, x2, f64::from(self.width()), wrap && self.wrap_x);
        let dy = axis_offset(y1, y2, f64::from(self.height()), wrap && self.wrap_y);
        (dx, dy)
    }

    fn width_usize(&self) -> usize {
        usize::try_from(self.width()).unwrap_or(0)
    }

    fn height_usize(&self) -> usize {
        usize::try_from(self.height()).unwrap_or(0)
    }
}

/// Up to two inclusive coordinate spans along one axis.
#[derive(Clone, Copy, Debug)]
struct AxisSpans {
    spans: [(i32, i32); 2],
    len: usize,
}

impl AxisSpans {
    const fn empty() -> Self {
        Self {
            spans: [(0, -1); 2],
            len: 0,
        }
    }

    const fn one(low: i32, high: i32) -> Self {
        Self {
            spans: [(low, high), (0, -1)],
            len: 1,
        }
    }

    const fn two(first: (i32, i32), second: (i32, i32)) -> Self {
        Self {
            spans: [first, second],
            len: 2,
        }
    }

    fn as_slice(&self) -> &[(i32, i32)] {
        &self.spans[..self.len]
    }
}

fn axis_spans(center: i32, radius: i32, min: i32, max: i32, wraps: bool) -> AxisSpans {
    if radius < 0 {
        return AxisSpans::empty();
    }

    let low = center.saturating_sub(radius);
    let high = center.saturating_add(radius);

    if !wraps {
        let low = low.max(min);
        let high = high.min(max);
        return if low > high {
            AxisSpans::empty()
        } else {
            AxisSpans::one(low, high)
        };
    }

    let extent = max - min + 1;
    if i64::from(high) - i64::from(low) + 1 >= i64::from(extent) {
        return AxisSpans::one(min, max);
    }

    let low = min + (low - min).rem_euclid(extent);
    let high = min + (high - min).rem_euclid(extent);
    if low <= high {
        AxisSpans::one(low, high)
    } else {
        AxisSpans::two((low, max), (min, high))
    }
}

fn offset_from(value: i32, base: i32) -> usize {
    usize::try_from(i64::from(value) - i64::from(base)).unwrap_or(0)
}

fn fold_integer(value: i32, min: i32, extent: i32, wraps: bool) -> i32 {
    if wraps && extent > 0 {
        min + (value - min).rem_euclid(extent)
    } else {
        value
    }
}

fn fold_continuous(value: f64, low: f64, high: f64, wraps: bool) -> Option<f64> {
    if value >= low && value < high {
        return Some(value);
    }
    if !wraps || !value.is_finite() {
        return None;
    }

    let folded = low + (value - low).rem_euclid(high - low);
    Some(if folded >= high { low } else { folded })
}

fn axis_offset(from: f64, to: f64, extent: f64, wraps: bool) -> f64 {
    let delta = to - from;
    if !wraps {
        return delta;
    }

    let folded = delta.rem_euclid(extent);
    if folded > extent / 2.0 {
        folded - extent
    } else {
        folded
    }
}

fn round_to_patch(value: f64) -> Option<i32> {
    let rounded = (value + 0.5).floor();
    if rounded.is_finite() && rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        Some(rounded as i32)
    } else {
        None
    }
}
