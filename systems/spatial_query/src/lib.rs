#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that answers radius and cone queries over agent-sets.
//!
//! The engine bounds every query with a box of candidate patches taken from
//! the [`Topology`], then filters the agents found on those patches. Turtle
//! searches first compare patch-to-patch distances from the square-root
//! table and only measure exact distances for patches near the boundary.

use std::{cmp::Ordering, collections::HashSet, ops::Range};

use thiserror::Error;
use tracing::trace;
use turtlegrid_core::{
    Agent, AgentKind, AgentRef, AgentSet, AgentSetScope, BreedId, PatchId, SpatialView, Topology,
    TurtleId,
};

/// Slack around coarse patch distances. A turtle sits at most half a patch
/// diagonal from its patch center, and both ends of a comparison may be off.
const COARSE_TOLERANCE: f64 = 1.415;

/// Most world copies searched on each side of the real world along one axis.
/// Cones reaching further than this are cut off at the last copy.
const MAX_WORLD_COPIES: i32 = 256;

/// Failures surfaced by spatial queries.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The origin turtle died before the query ran.
    #[error("origin turtle {0:?} is no longer alive")]
    StaleOrigin(TurtleId),
    /// The origin patch does not belong to the world.
    #[error("origin patch {0:?} lies outside the world")]
    UnknownPatch(PatchId),
}

/// Agent kinds the engine can search for.
pub trait SpatialAgent: Agent {
    /// Continuous position of the agent, or `None` when it is no longer in the world.
    fn position(self, view: &SpatialView<'_>) -> Option<(f64, f64)>;

    /// Breed the agent belongs to, when its kind has breeds.
    fn breed(self, view: &SpatialView<'_>) -> Option<BreedId>;

    /// Calls `visit` with every agent of this kind located on the patch.
    fn visit_patch<F: FnMut(Self)>(patch: PatchId, view: &SpatialView<'_>, visit: F);
}

impl SpatialAgent for PatchId {
    fn position(self, view: &SpatialView<'_>) -> Option<(f64, f64)> {
        let topology = view.topology();
        if self.index() >= topology.patch_count() {
            return None;
        }
        let (pxcor, pycor) = topology.patch_coords(self);
        Some((f64::from(pxcor), f64::from(pycor)))
    }

    fn breed(self, _view: &SpatialView<'_>) -> Option<BreedId> {
        None
    }

    fn visit_patch<F: FnMut(Self)>(patch: PatchId, _view: &SpatialView<'_>, mut visit: F) {
        visit(patch);
    }
}

impl SpatialAgent for TurtleId {
    fn position(self, view: &SpatialView<'_>) -> Option<(f64, f64)> {
        view.turtle(self).map(|state| (state.xcor, state.ycor))
    }

    fn breed(self, view: &SpatialView<'_>) -> Option<BreedId> {
        view.turtle(self).map(|state| state.breed)
    }

    fn visit_patch<F: FnMut(Self)>(patch: PatchId, view: &SpatialView<'_>, mut visit: F) {
        for &turtle in view.turtles_here(patch) {
            visit(turtle);
        }
    }
}

/// Cone anchored at a point, opening around a heading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cone {
    /// Apex x coordinate.
    pub xcor: f64,
    /// Apex y coordinate.
    pub ycor: f64,
    /// Heading of the central line in degrees.
    pub heading: f64,
    /// Reach of the cone.
    pub radius: f64,
    /// Largest allowed deviation from the heading, in degrees.
    pub half_angle: f64,
}

impl Cone {
    /// Reports whether the point lies inside the cone, measuring without wrap.
    #[must_use]
    pub fn contains(&self, topology: &Topology, xcor: f64, ycor: f64) -> bool {
        if xcor == self.xcor && ycor == self.ycor {
            return true;
        }
        if topology.distance(self.xcor, self.ycor, xcor, ycor, false) > self.radius {
            return false;
        }

        let bearing = match topology.towards(self.xcor, self.ycor, xcor, ycor, false) {
            Ok(bearing) => bearing,
            Err(error) => unreachable!("bearing between distinct points failed: {error}"),
        };
        let difference = (bearing - self.heading).abs();
        difference <= self.half_angle || 360.0 - difference <= self.half_angle
    }
}

/// Spatial query engine that reuses scratch buffers across calls.
///
/// The engine is not re-entrant; give every concurrent caller its own instance.
#[derive(Debug, Default)]
pub struct SpatialQuery {
    patches: Vec<PatchId>,
    end: usize,
    regions: Vec<Range<usize>>,
    offsets: Vec<(i32, i32)>,
}

impl SpatialQuery {
    /// Creates an engine with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of `source` within `radius` of `origin`.
    ///
    /// Distances follow the wrap of the world when `wrap` is set. The result
    /// lists agents in patch order, then in resident order.
    pub fn in_radius<A: SpatialAgent>(
        &mut self,
        view: &SpatialView<'_>,
        origin: AgentRef,
        source: &AgentSet<A>,
        radius: f64,
        wrap: bool,
    ) -> Result<AgentSet<A>, QueryError> {
        let topology = view.topology();
        let origin = Origin::resolve(view, origin)?;
        let membership = Membership::of(source, view);

        let reach = box_radius(radius, !origin.is_integral());
        self.collect_candidates(topology, &origin, reach, wrap);

        let mut found = Vec::new();
        for &patch in self.patches.iter().take(self.end) {
            let band = match A::KIND {
                AgentKind::Patch => Band::Boundary,
                AgentKind::Turtle => {
                    classify(coarse_distance(topology, &origin, patch, wrap), radius)
                }
            };
            if band == Band::Outside {
                continue;
            }

            A::visit_patch(patch, view, |agent| {
                if !membership.admits(agent, view) {
                    return;
                }
                if band == Band::Inside || origin.reaches(view, agent, radius, wrap) {
                    found.push(agent);
                }
            });
        }

        trace!(
            kind = ?A::KIND,
            radius,
            wrap,
            candidates = self.end,
            found = found.len(),
            "in_radius"
        );
        Ok(AgentSet::adhoc(found))
    }

    /// Members of `source` inside the cone ahead of the origin turtle.
    ///
    /// The cone opens `angle` degrees around the turtle's heading. With
    /// `wrap` set, copies of the world surrounding the real one are searched
    /// as well, and each agent is reported once.
    pub fn in_cone<A: SpatialAgent>(
        &mut self,
        view: &SpatialView<'_>,
        origin: TurtleId,
        source: &AgentSet<A>,
        radius: f64,
        angle: f64,
        wrap: bool,
    ) -> Result<AgentSet<A>, QueryError> {
        let topology = view.topology();
        let state = view.turtle(origin).ok_or(QueryError::StaleOrigin(origin))?;
        let apex = Origin::at(state.xcor, state.ycor);
        let cone = Cone {
            xcor: state.xcor,
            ycor: state.ycor,
            heading: state.heading,
            radius,
            half_angle: angle / 2.0,
        };
        let membership = Membership::of(source, view);

        self.collect_offsets(topology, &cone, wrap);
        self.collect_candidates(topology, &apex, box_radius(radius, true), wrap);

        let width = f64::from(topology.width());
        let height = f64::from(topology.height());
        let offsets = &self.offsets;
        let mut found = Vec::new();
        for &patch in self.patches.iter().take(self.end) {
            if A::KIND == AgentKind::Turtle
                && classify(coarse_distance(topology, &apex, patch, wrap), radius) == Band::Outside
            {
                continue;
            }

            A::visit_patch(patch, view, |agent| {
                if !membership.admits(agent, view) {
                    return;
                }
                let Some((xcor, ycor)) = agent.position(view) else {
                    return;
                };
                let inside = offsets.iter().any(|&(offset_x, offset_y)| {
                    cone.contains(
                        topology,
                        xcor + f64::from(offset_x) * width,
                        ycor + f64::from(offset_y) * height,
                    )
                });
                if inside {
                    found.push(agent);
                }
            });
        }

        trace!(
            kind = ?A::KIND,
            radius,
            angle,
            wrap,
            copies = self.offsets.len(),
            candidates = self.end,
            found = found.len(),
            "in_cone"
        );
        Ok(AgentSet::adhoc(found))
    }

    fn collect_candidates(&mut self, topology: &Topology, origin: &Origin, reach: i32, wrap: bool) {
        topology.region_into(origin.pxcor, origin.pycor, reach, wrap, &mut self.regions);

        let patch_count = topology.patch_count();
        if self.patches.len() < patch_count {
            self.patches.resize(patch_count, PatchId::new(0));
        }

        self.end = 0;
        for range in &self.regions {
            for index in range.clone() {
                let Ok(value) = u32::try_from(index) else {
                    continue;
                };
                if let Some(slot) = self.patches.get_mut(self.end) {
                    *slot = PatchId::new(value);
                    self.end += 1;
                }
            }
        }
    }

    fn collect_offsets(&mut self, topology: &Topology, cone: &Cone, wrap: bool) {
        self.offsets.clear();

        let width = f64::from(topology.width());
        let height = f64::from(topology.height());
        let copies_x = if wrap && topology.wraps_x() {
            copies(cone.radius, width)
        } else {
            0
        };
        let copies_y = if wrap && topology.wraps_y() {
            copies(cone.radius, height)
        } else {
            0
        };

        for offset_y in -copies_y..=copies_y {
            for offset_x in -copies_x..=copies_x {
                let closest_x = closest_coordinate(
                    cone.xcor,
                    offset_x,
                    topology.min_pxcor(),
                    topology.max_pxcor(),
                    width,
                );
                let closest_y = closest_coordinate(
                    cone.ycor,
                    offset_y,
                    topology.min_pycor(),
                    topology.max_pycor(),
                    height,
                );
                if topology.distance(cone.xcor, cone.ycor, closest_x, closest_y, false)
                    <= cone.radius
                {
                    self.offsets.push((offset_x, offset_y));
                }
            }
        }
    }
}

/// Members of `source` within `radius` of `origin`, found by measuring every live member.
///
/// Agrees with [`SpatialQuery::in_radius`] as a set but keeps the order of `source`.
pub fn in_radius_simple<A: SpatialAgent>(
    view: &SpatialView<'_>,
    origin: AgentRef,
    source: &AgentSet<A>,
    radius: f64,
    wrap: bool,
) -> Result<AgentSet<A>, QueryError> {
    let origin = Origin::resolve(view, origin)?;
    let found: Vec<A> = source
        .iter(view)
        .filter(|&agent| origin.reaches(view, agent, radius, wrap))
        .collect();

    trace!(kind = ?A::KIND, radius, wrap, found = found.len(), "in_radius_simple");
    Ok(AgentSet::adhoc(found))
}

/// Continuous origin of a query along with the patch it falls on.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Origin {
    xcor: f64,
    ycor: f64,
    pxcor: i32,
    pycor: i32,
}

impl Origin {
    fn resolve(view: &SpatialView<'_>, origin: AgentRef) -> Result<Self, QueryError> {
        match origin {
            AgentRef::Patch(patch) => {
                let (xcor, ycor) = patch
                    .position(view)
                    .ok_or(QueryError::UnknownPatch(patch))?;
                Ok(Self::at(xcor, ycor))
            }
            AgentRef::Turtle(turtle) => {
                let (xcor, ycor) = turtle
                    .position(view)
                    .ok_or(QueryError::StaleOrigin(turtle))?;
                Ok(Self::at(xcor, ycor))
            }
        }
    }

    fn at(xcor: f64, ycor: f64) -> Self {
        Self {
            xcor,
            ycor,
            pxcor: nearest_patch_coordinate(xcor),
            pycor: nearest_patch_coordinate(ycor),
        }
    }

    fn is_integral(&self) -> bool {
        self.xcor.fract() == 0.0 && self.ycor.fract() == 0.0
    }

    fn reaches<A: SpatialAgent>(
        &self,
        view: &SpatialView<'_>,
        agent: A,
        radius: f64,
        wrap: bool,
    ) -> bool {
        agent.position(view).is_some_and(|(xcor, ycor)| {
            view.topology()
                .distance(self.xcor, self.ycor, xcor, ycor, wrap)
                <= radius
        })
    }
}

/// Membership test derived from the scope of the source set.
#[derive(Debug)]
enum Membership<A> {
    Everyone,
    Breed(BreedId),
    Members(HashSet<A>),
}

impl<A: SpatialAgent> Membership<A> {
    fn of(source: &AgentSet<A>, view: &SpatialView<'_>) -> Self {
        match source.scope() {
            AgentSetScope::World => {
                debug_assert_eq!(
                    source.count(view),
                    match A::KIND {
                        AgentKind::Patch => view.topology().patch_count(),
                        AgentKind::Turtle => view.live_turtles(),
                    },
                    "world-scoped source does not hold every agent of its kind"
                );
                Self::Everyone
            }
            AgentSetScope::Breed(breed) if A::KIND == AgentKind::Turtle => Self::Breed(breed),
            AgentSetScope::Breed(_) | AgentSetScope::Adhoc => {
                Self::Members(source.iter(view).collect())
            }
        }
    }

    fn admits(&self, agent: A, view: &SpatialView<'_>) -> bool {
        match self {
            Self::Everyone => true,
            Self::Breed(breed) => agent.breed(view) == Some(*breed),
            Self::Members(members) => members.contains(&agent),
        }
    }
}

/// Outcome of the coarse patch distance test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Band {
    Outside,
    Inside,
    Boundary,
}

fn classify(coarse: f64, radius: f64) -> Band {
    if coarse > radius + COARSE_TOLERANCE {
        Band::Outside
    } else if coarse <= radius - COARSE_TOLERANCE {
        Band::Inside
    } else {
        Band::Boundary
    }
}

fn coarse_distance(topology: &Topology, origin: &Origin, patch: PatchId, wrap: bool) -> f64 {
    let (pxcor, pycor) = topology.patch_coords(patch);
    let dx = fold_offset(
        i64::from(pxcor) - i64::from(origin.pxcor),
        topology.width(),
        wrap && topology.wraps_x(),
    );
    let dy = fold_offset(
        i64::from(pycor) - i64::from(origin.pycor),
        topology.height(),
        wrap && topology.wraps_y(),
    );
    topology.grid_root(dx * dx + dy * dy)
}

fn fold_offset(delta: i64, extent: i32, wraps: bool) -> u64 {
    let delta = delta.unsigned_abs();
    if !wraps {
        return delta;
    }
    let extent = u64::from(extent.unsigned_abs());
    delta.min(extent.saturating_sub(delta))
}

fn box_radius(radius: f64, inflate: bool) -> i32 {
    let reach = radius.ceil() as i32;
    if inflate {
        reach.saturating_add(1)
    } else {
        reach
    }
}

fn copies(radius: f64, extent: f64) -> i32 {
    if extent <= 0.0 {
        return 0;
    }
    (radius / extent).ceil().clamp(0.0, f64::from(MAX_WORLD_COPIES)) as i32
}

fn closest_coordinate(own: f64, offset: i32, min: i32, max: i32, extent: f64) -> f64 {
    match offset.cmp(&0) {
        Ordering::Equal => own,
        Ordering::Greater => f64::from(min) - 0.5 + f64::from(offset) * extent,
        Ordering::Less => f64::from(max) + 0.5 + f64::from(offset) * extent,
    }
}

fn nearest_patch_coordinate(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}
