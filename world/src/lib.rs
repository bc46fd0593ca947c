#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for turtlegrid.

mod breeds;
mod turtles;

use tracing::{debug, warn};
use turtlegrid_core::{
    AgentSet, AgentSetScope, Command, Event, Liveness, PatchId, RejectionReason, Topology,
    TurtleId, TurtleState, WorldConfig,
};

use crate::{breeds::BreedRegistry, turtles::TurtleRegistry};

/// Represents the authoritative turtlegrid world state.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    topology: Topology,
    residents: Vec<Vec<TurtleId>>,
    patches: AgentSet<PatchId>,
    turtles: TurtleRegistry,
    breeds: BreedRegistry,
}

impl World {
    /// Creates a world using the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(
            WorldConfig::default(),
            TurtleRegistry::new(),
            BreedRegistry::new(),
        )
    }

    fn build(config: WorldConfig, turtles: TurtleRegistry, breeds: BreedRegistry) -> Self {
        let topology = Topology::new(&config);
        let patch_count = topology.patch_count();
        let patches = (0..patch_count)
            .filter_map(|index| u32::try_from(index).ok())
            .map(PatchId::new)
            .collect();

        Self {
            config,
            topology,
            residents: vec![Vec::new(); patch_count],
            patches: AgentSet::from_members(patches, AgentSetScope::World),
            turtles,
            breeds,
        }
    }

    fn reconfigure(&mut self, config: WorldConfig) {
        let mut turtles = std::mem::replace(&mut self.turtles, TurtleRegistry::new());
        turtles.reset();
        let mut breeds = std::mem::replace(&mut self.breeds, BreedRegistry::new());
        breeds.clear_members();
        *self = Self::build(config, turtles, breeds);
    }

    fn locate(&self, xcor: f64, ycor: f64) -> Option<(f64, f64, PatchId)> {
        let xcor = self.topology.wrap_coordinate_x(xcor)?;
        let ycor = self.topology.wrap_coordinate_y(ycor)?;
        let patch = self.topology.patch_at(xcor, ycor)?;
        Some((xcor, ycor, patch))
    }

    fn patch_of(&self, state: &TurtleState) -> Option<PatchId> {
        self.topology.patch_at(state.xcor, state.ycor)
    }

    fn settle(&mut self, turtle: TurtleId, patch: PatchId) {
        if let Some(residents) = self.residents.get_mut(patch.index()) {
            residents.push(turtle);
        }
    }

    fn evict(&mut self, turtle: TurtleId, patch: PatchId) {
        if let Some(residents) = self.residents.get_mut(patch.index()) {
            residents.retain(|resident| *resident != turtle);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness for World {
    fn is_turtle_alive(&self, turtle: TurtleId) -> bool {
        self.turtles.get(turtle).is_some()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConfigureWorld { config } => {
            if let Err(reason) = config.validate() {
                warn!(%reason, "rejected world configuration");
                out_events.push(Event::WorldConfigurationRejected { reason });
                return;
            }

            world.reconfigure(config);
            debug!(
                width = config.width(),
                height = config.height(),
                wrap_x = config.wrap_x,
                wrap_y = config.wrap_y,
                "configured world"
            );
            out_events.push(Event::WorldConfigured {
                width: config.width(),
                height: config.height(),
            });
        }
        Command::DeclareBreed { name } => match world.breeds.declare(&name) {
            Ok(breed) => {
                debug!(breed = breed.get(), %name, "declared breed");
                out_events.push(Event::BreedDeclared { breed, name });
            }
            Err(reason) => reject(reason, out_events),
        },
        Command::CreateTurtle {
            breed,
            xcor,
            ycor,
            heading,
        } => {
            if !world.breeds.contains(breed) {
                reject(RejectionReason::UnknownBreed(breed), out_events);
                return;
            }
            let Some((xcor, ycor, patch)) = world.locate(xcor, ycor) else {
                reject(RejectionReason::OutOfBounds, out_events);
                return;
            };

            let state = TurtleState {
                breed,
                xcor,
                ycor,
                heading: normalize_heading(heading),
            };
            let Some(turtle) = world.turtles.spawn(state) else {
                reject(RejectionReason::OutOfBounds, out_events);
                return;
            };

            world.settle(turtle, patch);
            world.breeds.enroll(breed, turtle);
            out_events.push(Event::TurtleCreated {
                turtle,
                breed,
                patch,
            });
        }
        Command::MoveTurtle { turtle, xcor, ycor } => {
            let Some(from) = world.turtles.get(turtle).and_then(|state| world.patch_of(state))
            else {
                reject(RejectionReason::StaleTurtle(turtle), out_events);
                return;
            };
            let Some((xcor, ycor, to)) = world.locate(xcor, ycor) else {
                reject(RejectionReason::OutOfBounds, out_events);
                return;
            };

            if let Some(state) = world.turtles.get_mut(turtle) {
                state.xcor = xcor;
                state.ycor = ycor;
            }
            if from != to {
                world.evict(turtle, from);
                world.settle(turtle, to);
            }
            out_events.push(Event::TurtleMoved { turtle, from, to });
        }
        Command::SetHeading { turtle, heading } => {
            let Some(state) = world.turtles.get_mut(turtle) else {
                reject(RejectionReason::StaleTurtle(turtle), out_events);
                return;
            };
            state.heading = normalize_heading(heading);
            out_events.push(Event::HeadingChanged {
                turtle,
                heading: state.heading,
            });
        }
        Command::KillTurtle { turtle } => {
            let Some(state) = world.turtles.kill(turtle) else {
                reject(RejectionReason::StaleTurtle(turtle), out_events);
                return;
            };
            if let Some(patch) = world.patch_of(&state) {
                world.evict(turtle, patch);
            }
            world.breeds.release(state.breed, &world.turtles);
            out_events.push(Event::TurtleDied { turtle });
        }
    }
}

fn reject(reason: RejectionReason, out_events: &mut Vec<Event>) {
    warn!(?reason, "rejected command");
    out_events.push(Event::CommandRejected { reason });
}

fn normalize_heading(heading: f64) -> f64 {
    let normalized = heading.rem_euclid(360.0);
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use super::World;
    use turtlegrid_core::{
        AgentSet, BreedId, PatchId, SpatialView, Topology, TurtleId, TurtleState, WorldConfig,
    };

    /// Configuration the world was built from.
    #[must_use]
    pub fn config(world: &World) -> &WorldConfig {
        &world.config
    }

    /// Geometry of the patch grid.
    #[must_use]
    pub fn topology(world: &World) -> &Topology {
        &world.topology
    }

    /// The world-wide patch set.
    #[must_use]
    pub fn patches(world: &World) -> &AgentSet<PatchId> {
        &world.patches
    }

    /// The world-wide turtle set. It may still store handles of dead turtles.
    #[must_use]
    pub fn turtles(world: &World) -> &AgentSet<TurtleId> {
        world.turtles.all()
    }

    /// Member set of a breed; the default breed maps to the world-wide turtle set.
    #[must_use]
    pub fn breed(world: &World, breed: BreedId) -> Option<&AgentSet<TurtleId>> {
        if breed == BreedId::TURTLES {
            Some(world.turtles.all())
        } else {
            world.breeds.members(breed)
        }
    }

    /// Looks up a breed by name.
    #[must_use]
    pub fn breed_named(world: &World, name: &str) -> Option<BreedId> {
        world.breeds.lookup(name)
    }

    /// Name a breed was declared with.
    #[must_use]
    pub fn breed_name(world: &World, breed: BreedId) -> Option<&str> {
        world.breeds.name(breed)
    }

    /// Snapshot of a live turtle.
    #[must_use]
    pub fn turtle(world: &World, turtle: TurtleId) -> Option<TurtleState> {
        world.turtles.get(turtle).copied()
    }

    /// Patch a live turtle stands on.
    #[must_use]
    pub fn patch_here(world: &World, turtle: TurtleId) -> Option<PatchId> {
        world
            .turtles
            .get(turtle)
            .and_then(|state| world.patch_of(state))
    }

    /// Integer coordinates of a patch.
    #[must_use]
    pub fn patch_coords(world: &World, patch: PatchId) -> (i32, i32) {
        world.topology.patch_coords(patch)
    }

    /// Live turtles standing on the patch.
    #[must_use]
    pub fn turtles_here(world: &World, patch: PatchId) -> &[TurtleId] {
        world
            .residents
            .get(patch.index())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Captures the read-only view consumed by spatial queries.
    #[must_use]
    pub fn spatial_view(world: &World) -> SpatialView<'_> {
        SpatialView::new(&world.topology, &world.residents, world.turtles.slots())
    }
}
