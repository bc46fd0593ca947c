#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the turtlegrid engine.
//!
//! This crate defines the vocabulary that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then reports [`Event`] values describing what
//! happened. Systems read the world through [`SpatialView`] and the
//! [`AgentSet`] collections it hands out, and never mutate it directly.

pub mod agentset;
pub mod topology;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use agentset::{Agent, AgentSet, AgentSetScope, SampleError, ShuffledIter};
pub use topology::{Topology, TopologyError};

/// Describes the extent and boundary behaviour of the patch grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Smallest patch x coordinate.
    pub min_pxcor: i32,
    /// Largest patch x coordinate.
    pub max_pxcor: i32,
    /// Smallest patch y coordinate.
    pub min_pycor: i32,
    /// Largest patch y coordinate.
    pub max_pycor: i32,
    /// Whether the world wraps around horizontally.
    pub wrap_x: bool,
    /// Whether the world wraps around vertically.
    pub wrap_y: bool,
}

impl WorldConfig {
    /// Creates a fully wrapping world spanning the provided patch coordinates.
    #[must_use]
    pub const fn torus(min_pxcor: i32, max_pxcor: i32, min_pycor: i32, max_pycor: i32) -> Self {
        Self {
            min_pxcor,
            max_pxcor,
            min_pycor,
            max_pycor,
            wrap_x: true,
            wrap_y: true,
        }
    }

    /// Returns a copy of the configuration with the provided wrap flags.
    #[must_use]
    pub const fn with_wrapping(self, wrap_x: bool, wrap_y: bool) -> Self {
        Self {
            wrap_x,
            wrap_y,
            ..self
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

    /// Checks that the configuration describes a usable world.
    ///
    /// Both axes must be non-empty and contain the origin, and the total
    /// patch count must be addressable by a [`PatchId`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_axis(Axis::X, self.min_pxcor, self.max_pxcor)?;
        check_axis(Axis::Y, self.min_pycor, self.max_pycor)?;

        let patches =
            u64::from(self.width().unsigned_abs()) * u64::from(self.height().unsigned_abs());
        if patches > u64::from(u32::MAX) {
            return Err(ConfigError::TooLarge { patches });
        }
        Ok(())
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::torus(-16, 16, -16, 16)
    }
}

fn check_axis(axis: Axis, min: i32, max: i32) -> Result<(), ConfigError> {
    if max < min {
        return Err(ConfigError::EmptyExtent { axis });
    }
    if min > 0 || max < 0 {
        return Err(ConfigError::OriginOutside { axis });
    }
    Ok(())
}

/// Axis of the patch grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Horizontal axis.
    X,
    /// Vertical axis.
    Y,
}

/// Reasons a [`WorldConfig`] may be refused.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The maximum coordinate lies below the minimum coordinate.
    #[error("{axis:?} axis has no patches")]
    EmptyExtent {
        /// Offending axis.
        axis: Axis,
    },
    /// The axis does not contain coordinate zero.
    #[error("{axis:?} axis does not contain the origin")]
    OriginOutside {
        /// Offending axis.
        axis: Axis,
    },
    /// The world holds more patches than a [`PatchId`] can address.
    #[error("world would contain {patches} patches")]
    TooLarge {
        /// Number of patches the configuration would create.
        patches: u64,
    },
}

/// Kinds of agents that live on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Immobile grid cell.
    Patch,
    /// Mobile agent with continuous coordinates.
    Turtle,
}

/// Identifier of a patch, equal to its index in the row-major patch array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchId(u32);

impl PatchId {
    /// Creates a patch identifier from its array index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Position of the patch inside the row-major patch array.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Generational handle to a turtle slot.
///
/// A handle only resolves while the slot still holds the generation it was
/// issued for. Once the turtle dies the slot moves to a new generation and
/// the handle stays stale forever, even if the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurtleId {
    slot: u32,
    generation: u32,
}

impl TurtleId {
    /// Creates a handle for the provided slot and generation.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Arena slot referenced by the handle.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation the handle was issued for.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Arena slot as an index.
    #[must_use]
    pub const fn slot_index(&self) -> usize {
        self.slot as usize
    }
}

/// Small stable tag identifying a breed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BreedId(u16);

impl BreedId {
    /// The default breed every world starts with.
    pub const TURTLES: Self = Self(0);

    /// Creates a breed identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

/// Reference to any grid-resident agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentRef {
    /// A patch.
    Patch(PatchId),
    /// A turtle.
    Turtle(TurtleId),
}

impl AgentRef {
    /// Kind of the referenced agent.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        match self {
            Self::Patch(_) => AgentKind::Patch,
            Self::Turtle(_) => AgentKind::Turtle,
        }
    }
}

/// Values flowing through the language layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absence of an agent.
    Nobody,
    /// Boolean value.
    Boolean(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    Text(String),
    /// Reference to an agent, which may have died since it was captured.
    Agent(AgentRef),
}

/// Capability answering whether a turtle handle still refers to a live turtle.
pub trait Liveness {
    /// Reports whether the handle resolves to a live turtle.
    fn is_turtle_alive(&self, turtle: TurtleId) -> bool;
}

/// Reports whether `value` denotes an agent that is still alive.
///
/// Patches never die. Turtles are alive while their handle resolves. Every
/// non-agent value reports `false`.
#[must_use]
pub fn is_live_agent<L: Liveness + ?Sized>(value: &Value, liveness: &L) -> bool {
    match value {
        Value::Agent(AgentRef::Patch(_)) => true,
        Value::Agent(AgentRef::Turtle(turtle)) => liveness.is_turtle_alive(*turtle),
        Value::Nobody | Value::Boolean(_) | Value::Number(_) | Value::Text(_) => false,
    }
}

/// Mutable state of a live turtle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurtleState {
    /// Breed the turtle belongs to.
    pub breed: BreedId,
    /// Continuous x coordinate.
    pub xcor: f64,
    /// Continuous y coordinate.
    pub ycor: f64,
    /// Heading in degrees, 0 is north and angles grow clockwise.
    pub heading: f64,
}

/// Arena slot holding at most one turtle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurtleSlot {
    generation: u32,
    state: Option<TurtleState>,
}

impl TurtleSlot {
    /// Creates an empty slot at generation zero.
    #[must_use]
    pub const fn vacant() -> Self {
        Self {
            generation: 0,
            state: None,
        }
    }

    /// Generation currently held by the slot.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Reports whether a live turtle occupies the slot.
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.state.is_some()
    }

    /// Resolves the handle against the slot, rejecting stale generations.
    #[must_use]
    pub fn resolve(&self, turtle: TurtleId) -> Option<&TurtleState> {
        if turtle.generation() == self.generation {
            self.state.as_ref()
        } else {
            None
        }
    }

    /// Mutable counterpart of [`TurtleSlot::resolve`].
    pub fn resolve_mut(&mut self, turtle: TurtleId) -> Option<&mut TurtleState> {
        if turtle.generation() == self.generation {
            self.state.as_mut()
        } else {
            None
        }
    }

    /// Places a turtle into the slot and returns the generation it lives under.
    pub fn occupy(&mut self, state: TurtleState) -> u32 {
        debug_assert!(self.state.is_none(), "slot already holds a turtle");
        self.state = Some(state);
        self.generation
    }

    /// Removes the turtle and retires the current generation.
    pub fn vacate(&mut self) -> Option<TurtleState> {
        let state = self.state.take();
        if state.is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
        state
    }
}

/// Read-only view of the state spatial queries consult.
#[derive(Clone, Copy, Debug)]
pub struct SpatialView<'a> {
    topology: &'a Topology,
    residents: &'a [Vec<TurtleId>],
    turtles: &'a [TurtleSlot],
}

impl<'a> SpatialView<'a> {
    /// Captures a view over the topology, per-patch residents, and the turtle arena.
    #[must_use]
    pub const fn new(
        topology: &'a Topology,
        residents: &'a [Vec<TurtleId>],
        turtles: &'a [TurtleSlot],
    ) -> Self {
        Self {
            topology,
            residents,
            turtles,
        }
    }

    /// Geometry of the world.
    #[must_use]
    pub const fn topology(&self) -> &'a Topology {
        self.topology
    }

    /// Live turtles currently standing on the patch.
    #[must_use]
    pub fn turtles_here(&self, patch: PatchId) -> &'a [TurtleId] {
        self.residents
            .get(patch.index())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Number of live turtles in the arena.
    #[must_use]
    pub fn live_turtles(&self) -> usize {
        self.turtles.iter().filter(|slot| slot.is_occupied()).count()
    }

    /// State of the turtle, or `None` when the handle is stale.
    #[must_use]
    pub fn turtle(&self, turtle: TurtleId) -> Option<&'a TurtleState> {
        self.turtles
            .get(turtle.slot_index())
            .and_then(|slot| slot.resolve(turtle))
    }
}

impl Liveness for SpatialView<'_> {
    fn is_turtle_alive(&self, turtle: TurtleId) -> bool {
        self.turtle(turtle).is_some()
    }
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Rebuilds the world with the provided configuration, discarding all turtles.
    ConfigureWorld {
        /// Extent and wrap behaviour of the new world.
        config: WorldConfig,
    },
    /// Registers a new named breed.
    DeclareBreed {
        /// Name the breed is known by.
        name: String,
    },
    /// Creates a turtle at the provided position.
    CreateTurtle {
        /// Breed the turtle joins.
        breed: BreedId,
        /// Initial x coordinate.
        xcor: f64,
        /// Initial y coordinate.
        ycor: f64,
        /// Initial heading in degrees.
        heading: f64,
    },
    /// Moves a turtle to a new position.
    MoveTurtle {
        /// Turtle to move.
        turtle: TurtleId,
        /// Destination x coordinate.
        xcor: f64,
        /// Destination y coordinate.
        ycor: f64,
    },
    /// Turns a turtle to face a new heading.
    SetHeading {
        /// Turtle to turn.
        turtle: TurtleId,
        /// New heading in degrees.
        heading: f64,
    },
    /// Kills a turtle.
    KillTurtle {
        /// Turtle to kill.
        turtle: TurtleId,
    },
}

/// Events reported by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The world was rebuilt.
    WorldConfigured {
        /// Number of patch columns.
        width: i32,
        /// Number of patch rows.
        height: i32,
    },
    /// A configuration request was refused and the previous world kept.
    WorldConfigurationRejected {
        /// Why the configuration was refused.
        reason: ConfigError,
    },
    /// A breed was registered.
    BreedDeclared {
        /// Identifier assigned to the breed.
        breed: BreedId,
        /// Name of the breed.
        name: String,
    },
    /// A turtle was created.
    TurtleCreated {
        /// Handle of the new turtle.
        turtle: TurtleId,
        /// Breed of the new turtle.
        breed: BreedId,
        /// Patch the turtle stands on.
        patch: PatchId,
    },
    /// A turtle changed position.
    TurtleMoved {
        /// Turtle that moved.
        turtle: TurtleId,
        /// Patch the turtle stood on before moving.
        from: PatchId,
        /// Patch the turtle stands on after moving.
        to: PatchId,
    },
    /// A turtle changed heading.
    HeadingChanged {
        /// Turtle that turned.
        turtle: TurtleId,
        /// Normalized heading in `[0, 360)`.
        heading: f64,
    },
    /// A turtle died and its handle became stale.
    TurtleDied {
        /// Handle of the dead turtle.
        turtle: TurtleId,
    },
    /// A command could not be applied.
    CommandRejected {
        /// Why the command was refused.
        reason: RejectionReason,
    },
}

/// Reasons a command may be refused by the world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    /// The breed has not been declared.
    UnknownBreed(BreedId),
    /// A breed with the same name already exists.
    DuplicateBreed(String),
    /// The turtle handle no longer resolves.
    StaleTurtle(TurtleId),
    /// The position lies outside a non-wrapping world.
    OutOfBounds,
}

#[cfg(test)]
mod tests {
    use super::{
        is_live_agent, AgentRef, Axis, BreedId, ConfigError, Liveness, PatchId, TurtleId,
        TurtleSlot, TurtleState, Value, WorldConfig,
    };
    use serde::{de::DeserializeOwned, Serialize};

    struct DeadSlots(Vec<u32>);

    impl Liveness for DeadSlots {
        fn is_turtle_alive(&self, turtle: TurtleId) -> bool {
            !self.0.contains(&turtle.slot())
        }
    }

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn liveness_requires_a_live_agent() {
        let liveness = DeadSlots(vec![3]);

        assert!(is_live_agent(&Value::Agent(AgentRef::Patch(PatchId::new(0))), &liveness));
        assert!(is_live_agent(
            &Value::Agent(AgentRef::Turtle(TurtleId::new(1, 0))),
            &liveness
        ));
        assert!(!is_live_agent(
            &Value::Agent(AgentRef::Turtle(TurtleId::new(3, 0))),
            &liveness
        ));
    }

    #[test]
    fn non_agent_values_are_never_alive() {
        let liveness = DeadSlots(Vec::new());
        for value in [
            Value::Nobody,
            Value::Boolean(true),
            Value::Number(0.0),
            Value::Text("turtle".to_owned()),
        ] {
            assert!(!is_live_agent(&value, &liveness), "{value:?} reported alive");
        }
    }

    #[test]
    fn vacated_slot_rejects_old_handles_after_reuse() {
        let state = TurtleState {
            breed: BreedId::TURTLES,
            xcor: 0.0,
            ycor: 0.0,
            heading: 0.0,
        };
        let mut slot = TurtleSlot::vacant();
        let first = TurtleId::new(0, slot.occupy(state));
        assert!(slot.resolve(first).is_some());

        assert_eq!(slot.vacate(), Some(state));
        assert!(slot.resolve(first).is_none());

        let second = TurtleId::new(0, slot.occupy(state));
        assert_ne!(first, second);
        assert!(slot.resolve(first).is_none());
        assert!(slot.resolve(second).is_some());
    }

    #[test]
    fn default_config_is_a_valid_torus() {
        let config = WorldConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.width(), 33);
        assert_eq!(config.height(), 33);
        assert!(config.wrap_x && config.wrap_y);
    }

    #[test]
    fn config_must_contain_origin() {
        let config = WorldConfig::torus(1, 10, 0, 10);
        assert_eq!(
            config.validate(),
            Err(ConfigError::OriginOutside { axis: Axis::X })
        );

        let config = WorldConfig::torus(0, 10, 3, 2);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyExtent { axis: Axis::Y })
        );
    }

    #[test]
    fn world_config_round_trips_through_bincode() {
        assert_round_trip(&WorldConfig::torus(0, 9, 0, 9).with_wrapping(true, false));
    }

    #[test]
    fn turtle_id_round_trips_through_bincode() {
        assert_round_trip(&TurtleId::new(7, 3));
    }
}
