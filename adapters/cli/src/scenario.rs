//! Scenario files describing a world, its population, and the queries to run.

use serde::Deserialize;
use turtlegrid_core::WorldConfig;

/// Parsed scenario file.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    /// Seed for placement and sampling, overridable from the command line.
    #[serde(default)]
    pub(crate) seed: u64,
    /// Extent and wrap of the world.
    #[serde(default)]
    pub(crate) world: WorldConfig,
    /// Breeds to declare and populate, in order.
    #[serde(default)]
    pub(crate) breeds: Vec<BreedSpec>,
    /// Queries to evaluate once the world is populated.
    #[serde(default)]
    pub(crate) queries: Vec<QuerySpec>,
}

impl Scenario {
    /// Parses a scenario from TOML text.
    pub(crate) fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Breed declaration with the number of turtles to scatter.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct BreedSpec {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) count: usize,
}

/// A single spatial query.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum QuerySpec {
    /// Agents within a radius of the origin.
    Radius {
        origin: OriginSpec,
        source: String,
        radius: f64,
        #[serde(default = "default_wrap")]
        wrap: bool,
        /// Measures every member of the source instead of searching the grid.
        #[serde(default)]
        simple: bool,
    },
    /// Agents inside a cone ahead of a turtle.
    Cone {
        /// Creation index of the origin turtle.
        turtle: usize,
        source: String,
        radius: f64,
        angle: f64,
        #[serde(default = "default_wrap")]
        wrap: bool,
    },
}

/// Origin of a radius query.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OriginSpec {
    /// Creation index of a turtle.
    Turtle(usize),
    /// Patch coordinates.
    Patch([i32; 2]),
}

const fn default_wrap() -> bool {
    true
}
