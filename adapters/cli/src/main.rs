#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that populates a turtlegrid world and runs spatial queries.

mod scenario;

use std::{fs, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use turtlegrid_core::{Agent, AgentRef, AgentSet, BreedId, Command, Event, PatchId, TurtleId};
use turtlegrid_system_spatial_query::{in_radius_simple, SpatialQuery};
use turtlegrid_world::{self as world, query, World};

use crate::scenario::{OriginSpec, QuerySpec, Scenario};

/// Runs the spatial queries of a scenario file and prints their results.
#[derive(Debug, Parser)]
#[command(name = "turtlegrid", version)]
struct Args {
    /// Scenario file in TOML format.
    scenario: PathBuf,

    /// Overrides the seed stored in the scenario.
    #[arg(long)]
    seed: Option<u64>,

    /// Prints at most this many randomly chosen members of each result.
    #[arg(long)]
    sample: Option<usize>,
}

/// Entry point for the turtlegrid command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let text = fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario = Scenario::parse(&text)
        .with_context(|| format!("failed to parse scenario {}", args.scenario.display()))?;

    let seed = args.seed.unwrap_or(scenario.seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    info!(seed, queries = scenario.queries.len(), "loaded scenario");

    let mut world = World::new();
    let turtles = populate(&mut world, &scenario, &mut rng)?;

    let mut engine = SpatialQuery::new();
    for (index, spec) in scenario.queries.iter().enumerate() {
        let report = run_query(&mut engine, &world, &turtles, spec, args.sample, &mut rng)
            .with_context(|| format!("query #{index} failed"))?;
        println!("query #{index}: {report}");
    }

    Ok(())
}

fn populate(world: &mut World, scenario: &Scenario, rng: &mut ChaCha8Rng) -> Result<Vec<TurtleId>> {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::ConfigureWorld {
            config: scenario.world,
        },
        &mut events,
    );
    if let Some(Event::WorldConfigurationRejected { reason }) = events.first() {
        bail!("invalid world: {reason}");
    }

    let config = scenario.world;
    let mut turtles = Vec::new();
    for spec in &scenario.breeds {
        let breed = match query::breed_named(world, &spec.name) {
            Some(breed) => breed,
            None => declare(world, &spec.name)?,
        };

        for _ in 0..spec.count {
            let xcor = rng.gen_range(
                f64::from(config.min_pxcor) - 0.5..f64::from(config.max_pxcor) + 0.5,
            );
            let ycor = rng.gen_range(
                f64::from(config.min_pycor) - 0.5..f64::from(config.max_pycor) + 0.5,
            );
            let heading = rng.gen_range(0.0..360.0);
            turtles.push(spawn(world, breed, xcor, ycor, heading)?);
        }
        debug!(breed = %spec.name, count = spec.count, "populated breed");
    }

    info!(
        width = config.width(),
        height = config.height(),
        turtles = turtles.len(),
        "populated world"
    );
    Ok(turtles)
}

fn declare(world: &mut World, name: &str) -> Result<BreedId> {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::DeclareBreed {
            name: name.to_owned(),
        },
        &mut events,
    );
    match events.as_slice() {
        [Event::BreedDeclared { breed, .. }] => Ok(*breed),
        other => Err(anyhow!("breed `{name}` was not declared: {other:?}")),
    }
}

fn spawn(
    world: &mut World,
    breed: BreedId,
    xcor: f64,
    ycor: f64,
    heading: f64,
) -> Result<TurtleId> {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::CreateTurtle {
            breed,
            xcor,
            ycor,
            heading,
        },
        &mut events,
    );
    match events.as_slice() {
        [Event::TurtleCreated { turtle, .. }] => Ok(*turtle),
        other => Err(anyhow!("turtle was not created: {other:?}")),
    }
}

enum Source<'w> {
    Patches(&'w AgentSet<PatchId>),
    Turtles(&'w AgentSet<TurtleId>),
}

fn source<'w>(world: &'w World, name: &str) -> Result<Source<'w>> {
    if name == "patches" {
        return Ok(Source::Patches(query::patches(world)));
    }
    let breed = query::breed_named(world, name)
        .with_context(|| format!("unknown source `{name}`"))?;
    let members = query::breed(world, breed)
        .with_context(|| format!("breed `{name}` has no member set"))?;
    Ok(Source::Turtles(members))
}

fn run_query(
    engine: &mut SpatialQuery,
    world: &World,
    turtles: &[TurtleId],
    spec: &QuerySpec,
    sample: Option<usize>,
    rng: &mut ChaCha8Rng,
) -> Result<String> {
    let view = query::spatial_view(world);
    let turtle_at = |index: usize| {
        turtles
            .get(index)
            .copied()
            .with_context(|| format!("scenario has no turtle #{index}"))
    };

    match spec {
        QuerySpec::Radius {
            origin,
            source: name,
            radius,
            wrap,
            simple,
        } => {
            let origin = match *origin {
                OriginSpec::Turtle(index) => AgentRef::Turtle(turtle_at(index)?),
                OriginSpec::Patch([pxcor, pycor]) => {
                    let patch = query::topology(world)
                        .patch_index(pxcor, pycor)
                        .with_context(|| {
                            format!("patch ({pxcor}, {pycor}) is outside the world")
                        })?;
                    AgentRef::Patch(patch)
                }
            };

            match source(world, name)? {
                Source::Patches(set) => {
                    let found = if *simple {
                        in_radius_simple(&view, origin, set, *radius, *wrap)?
                    } else {
                        engine.in_radius(&view, origin, set, *radius, *wrap)?
                    };
                    render(world, &found, sample, rng, describe_patch)
                }
                Source::Turtles(set) => {
                    let found = if *simple {
                        in_radius_simple(&view, origin, set, *radius, *wrap)?
                    } else {
                        engine.in_radius(&view, origin, set, *radius, *wrap)?
                    };
                    render(world, &found, sample, rng, describe_turtle)
                }
            }
        }
        QuerySpec::Cone {
            turtle,
            source: name,
            radius,
            angle,
            wrap,
        } => {
            let origin = turtle_at(*turtle)?;
            match source(world, name)? {
                Source::Patches(set) => {
                    let found = engine.in_cone(&view, origin, set, *radius, *angle, *wrap)?;
                    render(world, &found, sample, rng, describe_patch)
                }
                Source::Turtles(set) => {
                    let found = engine.in_cone(&view, origin, set, *radius, *angle, *wrap)?;
                    render(world, &found, sample, rng, describe_turtle)
                }
            }
        }
    }
}

fn render<A: Agent>(
    world: &World,
    found: &AgentSet<A>,
    sample: Option<usize>,
    rng: &mut ChaCha8Rng,
    describe: fn(&World, A) -> String,
) -> Result<String> {
    let count = found.count(world);
    let shown = match sample {
        Some(limit) if limit < count => found.n_of(limit, rng, world)?,
        _ => found.clone(),
    };

    let members: Vec<String> = shown.iter(world).map(|agent| describe(world, agent)).collect();
    Ok(format!("{count} found [{}]", members.join(", ")))
}

fn describe_patch(world: &World, patch: PatchId) -> String {
    let (pxcor, pycor) = query::patch_coords(world, patch);
    format!("patch ({pxcor}, {pycor})")
}

fn describe_turtle(world: &World, turtle: TurtleId) -> String {
    match query::turtle(world, turtle) {
        Some(state) => format!(
            "{} {} ({:.2}, {:.2})",
            query::breed_name(world, state.breed).unwrap_or("turtle"),
            turtle.slot(),
            state.xcor,
            state.ycor
        ),
        None => format!("dead turtle {}", turtle.slot()),
    }
}
