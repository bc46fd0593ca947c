use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use turtlegrid_core::{
    Agent, AgentRef, AgentSet, AgentSetScope, BreedId, Command, Event, PatchId, TurtleId,
    WorldConfig,
};
use turtlegrid_system_spatial_query::{in_radius_simple, SpatialQuery};
use turtlegrid_world::{self as world, query, World};

fn world_with(config: WorldConfig) -> World {
    let mut world = World::new();
    let mut events = Vec::new();
    world::apply(&mut world, Command::ConfigureWorld { config }, &mut events);
    assert!(
        matches!(events.as_slice(), [Event::WorldConfigured { .. }]),
        "configuration failed: {events:?}"
    );
    world
}

fn declare(world: &mut World, name: &str) -> BreedId {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::DeclareBreed {
            name: name.to_owned(),
        },
        &mut events,
    );
    match events.as_slice() {
        [Event::BreedDeclared { breed, .. }] => *breed,
        other => panic!("unexpected events: {other:?}"),
    }
}

fn spawn(world: &mut World, breed: BreedId, xcor: f64, ycor: f64, heading: f64) -> TurtleId {
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
        [Event::TurtleCreated { turtle, .. }] => *turtle,
        other => panic!("unexpected events: {other:?}"),
    }
}

fn kill(world: &mut World, turtle: TurtleId) {
    let mut events = Vec::new();
    world::apply(world, Command::KillTurtle { turtle }, &mut events);
    assert_eq!(events, vec![Event::TurtleDied { turtle }]);
}

fn patch(world: &World, pxcor: i32, pycor: i32) -> PatchId {
    query::topology(world)
        .patch_index(pxcor, pycor)
        .expect("patch inside world")
}

fn sorted<A: Agent + Ord>(set: &AgentSet<A>) -> Vec<A> {
    let mut members = set.stored().to_vec();
    members.sort_unstable();
    members
}

fn populate(world: &mut World, rng: &mut ChaCha8Rng, count: usize) -> Vec<TurtleId> {
    let topology = query::topology(world).clone();
    let low_x = f64::from(topology.min_pxcor()) - 0.5;
    let high_x = f64::from(topology.max_pxcor()) + 0.5;
    let low_y = f64::from(topology.min_pycor()) - 0.5;
    let high_y = f64::from(topology.max_pycor()) + 0.5;

    (0..count)
        .map(|_| {
            let xcor = rng.gen_range(low_x..high_x);
            let ycor = rng.gen_range(low_y..high_y);
            let heading = rng.gen_range(0.0..360.0);
            spawn(world, BreedId::TURTLES, xcor, ycor, heading)
        })
        .collect()
}

#[test]
fn zero_radius_returns_only_the_origin_patch() {
    let world = world_with(WorldConfig::torus(-3, 3, -3, 3));
    let view = query::spatial_view(&world);
    let origin = patch(&world, 1, -2);
    let mut engine = SpatialQuery::new();

    let found = engine
        .in_radius(&view, AgentRef::Patch(origin), query::patches(&world), 0.0, false)
        .expect("patch origin");
    assert_eq!(found.stored(), &[origin]);

    let elsewhere = AgentSet::adhoc(vec![patch(&world, 0, 0)]);
    let found = engine
        .in_radius(&view, AgentRef::Patch(origin), &elsewhere, 0.0, false)
        .expect("patch origin");
    assert!(found.stored().is_empty());
}

#[test]
fn zero_radius_from_a_turtle_finds_itself() {
    let mut world = world_with(WorldConfig::torus(-3, 3, -3, 3));
    let origin = spawn(&mut world, BreedId::TURTLES, 0.3, 0.3, 0.0);
    let _neighbour = spawn(&mut world, BreedId::TURTLES, 0.4, 0.3, 0.0);
    let view = query::spatial_view(&world);

    let found = SpatialQuery::new()
        .in_radius(&view, AgentRef::Turtle(origin), query::turtles(&world), 0.0, false)
        .expect("live origin");
    assert_eq!(found.stored(), &[origin]);
}

#[test]
fn torus_corners_are_neighbours() {
    let mut world = world_with(WorldConfig::torus(0, 9, 0, 9));
    let across = spawn(&mut world, BreedId::TURTLES, 1.0, 1.0, 0.0);
    let corner = spawn(&mut world, BreedId::TURTLES, 0.0, 0.0, 0.0);
    let view = query::spatial_view(&world);
    let origin = AgentRef::Patch(patch(&world, 9, 9));
    let mut engine = SpatialQuery::new();

    let wrapped = engine
        .in_radius(&view, origin, query::turtles(&world), 3.0, true)
        .expect("patch origin");
    assert_eq!(sorted(&wrapped), vec![across, corner]);

    let near = engine
        .in_radius(&view, origin, query::turtles(&world), 2.0, true)
        .expect("patch origin");
    assert_eq!(near.stored(), &[corner]);

    let flat = engine
        .in_radius(&view, origin, query::turtles(&world), 3.0, false)
        .expect("patch origin");
    assert!(flat.stored().is_empty());

    let patches = engine
        .in_radius(&view, origin, query::patches(&world), 1.5, true)
        .expect("patch origin");
    assert!(patches.stored().contains(&patch(&world, 0, 0)));
    assert!(patches.stored().contains(&patch(&world, 9, 0)));
    assert!(!patches.stored().contains(&patch(&world, 1, 1)));
}

#[test]
fn boundary_turtles_near_a_fractional_origin_are_found() {
    let mut world = world_with(WorldConfig::torus(-10, 10, -10, 10).with_wrapping(false, false));
    let origin = spawn(&mut world, BreedId::TURTLES, 0.9, 0.9, 0.0);
    let target = spawn(&mut world, BreedId::TURTLES, 3.5, 3.5, 0.0);
    let view = query::spatial_view(&world);

    let found = SpatialQuery::new()
        .in_radius(&view, AgentRef::Turtle(origin), query::turtles(&world), 4.0, false)
        .expect("live origin");
    assert_eq!(sorted(&found), vec![origin, target]);
}

#[test]
fn consecutive_queries_do_not_leak_candidates() {
    let world = world_with(WorldConfig::torus(0, 9, 0, 9));
    let view = query::spatial_view(&world);
    let mut engine = SpatialQuery::new();

    let wide = engine
        .in_radius(
            &view,
            AgentRef::Patch(patch(&world, 5, 5)),
            query::patches(&world),
            3.0,
            true,
        )
        .expect("patch origin");
    assert_eq!(wide.stored_len(), 29);

    let narrow = engine
        .in_radius(
            &view,
            AgentRef::Patch(patch(&world, 0, 0)),
            query::patches(&world),
            0.0,
            false,
        )
        .expect("patch origin");
    assert_eq!(narrow.stored(), &[patch(&world, 0, 0)]);
}

#[test]
fn breed_sources_only_return_their_members() {
    let mut world = world_with(WorldConfig::torus(-5, 5, -5, 5));
    let wolves = declare(&mut world, "wolves");
    let sheep = declare(&mut world, "sheep");
    let hunter = spawn(&mut world, wolves, 0.0, 0.0, 0.0);
    let packmate = spawn(&mut world, wolves, 1.0, 0.5, 0.0);
    let fallen = spawn(&mut world, wolves, -1.0, 0.0, 0.0);
    let _prey = spawn(&mut world, sheep, 0.5, 0.5, 0.0);
    kill(&mut world, fallen);

    let view = query::spatial_view(&world);
    let pack = query::breed(&world, wolves).expect("declared breed");
    let found = SpatialQuery::new()
        .in_radius(&view, AgentRef::Turtle(hunter), pack, 2.0, true)
        .expect("live origin");

    assert_eq!(sorted(&found), vec![hunter, packmate]);
}

#[test]
fn dead_members_of_adhoc_sources_are_skipped() {
    let mut world = world_with(WorldConfig::torus(-5, 5, -5, 5));
    let origin = spawn(&mut world, BreedId::TURTLES, 0.0, 0.0, 0.0);
    let alive = spawn(&mut world, BreedId::TURTLES, 1.0, 0.0, 0.0);
    let dead = spawn(&mut world, BreedId::TURTLES, 0.0, 1.0, 0.0);
    kill(&mut world, dead);
    let reborn = spawn(&mut world, BreedId::TURTLES, 0.0, 1.0, 0.0);
    assert_eq!(dead.slot(), reborn.slot());

    let view = query::spatial_view(&world);
    let source = AgentSet::adhoc(vec![alive, dead]);
    let found = SpatialQuery::new()
        .in_radius(&view, AgentRef::Turtle(origin), &source, 2.0, true)
        .expect("live origin");
    assert_eq!(found.stored(), &[alive]);
}

#[test]
fn simple_scan_agrees_with_grid_search() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let mut world = world_with(WorldConfig::torus(-8, 8, -6, 6));
    let turtles = populate(&mut world, &mut rng, 120);
    for &turtle in turtles.iter().step_by(7) {
        kill(&mut world, turtle);
    }

    let view = query::spatial_view(&world);
    let mut engine = SpatialQuery::new();
    for round in 0..40 {
        let origin = turtles[rng.gen_range(0..turtles.len())];
        if query::turtle(&world, origin).is_none() {
            continue;
        }
        let radius = rng.gen_range(0.0..9.0);
        let wrap = round % 2 == 0;
        let origin = AgentRef::Turtle(origin);

        let fast = engine
            .in_radius(&view, origin, query::turtles(&world), radius, wrap)
            .expect("live origin");
        let simple = in_radius_simple(&view, origin, query::turtles(&world), radius, wrap)
            .expect("live origin");
        assert_eq!(sorted(&fast), sorted(&simple), "radius {radius} wrap {wrap}");

        let fast = engine
            .in_radius(&view, origin, query::patches(&world), radius, wrap)
            .expect("live origin");
        let simple = in_radius_simple(&view, origin, query::patches(&world), radius, wrap)
            .expect("live origin");
        assert_eq!(sorted(&fast), sorted(&simple), "radius {radius} wrap {wrap}");
    }
}

#[test]
fn full_circle_cone_matches_radius() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut world = world_with(WorldConfig::torus(0, 9, 0, 9));
    let turtles = populate(&mut world, &mut rng, 80);
    let view = query::spatial_view(&world);
    let mut engine = SpatialQuery::new();

    for (round, &origin) in turtles.iter().take(20).enumerate() {
        let radius = rng.gen_range(0.5..12.0);
        let wrap = round % 3 != 0;

        let cone = engine
            .in_cone(&view, origin, query::turtles(&world), radius, 360.0, wrap)
            .expect("live origin");
        let circle = engine
            .in_radius(
                &view,
                AgentRef::Turtle(origin),
                query::turtles(&world),
                radius,
                wrap,
            )
            .expect("live origin");
        assert_eq!(sorted(&cone), sorted(&circle), "radius {radius} wrap {wrap}");

        let cone = engine
            .in_cone(&view, origin, query::patches(&world), radius, 360.0, wrap)
            .expect("live origin");
        let circle = engine
            .in_radius(
                &view,
                AgentRef::Turtle(origin),
                query::patches(&world),
                radius,
                wrap,
            )
            .expect("live origin");
        assert_eq!(sorted(&cone), sorted(&circle), "radius {radius} wrap {wrap}");
    }
}

#[test]
fn zero_angle_cone_keeps_the_heading_line() {
    let mut world = world_with(WorldConfig::torus(-5, 5, -5, 5));
    let origin = spawn(&mut world, BreedId::TURTLES, 0.0, 0.0, 0.0);
    let twin = spawn(&mut world, BreedId::TURTLES, 0.0, 0.0, 90.0);
    let ahead = spawn(&mut world, BreedId::TURTLES, 0.0, 3.0, 0.0);
    let _aside = spawn(&mut world, BreedId::TURTLES, 0.5, 3.0, 0.0);
    let _behind = spawn(&mut world, BreedId::TURTLES, 0.0, -3.0, 0.0);
    let _beyond = spawn(&mut world, BreedId::TURTLES, 0.0, 4.5, 0.0);
    let view = query::spatial_view(&world);

    let found = SpatialQuery::new()
        .in_cone(&view, origin, query::turtles(&world), 4.0, 0.0, false)
        .expect("live origin");
    assert_eq!(sorted(&found), vec![origin, twin, ahead]);
}

#[test]
fn wrapped_cone_sees_across_the_edge() {
    let mut world = world_with(WorldConfig::torus(0, 9, 0, 9));
    let origin = spawn(&mut world, BreedId::TURTLES, 9.0, 5.0, 90.0);
    let across = spawn(&mut world, BreedId::TURTLES, 1.0, 5.0, 0.0);
    let _behind = spawn(&mut world, BreedId::TURTLES, 7.0, 5.0, 0.0);
    let view = query::spatial_view(&world);
    let mut engine = SpatialQuery::new();

    let wrapped = engine
        .in_cone(&view, origin, query::turtles(&world), 3.0, 60.0, true)
        .expect("live origin");
    assert_eq!(sorted(&wrapped), vec![origin, across]);

    let flat = engine
        .in_cone(&view, origin, query::turtles(&world), 3.0, 60.0, false)
        .expect("live origin");
    assert_eq!(flat.stored(), &[origin]);
}

#[test]
fn single_axis_wrap_agrees_across_queries() {
    for (seed, wrap_x, wrap_y) in [(0xa11, true, false), (0xb22, false, true)] {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let config = WorldConfig::torus(-9, 6, -4, 3).with_wrapping(wrap_x, wrap_y);
        let mut world = world_with(config);
        let turtles = populate(&mut world, &mut rng, 90);
        for &turtle in turtles.iter().step_by(5) {
            kill(&mut world, turtle);
        }

        let view = query::spatial_view(&world);
        let mut engine = SpatialQuery::new();
        for round in 0..30 {
            let origin = turtles[rng.gen_range(0..turtles.len())];
            if query::turtle(&world, origin).is_none() {
                continue;
            }
            let radius = rng.gen_range(0.0..12.0);
            let wrap = round % 4 != 0;
            let context = format!("wrap_x {wrap_x} wrap_y {wrap_y} radius {radius} wrap {wrap}");
            let at = AgentRef::Turtle(origin);

            let fast = engine
                .in_radius(&view, at, query::turtles(&world), radius, wrap)
                .expect("live origin");
            let simple = in_radius_simple(&view, at, query::turtles(&world), radius, wrap)
                .expect("live origin");
            assert_eq!(sorted(&fast), sorted(&simple), "{context}");

            let cone = engine
                .in_cone(&view, origin, query::turtles(&world), radius, 360.0, wrap)
                .expect("live origin");
            assert_eq!(sorted(&cone), sorted(&fast), "{context}");

            let fast = engine
                .in_radius(&view, at, query::patches(&world), radius, wrap)
                .expect("live origin");
            let simple = in_radius_simple(&view, at, query::patches(&world), radius, wrap)
                .expect("live origin");
            assert_eq!(sorted(&fast), sorted(&simple), "{context}");

            let cone = engine
                .in_cone(&view, origin, query::patches(&world), radius, 360.0, wrap)
                .expect("live origin");
            assert_eq!(sorted(&cone), sorted(&fast), "{context}");
        }
    }
}

#[test]
fn single_axis_wrap_only_folds_the_wrapping_axis() {
    let mut world = world_with(WorldConfig::torus(0, 9, 0, 4).with_wrapping(true, false));
    let origin = spawn(&mut world, BreedId::TURTLES, 9.0, 0.0, 90.0);
    let across_x = spawn(&mut world, BreedId::TURTLES, 0.0, 0.0, 0.0);
    let _across_y = spawn(&mut world, BreedId::TURTLES, 9.0, 4.0, 0.0);
    let view = query::spatial_view(&world);
    let mut engine = SpatialQuery::new();

    let found = engine
        .in_radius(&view, AgentRef::Turtle(origin), query::turtles(&world), 1.5, true)
        .expect("live origin");
    assert_eq!(sorted(&found), vec![origin, across_x]);

    let found = engine
        .in_cone(&view, origin, query::turtles(&world), 1.5, 90.0, true)
        .expect("live origin");
    assert_eq!(sorted(&found), vec![origin, across_x]);

    let found = engine
        .in_cone(&view, origin, query::turtles(&world), 1.5, 90.0, false)
        .expect("live origin");
    assert_eq!(found.stored(), &[origin]);
}

#[test]
fn cones_respect_breed_sources() {
    let mut world = world_with(WorldConfig::torus(-5, 5, -5, 5));
    let wolves = declare(&mut world, "wolves");
    let sheep = declare(&mut world, "sheep");
    let hunter = spawn(&mut world, wolves, 0.0, 0.0, 0.0);
    let lamb = spawn(&mut world, sheep, 0.0, 2.0, 0.0);
    let ewe = spawn(&mut world, sheep, 0.5, 3.0, 0.0);
    let _packmate = spawn(&mut world, wolves, 0.0, 1.0, 0.0);
    let _behind = spawn(&mut world, sheep, 0.0, -2.0, 0.0);
    let fallen = spawn(&mut world, sheep, -0.5, 2.5, 0.0);
    kill(&mut world, fallen);

    let view = query::spatial_view(&world);
    let flock = query::breed(&world, sheep).expect("declared breed");
    let found = SpatialQuery::new()
        .in_cone(&view, hunter, flock, 4.0, 60.0, true)
        .expect("live origin");
    assert_eq!(sorted(&found), vec![lamb, ewe]);
}

#[test]
fn cones_respect_adhoc_sources() {
    let mut world = world_with(WorldConfig::torus(0, 9, 0, 9));
    let origin = spawn(&mut world, BreedId::TURTLES, 9.0, 5.0, 90.0);
    let chosen = spawn(&mut world, BreedId::TURTLES, 1.0, 5.0, 0.0);
    let _ignored = spawn(&mut world, BreedId::TURTLES, 0.5, 5.0, 0.0);
    let dead = spawn(&mut world, BreedId::TURTLES, 0.0, 5.5, 0.0);
    let behind = spawn(&mut world, BreedId::TURTLES, 7.0, 5.0, 0.0);
    kill(&mut world, dead);

    let view = query::spatial_view(&world);
    let source = AgentSet::adhoc(vec![chosen, dead, behind]);
    let found = SpatialQuery::new()
        .in_cone(&view, origin, &source, 3.0, 60.0, true)
        .expect("live origin");
    assert_eq!(found.stored(), &[chosen]);
    assert_eq!(found.scope(), AgentSetScope::Adhoc);

    let corner = AgentSet::adhoc(vec![patch(&world, 0, 5), patch(&world, 5, 5)]);
    let found = SpatialQuery::new()
        .in_cone(&view, origin, &corner, 3.0, 60.0, true)
        .expect("live origin");
    assert_eq!(found.stored(), &[patch(&world, 0, 5)]);
}

