//! End-to-end life-cycle runs against the public API only.

use irismirror_core::{
    AttentionSignal, EyeConfig, EyeWorld, Phase, ScriptedAttention, ShapeFamily,
};

const DT: f32 = 1.0 / 60.0;

fn small_config() -> EyeConfig {
    EyeConfig {
        rng_seed: Some(99),
        fiber_count: 12,
        base_shape_budget: 400,
        web_shape_count: 120,
        limbal_shape_count: 40,
        ruff_shape_count: 40,
        collarette_shape_count: 60,
        furrow_shapes_per_band: 12,
        crypt_shape_count: 10,
        fuchs_crypt_count: 4,
        speckle_count: 20,
        pathway_queue_capacity: 8,
        ..EyeConfig::default()
    }
}

fn close_stare() -> AttentionSignal {
    AttentionSignal {
        looking_confidence: Some(0.95),
        face_count: Some(1),
        proximity: Some(1.0),
    }
}

fn nobody() -> AttentionSignal {
    AttentionSignal {
        looking_confidence: Some(0.0),
        face_count: Some(0),
        proximity: Some(0.0),
    }
}

fn staring_world() -> EyeWorld {
    match EyeWorld::with_attention_source(
        small_config(),
        Box::new(ScriptedAttention::new(vec![close_stare()])),
    ) {
        Ok(world) => world,
        Err(err) => panic!("world construction failed: {err}"),
    }
}

#[test]
fn relentless_stare_drives_a_full_cycle() {
    let mut world = staring_world();
    let first_palette = world.palette().name.clone();

    // Phase 1: the initial rebuild finishes in about five seconds.
    let mut ticks = 0u32;
    while world.state().phase == Phase::Rebuilding {
        world.tick(DT);
        ticks += 1;
        assert!(ticks < 400, "initial rebuild did not finish");
    }
    assert!((280..=320).contains(&ticks), "rebuild took {ticks} ticks");
    assert_eq!(world.state().generation, 1);

    // Phase 2: a close-up stare destroys the eye within ten seconds of the
    // steady phase starting.
    let mut ticks_to_pause = 0u32;
    while world.state().phase != Phase::Paused {
        world.tick(DT);
        ticks_to_pause += 1;
        assert!(
            ticks_to_pause <= 600,
            "not destroyed within ten seconds of staring"
        );
    }
    let mut paused_ticks = 1u32;
    let mut reborn = None;
    for _ in 0..400 {
        let events = world.tick(DT);
        if events.phase == Phase::Paused {
            paused_ticks += 1;
        }
        if let Some(generation) = events.generation_started {
            reborn = Some(generation);
            break;
        }
    }
    let Some(generation) = reborn else {
        panic!("the blackout never ended");
    };
    assert_eq!(generation, 2);

    // Phase 3: the blackout lasted the configured four seconds.
    let expected = (world.config().pause_duration / DT) as u32;
    assert!(
        paused_ticks.abs_diff(expected) <= 2,
        "paused for {paused_ticks} ticks, expected about {expected}"
    );

    // Phase 4: rebirth swapped the palette and restarted the rebuild.
    assert_eq!(world.state().phase, Phase::Rebuilding);
    assert_ne!(world.palette().name, first_palette);
    assert!(world.state().rebuild_progress < 0.1);
}

#[test]
fn solitude_heals_a_tired_eye() {
    let mut world = match EyeWorld::with_attention_source(
        small_config(),
        Box::new(ScriptedAttention::new(vec![nobody()])),
    ) {
        Ok(world) => world,
        Err(err) => panic!("world construction failed: {err}"),
    };
    while world.state().phase == Phase::Rebuilding {
        world.tick(DT);
    }
    world.state_mut().fatigue = 0.9;
    world.state_mut().smooth_fatigue = 0.9;

    // 0.15/s of solitude healing clamps fatigue to the 0.02 floor within
    // ten seconds.
    for _ in 0..600 {
        world.tick(DT);
        assert!(world.state().fatigue >= world.config().fatigue_floor - 1e-6);
    }
    let fatigue = world.state().fatigue;
    assert!(
        (fatigue - world.config().fatigue_floor).abs() < 1e-3,
        "fatigue {fatigue} not clamped to the floor"
    );
    assert_eq!(world.state().phase, Phase::Steady);
}

#[test]
fn identical_seeds_replay_identically_through_reassignment() {
    let mut a = staring_world();
    let mut b = staring_world();
    for i in 0..600u64 {
        let ea = a.tick(DT);
        let eb = b.tick(DT);
        assert_eq!(ea, eb, "tick {i} diverged");
        if i % 50 == 0 {
            assert_eq!(
                a.reassign_shape(ShapeFamily::Base, (i as usize) % 100),
                b.reassign_shape(ShapeFamily::Base, (i as usize) % 100),
            );
            a.reassign_shape(ShapeFamily::Fiber, i as usize);
            b.reassign_shape(ShapeFamily::Fiber, i as usize);
        }
    }
    assert_eq!(a.state().fatigue, b.state().fatigue);
    assert_eq!(a.state().generation, b.state().generation);
    let fa = a.frame();
    let fb = b.frame();
    assert_eq!(fa.ops, fb.ops);
    assert_eq!(fa.background, fb.background);
    assert_eq!(fa.offset, fb.offset);
}

#[test]
fn radial_sweep_reveals_shapes_progressively() {
    let config = EyeConfig {
        radial_growth_sweep: true,
        ..small_config()
    };
    let mut world = match EyeWorld::new(config) {
        Ok(world) => world,
        Err(err) => panic!("world construction failed: {err}"),
    };
    world.tick(DT);
    let early = world.frame().ops.len();
    for _ in 0..150 {
        world.tick(DT);
    }
    let late = world.frame().ops.len();
    assert!(
        late > early,
        "sweep did not grow the draw list ({early} -> {late})"
    );
}

#[test]
fn status_history_reflects_the_run() {
    let mut world = staring_world();
    for _ in 0..200 {
        world.tick(DT);
    }
    let history = world.history();
    assert!(!history.is_empty());
    assert!(history.len() <= world.config().history_capacity);
    let mut prev_tick = 0;
    for snapshot in history {
        assert!(snapshot.tick > prev_tick, "history out of order");
        prev_tick = snapshot.tick;
        assert!((0.0..=100.0).contains(&snapshot.fatigue_percent));
        assert!((0.0..=100.0).contains(&snapshot.rebuild_progress_percent));
    }
}
