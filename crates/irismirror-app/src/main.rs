//! Headless harness: runs the eye through a scripted visitor session and
//! logs the life cycle as it unfolds. A rasterizing front end would replace
//! the scripted attention source with a camera feed and paint each
//! [`RenderFrame`](irismirror_core::RenderFrame).
//!
//! Tunables (environment variables):
//! - `IRIS_SEED` RNG seed (default 2024)
//! - `IRIS_TICKS` simulated ticks at 60 Hz (default 3600, one minute)
//! - `IRIS_DUMP_FRAME` path to write the final frame as JSON

use anyhow::{Context, Result};
use irismirror_core::{AttentionSignal, EyeConfig, EyeWorld, ScriptedAttention};
use tracing::info;

const DT: f32 = 1.0 / 60.0;

fn main() -> Result<()> {
    init_tracing();
    let seed = env_u64("IRIS_SEED", 2024);
    let ticks = env_u64("IRIS_TICKS", 3600);

    let config = EyeConfig {
        rng_seed: Some(seed),
        ..EyeConfig::default()
    };
    let script = visitor_session(ticks as usize);
    let mut world =
        EyeWorld::with_attention_source(config, Box::new(ScriptedAttention::new(script)))
            .context("failed to build eye world")?;

    info!(seed, ticks, "starting iris mirror session");
    run(&mut world, ticks);

    if let Ok(path) = std::env::var("IRIS_DUMP_FRAME") {
        let frame = world.frame();
        let json = serde_json::to_string_pretty(&frame)?;
        std::fs::write(&path, json).with_context(|| format!("writing frame to {path}"))?;
        info!(path = %path, ops = frame.ops.len(), "dumped final frame");
    }

    if let Some(snapshot) = world.history().back() {
        info!(
            generation = snapshot.generation,
            phase = ?snapshot.phase,
            fatigue_percent = snapshot.fatigue_percent,
            face_status = ?snapshot.face_status,
            "session finished"
        );
    }
    Ok(())
}

fn run(world: &mut EyeWorld, ticks: u64) {
    for _ in 0..ticks {
        let events = world.tick(DT);
        if events.phase_changed {
            info!(tick = events.tick, phase = ?events.phase, "phase change");
        }
        if let Some(generation) = events.generation_started {
            info!(
                tick = events.tick,
                generation,
                palette = %world.palette().name,
                "rebirth"
            );
        }
        if events.tick % 300 == 0 {
            let state = world.state();
            info!(
                tick = events.tick,
                attention = state.attention,
                fatigue_percent = state.fatigue * 100.0,
                generation = state.generation,
                "status"
            );
        }
    }
}

/// A plausible gallery visit: an empty room, a visitor wandering past, a
/// long close-up stare, then the room empties again.
fn visitor_session(total_ticks: usize) -> Vec<AttentionSignal> {
    let mut script = Vec::with_capacity(total_ticks);
    for tick in 0..total_ticks {
        let seconds = tick as f32 * DT;
        let signal = if seconds < 10.0 {
            AttentionSignal {
                looking_confidence: Some(0.0),
                face_count: Some(0),
                proximity: Some(0.0),
            }
        } else if seconds < 20.0 {
            AttentionSignal {
                looking_confidence: Some(0.2),
                face_count: Some(1),
                proximity: Some(0.3),
            }
        } else if seconds < 45.0 {
            AttentionSignal {
                looking_confidence: Some(0.95),
                face_count: Some(1),
                proximity: Some(0.9),
            }
        } else {
            AttentionSignal {
                looking_confidence: Some(0.0),
                face_count: Some(0),
                proximity: Some(0.0),
            }
        };
        script.push(signal);
    }
    script
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
