//! Headless playback demo.
//!
//! Builds a small scene, attaches scripts, a collider and a light, then plays
//! for two simulated seconds at 60 Hz, pausing halfway through.
//!
//! Run with: `RUST_LOG=info cargo run -p vesper-runtime --example headless_playback`

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use vesper_runtime::logging;
use vesper_runtime::prelude::*;

const FRAME_MS: f64 = 1000.0 / 60.0;

const COUNTER: &str = r#"
fn start() {
    log("counter starting on " + this.name);
}

fn update(dt) {
    this.variables.frames = (this.variables.frames ?? 0) + 1;
    if this.variables.frames % 30 == 0 {
        emit("halfSecond", #{ frames: this.variables.frames, time: this.time.time });
    }
}

fn onDestroy() {
    log("counter saw " + this.variables.frames + " frames");
}
"#;

fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::default();
    logging::init(config.log_filter.as_deref().unwrap_or(logging::DEFAULT_DIRECTIVE));

    let bus = EventBus::new();
    let scene = Rc::new(MemoryScene::new(bus.clone()));
    let time = ManualTimeSource::new();
    let mut runtime = Runtime::with_time_source(
        config,
        bus,
        Rc::clone(&scene) as Rc<dyn SceneHost>,
        Rc::new(time.clone()),
    )?;

    let spinner = scene.spawn("cube", "Spinner");
    runtime.add_component(
        spinner.id,
        SCRIPT_COMPONENT,
        &json!({ "scriptName": "Rotator", "variables": { "speed": 2.5 } }),
    )?;
    runtime.add_component(spinner.id, COLLIDER_COMPONENT, &json!({ "shape": "sphere" }))?;

    let lamp = scene.spawn("empty", "Lamp");
    runtime.add_component(lamp.id, LIGHT_COMPONENT, &json!({ "lightType": "point", "intensity": 2.0 }))?;
    runtime.add_component(lamp.id, SCRIPT_COMPONENT, &json!({ "scriptCode": COUNTER }))?;

    let pulses = Rc::new(Cell::new(0u32));
    {
        let pulses = Rc::clone(&pulses);
        runtime.bus().on("halfSecond", move |event| {
            pulses.set(pulses.get() + 1);
            println!("halfSecond {}", event.payload());
            Ok(())
        });
    }

    runtime.play()?;
    for frame in 0..120 {
        if frame == 60 {
            runtime.pause()?;
            time.advance(5_000.0);
            runtime.tick();
            runtime.play()?;
        }
        time.advance(FRAME_MS);
        runtime.tick();
    }

    let report = runtime.last_report().clone();
    runtime.stop();

    let rotation = scene
        .get_object(spinner.id)
        .map(|o| o.transform.rotation.y)
        .unwrap_or_default();
    println!(
        "ticks={} last_tick_updated={} spinner_rotation_y={rotation:.3} half_second_events={}",
        runtime.tick_count(),
        report.updated,
        pulses.get()
    );
    println!("saved lamp: {}", serde_json::to_string_pretty(&runtime.serialize_entity(lamp.id))?);
    Ok(())
}
