//! Built-in script templates.
//!
//! A Script component whose `scriptCode` is empty and whose `scriptName`
//! matches a template runs the template text. Templates read their tuning
//! values from `this.variables` and fall back to defaults.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub code: &'static str,
}

const ROTATOR: &str = r#"
fn update(dt) {
    if this.gameObject == () { return; }
    let speed = this.variables.speed ?? 1.0;
    let axis = this.variables.axis ?? "y";
    if axis == "x" {
        this.gameObject.rotation.x += speed * dt;
    } else if axis == "z" {
        this.gameObject.rotation.z += speed * dt;
    } else {
        this.gameObject.rotation.y += speed * dt;
    }
}
"#;

const OSCILLATOR: &str = r#"
fn start() {
    if this.gameObject != () {
        this.origin = this.gameObject.position.y;
    }
}

fn update(dt) {
    if this.gameObject == () { return; }
    let origin = this.origin ?? this.gameObject.position.y;
    let amplitude = this.variables.amplitude ?? 1.0;
    let frequency = this.variables.frequency ?? 1.0;
    this.gameObject.position.y = origin + (this.time.time * frequency * 2.0 * PI()).sin() * amplitude;
}

fn onDestroy() {
    this.origin = ();
}
"#;

const PULSE: &str = r#"
fn start() {
    if this.gameObject != () {
        this.baseScale = this.gameObject.scale;
    }
}

fn update(dt) {
    if this.gameObject == () { return; }
    let base = this.baseScale ?? this.gameObject.scale;
    let amount = this.variables.amount ?? 0.2;
    let speed = this.variables.speed ?? 2.0;
    let factor = 1.0 + (this.time.time * speed).sin() * amount;
    this.gameObject.scale.x = base.x * factor;
    this.gameObject.scale.y = base.y * factor;
    this.gameObject.scale.z = base.z * factor;
}
"#;

const FOLLOWER: &str = r#"
fn update(dt) {
    if this.gameObject == () { return; }
    let target_name = this.variables.target ?? "";
    if target_name == "" { return; }
    let target = findObject(target_name);
    if target == () { return; }

    let speed = this.variables.speed ?? 2.0;
    let pos = this.gameObject.position;
    let dx = target.position.x - pos.x;
    let dy = target.position.y - pos.y;
    let dz = target.position.z - pos.z;
    let distance = (dx * dx + dy * dy + dz * dz).sqrt();
    let step = speed * dt;
    if distance <= step {
        this.gameObject.position = target.position;
    } else if distance > 0.0 {
        this.gameObject.position.x += dx / distance * step;
        this.gameObject.position.y += dy / distance * step;
        this.gameObject.position.z += dz / distance * step;
    }
}
"#;

const SPAWNER: &str = r#"
fn start() {
    this.elapsed = 0.0;
    this.spawned = 0;
}

fn update(dt) {
    if this.gameObject == () { return; }
    let interval = this.variables.interval ?? 1.0;
    let limit = this.variables.maxCount ?? 10;
    let kind = this.variables.objectType ?? "cube";

    this.elapsed = (this.elapsed ?? 0.0) + dt;
    this.spawned = this.spawned ?? 0;
    if this.elapsed < interval || this.spawned >= limit { return; }
    this.elapsed -= interval;

    let obj = createObject(kind, #{ position: this.gameObject.position });
    this.spawned += 1;
    emit("spawned", #{ spawner: this.entity, object: obj.id });
}
"#;

static TEMPLATES: [ScriptTemplate; 5] = [
    ScriptTemplate {
        name: "Rotator",
        description: "Spins the object around an axis (variables: speed, axis)",
        code: ROTATOR,
    },
    ScriptTemplate {
        name: "Oscillator",
        description: "Bobs the object up and down (variables: amplitude, frequency)",
        code: OSCILLATOR,
    },
    ScriptTemplate {
        name: "Pulse",
        description: "Scales the object in and out (variables: amount, speed)",
        code: PULSE,
    },
    ScriptTemplate {
        name: "Follower",
        description: "Moves toward a named object (variables: target, speed)",
        code: FOLLOWER,
    },
    ScriptTemplate {
        name: "Spawner",
        description: "Creates objects at the owner's position (variables: interval, maxCount, objectType)",
        code: SPAWNER,
    },
];

pub fn template(name: &str) -> Option<&'static ScriptTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

pub fn templates() -> &'static [ScriptTemplate] {
    &TEMPLATES
}

pub fn template_names() -> impl Iterator<Item = &'static str> {
    TEMPLATES.iter().map(|t| t.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(template("Rotator").map(|t| t.name), Some("Rotator"));
        assert!(template("rotator").is_none());
        assert_eq!(template_names().count(), templates().len());
    }

    #[test]
    fn every_template_parses() {
        let engine = rhai::Engine::new();
        for t in templates() {
            if let Err(e) = engine.compile(t.code) {
                panic!("template {} failed to parse: {e}", t.name);
            }
        }
    }
}
