// THEORY:
// The scene is the rendering engine's side of a light: something that can be
// spawned, read back, changed and destroyed. The reconciliation engine only
// ever talks to it through `SceneAdapter`, so the same decisions drive a real
// renderer, a headless simulation or a test double.
//
// Handles are opaque. An adapter may let a handle go stale at any time (the
// user deleted the light, the scene reloaded), and every read through a stale
// handle answers `None`/`false` instead of failing.
//
// `SceneGraph` is the in-memory adapter used by the renderer binary and the
// tests. It keeps counters of spawns and despawns so object churn can be
// observed from outside.

use glam::{Vec3, Vec4};
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Directional,
}

/// Opaque reference to a rendered light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightHandle(pub u64);

/// Rendered state of one light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    /// Normalized RGBA.
    pub color: Vec4,
    pub intensity: f32,
    pub range: f32,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            color: Vec4::ONE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

/// The rendering engine's object lifecycle, as seen by the engine.
pub trait SceneAdapter {
    fn spawn_light(&mut self, kind: LightKind, state: &LightState) -> LightHandle;

    /// Current state, or `None` if the handle no longer resolves.
    fn light_state(&self, handle: LightHandle) -> Option<LightState>;

    /// Overwrites the light's state. Returns `false` for a stale handle.
    fn apply(&mut self, handle: LightHandle, state: &LightState) -> bool;

    /// Destroys the light. Returns `false` if it was already gone.
    fn despawn(&mut self, handle: LightHandle) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
struct SceneLight {
    kind: LightKind,
    state: LightState,
}

/// In-memory scene.
#[derive(Debug, Default)]
pub struct SceneGraph {
    lights: BTreeMap<LightHandle, SceneLight>,
    next_handle: u64,
    spawned: u64,
    despawned: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a directional light the way an editor-placed main light
    /// would exist before any engine is attached.
    pub fn insert_directional(&mut self, state: LightState) -> LightHandle {
        let handle = self.allocate();
        self.lights.insert(
            handle,
            SceneLight {
                kind: LightKind::Directional,
                state,
            },
        );
        handle
    }

    /// Removes a light behind the engine's back, leaving its handle stale.
    pub fn remove_external(&mut self, handle: LightHandle) -> bool {
        self.lights.remove(&handle).is_some()
    }

    pub fn count(&self, kind: LightKind) -> usize {
        self.lights.values().filter(|l| l.kind == kind).count()
    }

    /// First directional light in handle order.
    pub fn directional(&self) -> Option<LightHandle> {
        self.lights
            .iter()
            .find(|(_, l)| l.kind == LightKind::Directional)
            .map(|(h, _)| *h)
    }

    /// Number of lights ever spawned through the adapter.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn despawned(&self) -> u64 {
        self.despawned
    }

    fn allocate(&mut self) -> LightHandle {
        self.next_handle += 1;
        LightHandle(self.next_handle)
    }
}

impl SceneAdapter for SceneGraph {
    fn spawn_light(&mut self, kind: LightKind, state: &LightState) -> LightHandle {
        let handle = self.allocate();
        self.lights.insert(handle, SceneLight { kind, state: *state });
        self.spawned += 1;
        debug!(?handle, ?kind, position = ?state.position, "light spawned");
        handle
    }

    fn light_state(&self, handle: LightHandle) -> Option<LightState> {
        self.lights.get(&handle).map(|l| l.state)
    }

    fn apply(&mut self, handle: LightHandle, state: &LightState) -> bool {
        match self.lights.get_mut(&handle) {
            Some(light) => {
                light.state = *state;
                trace!(?handle, "light state applied");
                true
            }
            None => false,
        }
    }

    fn despawn(&mut self, handle: LightHandle) -> bool {
        let removed = self.lights.remove(&handle).is_some();
        if removed {
            self.despawned += 1;
            debug!(?handle, "light despawned");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_lights_can_be_read_and_changed() {
        let mut scene = SceneGraph::new();
        let handle = scene.spawn_light(LightKind::Point, &LightState::default());
        let mut state = scene.light_state(handle).unwrap();
        state.intensity = 3.0;
        assert!(scene.apply(handle, &state));
        assert_eq!(scene.light_state(handle).unwrap().intensity, 3.0);
        assert_eq!(scene.spawned(), 1);
    }

    #[test]
    fn stale_handles_answer_none() {
        let mut scene = SceneGraph::new();
        let handle = scene.spawn_light(LightKind::Point, &LightState::default());
        assert!(scene.remove_external(handle));
        assert!(scene.light_state(handle).is_none());
        assert!(!scene.apply(handle, &LightState::default()));
        assert!(!scene.despawn(handle));
        assert_eq!(scene.despawned(), 0);
    }

    #[test]
    fn directional_lookup_finds_registered_light() {
        let mut scene = SceneGraph::new();
        assert!(scene.directional().is_none());
        let handle = scene.insert_directional(LightState::default());
        assert_eq!(scene.directional(), Some(handle));
        assert_eq!(scene.count(LightKind::Directional), 1);
        assert_eq!(scene.spawned(), 0);
    }
}
