// THEORY:
// The `tracker` module is the heart of the renderer side. Its job is to give
// the scene "object permanence" for lights: per-cycle estimates are noisy and
// their count flickers, but the lights the user sees must not.
//
// Key architectural principles:
// 1.  **Positional Identity**: the incoming list is ranked by radius and rank
//     is the only identity a light has. Entry 0 drives the directional slot,
//     entry `i + 1` drives the Point light at index `i`. There is no nearest
//     neighbour matching.
// 2.  **Hysteresis**: an existing light is rewritten only when the incoming
//     estimate differs from what is rendered by more than a threshold in
//     radius, position, color or intensity. Small jitter is absorbed; the
//     rendered light simply stays where it is.
// 3.  **Lifecycle Management**:
//     - **Birth**: ranks past the managed Point count spawn new Point lights.
//     - **Update**: ranks within the managed count are compared and, if
//       different, rewritten in place. Objects are never recreated for this.
//     - **Death**: Point lights past the incoming count are destroyed from the
//       highest index downward, so the collection never has gaps.
// 4.  **The Directional Slot**: exactly one directional light exists at all
//     times. It is never destroyed; an empty cycle returns it to its default
//     pose and forgets its tracked radius.
// 5.  **Single Owner**: the tracker is driven from one thread. Batches arrive
//     through a channel and `drain` applies them in arrival order, one pass
//     per batch.

use crate::config::ReconcileConfig;
use crate::core_modules::observation::{IncomingLight, LightBatch};
use crate::core_modules::scene::{LightHandle, LightKind, LightState, SceneAdapter};
use crate::error::ConfigError;
use glam::Vec3;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Which managed light a decision is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Directional,
    Point(usize),
}

/// One action taken during a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightDecision {
    Created { index: usize, handle: LightHandle },
    Updated { slot: Slot },
    Unchanged { slot: Slot },
    Destroyed { index: usize, handle: LightHandle },
    DirectionalReset,
    StalePruned { handle: LightHandle },
}

/// Everything one pass did, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub pass: u64,
    pub decisions: Vec<LightDecision>,
}

impl ReconcileReport {
    pub fn created(&self) -> usize {
        self.count(|d| matches!(d, LightDecision::Created { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|d| matches!(d, LightDecision::Updated { .. }))
    }

    pub fn destroyed(&self) -> usize {
        self.count(|d| matches!(d, LightDecision::Destroyed { .. }))
    }

    /// True when nothing in the scene was touched.
    pub fn is_quiet(&self) -> bool {
        self.decisions
            .iter()
            .all(|d| matches!(d, LightDecision::Unchanged { .. }))
    }

    fn count(&self, pred: impl Fn(&LightDecision) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(d)).count()
    }
}

/// Engine-owned record binding a rendered light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagedLight {
    pub handle: LightHandle,
    /// Radius the light was last written with, for hysteresis.
    pub last_radius: f32,
    pub kind: LightKind,
}

/// The light reconciliation engine.
pub struct LightTracker<S: SceneAdapter> {
    scene: S,
    directional: ManagedLight,
    points: Vec<ManagedLight>,
    config: ReconcileConfig,
    passes: u64,
}

impl<S: SceneAdapter> LightTracker<S> {
    /// Takes ownership of the scene and of its directional light, which is
    /// moved to its default pose. Fails if that light does not resolve.
    pub fn new(
        mut scene: S,
        directional: Option<LightHandle>,
        config: ReconcileConfig,
    ) -> Result<Self, ConfigError> {
        let handle = directional.ok_or(ConfigError::MissingDirectionalLight)?;
        let mut state = scene
            .light_state(handle)
            .ok_or(ConfigError::MissingDirectionalLight)?;
        state.position = config.default_position;
        state.rotation = config.default_rotation;
        scene.apply(handle, &state);

        info!(?handle, default_position = ?config.default_position, "light tracker attached");
        Ok(Self {
            scene,
            directional: ManagedLight {
                handle,
                last_radius: 0.0,
                kind: LightKind::Directional,
            },
            points: Vec::new(),
            config,
            passes: 0,
        })
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn directional(&self) -> &ManagedLight {
        &self.directional
    }

    pub fn points(&self) -> &[ManagedLight] {
        &self.points
    }

    /// Managed light sources, the directional slot included.
    pub fn managed_count(&self) -> usize {
        self.points.len() + 1
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Applies every queued batch in arrival order, one pass each.
    pub fn drain(&mut self, queue: &mut UnboundedReceiver<LightBatch>) -> Vec<ReconcileReport> {
        let mut reports = Vec::new();
        while let Ok(batch) = queue.try_recv() {
            reports.push(self.reconcile(&batch.into_incoming()));
        }
        reports
    }

    /// One reconciliation pass over a ranked incoming list.
    pub fn reconcile(&mut self, incoming: &[IncomingLight]) -> ReconcileReport {
        self.passes += 1;
        let mut report = ReconcileReport {
            pass: self.passes,
            decisions: Vec::new(),
        };

        // --- 1. Stale Pruning ---
        let scene = &self.scene;
        self.points.retain(|light| {
            let alive = scene.light_state(light.handle).is_some();
            if !alive {
                report.decisions.push(LightDecision::StalePruned { handle: light.handle });
            }
            alive
        });

        // --- 2. Directional Slot ---
        let rest: &[IncomingLight] = match incoming.split_first() {
            Some((first, rest)) => {
                self.reconcile_directional(first, &mut report);
                rest
            }
            None => {
                self.reset_directional(&mut report);
                &[]
            }
        };

        // --- 3. Update or Create Point Lights ---
        for (index, light) in rest.iter().enumerate() {
            if index < self.points.len() {
                self.reconcile_point(index, light, &mut report);
            } else {
                let state = self.point_state(light, LightState::default());
                let handle = self.scene.spawn_light(LightKind::Point, &state);
                self.points.push(ManagedLight {
                    handle,
                    last_radius: light.radius,
                    kind: LightKind::Point,
                });
                report.decisions.push(LightDecision::Created { index, handle });
            }
        }

        // --- 4. Destroy Surplus, Highest Index First ---
        while self.points.len() > rest.len() {
            let index = self.points.len() - 1;
            if let Some(light) = self.points.pop() {
                self.scene.despawn(light.handle);
                report.decisions.push(LightDecision::Destroyed {
                    index,
                    handle: light.handle,
                });
            }
        }

        debug!(
            pass = report.pass,
            incoming = incoming.len(),
            points = self.points.len(),
            created = report.created(),
            updated = report.updated(),
            destroyed = report.destroyed(),
            "reconciliation pass"
        );
        report
    }

    fn reconcile_directional(&mut self, light: &IncomingLight, report: &mut ReconcileReport) {
        let handle = self.directional.handle;
        let Some(rendered) = self.scene.light_state(handle) else {
            warn!(?handle, "directional light no longer resolves, slot skipped");
            return;
        };

        if !self.differs(light, self.directional.last_radius, LightKind::Directional, &rendered) {
            report.decisions.push(LightDecision::Unchanged { slot: Slot::Directional });
            return;
        }

        let state = LightState {
            position: self.target_position(light, LightKind::Directional),
            color: light.color,
            intensity: self.normalized_intensity(light.intensity, LightKind::Directional),
            ..rendered
        };
        self.scene.apply(handle, &state);
        self.directional.last_radius = light.radius;
        report.decisions.push(LightDecision::Updated { slot: Slot::Directional });
    }

    fn reset_directional(&mut self, report: &mut ReconcileReport) {
        let handle = self.directional.handle;
        let Some(rendered) = self.scene.light_state(handle) else {
            warn!(?handle, "directional light no longer resolves, reset skipped");
            return;
        };

        let state = LightState {
            position: self.config.default_position,
            rotation: self.config.default_rotation,
            ..rendered
        };
        self.scene.apply(handle, &state);
        self.directional.last_radius = 0.0;
        report.decisions.push(LightDecision::DirectionalReset);
    }

    fn reconcile_point(&mut self, index: usize, light: &IncomingLight, report: &mut ReconcileReport) {
        let managed = self.points[index];
        let Some(rendered) = self.scene.light_state(managed.handle) else {
            // Gone mid-pass: treat as destroyed and take the slot over.
            let state = self.point_state(light, LightState::default());
            let handle = self.scene.spawn_light(LightKind::Point, &state);
            self.points[index] = ManagedLight {
                handle,
                last_radius: light.radius,
                kind: LightKind::Point,
            };
            report.decisions.push(LightDecision::Created { index, handle });
            return;
        };

        if !self.differs(light, managed.last_radius, LightKind::Point, &rendered) {
            report.decisions.push(LightDecision::Unchanged { slot: Slot::Point(index) });
            return;
        }

        let state = self.point_state(light, rendered);
        self.scene.apply(managed.handle, &state);
        self.points[index].last_radius = light.radius;
        report.decisions.push(LightDecision::Updated { slot: Slot::Point(index) });
    }

    /// Difference predicate against the rendered state and tracked radius.
    fn differs(&self, light: &IncomingLight, last_radius: f32, kind: LightKind, rendered: &LightState) -> bool {
        let t = &self.config.thresholds;

        let radius = (light.radius - last_radius).abs() > t.radius;
        let position = (self.target_position(light, kind) - rendered.position)
            .abs()
            .cmpgt(Vec3::splat(t.position))
            .any();
        let color = (light.color.truncate() - rendered.color.truncate())
            .abs()
            .cmpgt(Vec3::splat(t.color / 255.0))
            .any();
        let intensity = (self.normalized_intensity(light.intensity, kind) - rendered.intensity).abs() > t.intensity;

        if radius || position || color || intensity {
            debug!(?kind, radius, position, color, intensity, "light differs");
        }
        radius || position || color || intensity
    }

    fn offset_position(&self, light: &IncomingLight) -> Vec3 {
        Vec3::new(
            light.position.x + self.config.offset_x,
            light.position.y,
            light.position.z + self.config.offset_z,
        )
    }

    fn target_position(&self, light: &IncomingLight, kind: LightKind) -> Vec3 {
        let factor = match kind {
            LightKind::Directional => self.config.scene_scale,
            LightKind::Point => self.config.scene_scale / 2.0,
        };
        self.offset_position(light) * factor
    }

    fn normalized_intensity(&self, raw: f32, kind: LightKind) -> f32 {
        match kind {
            LightKind::Point => raw / self.config.point_intensity_scale,
            LightKind::Directional => raw / 255.0 * self.config.directional_damping,
        }
    }

    fn point_state(&self, light: &IncomingLight, base: LightState) -> LightState {
        LightState {
            position: self.target_position(light, LightKind::Point),
            color: light.color,
            intensity: self.normalized_intensity(light.intensity, LightKind::Point),
            range: self.offset_position(light).max_element() * self.config.scene_scale,
            ..base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::core_modules::observation::LightRecord;
    use crate::core_modules::scene::SceneGraph;
    use glam::Vec4;
    use tokio::sync::mpsc;

    fn light(radius: f32, position: Vec3) -> IncomingLight {
        IncomingLight {
            position,
            radius,
            intensity: 200.0,
            color: Vec4::new(1.0, 0.9, 0.8, 1.0),
        }
    }

    fn ranked(n: usize) -> Vec<IncomingLight> {
        (0..n)
            .map(|i| light(100.0 - 10.0 * i as f32, Vec3::new(i as f32 * 30.0, 50.0, -20.0)))
            .collect()
    }

    fn tracker() -> LightTracker<SceneGraph> {
        tracker_with(ReconcileConfig::default())
    }

    fn tracker_with(config: ReconcileConfig) -> LightTracker<SceneGraph> {
        let mut scene = SceneGraph::new();
        let directional = scene.insert_directional(LightState {
            position: Vec3::new(7.0, 7.0, 7.0),
            rotation: Vec3::new(10.0, 20.0, 30.0),
            ..LightState::default()
        });
        LightTracker::new(scene, Some(directional), config).unwrap()
    }

    fn directional_state(t: &LightTracker<SceneGraph>) -> LightState {
        t.scene().light_state(t.directional().handle).unwrap()
    }

    #[test]
    fn construction_requires_a_directional_light() {
        let result = LightTracker::new(SceneGraph::new(), None, ReconcileConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingDirectionalLight)));

        let result = LightTracker::new(SceneGraph::new(), Some(LightHandle(42)), ReconcileConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingDirectionalLight)));
    }

    #[test]
    fn construction_applies_default_pose() {
        let t = tracker();
        let state = directional_state(&t);
        assert_eq!(state.position, Vec3::new(0.0, 4.0, 0.0));
        assert_eq!(state.rotation, Vec3::new(90.0, 0.0, 0.0));
        assert_eq!(t.directional().last_radius, 0.0);
    }

    #[test]
    fn same_batch_twice_is_quiet() {
        let mut t = tracker();
        let batch = ranked(4);
        let first = t.reconcile(&batch);
        assert_eq!(first.created(), 3);

        let before: Vec<LightState> = t
            .points()
            .iter()
            .map(|p| t.scene().light_state(p.handle).unwrap())
            .collect();
        let second = t.reconcile(&batch);
        assert!(second.is_quiet());
        let after: Vec<LightState> = t
            .points()
            .iter()
            .map(|p| t.scene().light_state(p.handle).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(t.scene().spawned(), 3);
    }

    #[test]
    fn small_deltas_never_rewrite() {
        let mut t = tracker();
        let batch = ranked(3);
        t.reconcile(&batch);
        let rendered_dir = directional_state(&t);

        let jittered: Vec<IncomingLight> = batch
            .iter()
            .map(|l| IncomingLight {
                radius: l.radius + 5.0,
                position: l.position + Vec3::new(2.0, -3.0, 4.0),
                intensity: l.intensity + 30.0,
                color: l.color - Vec4::new(2.0 / 255.0, 0.0, 1.0 / 255.0, 0.0),
            })
            .collect();
        let report = t.reconcile(&jittered);

        assert!(report.is_quiet());
        assert_eq!(directional_state(&t), rendered_dir);
        assert_eq!(t.points()[0].last_radius, batch[1].radius);
    }

    #[test]
    fn empty_batch_resets_directional_and_clears_points() {
        let mut t = tracker();
        t.reconcile(&ranked(3));
        assert_ne!(directional_state(&t).position, Vec3::new(0.0, 4.0, 0.0));

        let report = t.reconcile(&[]);
        let state = directional_state(&t);
        assert_eq!(state.position, Vec3::new(0.0, 4.0, 0.0));
        assert_eq!(state.rotation, Vec3::new(90.0, 0.0, 0.0));
        assert_eq!(t.directional().last_radius, 0.0);
        assert!(t.points().is_empty());
        assert_eq!(report.decisions[0], LightDecision::DirectionalReset);
        assert_eq!(report.destroyed(), 2);
    }

    #[test]
    fn point_count_follows_batch_length() {
        let mut t = tracker();
        for n in [5usize, 2, 7, 1, 0, 3] {
            t.reconcile(&ranked(n));
            assert_eq!(t.points().len(), n.saturating_sub(1));
            assert_eq!(t.scene().count(LightKind::Point), n.saturating_sub(1));
            assert_eq!(t.scene().count(LightKind::Directional), 1);
        }
    }

    #[test]
    fn surplus_is_destroyed_from_the_top() {
        let mut t = tracker();
        t.reconcile(&ranked(5));
        let report = t.reconcile(&ranked(2));
        let destroyed: Vec<usize> = report
            .decisions
            .iter()
            .filter_map(|d| match d {
                LightDecision::Destroyed { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![3, 2, 1]);
    }

    #[test]
    fn single_light_only_moves_directional_past_radius_threshold() {
        let mut t = tracker();
        t.reconcile(&ranked(3));
        let a = light(45.0, Vec3::new(10.0, 20.0, 30.0));
        t.reconcile(&[a]);
        assert!(t.points().is_empty());
        assert_eq!(t.directional().last_radius, 45.0);

        let report = t.reconcile(&[IncomingLight { radius: 50.0, ..a }]);
        assert_eq!(report.decisions, vec![LightDecision::Unchanged { slot: Slot::Directional }]);
        assert_eq!(t.directional().last_radius, 45.0);

        let report = t.reconcile(&[IncomingLight { radius: 61.0, ..a }]);
        assert_eq!(report.decisions, vec![LightDecision::Updated { slot: Slot::Directional }]);
        assert_eq!(t.directional().last_radius, 61.0);
        assert_eq!(t.scene().count(LightKind::Point), 0);
    }

    #[test]
    fn growing_batch_never_recreates_existing_lights() {
        let mut t = tracker();
        let batch = ranked(3);

        t.reconcile(&batch[..2]);
        assert_eq!(t.managed_count(), 2);
        let b_handle = t.points()[0].handle;

        let report = t.reconcile(&batch);
        assert_eq!(t.managed_count(), 3);
        assert_eq!(t.points()[0].handle, b_handle);
        assert_eq!(report.created(), 1);
        assert_eq!(t.scene().spawned(), 2);
        assert_eq!(t.scene().despawned(), 0);
    }

    #[test]
    fn normalization_and_range() {
        let config = ReconcileConfig {
            scene_scale: 2.0,
            offset_x: 1.0,
            offset_z: -1.0,
            ..ReconcileConfig::default()
        };
        let mut t = tracker_with(config);
        let dir = IncomingLight {
            intensity: 255.0,
            ..light(80.0, Vec3::new(1.0, 2.0, 3.0))
        };
        let point = IncomingLight {
            intensity: 50.0,
            ..light(40.0, Vec3::new(4.0, 1.0, 2.0))
        };
        t.reconcile(&[dir, point]);

        let d = directional_state(&t);
        assert_eq!(d.position, Vec3::new(4.0, 4.0, 4.0));
        assert!((d.intensity - 0.7).abs() < 1e-6);

        let p = t.scene().light_state(t.points()[0].handle).unwrap();
        assert_eq!(p.position, Vec3::new(5.0, 1.0, 1.0));
        assert!((p.intensity - 5.0).abs() < 1e-6);
        assert_eq!(p.range, 10.0);
    }

    #[test]
    fn stale_point_is_pruned_and_slot_refilled() {
        let mut t = tracker();
        t.reconcile(&ranked(4));
        let gone = t.points()[1].handle;
        assert!(t.scene_mut().remove_external(gone));

        let report = t.reconcile(&ranked(4));
        assert_eq!(report.decisions[0], LightDecision::StalePruned { handle: gone });
        assert_eq!(t.points().len(), 3);
        assert_eq!(report.created(), 1);
        assert!(t.points().iter().all(|p| p.handle != gone));
    }

    #[test]
    fn stale_directional_skips_slot_only() {
        let mut t = tracker();
        let handle = t.directional().handle;
        t.scene_mut().remove_external(handle);

        let report = t.reconcile(&ranked(3));
        assert!(!report
            .decisions
            .iter()
            .any(|d| matches!(d, LightDecision::Updated { slot: Slot::Directional })));
        assert_eq!(t.points().len(), 2);
        let report = t.reconcile(&[]);
        assert!(!report.decisions.contains(&LightDecision::DirectionalReset));
        assert_eq!(report.destroyed(), 2);
    }

    #[test]
    fn uniform_threshold_scales_every_tolerance() {
        let config = ReconcileConfig {
            thresholds: Thresholds::uniform(0.5),
            ..ReconcileConfig::default()
        };
        let mut t = tracker_with(config);
        let batch = ranked(2);
        t.reconcile(&batch);
        let moved: Vec<IncomingLight> = batch
            .iter()
            .map(|l| IncomingLight {
                position: l.position + Vec3::new(0.0, 2.0, 0.0),
                ..*l
            })
            .collect();
        assert_eq!(t.reconcile(&moved).updated(), 2);
    }

    #[test]
    fn drain_applies_batches_in_order() {
        let mut t = tracker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let record = |radius: u32| LightRecord {
            x: 0.0,
            y: 1.0,
            z: 0.0,
            radius,
            mean_intensity: 100.0,
            r: 255.0,
            g: 255.0,
            b: 255.0,
            a: 255.0,
        };
        tx.send(LightBatch { lights: vec![record(90), record(40), record(30)] }).unwrap();
        tx.send(LightBatch { lights: vec![record(90)] }).unwrap();

        let reports = t.drain(&mut rx);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].pass, 1);
        assert_eq!(reports[1].pass, 2);
        assert!(t.points().is_empty());
        assert!(t.drain(&mut rx).is_empty());
    }
}
