//! Headless viewer host: owns the displayed model, camera, lights and
//! per-frame state, and decides what to show when a load fails.

pub mod camera;
pub mod lighting;
pub mod pick;

use std::sync::Arc;

use glam::{Mat4, Vec3};
use itertools::Itertools;
use tracing::{debug, info, warn};

pub use camera::OrbitCamera;
pub use lighting::{AmbientLight, LightRig, SpotLight};
pub use pick::{PickHit, Ray};

use crate::asset::AssetDescriptor;
use crate::config::ViewerConfig;
use crate::error::LoadError;
use crate::models::{Geometry, Material, Mesh, Node, ResourceCounts, SceneGraph, ShadingModel};
use crate::pipeline::{
    LoadGeneration, LoadObserver, LoadPhase, LoadToken, ModelPipeline, PreparedModel,
};

pub const FALLBACK_NODE: &str = "Fallback_Placeholder";

/// What the viewer is currently showing.
#[derive(Debug)]
pub enum ViewerState {
    Idle,
    Loading {
        percent: u8,
        phase: Option<LoadPhase>,
    },
    Ready(PreparedModel),
    Fallback {
        scene: SceneGraph,
        cause: String,
    },
    Unmounted,
}

impl ViewerState {
    pub fn label(&self) -> &'static str {
        match self {
            ViewerState::Idle => "idle",
            ViewerState::Loading { .. } => "loading",
            ViewerState::Ready(_) => "ready",
            ViewerState::Fallback { .. } => "fallback",
            ViewerState::Unmounted => "unmounted",
        }
    }
}

/// Resources released by [`ViewerHost::unmount`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disposal {
    pub released: ResourceCounts,
    pub detached_nodes: usize,
}

/// Grey box shown in place of a model that failed to load.
pub fn fallback_scene() -> SceneGraph {
    let material = Material {
        name: "Fallback".to_string(),
        shading: ShadingModel::Standard,
        base_color: [0.5, 0.5, 0.55],
        metalness: 0.1,
        roughness: 0.8,
        ..Material::default()
    };
    let mesh = Mesh::new(
        Arc::new(Geometry::cuboid(Vec3::new(2.0, 0.8, 1.0))),
        Arc::new(material),
    );
    SceneGraph::new(Node::new("Fallback").with_child(Node::new(FALLBACK_NODE).with_mesh(mesh)))
}

pub struct ViewerHost {
    config: ViewerConfig,
    state: ViewerState,
    camera: OrbitCamera,
    lights: LightRig,
    generation: LoadGeneration,
    /// Rotation of the displayed model about +Y from the idle spin.
    spin: f32,
    hovered: bool,
    elapsed: f32,
}

impl ViewerHost {
    pub fn mount(config: ViewerConfig) -> Self {
        debug!("viewer mounted");
        Self {
            camera: OrbitCamera::new(&config),
            config,
            state: ViewerState::Idle,
            lights: LightRig::studio(),
            generation: LoadGeneration::new(),
            spin: 0.0,
            hovered: false,
            elapsed: 0.0,
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn is_mounted(&self) -> bool {
        !matches!(self.state, ViewerState::Unmounted)
    }

    /// The graph currently on screen, if any.
    pub fn displayed_scene(&self) -> Option<&SceneGraph> {
        match &self.state {
            ViewerState::Ready(model) => model.content.active_graph(),
            ViewerState::Fallback { scene, .. } => Some(scene),
            _ => None,
        }
    }

    /// World placement of the displayed model.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_y(self.spin)
    }

    /// Start a new load, superseding any load still in flight. Whatever was
    /// on screen is released and the loading indicator starts from zero.
    pub fn begin_load(&mut self) -> Option<LoadToken> {
        if !self.is_mounted() {
            return None;
        }
        let token = self.generation.next();
        let disposal = self.replace_state(ViewerState::Loading {
            percent: 0,
            phase: None,
        });
        if disposal != Disposal::default() {
            debug!(token = token.id(), released = ?disposal.released, "cleared previous model");
        }
        Some(token)
    }

    /// Install the outcome of the load started with `token`. Returns whether
    /// it was accepted; results for superseded tokens are dropped.
    pub fn finish_load(&mut self, token: &LoadToken, result: Result<PreparedModel, LoadError>) -> bool {
        if !self.is_mounted() || !token.is_current() {
            if let Ok(model) = result {
                let released = model.content.dispose();
                debug!(token = token.id(), ?released, "dropped stale load result");
            }
            return false;
        }
        match result {
            Ok(model) => {
                self.replace_state(ViewerState::Ready(model));
                true
            }
            Err(error) if error.is_superseded() => false,
            Err(error) => {
                if !matches!(self.state, ViewerState::Fallback { .. }) {
                    self.show_fallback(&error);
                }
                true
            }
        }
    }

    /// Run `pipeline` for `descriptor` and display the result.
    pub fn load(&mut self, pipeline: &ModelPipeline, descriptor: &AssetDescriptor) -> bool {
        let Some(token) = self.begin_load() else {
            return false;
        };
        let result = pipeline.load(descriptor, &token, self);
        self.finish_load(&token, result)
    }

    /// Advance one frame of `dt` seconds. No-op once unmounted.
    pub fn tick(&mut self, dt: f32) {
        if !self.is_mounted() || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.elapsed += dt;
        self.camera.update(dt);
        self.lights.animate(self.elapsed);

        let spin_rate = if self.hovered {
            self.config.idle_spin_hovered
        } else {
            self.config.idle_spin
        };
        match &mut self.state {
            ViewerState::Ready(model) => {
                self.spin += spin_rate * dt;
                let distance = self.camera.position().distance(self.camera.target());
                if model.content.update_lod(distance) {
                    debug!(distance, "switched detail level");
                }
            }
            ViewerState::Fallback { .. } => self.spin += spin_rate * dt,
            _ => {}
        }
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }

    pub fn focus_on(&mut self, position: Vec3) {
        self.camera.focus_on(position);
    }

    pub fn rotate_to(&mut self, azimuth: f32, polar: f32, radius: f32) {
        self.camera.rotate_to(azimuth, polar, radius);
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.camera.set_auto_rotate(enabled);
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    /// Named part under `ray`, nearest first.
    pub fn pick(&self, ray: &Ray) -> Option<PickHit> {
        pick::pick(self.displayed_scene()?, self.model_matrix(), ray)
    }

    /// Track whether the pointer is over the model. Returns the hovered flag.
    pub fn hover(&mut self, ray: &Ray) -> bool {
        self.hovered = self.pick(ray).is_some();
        self.hovered
    }

    /// Stop updates, supersede any in-flight load and release everything the
    /// viewer owns. Calling it again releases nothing.
    pub fn unmount(&mut self) -> Disposal {
        self.generation.invalidate();
        let disposal = self.replace_state(ViewerState::Unmounted);
        self.hovered = false;
        info!(
            geometries = disposal.released.geometries,
            materials = disposal.released.materials,
            textures = disposal.released.textures,
            nodes = disposal.detached_nodes,
            "viewer unmounted"
        );
        disposal
    }

    fn show_fallback(&mut self, error: &LoadError) {
        warn!(cause = error.label(), %error, "showing fallback model");
        self.replace_state(ViewerState::Fallback {
            scene: fallback_scene(),
            cause: describe(error),
        });
    }

    /// Swap in `next`, disposing whatever the old state owned.
    fn replace_state(&mut self, next: ViewerState) -> Disposal {
        let previous = std::mem::replace(&mut self.state, next);
        self.spin = 0.0;
        match previous {
            ViewerState::Ready(model) => {
                let detached_nodes = model.content.graphs().iter().map(|g| node_count(g)).sum();
                Disposal {
                    released: model.content.dispose(),
                    detached_nodes,
                }
            }
            ViewerState::Fallback { scene, .. } => Disposal {
                detached_nodes: node_count(&scene),
                released: scene.dispose(),
            },
            _ => Disposal::default(),
        }
    }
}

impl LoadObserver for ViewerHost {
    fn on_phase(&mut self, phase: LoadPhase) {
        if let ViewerState::Loading { phase: current, .. } = &mut self.state {
            *current = Some(phase);
        }
    }

    fn on_progress(&mut self, percent: u8) {
        if let ViewerState::Loading { percent: current, .. } = &mut self.state {
            *current = percent;
        }
    }

    fn on_success(&mut self, model: &PreparedModel) {
        debug!(locator = %model.locator, "load succeeded");
    }

    fn on_error(&mut self, error: &LoadError) {
        self.show_fallback(error);
    }
}

/// The error and every source below it, outermost first.
fn describe(error: &LoadError) -> String {
    std::iter::successors(Some(error as &dyn std::error::Error), |e| e.source())
        .map(ToString::to_string)
        .join(": ")
}

fn node_count(graph: &SceneGraph) -> usize {
    let mut count = 0;
    graph.visit(|_, _, _| count += 1);
    count
}
