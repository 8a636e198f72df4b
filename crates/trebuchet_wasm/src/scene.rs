//! Scene runner exposed to the designer front end.

use anyhow::{anyhow, Context};
use js_sys::{Array, Float64Array, Function};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use trebuchet_core::integrator::IntegrationStatus;
use trebuchet_core::scene::{ConstraintsSpec, Scene};
use trebuchet_core::simulate::{simulate_with_history, SimulationOutput};
use wasm_bindgen::prelude::*;

/// Horizontal speed the default launch predicate waits for.
const DEFAULT_LAUNCH_VX: f64 = 40.0;

#[wasm_bindgen]
pub struct WasmScene {
    scene: Scene,
    output: Option<SimulationOutput>,
}

#[derive(Serialize)]
struct TrajectoryPayload<'a> {
    times: &'a [f64],
    trajectory: &'a [Vec<f64>],
    status: IntegrationStatus,
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

fn truthy(result: Result<JsValue, JsValue>, failure: &mut Option<JsValue>) -> bool {
    match result {
        Ok(value) => value.is_truthy(),
        Err(err) => {
            failure.get_or_insert(err);
            false
        }
    }
}

#[wasm_bindgen]
impl WasmScene {
    /// Parses and normalizes a preset scene.
    #[wasm_bindgen(constructor)]
    pub fn new(json: &str) -> Result<WasmScene, JsValue> {
        console_error_panic_hook::set_once();

        let scene = Scene::from_json(json)
            .context("Invalid scene")
            .map_err(to_js_error)?;
        Ok(WasmScene {
            scene,
            output: None,
        })
    }

    pub fn particle_count(&self) -> usize {
        self.scene.particles.len()
    }

    /// Runs the scene. `terminate`, when given, is called with the current
    /// state as a `Float64Array`; otherwise the projectile is released once
    /// it flies right fast enough.
    pub fn simulate(&mut self, terminate: Option<Function>) -> Result<JsValue, JsValue> {
        let mut failure = None;
        let output = match terminate {
            Some(callback) => self.scene.simulate(|state| {
                let state = Float64Array::from(state);
                truthy(callback.call1(&JsValue::NULL, &state), &mut failure)
            }),
            None => self
                .scene
                .simulate(self.scene.roles.launch_predicate(DEFAULT_LAUNCH_VX)),
        }
        .context("Simulation failed")
        .map_err(to_js_error)?;
        if let Some(err) = failure {
            return Err(err);
        }
        self.store(output)
    }

    /// Runs the scene with a predicate over the list of evaluated states.
    pub fn simulate_with_history(&mut self, terminate: Function) -> Result<JsValue, JsValue> {
        let mut failure = None;
        let scene = &self.scene;
        let output = simulate_with_history(
            &scene.particles,
            &scene.constraints,
            &scene.roles,
            &scene.settings(),
            |history| {
                let states: Array = history
                    .iter()
                    .map(|state| JsValue::from(Float64Array::from(state.as_slice())))
                    .collect();
                truthy(terminate.call1(&JsValue::NULL, &states), &mut failure)
            },
        )
        .context("Simulation failed")
        .map_err(to_js_error)?;
        if let Some(err) = failure {
            return Err(err);
        }
        self.store(output)
    }

    /// `{ range, peak_load }` of the last run.
    pub fn score(&self) -> Result<JsValue, JsValue> {
        let output = self.output().map_err(to_js_error)?;
        to_js(&self.scene.score(output))
    }

    /// Times of every logged derivative evaluation of the last run.
    pub fn log_times(&self) -> Result<Vec<f64>, JsValue> {
        let output = self.output().map_err(to_js_error)?;
        Ok(output.log.times.clone())
    }

    /// Constraints record in force at `t` during the last run, for drawing
    /// ropes and released links.
    pub fn constraints_at(&self, t: f64) -> Result<JsValue, JsValue> {
        let output = self.output().map_err(to_js_error)?;
        let snapshot = output
            .log
            .snapshot_at(t)
            .ok_or_else(|| anyhow!("Empty constraint log"))
            .map_err(to_js_error)?;
        to_js(&ConstraintsSpec::from_constraint_set(snapshot))
    }

    pub fn to_json(&self) -> Result<String, JsValue> {
        self.scene
            .to_json()
            .context("Failed to serialize scene")
            .map_err(to_js_error)
    }
}

impl WasmScene {
    fn output(&self) -> anyhow::Result<&SimulationOutput> {
        self.output
            .as_ref()
            .ok_or_else(|| anyhow!("No simulation has been run yet"))
    }

    fn store(&mut self, output: SimulationOutput) -> Result<JsValue, JsValue> {
        let payload = to_js(&TrajectoryPayload {
            times: &output.times,
            trajectory: &output.trajectory,
            status: output.status,
        })?;
        self.output = Some(output);
        Ok(payload)
    }
}
