//! SIR page entry points.

use crate::shared::{from_js, parse_solver, to_js};
use anyhow::Result;
use dashlab_core::{
    simulate_sir_with, EpidemicStatistics, SimulationStatus, SirOutcome, SirParameters,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SirPayload {
    pub t: Vec<f64>,
    pub s: Vec<f64>,
    pub i: Vec<f64>,
    pub r: Vec<f64>,
    pub stats: EpidemicStatistics,
    pub report: Vec<String>,
    pub r0_message: String,
    pub status: SimulationStatus,
}

pub fn sir_payload(outcome: &SirOutcome) -> SirPayload {
    let trajectory = &outcome.trajectory;
    SirPayload {
        t: trajectory.t.clone(),
        s: trajectory.s.clone(),
        i: trajectory.i.clone(),
        r: trajectory.r.clone(),
        stats: outcome.statistics.clone(),
        report: outcome.statistics.report_lines(),
        r0_message: outcome.statistics.r0_message(),
        status: outcome.status.clone(),
    }
}

/// Runs one simulation with the solver named `solver` (`"rk4"` or `"tsit5"`).
pub fn run_sir(params: &SirParameters, solver: &str) -> Result<SirPayload> {
    let integrator = parse_solver(solver)?;
    Ok(sir_payload(&simulate_sir_with(params, integrator)))
}

fn run_to_js(params: &SirParameters, solver: &str) -> Result<JsValue, JsValue> {
    let payload = run_sir(params, solver).map_err(|err| JsValue::from_str(&err.to_string()))?;
    to_js(&payload, "SIR simulation")
}

#[wasm_bindgen(js_name = simulateSIR)]
pub fn simulate_sir(
    population: f64,
    beta: f64,
    gamma: f64,
    initial_infected: f64,
    days: f64,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let params = SirParameters::new(population, beta, gamma, initial_infected, days);
    run_to_js(&params, "rk4")
}

#[wasm_bindgen(js_name = simulateSIRWith)]
pub fn simulate_sir_with_solver(
    population: f64,
    beta: f64,
    gamma: f64,
    initial_infected: f64,
    days: f64,
    solver: &str,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let params = SirParameters::new(population, beta, gamma, initial_infected, days);
    run_to_js(&params, solver)
}

/// Reads a `{population, beta, gamma, initialInfected, days}` object.
/// Missing keys take the page defaults.
#[wasm_bindgen(js_name = simulateSIRRequest)]
pub fn simulate_sir_request(request: JsValue, solver: Option<String>) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let params: SirParameters = if request.is_undefined() || request.is_null() {
        SirParameters::default()
    } else {
        from_js(request, "SIR parameters")?
    };
    run_to_js(&params, solver.as_deref().unwrap_or("rk4"))
}
