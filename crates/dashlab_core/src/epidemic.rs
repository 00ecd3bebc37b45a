use crate::error::SimulationError;
use crate::grid::linspace;
use crate::solvers::Integrator;
use crate::traits::{DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Longest integrator step between two output samples, in days.
pub const MAX_SUBSTEP: f64 = 0.1;
/// Largest product of sub-step length and `β + γ`. Keeps RK4 and Tsit5 well
/// inside their stability regions when the rates are large.
pub const MAX_RATE_STEP: f64 = 0.5;
/// Output samples per simulated day.
pub const SAMPLES_PER_DAY: f64 = 2.0;
/// Longest accepted horizon, in days.
pub const MAX_DAYS: f64 = 10_000.0;
/// Largest accepted β or γ, per day.
pub const MAX_RATE: f64 = 1_000.0;

/// Inputs of the SIR page, with the values it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SirParameters {
    /// Total population N.
    pub population: f64,
    /// Transmission rate β.
    pub beta: f64,
    /// Recovery rate γ.
    pub gamma: f64,
    /// Infected count at t = 0.
    pub initial_infected: f64,
    /// Horizon T in days.
    pub days: f64,
}

impl Default for SirParameters {
    fn default() -> Self {
        Self {
            population: 1000.0,
            beta: 0.3,
            gamma: 0.1,
            initial_infected: 1.0,
            days: 100.0,
        }
    }
}

impl SirParameters {
    pub fn new(population: f64, beta: f64, gamma: f64, initial_infected: f64, days: f64) -> Self {
        Self {
            population,
            beta,
            gamma,
            initial_infected,
            days,
        }
    }

    /// `[S0, I0, R0]` with `S0 = N - I0` and nobody recovered yet.
    pub fn initial_state(&self) -> [f64; 3] {
        [
            self.population - self.initial_infected,
            self.initial_infected,
            0.0,
        ]
    }

    /// Basic reproduction number β/γ, or 0 when γ is not positive.
    pub fn r0(&self) -> f64 {
        if self.gamma > 0.0 {
            self.beta / self.gamma
        } else {
            0.0
        }
    }

    /// Number of output samples: two per day, never fewer than two. Horizons
    /// past `MAX_DAYS` count as `MAX_DAYS`.
    pub fn sample_count(&self) -> usize {
        if !self.days.is_finite() || self.days <= 0.0 {
            return 2;
        }
        ((self.days.min(MAX_DAYS) * SAMPLES_PER_DAY).round() as usize).max(2)
    }

    /// Integrator step length: at most `MAX_SUBSTEP`, shorter when `β + γ`
    /// is large.
    pub fn substep(&self) -> f64 {
        let rate = self.beta + self.gamma;
        if rate > 0.0 {
            MAX_SUBSTEP.min(MAX_RATE_STEP / rate)
        } else {
            MAX_SUBSTEP
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let fields = [
            ("N", self.population),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("I0", self.initial_infected),
            ("T", self.days),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(SimulationError::invalid(name, format!("{value} is not finite")));
            }
        }
        if self.population <= 0.0 {
            return Err(SimulationError::invalid("N", "population must be positive"));
        }
        if self.beta < 0.0 {
            return Err(SimulationError::invalid("beta", "rate must not be negative"));
        }
        if self.gamma < 0.0 {
            return Err(SimulationError::invalid("gamma", "rate must not be negative"));
        }
        for (name, rate) in [("beta", self.beta), ("gamma", self.gamma)] {
            if rate > MAX_RATE {
                return Err(SimulationError::invalid(
                    name,
                    format!("rate must not exceed {MAX_RATE}"),
                ));
            }
        }
        if self.initial_infected < 0.0 || self.initial_infected > self.population {
            return Err(SimulationError::invalid("I0", "must lie between 0 and N"));
        }
        if self.days <= 0.0 {
            return Err(SimulationError::invalid("T", "horizon must be positive"));
        }
        if self.days > MAX_DAYS {
            return Err(SimulationError::invalid(
                "T",
                format!("horizon must not exceed {MAX_DAYS} days"),
            ));
        }
        Ok(())
    }
}

/// The SIR equations
///
/// ```text
/// dS/dt = -β·S·I/N
/// dI/dt =  β·S·I/N - γ·I
/// dR/dt =  γ·I
/// ```
pub struct SirModel<T: Scalar> {
    beta: T,
    gamma: T,
    population: T,
}

impl<T: Scalar> SirModel<T> {
    pub fn new(params: &SirParameters) -> Option<Self> {
        Some(Self {
            beta: T::from_f64(params.beta)?,
            gamma: T::from_f64(params.gamma)?,
            population: T::from_f64(params.population)?,
        })
    }
}

impl<T: Scalar> DynamicalSystem<T> for SirModel<T> {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let (s, i) = (x[0], x[1]);
        let infection = self.beta * s * i / self.population;
        let recovery = self.gamma * i;
        out[0] = -infection;
        out[1] = infection - recovery;
        out[2] = recovery;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Epidemic,
    Critical,
    None,
}

impl Classification {
    /// `R0 == 1` is its own case.
    pub fn from_r0(r0: f64) -> Self {
        if r0 > 1.0 {
            Classification::Epidemic
        } else if r0 == 1.0 {
            Classification::Critical
        } else {
            Classification::None
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Classification::Epidemic => "epidemic occurs",
            Classification::Critical => "critical equilibrium",
            Classification::None => "no epidemic",
        }
    }

    fn relation(self) -> &'static str {
        match self {
            Classification::Epidemic => ">",
            Classification::Critical => "=",
            Classification::None => "<",
        }
    }
}

/// Whether the trajectory came out of the integrator or is the flat fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationStatus {
    Solved,
    Fallback { reason: String },
}

/// `(t, S, I, R)` columns, one row per output sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpidemicTrajectory {
    pub t: Vec<f64>,
    pub s: Vec<f64>,
    pub i: Vec<f64>,
    pub r: Vec<f64>,
}

impl EpidemicTrajectory {
    fn with_capacity(len: usize) -> Self {
        Self {
            t: Vec::with_capacity(len),
            s: Vec::with_capacity(len),
            i: Vec::with_capacity(len),
            r: Vec::with_capacity(len),
        }
    }

    fn push(&mut self, t: f64, state: &[f64]) {
        self.t.push(t);
        self.s.push(state[0]);
        self.i.push(state[1]);
        self.r.push(state[2]);
    }

    /// Every compartment held at `state` for all of `times`.
    pub fn constant(times: Vec<f64>, state: [f64; 3]) -> Self {
        let len = times.len();
        Self {
            t: times,
            s: vec![state[0]; len],
            i: vec![state[1]; len],
            r: vec![state[2]; len],
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// `S + I + R` at every sample.
    pub fn totals(&self) -> impl Iterator<Item = f64> + '_ {
        self.s
            .iter()
            .zip(&self.i)
            .zip(&self.r)
            .map(|((s, i), r)| s + i + r)
    }
}

/// Summary figures shown next to the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpidemicStatistics {
    pub peak_infected: f64,
    pub peak_day: f64,
    pub final_recovered: f64,
    /// Share of N recovered at the last sample, in percent.
    pub final_attack_rate: f64,
    pub final_susceptible: f64,
    pub r0: f64,
    pub classification: Classification,
    pub days: f64,
}

impl EpidemicStatistics {
    pub fn from_trajectory(trajectory: &EpidemicTrajectory, params: &SirParameters) -> Self {
        // Strict comparison keeps the first of tied maxima.
        let mut peak_index = 0;
        for (index, value) in trajectory.i.iter().enumerate() {
            if *value > trajectory.i[peak_index] {
                peak_index = index;
            }
        }
        let peak_infected = trajectory.i.get(peak_index).copied().unwrap_or(0.0);
        let peak_day = trajectory.t.get(peak_index).copied().unwrap_or(0.0);
        let final_recovered = trajectory.r.last().copied().unwrap_or(0.0);
        let final_susceptible = trajectory.s.last().copied().unwrap_or(0.0);
        let final_attack_rate = if params.population > 0.0 {
            final_recovered / params.population * 100.0
        } else {
            0.0
        };
        let r0 = params.r0();

        Self {
            peak_infected,
            peak_day,
            final_recovered,
            final_attack_rate,
            final_susceptible,
            r0,
            classification: Classification::from_r0(r0),
            days: params.days,
        }
    }

    pub fn report_lines(&self) -> Vec<String> {
        vec![
            format!(
                "Peak infected: {:.0} people (day {:.0})",
                self.peak_infected, self.peak_day
            ),
            format!(
                "Total people who got sick: {:.0} ({:.1}%)",
                self.final_recovered, self.final_attack_rate
            ),
            format!("Susceptible at the end: {:.0} people", self.final_susceptible),
            format!("Approximate duration: {} days simulated", self.days),
        ]
    }

    pub fn r0_message(&self) -> String {
        format!(
            "R0 = {:.2} {} 1 -> {}",
            self.r0,
            self.classification.relation(),
            self.classification.describe()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SirOutcome {
    pub parameters: SirParameters,
    pub trajectory: EpidemicTrajectory,
    pub statistics: EpidemicStatistics,
    pub status: SimulationStatus,
}

impl SirOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.status, SimulationStatus::Fallback { .. })
    }
}

/// Runs the SIR model with the default integrator (RK4).
pub fn simulate_sir(params: &SirParameters) -> SirOutcome {
    simulate_sir_with(params, Integrator::default())
}

/// Integrates the SIR model from `(S0, I0, 0)` over `[0, T]`.
///
/// Never fails: invalid parameters or a diverging integration return flat
/// trajectories at the initial state, flagged by `SimulationStatus::Fallback`.
pub fn simulate_sir_with(params: &SirParameters, integrator: Integrator) -> SirOutcome {
    debug!(
        population = params.population,
        beta = params.beta,
        gamma = params.gamma,
        initial_infected = params.initial_infected,
        days = params.days,
        %integrator,
        "simulating SIR model"
    );

    let horizon = if params.days.is_finite() && params.days > 0.0 {
        params.days.min(MAX_DAYS)
    } else {
        0.0
    };
    let times = linspace(0.0, horizon, params.sample_count());

    let (trajectory, status) = match integrate(params, integrator, &times) {
        Ok(trajectory) => (trajectory, SimulationStatus::Solved),
        Err(err) => {
            warn!(error = %err, "SIR integration fell back to initial state");
            let trajectory = EpidemicTrajectory::constant(times, params.initial_state());
            let status = SimulationStatus::Fallback {
                reason: err.to_string(),
            };
            (trajectory, status)
        }
    };

    SirOutcome {
        parameters: *params,
        statistics: EpidemicStatistics::from_trajectory(&trajectory, params),
        trajectory,
        status,
    }
}

fn integrate(
    params: &SirParameters,
    integrator: Integrator,
    times: &[f64],
) -> Result<EpidemicTrajectory, SimulationError> {
    params.validate()?;
    let model = SirModel::<f64>::new(params)
        .ok_or_else(|| SimulationError::invalid("N", "not representable"))?;
    let mut solver = integrator.build::<f64>(model.dimension());
    let step = params.substep();

    let mut state = params.initial_state();
    let mut trajectory = EpidemicTrajectory::with_capacity(times.len());
    let mut t = times.first().copied().unwrap_or(0.0);
    trajectory.push(t, &state);

    for window in times.windows(2) {
        let span = window[1] - window[0];
        let substeps = (span / step).ceil().max(1.0) as usize;
        solver.advance(&model, &mut t, &mut state, span, substeps);
        if state.iter().any(|v| !v.is_finite()) {
            return Err(SimulationError::NonFiniteState { t: window[1] });
        }
        t = window[1];
        trajectory.push(t, &state);
    }

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(population: f64, beta: f64, gamma: f64, initial_infected: f64, days: f64) -> SirOutcome {
        simulate_sir(&SirParameters::new(population, beta, gamma, initial_infected, days))
    }

    #[test]
    fn classification_follows_r0() {
        let cases = [
            (0.3, 0.1, 3.0, Classification::Epidemic),
            (0.1, 0.1, 1.0, Classification::Critical),
            (0.05, 0.1, 0.5, Classification::None),
        ];
        for (beta, gamma, r0, expected) in cases {
            let outcome = run(1000.0, beta, gamma, 1.0, 10.0);
            assert!((outcome.statistics.r0 - r0).abs() < 1e-12);
            assert_eq!(outcome.statistics.classification, expected);
        }
    }

    #[test]
    fn zero_recovery_rate_gives_zero_r0() {
        let outcome = run(1000.0, 0.3, 0.0, 1.0, 50.0);
        assert_eq!(outcome.statistics.r0, 0.0);
        assert_eq!(outcome.statistics.classification, Classification::None);
        assert_eq!(outcome.status, SimulationStatus::Solved);
        assert!(outcome.trajectory.r.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn reference_outbreak_peaks_inside_the_horizon() {
        let outcome = run(1000.0, 0.3, 0.1, 1.0, 100.0);
        let stats = &outcome.statistics;
        assert_eq!(outcome.status, SimulationStatus::Solved);
        assert_eq!(outcome.trajectory.len(), 200);
        assert!(stats.peak_infected > 1.0);
        assert!(stats.peak_day > 0.0 && stats.peak_day < 100.0);
        assert!(stats.final_attack_rate > 0.0 && stats.final_attack_rate < 100.0);
        assert_eq!(stats.final_susceptible, *outcome.trajectory.s.last().expect("samples"));
        assert_eq!(stats.r0_message(), "R0 = 3.00 > 1 -> epidemic occurs");
    }

    #[test]
    fn susceptible_falls_and_recovered_grows() {
        let outcome = run(1000.0, 0.3, 0.1, 1.0, 100.0);
        let trajectory = &outcome.trajectory;
        for k in 1..trajectory.len() {
            assert!(trajectory.s[k] <= trajectory.s[k - 1] + 1e-9);
            assert!(trajectory.r[k] >= trajectory.r[k - 1] - 1e-9);
        }
    }

    #[test]
    fn no_seed_infection_stays_at_initial_state() {
        let outcome = run(500.0, 0.4, 0.1, 0.0, 30.0);
        assert_eq!(outcome.status, SimulationStatus::Solved);
        for k in 0..outcome.trajectory.len() {
            assert_eq!(outcome.trajectory.s[k], 500.0);
            assert_eq!(outcome.trajectory.i[k], 0.0);
            assert_eq!(outcome.trajectory.r[k], 0.0);
        }
    }

    #[test]
    fn no_transmission_keeps_susceptible_constant() {
        let outcome = run(1000.0, 0.0, 0.1, 10.0, 20.0);
        let trajectory = &outcome.trajectory;
        for k in 0..trajectory.len() {
            assert_eq!(trajectory.s[k], 990.0);
            let expected = 10.0 * (-0.1 * trajectory.t[k]).exp();
            assert!((trajectory.i[k] - expected).abs() < 1e-6);
        }

        let frozen = run(1000.0, 0.0, 0.0, 10.0, 20.0);
        assert!(frozen.trajectory.i.iter().all(|i| *i == 10.0));
        assert!(frozen.trajectory.s.iter().all(|s| *s == 990.0));
    }

    #[test]
    fn short_horizons_still_produce_two_samples() {
        assert_eq!(SirParameters::new(1.0, 0.0, 0.0, 0.0, 100.0).sample_count(), 200);
        assert_eq!(SirParameters::new(1.0, 0.0, 0.0, 0.0, 1.0).sample_count(), 2);
        assert_eq!(SirParameters::new(1.0, 0.0, 0.0, 0.0, 0.2).sample_count(), 2);
        assert_eq!(SirParameters::new(1.0, 0.0, 0.0, 0.0, f64::NAN).sample_count(), 2);

        let outcome = run(100.0, 0.3, 0.1, 1.0, 1.0);
        assert_eq!(outcome.trajectory.t, vec![0.0, 1.0]);
    }

    #[test]
    fn invalid_parameters_fall_back_with_a_flag() {
        let cases = [
            SirParameters::new(0.0, 0.3, 0.1, 0.0, 10.0),
            SirParameters::new(1000.0, -0.3, 0.1, 1.0, 10.0),
            SirParameters::new(1000.0, 0.3, 0.1, 2000.0, 10.0),
            SirParameters::new(1000.0, 0.3, 0.1, 1.0, -5.0),
            SirParameters::new(1000.0, f64::INFINITY, 0.1, 1.0, 10.0),
        ];
        for params in cases {
            let outcome = simulate_sir(&params);
            assert!(outcome.is_fallback(), "{params:?} should fall back");
            let [s0, i0, r0] = params.initial_state();
            assert!(outcome.trajectory.len() >= 2);
            assert!(outcome.trajectory.s.iter().all(|s| *s == s0));
            assert!(outcome.trajectory.i.iter().all(|i| *i == i0));
            assert!(outcome.trajectory.r.iter().all(|r| *r == r0));
        }
    }

    #[test]
    fn enormous_horizons_fall_back_with_a_bounded_trajectory() {
        for days in [1e300, 1e9] {
            let params = SirParameters::new(1000.0, 0.3, 0.1, 1.0, days);
            assert_eq!(params.sample_count(), (2.0 * MAX_DAYS) as usize);
            let outcome = simulate_sir(&params);
            assert!(outcome.is_fallback(), "T = {days} should fall back");
            assert!(outcome.trajectory.len() <= (2.0 * MAX_DAYS) as usize);
            assert_eq!(outcome.trajectory.t.last().copied(), Some(MAX_DAYS));
            assert!(outcome.trajectory.t.iter().all(|t| t.is_finite()));
        }
    }

    #[test]
    fn fast_rates_are_integrated_with_shorter_steps() {
        let params = SirParameters::new(1000.0, 100.0, 40.0, 1.0, 30.0);
        assert!(params.substep() < MAX_SUBSTEP);
        let outcome = simulate_sir(&params);
        assert_eq!(outcome.status, SimulationStatus::Solved);
        for total in outcome.trajectory.totals() {
            assert!((total - 1000.0).abs() < 1e-3, "total drifted to {total}");
        }
        assert!(outcome.trajectory.s.windows(2).all(|w| w[1] <= w[0] + 1e-9));
        assert!(outcome.trajectory.i.iter().all(|i| *i >= -1e-9));
        assert!(outcome.statistics.final_attack_rate > 50.0);
    }

    #[test]
    fn rates_above_the_cap_fall_back() {
        let outcome = run(1000.0, MAX_RATE * 2.0, 0.1, 1.0, 10.0);
        match outcome.status {
            SimulationStatus::Fallback { reason } => assert!(reason.contains("beta"), "{reason}"),
            SimulationStatus::Solved => panic!("beta above the cap should fall back"),
        }
        assert!(run(1000.0, 0.3, MAX_RATE + 1.0, 1.0, 10.0).is_fallback());
    }

    #[test]
    fn fallback_is_distinguishable_from_a_flat_solution() {
        let flat = run(1000.0, 0.0, 0.0, 1.0, 10.0);
        let fallback = run(1000.0, 0.0, 0.0, 1.0, 0.0);
        assert_eq!(flat.status, SimulationStatus::Solved);
        match fallback.status {
            SimulationStatus::Fallback { reason } => assert!(reason.contains("T"), "{reason}"),
            SimulationStatus::Solved => panic!("zero horizon should fall back"),
        }
    }

    #[test]
    fn tsit5_agrees_with_rk4() {
        let params = SirParameters::default();
        let rk4 = simulate_sir_with(&params, Integrator::Rk4);
        let tsit5 = simulate_sir_with(&params, Integrator::Tsit5);
        let relative =
            (rk4.statistics.peak_infected - tsit5.statistics.peak_infected).abs() / 1000.0;
        assert!(relative < 1e-6);
        assert_eq!(rk4.statistics.peak_day, tsit5.statistics.peak_day);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let params = SirParameters::new(25_000.0, 0.45, 0.12, 3.0, 180.0);
        assert_eq!(simulate_sir(&params), simulate_sir(&params));
    }

    #[test]
    fn peak_keeps_the_first_of_tied_maxima() {
        let trajectory = EpidemicTrajectory {
            t: vec![0.0, 1.0, 2.0, 3.0],
            s: vec![7.0, 5.0, 5.0, 4.0],
            i: vec![1.0, 3.0, 3.0, 2.0],
            r: vec![0.0, 0.0, 0.0, 2.0],
        };
        let params = SirParameters::new(8.0, 0.5, 0.25, 1.0, 3.0);
        let stats = EpidemicStatistics::from_trajectory(&trajectory, &params);
        assert_eq!(stats.peak_day, 1.0);
        assert_eq!(stats.peak_infected, 3.0);
        assert_eq!(stats.final_attack_rate, 25.0);
        assert_eq!(stats.r0_message(), "R0 = 2.00 > 1 -> epidemic occurs");
    }

    #[test]
    fn report_lines_render_the_summary() {
        let stats = EpidemicStatistics {
            peak_infected: 301.2,
            peak_day: 38.4,
            final_recovered: 940.4,
            final_attack_rate: 94.04,
            final_susceptible: 59.6,
            r0: 1.0,
            classification: Classification::Critical,
            days: 100.0,
        };
        assert_eq!(
            stats.report_lines(),
            vec![
                "Peak infected: 301 people (day 38)".to_string(),
                "Total people who got sick: 940 (94.0%)".to_string(),
                "Susceptible at the end: 60 people".to_string(),
                "Approximate duration: 100 days simulated".to_string(),
            ]
        );
        assert_eq!(stats.r0_message(), "R0 = 1.00 = 1 -> critical equilibrium");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn population_is_conserved(
            population in 1.0f64..1.0e7,
            beta in 0.0f64..2.0,
            gamma in 0.0f64..1.0,
            seed_share in 0.0f64..1.0,
            days in 1.0f64..365.0,
        ) {
            let params = SirParameters::new(population, beta, gamma, seed_share * population, days);
            let outcome = simulate_sir(&params);
            prop_assert_eq!(&outcome.status, &SimulationStatus::Solved);
            for total in outcome.trajectory.totals() {
                prop_assert!((total - population).abs() / population < 1e-3);
            }
        }
    }
}
