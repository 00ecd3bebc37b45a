use crate::traits::{DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Butcher tableau of an explicit method with `S` stages.
/// `a` is strictly lower triangular.
struct Tableau<const S: usize> {
    c: [f64; S],
    a: [[f64; S]; S],
    b: [f64; S],
}

impl<const S: usize> Tableau<S> {
    /// One explicit step: `k_s = f(t + c_s dt, y + dt Σ a_sj k_j)`, then
    /// `y += dt Σ b_s k_s`.
    fn step<T: Scalar>(
        &self,
        k: &mut [Vec<T>; S],
        tmp: &mut [T],
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) {
        let t0 = *t;

        for stage in 0..S {
            for i in 0..state.len() {
                let mut acc = T::zero();
                for (prev, &a) in self.a[stage].iter().enumerate().take(stage) {
                    acc = acc + constant::<T>(a) * k[prev][i];
                }
                tmp[i] = state[i] + dt * acc;
            }
            system.apply(t0 + constant::<T>(self.c[stage]) * dt, tmp, &mut k[stage]);
        }

        for i in 0..state.len() {
            let mut acc = T::zero();
            for (stage, &b) in self.b.iter().enumerate() {
                acc = acc + constant::<T>(b) * k[stage][i];
            }
            state[i] = state[i] + dt * acc;
        }

        *t = t0 + dt;
    }
}

const RK4_TABLEAU: Tableau<4> = Tableau {
    c: [0.0, 0.5, 0.5, 1.0],
    a: [
        [0.0, 0.0, 0.0, 0.0],
        [0.5, 0.0, 0.0, 0.0],
        [0.0, 0.5, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ],
    b: [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
};

const TSIT5_TABLEAU: Tableau<6> = Tableau {
    c: [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0],
    a: [
        [0.0; 6],
        [0.161, 0.0, 0.0, 0.0, 0.0, 0.0],
        [-0.008480655492356989, 0.335480655492357, 0.0, 0.0, 0.0, 0.0],
        [2.898, -6.359447987781783, 4.361447987781783, 0.0, 0.0, 0.0],
        [
            5.325864858437957,
            -11.748883564062828,
            7.495539342889693,
            -0.09249506636030195,
            0.0,
            0.0,
        ],
        [
            5.86145544294642,
            -12.92096931784711,
            8.159367898576159,
            -0.071584973281401,
            -0.02826857949054663,
            0.0,
        ],
    ],
    b: [
        0.09646076681806523,
        0.01,
        0.4798896504144996,
        1.379008574103742,
        -3.290069515436099,
        2.324710524099774,
    ],
};

/// Classic fourth-order Runge-Kutta.
pub struct RK4<T: Scalar> {
    k: [Vec<T>; 4],
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![T::zero(); dim]),
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        RK4_TABLEAU.step(&mut self.k, &mut self.tmp, system, t, state, dt);
    }
}

/// Tsitouras 5(4) tableau, run here as a fixed-step fifth-order method.
pub struct Tsit5<T: Scalar> {
    k: [Vec<T>; 6],
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![T::zero(); dim]),
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        TSIT5_TABLEAU.step(&mut self.k, &mut self.tmp, system, t, state, dt);
    }
}

/// Which fixed-step method drives a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    #[default]
    Rk4,
    Tsit5,
}

impl Integrator {
    pub(crate) fn build<T: Scalar>(self, dim: usize) -> IntegratorState<T> {
        match self {
            Integrator::Rk4 => IntegratorState::Rk4(RK4::new(dim)),
            Integrator::Tsit5 => IntegratorState::Tsit5(Tsit5::new(dim)),
        }
    }
}

impl fmt::Display for Integrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Integrator::Rk4 => f.write_str("rk4"),
            Integrator::Tsit5 => f.write_str("tsit5"),
        }
    }
}

impl FromStr for Integrator {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rk4" => Ok(Integrator::Rk4),
            "tsit5" => Ok(Integrator::Tsit5),
            other => Err(format!("Unknown solver: {other}")),
        }
    }
}

pub(crate) enum IntegratorState<T: Scalar> {
    Rk4(RK4<T>),
    Tsit5(Tsit5<T>),
}

impl<T: Scalar> Steppable<T> for IntegratorState<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        match self {
            IntegratorState::Rk4(s) => s.step(system, t, state, dt),
            IntegratorState::Tsit5(s) => s.step(system, t, state, dt),
        }
    }
}
