//! The `dashlab_core` crate holds the numeric side of the Dashlab teaching
//! dashboards. Every entry point is a pure function of its inputs and never
//! fails outright: bad input degrades to a well-defined fallback result plus a
//! human-readable diagnostic.
//!
//! Key components:
//! - **Field**: `compute_vector_field` samples two user expressions over a 2D grid.
//! - **Expression**: a sandboxed parser/evaluator limited to `X`, `Y`, arithmetic,
//!   `sin cos tan exp sqrt` and the constants `pi`, `e`.
//! - **Epidemic**: `simulate_sir` integrates the SIR model and derives its summary figures.
//! - **Solvers**: fixed-step RK4 and Tsit5 integrators over the `traits` abstractions.

pub mod epidemic;
pub mod error;
pub mod expression;
pub mod field;
pub mod grid;
pub mod solvers;
pub mod traits;

pub use epidemic::{
    simulate_sir, simulate_sir_with, Classification, EpidemicStatistics, EpidemicTrajectory,
    SimulationStatus, SirOutcome, SirParameters,
};
pub use error::{ExpressionError, SimulationError};
pub use field::{compute_vector_field, FieldOutcome, FieldRequest, VectorField, VectorSample};
pub use solvers::Integrator;
