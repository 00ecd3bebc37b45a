use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type the integrators work over.
/// Anything float-like that can be built from an `f64` constant qualifies.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time system `dx/dt = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Number of state components.
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`. `out` has `dimension()` entries.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A fixed-step integrator.
pub trait Steppable<T: Scalar> {
    /// Advances `state` by a single step of size `dt`, moving `t` along with it.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);

    /// Covers `span` with `substeps` equal steps.
    /// A `substeps` of zero is treated as one.
    fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        span: T,
        substeps: usize,
    ) {
        let count = substeps.max(1);
        let dt = span / T::from_usize(count).unwrap_or_else(T::one);
        for _ in 0..count {
            self.step(system, t, state, dt);
        }
    }
}
