use crate::expression::{FieldExpression, GridEnvironment};
use crate::grid::{Bounds, Grid, MAX_EXTENT, MAX_RESOLUTION};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Inputs of the vector-field page, with the values it starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldRequest {
    pub fx: String,
    pub fy: String,
    pub xmax: f64,
    pub ymax: f64,
    pub n: usize,
}

impl Default for FieldRequest {
    fn default() -> Self {
        Self {
            fx: "sin(X)".to_string(),
            fy: "sin(Y)".to_string(),
            xmax: 5.0,
            ymax: 5.0,
            n: 15,
        }
    }
}

impl FieldRequest {
    pub fn compute(&self) -> VectorField {
        compute_vector_field(&self.fx, &self.fy, self.xmax, self.ymax, self.n)
    }
}

/// How a field computation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldOutcome {
    Magnitude { min: f64, max: f64 },
    Failed { error: String },
}

impl FieldOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FieldOutcome::Magnitude { .. })
    }

    pub fn message(&self) -> String {
        match self {
            FieldOutcome::Magnitude { min, max } => {
                format!("Magnitude: min = {min:.2}, max = {max:.2}")
            }
            FieldOutcome::Failed { error } => format!("Expression error: {error}"),
        }
    }
}

/// One arrow of the field, ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSample {
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub fx: f64,
    pub fy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    pub grid: Grid,
    pub fx: DMatrix<f64>,
    pub fy: DMatrix<f64>,
    pub outcome: FieldOutcome,
}

impl VectorField {
    fn zero(grid: Grid, error: String) -> Self {
        warn!(%error, "vector field fell back to zero");
        Self {
            fx: grid.zeros(),
            fy: grid.zeros(),
            grid,
            outcome: FieldOutcome::Failed { error },
        }
    }

    /// Arrow at row `i` (y index), column `j` (x index).
    pub fn sample(&self, i: usize, j: usize) -> Option<VectorSample> {
        if i >= self.grid.n || j >= self.grid.n {
            return None;
        }
        let (x, y) = (self.grid.x[(i, j)], self.grid.y[(i, j)]);
        let (fx, fy) = (self.fx[(i, j)], self.fy[(i, j)]);
        Some(VectorSample {
            start: [x, y],
            end: [x + fx, y + fy],
            fx,
            fy,
        })
    }

    /// Every arrow, row by row.
    pub fn samples(&self) -> impl Iterator<Item = VectorSample> + '_ {
        let n = self.grid.n;
        (0..n).flat_map(move |i| (0..n).filter_map(move |j| self.sample(i, j)))
    }

    pub fn magnitudes(&self) -> DMatrix<f64> {
        magnitude(&self.fx, &self.fy)
    }

    pub fn bounds(&self) -> Bounds {
        self.grid.view_bounds()
    }
}

/// Samples `(fx, fy)` over an `n × n` grid spanning `[-xmax, xmax] × [-ymax, ymax]`.
///
/// Never fails: bad grid parameters or an expression that does not parse or
/// evaluates to NaN/Inf yield an all-zero field and a `Failed` outcome.
pub fn compute_vector_field(fx: &str, fy: &str, xmax: f64, ymax: f64, n: usize) -> VectorField {
    debug!(fx, fy, xmax, ymax, n, "computing vector field");

    let grid = match Grid::new(xmax, ymax, n) {
        Ok(grid) => grid,
        Err(err) => {
            let shape = if n <= MAX_RESOLUTION { n } else { 0 };
            let finite = |v: f64| if v.is_finite() && v.abs() <= MAX_EXTENT { v } else { 0.0 };
            let fallback = Grid::build(finite(xmax), finite(ymax), shape);
            return VectorField::zero(fallback, err.to_string());
        }
    };

    let env = GridEnvironment {
        x: &grid.x,
        y: &grid.y,
    };
    let evaluate = |label: &str, source: &str| {
        FieldExpression::compile(source)
            .and_then(|expr| expr.evaluate(&env))
            .map_err(|err| format!("{label}: {err}"))
    };
    let components = evaluate("dx/dt", fx).and_then(|u| Ok((u, evaluate("dy/dt", fy)?)));

    match components {
        Ok((u, v)) => {
            let lengths = magnitude(&u, &v);
            let outcome = FieldOutcome::Magnitude {
                min: lengths.iter().copied().fold(f64::INFINITY, f64::min),
                max: lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            VectorField {
                grid,
                fx: u,
                fy: v,
                outcome,
            }
        }
        Err(error) => VectorField::zero(grid, error),
    }
}

fn magnitude(fx: &DMatrix<f64>, fy: &DMatrix<f64>) -> DMatrix<f64> {
    fx.zip_map(fy, f64::hypot)
}
