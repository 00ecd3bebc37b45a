use anyhow::{bail, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Extra room around the sampled square so arrow heads stay on screen.
pub const VIEW_PADDING: f64 = 1.1;
/// Upper bound on samples per axis.
pub const MAX_RESOLUTION: usize = 500;
/// Largest accepted half-width of either axis.
pub const MAX_EXTENT: f64 = 1e100;

/// `n` evenly spaced values from `start` to `end`, both included.
///
/// Interpolates instead of accumulating `end - start`, which overflows for
/// endpoints of opposite sign near `f64::MAX`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        end
                    } else {
                        let f = i as f64 / last;
                        start * (1.0 - f) + end * f
                    }
                })
                .collect()
        }
    }
}

/// Axis-aligned plotting window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Square lattice over `[-xmax, xmax] × [-ymax, ymax]`.
///
/// `x` and `y` are laid out like a meshgrid: row `i` walks the y axis and
/// column `j` walks the x axis, so `x[(i, j)] = xs[j]` and `y[(i, j)] = ys[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub xmax: f64,
    pub ymax: f64,
    pub n: usize,
    pub x: DMatrix<f64>,
    pub y: DMatrix<f64>,
}

impl Grid {
    pub fn new(xmax: f64, ymax: f64, n: usize) -> Result<Self> {
        if !xmax.is_finite() || xmax <= 0.0 {
            bail!("X range must be a positive number, got {xmax}.");
        }
        if !ymax.is_finite() || ymax <= 0.0 {
            bail!("Y range must be a positive number, got {ymax}.");
        }
        if xmax > MAX_EXTENT || ymax > MAX_EXTENT {
            bail!("Axis ranges are capped at {MAX_EXTENT:e}, got {xmax} and {ymax}.");
        }
        if n < 2 {
            bail!("Grid resolution needs at least 2 samples per axis, got {n}.");
        }
        if n > MAX_RESOLUTION {
            bail!("Grid resolution is capped at {MAX_RESOLUTION} samples per axis, got {n}.");
        }
        Ok(Self::build(xmax, ymax, n))
    }

    /// Builds the lattice without validation. Used for the zero-field shape
    /// when the requested parameters were rejected.
    pub(crate) fn build(xmax: f64, ymax: f64, n: usize) -> Self {
        let xs = linspace(-xmax, xmax, n);
        let ys = linspace(-ymax, ymax, n);
        Self {
            xmax,
            ymax,
            n,
            x: DMatrix::from_fn(n, n, |_, j| xs[j]),
            y: DMatrix::from_fn(n, n, |i, _| ys[i]),
        }
    }

    pub fn len(&self) -> usize {
        self.n * self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn view_bounds(&self) -> Bounds {
        Bounds {
            x_min: -self.xmax * VIEW_PADDING,
            x_max: self.xmax * VIEW_PADDING,
            y_min: -self.ymax * VIEW_PADDING,
            y_max: self.ymax * VIEW_PADDING,
        }
    }

    pub fn zeros(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.n, self.n)
    }
}
