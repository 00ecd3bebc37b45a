//! Conversions shared by the exported entry points.

use anyhow::{anyhow, Result};
use dashlab_core::Integrator;
use nalgebra::DMatrix;
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub(crate) fn to_js<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize {what}: {err}")))
}

pub(crate) fn from_js<T: serde::de::DeserializeOwned>(value: JsValue, what: &str) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|err| JsValue::from_str(&format!("Invalid {what}: {err}")))
}

pub(crate) fn parse_solver(name: &str) -> Result<Integrator> {
    name.parse::<Integrator>().map_err(|err| anyhow!(err))
}

/// Flattens row by row, so index `i * n + j` is grid row `i`, column `j`.
pub(crate) fn row_major(matrix: &DMatrix<f64>) -> Vec<f64> {
    matrix.transpose().iter().copied().collect()
}
