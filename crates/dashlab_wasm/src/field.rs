//! Vector-field page entry points.

use crate::shared::{from_js, row_major, to_js};
use dashlab_core::grid::Bounds;
use dashlab_core::{FieldRequest, VectorField, VectorSample};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPayload {
    pub n: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub fx: Vec<f64>,
    pub fy: Vec<f64>,
    pub arrows: Vec<VectorSample>,
    pub bounds: Bounds,
    pub message: String,
    pub ok: bool,
}

pub fn field_payload(field: &VectorField) -> FieldPayload {
    FieldPayload {
        n: field.grid.n,
        x: row_major(&field.grid.x),
        y: row_major(&field.grid.y),
        fx: row_major(&field.fx),
        fy: row_major(&field.fy),
        arrows: field.samples().collect(),
        bounds: field.bounds(),
        message: field.outcome.message(),
        ok: field.outcome.is_ok(),
    }
}

#[wasm_bindgen(js_name = computeVectorField)]
pub fn compute_vector_field(
    fx: &str,
    fy: &str,
    xmax: f64,
    ymax: f64,
    n: u32,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let field = dashlab_core::compute_vector_field(fx, fy, xmax, ymax, n as usize);
    to_js(&field_payload(&field), "vector field")
}

/// Same as `computeVectorField`, reading a `{fx, fy, xmax, ymax, n}` object.
/// Missing keys take the page defaults.
#[wasm_bindgen(js_name = computeVectorFieldRequest)]
pub fn compute_vector_field_request(request: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let request: FieldRequest = if request.is_undefined() || request.is_null() {
        FieldRequest::default()
    } else {
        from_js(request, "vector field request")?
    };
    to_js(&field_payload(&request.compute()), "vector field")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashlab_core::compute_vector_field as compute;

    #[test]
    fn payload_flattens_rows_and_keeps_arrows_in_order() {
        let payload = field_payload(&compute("X", "2*Y", 1.0, 2.0, 2));
        assert_eq!(payload.n, 2);
        assert_eq!(payload.x, vec![-1.0, 1.0, -1.0, 1.0]);
        assert_eq!(payload.y, vec![-2.0, -2.0, 2.0, 2.0]);
        assert_eq!(payload.fx, payload.x);
        assert_eq!(payload.fy, vec![-4.0, -4.0, 4.0, 4.0]);
        assert_eq!(payload.arrows.len(), 4);
        for (k, arrow) in payload.arrows.iter().enumerate() {
            assert_eq!(arrow.start, [payload.x[k], payload.y[k]]);
            assert_eq!(arrow.end, [payload.x[k] + payload.fx[k], payload.y[k] + payload.fy[k]]);
        }
        assert!(payload.ok);
    }

    #[test]
    fn payload_reports_expression_errors() {
        let payload = field_payload(&compute("X +", "Y", 5.0, 5.0, 3));
        assert!(!payload.ok);
        assert!(payload.fx.iter().all(|v| *v == 0.0));
        assert!(payload.message.starts_with("Expression error"), "{}", payload.message);
        assert!((payload.bounds.y_max - 5.5).abs() < 1e-12);
    }

    #[cfg(target_arch = "wasm32")]
    #[wasm_bindgen_test::wasm_bindgen_test]
    fn compute_vector_field_serializes() {
        let value = compute_vector_field("-Y", "X", 5.0, 5.0, 4);
        assert!(value.is_ok(), "expected a serialized payload");
    }
}
