use thiserror::Error;

/// Why a field expression could not be turned into numbers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("expression is longer than {limit} bytes")]
    TooLong { limit: usize },
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {found} at token {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected ')'")]
    UnclosedParen,
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("function '{0}' is not allowed")]
    UnknownFunction(String),
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("evaluation produced a non-finite value at grid point ({row}, {col})")]
    NonFinite { row: usize, col: usize },
}

/// Why an SIR run had to fall back to its initial state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("integration diverged at t = {t}")]
    NonFiniteState { t: f64 },
}

impl SimulationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
