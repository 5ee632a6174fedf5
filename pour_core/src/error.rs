use std::collections::BTreeSet;

use thiserror::Error;

/// Why a running pour was cut short.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AbortReason {
    #[error("stopped by operator")]
    Stopped,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("served less than target: {measured_g:.2} g of {target_g:.2} g")]
    Underfill { measured_g: f32, target_g: f32 },
    #[error("{0} consecutive weight reads failed")]
    ReadFailures(u32),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PourError {
    #[error("bus error: {0}")]
    Transport(String),
    #[error("bus timeout")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no pump mapped for ingredient {ingredient}")]
    NoPump { ingredient: String },
    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),
    #[error("a pour is already in progress")]
    AlreadyServing,
    #[error("no pour in progress")]
    NotServing,
    #[error("pumps {0:?} are running; stop them before serving")]
    PumpsActive(BTreeSet<u8>),
    #[error("tare failed: {0}")]
    TareFailed(String),
    #[error("invalid pump number {0} (expected 1..=8)")]
    InvalidPump(u8),
    #[error("pour aborted{}: {reason}", at(.ingredient))]
    Abort {
        ingredient: Option<String>,
        reason: AbortReason,
    },
}

fn at(ingredient: &Option<String>) -> String {
    ingredient
        .as_deref()
        .map(|i| format!(" at {i}"))
        .unwrap_or_default()
}

impl PourError {
    /// Ingredient the error is attributed to, if any.
    pub fn ingredient(&self) -> Option<&str> {
        match self {
            PourError::NoPump { ingredient } => Some(ingredient),
            PourError::Abort { ingredient, .. } => ingredient.as_deref(),
            _ => None,
        }
    }
}

/// Typed result used by the drivers and the state machine.
pub type PourResult<T> = std::result::Result<T, PourError>;

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_message_names_the_ingredient() {
        let e = PourError::Abort {
            ingredient: Some("lime".into()),
            reason: AbortReason::Underfill {
                measured_g: 4.0,
                target_g: 10.0,
            },
        };
        assert_eq!(
            e.to_string(),
            "pour aborted at lime: served less than target: 4.00 g of 10.00 g"
        );
        assert_eq!(e.ingredient(), Some("lime"));
    }

    #[test]
    fn abort_without_ingredient() {
        let e = PourError::Abort {
            ingredient: None,
            reason: AbortReason::Stopped,
        };
        assert_eq!(e.to_string(), "pour aborted: stopped by operator");
        assert_eq!(e.ingredient(), None);
    }
}
