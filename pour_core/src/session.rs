//! Per-pour bookkeeping and the progress snapshot published to callers.
use serde::Serialize;

use crate::error::PourError;
use crate::recipe::{Ingredient, Recipe};

/// Structured failure handed to the caller: which ingredient, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PourFault {
    pub ingredient: Option<String>,
    pub cause: String,
}

impl From<&PourError> for PourFault {
    fn from(e: &PourError) -> Self {
        let cause = match e {
            PourError::Abort { reason, .. } => reason.to_string(),
            other => other.to_string(),
        };
        Self {
            ingredient: e.ingredient().map(str::to_string),
            cause,
        }
    }
}

/// Snapshot of the serving state. Field names follow the camelCase wire form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PourProgress {
    pub cocktail_id: Option<String>,
    pub current_ingredient: Option<String>,
    pub target_amount: f32,
    pub current_amount: f32,
    pub is_serving: bool,
    pub is_complete: bool,
    pub error: Option<PourFault>,
    pub post_add_ingredient: Option<String>,
}

/// Mutable state of the one active pour.
#[derive(Debug, Clone)]
pub struct PourSession {
    pub recipe: Recipe,
    /// Index of the ingredient being poured.
    pub index: usize,
    /// Sum of the targets of every completed ingredient.
    pub cumulative_before_g: f32,
    /// `cumulative_before_g` plus the current ingredient's target.
    pub cumulative_target_g: f32,
    /// Last raw scale reading since tare.
    pub measured_g: f32,
    /// Delivered for the current ingredient.
    pub delivered_g: f32,
    pub active_pump: Option<u8>,
    /// Final delivered amount of every finished ingredient, in order.
    pub poured: Vec<(String, f32)>,
    pub complete: bool,
    pub error: Option<PourError>,
}

impl PourSession {
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            index: 0,
            cumulative_before_g: 0.0,
            cumulative_target_g: 0.0,
            measured_g: 0.0,
            delivered_g: 0.0,
            active_pump: None,
            poured: Vec::new(),
            complete: false,
            error: None,
        }
    }

    pub fn current(&self) -> Option<&Ingredient> {
        self.recipe.ingredients().get(self.index)
    }

    pub fn progress(&self) -> PourProgress {
        let current = self.current().filter(|_| !self.complete);
        PourProgress {
            cocktail_id: Some(self.recipe.id().to_string()),
            current_ingredient: current.map(|i| i.name.clone()),
            target_amount: current.map_or(0.0, |i| i.ml),
            current_amount: self.delivered_g,
            // Stays set through completion or failure until stop_serving resets it.
            is_serving: true,
            is_complete: self.complete,
            error: self.error.as_ref().map(PourFault::from),
            post_add_ingredient: self.recipe.post_add().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AbortReason;

    #[test]
    fn progress_serializes_camel_case() {
        let recipe = Recipe::new("mule", [("vodka".to_string(), 40.0)], None).unwrap();
        let mut s = PourSession::new(recipe);
        s.delivered_g = 12.0;
        let json = serde_json::to_value(s.progress()).unwrap();
        assert_eq!(json["cocktailId"], "mule");
        assert_eq!(json["currentIngredient"], "vodka");
        assert_eq!(json["targetAmount"], 40.0);
        assert_eq!(json["currentAmount"], 12.0);
        assert_eq!(json["isServing"], true);
        assert_eq!(json["isComplete"], false);
        assert!(json["error"].is_null());
        assert!(json["postAddIngredient"].is_null());
    }

    #[test]
    fn finished_session_is_still_serving_until_reset() {
        let recipe = Recipe::new("mule", [("vodka".to_string(), 40.0)], None).unwrap();
        let mut s = PourSession::new(recipe);
        s.complete = true;
        let done = s.progress();
        assert!(done.is_serving && done.is_complete);
        assert_eq!(done.current_ingredient, None);

        s.complete = false;
        s.error = Some(PourError::Timeout);
        let failed = s.progress();
        assert!(failed.is_serving && !failed.is_complete);
        assert!(failed.error.is_some());

        assert!(!PourProgress::default().is_serving);
    }

    #[test]
    fn fault_carries_ingredient_and_cause() {
        let e = PourError::Abort {
            ingredient: Some("lime".into()),
            reason: AbortReason::ReadFailures(3),
        };
        let f = PourFault::from(&e);
        assert_eq!(f.ingredient.as_deref(), Some("lime"));
        assert_eq!(f.cause, "3 consecutive weight reads failed");
    }
}
