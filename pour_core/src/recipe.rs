//! Recipes, the recipe book and the ingredient→pump map.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{PourError, PourResult};
use crate::relay::PUMP_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingredient {
    pub name: String,
    /// Target volume; treated as grams 1:1 on the scale.
    pub ml: f32,
}

/// An immutable, validated recipe. Ingredients are poured in declared order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    id: String,
    ingredients: Vec<Ingredient>,
    post_add: Option<String>,
}

impl Recipe {
    pub fn new(
        id: impl Into<String>,
        ingredients: impl IntoIterator<Item = (String, f32)>,
        post_add: Option<String>,
    ) -> PourResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PourError::InvalidRecipe("empty recipe id".into()));
        }
        let mut seen = BTreeSet::new();
        let mut list = Vec::new();
        for (name, ml) in ingredients {
            if !ml.is_finite() || ml < 0.0 {
                return Err(PourError::InvalidRecipe(format!(
                    "{id}: {name} has invalid volume {ml}"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(PourError::InvalidRecipe(format!(
                    "{id}: {name} listed twice"
                )));
            }
            list.push(Ingredient { name, ml });
        }
        if list.is_empty() && post_add.is_none() {
            return Err(PourError::InvalidRecipe(format!("{id}: no ingredients")));
        }
        Ok(Self {
            id,
            ingredients: list,
            post_add,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    pub fn post_add(&self) -> Option<&str> {
        self.post_add.as_deref()
    }

    /// Sum of all pumped volumes.
    pub fn total_ml(&self) -> f32 {
        self.ingredients.iter().map(|i| i.ml).sum()
    }
}

/// Ingredient → pump slot (1..=8), one ingredient per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpMap {
    slots: BTreeMap<String, u8>,
}

impl PumpMap {
    pub fn new(slots: BTreeMap<String, u8>) -> PourResult<Self> {
        let mut owners: BTreeMap<u8, &str> = BTreeMap::new();
        for (ingredient, &slot) in &slots {
            if !(1..=PUMP_COUNT).contains(&slot) {
                return Err(PourError::InvalidPump(slot));
            }
            if let Some(prev) = owners.insert(slot, ingredient) {
                return Err(PourError::Config(format!(
                    "pump {slot} assigned to both {prev} and {ingredient}"
                )));
            }
        }
        Ok(Self { slots })
    }

    pub fn pump_for(&self, ingredient: &str) -> Option<u8> {
        self.slots.get(ingredient).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// All configured recipes, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl RecipeBook {
    pub fn new(recipes: Vec<Recipe>) -> PourResult<Self> {
        let mut ids = BTreeSet::new();
        for r in &recipes {
            if !ids.insert(r.id()) {
                return Err(PourError::InvalidRecipe(format!(
                    "recipe {} defined twice",
                    r.id()
                )));
            }
        }
        Ok(Self { recipes })
    }

    pub fn get(&self, id: &str) -> PourResult<&Recipe> {
        self.recipes
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| PourError::UnknownRecipe(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Recipes whose pumped ingredients are all mapped and, when an
    /// `enabled` set is given, all enabled. Zero-volume entries are ignored.
    pub fn available<'a>(
        &'a self,
        pumps: &'a PumpMap,
        enabled: Option<&'a BTreeSet<String>>,
    ) -> impl Iterator<Item = &'a Recipe> + 'a {
        self.recipes.iter().filter(move |r| {
            r.ingredients().iter().filter(|i| i.ml > 0.0).all(|i| {
                pumps.pump_for(&i.name).is_some()
                    && enabled.is_none_or(|set| set.contains(&i.name))
            })
        })
    }
}
