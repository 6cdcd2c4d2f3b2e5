//! Food-carbohydrate library and meal composition.
//!
//! The built-in library covers everyday staples; meals are composed from
//! weighed portions and carry their computed carb totals into the journal.

use crate::calculator::round_tenth;
use crate::types::{Meal, MealSlot, Portion};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Food category for browsing and search
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    Fruit,
    Vegetable,
    Starch,
    Dairy,
    Bakery,
    Drink,
    Sweet,
    Other,
}

/// One food with its carbohydrate density
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: String,
    pub name: String,
    pub category: FoodCategory,
    pub carbs_per_100g: f64,
}

impl FoodItem {
    /// Carbohydrate grams in a weighed portion
    pub fn carbs_for(&self, weight_g: f64) -> f64 {
        self.carbs_per_100g * weight_g / 100.0
    }
}

/// The complete food library
#[derive(Clone, Debug)]
pub struct FoodLibrary {
    pub foods: HashMap<String, FoodItem>,
}

/// Cached default library - built once and reused across all operations
static DEFAULT_FOODS: Lazy<FoodLibrary> = Lazy::new(build_default_foods_internal);

/// Get a reference to the cached default food library
pub fn get_default_foods() -> &'static FoodLibrary {
    &DEFAULT_FOODS
}

/// Builds the default library of built-in foods
pub fn build_default_foods() -> FoodLibrary {
    build_default_foods_internal()
}

fn build_default_foods_internal() -> FoodLibrary {
    let mut foods = HashMap::new();

    let mut add = |id: &str, name: &str, category: FoodCategory, carbs: f64| {
        foods.insert(
            id.to_string(),
            FoodItem {
                id: id.to_string(),
                name: name.to_string(),
                category,
                carbs_per_100g: carbs,
            },
        );
    };

    add("apple", "Apple", FoodCategory::Fruit, 14.0);
    add("banana", "Banana", FoodCategory::Fruit, 20.0);
    add("orange", "Orange", FoodCategory::Fruit, 12.0);
    add("carrot", "Carrot", FoodCategory::Vegetable, 7.0);
    add("green_beans", "Green beans", FoodCategory::Vegetable, 4.0);
    add("potato_boiled", "Potato (boiled)", FoodCategory::Starch, 17.0);
    add("rice_cooked", "Rice (cooked)", FoodCategory::Starch, 28.0);
    add("pasta_cooked", "Pasta (cooked)", FoodCategory::Starch, 26.0);
    add("white_bread", "White bread", FoodCategory::Bakery, 49.0);
    add("baguette", "Baguette", FoodCategory::Bakery, 56.0);
    add("croissant", "Croissant", FoodCategory::Bakery, 45.0);
    add("milk_whole", "Whole milk", FoodCategory::Dairy, 5.0);
    add("yogurt_plain", "Plain yogurt", FoodCategory::Dairy, 5.0);
    add("orange_juice", "Orange juice", FoodCategory::Drink, 10.0);
    add("dark_chocolate", "Dark chocolate", FoodCategory::Sweet, 46.0);
    add("strawberry_jam", "Strawberry jam", FoodCategory::Sweet, 60.0);

    FoodLibrary { foods }
}

impl FoodLibrary {
    /// Look up a food by ID
    pub fn get(&self, id: &str) -> Option<&FoodItem> {
        self.foods.get(id)
    }

    /// All foods sorted by ID for deterministic listing
    pub fn sorted(&self) -> Vec<&FoodItem> {
        let mut items: Vec<_> = self.foods.values().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Case-insensitive search over food names and IDs
    pub fn search(&self, term: &str) -> Vec<&FoodItem> {
        let needle = term.to_lowercase();
        self.sorted()
            .into_iter()
            .filter(|f| f.name.to_lowercase().contains(&needle) || f.id.contains(&needle))
            .collect()
    }

    /// Validate the library for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, food) in &self.foods {
            if id.is_empty() || food.id.is_empty() {
                errors.push("Food has empty ID".to_string());
            }
            if id != &food.id {
                errors.push(format!(
                    "Food key '{}' doesn't match food.id '{}'",
                    id, food.id
                ));
            }
            if food.name.is_empty() {
                errors.push(format!("Food '{}' has empty name", id));
            }
            if !(0.0..=100.0).contains(&food.carbs_per_100g) {
                errors.push(format!(
                    "Food '{}' has carbs per 100 g outside 0-100 ({})",
                    id, food.carbs_per_100g
                ));
            }
        }

        errors
    }
}

/// Compose a meal record from weighed portions of library foods
///
/// Per-portion and total carbs are rounded to one decimal. Fails on an
/// unknown food ID so a typo never silently drops carbs from the total.
pub fn compose_meal(
    library: &FoodLibrary,
    slot: MealSlot,
    eaten_at: DateTime<Utc>,
    items: &[(String, f64)],
) -> Result<Meal> {
    let mut portions = Vec::with_capacity(items.len());
    let mut total = 0.0;

    for (food_id, weight_g) in items {
        let food = library
            .get(food_id)
            .ok_or_else(|| Error::Food(format!("Unknown food '{}'", food_id)))?;
        if *weight_g < 0.0 {
            return Err(Error::Food(format!(
                "Negative weight {} g for '{}'",
                weight_g, food_id
            )));
        }
        let carbs_g = round_tenth(food.carbs_for(*weight_g));
        total += carbs_g;
        portions.push(Portion {
            food_id: food_id.clone(),
            weight_g: *weight_g,
            carbs_g,
        });
    }

    Ok(Meal {
        id: Uuid::new_v4(),
        eaten_at,
        slot,
        portions,
        total_carbs_g: round_tenth(total),
    })
}
