//! Tabular menu dataset backend.
//!
//! The dataset is a CSV file with one row per (restaurant, menu item,
//! ingredient). It is loaded once; searches filter rows by the query's
//! entities and aggregate the matches into one record per restaurant.

use crate::error::Result;
use crate::traits::{RetrievalBackend, SearchRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tablesage_core::{BackendKind, EntityKey, EntityMap, ResultSet, TableSageError};
use tracing::{debug, info};

/// One dataset row. Unparseable numeric cells are treated as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuRow {
    pub restaurant_name: Option<String>,
    pub menu_item: Option<String>,
    pub menu_description: Option<String>,
    pub menu_category: Option<String>,
    pub categories: Option<String>,
    pub ingredient_name: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub review_count: Option<f64>,
    pub price: Option<String>,
}

impl MenuRow {
    fn text_cells(&self) -> impl Iterator<Item = &str> {
        [
            &self.restaurant_name,
            &self.menu_item,
            &self.menu_description,
            &self.menu_category,
            &self.categories,
            &self.ingredient_name,
            &self.address1,
            &self.city,
            &self.zip_code,
            &self.country,
            &self.state,
            &self.price,
        ]
        .into_iter()
        .filter_map(|cell| cell.as_deref())
    }

    /// True when any cell contains any of `terms` (already lowercased).
    fn contains_any(&self, terms: &[String]) -> bool {
        self.text_cells().any(|cell| {
            let cell = cell.to_lowercase();
            terms.iter().any(|term| cell.contains(term.as_str()))
        })
    }
}

pub struct TabularBackend {
    rows: Vec<MenuRow>,
}

impl TabularBackend {
    /// Load the dataset from a CSV file.
    pub fn from_path(path: &Path) -> tablesage_core::Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            TableSageError::dataset(format!("cannot open {}: {}", path.display(), e))
        })?;
        let backend = Self::from_reader(file)?;
        info!(path = %path.display(), rows = backend.len(), "Loaded menu dataset");
        Ok(backend)
    }

    pub fn from_reader<R: Read>(reader: R) -> tablesage_core::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (line, result) in csv_reader.deserialize::<MenuRow>().enumerate() {
            let row = result
                .map_err(|e| TableSageError::dataset(format!("row {}: {}", line + 1, e)))?;
            if row
                .restaurant_name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty())
            {
                rows.push(row);
            }
        }

        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<MenuRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching the entity filters. Without any filterable entity
    /// nothing matches.
    pub fn filter<'a>(&'a self, entities: &EntityMap) -> Vec<&'a MenuRow> {
        let locations = lowered(entities, EntityKey::Location);
        let items = lowered(entities, EntityKey::MenuItem);
        let ingredients = lowered(entities, EntityKey::Ingredient);
        let categories = lowered(entities, EntityKey::Category);

        if locations.is_empty() && items.is_empty() && ingredients.is_empty() && categories.is_empty()
        {
            return Vec::new();
        }

        self.rows
            .iter()
            .filter(|row| {
                locations.is_empty()
                    || row
                        .city
                        .as_deref()
                        .is_some_and(|city| locations.contains(&city.trim().to_lowercase()))
            })
            .filter(|row| items.is_empty() || row.contains_any(&items))
            .filter(|row| ingredients.is_empty() || row.contains_any(&ingredients))
            .filter(|row| {
                categories.is_empty()
                    || row.menu_category.as_deref().is_some_and(|category| {
                        let category = category.to_lowercase();
                        categories.iter().any(|term| category.contains(term.as_str()))
                    })
            })
            .collect()
    }
}

fn lowered(entities: &EntityMap, key: EntityKey) -> Vec<String> {
    entities
        .get(key)
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

#[derive(Default)]
struct RestaurantSummary {
    menu_items: BTreeSet<String>,
    descriptions: BTreeSet<String>,
    menu_categories: BTreeSet<String>,
    cuisines: BTreeSet<String>,
    ingredients: BTreeSet<String>,
    prices: BTreeSet<String>,
    address1: Option<String>,
    city: Option<String>,
    zip_code: Option<String>,
    country: Option<String>,
    state: Option<String>,
    rating_sum: f64,
    rating_count: usize,
    review_count: f64,
}

impl RestaurantSummary {
    fn add(&mut self, row: &MenuRow) {
        collect(&mut self.menu_items, &row.menu_item);
        collect(&mut self.descriptions, &row.menu_description);
        collect(&mut self.menu_categories, &row.menu_category);
        collect(&mut self.cuisines, &row.categories);
        collect(&mut self.ingredients, &row.ingredient_name);
        collect(&mut self.prices, &row.price);

        first(&mut self.address1, &row.address1);
        first(&mut self.city, &row.city);
        first(&mut self.zip_code, &row.zip_code);
        first(&mut self.country, &row.country);
        first(&mut self.state, &row.state);

        if let Some(rating) = row.rating {
            self.rating_sum += rating;
            self.rating_count += 1;
        }
        self.review_count += row.review_count.unwrap_or(0.0);
    }

    fn into_fields(self, name: String) -> Map<String, Value> {
        let rating = if self.rating_count > 0 {
            json!(self.rating_sum / self.rating_count as f64)
        } else {
            Value::Null
        };

        let mut fields = Map::new();
        fields.insert("restaurant_name".into(), json!(name));
        fields.insert("menu_item".into(), json!(self.menu_items));
        fields.insert("menu_description".into(), json!(self.descriptions));
        fields.insert("menu_category".into(), json!(self.menu_categories));
        fields.insert("categories".into(), json!(self.cuisines));
        fields.insert("ingredient_name".into(), json!(self.ingredients));
        fields.insert("address1".into(), json!(self.address1));
        fields.insert("city".into(), json!(self.city));
        fields.insert("zip_code".into(), json!(self.zip_code));
        fields.insert("country".into(), json!(self.country));
        fields.insert("state".into(), json!(self.state));
        fields.insert("rating".into(), rating);
        fields.insert("review_count".into(), json!(self.review_count));
        fields.insert("price".into(), json!(self.prices));
        fields
    }
}

fn collect(set: &mut BTreeSet<String>, cell: &Option<String>) {
    if let Some(value) = cell.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        set.insert(value.to_string());
    }
}

fn first(slot: &mut Option<String>, cell: &Option<String>) {
    if slot.is_none() {
        *slot = cell
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }
}

/// Group rows per restaurant, in restaurant name order.
pub fn aggregate<'a>(rows: impl IntoIterator<Item = &'a MenuRow>) -> Vec<Map<String, Value>> {
    let mut restaurants: BTreeMap<String, RestaurantSummary> = BTreeMap::new();
    for row in rows {
        let Some(name) = row.restaurant_name.as_deref().map(str::trim) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        restaurants.entry(name.to_string()).or_default().add(row);
    }

    restaurants
        .into_iter()
        .map(|(name, summary)| summary.into_fields(name))
        .collect()
}

#[async_trait]
impl RetrievalBackend for TabularBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        let matches = self.filter(request.entities);
        let records = aggregate(matches.iter().copied());
        debug!(
            matched_rows = matches.len(),
            restaurants = records.len(),
            "Structured search complete"
        );
        Ok(ResultSet::new(BackendKind::Structured, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesage_core::Intent;

    const DATASET: &str = "\
restaurant_name,menu_item,menu_description,menu_category,categories,ingredient_name,address1,city,zip_code,country,state,rating,review_count,price
Luigi's,Margherita Pizza,Classic pie,Pizza,Italian,gluten-free crust,1 Main St,New York,10001,US,NY,4.5,100,$$
Luigi's,Margherita Pizza,Classic pie,Pizza,Italian,basil,1 Main St,New York,10001,US,NY,4.0,50,$$
Green Leaf,Vegan Bowl,Quinoa and greens,Bowls,Vegan,quinoa,9 Elm St,New York,10002,US,NY,4.8,20,$
Bay Slice,Pepperoni Pizza,Spicy,Pizza,Italian,pepperoni,5 Bay Rd,San Francisco,94105,US,CA,n/a,10,$$
,Orphan Dish,No owner,Misc,Misc,salt,,New York,,,,3.0,1,$
";

    fn backend() -> TabularBackend {
        TabularBackend::from_reader(DATASET.as_bytes()).unwrap()
    }

    #[test]
    fn test_rows_without_restaurant_are_dropped() {
        assert_eq!(backend().len(), 4);
    }

    #[test]
    fn test_filter_requires_a_term() {
        assert!(backend().filter(&EntityMap::new()).is_empty());
        let price_only = EntityMap::new().with(EntityKey::Price, ["cheap"]);
        assert!(backend().filter(&price_only).is_empty());
    }

    #[test]
    fn test_location_then_item_then_ingredient() {
        let backend = backend();
        let entities = EntityMap::new()
            .with(EntityKey::Location, ["new york"])
            .with(EntityKey::MenuItem, ["pizza"])
            .with(EntityKey::Ingredient, ["gluten-free"]);

        let rows = backend.filter(&entities);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].restaurant_name.as_deref(), Some("Luigi's"));
    }

    #[test]
    fn test_item_terms_match_any_field() {
        let backend = backend();
        let entities = EntityMap::new().with(EntityKey::MenuItem, ["vegan"]);
        let rows = backend.filter(&entities);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].restaurant_name.as_deref(), Some("Green Leaf"));
    }

    #[test]
    fn test_aggregation_per_restaurant() {
        let backend = backend();
        let entities = EntityMap::new().with(EntityKey::Category, ["pizza"]);
        let records = aggregate(backend.filter(&entities));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["restaurant_name"], json!("Bay Slice"));
        assert_eq!(records[0]["rating"], Value::Null);

        let luigis = &records[1];
        assert_eq!(luigis["menu_item"], json!(["Margherita Pizza"]));
        assert_eq!(luigis["ingredient_name"], json!(["basil", "gluten-free crust"]));
        assert_eq!(luigis["city"], json!("New York"));
        assert_eq!(luigis["rating"], json!(4.25));
        assert_eq!(luigis["review_count"], json!(150.0));
    }

    #[tokio::test]
    async fn test_search_returns_structured_records() {
        let backend = backend();
        let entities = EntityMap::new().with(EntityKey::Location, ["San Francisco"]);
        let request = SearchRequest::new("pizza in sf", Intent::IngredientDiscovery, &entities);

        let results = backend.search(&request).await.unwrap();
        assert_eq!(results.origin(), BackendKind::Structured);
        assert_eq!(results.len(), 1);
        assert_eq!(results.records()[0].get_str("restaurant_name"), Some("Bay Slice"));

        let nowhere = EntityMap::new().with(EntityKey::Location, ["Paris"]);
        let request = SearchRequest::new("pizza in paris", Intent::IngredientDiscovery, &nowhere);
        assert!(backend.search(&request).await.unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_dataset_error() {
        let result = TabularBackend::from_path(Path::new("/nonexistent/menu.csv"));
        assert!(matches!(result, Err(TableSageError::Dataset(_))));
    }
}
