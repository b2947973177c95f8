//! Core data model: queries, intents, entities, backend results and the
//! per-query accumulation of synthesized text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Closed set of query intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    IngredientDiscovery,
    TrendingInsights,
    HistoricalContext,
    ComparativeAnalysis,
    MenuInnovation,
    Fallback,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::IngredientDiscovery,
        Intent::TrendingInsights,
        Intent::HistoricalContext,
        Intent::ComparativeAnalysis,
        Intent::MenuInnovation,
        Intent::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::IngredientDiscovery => "ingredient_discovery",
            Intent::TrendingInsights => "trending_insights",
            Intent::HistoricalContext => "historical_context",
            Intent::ComparativeAnalysis => "comparative_analysis",
            Intent::MenuInnovation => "menu_innovation",
            Intent::Fallback => "fallback",
        }
    }

    /// Parse a classifier label. Labels outside the closed set map to
    /// [`Intent::Fallback`]; this never fails.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .unwrap_or_else(|| {
                warn!(label = %label, "Unknown intent label, routing as fallback");
                Intent::Fallback
            })
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys recognized in an [`EntityMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    Location,
    MenuItem,
    Ingredient,
    Category,
    Price,
    Rating,
    ReviewCount,
}

impl EntityKey {
    pub const ALL: [EntityKey; 7] = [
        EntityKey::Location,
        EntityKey::MenuItem,
        EntityKey::Ingredient,
        EntityKey::Category,
        EntityKey::Price,
        EntityKey::Rating,
        EntityKey::ReviewCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKey::Location => "location",
            EntityKey::MenuItem => "menu_item",
            EntityKey::Ingredient => "ingredient_name",
            EntityKey::Category => "menu_category",
            EntityKey::Price => "price",
            EntityKey::Rating => "rating",
            EntityKey::ReviewCount => "review_count",
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured attributes extracted from a query.
///
/// Every key is always present; an unrecognized attribute is an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMap {
    pub location: BTreeSet<String>,
    pub menu_item: BTreeSet<String>,
    #[serde(rename = "ingredient_name")]
    pub ingredient: BTreeSet<String>,
    #[serde(rename = "menu_category")]
    pub category: BTreeSet<String>,
    pub price: BTreeSet<String>,
    pub rating: BTreeSet<String>,
    pub review_count: BTreeSet<String>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from loosely-typed JSON.
    ///
    /// Strings and numbers are accepted, either bare or inside arrays;
    /// anything else is ignored. Missing keys stay empty.
    pub fn from_json(value: &Value) -> Self {
        let mut entities = Self::new();
        let Some(object) = value.as_object() else {
            return entities;
        };

        for key in EntityKey::ALL {
            let terms: Vec<String> = match object.get(key.as_str()) {
                Some(Value::Array(items)) => items.iter().filter_map(term_from_value).collect(),
                Some(other) => term_from_value(other).into_iter().collect(),
                None => Vec::new(),
            };
            for term in terms {
                entities.insert(key, term);
            }
        }

        entities
    }

    pub fn get(&self, key: EntityKey) -> &BTreeSet<String> {
        match key {
            EntityKey::Location => &self.location,
            EntityKey::MenuItem => &self.menu_item,
            EntityKey::Ingredient => &self.ingredient,
            EntityKey::Category => &self.category,
            EntityKey::Price => &self.price,
            EntityKey::Rating => &self.rating,
            EntityKey::ReviewCount => &self.review_count,
        }
    }

    fn get_mut(&mut self, key: EntityKey) -> &mut BTreeSet<String> {
        match key {
            EntityKey::Location => &mut self.location,
            EntityKey::MenuItem => &mut self.menu_item,
            EntityKey::Ingredient => &mut self.ingredient,
            EntityKey::Category => &mut self.category,
            EntityKey::Price => &mut self.price,
            EntityKey::Rating => &mut self.rating,
            EntityKey::ReviewCount => &mut self.review_count,
        }
    }

    /// Insert a term, ignoring blanks.
    pub fn insert(&mut self, key: EntityKey, term: impl Into<String>) {
        let term = term.into();
        let term = term.trim();
        if !term.is_empty() {
            self.get_mut(key).insert(term.to_string());
        }
    }

    /// Builder-style insertion of several terms.
    pub fn with<I, S>(mut self, key: EntityKey, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for term in terms {
            self.insert(key, term);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        EntityKey::ALL.iter().all(|key| self.get(*key).is_empty())
    }

    /// Keys with at least one term, in key order.
    pub fn non_empty(&self) -> impl Iterator<Item = (EntityKey, &BTreeSet<String>)> {
        EntityKey::ALL
            .into_iter()
            .map(move |key| (key, self.get(key)))
            .filter(|(_, terms)| !terms.is_empty())
    }
}

fn term_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Immutable incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    entities: Option<EntityMap>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entities: None,
        }
    }

    /// Attach entities extracted ahead of time.
    pub fn with_entities(text: impl Into<String>, entities: EntityMap) -> Self {
        Self {
            text: text.into(),
            entities: Some(entities),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entities(&self) -> Option<&EntityMap> {
        self.entities.as_ref()
    }
}

/// Retrieval backend that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Structured,
    Vector,
    Graph,
    Web,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Structured,
        BackendKind::Vector,
        BackendKind::Graph,
        BackendKind::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Structured => "structured",
            BackendKind::Vector => "vector",
            BackendKind::Graph => "graph",
            BackendKind::Web => "web",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One opaque row returned by a backend.
///
/// The origin is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    origin: BackendKind,
    fields: Map<String, Value>,
}

impl Record {
    pub fn new(origin: BackendKind, fields: Map<String, Value>) -> Self {
        Self { origin, fields }
    }

    pub fn origin(&self) -> BackendKind {
        self.origin
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Single-line `key: value` rendering in key order.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Records returned by one backend call, tagged with their origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    origin: BackendKind,
    records: Vec<Record>,
}

impl ResultSet {
    /// Build a result set from raw rows; every record takes `origin`.
    pub fn new(origin: BackendKind, rows: impl IntoIterator<Item = Map<String, Value>>) -> Self {
        Self {
            origin,
            records: rows
                .into_iter()
                .map(|fields| Record::new(origin, fields))
                .collect(),
        }
    }

    pub fn empty(origin: BackendKind) -> Self {
        Self {
            origin,
            records: Vec::new(),
        }
    }

    pub fn origin(&self) -> BackendKind {
        self.origin
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Synthesized text attributed to the backend it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceText {
    pub source: BackendKind,
    pub text: String,
}

/// Ordered per-source text collected while answering one query.
///
/// Entries keep consultation order and are never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccumulatedResponse {
    entries: Vec<SourceText>,
}

impl AccumulatedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new accumulation with `text` appended.
    #[must_use]
    pub fn appended(mut self, source: BackendKind, text: impl Into<String>) -> Self {
        self.entries.push(SourceText {
            source,
            text: text.into(),
        });
        self
    }

    pub fn entries(&self) -> &[SourceText] {
        &self.entries
    }

    pub fn sources(&self) -> Vec<BackendKind> {
        self.entries.iter().map(|entry| entry.source).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Texts joined by a blank line, in accumulation order.
    pub fn joined(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
