pub mod fixture;

use crate::errors::AppResult;
use crate::models::{Category, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use fixture::FixtureCatalog;

/// External business directory. Implementations translate their own failures
/// into `AppError::ExternalService`.
pub trait CatalogSearch: Send + Sync {
    fn search(&self, query: &SearchQuery) -> AppResult<Vec<Business>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchSort {
    BestMatched,
    Distance,
    HighestRated,
}

impl SearchSort {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::BestMatched => "0",
            Self::Distance => "1",
            Self::HighestRated => "2",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub category_filter: Option<String>,
    pub location: Option<String>,
    pub term: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<SearchSort>,
    /// Metres.
    pub radius_filter: Option<u32>,
    pub deals_filter: Option<bool>,
    pub cc: Option<String>,
    pub lang: Option<String>,
    pub bounds: Option<String>,
    pub ll: Option<String>,
    pub cll: Option<String>,
}

impl SearchQuery {
    /// Request parameters as the directory expects them. Language filtering is
    /// always on and the offset always present.
    pub fn to_params(&self, default_lang: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|value| !value.is_empty()) {
                params.insert(key.to_string(), value);
            }
        };

        put("category_filter", self.category_filter.clone());
        put("location", self.location.clone());
        put("term", self.term.clone());
        put("limit", self.limit.map(|limit| limit.to_string()));
        put("sort", self.sort.map(|sort| sort.as_param().to_string()));
        put("radius_filter", self.radius_filter.map(|radius| radius.to_string()));
        put("deals_filter", self.deals_filter.map(|deals| deals.to_string()));
        put("cc", self.cc.clone());
        put("bounds", self.bounds.clone());
        put("ll", self.ll.clone());
        put("cll", self.cll.clone());
        put(
            "lang",
            Some(self.lang.clone().unwrap_or_else(|| default_lang.to_string())),
        );
        put("lang_filter", Some("true".to_string()));
        put("offset", Some(self.offset.unwrap_or(0).to_string()));
        params
    }
}

/// One business record from the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub display_phone: String,
    #[serde(default)]
    pub snippet_text: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub categories: Vec<Category>,
}

const MAX_RATING: f64 = 5.0;

impl Business {
    /// One star per whole rating point, a trailing `.` for a fractional remainder.
    /// Ratings outside 0..=5 are clamped.
    pub fn rating_stars(&self) -> String {
        let rating = self.rating.clamp(0.0, MAX_RATING);
        let whole = rating.floor();
        let mut stars = "*".repeat(whole as usize);
        if whole < rating {
            stars.push('.');
        }
        stars
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}\t{}  (number of reviews: {})",
            self.rating_stars(),
            self.name,
            self.review_count
        )
    }
}

/// A cached search result as listed back to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchCacheEntry {
    pub index: usize,
    pub summary: String,
    pub business: Business,
}

impl SearchCacheEntry {
    pub fn list(results: &[Business]) -> Vec<Self> {
        results
            .iter()
            .enumerate()
            .map(|(index, business)| Self {
                index,
                summary: business.summary_line(),
                business: business.clone(),
            })
            .collect()
    }
}
