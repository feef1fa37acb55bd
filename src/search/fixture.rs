use super::{Business, CatalogSearch, SearchQuery, SearchSort};
use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Offline directory backed by a JSON array of business records.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    businesses: Vec<Business>,
}

impl FixtureCatalog {
    pub fn new(businesses: Vec<Business>) -> Self {
        Self { businesses }
    }

    pub fn from_path(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            AppError::ExternalService(format!(
                "cannot read catalog fixture {}: {}",
                path.to_string_lossy(),
                error
            ))
        })?;
        let businesses: Vec<Business> = serde_json::from_str(&raw).map_err(|error| {
            AppError::ExternalService(format!(
                "malformed catalog fixture {}: {}",
                path.to_string_lossy(),
                error
            ))
        })?;
        tracing::debug!(count = businesses.len(), "loaded catalog fixture");
        Ok(Self::new(businesses))
    }
}

impl CatalogSearch for FixtureCatalog {
    fn search(&self, query: &SearchQuery) -> AppResult<Vec<Business>> {
        let term = normalized(&query.term);
        let category = normalized(&query.category_filter);
        let location = normalized(&query.location);

        let mut results: Vec<Business> = self
            .businesses
            .iter()
            .filter(|business| {
                term.as_ref().map_or(true, |term| {
                    business.name.to_lowercase().contains(term)
                        || business.snippet_text.to_lowercase().contains(term)
                })
            })
            .filter(|business| {
                category.as_ref().map_or(true, |category| {
                    business.categories.iter().any(|entry| {
                        entry.name.to_lowercase() == *category || entry.search_name.to_lowercase() == *category
                    })
                })
            })
            .filter(|business| {
                location.as_ref().map_or(true, |location| {
                    business.location.city.to_lowercase() == *location
                        || business.location.postal_code.to_lowercase() == *location
                })
            })
            .cloned()
            .collect();

        match query.sort {
            Some(SearchSort::HighestRated) => {
                results.sort_by(|a, b| b.rating.total_cmp(&a.rating));
            }
            Some(SearchSort::Distance) => {
                if let Some((latitude, longitude)) = query.ll.as_deref().and_then(parse_lat_lng) {
                    results.sort_by(|a, b| {
                        squared_distance(a, latitude, longitude).total_cmp(&squared_distance(b, latitude, longitude))
                    });
                }
            }
            Some(SearchSort::BestMatched) | None => {}
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        Ok(results.into_iter().skip(offset).take(limit).collect())
    }
}

fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

fn parse_lat_lng(raw: &str) -> Option<(f64, f64)> {
    let (latitude, longitude) = raw.split_once(',')?;
    Some((latitude.trim().parse().ok()?, longitude.trim().parse().ok()?))
}

fn squared_distance(business: &Business, latitude: f64, longitude: f64) -> f64 {
    business
        .location
        .coordinate
        .map(|coordinate| {
            (coordinate.latitude - latitude).powi(2) + (coordinate.longitude - longitude).powi(2)
        })
        .unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::FixtureCatalog;
    use crate::search::{Business, CatalogSearch, SearchQuery, SearchSort};
    use std::io::Write;

    fn business(id: &str, name: &str, city: &str, rating: f64, category: &str) -> Business {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "rating": rating,
            "categories": [[category, category.to_lowercase()]],
            "location": {"city": city, "postal_code": "1000", "country_code": "PT"}
        }))
        .expect("business")
    }

    fn catalog() -> FixtureCatalog {
        FixtureCatalog::new(vec![
            business("a", "Cafe A Brasileira", "Lisboa", 3.5, "Cafes"),
            business("b", "Livraria Lello", "Porto", 4.5, "Bookstores"),
            business("c", "Cafe Majestic", "Porto", 4.0, "Cafes"),
        ])
    }

    fn ids(results: &[Business]) -> Vec<&str> {
        results.iter().map(|business| business.id.as_str()).collect()
    }

    #[test]
    fn filters_by_term_category_and_location() {
        let results = catalog()
            .search(&SearchQuery {
                term: Some("cafe".to_string()),
                location: Some("porto".to_string()),
                ..SearchQuery::default()
            })
            .expect("search");
        assert_eq!(ids(&results), vec!["c"]);

        let results = catalog()
            .search(&SearchQuery {
                category_filter: Some("cafes".to_string()),
                ..SearchQuery::default()
            })
            .expect("search");
        assert_eq!(ids(&results), vec!["a", "c"]);
    }

    #[test]
    fn highest_rated_sort_then_paging() {
        let results = catalog()
            .search(&SearchQuery {
                sort: Some(SearchSort::HighestRated),
                offset: Some(1),
                limit: Some(1),
                ..SearchQuery::default()
            })
            .expect("search");
        assert_eq!(ids(&results), vec!["c"]);
    }

    #[test]
    fn unreadable_fixture_is_an_external_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"{not json").expect("write");

        let error = FixtureCatalog::from_path(&path).expect_err("malformed");
        assert!(matches!(error, crate::errors::AppError::ExternalService(_)));
    }
}
