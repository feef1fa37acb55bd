use crate::errors::{AppError, AppResult};
use crate::models::{Activity, ActivityUpdate, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityField {
    Name,
    Rating,
    ReviewCount,
    Phone,
    DisplayPhone,
    Description,
    Categories,
    Location,
}

impl ActivityField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Rating => "rating",
            Self::ReviewCount => "review_count",
            Self::Phone => "phone",
            Self::DisplayPhone => "display_phone",
            Self::Description => "description",
            Self::Categories => "categories",
            Self::Location => "location",
        }
    }

    /// Fields owned by the external catalog once a record has been imported.
    pub fn locked_by_external_source(self) -> bool {
        !matches!(self, Self::Description)
    }
}

/// Fields of `update` whose values differ from `current`.
pub fn changed_fields(current: &Activity, update: &ActivityUpdate) -> Vec<ActivityField> {
    let mut changed = Vec::new();
    if update.name.as_ref().is_some_and(|name| *name != current.name) {
        changed.push(ActivityField::Name);
    }
    if update.rating.is_some_and(|rating| rating != current.rating) {
        changed.push(ActivityField::Rating);
    }
    if update.review_count.is_some_and(|count| count != current.review_count) {
        changed.push(ActivityField::ReviewCount);
    }
    if update.phone.as_ref().is_some_and(|phone| *phone != current.phone) {
        changed.push(ActivityField::Phone);
    }
    if update
        .display_phone
        .as_ref()
        .is_some_and(|phone| *phone != current.display_phone)
    {
        changed.push(ActivityField::DisplayPhone);
    }
    if update
        .description
        .as_ref()
        .is_some_and(|description| *description != current.description)
    {
        changed.push(ActivityField::Description);
    }
    if update
        .categories
        .as_ref()
        .is_some_and(|categories| *categories != current.categories)
    {
        changed.push(ActivityField::Categories);
    }
    if update
        .location
        .as_ref()
        .is_some_and(|location| current.location.as_ref() != Some(location))
    {
        changed.push(ActivityField::Location);
    }
    changed
}

/// Checks `caller_id` may apply `update` to `activity` and returns the fields
/// that actually change. Unchanged values are accepted on any record.
pub fn authorize_update(
    activity: &Activity,
    caller_id: i64,
    update: &ActivityUpdate,
) -> AppResult<Vec<ActivityField>> {
    validate_values(update)?;
    let changed = changed_fields(activity, update);

    match &activity.provenance {
        Provenance::External { catalog_id } => {
            if let Some(field) = changed
                .iter()
                .find(|field| field.locked_by_external_source())
            {
                tracing::warn!(
                    activity_id = activity.id,
                    catalog_id = %catalog_id,
                    field = field.as_str(),
                    "rejected edit of catalog-owned field"
                );
                return Err(AppError::ImmutableField(format!(
                    "{} of '{}' comes from the external catalog and cannot be changed",
                    field.as_str(),
                    activity.name
                )));
            }
        }
        Provenance::User { owner_id } => {
            if *owner_id != caller_id {
                tracing::warn!(
                    activity_id = activity.id,
                    owner_id,
                    caller_id,
                    "rejected edit by non-owner"
                );
                return Err(AppError::PermissionDenied(format!(
                    "only the owner can edit '{}'",
                    activity.name
                )));
            }
        }
    }

    Ok(changed)
}

pub fn validate_rating(rating: f64) -> AppResult<()> {
    if !(0.0..=5.0).contains(&rating) {
        return Err(AppError::InvalidInput(format!(
            "rating must be between 0 and 5, got {}",
            rating
        )));
    }
    Ok(())
}

pub fn validate_review_count(count: i64) -> AppResult<()> {
    if count < 0 {
        return Err(AppError::InvalidInput(
            "review count cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_values(update: &ActivityUpdate) -> AppResult<()> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput("an activity name cannot be empty".to_string()));
        }
    }
    if let Some(rating) = update.rating {
        validate_rating(rating)?;
    }
    if let Some(count) = update.review_count {
        validate_review_count(count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{authorize_update, ActivityField};
    use crate::errors::AppError;
    use crate::models::{Activity, ActivityUpdate, Category, Provenance};
    use chrono::Utc;

    fn activity(provenance: Provenance) -> Activity {
        Activity {
            id: 7,
            name: "Time Out Market".to_string(),
            provenance,
            rating: 4.5,
            review_count: 120,
            phone: "+351210000000".to_string(),
            display_phone: "+351 21 000 0000".to_string(),
            description: "Food hall".to_string(),
            location: None,
            categories: vec![Category {
                name: "Food Court".to_string(),
                search_name: "food_court".to_string(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn external() -> Activity {
        activity(Provenance::External {
            catalog_id: "time-out-market-lisboa".to_string(),
        })
    }

    #[test]
    fn external_rating_is_immutable() {
        let update = ActivityUpdate {
            rating: Some(3.0),
            ..ActivityUpdate::default()
        };
        let error = authorize_update(&external(), 1, &update).expect_err("locked");
        assert!(matches!(error, AppError::ImmutableField(_)));
    }

    #[test]
    fn external_description_is_editable_by_anyone() {
        let update = ActivityUpdate {
            description: Some("Go hungry".to_string()),
            ..ActivityUpdate::default()
        };
        let changed = authorize_update(&external(), 99, &update).expect("allowed");
        assert_eq!(changed, vec![ActivityField::Description]);
    }

    #[test]
    fn restating_a_locked_value_is_a_no_op() {
        let update = ActivityUpdate {
            rating: Some(4.5),
            name: Some("Time Out Market".to_string()),
            ..ActivityUpdate::default()
        };
        let changed = authorize_update(&external(), 1, &update).expect("no change");
        assert!(changed.is_empty());
    }

    #[test]
    fn owner_may_edit_every_field() {
        let owned = activity(Provenance::User { owner_id: 3 });
        let update = ActivityUpdate {
            rating: Some(2.0),
            name: Some("Market".to_string()),
            categories: Some(Vec::new()),
            ..ActivityUpdate::default()
        };
        let changed = authorize_update(&owned, 3, &update).expect("owner");
        assert_eq!(
            changed,
            vec![ActivityField::Name, ActivityField::Rating, ActivityField::Categories]
        );
    }

    #[test]
    fn other_users_are_denied() {
        let owned = activity(Provenance::User { owner_id: 3 });
        let update = ActivityUpdate {
            description: Some("mine now".to_string()),
            ..ActivityUpdate::default()
        };
        let error = authorize_update(&owned, 4, &update).expect_err("not owner");
        assert!(matches!(error, AppError::PermissionDenied(_)));
    }

    #[test]
    fn out_of_range_rating_is_invalid_input() {
        let owned = activity(Provenance::User { owner_id: 3 });
        let update = ActivityUpdate {
            rating: Some(5.5),
            ..ActivityUpdate::default()
        };
        let error = authorize_update(&owned, 3, &update).expect_err("range");
        assert!(error.is_invalid_input());
    }
}
