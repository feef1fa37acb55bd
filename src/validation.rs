use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_LETTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]").expect("valid leading letter regex"));

const RESERVED_TAG_TOKENS: [&str; 2] = ["AND", "OR"];

/// A user-typed reference to a tag or trip: names start with a letter, anything else is an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Name(String),
    Id(i64),
}

impl Identifier {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("an identifier cannot be empty".to_string()));
        }
        if LEADING_LETTER_RE.is_match(trimmed) {
            return Ok(Self::Name(trimmed.to_string()));
        }
        trimmed
            .parse::<i64>()
            .map(Self::Id)
            .map_err(|_| {
                AppError::InvalidInput(format!(
                    "'{}' is neither a name starting with a letter nor an integer id",
                    trimmed
                ))
            })
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Trip and tag names must start with a letter so they never collide with ids.
pub fn check_entity_name(name: &str) -> AppResult<()> {
    if !LEADING_LETTER_RE.is_match(name) {
        return Err(AppError::InvalidInput(
            "you must start the name with a letter".to_string(),
        ));
    }
    if name.trim_end() != name {
        return Err(AppError::InvalidInput(
            "a name cannot end with whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Tag names feed the filter expression grammar, so the separators and the
/// operators themselves are reserved.
pub fn check_tag_name(name: &str) -> AppResult<()> {
    if name.contains('(') || name.contains(')') {
        return Err(AppError::InvalidInput(
            "( and ) are not legal characters in a tag name".to_string(),
        ));
    }
    if name.contains(',') {
        return Err(AppError::InvalidInput(
            ", is not a legal character in a tag name".to_string(),
        ));
    }
    for token in name.split_whitespace() {
        if RESERVED_TAG_TOKENS.contains(&token) {
            return Err(AppError::InvalidInput(format!(
                "{} cannot be a component of a tag name (use '{}' instead)",
                token,
                token.to_lowercase()
            )));
        }
    }
    Ok(())
}

pub fn check_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::InvalidInput("a username cannot be empty".to_string()));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidInput(
            "a username cannot contain spaces".to_string(),
        ));
    }
    Ok(())
}

pub fn check_display_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("a name cannot be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_entity_name, check_tag_name, check_username, Identifier};

    #[test]
    fn tag_grammar_rejects_reserved_characters_and_tokens() {
        for bad in ["(museum", "art)", "food,drink", "cheap AND cheerful", "OR", "this OR that"] {
            let error = check_tag_name(bad).expect_err(bad);
            assert!(error.is_invalid_input(), "{bad}");
        }
    }

    #[test]
    fn tag_grammar_is_case_sensitive_and_token_based() {
        for good in ["cheap and cheerful", "or", "ANDROID", "ORbit tour", "rainy day"] {
            check_tag_name(good).expect(good);
        }
    }

    #[test]
    fn entity_names_must_start_with_a_letter() {
        check_entity_name("Rome 2025").expect("letter first");
        assert!(check_entity_name("2025 Rome").is_err());
        assert!(check_entity_name("").is_err());
    }

    #[test]
    fn entity_names_reject_trailing_whitespace() {
        let error = check_entity_name("Rome ").expect_err("trailing space");
        assert!(error.is_invalid_input());
        assert!(check_entity_name("Rome\t").is_err());
        assert!(check_entity_name(" Rome").is_err());
    }

    #[test]
    fn identifiers_split_names_from_ids() {
        assert_eq!(Identifier::parse("museums").expect("name"), Identifier::Name("museums".to_string()));
        assert_eq!(Identifier::parse(" 42 ").expect("id"), Identifier::Id(42));
        assert!(Identifier::parse("4x").is_err());
        assert!(Identifier::parse("  ").is_err());
    }

    #[test]
    fn usernames_cannot_contain_spaces() {
        check_username("alice").expect("plain");
        assert!(check_username("alice smith").is_err());
        assert!(check_username("").is_err());
    }
}
