//! Input validation for migration submissions.
//!
//! Patterns mirror the upstream catalog's dataset/block name grammar: a
//! dataset is `/primary/processed/tier`, a block additionally carries a
//! `#<suffix>` hash.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DATASET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(\*|[a-zA-Z\*][a-zA-Z0-9_\*\-]{0,100})(/(\*|[a-zA-Z0-9_.\-\*]{1,199}))?(/(\*|[A-Z\-\*]{1,50}))?$")
        .expect("dataset pattern is valid")
});

static BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(\*|[a-zA-Z\*][a-zA-Z0-9_\*\-]{0,100})(/(\*|[a-zA-Z0-9_.\-\*]{1,199}))?(/(\*|[A-Z\-\*]{1,50}))?#[a-zA-Z0-9.\-_]+$")
        .expect("block pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("'{0}' does not match the dataset name pattern")]
    BadDataset(String),
    #[error("'{0}' does not match the block name pattern")]
    BadBlock(String),
    #[error("'{0}' is neither a valid dataset nor a valid block name")]
    BadInput(String),
    #[error("'{0}' must not be empty")]
    Empty(&'static str),
}

/// A migration input is block-shaped iff it contains a `#`.
pub fn is_block_name(input: &str) -> bool {
    input.contains('#')
}

pub fn validate_dataset(name: &str) -> Result<(), ValidationError> {
    if DATASET_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::BadDataset(name.to_string()))
    }
}

pub fn validate_block(name: &str) -> Result<(), ValidationError> {
    if BLOCK_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::BadBlock(name.to_string()))
    }
}

/// Validate a migration `input`, dispatching on whether it names a block or a dataset.
pub fn validate_migration_input(input: &str) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::Empty("migration_input"));
    }
    if is_block_name(input) {
        validate_block(input).map_err(|_| ValidationError::BadInput(input.to_string()))
    } else {
        validate_dataset(input).map_err(|_| ValidationError::BadInput(input.to_string()))
    }
}

pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::Empty("migration_url"));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::BadInput(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_block_name() {
        assert!(validate_migration_input("/A/B/C#1").is_ok());
    }

    #[test]
    fn accepts_well_formed_dataset_name() {
        assert!(validate_migration_input("/A/B/C").is_ok());
    }

    #[test]
    fn rejects_missing_leading_slash() {
        assert!(validate_migration_input("A/B/C#1").is_err());
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(
            validate_migration_input(""),
            Err(ValidationError::Empty("migration_input"))
        );
    }

    #[test]
    fn block_dispatch_matches_hash_presence() {
        assert!(is_block_name("/A/B/C#1"));
        assert!(!is_block_name("/A/B/C"));
    }
}
