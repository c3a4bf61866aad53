#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Source and target locations are the same.")]
    SameLocation,
    #[error("Location {0} is not available.")]
    UnknownLocation(String),
    #[error("At least two configured locations are required.")]
    NotEnoughLocations,
}

/// Pre-flight check on the submitted location ids, run before they are
/// resolved and before any job is created.
pub fn validate_locations(source_id: &str, target_id: &str) -> Result<(), ValidationError> {
    if source_id == target_id {
        return Err(ValidationError::SameLocation);
    }
    Ok(())
}
