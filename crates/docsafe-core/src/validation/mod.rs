//! Input validation shared by storage and queue entry points.
//!
//! Every check here runs before any backend call.

use crate::error::AppError;

/// Longest identifier accepted for tenants, documents, versions and folders.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Validate an identifier that becomes one segment of a storage key.
///
/// Rejects empty values, path separators, traversal segments and control
/// characters so a single identifier can never address another key.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }

    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(AppError::Validation(format!(
            "{} exceeds maximum length of {} characters",
            field, MAX_IDENTIFIER_LENGTH
        )));
    }

    if value == "." || value == ".." {
        return Err(AppError::Validation(format!(
            "{} must not be a relative path segment",
            field
        )));
    }

    if value.contains('/') || value.contains('\\') {
        return Err(AppError::Validation(format!(
            "{} must not contain path separators",
            field
        )));
    }

    if value.chars().any(|c| c.is_control()) {
        return Err(AppError::Validation(format!(
            "{} must not contain control characters",
            field
        )));
    }

    Ok(())
}

/// Validate that a storage path is non-empty and cannot escape its area.
pub fn validate_storage_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::Validation(
            "storage path must not be empty".to_string(),
        ));
    }

    if path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return Err(AppError::Validation(format!(
            "storage path is not allowed: {}",
            path
        )));
    }

    if path.split('/').any(|segment| segment.is_empty()) {
        return Err(AppError::Validation(format!(
            "storage path contains an empty segment: {}",
            path
        )));
    }

    Ok(())
}

/// Validate a content type of the `type/subtype` form.
pub fn validate_content_type(content_type: &str) -> Result<(), AppError> {
    let mut parts = content_type.splitn(2, '/');
    let kind = parts.next().unwrap_or_default().trim();
    let subtype = parts.next().unwrap_or_default().trim();
    if kind.is_empty() || subtype.is_empty() {
        return Err(AppError::Validation(format!(
            "content type must be of the form type/subtype: {:?}",
            content_type
        )));
    }
    Ok(())
}
