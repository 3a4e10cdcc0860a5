//! Category field validation.
//!
//! Categories are private to the user who made them; a task may carry one
//! of its creator's categories.

/// Longest accepted category name, after trimming.
pub const MAX_CATEGORY_NAME_LEN: usize = 50;

/// Longest accepted category description, after trimming.
pub const MAX_CATEGORY_DESCRIPTION_LEN: usize = 200;

/// Trims and checks a category name.
///
/// # Errors
///
/// Returns a message if the name is blank or too long.
pub fn validate_category_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("category name is required".to_string());
    }
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(format!(
            "category name must be at most {MAX_CATEGORY_NAME_LEN} characters"
        ));
    }
    Ok(name.to_string())
}

/// Trims and checks a category description.
///
/// # Errors
///
/// Returns a message if the description is too long.
pub fn validate_category_description(raw: &str) -> Result<String, String> {
    let description = raw.trim();
    if description.chars().count() > MAX_CATEGORY_DESCRIPTION_LEN {
        return Err(format!(
            "category description must be at most {MAX_CATEGORY_DESCRIPTION_LEN} characters"
        ));
    }
    Ok(description.to_string())
}
