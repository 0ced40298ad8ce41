//! Small shared utilities.

pub mod jsonc;
pub mod time;

/// Split an identifier like `TEAM-123` into its prefix and numeric suffix.
///
/// Returns `None` when the identifier does not have the `<PREFIX>-<N>` shape.
#[must_use]
pub fn split_identifier(identifier: &str) -> Option<(&str, u64)> {
    let (prefix, digits) = identifier.rsplit_once('-')?;
    if prefix.is_empty() {
        return None;
    }
    let number = digits.parse::<u64>().ok()?;
    Some((prefix, number))
}

/// Natural ordering for public identifiers: prefix lexicographically, then
/// the numeric suffix numerically, so `TEAM-2` sorts before `TEAM-10`.
/// Identifiers without the canonical shape sort after canonical ones, by
/// plain string order.
#[must_use]
pub fn identifier_sort_key(identifier: &str) -> (u8, String, u64, String) {
    match split_identifier(identifier) {
        Some((prefix, number)) => (0, prefix.to_string(), number, String::new()),
        None => (1, String::new(), 0, identifier.to_string()),
    }
}

/// Validate the shape of a user-supplied issue identifier.
///
/// # Errors
///
/// Returns `LbError::InvalidId` when the value is not `<PREFIX>-<N>`.
pub fn validate_identifier(identifier: &str) -> crate::error::Result<()> {
    if split_identifier(identifier).is_some() {
        Ok(())
    } else {
        Err(crate::error::LbError::InvalidId {
            id: identifier.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("TEAM-123"), Some(("TEAM", 123)));
        assert_eq!(split_identifier("LOCAL-7"), Some(("LOCAL", 7)));
        assert_eq!(split_identifier("pending"), None);
        assert_eq!(split_identifier("-12"), None);
        assert_eq!(split_identifier("TEAM-"), None);
        assert_eq!(split_identifier("TEAM-x1"), None);
    }

    #[test]
    fn test_natural_order() {
        let mut ids = vec!["TEAM-10", "TEAM-2", "ACME-5", "pending", "TEAM-1"];
        ids.sort_by_key(|id| identifier_sort_key(id));
        assert_eq!(ids, vec!["ACME-5", "TEAM-1", "TEAM-2", "TEAM-10", "pending"]);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("TEAM-1").is_ok());
        assert!(validate_identifier("nope").is_err());
    }
}
