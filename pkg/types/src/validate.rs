use anyhow::{Result, bail};

/// Validate a name that becomes part of object names and label values.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a replset member count.
pub fn validate_size(size: i32) -> Result<()> {
    if size < 1 {
        bail!("replset size must be at least 1 (got {})", size);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("rs0").is_ok());
        assert!(validate_name("my-cluster").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("RS0").is_err());
        assert!(validate_name("rs_0").is_err());
        assert!(validate_name("-rs").is_err());
        assert!(validate_name("rs-").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn sizes() {
        assert!(validate_size(1).is_ok());
        assert!(validate_size(3).is_ok());
        assert!(validate_size(0).is_err());
        assert!(validate_size(-1).is_err());
    }
}
