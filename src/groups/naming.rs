use crate::error::GroupError;

/// Names nobody may create.
const RESERVED_NAMES: &[&str] = &["guests", "spiders"];

/// Whether `name` is a privilege group: `cid:{id}:privileges:{privilege}`,
/// where `{id}` is a (possibly negative) category id or `admin`.
pub fn is_privilege_group(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("cid:") else {
        return false;
    };
    let Some((cid, tail)) = rest.split_once(':') else {
        return false;
    };
    let digits = cid.strip_prefix('-').unwrap_or(cid);
    let cid_ok = cid == "admin" || (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
    let Some(privilege) = tail.strip_prefix("privileges:") else {
        return false;
    };
    cid_ok
        && !privilege.is_empty()
        && privilege
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

/// URL slug for a group name: lowercase, words joined by `-`, punctuation dropped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.extend(c.to_lowercase());
        } else if (c.is_whitespace() || c == '-') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Check a name before creating a group with it.
pub fn validate_group_name(name: &str, max_len: usize) -> Result<(), GroupError> {
    if name.trim().is_empty() || RESERVED_NAMES.contains(&name) {
        return Err(GroupError::InvalidGroupName(name.to_string()));
    }
    if is_privilege_group(name) {
        return Ok(());
    }
    if name.chars().count() > max_len {
        return Err(GroupError::GroupNameTooLong(name.to_string()));
    }
    if name.contains('/') || slugify(name).is_empty() {
        return Err(GroupError::InvalidGroupName(name.to_string()));
    }
    Ok(())
}
