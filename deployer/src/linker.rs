//! Link-time substitution of library addresses into template bytecode
//!
//! The compiler leaves a fixed-width placeholder in the bytecode wherever an
//! external library is called. The placeholder is `__$`, followed by the first
//! 34 hex digits of `keccak256("<source>:<library>")`, followed by `$__`. At 40
//! characters it is exactly as wide as the hex form of the address that
//! replaces it.

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address};

use crate::{
    constants::{PLACEHOLDER_HASH_LEN, PLACEHOLDER_LEN, PLACEHOLDER_PREFIX, PLACEHOLDER_SUFFIX},
    errors::DeployError,
};

/// A placeholder found in a template, along with the address it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlaceholder {
    /// The placeholder token, delimiters included
    pub token: String,
    /// The address substituted for the token, once known
    pub resolved_address: Option<Address>,
}

impl LinkPlaceholder {
    /// An unresolved placeholder for the given token
    fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            resolved_address: None,
        }
    }
}

/// Compute the placeholder the compiler emits for a library, given its fully
/// qualified name, e.g. `contracts/util/SignatureChecker.sol:SignatureChecker`
pub fn placeholder_for(fully_qualified_name: &str) -> String {
    let hash = hex::encode(keccak256(fully_qualified_name.as_bytes()));
    format!(
        "{PLACEHOLDER_PREFIX}{}{PLACEHOLDER_SUFFIX}",
        &hash[..PLACEHOLDER_HASH_LEN]
    )
}

/// Find the distinct placeholders in a template, in order of first appearance
pub fn scan_placeholders(template: &str) -> Result<Vec<LinkPlaceholder>, DeployError> {
    let mut placeholders: Vec<LinkPlaceholder> = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = template[cursor..].find(PLACEHOLDER_PREFIX) {
        let offset = cursor + rel;
        let token = parse_token(template, offset)?;
        if !placeholders.iter().any(|p| p.token == token) {
            placeholders.push(LinkPlaceholder::new(token));
        }

        cursor = offset + PLACEHOLDER_LEN;
    }

    Ok(placeholders)
}

/// Replace every placeholder in `template` with the lowercase hex (no `0x`) of
/// the address it maps to in `dependencies`.
///
/// A template without placeholders, including one that has already been
/// linked, is returned unchanged
pub fn link(
    template: &str,
    dependencies: &HashMap<String, Address>,
) -> Result<String, DeployError> {
    let mut placeholders = scan_placeholders(template)?;
    if placeholders.is_empty() {
        return Ok(template.to_string());
    }

    for placeholder in placeholders.iter_mut() {
        let address = dependencies
            .get(&placeholder.token)
            .ok_or_else(|| DeployError::UnresolvedPlaceholder(placeholder.token.clone()))?;
        placeholder.resolved_address = Some(*address);
    }

    let mut linked = template.to_string();
    for LinkPlaceholder {
        token,
        resolved_address,
    } in placeholders
    {
        if let Some(address) = resolved_address {
            linked = linked.replace(&token, &hex::encode(address.as_slice()));
        }
    }

    Ok(linked)
}

/// Validate and return the placeholder beginning at `offset`
fn parse_token(template: &str, offset: usize) -> Result<&str, DeployError> {
    let malformed = |reason: &str| DeployError::MalformedTemplate {
        offset,
        reason: reason.to_string(),
    };

    let token = template
        .get(offset..offset + PLACEHOLDER_LEN)
        .ok_or_else(|| malformed("placeholder is truncated"))?;
    if !token.is_ascii() {
        return Err(malformed("placeholder contains non-ASCII characters"));
    }
    if !token.ends_with(PLACEHOLDER_SUFFIX) {
        return Err(malformed("placeholder is missing its closing delimiter"));
    }

    let identifier = &token[PLACEHOLDER_PREFIX.len()..PLACEHOLDER_LEN - PLACEHOLDER_SUFFIX.len()];
    if !identifier.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed("placeholder identifier is not hex"));
    }

    Ok(token)
}
