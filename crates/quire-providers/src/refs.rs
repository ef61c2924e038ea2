// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider reference parsing.

use serde::{Deserialize, Serialize};

/// A parsed provider list entry: `name[:key_alias]`.
///
/// The `raw` form is the opaque string that travels through workflow inputs
/// and history; `name` selects the handle implementation and `key_alias`
/// selects which credential the handle resolves from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    /// The entry exactly as written in the provider list.
    pub raw: String,
    /// Provider name ("mock", "openai", "ollama", "groq").
    pub name: String,
    /// Optional key alias after the colon.
    pub key_alias: String,
}

impl ProviderRef {
    /// A mock provider reference.
    pub fn mock() -> Self {
        Self {
            raw: "mock".to_string(),
            name: "mock".to_string(),
            key_alias: String::new(),
        }
    }
}

/// Parse a pipe-separated provider list into ordered references.
///
/// Blank entries are skipped. An empty result seeds a single mock entry so
/// the registry is always operable.
pub fn parse_provider_list(raw: &str) -> Vec<ProviderRef> {
    let mut out = Vec::new();
    for part in raw.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let reference = match part.split_once(':') {
            Some((name, alias)) => ProviderRef {
                raw: part.to_string(),
                name: name.trim().to_string(),
                key_alias: alias.trim().to_string(),
            },
            None => ProviderRef {
                raw: part.to_string(),
                name: part.to_string(),
                key_alias: String::new(),
            },
        };
        out.push(reference);
    }
    if out.is_empty() {
        out.push(ProviderRef::mock());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_list() {
        let refs = parse_provider_list("mock|openai:key1|openai:key2");
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].name, "mock");
        assert_eq!(refs[1].name, "openai");
        assert_eq!(refs[1].key_alias, "key1");
        assert_eq!(refs[2].raw, "openai:key2");
    }

    #[test]
    fn test_parse_skips_blank_entries() {
        let refs = parse_provider_list("openai| |groq:fast|");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "openai");
        assert_eq!(refs[1].key_alias, "fast");
    }

    #[test]
    fn test_empty_list_seeds_mock() {
        let refs = parse_provider_list("");
        assert_eq!(refs, vec![ProviderRef::mock()]);
        let refs = parse_provider_list("  |  ");
        assert_eq!(refs, vec![ProviderRef::mock()]);
    }

    #[test]
    fn test_alias_whitespace_is_trimmed() {
        let refs = parse_provider_list(" openai : key1 ");
        assert_eq!(refs[0].name, "openai");
        assert_eq!(refs[0].key_alias, "key1");
    }
}
