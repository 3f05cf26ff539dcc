//! # Config Digest
//!
//! Workloads that mount a ConfigMap do not restart when the ConfigMap
//! changes. Stamping a digest of the ConfigMap data on the pod template turns
//! every data change into a template change, which rolls the workload.
//!
//! The digest is md5 over the entries sorted by key, each written as
//! `key\nvalue\n`, rendered as 32 lowercase hex characters.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec};

/// Digest of key/value pairs, independent of their order
pub fn config_digest<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = entries.into_iter().collect();
    let mut buf = String::new();
    for (key, value) in sorted {
        buf.push_str(key);
        buf.push('\n');
        buf.push_str(value);
        buf.push('\n');
    }
    format!("{:x}", md5::compute(buf.as_bytes()))
}

/// Digest of a ConfigMap's `data`; an absent map digests like an empty one
pub fn config_map_digest(config_map: &ConfigMap) -> String {
    config_digest(
        config_map
            .data
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    )
}

/// Write `digest` as annotation `key` on the pod template
pub fn stamp_template(template: &mut PodTemplateSpec, key: &str, digest: String) {
    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), digest);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_fixed_width_hex() {
        let digest = config_digest([("a", "1")]);
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_ignores_entry_order() {
        assert_eq!(
            config_digest([("b", "2"), ("a", "1")]),
            config_digest([("a", "1"), ("b", "2")])
        );
    }

    #[test]
    fn test_digest_separates_keys_from_values() {
        assert_ne!(config_digest([("ab", "c")]), config_digest([("a", "bc")]));
    }

    #[test]
    fn test_stamp_template_creates_metadata() {
        let mut template = PodTemplateSpec::default();
        stamp_template(&mut template, "hash", "abc".to_string());
        let annotations = template.metadata.unwrap().annotations.unwrap();
        assert_eq!(annotations.get("hash").map(String::as_str), Some("abc"));
    }
}
