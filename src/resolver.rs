//! Collection name resolution
//!
//! Names are derived from `(base, dim, model)` only, never from time or
//! randomness, so a lost registry can be reconstructed by resolving again
//! with the same embedding configuration.

use crate::registry::Registry;

/// Suffix appended when a collection has to be recreated under a new name
pub const REPAIR_SUFFIX: &str = "_new";

/// Collection name for the `(model, dim)` configuration
///
/// Reuses the registered name when one exists, otherwise synthesizes
/// `{base}_dim{dim}_model_{sanitized model}`.
pub fn resolve(model: &str, dim: usize, base_name: &str, registry: &Registry) -> String {
    match registry.find(model, dim) {
        Some(record) => record.name.clone(),
        None => synthesize(base_name, model, dim),
    }
}

/// Deterministic name for `(model, dim)`, ignoring the registry
pub fn synthesize(base_name: &str, model: &str, dim: usize) -> String {
    format!("{}_dim{}_model_{}", base_name, dim, sanitize_model_name(model))
}

/// Name used when the resolved collection is missing or has drifted
pub fn repair_name(base_name: &str, model: &str, dim: usize) -> String {
    format!("{}{}", synthesize(base_name, model, dim), REPAIR_SUFFIX)
}

/// Replace every non-alphanumeric character with `_`
pub fn sanitize_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryRecord;
    use std::path::PathBuf;

    fn registry(records: Vec<RegistryRecord>) -> Registry {
        Registry::from_records(PathBuf::from("unused.json"), records)
    }

    #[test]
    fn test_resolve_synthesizes_expected_name() {
        let empty = registry(vec![]);
        assert_eq!(
            resolve("text-embed-a", 8, "experiences", &empty),
            "experiences_dim8_model_text_embed_a"
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let empty = registry(vec![]);
        for (model, dim) in [("text-embedding-3-small", 1536), ("bge.base-v1.5", 768), ("m", 1)] {
            assert_eq!(
                resolve(model, dim, "experiences", &empty),
                resolve(model, dim, "experiences", &empty)
            );
        }
    }

    #[test]
    fn test_resolve_prefers_registered_name() {
        let reg = registry(vec![RegistryRecord::new("hand_picked", 8, "text-embed-a")]);
        assert_eq!(resolve("text-embed-a", 8, "experiences", &reg), "hand_picked");
    }

    #[test]
    fn test_dimension_change_yields_distinct_name() {
        let reg = registry(vec![RegistryRecord::new(
            "experiences_dim8_model_text_embed_a",
            8,
            "text-embed-a",
        )]);

        let dim8 = resolve("text-embed-a", 8, "experiences", &reg);
        let dim16 = resolve("text-embed-a", 16, "experiences", &reg);
        assert_eq!(dim8, "experiences_dim8_model_text_embed_a");
        assert_eq!(dim16, "experiences_dim16_model_text_embed_a");
    }

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize_model_name("bge-base-en-v1.5"), "bge_base_en_v1_5");
        assert_eq!(sanitize_model_name("org/model:latest"), "org_model_latest");
    }

    #[test]
    fn test_repair_name_has_suffix() {
        let name = repair_name("experiences", "text-embed-a", 8);
        assert_eq!(name, "experiences_dim8_model_text_embed_a_new");
    }
}
