pub mod chat;

use serde::Serialize;

/// One entry of the fixed set of supported models. `alias` is the model
/// string the completion service expects; `id` is what clients send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub alias: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "gpt-o1",
        name: "o1-preview",
        alias: "o1-preview",
        description: "Fast and reliable",
    },
    ModelSpec {
        id: "gpt-o1-mini",
        name: "o1 mini",
        alias: "o1-mini",
        description: "Fastest response times",
    },
    ModelSpec {
        id: "gpt-4o",
        name: "GPT-4o",
        alias: "chatgpt-4o-latest",
        description: "Most capable",
    },
    ModelSpec {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        alias: "gpt-4o-mini",
        description: "Balanced performance",
    },
];

pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";

pub fn find_model(id: &str) -> Option<&'static ModelSpec> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_resolve_to_their_upstream_alias() {
        let model = find_model("gpt-4o").unwrap();
        assert_eq!(model.alias, "chatgpt-4o-latest");
        let model = find_model("gpt-o1").unwrap();
        assert_eq!(model.alias, "o1-preview");
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(find_model("gpt-5").is_none());
        assert!(find_model("").is_none());
    }

    #[test]
    fn default_model_is_in_the_catalog() {
        assert!(find_model(DEFAULT_MODEL_ID).is_some());
    }
}
