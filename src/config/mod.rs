pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    resolve_config_dir, schema_json, CancelTripConfig, Config, ModelConfig, SlackConfig,
    ToolsConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert!(!config.classifier.provider.is_empty());
        assert!(!config.responder.model.is_empty());
        assert!(config.responder.temperature > config.classifier.temperature);
    }
}
