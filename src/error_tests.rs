//! Tests for error types

#[cfg(test)]
mod tests {
    use super::super::error::BotError;

    #[test]
    fn test_api_error() {
        let err = BotError::Api("feed unavailable".to_string());
        assert!(err.to_string().contains("API error"));
        assert!(err.to_string().contains("feed unavailable"));
    }

    #[test]
    fn test_config_error() {
        let err = BotError::Config("Missing API key".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_validation_error() {
        let err = BotError::Validation("confidence out of range".to_string());
        assert!(err.to_string().contains("Validation failed"));
        assert!(err.to_string().contains("confidence out of range"));
    }

    #[test]
    fn test_timeout_error() {
        let err = BotError::Timeout {
            operation: "tier-2".to_string(),
            after_ms: 1500,
        };
        let msg = err.to_string();
        assert!(msg.contains("1500"));
        assert!(msg.contains("tier-2"));
    }

    #[test]
    fn test_execution_error() {
        let err = BotError::Execution("Order failed".to_string());
        assert!(err.to_string().contains("Execution error"));
    }

    #[test]
    fn test_state_conflict() {
        let err = BotError::StateConflict("exposure version moved".to_string());
        assert!(err.to_string().contains("State conflict"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Api("502".into()).is_transient());
        assert!(BotError::Timeout {
            operation: "live feed".into(),
            after_ms: 10
        }
        .is_transient());

        assert!(!BotError::Validation("bad".into()).is_transient());
        assert!(!BotError::Execution("rejected".into()).is_transient());
        assert!(!BotError::Config("missing".into()).is_transient());
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: BotError = parse.unwrap_err().into();
        assert!(err.to_string().contains("JSON parsing error"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_variants_distinct() {
        let api = BotError::Api("test".to_string());
        let internal = BotError::Internal("test".to_string());

        assert_ne!(api.to_string(), internal.to_string());
    }
}
