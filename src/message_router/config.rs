//! Router configuration shared by the browser and renderer sides

use serde::{Deserialize, Serialize};

use crate::utils::{Result, RouterError};

/// Default name of the script query function
pub const DEFAULT_QUERY_FUNCTION: &str = "cefQuery";
/// Default name of the script cancel function
pub const DEFAULT_CANCEL_FUNCTION: &str = "cefQueryCancel";
/// Payloads of at least this many bytes travel through shared memory
pub const DEFAULT_MESSAGE_SIZE_THRESHOLD: usize = 16 * 1024;

/// Configuration for one router instance. Both sides must use matching
/// function names or their message names will not line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRouterConfig {
    /// Name of the global query function installed into each script context
    pub js_query_function: String,
    /// Name of the global cancel function installed into each script context
    pub js_cancel_function: String,
    /// Payload byte length at which encoding switches to shared memory
    pub message_size_threshold: usize,
}

impl Default for MessageRouterConfig {
    fn default() -> Self {
        Self {
            js_query_function: DEFAULT_QUERY_FUNCTION.to_string(),
            js_cancel_function: DEFAULT_CANCEL_FUNCTION.to_string(),
            message_size_threshold: DEFAULT_MESSAGE_SIZE_THRESHOLD,
        }
    }
}

impl MessageRouterConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no router can be built from
    pub fn validate(&self) -> Result<()> {
        if self.js_query_function.is_empty() {
            return Err(RouterError::InvalidConfig(
                "js_query_function must not be empty".to_string(),
            ));
        }
        if self.js_cancel_function.is_empty() {
            return Err(RouterError::InvalidConfig(
                "js_cancel_function must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Wire name of query requests and responses
    pub fn query_message_name(&self) -> String {
        format!("{}Msg", self.js_query_function)
    }

    /// Wire name of cancel requests
    pub fn cancel_message_name(&self) -> String {
        format!("{}Msg", self.js_cancel_function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MessageRouterConfig::default();
        assert_eq!(config.query_message_name(), "cefQueryMsg");
        assert_eq!(config.cancel_message_name(), "cefQueryCancelMsg");
        assert_eq!(config.message_size_threshold, 16384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_names_rejected() {
        let config = MessageRouterConfig {
            js_query_function: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RouterError::InvalidConfig(_))));

        let config = MessageRouterConfig {
            js_cancel_function: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RouterError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = MessageRouterConfig::from_json(r#"{ "js_query_function": "appQuery" }"#).unwrap();
        assert_eq!(
            config,
            MessageRouterConfig {
                js_query_function: "appQuery".to_string(),
                js_cancel_function: "cefQueryCancel".to_string(),
                message_size_threshold: 16384,
            }
        );
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            MessageRouterConfig::from_json(r#"{ "js_cancel_function": "" }"#),
            Err(RouterError::InvalidConfig(_))
        ));
        assert!(matches!(
            MessageRouterConfig::from_json("not json"),
            Err(RouterError::ConfigParse(_))
        ));
    }
}
