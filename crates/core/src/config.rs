//! Capture session configuration

use serde::{Deserialize, Serialize};

/// Configuration for one capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Display name of the session
    pub name: String,
    /// Depth of the bounded subscriber event queue
    pub event_queue_size: usize,
    /// Ports whose traffic is grouped as HTTP conversations
    pub http_ports: Vec<u16>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "capture".to_string(),
            event_queue_size: 1024,
            http_ports: vec![80, 8080],
        }
    }
}

impl SessionConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| crate::Error::parse(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_bounded() {
        let config = SessionConfig::default();
        assert!(config.event_queue_size > 0);
        assert!(config.http_ports.contains(&80));
    }
}
