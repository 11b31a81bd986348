use log::{debug, error, info, warn};

/// Component-scoped logging handle passed into each stage at construction.
#[derive(Debug, Clone)]
pub struct LogManager {
    component: String,
}

impl LogManager {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Handle for a sub-component, e.g. `pipeline::matcher`.
    pub fn scoped(&self, child: &str) -> Self {
        Self::new(format!("{}::{}", self.component, child))
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn record(&self, message: &str) {
        info!(target: "shakecore", "[{}] {}", self.component, message);
    }

    pub fn detail(&self, message: &str) {
        debug!(target: "shakecore", "[{}] {}", self.component, message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: "shakecore", "[{}] {}", self.component, message);
    }

    pub fn error(&self, message: &str) {
        error!(target: "shakecore", "[{}] {}", self.component, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("shakecore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_logger_nests_component_names() {
        let root = LogManager::new("pipeline");
        assert_eq!(root.scoped("matcher").component(), "pipeline::matcher");
    }
}
