//! In-memory registry of tools available to an agent or service.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::ToolDefinition;

/// Each service maintains its own registry and registers tools during
/// startup. Registration may happen off the event loop, so the map sits
/// behind a lock.
pub struct ToolRegistry {
    tools: Mutex<HashMap<String, ToolDefinition>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: Mutex::new(HashMap::new()),
        }
    }

    /// Registers or overwrites a tool by name.
    pub fn register(&self, tool: ToolDefinition) {
        let mut tools = self.tools.lock().expect("tool registry lock poisoned");
        tools.insert(tool.name.clone(), tool);
    }

    /// Removes a tool from the registry if it exists.
    pub fn unregister(&self, name: &str) {
        let mut tools = self.tools.lock().expect("tool registry lock poisoned");
        tools.remove(name);
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<ToolDefinition> {
        let tools = self.tools.lock().expect("tool registry lock poisoned");
        tools.get(name).cloned()
    }

    /// Snapshot of all registered tool names.
    pub fn names(&self) -> Vec<String> {
        let tools = self.tools.lock().expect("tool registry lock poisoned");
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        ToolRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolFn;
    use std::sync::Arc;

    fn noop() -> ToolFn {
        Arc::new(|_args| Box::pin(async { Ok(serde_json::json!({})) }))
    }

    #[test]
    fn register_get_unregister() {
        let registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("read_file", "reads a file", noop()));
        assert!(registry.get("read_file").is_some());
        assert_eq!(registry.names(), vec!["read_file".to_string()]);

        registry.unregister("read_file");
        assert!(registry.get("read_file").is_none());
    }

    #[test]
    fn register_overwrites_by_name() {
        let registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("t", "first", noop()));
        registry.register(ToolDefinition::new("t", "second", noop()));
        assert_eq!(registry.get("t").unwrap().description, "second");
    }
}
