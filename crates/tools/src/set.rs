use std::sync::Arc;

use af_domain::ToolDeclaration;

use crate::tool::Tool;

/// Ordered per-agent tool registry.
///
/// Insertion order is significant: it drives both the declaration list
/// sent to the model and batch execution order. Names are unique; adding
/// a duplicate replaces the original in place.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tool: impl Tool + 'static) {
        self.add_arc(Arc::new(tool));
    }

    pub fn add_arc(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Remove by name. Returns whether a tool was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        self.tools.len() != before
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declarations in tool order; tools without one are dropped.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().filter_map(|t| t.declaration()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionTool;
    use serde_json::json;

    fn noop(name: &str) -> FunctionTool {
        FunctionTool::new(name, format!("{name} tool"), json!({"type": "object"}), |_, _| {
            Box::pin(async { Ok(json!(null)) })
        })
    }

    #[test]
    fn preserves_insertion_order() {
        let mut set = ToolSet::new();
        set.add(noop("zeta"));
        set.add(noop("alpha"));
        assert_eq!(set.names(), vec!["zeta", "alpha"]);

        let decls = set.declarations();
        assert_eq!(decls[0].name, "zeta");
        assert_eq!(decls[1].name, "alpha");
    }

    #[test]
    fn duplicate_add_replaces_in_place() {
        let mut set = ToolSet::new();
        set.add(noop("a"));
        set.add(noop("b"));
        set.add(FunctionTool::new("a", "replacement", json!({"type": "object"}), |_, _| {
            Box::pin(async { Ok(json!(1)) })
        }));

        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["a", "b"]);
        assert_eq!(set.get("a").unwrap().description(), "replacement");
    }

    #[test]
    fn remove_reports_outcome() {
        let mut set = ToolSet::new();
        set.add(noop("a"));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn undeclared_tools_are_dropped_from_declarations() {
        let mut set = ToolSet::new();
        set.add(noop("visible"));
        set.add(FunctionTool::undeclared("hidden", "not advertised", |_, _| {
            Box::pin(async { Ok(json!(null)) })
        }));

        assert_eq!(set.len(), 2);
        let decls = set.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "visible");
    }
}
