/// Position of a resource within a composition.
///
/// `embedded_rels` are dot-delimited relation paths relative to the
/// resource being composed: `parent.parent` embeds `parent` here and lets
/// the embedded resource embed its own `parent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionContext {
    rel: String,
    path: String,
    embedded_rels: Vec<String>,
    rel_stack: Vec<String>,
}

impl CompositionContext {
    pub fn new(rel: impl Into<String>, path: impl Into<String>, embedded_rels: Vec<String>) -> Self {
        let rel = rel.into();
        Self {
            rel_stack: vec![rel.clone()],
            rel,
            path: path.into(),
            embedded_rels,
        }
    }

    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// Request path of the resource, used as the fallback self link.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn embedded_rels(&self) -> &[String] {
        &self.embedded_rels
    }

    /// Relations from the composition root down to this resource.
    pub fn rel_stack(&self) -> &[String] {
        &self.rel_stack
    }

    /// First segments of the embedded relation paths, without duplicates.
    pub fn embedded_roots(&self) -> Vec<&str> {
        let mut result = Vec::new();
        for rel in &self.embedded_rels {
            let root = rel.split('.').next().unwrap_or(rel);
            if !root.is_empty() && !result.contains(&root) {
                result.push(root);
            }
        }
        result
    }

    /// Context of the resource embedded as `rel` from `path`.
    pub fn child_for(&self, rel: &str, path: impl Into<String>) -> Self {
        let embedded_rels = self
            .embedded_rels
            .iter()
            .filter_map(|v| v.strip_prefix(rel)?.strip_prefix('.'))
            .map(str::to_string)
            .collect();
        let mut rel_stack = self.rel_stack.clone();
        rel_stack.push(rel.to_string());
        Self {
            rel: rel.to_string(),
            path: path.into(),
            embedded_rels,
            rel_stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_for() {
        let context = CompositionContext::new(
            "self",
            "/nodes/1",
            vec!["parent.parent".into(), "parent".into(), "children".into(), "parentage".into()],
        );
        assert_eq!(context.embedded_roots(), vec!["parent", "children", "parentage"]);
        let child = context.child_for("parent", "/nodes/2");
        assert_eq!(child.rel(), "parent");
        assert_eq!(child.path(), "/nodes/2");
        assert_eq!(child.embedded_rels(), ["parent".to_string()]);
        assert_eq!(child.rel_stack(), ["self".to_string(), "parent".to_string()]);
        let grandchild = child.child_for("parent", "/nodes/3");
        assert!(grandchild.embedded_rels().is_empty());
        assert!(grandchild.embedded_roots().is_empty());
    }
}
