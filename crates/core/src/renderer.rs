use serde_json::Value;

type RendererTest = Box<dyn Fn(&Value) -> bool>;

struct RendererEntry {
    name: String,
    test: RendererTest,
}

/// Custom renderers known to the tree.
///
/// The core never renders anything; it only needs to know whether a custom
/// renderer claims a schema, because a claimed object/array schema is
/// treated as a single terminal value instead of a branch of child nodes.
/// The registry is owned by the tree it was passed to.
#[derive(Default)]
pub struct RendererRegistry {
    entries: Vec<RendererEntry>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a renderer. It claims schemas whose `formType` equals `name`
    /// or for which `test` returns true.
    pub fn register(&mut self, name: impl Into<String>, test: impl Fn(&Value) -> bool + 'static) {
        self.entries.push(RendererEntry {
            name: name.into(),
            test: Box::new(test),
        });
    }

    /// Register a renderer selected only through `formType`.
    pub fn register_named(&mut self, name: impl Into<String>) {
        self.register(name, |_| false);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Whether some registered renderer claims `schema`.
    pub fn matches(&self, schema: &Value) -> bool {
        let form_type = schema.get("formType").and_then(Value::as_str);
        self.entries
            .iter()
            .any(|e| form_type == Some(e.name.as_str()) || (e.test)(schema))
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
