//! Block spec registry and content payload checks.
//!
//! Provides:
//! - `BlockSpec`: which children and slots a single block type accepts
//! - `DynamicSlots`: slot sets derived from a container's own content
//! - `BlockSpecRegistry`: immutable table of all known block types
//! - `sanitize_html`: HTML sanitization via ammonia

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Block types that never accept children.
const ATOMIC_TYPES: &[(&str, &str)] = &[
    ("heading", "Heading"),
    ("text", "Text"),
    ("image", "Image"),
    ("button", "Button"),
    ("spacer", "Spacer"),
    ("divider", "Divider"),
    ("video", "Video"),
    ("code", "Code"),
    ("quote", "Quote"),
    ("list", "List"),
    ("embed", "Embed"),
];

/// Container kinds whose valid slots are declared in their own content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicSlots {
    /// One slot per `content.tabs[].id`.
    Tabs,
    /// One slot per `content.sections[].id`.
    Accordion,
}

impl DynamicSlots {
    /// Content field holding the declared entries.
    pub fn entries_field(&self) -> &'static str {
        match self {
            Self::Tabs => "tabs",
            Self::Accordion => "sections",
        }
    }

    /// Slot identifiers declared by `content`, in declaration order.
    pub fn slots_from(&self, content: &Value) -> Vec<String> {
        content
            .get(self.entries_field())
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `content` declares an entry whose id equals `slot`.
    pub fn declares(&self, content: &Value, slot: &str) -> bool {
        content
            .get(self.entries_field())
            .and_then(Value::as_array)
            .is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| e.get("id").and_then(Value::as_str) == Some(slot))
            })
    }
}

/// Placement rules for a single block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Machine name of the block type (e.g. "heading", "columns").
    pub type_name: String,
    /// Human-readable label.
    pub label: String,
    /// Child types this block accepts. None means no children at all.
    pub allowed_children: Option<HashSet<String>>,
    /// Statically declared slots, in display order.
    pub allowed_slots: Option<Vec<String>>,
    /// Set for the container kinds whose slots come from their content.
    pub dynamic_slots: Option<DynamicSlots>,
}

impl BlockSpec {
    /// A block type that cannot contain children.
    pub fn atomic(type_name: &str, label: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            label: label.to_string(),
            allowed_children: None,
            allowed_slots: None,
            dynamic_slots: None,
        }
    }

    /// A container with a fixed slot list.
    pub fn container(type_name: &str, label: &str, children: &[&str], slots: &[&str]) -> Self {
        Self {
            allowed_children: Some(children.iter().map(|c| c.to_string()).collect()),
            allowed_slots: Some(slots.iter().map(|s| s.to_string()).collect()),
            ..Self::atomic(type_name, label)
        }
    }

    /// A container whose slots are declared by each instance's content.
    pub fn dynamic(type_name: &str, label: &str, children: &[&str], kind: DynamicSlots) -> Self {
        Self {
            allowed_children: Some(children.iter().map(|c| c.to_string()).collect()),
            dynamic_slots: Some(kind),
            ..Self::atomic(type_name, label)
        }
    }

    /// Whether `child_type` may be nested inside this block.
    pub fn accepts_child(&self, child_type: &str) -> bool {
        self.allowed_children
            .as_ref()
            .is_some_and(|children| children.contains(child_type))
    }

    /// Whether `slot` is statically declared.
    pub fn has_static_slot(&self, slot: &str) -> bool {
        self.allowed_slots
            .as_ref()
            .is_some_and(|slots| slots.iter().any(|s| s == slot))
    }
}

/// Registry of block specs, keyed by type name.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// after construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockSpecRegistry {
    specs: HashMap<String, BlockSpec>,
}

impl BlockSpecRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the standard catalogue.
    pub fn with_standard_types() -> Self {
        let mut registry = Self::new();
        registry.register_standard_types();
        registry
    }

    /// Register a single block spec, replacing any previous one of that name.
    pub fn register(&mut self, spec: BlockSpec) {
        self.specs.insert(spec.type_name.clone(), spec);
    }

    /// Look up a spec. Unknown types return None; callers decide policy.
    pub fn get_spec(&self, type_name: &str) -> Option<&BlockSpec> {
        self.specs.get(type_name)
    }

    /// Check whether a block type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.specs.contains_key(type_name)
    }

    /// Return the number of registered block types.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// List all registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the type accepts at least one child type.
    pub fn is_container(&self, type_name: &str) -> bool {
        self.get_spec(type_name)
            .and_then(|spec| spec.allowed_children.as_ref())
            .is_some_and(|children| !children.is_empty())
    }

    /// Whether the type derives its slots from content.
    pub fn is_dynamic(&self, type_name: &str) -> bool {
        self.get_spec(type_name)
            .is_some_and(|spec| spec.dynamic_slots.is_some())
    }

    /// Every slot a persisted block of this type currently offers.
    pub fn allowed_slots(&self, type_name: &str, content: &Value) -> Vec<String> {
        let Some(spec) = self.get_spec(type_name) else {
            return Vec::new();
        };
        let mut slots = spec.allowed_slots.clone().unwrap_or_default();
        if let Some(kind) = spec.dynamic_slots {
            for slot in kind.slots_from(content) {
                if !slots.contains(&slot) {
                    slots.push(slot);
                }
            }
        }
        slots
    }

    /// Register the standard catalogue: eleven atomic types and six containers.
    pub fn register_standard_types(&mut self) {
        for (name, label) in ATOMIC_TYPES {
            self.register(BlockSpec::atomic(name, label));
        }

        let atomic: Vec<&str> = ATOMIC_TYPES.iter().map(|(name, _)| *name).collect();
        let with = |extra: &[&'static str]| -> Vec<&str> {
            atomic.iter().copied().chain(extra.iter().copied()).collect()
        };

        let section_children = with(&["container", "columns", "grid", "tabs", "accordion"]);
        self.register(BlockSpec::container(
            "section",
            "Section",
            &section_children,
            &["content"],
        ));
        self.register(BlockSpec::container(
            "container",
            "Container",
            &section_children,
            &["content"],
        ));

        let cell_children = with(&["container"]);
        self.register(BlockSpec::container(
            "columns",
            "Columns",
            &cell_children,
            &["column1", "column2", "column3"],
        ));
        self.register(BlockSpec::container(
            "grid",
            "Grid",
            &cell_children,
            &["cell1", "cell2", "cell3", "cell4"],
        ));

        let panel_children = with(&["container", "columns", "grid"]);
        self.register(BlockSpec::dynamic(
            "tabs",
            "Tabs",
            &panel_children,
            DynamicSlots::Tabs,
        ));
        self.register(BlockSpec::dynamic(
            "accordion",
            "Accordion",
            &panel_children,
            DynamicSlots::Accordion,
        ));
    }

    /// Validate a block's content payload against its type.
    ///
    /// Returns a list of validation error messages. An empty list means the
    /// content is valid.
    ///
    /// Rules per block type:
    /// - text-bearing fields must pass ammonia sanitization unchanged
    /// - heading: `level`, if present, must be an integer in 1..=6
    /// - image: `src`, if present, must be non-empty
    /// - button: `label` is required
    /// - tabs / accordion: entries must carry unique, non-empty string ids
    pub fn validate_content(&self, type_name: &str, content: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(spec) = self.get_spec(type_name) else {
            errors.push(format!("unknown block type '{type_name}'"));
            return errors;
        };

        if !content.is_object() && !content.is_null() {
            errors.push(format!("{type_name}: content must be an object"));
            return errors;
        }

        match type_name {
            "heading" => {
                validate_text_field(content, "text", type_name, &mut errors);
                if let Some(level) = content.get("level") {
                    match level.as_i64() {
                        Some(n) if (1..=6).contains(&n) => {}
                        Some(n) => {
                            errors.push(format!("heading: level must be between 1 and 6, got {n}"));
                        }
                        None => errors.push("heading: level must be an integer".to_string()),
                    }
                }
            }
            "text" | "quote" => {
                validate_text_field(content, "text", type_name, &mut errors);
                validate_text_field(content, "caption", type_name, &mut errors);
            }
            "image" => {
                if content.get("src").and_then(Value::as_str) == Some("") {
                    errors.push("image: src must not be empty".to_string());
                }
                validate_text_field(content, "alt", type_name, &mut errors);
            }
            "button" => match content.get("label").and_then(Value::as_str) {
                Some(_) => validate_text_field(content, "label", type_name, &mut errors),
                None => errors.push("button: missing required field 'label'".to_string()),
            },
            "list" => {
                if let Some(items) = content.get("items").and_then(Value::as_array) {
                    for (i, item) in items.iter().enumerate() {
                        if let Some(text) = item.as_str()
                            && sanitize_html(text) != text
                        {
                            errors.push(format!(
                                "list: item {i} contains disallowed HTML that was sanitized"
                            ));
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(kind) = spec.dynamic_slots {
            validate_entry_ids(content, kind, type_name, &mut errors);
        }

        errors
    }
}

/// Flag a text field that is present but would be altered by sanitization.
fn validate_text_field(data: &Value, field: &str, block_type: &str, errors: &mut Vec<String>) {
    if let Some(text) = data.get(field).and_then(Value::as_str)
        && sanitize_html(text) != text
    {
        errors.push(format!(
            "{block_type}: '{field}' contains disallowed HTML that was sanitized"
        ));
    }
}

fn validate_entry_ids(content: &Value, kind: DynamicSlots, block_type: &str, errors: &mut Vec<String>) {
    let field = kind.entries_field();
    let Some(entries) = content.get(field) else {
        return;
    };
    let Some(entries) = entries.as_array() else {
        errors.push(format!("{block_type}: '{field}' must be an array"));
        return;
    };

    let mut seen = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        match entry.get("id").and_then(Value::as_str) {
            Some("") | None => {
                errors.push(format!("{block_type}: {field}[{i}] needs a non-empty string id"));
            }
            Some(id) if !seen.insert(id) => {
                errors.push(format!("{block_type}: duplicate {field} id '{id}'"));
            }
            Some(_) => {}
        }
    }
}

/// Sanitize HTML input using ammonia with default settings.
pub fn sanitize_html(input: &str) -> String {
    ammonia::clean(input)
}
