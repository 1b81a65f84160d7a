//! End-to-end behaviour of the live form tree: branch selection, conditional
//! requiredness, visibility resets, arrays, virtual fields, errors and events.

use std::cell::RefCell;
use std::rc::Rc;

use schemaform_core::{
    BuildError, EventKind, EventKinds, FormTree, JsonSchemaError, NodeEvent, NodeGroup, NodeId,
    RendererRegistry, Salt, TreeBuilder, TreeConfig, ValidationMode, Validator, ValidatorFactory,
};
use serde_json::{json, Value};

fn build(schema: Value) -> FormTree {
    TreeBuilder::new(schema).build().unwrap()
}

fn build_with(schema: Value, default: Value) -> FormTree {
    TreeBuilder::new(schema).default_value(default).build().unwrap()
}

fn at(tree: &FormTree, pointer: &str) -> NodeId {
    tree.find(tree.root(), pointer)
        .unwrap_or_else(|| panic!("no node at {}", pointer))
}

fn mode_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"mode": {"enum": ["A", "B"]}},
        "oneOf": [
            {"&if": "./mode === 'A'", "properties": {"fieldA": {"type": "string"}}},
            {"&if": "./mode === 'B'", "properties": {"fieldB": {"type": "string"}}}
        ]
    })
}

// ──────────────────────────────────────────────
// oneOf branches
// ──────────────────────────────────────────────

#[test]
fn one_of_value_keeps_only_the_active_branch() {
    let mut tree = build(mode_schema());
    let root = tree.root();

    tree.set_value(root, Some(json!({"mode": "A", "fieldA": "x", "fieldB": "y"})));
    assert_eq!(tree.root_value(), Some(&json!({"mode": "A", "fieldA": "x"})));
    assert_eq!(tree.node(root).unwrap().one_of_index(), Some(0));

    tree.set_value(root, Some(json!({"mode": "B", "fieldA": "x", "fieldB": "y"})));
    assert_eq!(tree.root_value(), Some(&json!({"mode": "B", "fieldB": "y"})));
    assert_eq!(tree.node(root).unwrap().one_of_index(), Some(1));
}

#[test]
fn no_matching_branch_means_no_branch_fields() {
    let mut tree = build(mode_schema());
    let root = tree.root();
    assert_eq!(tree.node(root).unwrap().one_of_index(), None);

    tree.set_value(root, Some(json!({"mode": "C", "fieldA": "x"})));
    assert_eq!(tree.root_value(), Some(&json!({"mode": "C"})));
    assert!(tree.find(root, "fieldA").is_none());
}

#[test]
fn switching_through_the_discriminator_swaps_children() {
    let mut tree = build(mode_schema());
    let mode = at(&tree, "mode");

    tree.set_value(mode, Some(json!("A")));
    let field_a = at(&tree, "fieldA");
    tree.set_value(field_a, Some(json!("kept until switch")));
    assert_eq!(
        tree.root_value(),
        Some(&json!({"mode": "A", "fieldA": "kept until switch"}))
    );

    tree.set_value(mode, Some(json!("B")));
    assert_eq!(tree.root_value(), Some(&json!({"mode": "B"})));
    assert!(!tree.node(field_a).unwrap().is_attached());
    assert_eq!(tree.value(field_a), None);
    assert!(tree.find(tree.root(), "fieldB").is_some());
}

#[test]
fn branch_nodes_keep_identity_across_switches() {
    let mut tree = build(mode_schema());
    let root = tree.root();
    let mode = at(&tree, "mode");

    tree.set_value(mode, Some(json!("A")));
    let first = at(&tree, "fieldA");
    let salt_of = |tree: &FormTree, id: NodeId| -> Option<Salt> {
        tree.node(tree.root())
            .unwrap()
            .children()
            .iter()
            .find(|slot| slot.node == id)
            .and_then(|slot| slot.salt)
    };
    let first_salt = salt_of(&tree, first);
    assert!(first_salt.is_some());

    tree.set_value(mode, Some(json!("B")));
    tree.set_value(mode, Some(json!("A")));

    let again = at(&tree, "fieldA");
    assert_eq!(first, again);
    assert_eq!(salt_of(&tree, again), first_salt);
    assert_eq!(tree.node(root).unwrap().one_of_index(), Some(0));
}

#[test]
fn guardless_branch_is_the_fallback() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {"kind": {"type": "string"}},
        "oneOf": [
            {"computed": {"if": "./kind === 'special'"}, "properties": {"code": {"type": "string"}}},
            {"properties": {"note": {"type": "string", "default": "n/a"}}}
        ]
    }));
    let root = tree.root();
    assert_eq!(tree.node(root).unwrap().one_of_index(), Some(1));
    assert_eq!(tree.root_value(), Some(&json!({"note": "n/a"})));

    let kind = at(&tree, "kind");
    tree.set_value(kind, Some(json!("special")));
    assert_eq!(tree.node(root).unwrap().one_of_index(), Some(0));
    assert_eq!(tree.root_value(), Some(&json!({"kind": "special"})));

    tree.set_value(kind, Some(json!("plain")));
    assert_eq!(tree.root_value(), Some(&json!({"kind": "plain", "note": "n/a"})));
}

#[test]
fn any_of_fields_are_always_live() {
    let tree = build_with(
        json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "anyOf": [
                {"properties": {"b": {"type": "string"}}},
                {"properties": {"c": {"type": "string"}}}
            ]
        }),
        json!({"a": "1", "b": "2", "c": "3"}),
    );
    assert_eq!(tree.root_value(), Some(&json!({"a": "1", "b": "2", "c": "3"})));
    assert_eq!(tree.node(tree.root()).unwrap().children().len(), 3);
}

// ──────────────────────────────────────────────
// Requiredness
// ──────────────────────────────────────────────

#[test]
fn company_type_requires_tax_id() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "type": {"type": "string"},
            "taxId": {"type": "string"}
        },
        "if": {"properties": {"type": {"const": "company"}}},
        "then": {"required": ["taxId"]}
    }));
    let kind = at(&tree, "type");
    let tax_id = at(&tree, "taxId");
    assert!(!tree.node(tax_id).unwrap().is_required());

    tree.set_value(kind, Some(json!("company")));
    assert!(tree.node(tax_id).unwrap().is_required());
    let errors = tree.node(tax_id).unwrap().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].keyword, "required");
    assert_eq!(errors[0].data_path, ".taxId");

    tree.set_value(kind, Some(json!("person")));
    assert!(!tree.node(tax_id).unwrap().is_required());
    assert!(tree.node(tax_id).unwrap().errors().is_empty());
}

#[test]
fn required_is_the_union_of_holding_guards() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "kind": {"enum": ["a", "b", "c"]},
            "x": {"type": "string"},
            "y": {"type": "string"}
        },
        "allOf": [
            {"if": {"properties": {"kind": {"const": "a"}}}, "then": {"required": ["x"]}},
            {"if": {"properties": {"kind": {"const": "b"}}}, "then": {"required": ["x", "y"]}}
        ]
    }));
    let kind = at(&tree, "kind");
    let x = at(&tree, "x");
    let y = at(&tree, "y");
    let flags = |tree: &FormTree| {
        (
            tree.node(x).unwrap().is_required(),
            tree.node(y).unwrap().is_required(),
        )
    };

    tree.set_value(kind, Some(json!("a")));
    assert_eq!(flags(&tree), (true, false));
    tree.set_value(kind, Some(json!("b")));
    assert_eq!(flags(&tree), (true, true));
    tree.set_value(kind, Some(json!("c")));
    assert_eq!(flags(&tree), (false, false));
}

#[test]
fn static_and_branch_required() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {"mode": {"type": "string"}, "name": {"type": "string"}},
        "required": ["name"],
        "oneOf": [
            {"&if": "./mode === 'A'", "properties": {"a": {"type": "string"}}, "required": ["a"]}
        ]
    }));
    assert!(tree.node(at(&tree, "name")).unwrap().is_required());
    assert!(!tree.node(at(&tree, "mode")).unwrap().is_required());

    let mode = at(&tree, "mode");
    tree.set_value(mode, Some(json!("A")));
    assert!(tree.node(at(&tree, "a")).unwrap().is_required());
}

// ──────────────────────────────────────────────
// Computed properties
// ──────────────────────────────────────────────

fn visibility_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "show": {"type": "boolean", "default": true},
            "secret": {"type": "string", "computed": {"visible": "../show === true"}}
        },
        "required": ["secret"]
    })
}

#[test]
fn hiding_a_node_resets_its_value() {
    let mut tree = build_with(visibility_schema(), json!({"secret": "s"}));
    let show = at(&tree, "show");
    let secret = at(&tree, "secret");
    assert_eq!(tree.root_value(), Some(&json!({"show": true, "secret": "s"})));
    assert!(tree.node(secret).unwrap().computed().visible);

    tree.set_value(show, Some(json!(false)));
    assert!(!tree.node(secret).unwrap().computed().visible);
    assert_eq!(tree.value(secret), None);
    assert_eq!(tree.root_value(), Some(&json!({"show": false})));

    // Writes into a hidden node store the safe-empty value.
    tree.set_value(secret, Some(json!("ignored")));
    assert_eq!(tree.value(secret), None);

    tree.set_value(show, Some(json!(true)));
    tree.set_value(secret, Some(json!("back")));
    assert_eq!(tree.root_value(), Some(&json!({"show": true, "secret": "back"})));
}

#[test]
fn hidden_fields_are_not_required_by_validation() {
    let mut tree = build_with(visibility_schema(), json!({"show": false}));
    assert!(tree.global_errors().is_empty());

    let show = at(&tree, "show");
    tree.set_value(show, Some(json!(true)));
    let errors = tree.global_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].data_path, ".secret");
}

#[test]
fn read_only_and_watch_follow_dependencies() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "locked": {"type": "boolean"},
            "title": {
                "type": "string",
                "computed": {"readOnly": "../locked", "watch": ["../locked", "#/locked"]}
            },
            "fixed": {"type": "string", "readOnly": true}
        }
    }));
    let locked = at(&tree, "locked");
    let title = at(&tree, "title");
    assert!(!tree.node(title).unwrap().computed().read_only);
    assert!(tree.node(at(&tree, "fixed")).unwrap().computed().read_only);

    tree.set_value(locked, Some(json!(true)));
    let node = tree.node(title).unwrap();
    assert!(node.computed().read_only);
    assert_eq!(node.watch_values(), &[Some(json!(true)), Some(json!(true))]);
    assert_eq!(node.dependencies(), &["../locked".to_string(), "#/locked".to_string()]);
}

// ──────────────────────────────────────────────
// Arrays
// ──────────────────────────────────────────────

fn tags_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tags": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 2}
        }
    })
}

#[test]
fn array_edits_respect_bounds_and_reindex() {
    let mut tree = build_with(tags_schema(), json!({"tags": ["a"]}));
    let tags = at(&tree, "tags");

    let b = tree.push(tags, Some(json!("b"))).unwrap();
    assert_eq!(tree.value(tags), Some(&json!(["a", "b"])));
    assert_eq!(tree.node(b).unwrap().path(), "/tags/1");
    assert!(tree.push(tags, Some(json!("c"))).is_none());

    assert!(tree.remove(tags, 0));
    assert_eq!(tree.value(tags), Some(&json!(["b"])));
    let moved = tree.node(b).unwrap();
    assert_eq!(moved.name(), "0");
    assert_eq!(moved.path(), "/tags/0");
    assert_eq!(moved.data_path(), ".tags[0]");
    assert!(!tree.remove(tags, 0));

    tree.push(tags, Some(json!("c")));
    assert!(tree.move_item(tags, 0, 1));
    assert_eq!(tree.root_value(), Some(&json!({"tags": ["c", "b"]})));
    assert!(!tree.clear(tags));
}

#[test]
fn array_whole_value_write_resizes() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "rows": {
                "type": "array",
                "items": {"type": "object", "properties": {"qty": {"type": "integer"}}}
            }
        }
    }));
    let rows = at(&tree, "rows");
    assert_eq!(tree.value(rows), Some(&json!([])));

    tree.set_value(rows, Some(json!([{"qty": "3"}, {"qty": 4.7}])));
    assert_eq!(tree.value(rows), Some(&json!([{"qty": 3}, {"qty": 4}])));
    assert!(tree.find(tree.root(), "rows/1/qty").is_some());

    tree.set_value(rows, Some(json!([{"qty": 1}])));
    assert_eq!(tree.value(rows), Some(&json!([{"qty": 1}])));
    assert!(tree.find(tree.root(), "rows/1").is_none());

    assert!(tree.clear(rows));
    assert_eq!(tree.root_value(), Some(&json!({"rows": []})));
}

// ──────────────────────────────────────────────
// Virtual fields
// ──────────────────────────────────────────────

#[test]
fn virtual_fields_aggregate_and_distribute() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "start": {"type": "string"},
            "end": {"type": "string"}
        },
        "virtual": {"period": {"fields": ["start", "end"]}},
        "required": ["period"]
    }));
    let period = at(&tree, "period");
    let start = at(&tree, "start");
    assert!(tree.node(period).unwrap().is_virtual_required());
    assert!(tree.node(start).unwrap().is_required());
    assert!(tree.node(at(&tree, "end")).unwrap().is_required());
    assert_eq!(tree.value(period), Some(&json!([null, null])));

    tree.set_value(period, Some(json!(["2024-01-01", "2024-02-01"])));
    assert_eq!(
        tree.root_value(),
        Some(&json!({"start": "2024-01-01", "end": "2024-02-01"}))
    );

    tree.set_value(start, Some(json!("2023-12-24")));
    assert_eq!(tree.value(period), Some(&json!(["2023-12-24", "2024-02-01"])));
}

// ──────────────────────────────────────────────
// Lookups
// ──────────────────────────────────────────────

#[test]
fn find_resolves_relative_and_absolute_pointers() {
    let tree = build(json!({
        "type": "object",
        "properties": {
            "person": {
                "type": "object",
                "properties": {"name": {"type": "string"}, "a/b": {"type": "string"}}
            }
        }
    }));
    let root = tree.root();
    let name = at(&tree, "person/name");
    assert_eq!(tree.find(name, "../../person/name"), Some(name));
    assert_eq!(tree.find(name, "#/person/name"), Some(name));
    assert_eq!(tree.find(name, "/person"), tree.find(root, "./person"));
    assert_eq!(tree.find(name, "."), Some(name));
    assert_eq!(tree.find(name, "#"), Some(root));
    assert!(tree.find(name, "deeper").is_none());
    assert!(tree.find(root, "missing").is_none());

    let escaped = at(&tree, "person/a~1b");
    assert_eq!(tree.node(escaped).unwrap().path(), "/person/a~1b");
}

#[test]
fn find_nodes_sees_inactive_branches() {
    let tree = build(json!({
        "type": "object",
        "properties": {"mode": {"type": "string"}},
        "oneOf": [
            {"&if": "./mode === 'A'", "properties": {"shared": {"type": "string"}}},
            {"&if": "./mode === 'B'", "properties": {"shared": {"type": "number"}}}
        ]
    }));
    let root = tree.root();
    assert!(tree.find(root, "shared").is_none());
    let all = tree.find_nodes(root, "shared");
    assert_eq!(all.len(), 2);
    assert_ne!(all[0], all[1]);

    let mode = at(&tree, "mode");
    assert_eq!(tree.find_nodes(root, "mode/deeper"), vec![mode]);
    assert_eq!(tree.find_nodes(root, "#/mode"), vec![mode]);
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "age": {"type": "integer", "minimum": 0}
        },
        "required": ["name"]
    })
}

#[test]
fn validation_errors_land_on_their_nodes() {
    let tree = build_with(person_schema(), json!({"age": -1}));
    let name = at(&tree, "name");
    let age = at(&tree, "age");

    assert_eq!(tree.global_errors().len(), 2);
    assert_eq!(tree.node(name).unwrap().errors()[0].keyword, "required");
    assert_eq!(tree.node(age).unwrap().errors()[0].keyword, "minimum");
    assert!(tree.node(tree.root()).unwrap().local_errors().is_empty());
}

#[test]
fn on_request_mode_validates_only_when_asked() {
    let mut tree = TreeBuilder::new(person_schema())
        .config(TreeConfig {
            validation_mode: ValidationMode::OnRequest,
            ..TreeConfig::default()
        })
        .build()
        .unwrap();
    assert!(tree.global_errors().is_empty());

    let errors = tree.validate();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].data_path, ".name");
    let name = at(&tree, "name");
    assert_eq!(tree.node(name).unwrap().local_errors().len(), 1);

    tree.set_value(name, Some(json!("Ada")));
    assert_eq!(tree.global_errors().len(), 1, "no automatic revalidation");
    assert!(tree.validate().is_empty());
}

struct BrokenFactory;

impl ValidatorFactory for BrokenFactory {
    fn compile(&self, _schema: &Value) -> Result<Box<dyn Validator>, String> {
        Err("unsupported draft".to_string())
    }
}

#[test]
fn compile_failure_degrades_to_one_root_error() {
    let tree = TreeBuilder::new(person_schema())
        .validator_factory(BrokenFactory)
        .build()
        .unwrap();
    let errors = tree.global_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].keyword, "schemaCompileFailed");
    assert_eq!(errors[0].message, "unsupported draft");
    assert_eq!(errors[0].params["error"], "unsupported draft");
    assert_eq!(tree.node(tree.root()).unwrap().local_errors().len(), 1);
}

fn external(data_path: &str, message: &str) -> JsonSchemaError {
    JsonSchemaError {
        keyword: "server".to_string(),
        instance_path: String::new(),
        schema_path: String::new(),
        params: json!({}),
        message: message.to_string(),
        data_path: data_path.to_string(),
        key: None,
    }
}

#[test]
fn external_errors_are_tagged_and_removable() {
    let mut tree = build_with(person_schema(), json!({"name": "Ada"}));
    let name = at(&tree, "name");
    let root = tree.root();

    let keys = tree.set_external_errors(vec![
        external(".name", "already taken"),
        external(".nowhere", "general failure"),
    ]);
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);

    let errors = tree.node(name).unwrap().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "already taken");
    assert_eq!(errors[0].key, Some(keys[0]));
    assert_eq!(tree.node(root).unwrap().external_errors().len(), 1);

    tree.remove_external_errors(&keys[..1]);
    assert!(tree.node(name).unwrap().errors().is_empty());
    assert_eq!(tree.all_errors().len(), 1);

    tree.clear_external_errors();
    assert!(tree.all_errors().is_empty());
}

#[test]
fn external_errors_come_before_local_ones() {
    let mut tree = build_with(person_schema(), json!({"age": -5}));
    let age = at(&tree, "age");
    tree.add_external_errors(vec![external(".age", "too young for this form")]);
    let errors = tree.node(age).unwrap().errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].keyword, "server");
    assert_eq!(errors[1].keyword, "minimum");
}

// ──────────────────────────────────────────────
// Events
// ──────────────────────────────────────────────

#[test]
fn subscribers_see_changes_until_unsubscribed() {
    let mut tree = build(person_schema());
    let name = at(&tree, "name");
    let seen: Rc<RefCell<Vec<NodeEvent>>> = Rc::default();
    let sink = seen.clone();
    let sub = tree
        .subscribe_to(name, EventKinds::only(EventKind::ValueChanged), move |_, event| {
            sink.borrow_mut().push(event.clone())
        })
        .unwrap();

    tree.set_value(name, Some(json!("Ada")));
    assert_eq!(
        seen.borrow().as_slice(),
        &[NodeEvent::ValueChanged {
            previous: None,
            current: Some(json!("Ada")),
        }]
    );

    assert!(tree.unsubscribe(sub));
    assert!(!tree.unsubscribe(sub));
    tree.set_value(name, Some(json!("Bob")));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn writes_mark_nodes_dirty_and_state_is_observable() {
    let mut tree = build(person_schema());
    let name = at(&tree, "name");
    let kinds: Rc<RefCell<Vec<EventKind>>> = Rc::default();
    let sink = kinds.clone();
    tree.subscribe(name, move |_, event| sink.borrow_mut().push(event.kind()));

    tree.set_value(name, Some(json!("Ada")));
    assert!(tree.node(name).unwrap().state().dirty);
    tree.set_touched(name, true);
    assert!(tree.node(name).unwrap().state().touched);
    tree.clear_state(tree.root());
    assert_eq!(tree.node(name).unwrap().state(), Default::default());

    let kinds = kinds.borrow();
    assert!(kinds.contains(&EventKind::ValueChanged));
    assert!(kinds.contains(&EventKind::StateChanged));
    assert!(kinds.contains(&EventKind::ErrorChanged));
}

#[test]
fn on_change_reports_initial_and_changed_root_values() {
    let reported: Rc<RefCell<Vec<Option<Value>>>> = Rc::default();
    let sink = reported.clone();
    let mut tree = TreeBuilder::new(person_schema())
        .on_change(move |value| sink.borrow_mut().push(value.cloned()))
        .build()
        .unwrap();
    assert_eq!(reported.borrow().as_slice(), &[Some(json!({}))]);

    let name = at(&tree, "name");
    tree.set_value(name, Some(json!("Ada")));
    tree.set_value(name, Some(json!("Ada")));
    assert_eq!(
        reported.borrow().as_slice(),
        &[Some(json!({})), Some(json!({"name": "Ada"}))]
    );
}

// ──────────────────────────────────────────────
// Building
// ──────────────────────────────────────────────

#[test]
fn defaults_fill_gaps_left_by_the_input() {
    let tree = build_with(
        json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "object",
                    "default": {"city": "Oslo"},
                    "properties": {
                        "city": {"type": "string"},
                        "country": {"type": "string", "default": "NO"}
                    }
                },
                "count": {"type": "integer", "default": 1}
            }
        }),
        json!({"count": 5}),
    );
    assert_eq!(
        tree.root_value(),
        Some(&json!({"address": {"city": "Oslo", "country": "NO"}, "count": 5}))
    );
}

#[test]
fn renderers_and_terminal_flag_decide_the_group() {
    let mut renderers = RendererRegistry::new();
    renderers.register_named("date-range");
    let tree = TreeBuilder::new(json!({
        "type": "object",
        "properties": {
            "range": {
                "type": "object",
                "formType": "date-range",
                "properties": {"from": {"type": "string"}}
            },
            "forced": {"type": "object", "formType": "date-range", "terminal": false,
                       "properties": {"x": {"type": "string"}}}
        }
    }))
    .renderers(renderers)
    .default_value(json!({"range": {"from": "2024", "extra": true}}))
    .build()
    .unwrap();

    let range = tree.node(at(&tree, "range")).unwrap();
    assert_eq!(range.group(), NodeGroup::Terminal);
    assert!(range.children().is_empty());
    assert_eq!(range.value(), Some(&json!({"from": "2024", "extra": true})));
    assert_eq!(tree.node(at(&tree, "forced")).unwrap().group(), NodeGroup::Branch);
}

#[test]
fn build_rejects_broken_schemas() {
    let code = |schema: Value| TreeBuilder::new(schema).build().unwrap_err().code();

    assert_eq!(
        code(json!({"oneOf": [{"properties": {"a": {}}}], "anyOf": [{"properties": {"b": {}}}]})),
        "COMPOSITION_UNSUPPORTED"
    );
    assert_eq!(
        code(json!({"type": "object", "properties": {"a": {}}, "oneOf": [{"properties": {"a": {}}}]})),
        "COMPOSITION_PROPERTY_REDEFINITION"
    );
    assert_eq!(
        code(json!({"type": "object", "properties": {
            "n": {"allOf": [{"type": "string"}, {"type": "number"}]}
        }})),
        "ALL_OF_TYPE_CONFLICT"
    );
    assert_eq!(
        code(json!({"type": "object", "properties": {
            "n": {"type": "string", "computed": {"visible": "../a ==="}}
        }})),
        "INVALID_EXPRESSION"
    );
    assert_eq!(code(json!(true)), "INVALID_SCHEMA");

    let err = TreeBuilder::new(json!({"type": "object", "properties": {
        "list": {"type": "array", "items": {"allOf": [{"minimum": 5}, {"maximum": 1}]}}
    }}))
    .build()
    .unwrap_err();
    assert!(matches!(err, BuildError::AllOfInvalidRange { .. }));
}

// ──────────────────────────────────────────────
// Conditional requiredness against the validator
// ──────────────────────────────────────────────

fn required_errors(tree: &FormTree) -> Vec<String> {
    let mut paths: Vec<String> = tree
        .all_errors()
        .into_iter()
        .filter(|e| e.keyword == "required")
        .map(|e| e.data_path)
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

#[test]
fn range_tests_in_if_do_not_force_requiredness() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "age": {"type": "integer"},
            "guardian": {"type": "string"}
        },
        "if": {"properties": {"age": {"maximum": 17}}, "required": ["age"]},
        "then": {"required": ["guardian"]}
    }));
    let age = at(&tree, "age");
    let guardian = at(&tree, "guardian");

    tree.set_value(age, Some(json!(40)));
    assert!(!tree.node(guardian).unwrap().is_required());
    assert!(required_errors(&tree).is_empty());
}

#[test]
fn else_nested_in_then_keeps_the_outer_guard() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "a": {"type": "integer"},
            "b": {"type": "integer"},
            "y": {"type": "string"}
        },
        "if": {"properties": {"a": {"const": 1}}, "required": ["a"]},
        "then": {
            "if": {"properties": {"b": {"const": 2}}, "required": ["b"]},
            "then": {},
            "else": {"required": ["y"]}
        }
    }));
    let root = tree.root();
    let y = at(&tree, "y");

    tree.set_value(root, Some(json!({"a": 5, "b": 3})));
    assert!(!tree.node(y).unwrap().is_required());
    assert!(required_errors(&tree).is_empty());

    tree.set_value(root, Some(json!({"a": 1, "b": 3})));
    assert!(tree.node(y).unwrap().is_required());
    assert_eq!(required_errors(&tree), vec![".y".to_string()]);

    tree.set_value(root, Some(json!({"a": 1, "b": 2})));
    assert!(!tree.node(y).unwrap().is_required());
}

#[test]
fn multi_field_else_applies_unless_every_field_matches() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "a": {"type": "integer"},
            "b": {"type": "integer"},
            "x": {"type": "string"}
        },
        "if": {"properties": {"a": {"const": 1}, "b": {"const": 2}}, "required": ["a", "b"]},
        "else": {"required": ["x"]}
    }));
    let root = tree.root();
    let x = at(&tree, "x");

    tree.set_value(root, Some(json!({"a": 1, "b": 3})));
    assert!(tree.node(x).unwrap().is_required());
    tree.set_value(root, Some(json!({"a": 1, "b": 2})));
    assert!(!tree.node(x).unwrap().is_required());
}

#[test]
fn guards_on_non_identifier_property_names() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "account type": {"type": "string"},
            "user.kind": {"type": "string"},
            "taxId": {"type": "string"}
        },
        "if": {"properties": {
            "account type": {"const": "company"},
            "user.kind": {"enum": ["owner", "admin"]}
        }},
        "then": {"required": ["taxId"]}
    }));
    let account = at(&tree, "account type");
    let user = at(&tree, "user.kind");
    let tax_id = at(&tree, "taxId");

    tree.set_value(account, Some(json!("company")));
    assert!(!tree.node(tax_id).unwrap().is_required());
    tree.set_value(user, Some(json!("admin")));
    assert!(tree.node(tax_id).unwrap().is_required());
    assert_eq!(required_errors(&tree), vec![".taxId".to_string()]);
}

#[test]
fn required_flags_agree_with_the_validator() {
    let mut tree = build(json!({
        "type": "object",
        "properties": {
            "a": {"type": "integer"},
            "b": {"type": "integer"},
            "x": {"type": "string"},
            "y": {"type": "string"},
            "z": {"type": "string"}
        },
        "if": {"properties": {"a": {"const": 1}, "b": {"const": 2}}, "required": ["a", "b"]},
        "then": {"required": ["x"]},
        "else": {
            "if": {"properties": {"a": {"enum": [1, 3]}}, "required": ["a"]},
            "then": {
                "required": ["y"],
                "if": {"properties": {"b": {"const": 4}}, "required": ["b"]},
                "then": {},
                "else": {"required": ["z"]}
            }
        }
    }));
    let root = tree.root();
    let fields = ["x", "y", "z"];
    let ids: Vec<NodeId> = fields.iter().map(|f| at(&tree, f)).collect();

    for a in 0..=4 {
        for b in 0..=4 {
            tree.set_value(root, Some(json!({"a": a, "b": b})));
            let from_validator = required_errors(&tree);
            for (field, id) in fields.iter().zip(&ids) {
                let flagged = tree.node(*id).unwrap().is_required();
                let reported = from_validator.contains(&format!(".{}", field));
                assert_eq!(
                    flagged, reported,
                    "field {} with a={} b={}: flagged {} but validator says {}",
                    field, a, b, flagged, reported
                );
            }
        }
    }
}
