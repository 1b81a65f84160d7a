//! The `inspect` subcommand: build a tree, apply `--set` writes, print it.

use std::path::Path;

use schemaform_core::{FormTree, JsonSchemaError, NodeGroup, NodeId, NodeType, TreeConfig};
use serde::Serialize;
use serde_json::Value;

use crate::{build_tree, exit_with, load, OutputFormat};

/// One live node as printed by `inspect --output json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeSummary {
    path: String,
    #[serde(rename = "type")]
    node_type: &'static str,
    terminal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    required: bool,
    visible: bool,
    read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    one_of_index: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<JsonSchemaError>,
}

pub(crate) fn cmd_inspect(
    schema_path: &Path,
    value_path: Option<&Path>,
    sets: &[String],
    config_path: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let schema = load::read_json(schema_path).unwrap_or_else(|msg| exit_with(&msg, output, quiet));
    let value = value_path.map(|path| {
        load::read_json(path).unwrap_or_else(|msg| exit_with(&msg, output, quiet))
    });
    let config = match config_path {
        Some(path) => load::read_config(path).unwrap_or_else(|msg| exit_with(&msg, output, quiet)),
        None => TreeConfig::default(),
    };
    let mut tree = build_tree(schema, value, config, output, quiet);

    for arg in sets {
        let (pointer, value) =
            load::parse_assignment(arg).unwrap_or_else(|msg| exit_with(&msg, output, quiet));
        let Some(id) = tree.find(tree.root(), &pointer) else {
            exit_with(&format!("no live node at '{}'", pointer), output, quiet);
        };
        tree.set_value(id, Some(value));
    }

    let summaries = outline(&tree);
    let errors = tree.all_errors();

    match output {
        OutputFormat::Text => print_text(&tree, &summaries, &errors),
        OutputFormat::Json => {
            let required: Vec<&str> = summaries
                .iter()
                .filter(|s| s.required)
                .map(|s| s.path.as_str())
                .collect();
            let result = serde_json::json!({
                "value": tree.root_value(),
                "required": required,
                "errors": errors,
                "nodes": summaries,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
        }
    }
}

/// Live nodes in depth-first order. Virtual nodes are listed but not
/// descended into, since their children are owned elsewhere.
fn outline(tree: &FormTree) -> Vec<NodeSummary> {
    let mut out = Vec::new();
    walk(tree, tree.root(), &mut out);
    out
}

fn walk(tree: &FormTree, id: NodeId, out: &mut Vec<NodeSummary>) {
    let Some(node) = tree.node(id) else {
        return;
    };
    let terminal = node.group() == NodeGroup::Terminal;
    let computed = node.computed();
    out.push(NodeSummary {
        path: node.path().to_string(),
        node_type: node.node_type().as_str(),
        terminal,
        value: if terminal { node.value().cloned() } else { None },
        required: node.is_required(),
        visible: computed.is_shown(),
        read_only: computed.read_only,
        one_of_index: node.one_of_index(),
        errors: node.errors(),
    });
    if node.node_type() == NodeType::Virtual {
        return;
    }
    for slot in node.children() {
        walk(tree, slot.node, out);
    }
}

fn print_text(tree: &FormTree, summaries: &[NodeSummary], errors: &[JsonSchemaError]) {
    let value = tree
        .root_value()
        .map(|v| serde_json::to_string_pretty(v).unwrap_or_default())
        .unwrap_or_else(|| "(none)".to_string());
    println!("value:\n{}", value);

    println!("\nnodes:");
    for summary in summaries {
        let depth = summary.path.matches('/').count();
        let name = summary.path.rsplit('/').next().unwrap_or_default();
        let name = if name.is_empty() { "(root)" } else { name };
        let mut line = format!("{}{} {}", "  ".repeat(depth), name, summary.node_type);
        if let Some(value) = &summary.value {
            line.push_str(&format!(" = {}", value));
        }
        if summary.required {
            line.push_str(" [required]");
        }
        if !summary.visible {
            line.push_str(" [hidden]");
        }
        if summary.read_only {
            line.push_str(" [read-only]");
        }
        if let Some(index) = summary.one_of_index {
            line.push_str(&format!(" [oneOf {}]", index));
        }
        println!("{}", line);
    }

    if errors.is_empty() {
        println!("\nerrors: none");
    } else {
        println!("\nerrors:");
        for error in errors {
            println!("  {}", format_error(error));
        }
    }
}

/// `<data path>: <keyword>: <message>`, with `(root)` for the empty path.
pub(crate) fn format_error(error: &JsonSchemaError) -> String {
    let path = if error.data_path.is_empty() {
        "(root)"
    } else {
        error.data_path.as_str()
    };
    format!("{}: {}: {}", path, error.keyword, error.message)
}
