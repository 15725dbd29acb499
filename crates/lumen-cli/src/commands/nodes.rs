//! Node type listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use lumen_core::{NodeRegistry, NodeSchema, ParamConstraint, ParamKind};

#[derive(Args)]
pub struct NodesArgs {
    /// Show details for a specific node type
    #[arg(value_name = "TYPE")]
    node_type: Option<String>,
}

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let registry = lumen_registry::builtin()?;

    if let Some(tag) = &args.node_type {
        let schema = registry
            .schemas()
            .find(|s| s.type_tag.eq_ignore_ascii_case(tag))
            .ok_or_else(|| anyhow::anyhow!("Unknown node type: {tag}"))?;
        print_details(&registry, schema);
        return Ok(());
    }

    println!("Available Node Types");
    println!("====================");
    println!();
    println!("  {:14}  {:10}  {:6}  {}", "Type", "Category", "Inputs", "Description");
    println!("  {:14}  {:10}  {:6}  {}", "----", "--------", "------", "-----------");

    let mut schemas: Vec<_> = registry.schemas().collect();
    schemas.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.type_tag.cmp(&b.type_tag))
    });
    for schema in schemas {
        let inputs = format!("{}+{}", schema.main_inputs, schema.control_inputs);
        println!(
            "  {:14}  {:10}  {:6}  {}",
            schema.type_tag,
            schema.category.name(),
            inputs,
            schema.description
        );
    }

    println!();
    println!("Inputs are main (image) + control (scalar) slots.");
    println!("Use 'lumen nodes <TYPE>' for parameter details.");
    Ok(())
}

fn print_details(registry: &NodeRegistry, schema: &NodeSchema) {
    println!("{}", schema.display_name);
    println!("{}", "=".repeat(schema.display_name.len()));
    println!();
    println!("{}", schema.description);
    println!();
    println!("  Type tag:       {}", schema.type_tag);
    println!("  Program key:    {}", schema.program_key);
    println!("  Category:       {}", schema.category.name());
    println!("  Main inputs:    {}", schema.main_inputs);
    println!("  Control inputs: {}", schema.control_inputs);
    if schema.terminal {
        println!("  Terminal:       yes (one per graph, cannot be deleted)");
    }

    if schema.params.is_empty() {
        return;
    }
    println!();
    println!("Parameters:");
    println!();
    println!("  {:12}  {:8}  {:28}  {}", "Name", "Kind", "Default", "Range");
    println!("  {:12}  {:8}  {:28}  {}", "----", "----", "-------", "-----");
    for (name, default) in &schema.params {
        let (kind, range) = match registry.constraints().get(name) {
            Some(c) => (kind_label(c), range_label(c)),
            None => ("?", String::new()),
        };
        println!(
            "  {:12}  {:8}  {:28}  {}",
            name,
            kind,
            default.to_string(),
            range
        );
    }
}

fn kind_label(c: &ParamConstraint) -> &'static str {
    if c.is_toggle() { "toggle" } else { c.kind.name() }
}

fn range_label(c: &ParamConstraint) -> String {
    match c.kind {
        ParamKind::EnumString => c.allowed_values.join(" | "),
        ParamKind::Color => "rgba, 0..1 per channel".to_string(),
        _ if c.is_toggle() => "off | on".to_string(),
        _ => format!("{} .. {}", c.min, c.max),
    }
}
