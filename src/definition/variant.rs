//! Variant selection (spec §4.1), applied to the whole definition tree
//! before typed components are created.
//!
//! Three layers, applied in order:
//!
//! 1. Explicit `--variant regex=name` directives: every node anywhere in the
//!    tree whose `name` matches `regex` is enabled iff its own `variant`
//!    equals `name` (this both turns the wanted variant on and turns off
//!    every other variant sharing that name).
//! 2. The default-variant rule: for any sibling group that directive (1)
//!    left untouched and that contains more than one definition of the same
//!    `name`, if one sibling has no `variant` (the default), it alone stays
//!    enabled and the others are disabled.
//! 3. `--include`/`--exclude` regex filters and an `--enable` name list,
//!    applied tree-wide on top of the result of (1) and (2).
//!
//! Disabled nodes are then pruned from the tree entirely.

use std::collections::HashSet;

use regex::Regex;

use super::DefinitionNode;

/// One `--variant regex=name` CLI directive.
#[derive(Clone, Debug)]
pub struct VariantDirective {
    pub name_regex: Regex,
    pub variant: String,
}

#[derive(Clone, Debug, Default)]
pub struct Filters {
    pub directives: Vec<VariantDirective>,
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
    pub enable: Vec<String>,
}

/// Runs all three layers and prunes disabled nodes, in place.
pub fn select(nodes: &mut Vec<DefinitionNode>, filters: &Filters) {
    let mut touched = HashSet::new();
    apply_directives(nodes, &filters.directives, &mut touched);
    apply_default_variant_rule(nodes, &touched);
    apply_name_filters(nodes, filters);
    prune_disabled(nodes);
}

fn apply_directives(
    nodes: &mut [DefinitionNode],
    directives: &[VariantDirective],
    touched: &mut HashSet<String>,
) {
    for node in nodes.iter_mut() {
        for directive in directives {
            if directive.name_regex.is_match(&node.name) {
                touched.insert(node.name.clone());
                node.enabled = node.variant.as_deref() == Some(directive.variant.as_str());
            }
        }
        apply_directives(&mut node.children, directives, touched);
    }
}

/// For each sibling group untouched by an explicit directive, if more than
/// one sibling shares a name and one of them carries no `variant`, keep only
/// that default enabled.
fn apply_default_variant_rule(nodes: &mut [DefinitionNode], touched: &HashSet<String>) {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for node in nodes.iter() {
        *counts.entry(node.name.as_str()).or_default() += 1;
    }
    let has_default: std::collections::HashMap<&str, bool> = nodes
        .iter()
        .filter(|n| counts[n.name.as_str()] > 1)
        .map(|n| (n.name.as_str(), ()))
        .map(|(name, ())| (name, nodes.iter().any(|n| n.name == name && n.variant.is_none())))
        .collect();

    for node in nodes.iter_mut() {
        if touched.contains(&node.name) {
            continue;
        }
        if counts[node.name.as_str()] > 1 && *has_default.get(node.name.as_str()).unwrap_or(&false)
        {
            node.enabled = node.variant.is_none();
        }
    }

    for node in nodes.iter_mut() {
        apply_default_variant_rule(&mut node.children, touched);
    }
}

fn apply_name_filters(nodes: &mut [DefinitionNode], filters: &Filters) {
    for node in nodes.iter_mut() {
        if !filters.include.is_empty() && !filters.include.iter().any(|r| r.is_match(&node.name)) {
            node.enabled = false;
        }
        if filters.exclude.iter().any(|r| r.is_match(&node.name)) {
            node.enabled = false;
        }
        if filters.enable.iter().any(|n| n == &node.name) {
            node.enabled = true;
        }
        apply_name_filters(&mut node.children, filters);
    }
}

fn prune_disabled(nodes: &mut Vec<DefinitionNode>) {
    nodes.retain(|n| n.enabled);
    for node in nodes.iter_mut() {
        prune_disabled(&mut node.children);
    }
}
