//! DAG visualization utilities.
//!
//! Exports a stage dependency graph to Graphviz DOT for rendering, or to
//! a plain-text outline of the execution waves, for debugging agent
//! specs.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::dag::Dag;

/// Generates a Graphviz DOT representation of the dependency graph.
///
/// Roots are highlighted; edges point from a stage to its dependents
/// (the direction execution flows).
pub fn generate_dot(dag: &Dag) -> String {
    let mut dot = String::from("digraph stages {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=box];\n\n");

    let roots: HashSet<&str> = dag.roots().iter().map(String::as_str).collect();
    for name in dag.stage_names() {
        if roots.contains(name.as_str()) {
            let _ = writeln!(dot, "  \"{}\" [style=bold];", name);
        } else {
            let _ = writeln!(dot, "  \"{}\";", name);
        }
    }

    dot.push('\n');
    for name in dag.stage_names() {
        for dependent in dag.dependents(name) {
            let _ = writeln!(dot, "  \"{}\" -> \"{}\";", name, dependent);
        }
    }

    dot.push_str("}\n");
    dot
}

/// Generates a plain-text outline: one line per execution wave, where a
/// wave holds the stages whose dependencies are satisfied by the waves
/// above it.
pub fn generate_text(dag: &Dag) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Stage graph ({} stages):", dag.len());

    let mut completed: HashSet<String> = HashSet::new();
    let mut wave = 1usize;
    while completed.len() < dag.len() {
        let ready = dag.find_ready_nodes(&completed);
        if ready.is_empty() {
            break;
        }
        let names: Vec<&str> = ready.iter().map(|s| s.name.as_str()).collect();
        let _ = writeln!(text, "  wave {}: {}", wave, names.join(", "));
        for stage in ready {
            completed.insert(stage.name.clone());
        }
        wave += 1;
    }

    text
}
