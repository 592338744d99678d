//! Stage dependency DAG: build, cycle validation, and readiness queries.
//!
//! Built once from an [`AgentSpec`](crate::spec::AgentSpec)'s stages at
//! coordinator init. The coordinator calls [`Dag::find_ready_nodes`] on
//! every planning round with the set of completed stage names.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::spec::Stage;

/// Errors from DAG construction or validation.
///
/// A cycle or an unresolved dependency is fatal: the coordinator reports
/// it as a startup failure before spawning any workers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DagError {
    /// Two stages share a name.
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),
    /// A `depends_on` entry names a stage that is not in the spec.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },
    /// A stage depends on itself.
    #[error("stage '{0}' depends on itself")]
    SelfDependency(String),
    /// The dependency graph contains a cycle through `node`.
    #[error("dependency cycle involving stage '{node}' (path: {})", path.join(" -> "))]
    Cycle { node: String, path: Vec<String> },
}

/// Immutable stage dependency graph.
///
/// Nodes are keyed by stage name; `edges` maps a stage to its dependents
/// (reverse of `depends_on`); `roots` are stages with no dependencies.
/// Insertion order of the spec is preserved for deterministic planning.
#[derive(Debug, Clone)]
pub struct Dag {
    nodes: HashMap<String, Arc<Stage>>,
    /// Stage names in spec insertion order; readiness results follow it.
    order: Vec<String>,
    /// name -> names of stages that depend on it.
    edges: HashMap<String, Vec<String>>,
    /// Stages with an empty `depends_on`.
    roots: Vec<String>,
}

/// DFS color marking for cycle detection.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unseen,
    OnStack,
    Done,
}

impl Dag {
    /// Builds the graph in one pass over the stages.
    ///
    /// Rejects duplicate names, self-loops, and `depends_on` entries that
    /// do not resolve inside the spec. Acyclicity is checked separately by
    /// [`Dag::validate`]; [`Dag::build`] calls it before returning, so a
    /// returned `Dag` is always valid.
    pub fn build(stages: &[Stage]) -> Result<Self, DagError> {
        let mut nodes: HashMap<String, Arc<Stage>> = HashMap::with_capacity(stages.len());
        let mut order = Vec::with_capacity(stages.len());
        for stage in stages {
            if nodes.contains_key(&stage.name) {
                return Err(DagError::DuplicateStage(stage.name.clone()));
            }
            nodes.insert(stage.name.clone(), Arc::new(stage.clone()));
            order.push(stage.name.clone());
        }

        let mut edges: HashMap<String, Vec<String>> =
            order.iter().map(|n| (n.clone(), Vec::new())).collect();
        let mut roots = Vec::new();
        for stage in stages {
            if stage.depends_on.is_empty() {
                roots.push(stage.name.clone());
            }
            for dep in &stage.depends_on {
                if dep == &stage.name {
                    return Err(DagError::SelfDependency(stage.name.clone()));
                }
                match edges.get_mut(dep) {
                    Some(dependents) => dependents.push(stage.name.clone()),
                    None => {
                        return Err(DagError::UnknownDependency {
                            stage: stage.name.clone(),
                            dependency: dep.clone(),
                        })
                    }
                }
            }
        }

        let dag = Self {
            nodes,
            order,
            edges,
            roots,
        };
        dag.validate()?;
        Ok(dag)
    }

    /// Detects cycles with a three-color DFS (unseen / on-stack / done).
    ///
    /// Returns `DagError::Cycle` naming a node on the cycle and the path
    /// of on-stack nodes leading to the back edge.
    pub fn validate(&self) -> Result<(), DagError> {
        let mut marks: HashMap<&str, Mark> = self
            .order
            .iter()
            .map(|n| (n.as_str(), Mark::Unseen))
            .collect();

        for name in &self.order {
            if marks[name.as_str()] == Mark::Unseen {
                let mut path = Vec::new();
                self.visit(name, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<String>,
    ) -> Result<(), DagError> {
        marks.insert(name, Mark::OnStack);
        path.push(name.to_string());
        // Follow depends_on edges; a back edge onto the stack is a cycle.
        if let Some(stage) = self.nodes.get(name) {
            for dep in &stage.depends_on {
                match marks.get(dep.as_str()).copied().unwrap_or(Mark::Unseen) {
                    Mark::OnStack => {
                        let mut cycle_path = path.clone();
                        cycle_path.push(dep.clone());
                        return Err(DagError::Cycle {
                            node: dep.clone(),
                            path: cycle_path,
                        });
                    }
                    Mark::Unseen => {
                        let dep_key = self
                            .nodes
                            .get_key_value(dep.as_str())
                            .map(|(k, _)| k.as_str())
                            .unwrap_or(dep.as_str());
                        self.visit(dep_key, marks, path)?;
                    }
                    Mark::Done => {}
                }
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    /// Returns every stage not yet completed whose dependencies are all in
    /// `completed`. Order is deterministic by spec insertion.
    pub fn find_ready_nodes(&self, completed: &HashSet<String>) -> Vec<Arc<Stage>> {
        self.order
            .iter()
            .filter(|name| !completed.contains(*name))
            .filter_map(|name| self.nodes.get(name))
            .filter(|stage| stage.depends_on.iter().all(|d| completed.contains(d)))
            .cloned()
            .collect()
    }

    /// Returns the stage with the given name.
    pub fn get(&self, name: &str) -> Option<&Arc<Stage>> {
        self.nodes.get(name)
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stage names in spec insertion order.
    pub fn stage_names(&self) -> &[String] {
        &self.order
    }

    /// Stages with no dependencies.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Names of stages that depend on `name`.
    pub fn dependents(&self, name: &str) -> &[String] {
        self.edges.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
