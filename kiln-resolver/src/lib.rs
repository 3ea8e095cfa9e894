#![deny(warnings)]
#![deny(clippy::all)]

//! Resolves a requested set of goal names into the reachable subgraph, in dependency-first
//! (topological) order, detecting cycles and classifying unknown names as either source leaves
//! or missing inputs.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use kiln_registry::{Lookup, Registry, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The dependency chain rooted at `path[0]` loops back on itself; `path` lists the cyclic
    /// names in dependency order, repeating the first name at the end.
    Cycle { path: Vec<String> },
    /// A dependency name that is neither a registered target nor a path on disk.
    MissingInput { name: String },
    /// A goal explicitly requested on the command line (or the implicit `"all"`) is neither a
    /// registered target nor a path on disk.
    UnknownGoal { name: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Cycle { path } => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            ResolveError::MissingInput { name } => {
                write!(f, "{name:?} is not a registered target and does not exist on disk")
            }
            ResolveError::UnknownGoal { name } => {
                write!(f, "unknown goal {name:?}: not a registered target and does not exist on disk")
            }
        }
    }
}

impl Error for ResolveError {}

/// A target node in the resolved subgraph, paired with the canonical names of its dependencies
/// (source-leaf dependencies keep the literal name they were referenced by; target dependencies
/// are canonicalized to the target's primary output name).
#[derive(Debug)]
pub struct ResolvedNode {
    pub target: Arc<Target>,
    pub deps: Vec<String>,
}

/// The reachable subgraph from a set of goals, topologically ordered (every dependency appears
/// before its dependents).
#[derive(Debug)]
pub struct ResolvedGraph {
    /// Primary names, dependency-first.
    pub order: Vec<String>,
    nodes: IndexMap<String, ResolvedNode>,
}

impl ResolvedGraph {
    pub fn get(&self, name: &str) -> Option<&ResolvedNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in topological (dependency-first) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedNode)> {
        self.order.iter().map(move |name| (name.as_str(), &self.nodes[name]))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

struct Frame {
    canonical: String,
    target: Arc<Target>,
    deps: Vec<String>,
    dep_idx: usize,
    resolved_deps: Vec<String>,
}

/// Resolves `goals` (or `["all"]` if empty) against `registry`.
pub fn resolve(registry: &Registry, goals: &[String]) -> Result<ResolvedGraph, ResolveError> {
    let default_goal;
    let goals: &[String] = if goals.is_empty() {
        default_goal = ["all".to_string()];
        &default_goal
    } else {
        goals
    };

    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut nodes: IndexMap<String, ResolvedNode> = IndexMap::new();

    for goal in goals {
        match registry.lookup(goal) {
            Lookup::NotFound => {
                return Err(ResolveError::UnknownGoal { name: goal.clone() });
            }
            Lookup::Source => continue,
            Lookup::Target(target) => {
                let canonical = target.primary_name().to_string();
                if colors.get(&canonical) == Some(&Color::Black) {
                    continue;
                }
                colors.insert(canonical.clone(), Color::Gray);
                let mut stack = vec![Frame {
                    deps: target.inputs().to_vec(),
                    canonical,
                    target,
                    dep_idx: 0,
                    resolved_deps: Vec::new(),
                }];
                drain(registry, &mut stack, &mut colors, &mut order, &mut nodes)?;
            }
        }
    }

    Ok(ResolvedGraph { order, nodes })
}

/// Runs the explicit-stack DFS to exhaustion for the frames already pushed onto `stack`. Using
/// an explicit stack rather than recursion means a long dependency chain cannot overflow the
/// call stack.
fn drain(
    registry: &Registry,
    stack: &mut Vec<Frame>,
    colors: &mut HashMap<String, Color>,
    order: &mut Vec<String>,
    nodes: &mut IndexMap<String, ResolvedNode>,
) -> Result<(), ResolveError> {
    while let Some(top) = stack.last_mut() {
        if top.dep_idx >= top.deps.len() {
            let frame = stack.pop().unwrap();
            colors.insert(frame.canonical.clone(), Color::Black);
            if !nodes.contains_key(&frame.canonical) {
                order.push(frame.canonical.clone());
                nodes.insert(
                    frame.canonical.clone(),
                    ResolvedNode {
                        target: frame.target,
                        deps: frame.resolved_deps,
                    },
                );
            }
            if let Some(parent) = stack.last_mut() {
                parent.resolved_deps.push(frame.canonical);
                parent.dep_idx += 1;
            }
            continue;
        }

        let dep_name = top.deps[top.dep_idx].clone();
        match registry.lookup(&dep_name) {
            Lookup::NotFound => return Err(ResolveError::MissingInput { name: dep_name }),
            Lookup::Source => {
                let top = stack.last_mut().unwrap();
                top.resolved_deps.push(dep_name);
                top.dep_idx += 1;
            }
            Lookup::Target(dep_target) => {
                let dep_canonical = dep_target.primary_name().to_string();
                match colors.get(&dep_canonical) {
                    Some(Color::Black) => {
                        let top = stack.last_mut().unwrap();
                        top.resolved_deps.push(dep_canonical);
                        top.dep_idx += 1;
                    }
                    Some(Color::Gray) => {
                        let pos = stack
                            .iter()
                            .position(|f| f.canonical == dep_canonical)
                            .expect("gray node must be on the stack");
                        let mut path: Vec<String> =
                            stack[pos..].iter().map(|f| f.canonical.clone()).collect();
                        path.push(dep_canonical);
                        return Err(ResolveError::Cycle { path });
                    }
                    None => {
                        colors.insert(dep_canonical.clone(), Color::Gray);
                        stack.push(Frame {
                            deps: dep_target.inputs().to_vec(),
                            canonical: dep_canonical,
                            target: dep_target,
                            dep_idx: 0,
                            resolved_deps: Vec::new(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}
