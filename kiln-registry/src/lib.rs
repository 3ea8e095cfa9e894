#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::too_many_arguments)]

//! The target registry: accumulates rule definitions keyed by output name, and enforces
//! registration-time invariants (unique outputs, unique phony names).

mod error;
mod shell;
mod target;

pub use error::RegistrationError;
pub use shell::Shell;
pub use target::{Action, FileTarget, JobContext, PhonyTarget, Target};

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

/// The result of resolving a name against the registry and, failing that, the filesystem.
pub enum Lookup {
    Target(Arc<Target>),
    /// Not a registered target, but exists on disk: a leaf input.
    Source,
    NotFound,
}

/// Accumulates [`Target`]s during the host program's construction phase. Immutable once built:
/// there is no API to mutate an entry after registration, only to add new ones.
#[derive(Default)]
pub struct Registry {
    by_name: IndexMap<String, Arc<Target>>,
    order: Vec<Arc<Target>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a file target producing `outputs` from `inputs` by running `action`.
    pub fn register_file(
        &mut self,
        outputs: Vec<String>,
        inputs: Vec<String>,
        action: Box<dyn Action>,
        desc: Option<String>,
        serial_class: Option<String>,
        use_hash: bool,
    ) -> Result<(), RegistrationError> {
        if outputs.is_empty() {
            return Err(RegistrationError::BadArgument {
                message: "a file target must declare at least one output".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for output in &outputs {
            if !seen.insert(output.as_str()) {
                return Err(RegistrationError::BadArgument {
                    message: format!("output {output:?} declared twice in the same target"),
                });
            }
        }
        for output in &outputs {
            if self.by_name.contains_key(output) {
                return Err(RegistrationError::DuplicateTarget {
                    name: output.clone(),
                });
            }
        }

        let target = Arc::new(Target::File(FileTarget {
            outputs: outputs.clone(),
            inputs,
            action,
            desc,
            serial_class,
            use_hash,
        }));
        for output in outputs {
            self.by_name.insert(output, target.clone());
        }
        self.order.push(target);
        Ok(())
    }

    /// Registers a phony alias named `name` depending on `inputs`.
    pub fn register_phony(
        &mut self,
        name: String,
        inputs: Vec<String>,
        desc: Option<String>,
    ) -> Result<(), RegistrationError> {
        if self.by_name.contains_key(&name) {
            return Err(RegistrationError::DuplicateTarget { name });
        }
        let target = Arc::new(Target::Phony(PhonyTarget {
            name: name.clone(),
            inputs,
            desc,
        }));
        self.by_name.insert(name, target.clone());
        self.order.push(target);
        Ok(())
    }

    /// Resolves `name` against the registry, falling back to the filesystem for source leaves.
    pub fn lookup(&self, name: &str) -> Lookup {
        if let Some(target) = self.by_name.get(name) {
            Lookup::Target(target.clone())
        } else if Path::new(name).exists() {
            Lookup::Source
        } else {
            Lookup::NotFound
        }
    }

    /// True if `name` is registered as a target (not a source or missing).
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All registered targets, one entry per target (not per output), in registration order,
    /// paired with their description. Backs the driver's `-t`/`--targets` listing.
    pub fn iter_descriptions(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.order
            .iter()
            .map(|t| (t.primary_name(), t.desc()))
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
