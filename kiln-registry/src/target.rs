use std::fmt;

use crate::shell::Shell;

/// The outputs, inputs, and shell handle an [`Action`] runs with.
pub struct JobContext<'a> {
    pub outputs: &'a [String],
    pub inputs: &'a [String],
    pub shell: &'a Shell,
}

/// The side-effecting operation associated with a file target.
///
/// Blanket-implemented for any `Fn(&JobContext) -> Result<(), String>`, so host programs register
/// plain closures rather than implementing a trait by hand.
pub trait Action: Send + Sync {
    fn run(&self, ctx: &JobContext) -> Result<(), String>;
}

impl<F> Action for F
where
    F: Fn(&JobContext) -> Result<(), String> + Send + Sync,
{
    fn run(&self, ctx: &JobContext) -> Result<(), String> {
        self(ctx)
    }
}

/// A file target: produces `outputs` from `inputs` by running `action`.
pub struct FileTarget {
    pub outputs: Vec<String>,
    pub inputs: Vec<String>,
    pub action: Box<dyn Action>,
    pub desc: Option<String>,
    pub serial_class: Option<String>,
    pub use_hash: bool,
}

impl fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTarget")
            .field("outputs", &self.outputs)
            .field("inputs", &self.inputs)
            .field("desc", &self.desc)
            .field("serial_class", &self.serial_class)
            .field("use_hash", &self.use_hash)
            .finish_non_exhaustive()
    }
}

/// A named alias with no file output, used for grouping goals.
#[derive(Debug)]
pub struct PhonyTarget {
    pub name: String,
    pub inputs: Vec<String>,
    pub desc: Option<String>,
}

#[derive(Debug)]
pub enum Target {
    File(FileTarget),
    Phony(PhonyTarget),
}

impl Target {
    /// The output name a dependent edge or lexicographic tie-break refers to: the first declared
    /// output for a file target, or the alias name for a phony.
    pub fn primary_name(&self) -> &str {
        match self {
            Target::File(t) => &t.outputs[0],
            Target::Phony(t) => &t.name,
        }
    }

    /// All names this target is reachable by (every output, or the single phony name).
    pub fn names(&self) -> &[String] {
        match self {
            Target::File(t) => &t.outputs,
            Target::Phony(t) => std::slice::from_ref(&t.name),
        }
    }

    pub fn inputs(&self) -> &[String] {
        match self {
            Target::File(t) => &t.inputs,
            Target::Phony(t) => &t.inputs,
        }
    }

    pub fn desc(&self) -> Option<&str> {
        match self {
            Target::File(t) => t.desc.as_deref(),
            Target::Phony(t) => t.desc.as_deref(),
        }
    }

    pub fn serial_class(&self) -> Option<&str> {
        match self {
            Target::File(t) => t.serial_class.as_deref(),
            Target::Phony(_) => None,
        }
    }

    pub fn is_phony(&self) -> bool {
        matches!(self, Target::Phony(_))
    }
}
