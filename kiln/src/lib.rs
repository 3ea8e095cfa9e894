#![deny(warnings)]
#![deny(clippy::all)]

//! The embedding surface a host program links against: an [`Engine`] that accumulates target
//! registrations, then drives a requested set of goals to completion (or prints a plan, or lists
//! targets, or cleans outputs) from a small `argv` surface.

mod cli;

pub use cli::Cli;
pub use kiln_registry::{Action, JobContext, RegistrationError};

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kiln_digest_store::DigestStore;
use kiln_executor::ExecutorConfig;
use kiln_registry::Registry;
use kiln_task_executor::Executor;
use parking_lot::Mutex;

/// How a `serial=true` registration picks its concurrency class.
pub enum Serial {
    /// Named after the target's first declared output.
    Auto,
    /// An explicit tag, shared by every target registered with the same tag.
    Tagged(String),
}

/// The engine's configuration, supplied once at construction. CLI flags parsed by
/// [`Engine::main`] may override individual fields for the duration of one run.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// The default freshness policy for targets that don't pass an explicit `use_hash` override
    /// to [`Engine::file`].
    pub use_hash: bool,
    pub n_jobs: usize,
    pub n_serial: usize,
    pub keep_going: bool,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            use_hash: false,
            n_jobs: 1,
            n_serial: 1,
            keep_going: true,
        }
    }
}

/// The host-owned instance tying the registry, resolver, freshness oracle, digest store, and
/// executor together. Registration (`file`/`phony`) happens before [`Engine::main`] is called;
/// the registry is immutable from that point on.
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
    working_dir: PathBuf,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine {
            registry: Registry::new(),
            config,
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Like [`Engine::new`], but pins the working directory the digest store lives under, rather
    /// than reading the process's actual current directory. Host programs that want a
    /// project-relative store path, and tests that must not depend on process-global cwd, use
    /// this instead.
    pub fn with_working_dir(config: EngineConfig, working_dir: PathBuf) -> Engine {
        Engine {
            registry: Registry::new(),
            config,
            working_dir,
        }
    }

    /// Registers a file target producing `outputs` from `inputs` by running `action`.
    #[allow(clippy::too_many_arguments)]
    pub fn file(
        &mut self,
        outputs: Vec<String>,
        inputs: Vec<String>,
        action: Box<dyn Action>,
        desc: Option<String>,
        serial: Option<Serial>,
        use_hash: Option<bool>,
    ) -> Result<(), RegistrationError> {
        let serial_class = serial.map(|s| match s {
            Serial::Auto => outputs[0].clone(),
            Serial::Tagged(tag) => tag,
        });
        let use_hash = use_hash.unwrap_or(self.config.use_hash);
        self.registry
            .register_file(outputs, inputs, action, desc, serial_class, use_hash)
    }

    /// Registers a phony alias named `name` depending on `inputs`.
    pub fn phony(
        &mut self,
        name: String,
        inputs: Vec<String>,
        desc: Option<String>,
    ) -> Result<(), RegistrationError> {
        self.registry.register_phony(name, inputs, desc)
    }

    /// Parses `argv`, configures logging, and runs whichever mode the flags select. Returns the
    /// process exit code: 0 success, 1 target failure, 2 usage or registration error, 3 cycle or
    /// missing input.
    pub fn main<I, T>(&mut self, argv: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                return 2;
            }
        };

        let level = match &cli.log {
            Some(raw) => match kiln_logging::parse_level(raw) {
                Ok(level) => Some(level),
                Err(message) => {
                    eprintln!("invalid --log value: {message}");
                    return 2;
                }
            },
            None => None,
        };
        kiln_logging::init(level);

        if cli.targets {
            for (name, desc) in self.registry.iter_descriptions() {
                match desc {
                    Some(desc) => println!("{name}\t{desc}"),
                    None => println!("{name}"),
                }
            }
            return 0;
        }

        let graph = match kiln_resolver::resolve(&self.registry, &cli.goals) {
            Ok(graph) => graph,
            Err(e) => {
                eprintln!("{e}");
                return 3;
            }
        };

        if cli.dry_run {
            kiln_executor::print_plan(&graph);
            return 0;
        }

        let store_path = DigestStore::default_path(&self.working_dir);
        let mut store = match DigestStore::load(store_path) {
            Ok(store) => store,
            Err(e) => {
                eprintln!("failed to load digest store: {e}");
                return 2;
            }
        };

        if cli.clean {
            for (_, node) in graph.iter() {
                if let kiln_registry::Target::File(file_target) = node.target.as_ref() {
                    kiln_registry::Shell::new().rm(&file_target.outputs);
                    if cli.digests {
                        store.clear_target(&file_target.outputs[0]);
                    }
                }
            }
            if let Err(e) = store.save() {
                eprintln!("failed to save digest store: {e}");
                return 2;
            }
            return 0;
        }

        let cfg = ExecutorConfig {
            j: cli.jobs.max(1),
            s: cli.n_serial.max(1),
            keep_going: cli.keep_going,
            use_hash_override: cli.use_hash,
        };
        let digest_store = Arc::new(Mutex::new(store));
        let exec = Executor::new_owned(cfg.j.min(num_cpus::get().max(1))).unwrap_or_else(|e| {
            panic!("failed to start the engine's runtime: {e}");
        });
        let summary = exec.block_on(kiln_executor::run(&exec, &graph, digest_store, cfg));
        exec.shutdown(std::time::Duration::from_secs(5));

        for failed in &summary.failed {
            log::error!("{failed}: failed");
        }
        for cancelled in &summary.cancelled {
            log::warn!("{cancelled}: cancelled");
        }

        if summary.all_succeeded() {
            0
        } else {
            1
        }
    }
}

/// Runs `action(ctx)` once per element of `items`, short-circuiting on the first error. Exists so
/// a host program can compose repeated registrations (e.g. one `sh` call per source file) without
/// writing the loop by hand each time.
pub fn loop_over<'a, T>(
    items: &'a [T],
    action: impl Fn(&JobContext, &T) -> Result<(), String> + 'a,
) -> impl Fn(&JobContext) -> Result<(), String> + 'a {
    move |ctx: &JobContext| {
        for item in items {
            action(ctx, item)?;
        }
        Ok(())
    }
}

/// Runs `cmd` under the job's configured shell. Fails the containing action on non-zero exit.
pub fn sh(ctx: &JobContext, cmd: &str) -> Result<(), String> {
    ctx.shell.run(cmd)
}

/// Unlinks every path, ignoring any that are already absent.
pub fn rm<P: AsRef<std::path::Path>>(ctx: &JobContext, paths: &[P]) {
    ctx.shell.rm(paths);
}
