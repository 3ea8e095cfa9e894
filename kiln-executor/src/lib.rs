#![deny(warnings)]
#![deny(clippy::all)]

//! The parallel scheduler: dispatches targets from a resolved subgraph to workers honoring a
//! global parallelism bound and a per-serial-class bound, and the deterministic dry-run printer.

mod dry_run;

pub use dry_run::{print_plan, render_plan};

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use kiln_digest_store::DigestStore;
use kiln_registry::{JobContext, Shell, Target};
use kiln_resolver::ResolvedGraph;
use kiln_task_executor::Executor;
use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Bounds the scheduler operates under.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Global parallelism cap (`J`). At least 1.
    pub j: usize,
    /// Per-serial-class concurrency cap (`S`). At least 1.
    pub s: usize,
    /// When false, the scheduler refuses to dispatch new work after the first failure. Already
    /// running actions still finish.
    pub keep_going: bool,
    /// Overrides every target's own `use_hash` for this run, e.g. from a driver `--use-hash`
    /// flag. `None` defers to each target's registered policy.
    pub use_hash_override: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    Cancelled,
}

/// An execution-time failure, localized to a single target.
#[derive(Debug)]
pub enum ExecutionError {
    /// The action returned an error (non-zero shell exit, or the closure's own `Err`).
    ActionFailed(String),
    /// The action returned success but a declared output does not exist afterward.
    OutputMissing { output: String },
    /// The freshness oracle or digest store could not be consulted.
    Freshness(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::ActionFailed(message) => write!(f, "action failed: {message}"),
            ExecutionError::OutputMissing { output } => {
                write!(f, "declared output {output:?} was not created")
            }
            ExecutionError::Freshness(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ExecutionError {}

/// What happened to each target that did not reach `done`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub failed: Vec<String>,
    pub cancelled: Vec<String>,
    /// Set when a SIGINT arrived mid-run. Some requested goals may not have reached `done` even
    /// though nothing failed; callers should treat this as an unsuccessful run.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty() && !self.interrupted
    }
}

struct Shared {
    nodes: HashMap<String, Arc<Target>>,
    dependents: HashMap<String, Vec<String>>,
    remaining: HashMap<String, usize>,
    status: HashMap<String, TargetStatus>,
    running_global: usize,
    running_by_class: HashMap<String, usize>,
    in_flight: usize,
    any_failed: bool,
    failed: Vec<String>,
    cancelled: Vec<String>,
    interrupted: bool,
}

/// Runs every target in `graph` to completion (or failure/cancellation), honoring `cfg`. Blocks
/// the calling task until the whole subgraph has quiesced.
pub async fn run(
    exec: &Executor,
    graph: &ResolvedGraph,
    digest_store: Arc<Mutex<DigestStore>>,
    cfg: ExecutorConfig,
) -> RunSummary {
    let mut nodes = HashMap::new();
    let mut deps_of: HashMap<String, Vec<String>> = HashMap::new();
    for (name, node) in graph.iter() {
        nodes.insert(name.to_string(), node.target.clone());
        deps_of.insert(name.to_string(), node.deps.clone());
    }

    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut remaining = HashMap::new();
    let mut status = HashMap::new();
    for (name, deps) in &deps_of {
        let tracked: Vec<&String> = deps.iter().filter(|d| nodes.contains_key(*d)).collect();
        remaining.insert(name.clone(), tracked.len());
        status.insert(
            name.clone(),
            if tracked.is_empty() {
                TargetStatus::Ready
            } else {
                TargetStatus::Pending
            },
        );
        for dep in tracked {
            dependents.entry(dep.clone()).or_default().push(name.clone());
        }
    }

    let shared = Arc::new(Mutex::new(Shared {
        nodes,
        dependents,
        remaining,
        status,
        running_global: 0,
        running_by_class: HashMap::new(),
        in_flight: 0,
        any_failed: false,
        failed: Vec::new(),
        cancelled: Vec::new(),
        interrupted: false,
    }));
    let notify = Arc::new(Notify::new());

    {
        let shared = shared.clone();
        let notify = notify.clone();
        let _ = exec.spawn(
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted: no new work will start, waiting for in-flight actions to finish");
                    let mut s = shared.lock();
                    s.interrupted = true;
                    drop(s);
                    notify.notify_waiters();
                }
            },
            |_join_error| (),
        );
    }

    loop {
        {
            let mut s = shared.lock();
            let fail_fast = !cfg.keep_going && s.any_failed;
            if fail_fast {
                // No new work will ever be dispatched again; a target left `Pending`/`Ready`
                // would otherwise block quiescence forever. Cancel them so the run terminates.
                cancel_non_terminal(&mut s);
            } else if !s.interrupted {
                let mut candidates: Vec<String> = s
                    .status
                    .iter()
                    .filter(|(_, st)| **st == TargetStatus::Ready)
                    .map(|(name, _)| name.clone())
                    .collect();
                candidates.sort();

                for name in candidates {
                    if s.running_global >= cfg.j {
                        break;
                    }
                    let target = s.nodes[&name].clone();
                    if let Some(class) = target.serial_class() {
                        let running_in_class = s.running_by_class.get(class).copied().unwrap_or(0);
                        if running_in_class >= cfg.s {
                            continue;
                        }
                        *s.running_by_class.entry(class.to_string()).or_insert(0) += 1;
                    }
                    s.running_global += 1;
                    s.in_flight += 1;
                    s.status.insert(name.clone(), TargetStatus::Running);

                    let shared = shared.clone();
                    let notify = notify.clone();
                    let digest_store = digest_store.clone();
                    let exec_for_task = exec.to_borrowed();
                    let use_hash_override = cfg.use_hash_override;
                    let _ = exec.spawn(
                        async move {
                            run_one(
                                name,
                                target,
                                shared,
                                digest_store,
                                exec_for_task,
                                notify,
                                use_hash_override,
                            )
                            .await;
                        },
                        |_join_error| (),
                    );
                }
            }

            let quiescent = s.in_flight == 0
                && (s.interrupted
                    || fail_fast
                    || s.status
                        .values()
                        .all(|st| !matches!(st, TargetStatus::Running | TargetStatus::Ready)));
            if quiescent {
                return RunSummary {
                    failed: s.failed.clone(),
                    cancelled: s.cancelled.clone(),
                    interrupted: s.interrupted,
                };
            }
        }
        notify.notified().await;
    }
}

async fn run_one(
    name: String,
    target: Arc<Target>,
    shared: Arc<Mutex<Shared>>,
    digest_store: Arc<Mutex<DigestStore>>,
    exec: Executor,
    notify: Arc<Notify>,
    use_hash_override: Option<bool>,
) {
    let outcome = match target.as_ref() {
        Target::Phony(_) => {
            debug!("{name:?} is phony, nothing to build");
            TargetStatus::Done
        }
        Target::File(_) => {
            let target_for_blocking = target.clone();
            let digest_store_for_blocking = digest_store.clone();
            let result = exec
                .spawn_blocking(
                    move || {
                        execute_file_target(
                            &target_for_blocking,
                            use_hash_override,
                            &digest_store_for_blocking,
                        )
                    },
                    |_join_error| Err(ExecutionError::ActionFailed("action panicked".to_string())),
                )
                .await;
            match result {
                Ok(()) => TargetStatus::Done,
                Err(e) => {
                    error!("{name:?} failed: {e}");
                    TargetStatus::Failed
                }
            }
        }
    };

    let mut s = shared.lock();
    s.running_global -= 1;
    if let Some(class) = target.serial_class() {
        if let Some(count) = s.running_by_class.get_mut(class) {
            *count -= 1;
        }
    }
    s.in_flight -= 1;
    s.status.insert(name.clone(), outcome);
    if outcome == TargetStatus::Failed {
        s.any_failed = true;
        s.failed.push(name.clone());
    }

    match outcome {
        TargetStatus::Done => {
            if let Some(dependents) = s.dependents.get(&name).cloned() {
                for dependent in dependents {
                    let rem = s.remaining.get_mut(&dependent).expect("tracked dependent has a remaining count");
                    *rem -= 1;
                    if *rem == 0 && s.status.get(&dependent) == Some(&TargetStatus::Pending) {
                        s.status.insert(dependent, TargetStatus::Ready);
                    }
                }
            }
        }
        TargetStatus::Failed => {
            if let Some(dependents) = s.dependents.get(&name).cloned() {
                for dependent in dependents {
                    cancel_transitively(&mut s, &dependent);
                }
            }
        }
        _ => unreachable!("run_one only produces Done or Failed"),
    }

    drop(s);
    notify.notify_waiters();
}

fn cancel_transitively(s: &mut Shared, start: &str) {
    let mut stack = vec![start.to_string()];
    while let Some(name) = stack.pop() {
        let current = s.status.get(&name).copied().unwrap_or(TargetStatus::Pending);
        if matches!(
            current,
            TargetStatus::Done | TargetStatus::Failed | TargetStatus::Cancelled
        ) {
            continue;
        }
        warn!("{name:?} cancelled: a predecessor failed");
        s.status.insert(name.clone(), TargetStatus::Cancelled);
        s.cancelled.push(name.clone());
        if let Some(dependents) = s.dependents.get(&name) {
            stack.extend(dependents.iter().cloned());
        }
    }
}

/// Cancels every target still `Pending` or `Ready`. Called once fail-fast has refused to
/// dispatch any further work, so these targets — whether or not they depend on the failure —
/// will otherwise sit forever in a non-terminal state and the run would never quiesce.
fn cancel_non_terminal(s: &mut Shared) {
    let names: Vec<String> = s
        .status
        .iter()
        .filter(|(_, st)| matches!(st, TargetStatus::Pending | TargetStatus::Ready))
        .map(|(name, _)| name.clone())
        .collect();
    for name in names {
        warn!("{name:?} cancelled: fail-fast after an earlier failure");
        s.status.insert(name.clone(), TargetStatus::Cancelled);
        s.cancelled.push(name);
    }
}

/// Runs on a blocking thread: checks freshness, invokes the action if stale, verifies outputs,
/// persists digests on success.
fn execute_file_target(
    target: &Target,
    use_hash_override: Option<bool>,
    digest_store: &Mutex<DigestStore>,
) -> Result<(), ExecutionError> {
    let Target::File(file_target) = target else {
        unreachable!("only file targets reach execute_file_target");
    };
    let use_hash = use_hash_override.unwrap_or(file_target.use_hash);

    let fresh = {
        let store = digest_store.lock();
        kiln_freshness::is_fresh(file_target, use_hash, &store)
            .map_err(|e| ExecutionError::Freshness(e.to_string()))?
    };
    if fresh {
        debug!("{:?} up to date, skipping action", file_target.outputs[0]);
        return Ok(());
    }

    let shell = Shell::new();
    let ctx = JobContext {
        outputs: &file_target.outputs,
        inputs: &file_target.inputs,
        shell: &shell,
    };
    file_target
        .action
        .run(&ctx)
        .map_err(ExecutionError::ActionFailed)?;

    for output in &file_target.outputs {
        if !Path::new(output).exists() {
            return Err(ExecutionError::OutputMissing {
                output: output.clone(),
            });
        }
    }

    {
        let mut store = digest_store.lock();
        kiln_freshness::record_success(file_target, use_hash, &mut store)
            .map_err(|e| ExecutionError::Freshness(e.to_string()))?;
        store.save().map_err(|e| ExecutionError::Freshness(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_registry::{Action, Registry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn touch(path: String) -> Box<dyn Action> {
        Box::new(move |_ctx: &JobContext| {
            std::fs::write(&path, b"built").map_err(|e| e.to_string())
        })
    }

    fn digest_store(dir: &Path) -> Arc<Mutex<DigestStore>> {
        Arc::new(Mutex::new(
            DigestStore::load(DigestStore::default_path(dir)).unwrap(),
        ))
    }

    #[tokio::test]
    async fn chain_runs_in_dependency_order_and_all_reach_done() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").to_str().unwrap().to_string();
        let b = dir.path().join("b").to_str().unwrap().to_string();

        let mut reg = Registry::new();
        reg.register_file(vec![b.clone()], vec![], touch(b.clone()), None, None, false)
            .unwrap();
        reg.register_file(vec![a.clone()], vec![b.clone()], touch(a.clone()), None, None, false)
            .unwrap();

        let graph = kiln_resolver::resolve(&reg, &[a.clone()]).unwrap();
        let exec = Executor::new();
        let summary = run(
            &exec,
            &graph,
            digest_store(dir.path()),
            ExecutorConfig { j: 4, s: 1, keep_going: true, use_hash_override: None },
        )
        .await;

        assert!(summary.all_succeeded());
        assert!(Path::new(&a).exists());
        assert!(Path::new(&b).exists());
    }

    #[tokio::test]
    async fn output_missing_fails_target_but_independent_sibling_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad").to_str().unwrap().to_string();
        let good = dir.path().join("good").to_str().unwrap().to_string();

        let mut reg = Registry::new();
        reg.register_file(
            vec![bad.clone()],
            vec![],
            Box::new(|_ctx: &JobContext| Ok(())),
            None,
            None,
            false,
        )
        .unwrap();
        reg.register_file(vec![good.clone()], vec![], touch(good.clone()), None, None, false)
            .unwrap();

        let graph = kiln_resolver::resolve(&reg, &[bad.clone(), good.clone()]).unwrap();
        let exec = Executor::new();
        let summary = run(
            &exec,
            &graph,
            digest_store(dir.path()),
            ExecutorConfig { j: 4, s: 1, keep_going: true, use_hash_override: None },
        )
        .await;

        assert_eq!(summary.failed, vec![bad]);
        assert!(summary.cancelled.is_empty());
        assert!(Path::new(&good).exists());
    }

    #[tokio::test]
    async fn failure_cancels_dependents_but_unrelated_target_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let c = dir.path().join("c").to_str().unwrap().to_string();
        let b = dir.path().join("b").to_str().unwrap().to_string();
        let a = dir.path().join("a").to_str().unwrap().to_string();
        let x = dir.path().join("x").to_str().unwrap().to_string();

        let mut reg = Registry::new();
        reg.register_file(
            vec![c.clone()],
            vec![],
            Box::new(|_ctx: &JobContext| Err("boom".to_string())),
            None,
            None,
            false,
        )
        .unwrap();
        reg.register_file(vec![b.clone()], vec![c.clone()], touch(b.clone()), None, None, false)
            .unwrap();
        reg.register_file(vec![a.clone()], vec![b.clone()], touch(a.clone()), None, None, false)
            .unwrap();
        reg.register_file(vec![x.clone()], vec![], touch(x.clone()), None, None, false)
            .unwrap();

        let graph = kiln_resolver::resolve(&reg, &[a.clone(), x.clone()]).unwrap();
        let exec = Executor::new();
        let summary = run(
            &exec,
            &graph,
            digest_store(dir.path()),
            ExecutorConfig { j: 4, s: 1, keep_going: true, use_hash_override: None },
        )
        .await;

        assert_eq!(summary.failed, vec![c]);
        assert!(summary.cancelled.contains(&b));
        assert!(summary.cancelled.contains(&a));
        assert!(Path::new(&x).exists());
    }

    #[tokio::test]
    async fn serial_class_limits_concurrency_within_class() {
        let dir = tempfile::tempdir().unwrap();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut reg = Registry::new();
        for i in 0..4 {
            let out = dir.path().join(format!("t{i}")).to_str().unwrap().to_string();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            let out_for_action = out.clone();
            reg.register_file(
                vec![out.clone()],
                vec![],
                Box::new(move |_ctx: &JobContext| {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(200));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    std::fs::write(&out_for_action, b"done").map_err(|e| e.to_string())
                }),
                None,
                Some("build".to_string()),
                false,
            )
            .unwrap();
        }

        let goals: Vec<String> = (0..4)
            .map(|i| dir.path().join(format!("t{i}")).to_str().unwrap().to_string())
            .collect();
        let graph = kiln_resolver::resolve(&reg, &goals).unwrap();
        let exec = Executor::new();
        let summary = run(
            &exec,
            &graph,
            digest_store(dir.path()),
            ExecutorConfig { j: 1000, s: 2, keep_going: true, use_hash_override: None },
        )
        .await;

        assert!(summary.all_succeeded());
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fail_fast_terminates_and_cancels_an_unrelated_ready_target() {
        let dir = tempfile::tempdir().unwrap();
        let c = dir.path().join("c").to_str().unwrap().to_string();
        let b = dir.path().join("b").to_str().unwrap().to_string();
        let a = dir.path().join("a").to_str().unwrap().to_string();
        let x = dir.path().join("x").to_str().unwrap().to_string();

        let mut reg = Registry::new();
        reg.register_file(
            vec![c.clone()],
            vec![],
            Box::new(|_ctx: &JobContext| Err("boom".to_string())),
            None,
            None,
            false,
        )
        .unwrap();
        reg.register_file(vec![b.clone()], vec![c.clone()], touch(b.clone()), None, None, false)
            .unwrap();
        reg.register_file(vec![a.clone()], vec![b.clone()], touch(a.clone()), None, None, false)
            .unwrap();
        reg.register_file(vec![x.clone()], vec![], touch(x.clone()), None, None, false)
            .unwrap();

        // `c` sorts before `x` lexicographically, so with j=1 the scheduler dispatches `c`
        // first; by the time it fails, `x` is still `Ready` and must be cancelled rather than
        // left stranded, or the run would never quiesce.
        let graph = kiln_resolver::resolve(&reg, &[a.clone(), x.clone()]).unwrap();
        let exec = Executor::new();
        let summary = run(
            &exec,
            &graph,
            digest_store(dir.path()),
            ExecutorConfig { j: 1, s: 1, keep_going: false, use_hash_override: None },
        )
        .await;

        assert_eq!(summary.failed, vec![c]);
        assert!(summary.cancelled.contains(&b));
        assert!(summary.cancelled.contains(&a));
        assert!(summary.cancelled.contains(&x));
        assert!(!summary.all_succeeded());
        assert!(!Path::new(&x).exists());
    }
}
