//! Black-box scenarios exercising the engine end-to-end through its public embedding API: build a
//! tiny registry, drive it with `Engine::main`, and check the resulting exit code and filesystem
//! state. The exact dry-run plan text is covered at the unit level in `kiln-executor`; here we
//! check dry-run's defining property instead (no filesystem side effects).

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln::{Engine, EngineConfig, JobContext, Serial};

fn path(dir: &Path, name: &str) -> String {
    dir.join(name).to_str().unwrap().to_string()
}

fn touch_action(target: String) -> Box<dyn kiln::Action> {
    Box::new(move |_ctx: &JobContext| std::fs::write(&target, b"built").map_err(|e| e.to_string()))
}

#[test]
fn s1_dry_run_leaves_the_filesystem_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let e = path(dir.path(), "e");
    let d = path(dir.path(), "d");
    let c = path(dir.path(), "c");
    let b = path(dir.path(), "b");
    let a = path(dir.path(), "a");
    let all = path(dir.path(), "all");
    std::fs::write(&e, b"").unwrap();
    std::fs::write(&c, b"").unwrap();

    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());
    engine.file(vec![d.clone()], vec![e], touch_action(d.clone()), None, None, None).unwrap();
    engine
        .file(vec![b.clone()], vec![c, d.clone()], touch_action(b.clone()), None, None, None)
        .unwrap();
    engine.file(vec![a.clone()], vec![b.clone()], touch_action(a.clone()), None, None, None).unwrap();
    engine
        .phony("all".to_string(), vec![a.clone()], None)
        .unwrap();
    let _ = all;

    let code = engine.main(["kiln", "-n", "all"]);
    assert_eq!(code, 0);
    assert!(!Path::new(&d).exists());
    assert!(!Path::new(&b).exists());
    assert!(!Path::new(&a).exists());
}

#[test]
fn s2_hash_policy_skips_rebuild_when_a_touched_input_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let src = path(dir.path(), "src");
    let out = path(dir.path(), "out");
    std::fs::write(&src, b"unchanged").unwrap();

    let build_count = Arc::new(AtomicUsize::new(0));
    let build_count_for_action = build_count.clone();
    let out_for_action = out.clone();

    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());
    engine
        .file(
            vec![out.clone()],
            vec![src.clone()],
            Box::new(move |_ctx: &JobContext| {
                build_count_for_action.fetch_add(1, Ordering::SeqCst);
                std::fs::write(&out_for_action, b"built").map_err(|e| e.to_string())
            }),
            None,
            None,
            Some(true),
        )
        .unwrap();

    assert_eq!(engine.main(["kiln", &out]), 0);
    assert_eq!(build_count.load(Ordering::SeqCst), 1);

    std::thread::sleep(Duration::from_millis(1050));
    std::fs::write(&src, b"unchanged").unwrap(); // mtime bumps, bytes identical

    assert_eq!(engine.main(["kiln", &out]), 0);
    assert_eq!(build_count.load(Ordering::SeqCst), 1, "hash policy must skip an unchanged input");
}

#[test]
fn s3_serial_class_caps_concurrency_below_the_global_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());

    let mut goals = Vec::new();
    for i in 0..4 {
        let out = path(dir.path(), &format!("chain{i}"));
        engine
            .file(
                vec![out.clone()],
                vec![],
                Box::new(move |_ctx: &JobContext| {
                    std::thread::sleep(Duration::from_secs(1));
                    std::fs::write(&out, b"built").map_err(|e| e.to_string())
                }),
                None,
                Some(Serial::Tagged("build".to_string())),
                None,
            )
            .unwrap();
        goals.push(path(dir.path(), &format!("chain{i}")));
    }

    let mut argv = vec!["kiln".to_string(), "-j".to_string(), "1000".to_string(), "--n-serial".to_string(), "2".to_string()];
    argv.extend(goals);

    let start = Instant::now();
    let code = engine.main(argv);
    let elapsed = start.elapsed();

    assert_eq!(code, 0);
    // Fully parallel (no serial cap) would finish in ~1s; a cap of 2 forces two ~1s batches.
    // The lower bound rules out the cap being ignored; the upper bound leaves slack for slow CI.
    assert!(elapsed >= Duration::from_millis(1800), "elapsed {elapsed:?} too fast for a serial cap of 2");
    assert!(elapsed <= Duration::from_secs(4), "elapsed {elapsed:?} unexpectedly slow");
}

#[test]
fn s4_cycle_between_two_targets_is_reported_and_nothing_runs() {
    let dir = tempfile::tempdir().unwrap();
    let a = path(dir.path(), "a");
    let b = path(dir.path(), "b");

    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());
    engine.file(vec![a.clone()], vec![b.clone()], touch_action(a.clone()), None, None, None).unwrap();
    engine.file(vec![b.clone()], vec![a.clone()], touch_action(b.clone()), None, None, None).unwrap();

    let code = engine.main(["kiln", &a]);
    assert_eq!(code, 3);
    assert!(!Path::new(&a).exists());
    assert!(!Path::new(&b).exists());
}

#[test]
fn s5_action_succeeding_without_creating_its_output_fails_only_that_target() {
    let dir = tempfile::tempdir().unwrap();
    let bad = path(dir.path(), "bad");
    let good = path(dir.path(), "good");

    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());
    engine
        .file(vec![bad.clone()], vec![], Box::new(|_ctx: &JobContext| Ok(())), None, None, None)
        .unwrap();
    engine
        .file(vec![good.clone()], vec![], touch_action(good.clone()), None, None, None)
        .unwrap();

    let code = engine.main(["kiln", &bad, &good]);
    assert_eq!(code, 1);
    assert!(!Path::new(&bad).exists());
    assert!(Path::new(&good).exists());
}

#[test]
fn s6_failure_cancels_the_chain_but_an_unrelated_target_still_builds() {
    let dir = tempfile::tempdir().unwrap();
    let c = path(dir.path(), "c");
    let b = path(dir.path(), "b");
    let a = path(dir.path(), "a");
    let x = path(dir.path(), "x");

    let mut engine = Engine::with_working_dir(EngineConfig::default(), dir.path().to_path_buf());
    engine
        .file(
            vec![c.clone()],
            vec![],
            Box::new(|_ctx: &JobContext| Err("boom".to_string())),
            None,
            None,
            None,
        )
        .unwrap();
    engine.file(vec![b.clone()], vec![c], touch_action(b.clone()), None, None, None).unwrap();
    engine.file(vec![a.clone()], vec![b], touch_action(a.clone()), None, None, None).unwrap();
    engine.file(vec![x.clone()], vec![], touch_action(x.clone()), None, None, None).unwrap();

    let code = engine.main(["kiln", &a, &x]);
    assert_eq!(code, 1);
    assert!(!Path::new(&a).exists());
    assert!(Path::new(&x).exists());
}
