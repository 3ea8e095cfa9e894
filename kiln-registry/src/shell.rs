use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

/// Dispatches command strings to the externally configured shell, and unlinks files ignoring
/// absence. Both operations are thin wrappers over `std::process`/`std::fs`: the engine treats
/// the real shell and filesystem as small capability interfaces rather than injecting a trait,
/// since it links directly against both.
#[derive(Clone, Copy, Debug, Default)]
pub struct Shell;

impl Shell {
    pub fn new() -> Shell {
        Shell
    }

    /// Runs `cmd` under `$SHELL -c cmd` (default `/bin/sh`). `$SHELLOPTS`, if set, is inherited
    /// by the child process exactly as `$SHELL` itself would read it on startup.
    pub fn run(&self, cmd: &str) -> Result<(), String> {
        let shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        log::debug!("running `{cmd}` via {shell}");
        let status = Command::new(&shell)
            .arg("-c")
            .arg(cmd)
            .status()
            .map_err(|e| format!("failed to spawn {shell}: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("command exited with {status}: {cmd}"))
        }
    }

    /// Unlinks every path, ignoring any that are already absent.
    pub fn rm<P: AsRef<Path>>(&self, paths: &[P]) {
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("failed to remove {}: {e}", path.as_ref().display()),
            }
        }
    }
}
