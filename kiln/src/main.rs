//! Standalone driver binary. A host program that wants to embed the engine directly should
//! depend on the `kiln` library and call [`kiln::Engine::main`] itself; this binary exists for
//! ad hoc use and for the integration tests, and registers nothing of its own.

use std::process::ExitCode;

fn main() -> ExitCode {
    let mut engine = kiln::Engine::new(kiln::EngineConfig::default());
    let code = engine.main(std::env::args());
    ExitCode::from(code as u8)
}
