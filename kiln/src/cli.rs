use clap::Parser;

/// Flag surface for the `kiln` driver binary, and for any host program that wants to hand its own
/// `argv` to [`crate::Engine::main`].
#[derive(Parser, Debug)]
#[command(name = "kiln", about = "A programmatic build-dependency engine")]
pub struct Cli {
    /// Global parallelism (`J`).
    #[arg(short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Per-serial-class concurrency bound (`S`).
    #[arg(long = "n-serial", default_value_t = 1)]
    pub n_serial: usize,

    /// Print the plan and exit without running any action.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Continue past target failures. Bare `-k` means true; `--keep-going=false` requests
    /// fail-fast. Defaults to true when omitted entirely.
    #[arg(
        short = 'k',
        long = "keep-going",
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        value_parser = clap::value_parser!(bool),
    )]
    pub keep_going: bool,

    /// List registered targets with their descriptions and exit, without resolving or building.
    #[arg(short = 't', long = "targets")]
    pub targets: bool,

    /// Overrides each target's default freshness policy.
    #[arg(long = "use-hash", value_parser = clap::value_parser!(bool))]
    pub use_hash: Option<bool>,

    /// Log verbosity: trace, debug, info, warn, or error.
    #[arg(long = "log")]
    pub log: Option<String>,

    /// Unlink the resolved subgraph's file outputs instead of building them.
    #[arg(short = 'c', long = "clean")]
    pub clean: bool,

    /// With `--clean`, also truncate the digest store.
    #[arg(long = "digests", requires = "clean")]
    pub digests: bool,

    /// Goal names. Empty means `["all"]`.
    pub goals: Vec<String>,
}
