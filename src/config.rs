//! Runtime configuration (ambient "Configuration" addition to the
//! spec): a plain struct a caller assembles in code, not a file format.
//! Loading config from disk, env vars, or a CLI flag parser is
//! explicitly out of scope here — unlike the teacher's `turn-server`,
//! which reads a TOML file through `clap`/`serde`, this binary only
//! ever sees the defaults `Config::default()` produces.

use std::path::PathBuf;

use log::Level;

/// Logging knobs, the one piece of the teacher's `Log` config section
/// this crate keeps: a `simple_logger` level instead of the string the
/// teacher parses out of its config file.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: Level::Info }
    }
}

/// C1-C7 bootstrap knobs: how big the shared arena is, how many C4
/// worker threads to start, and where the C6 control socket listens.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Bytes reserved for the arena every channel allocates out of.
    /// Spec §6 describes a 1 GiB `memfd`-backed segment in production;
    /// this reference build keeps the arena process-local (see
    /// `DESIGN.md`'s "sdk data-plane fds" entry) and defaults much
    /// smaller accordingly.
    pub arena_size: usize,
    /// Number of pinned C4 worker threads to start. Defaults to the
    /// visible CPU count, mirroring the teacher's `num_cpus::get()`
    /// thread-pool sizing.
    pub worker_count: usize,
    /// Path of the C6 Unix control socket.
    pub control_socket_path: PathBuf,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            arena_size: 64 << 20,
            worker_count: num_cpus::get().max(1),
            control_socket_path: PathBuf::from("/run/openperf/control.sock"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub runtime: RuntimeOptions,
    pub log: LogConfig,
}
