//! Optional wall-clock profiling around the daemon's main loop.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Run `func`, and when `do_profile` is set report how long it took.
///
/// The report goes to `output_file` when given, otherwise to stdout. The
/// report is written even if `func` returns an error.
pub fn run_profiled<T, F>(func: F, do_profile: bool, output_file: Option<&Path>) -> T
where
    F: FnOnce() -> T,
{
    if !do_profile {
        return func();
    }

    let started_at = chrono::Local::now();
    let start = Instant::now();
    let result = func();
    let elapsed = start.elapsed();

    let report = format!(
        "started: {}\nwall time: {:.3}s\n",
        started_at.to_rfc3339(),
        elapsed.as_secs_f64()
    );
    match output_file {
        Some(path) => match fs::File::create(path).and_then(|mut f| f.write_all(report.as_bytes())) {
            Ok(()) => {
                tracing::info!("Profile stats saved to {}", path.display());
                println!("Profile stats saved to {}", path.display());
            }
            Err(e) => tracing::warn!("Failed to save profile stats to {}: {}", path.display(), e),
        },
        None => print!("{}", report),
    }
    result
}
