//! Save and markdown timings.
//!
//! Every finished [`Scope`] is folded into a per-name summary (count, total,
//! slowest). The CLI prints the summary on exit under `--perf`; single scopes
//! also land in the debug log when one is open.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const SAVE: &str = "app.save";
pub const PARSE: &str = "markdown.parse";
pub const SERIALIZE: &str = "markdown.serialize";

static ENABLED: AtomicBool = AtomicBool::new(false);
static TIMINGS: LazyLock<Mutex<BTreeMap<&'static str, Timing>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));
static DEBUG_LOG: LazyLock<Mutex<DebugLog>> = LazyLock::new(|| Mutex::new(DebugLog::default()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Accumulated timings for one scope name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub count: u32,
    pub total: Duration,
    pub max: Duration,
}

impl Timing {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }
}

#[derive(Debug)]
pub struct Scope {
    name: &'static str,
    start: Instant,
}

impl Drop for Scope {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::trace!(scope = self.name, elapsed_ms = ms(elapsed), "timed");
        lock(&TIMINGS).entry(self.name).or_default().record(elapsed);
        log_event(self.name, format!("{:.3} ms", ms(elapsed)));
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: Instant::now(),
    }
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Timings recorded so far, by scope name.
pub fn summary() -> BTreeMap<&'static str, Timing> {
    lock(&TIMINGS).clone()
}

pub fn timing(name: &str) -> Timing {
    lock(&TIMINGS).get(name).copied().unwrap_or_default()
}

/// One line per scope: `name: N calls, total, mean, max`.
pub fn format_summary(timings: &BTreeMap<&'static str, Timing>) -> String {
    let mut out = String::new();
    for (name, t) in timings {
        let _ = writeln!(
            out,
            "[perf] {name}: {} calls, {:.2} ms total, {:.2} ms mean, {:.2} ms max",
            t.count,
            ms(t.total),
            ms(t.mean()),
            ms(t.max)
        );
    }
    out
}

/// Prints the summary to stderr when timing output is on.
pub fn report() {
    if !is_enabled() {
        return;
    }
    let timings = summary();
    if timings.is_empty() {
        eprintln!("[perf] nothing timed");
    } else {
        eprint!("{}", format_summary(&timings));
    }
    log_event("perf.summary", format!("{} scopes", timings.len()));
}

#[derive(Debug)]
struct DebugLog {
    start: Instant,
    writer: Option<BufWriter<File>>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            writer: None,
        }
    }
}

pub fn set_debug_log_path(path: Option<&Path>) -> std::io::Result<()> {
    let mut log = lock(&DEBUG_LOG);
    log.writer = None;
    if let Some(path) = path {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "draftsmith debug log start")?;
        writer.flush()?;
        log.start = Instant::now();
        log.writer = Some(writer);
    }
    Ok(())
}

pub fn is_debug_log_enabled() -> bool {
    lock(&DEBUG_LOG).writer.is_some()
}

pub fn log_event(name: &str, detail: impl AsRef<str>) {
    let mut log = lock(&DEBUG_LOG);
    let elapsed_ms = ms(log.start.elapsed());
    if let Some(writer) = log.writer.as_mut() {
        let _ = writeln!(writer, "[{elapsed_ms:>10.3} ms] {name}: {}", detail.as_ref());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_set_enabled_toggles_runtime_flag() {
        set_enabled(true);
        assert!(is_enabled());

        set_enabled(false);
        assert!(!is_enabled());
    }

    #[test]
    fn test_scopes_accumulate_per_name() {
        drop(scope("test.accumulate"));
        drop(scope("test.accumulate"));
        {
            let _scope = scope("test.accumulate");
            std::thread::sleep(Duration::from_millis(2));
        }
        let t = timing("test.accumulate");
        assert_eq!(t.count, 3);
        assert!(t.max >= Duration::from_millis(2));
        assert!(t.total >= t.max);
        assert!(t.mean() <= t.max);
        assert_eq!(timing("test.never"), Timing::default());
    }

    #[test]
    fn test_summary_lines_name_each_scope() {
        let mut timings = BTreeMap::new();
        timings.insert(
            SAVE,
            Timing {
                count: 2,
                total: Duration::from_millis(6),
                max: Duration::from_millis(4),
            },
        );
        timings.insert(PARSE, Timing::default());
        let text = format_summary(&timings);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[perf] app.save: 2 calls, 6.00 ms total, 3.00 ms mean, 4.00 ms max",
                "[perf] markdown.parse: 0 calls, 0.00 ms total, 0.00 ms mean, 0.00 ms max",
            ]
        );
    }

    #[test]
    fn test_markdown_work_is_timed() {
        let before = timing(PARSE).count;
        let schema = crate::document::Schema::new(crate::extension::base::rich_schema_spec()).unwrap();
        let doc = crate::markdown::parse(&schema, "# hi\n");
        let serialized_before = timing(SERIALIZE).count;
        crate::markdown::serialize(&doc);
        assert!(timing(PARSE).count > before);
        assert!(timing(SERIALIZE).count > serialized_before);
    }

    #[test]
    fn test_debug_log_path_enables_logging_and_writes() {
        let temp_file = NamedTempFile::new().unwrap();
        set_debug_log_path(Some(temp_file.path())).unwrap();
        assert!(is_debug_log_enabled());
        log_event("test.event", "hello world");
        drop(scope("test.scope"));
        set_debug_log_path(None).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("draftsmith debug log start"));
        assert!(content.contains("test.event: hello world"));
        assert!(content.contains("test.scope: "));
    }
}
