//! Terminal output: prefixed log lines and per-report progress bars.
//!
//! ```ignore
//! log!("merge"; "appending {} rows to {}", rows, path.display());
//!
//! let progress = ProgressBars::new(&[("isp", 12), ("dam", 4)]);
//! progress.inc(0);
//! progress.finish();
//! ```
//!
//! Output can be silenced process-wide with [`set_quiet`], which the CLI
//! does when printing JSON.

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor::{MoveDown, MoveUp},
    queue,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{Write, stdout},
    sync::{
        Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Rows currently reserved by progress bars.
static BAR_COUNT: AtomicUsize = AtomicUsize::new(0);

static QUIET: AtomicBool = AtomicBool::new(false);

// Bar layout: "[label] [████░░░░] 42/100"
const BRACKET_LEN: usize = 2;
const SPACE_AFTER_PREFIX: usize = 1;
const BAR_WRAPPER_LEN: usize = 3;
const SPACE_BEFORE_COUNT: usize = 1;
const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

#[inline]
const fn calc_prefix_len(label_len: usize) -> usize {
    label_len + BRACKET_LEN + SPACE_AFTER_PREFIX
}

fn terminal_width() -> u16 {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120))
}

/// Suppress all log lines and progress bars.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::SeqCst);
}

#[inline]
fn is_quiet() -> bool {
    QUIET.load(Ordering::SeqCst)
}

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("status"; "{} files in {}", count, dir.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

// ============================================================================
// Progress Bars
// ============================================================================

/// One bar per report, each on its own terminal line.
///
/// Bars are indexed by creation order. Updates from several threads are
/// serialized through an internal lock.
pub struct ProgressBars {
    bars: Vec<ProgressBar>,
    lock: Mutex<()>,
    hidden: bool,
}

struct ProgressBar {
    prefix: ColoredString,
    prefix_len: usize,
    total: usize,
    current: AtomicUsize,
    row: usize,
}

impl ProgressBars {
    /// Reserve one line per `(label, total)` pair.
    pub fn new(labels: &[(&str, usize)]) -> Self {
        let hidden = is_quiet();
        if !hidden {
            let mut out = stdout().lock();
            write!(out, "{}", "\n".repeat(labels.len())).ok();
            out.flush().ok();
            BAR_COUNT.store(labels.len(), Ordering::SeqCst);
        }

        let bars = labels
            .iter()
            .enumerate()
            .map(|(row, (label, total))| ProgressBar {
                prefix: colorize_prefix(label),
                prefix_len: calc_prefix_len(label.len()),
                total: *total,
                current: AtomicUsize::new(0),
                row,
            })
            .collect();

        Self {
            bars,
            lock: Mutex::new(()),
            hidden,
        }
    }

    /// Bars for the non-empty labels; `None` when at most one item is left.
    pub fn new_filtered(labels: &[(&str, usize)]) -> Option<Self> {
        let kept: Vec<_> = labels.iter().filter(|(_, n)| *n > 0).copied().collect();
        let total: usize = kept.iter().map(|(_, n)| n).sum();
        (total > 1).then(|| Self::new(&kept))
    }

    /// Advance bar `index` by one.
    pub fn inc(&self, index: usize) {
        let Some(bar) = self.bars.get(index) else {
            return;
        };
        let current = bar.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.display(bar, current);
    }

    /// Items counted so far on bar `index`.
    pub fn position(&self, index: usize) -> usize {
        self.bars
            .get(index)
            .map_or(0, |bar| bar.current.load(Ordering::Relaxed))
    }

    fn display(&self, bar: &ProgressBar, current: usize) {
        if self.hidden {
            return;
        }
        let _guard = self.lock.lock().ok();

        let progress_text = format!("{}/{}", current, bar.total);
        let rendered = render_bar(
            terminal_width() as usize,
            bar.prefix_len,
            current,
            bar.total,
            &progress_text,
        );

        #[allow(clippy::cast_possible_truncation)]
        let up = (self.bars.len() - bar.row) as u16;
        let mut out = stdout().lock();
        queue!(out, MoveUp(up), Clear(ClearType::CurrentLine)).ok();
        write!(out, "{} [{rendered}] {progress_text}", bar.prefix).ok();
        queue!(out, MoveDown(up)).ok();
        write!(out, "\r").ok();
        out.flush().ok();
    }

    /// Clear the bars from the terminal.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(&self) {
        if self.hidden || BAR_COUNT.swap(0, Ordering::SeqCst) == 0 {
            return;
        }
        let _guard = self.lock.lock().ok();

        let rows = self.bars.len() as u16;
        let mut out = stdout().lock();
        queue!(out, MoveUp(rows), Clear(ClearType::FromCursorDown)).ok();
        out.flush().ok();
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Filled and empty cells of a bar that fits the terminal.
fn render_bar(width: usize, prefix_len: usize, current: usize, total: usize, count: &str) -> String {
    let overhead = prefix_len + BAR_WRAPPER_LEN + SPACE_BEFORE_COUNT + count.len();
    let bar_width = width.saturating_sub(overhead).clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH);
    let filled = if total > 0 {
        (current.min(total) * bar_width) / total
    } else {
        0
    };
    "█".repeat(filled) + &"░".repeat(bar_width - filled)
}

// ============================================================================
// Log lines
// ============================================================================

/// Print `message` under a colored `[module]` prefix, above any active bars.
///
/// Single-line messages are truncated to the terminal width.
#[allow(clippy::cast_possible_truncation)]
pub fn log(module: &str, message: &str) {
    if is_quiet() {
        return;
    }
    let prefix = colorize_prefix(module);
    let bars = BAR_COUNT.load(Ordering::SeqCst);
    let mut out = stdout().lock();

    // Bars keep their lines: write above them and re-reserve below.
    if bars > 0 {
        queue!(out, MoveUp(bars as u16), Clear(ClearType::FromCursorDown)).ok();
    } else {
        queue!(out, Clear(ClearType::UntilNewLine)).ok();
    }

    let message = if message.contains('\n') {
        message
    } else {
        let room = (terminal_width() as usize).saturating_sub(calc_prefix_len(module.len()));
        truncate_str(message, room)
    };
    writeln!(out, "{prefix} {message}").ok();
    write!(out, "{}", "\n".repeat(bars)).ok();
    out.flush().ok();
}

fn colorize_prefix(module: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "status" => prefix.bright_blue().bold(),
        "merge" => prefix.bright_green().bold(),
        "warn" => prefix.bright_magenta().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Cut `s` to at most `max_len` bytes on a character boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
