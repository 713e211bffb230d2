use super::common::LogLevel;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{IsTerminal, stderr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;

type MessageCallback = Box<dyn Fn() -> String + Send + Sync>;

/// Refresh rate for progress updates (10 Hz).
const REFRESH_INTERVAL_MS: u64 = 100;

/// How long work must run before the spinner appears.
const SHOW_DELAY: Duration = Duration::from_millis(300);

const TEMPLATE: &str = "{prefix:>12.bold.cyan} {spinner} {msg}";
const TEMPLATE_NO_COLOR: &str = "{prefix:>12} {spinner} {msg}";

struct DelayedState {
    visible_after: Instant,
    visible: AtomicBool,
    started: Instant,
}

/// A spinner on stderr that only appears once work has run for a short while.
///
/// The message is pulled from a callback on every refresh, so workers only bump counters
/// and never touch the terminal themselves.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    state: Arc<DelayedState>,
    message_callback: Arc<Mutex<MessageCallback>>,
    refresh_task: Arc<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Create a reporter. It never becomes visible after `delay` is `None`.
    #[must_use]
    pub fn new(delay: Option<Duration>) -> Self {
        let bar = ProgressBar::hidden();
        let template = if stderr().is_terminal() { TEMPLATE } else { TEMPLATE_NO_COLOR };
        if let Ok(style) = ProgressStyle::default_spinner().template(template) {
            bar.set_style(style);
        }

        let now = Instant::now();
        let state = Arc::new(DelayedState {
            // A year from now is as good as never for a command-line run.
            visible_after: now + delay.unwrap_or(Duration::from_hours(365 * 24)),
            visible: AtomicBool::new(false),
            started: now,
        });

        let message_callback = Arc::new(Mutex::new(Box::new(String::new) as MessageCallback));

        Self {
            refresh_task: Arc::new(tokio::spawn(refresh_task(
                bar.clone(),
                Arc::clone(&state),
                Arc::clone(&message_callback),
            ))),
            bar,
            state,
            message_callback,
        }
    }

    /// A reporter that stays hidden whenever diagnostic logging would share the terminal.
    #[must_use]
    pub fn for_log_level(log_level: LogLevel) -> Self {
        let delay = matches!(log_level, LogLevel::None | LogLevel::Error).then_some(SHOW_DELAY);
        Self::new(delay)
    }

    /// Set the label shown before the spinner (e.g. "Collecting").
    pub fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }

    /// Set the callback producing the spinner's message.
    pub fn set_message(&self, callback: impl Fn() -> String + Send + Sync + 'static) {
        *self.message_callback.lock().unwrap_or_else(PoisonError::into_inner) = Box::new(callback);
    }

    /// Finish and clear the spinner.
    pub fn done(&self) {
        self.refresh_task.abort();
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("visible", &self.state.visible)
            .field("message_callback", &"<callback>")
            .field("refresh_task", &"<task>")
            .finish()
    }
}

/// Background refresh task that periodically updates the spinner.
async fn refresh_task(bar: ProgressBar, state: Arc<DelayedState>, callback: Arc<Mutex<MessageCallback>>) {
    let mut interval = tokio::time::interval(Duration::from_millis(REFRESH_INTERVAL_MS));
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !state.visible.load(Ordering::Relaxed) && Instant::now() >= state.visible_after {
            state.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        if state.visible.load(Ordering::Relaxed) {
            let message = {
                let callback_guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
                callback_guard()
            };
            bar.set_message(format!("{}s: {message}", state.started.elapsed().as_secs()));
            bar.tick();
        }
    }
}
