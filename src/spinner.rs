use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Rotating glyph shown while waiting on a blocking call.
///
/// The glyph is drawn by indicatif's ticker thread; dropping the spinner stops and
/// clears it, so an early return through `?` never leaves it running.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        // the last tick string is shown once finished
        bar.set_style(ProgressStyle::default_spinner().tick_strings(&["-", "\\", "|", "/", " "]));
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK);
        Self { bar }
    }

    pub fn finish(self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Runs `f`, showing a spinner for its duration when `enabled`.
pub fn with_spinner<T>(enabled: bool, message: &str, f: impl FnOnce() -> T) -> T {
    if !enabled {
        return f();
    }
    let spinner = Spinner::start(message.to_string());
    let out = f();
    drop(spinner);
    out
}
