//! Character display refresh.
//!
//! [`DisplayRefresher`] owns a new-data signal from the [`ReadingStore`] and
//! redraws at most once per tick. What "draw" means is up to the
//! [`DisplaySink`]: an [`Hd44780`] panel on hardware, [`LogDisplay`] on the
//! host.

mod hd44780;

pub use hd44780::{Command, Hd44780, LETTER_DELAY_MS};

use crate::sensor::Sample;
use crate::signal::Signal;
use crate::store::ReadingStore;
use log::{debug, info};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Columns per display line in DDRAM. Text wraps to line two after this.
pub const LINE_COLUMNS: usize = 40;

/// Something that can show a line of text.
pub trait DisplaySink {
    /// Replace whatever is shown with `text`.
    fn show(&mut self, text: &str);
}

/// Text for a sample: temperature on line one, humidity on line two.
///
/// ```
/// use weather_station::display::format_reading;
/// use weather_station::sensor::Sample;
///
/// let text = format_reading(&Sample::new(50, 20, 0).unwrap());
/// assert_eq!(&text[..14], " Temp: 68.00 F");
/// assert_eq!(&text[40..], " Humidity: 50%");
/// ```
pub fn format_reading(sample: &Sample) -> String {
    let line_one = format!(" Temp: {:.2} F", sample.fahrenheit());
    format!(
        "{:<width$} Humidity: {}%",
        line_one,
        sample.humidity(),
        width = LINE_COLUMNS
    )
}

/// Display sink that writes to the log.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Option<String>,
    redraws: usize,
}

impl LogDisplay {
    /// Create an empty log display.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last text shown.
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Number of redraws so far.
    pub fn redraws(&self) -> usize {
        self.redraws
    }
}

impl DisplaySink for LogDisplay {
    fn show(&mut self, text: &str) {
        info!("[display] {}", text.split_whitespace().collect::<Vec<_>>().join(" "));
        self.last = Some(text.to_string());
        self.redraws += 1;
    }
}

/// Display refresh task.
pub struct DisplayRefresher<S> {
    sink: S,
    store: Arc<ReadingStore>,
    signal: Arc<Signal>,
    tick: Duration,
}

impl<S: DisplaySink> DisplayRefresher<S> {
    /// Subscribe to `store` and draw on `sink` every `tick` at most.
    pub fn new(sink: S, store: Arc<ReadingStore>, tick: Duration) -> Self {
        let signal = store.subscribe();
        Self {
            sink,
            store,
            signal,
            tick,
        }
    }

    /// Get the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Wait up to one tick for new data and redraw if any arrived.
    ///
    /// Returns `true` if the display was redrawn. Always takes a full tick,
    /// so samples arriving faster than the tick coalesce into one redraw.
    pub fn refresh_once(&mut self) -> bool {
        let started = Instant::now();
        let redrawn = self.signal.wait(self.tick) && self.redraw();
        let elapsed = started.elapsed();
        if elapsed < self.tick {
            thread::sleep(self.tick - elapsed);
        }
        redrawn
    }

    fn redraw(&mut self) -> bool {
        match self.store.current() {
            Some(sample) => {
                self.sink.show(&format_reading(&sample));
                true
            }
            None => {
                debug!("Display signalled with empty store");
                false
            }
        }
    }

    /// Run forever.
    pub fn run(mut self) -> ! {
        info!("Display task started, tick {:?}", self.tick);
        loop {
            self.refresh_once();
        }
    }
}
