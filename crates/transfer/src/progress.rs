use std::io::{self, Write};

/// Default number of units in a full bar.
pub const DEFAULT_UNITS: u32 = 50;

/// Glyph drawn for each completed unit.
const UNIT_GLYPH: char = '#';

/// Glyph padding the units left undrawn by [`ProgressBar::finish`].
const PAD_GLYPH: char = '.';

/// Receives byte counts as a transfer advances.
///
/// Senders report bytes accepted by the socket, receivers bytes read from it.
pub trait ProgressSink: Send {
    fn advance(&mut self, bytes: u64);
}

/// Sink that discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&mut self, _bytes: u64) {}
}

/// Records every report, in order.
impl ProgressSink for Vec<u64> {
    fn advance(&mut self, bytes: u64) {
        self.push(bytes);
    }
}

/// Invalid progress bar configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("total size must be greater than 1, got {0}")]
    TotalTooSmall(u64),

    #[error("bar must have at least one unit")]
    NoUnits,
}

/// Snapshot of a bar's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total_size: u64,
    pub done_size: u64,
    pub units_drawn: u32,
}

/// Block-based progress bar.
///
/// Converts bytes processed into a bounded number of units. Units are
/// computed as `done * units / total`, which stays correct when the total
/// is smaller than the unit count.
///
/// A bar with no sink is quiet: it keeps counting and returns the same
/// values from [`update`](Self::update) and [`finish`](Self::finish), but
/// renders nothing.
pub struct ProgressBar<W: Write = io::Stdout> {
    total_size: u64,
    total_units: u32,
    done_size: u64,
    units_drawn: u32,
    finished: bool,
    sink: Option<W>,
}

impl ProgressBar<io::Stdout> {
    /// Creates a bar drawn on stdout.
    pub fn stdout(total_size: u64, total_units: u32) -> Result<Self, ProgressError> {
        Self::with_sink(total_size, total_units, io::stdout())
    }

    /// Creates a bar that only counts.
    pub fn quiet(total_size: u64, total_units: u32) -> Result<Self, ProgressError> {
        Self::build(total_size, total_units, None)
    }
}

impl<W: Write> ProgressBar<W> {
    /// Creates a bar drawn on `sink` and writes its header.
    pub fn with_sink(total_size: u64, total_units: u32, sink: W) -> Result<Self, ProgressError> {
        let mut bar = Self::build(total_size, total_units, Some(sink))?;
        let header = format!(
            "      0% [{}] 100%\nprogress [",
            "-".repeat(total_units as usize)
        );
        bar.render(&header);
        Ok(bar)
    }

    fn build(total_size: u64, total_units: u32, sink: Option<W>) -> Result<Self, ProgressError> {
        if total_size <= 1 {
            return Err(ProgressError::TotalTooSmall(total_size));
        }
        if total_units == 0 {
            return Err(ProgressError::NoUnits);
        }
        Ok(Self {
            total_size,
            total_units,
            done_size: 0,
            units_drawn: 0,
            finished: false,
            sink,
        })
    }

    /// Adds `more` bytes of progress and draws the units it completes.
    ///
    /// Progress is clamped at the total size. Returns the number of units
    /// newly completed by this call.
    pub fn update(&mut self, more: u64) -> u32 {
        self.done_size = self.done_size.saturating_add(more).min(self.total_size);

        let units_so_far = (u128::from(self.done_size) * u128::from(self.total_units)
            / u128::from(self.total_size)) as u32;
        let new_units = units_so_far.saturating_sub(self.units_drawn);
        if new_units > 0 {
            self.units_drawn += new_units;
            let glyphs = UNIT_GLYPH.to_string().repeat(new_units as usize);
            self.render(&glyphs);
        }
        new_units
    }

    /// Pads the undrawn units and closes the bar.
    ///
    /// Returns how many units were never completed (non-zero when the
    /// transfer stopped early). Closing twice draws nothing the second time.
    pub fn finish(&mut self) -> u32 {
        self.close(false)
    }

    /// Like [`finish`](Self::finish), followed by `done/total`.
    pub fn finish_with_fraction(&mut self) -> u32 {
        self.close(true)
    }

    fn close(&mut self, show_fraction: bool) -> u32 {
        let remaining = self.total_units - self.units_drawn;
        if self.finished {
            return remaining;
        }
        self.finished = true;

        let mut tail = PAD_GLYPH.to_string().repeat(remaining as usize);
        if show_fraction {
            tail.push_str(&format!("] {}/{}\n", self.done_size, self.total_size));
        } else {
            tail.push_str("] \n");
        }
        self.render(&tail);
        remaining
    }

    fn render(&mut self, text: &str) {
        if let Some(sink) = self.sink.as_mut() {
            // Cosmetic output; a broken terminal must not fail the transfer.
            let _ = sink.write_all(text.as_bytes());
            let _ = sink.flush();
        }
    }

    /// Bytes represented by the filled portion of the bar.
    pub fn progress_size(&self) -> u64 {
        self.done_size
    }

    /// Bytes represented by the empty portion of the bar.
    pub fn incomplete_size(&self) -> u64 {
        self.total_size - self.done_size
    }

    pub fn progress_percent(&self) -> f64 {
        self.done_size as f64 * 100.0 / self.total_size as f64
    }

    /// Bytes each unit stands for (zero when the total is below the unit count).
    pub fn data_per_unit(&self) -> u64 {
        self.total_size / u64::from(self.total_units)
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total_size: self.total_size,
            done_size: self.done_size,
            units_drawn: self.units_drawn,
        }
    }

    pub fn is_started(&self) -> bool {
        self.done_size > 0
    }

    /// Consumes the bar and returns its sink.
    pub fn into_sink(self) -> Option<W> {
        self.sink
    }
}

impl<W: Write + Send> ProgressSink for ProgressBar<W> {
    fn advance(&mut self, bytes: u64) {
        self.update(bytes);
    }
}
