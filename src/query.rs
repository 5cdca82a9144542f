//! Date-range filtering and the recompute-on-change session that connects
//! the stored event log to the dashboard view.

use crate::aggregate::aggregate;
use crate::types::{AggregatedView, DateRange, PlaybackEvent};
use crate::utils::parse_instant;

/// The limits offered by the dashboard's top-N selector; any positive value
/// is accepted programmatically.
pub const TOP_N_PRESETS: &[usize] = &[5, 10, 25, 50, 100];
pub const DEFAULT_TOP_N: usize = 10;

/// Keep events inside the inclusive range. Bounds are compared as instants:
/// a bare "YYYY-MM-DD" bound means midnight UTC of that day. An absent (or
/// unparseable) bound is unbounded on that side; events whose own timestamp
/// does not parse are dropped whenever any bound is set.
pub fn filter_by_range(events: &[PlaybackEvent], range: &DateRange) -> Vec<PlaybackEvent> {
    let start = range.start_date.as_deref().and_then(parse_instant);
    let end = range.end_date.as_deref().and_then(parse_instant);

    if start.is_none() && end.is_none() {
        return events.to_vec();
    }

    events
        .iter()
        .filter(|event| {
            let Some(ts) = event.parsed_ts() else {
                return false;
            };
            start.is_none_or(|bound| ts >= bound) && end.is_none_or(|bound| ts <= bound)
        })
        .cloned()
        .collect()
}

/// Owns the full event log plus the live query parameters, and keeps the
/// aggregate view in sync with them.
///
/// Every parameter change rebuilds the view wholesale from the full owned
/// list; nothing is patched incrementally, so there is no stale partial
/// state to maintain.
pub struct HistorySession {
    events: Vec<PlaybackEvent>,
    range: DateRange,
    top_n: usize,
    view: AggregatedView,
}

impl HistorySession {
    pub fn new(events: Vec<PlaybackEvent>, top_n: usize) -> Self {
        let mut session = Self {
            events,
            range: DateRange::default(),
            top_n,
            view: AggregatedView::default(),
        };
        session.recompute();
        session
    }

    pub fn view(&self) -> &AggregatedView {
        &self.view
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    /// Replace the whole range pair atomically and recompute.
    pub fn set_range(&mut self, range: DateRange) {
        self.range = range;
        self.recompute();
    }

    pub fn set_top_n(&mut self, top_n: usize) {
        self.top_n = top_n;
        self.recompute();
    }

    fn recompute(&mut self) {
        let filtered = filter_by_range(&self.events, &self.range);
        self.view = aggregate(&filtered, self.top_n);
    }
}
