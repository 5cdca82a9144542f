use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::parse_instant;

/// One playback record from a listening-history export.
///
/// Field names follow the extended streaming-history JSON; the serde aliases
/// accept the legacy `StreamingHistoryN.json` shape (`endTime`, `artistName`,
/// `trackName`, `msPlayed`) so both export vintages normalize into the same
/// event log. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    /// UTC instant the play ended.
    #[serde(alias = "endTime")]
    pub ts: String,
    #[serde(default)]
    pub platform: Option<String>,
    /// Negative or missing values are treated as 0 by consumers, never as an error.
    #[serde(default, alias = "msPlayed")]
    pub ms_played: i64,
    #[serde(default, alias = "trackName")]
    pub master_metadata_track_name: Option<String>,
    #[serde(default, alias = "artistName")]
    pub master_metadata_album_artist_name: Option<String>,
    #[serde(default)]
    pub master_metadata_album_album_name: Option<String>,
    #[serde(default)]
    pub spotify_track_uri: Option<String>,

    // Podcast fields, carried through storage but ignored by aggregation.
    #[serde(default)]
    pub episode_name: Option<String>,
    #[serde(default)]
    pub episode_show_name: Option<String>,
    #[serde(default)]
    pub spotify_episode_uri: Option<String>,

    // Session context, likewise passthrough-only.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub conn_country: Option<String>,
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub reason_start: Option<String>,
    #[serde(default)]
    pub reason_end: Option<String>,
    #[serde(default)]
    pub shuffle: Option<bool>,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub offline_timestamp: Option<String>,
    #[serde(default)]
    pub incognito_mode: Option<bool>,
}

impl PlaybackEvent {
    /// The event's timestamp as an instant, if it parses.
    pub fn parsed_ts(&self) -> Option<DateTime<Utc>> {
        parse_instant(&self.ts)
    }

    /// Play time with the negative/missing-means-zero rule applied.
    pub fn played_ms(&self) -> u64 {
        self.ms_played.max(0) as u64
    }
}

/// Inclusive date-range filter. Either bound may be absent (unbounded).
/// Replaced as a whole pair, never mutated field-by-field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Aggregate view over a (filtered) event list. Derived on demand, never
/// persisted; rebuilt wholesale whenever the filter or top-N limit changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedView {
    pub total_tracks: u64,
    pub total_listening_time_ms: u64,
    pub unique_artists: u64,
    pub unique_tracks: u64,
    pub top_artists: Vec<ArtistCount>,
    pub top_tracks: Vec<TrackCount>,
    pub listening_by_month: Vec<TimeBucket>,
    pub listening_by_day: Vec<TimeBucket>,
    pub listening_by_hour: Vec<TimeBucket>,
    pub platform_usage: Vec<PlatformUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistCount {
    pub name: String,
    pub count: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCount {
    pub name: String,
    pub artist: String,
    pub count: u64,
    pub total_ms: u64,
}

/// One time-grouping bucket: `date` is "YYYY-MM", "YYYY-MM-DD", or "00".."23"
/// depending on the series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub date: String,
    pub count: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformUsage {
    pub platform: String,
    pub count: u64,
    pub total_ms: u64,
}
