//! The aggregation engine: a pure transform from a flat event list to the
//! ranked and time-bucketed dashboard view. No I/O, deterministic, never
//! fails on well-typed input.

use std::collections::{BTreeMap, HashMap};

use chrono::{Local, Timelike};

use crate::types::{
    AggregatedView, ArtistCount, PlatformUsage, PlaybackEvent, TimeBucket, TrackCount,
};

/// Reduce a raw platform string to a canonical label. Rules are ordered;
/// first match wins.
pub fn canonical_platform(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|p| !p.is_empty()) else {
        return "Unknown".to_string();
    };

    if raw.starts_with("iOS") {
        // "iOS 17.2.1 (iPhone14,5)" and friends all reduce to the first token.
        raw.split_whitespace().next().unwrap_or(raw).to_string()
    } else if raw.starts_with("OS X") {
        "macOS".to_string()
    } else if raw.contains("Android") {
        "Android".to_string()
    } else if raw.contains("Windows") {
        "Windows".to_string()
    } else if raw.contains("web_player") {
        "Web Player".to_string()
    } else if raw.contains("Partner") {
        "Partner Device".to_string()
    } else {
        raw.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn bump<K: Ord>(buckets: &mut BTreeMap<K, (u64, u64)>, key: K, ms: u64) {
    let bucket = buckets.entry(key).or_insert((0, 0));
    bucket.0 += 1;
    bucket.1 += ms;
}

/// Aggregate an event list into the dashboard view, keeping the `top_n`
/// highest-play-count artists and tracks.
///
/// One shared pass accumulates all five groupings, then each ranked list is
/// sorted. Ranking ties keep first-seen input order (the sorts are stable
/// and the accumulators are kept in first-seen order). Month and day buckets
/// use the UTC calendar date; the hour bucket uses the machine's wall clock,
/// so "what hour do I listen" matches the user's day. Events whose timestamp
/// does not parse still count toward totals and entity groupings but land in
/// no time bucket.
pub fn aggregate(events: &[PlaybackEvent], top_n: usize) -> AggregatedView {
    let mut total_ms: u64 = 0;

    let mut artist_index: HashMap<&str, usize> = HashMap::new();
    let mut artists: Vec<ArtistCount> = Vec::new();
    let mut track_index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut tracks: Vec<TrackCount> = Vec::new();
    let mut platform_index: HashMap<String, usize> = HashMap::new();
    let mut platforms: Vec<PlatformUsage> = Vec::new();

    let mut months: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    let mut days: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    let mut hours: BTreeMap<u32, (u64, u64)> = BTreeMap::new();

    for event in events {
        let ms = event.played_ms();
        total_ms += ms;

        // Artist stats exclude events with no artist name rather than
        // bucketing them under a placeholder.
        if let Some(artist) = non_empty(event.master_metadata_album_artist_name.as_deref()) {
            let slot = *artist_index.entry(artist).or_insert_with(|| {
                artists.push(ArtistCount {
                    name: artist.to_string(),
                    count: 0,
                    total_ms: 0,
                });
                artists.len() - 1
            });
            artists[slot].count += 1;
            artists[slot].total_ms += ms;

            // Tracks group on the (track, artist) composite; both must be present.
            if let Some(track) = non_empty(event.master_metadata_track_name.as_deref()) {
                let slot = *track_index.entry((track, artist)).or_insert_with(|| {
                    tracks.push(TrackCount {
                        name: track.to_string(),
                        artist: artist.to_string(),
                        count: 0,
                        total_ms: 0,
                    });
                    tracks.len() - 1
                });
                tracks[slot].count += 1;
                tracks[slot].total_ms += ms;
            }
        }

        if let Some(instant) = event.parsed_ts() {
            bump(&mut months, instant.format("%Y-%m").to_string(), ms);
            bump(&mut days, instant.format("%Y-%m-%d").to_string(), ms);
            bump(&mut hours, instant.with_timezone(&Local).hour(), ms);
        }

        let platform = canonical_platform(event.platform.as_deref());
        let slot = *platform_index.entry(platform.clone()).or_insert_with(|| {
            platforms.push(PlatformUsage {
                platform,
                count: 0,
                total_ms: 0,
            });
            platforms.len() - 1
        });
        platforms[slot].count += 1;
        platforms[slot].total_ms += ms;
    }

    let unique_artists = artists.len() as u64;
    let unique_tracks = tracks.len() as u64;

    artists.sort_by(|a, b| b.count.cmp(&a.count));
    artists.truncate(top_n);
    tracks.sort_by(|a, b| b.count.cmp(&a.count));
    tracks.truncate(top_n);
    platforms.sort_by(|a, b| b.count.cmp(&a.count));

    let into_buckets = |map: BTreeMap<String, (u64, u64)>| {
        map.into_iter()
            .map(|(date, (count, total_ms))| TimeBucket {
                date,
                count,
                total_ms,
            })
            .collect()
    };

    AggregatedView {
        total_tracks: events.len() as u64,
        total_listening_time_ms: total_ms,
        unique_artists,
        unique_tracks,
        top_artists: artists,
        top_tracks: tracks,
        listening_by_month: into_buckets(months),
        listening_by_day: into_buckets(days),
        listening_by_hour: hours
            .into_iter()
            .map(|(hour, (count, total_ms))| TimeBucket {
                date: format!("{hour:02}"),
                count,
                total_ms,
            })
            .collect(),
        platform_usage: platforms,
    }
}
