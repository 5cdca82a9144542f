//! Archive decoding: a listening-history export is a zip of JSON files, of
//! which only the history-data entries are consumed.

use std::io::{Cursor, Read};

use rayon::prelude::*;
use thiserror::Error;
use zip::ZipArchive;

use crate::types::PlaybackEvent;
use crate::utils::warn_once;

/// Ingestion failures surfaced to the user.
///
/// A malformed individual entry is not an error here: it is logged and
/// skipped, and only contributes to `EmptyResult` if nothing usable is left.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not open the archive: {0}")]
    Archive(String),
    #[error("no listening-history files were found in the archive")]
    NoHistoryFiles,
    #[error("the listening-history files contained no usable records")]
    EmptyResult,
}

/// Exports renamed the history-file marker over the years; both spellings
/// must keep matching.
const HISTORY_MARKERS: &[&str] = &["Streaming_History", "StreamingHistory"];

// Coarse progress phases, advisory only.
const PHASE_OPENED: u8 = 10;
const PHASE_ENUMERATED: u8 = 30;
const PHASE_ENTRIES_DONE: u8 = 70;
const PHASE_MERGED: u8 = 80;

fn is_history_entry(name: &str) -> bool {
    name.ends_with(".json") && HISTORY_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Decode a zipped export into the flat event log.
///
/// Entry order is preserved: events appear in archive-enumeration order,
/// then in-file order. `progress` receives a monotonically increasing
/// percentage (this function reports up to 80; the import flow owns the
/// store-handoff tail).
pub async fn decode_archive(
    bytes: Vec<u8>,
    mut progress: impl FnMut(u8),
) -> Result<Vec<PlaybackEvent>, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| IngestError::Archive(e.to_string()))?;
    progress(PHASE_OPENED);

    let mut selected: Vec<usize> = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| IngestError::Archive(e.to_string()))?;
        if !entry.is_dir() && is_history_entry(entry.name()) {
            selected.push(index);
        }
    }
    progress(PHASE_ENUMERATED);

    if selected.is_empty() {
        return Err(IngestError::NoHistoryFiles);
    }

    // The zip reader is single-cursor, so entry contents are read
    // sequentially; parsing fans out below.
    let total = selected.len();
    let mut contents: Vec<(String, Vec<u8>)> = Vec::with_capacity(total);
    for (done, &index) in selected.iter().enumerate() {
        match archive.by_index(index) {
            Ok(mut entry) => {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                match entry.read_to_end(&mut buf) {
                    Ok(_) => contents.push((entry.name().to_string(), buf)),
                    Err(e) => warn_once(format!("⚠️  Skipping {}: {e}", entry.name())),
                }
            }
            Err(e) => warn_once(format!("⚠️  Skipping archive entry #{index}: {e}")),
        }
        let span = (PHASE_ENTRIES_DONE - PHASE_ENUMERATED) as usize;
        progress(PHASE_ENUMERATED + ((done + 1) * span / total) as u8);
    }

    // collect() keeps input order, so the concatenation below matches the
    // sequential enumeration even though parsing is parallel.
    let parsed: Vec<Vec<PlaybackEvent>> = contents
        .into_par_iter()
        .filter_map(|(name, mut buf)| {
            match simd_json::from_slice::<Vec<PlaybackEvent>>(&mut buf) {
                Ok(events) => Some(events),
                Err(e) => {
                    warn_once(format!(
                        "⚠️  Skipping {name}: not a well-formed history file ({e})"
                    ));
                    None
                }
            }
        })
        .collect();

    let events: Vec<PlaybackEvent> = parsed.into_iter().flatten().collect();
    progress(PHASE_MERGED);

    if events.is_empty() {
        return Err(IngestError::EmptyResult);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start_file");
            writer.write_all(content).expect("write entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    fn history_json(artists: &[&str]) -> Vec<u8> {
        let events: Vec<String> = artists
            .iter()
            .map(|artist| {
                format!(
                    r#"{{"ts":"2024-01-01T10:00:00Z","ms_played":1000,"master_metadata_album_artist_name":"{artist}","master_metadata_track_name":"Song"}}"#
                )
            })
            .collect();
        format!("[{}]", events.join(",")).into_bytes()
    }

    #[test]
    fn test_is_history_entry() {
        assert!(is_history_entry("Streaming_History_Audio_2023_0.json"));
        assert!(is_history_entry("MyData/StreamingHistory0.json"));
        assert!(!is_history_entry("StreamingHistory0.txt"));
        assert!(!is_history_entry("Userdata.json"));
        assert!(!is_history_entry("Payments.json"));
    }

    #[tokio::test]
    async fn concatenates_matching_entries_in_enumeration_order() {
        let legacy = br#"[{"endTime":"2019-11-03 14:22","artistName":"C","trackName":"Z","msPlayed":500}]"#;
        let bytes = zip_bytes(&[
            (
                "Spotify Extended Streaming History/Streaming_History_Audio_2023_0.json",
                history_json(&["A", "B"]).as_slice(),
            ),
            ("Userdata.json", br#"{"email":"x"}"#.as_slice()),
            ("MyData/StreamingHistory0.json", legacy.as_slice()),
        ]);

        let events = decode_archive(bytes, |_| {}).await.expect("decode");
        let artists: Vec<_> = events
            .iter()
            .map(|e| e.master_metadata_album_artist_name.as_deref().unwrap())
            .collect();
        assert_eq!(artists, vec!["A", "B", "C"]);
        // Legacy records normalize through the same struct.
        assert_eq!(events[2].ms_played, 500);
    }

    #[tokio::test]
    async fn no_matching_entries_is_a_distinct_error() {
        let bytes = zip_bytes(&[("Userdata.json", b"[]".as_slice())]);
        let err = decode_archive(bytes, |_| {}).await.unwrap_err();
        assert!(matches!(err, IngestError::NoHistoryFiles));
    }

    #[tokio::test]
    async fn matching_but_unusable_entries_yield_empty_result() {
        let bytes = zip_bytes(&[
            ("StreamingHistory0.json", b"[]".as_slice()),
            ("StreamingHistory1.json", b"{\"not\":\"a list\"}".as_slice()),
            ("Streaming_History_Audio.json", b"garbage".as_slice()),
        ]);
        let err = decode_archive(bytes, |_| {}).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyResult));
    }

    #[tokio::test]
    async fn malformed_entry_does_not_abort_the_others() {
        let bytes = zip_bytes(&[
            ("StreamingHistory0.json", b"garbage".as_slice()),
            (
                "Streaming_History_Audio_2024_1.json",
                history_json(&["D"]).as_slice(),
            ),
        ]);
        let events = decode_archive(bytes, |_| {}).await.expect("decode");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].master_metadata_album_artist_name.as_deref(),
            Some("D")
        );
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_reaches_merge_phase() {
        let bytes = zip_bytes(&[
            ("StreamingHistory0.json", history_json(&["A"]).as_slice()),
            ("StreamingHistory1.json", history_json(&["B"]).as_slice()),
        ]);

        let mut reports: Vec<u8> = Vec::new();
        decode_archive(bytes, |pct| reports.push(pct))
            .await
            .expect("decode");

        assert_eq!(reports.first().copied(), Some(10));
        assert_eq!(reports.last().copied(), Some(80));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn a_corrupt_container_fails_with_archive_error() {
        let err = decode_archive(b"definitely not a zip".to_vec(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Archive(_)));
    }
}
