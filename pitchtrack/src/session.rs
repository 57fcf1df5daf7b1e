//! Session-level manifest, summary JSON/CSV and event log export. See spec
//! §6 "On-disk layout per session" and SPEC_FULL §3's "Session summary CSV"
//! and "Event log export" additions.

use crate::error::Result;
use chrono::{DateTime, Utc};
use pitch_types::{PitchSummary, TrackingEvent};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionManifest<'a> {
    pub schema_version: u32,
    pub app_version: &'a str,
    pub session_id: &'a str,
    pub start_utc: DateTime<Utc>,
    pub end_utc: Option<DateTime<Utc>>,
    pub pitch_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub pitch_count: usize,
    pub pitches: Vec<PitchSummary>,
}

/// One row of `session_summary.csv`: the scalar fields of a `PitchSummary`,
/// mirroring `braidz-writer`'s practice of emitting both a JSON and a CSV
/// view of the same per-row data.
#[derive(Debug, Serialize)]
struct SummaryCsvRow<'a> {
    pitch_id: &'a str,
    t_start_ns: i64,
    t_end_ns: i64,
    is_strike: bool,
    zone_row: u8,
    zone_col: u8,
    run_in: f64,
    rise_in: f64,
    measured_speed_mph: f64,
    confidence: f64,
    model: &'a str,
}

impl<'a> From<&'a PitchSummary> for SummaryCsvRow<'a> {
    fn from(s: &'a PitchSummary) -> Self {
        Self {
            pitch_id: &s.pitch_id,
            t_start_ns: s.t_start_ns,
            t_end_ns: s.t_end_ns,
            is_strike: s.is_strike,
            zone_row: s.zone_row,
            zone_col: s.zone_col,
            run_in: s.run_in,
            rise_in: s.rise_in,
            measured_speed_mph: s.measured_speed_mph,
            confidence: s.confidence,
            model: &s.model,
        }
    }
}

pub fn write_session_summary(session_dir: &Path, summary: &SessionSummary) -> Result<()> {
    let json_path = session_dir.join("session_summary.json");
    let file = std::fs::File::create(&json_path)?;
    serde_json::to_writer_pretty(file, summary)?;

    let csv_path = session_dir.join("session_summary.csv");
    let mut writer = csv::Writer::from_path(&csv_path)?;
    for pitch in &summary.pitches {
        writer.serialize(SummaryCsvRow::from(pitch))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_session_manifest(session_dir: &Path, manifest: &SessionManifest) -> Result<()> {
    let path = session_dir.join("manifest.json");
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

/// One JSON object per line, matching the corpus's `TextlogRow`-style
/// `jsonl` event logging in `flydra2::write_data`.
pub fn write_event_log(session_dir: &Path, events: &[TrackingEvent]) -> Result<()> {
    let path = session_dir.join("event_log.jsonl");
    let mut file = std::fs::File::create(path)?;
    for event in events {
        serde_json::to_writer(&mut file, event)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::TrajectoryDiagnostics;

    fn pitch(pitch_id: &str) -> PitchSummary {
        PitchSummary {
            pitch_id: pitch_id.to_string(),
            t_start_ns: 0,
            t_end_ns: 200_000_000,
            plate_crossing_xyz_ft: [0.0, 2.5, 0.0],
            plate_crossing_t_ns: 150_000_000,
            release_point_ft: [0.0, 6.0, 50.0],
            run_in: 1.0,
            rise_in: 2.0,
            measured_speed_mph: 91.0,
            rotation_rpm: Some(2100.0),
            model: "drag".to_string(),
            expected_error_ft: 0.1,
            confidence: 0.95,
            is_strike: true,
            zone_row: 1,
            zone_col: 1,
            diagnostics: TrajectoryDiagnostics::default(),
        }
    }

    #[test]
    fn write_session_summary_writes_both_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let summary = SessionSummary {
            session_id: "s1".to_string(),
            pitch_count: 1,
            pitches: vec![pitch("s1-pitch-001")],
        };
        write_session_summary(dir.path(), &summary).unwrap();

        let json_text = std::fs::read_to_string(dir.path().join("session_summary.json")).unwrap();
        let roundtripped: SessionSummary = serde_json::from_str(&json_text).unwrap();
        assert_eq!(roundtripped.pitch_count, 1);
        assert_eq!(roundtripped.pitches[0].pitch_id, "s1-pitch-001");

        let csv_text = std::fs::read_to_string(dir.path().join("session_summary.csv")).unwrap();
        assert!(csv_text.contains("s1-pitch-001"));
        assert!(csv_text.contains("91"));
    }

    #[test]
    fn write_session_manifest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = SessionManifest {
            schema_version: 1,
            app_version: "0.1.0",
            session_id: "s1",
            start_utc: Utc::now(),
            end_utc: None,
            pitch_count: 0,
        };
        write_session_manifest(dir.path(), &manifest).unwrap();

        let text = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        let roundtripped: SessionManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(roundtripped.session_id, "s1");
        assert!(roundtripped.end_utc.is_none());
    }

    #[test]
    fn write_event_log_emits_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![
            TrackingEvent {
                t_ns: 0,
                kind: pitch_types::TrackingEventKind::EnteredRampUp { first_detection_ns: 0 },
            },
            TrackingEvent {
                t_ns: 200_000_000,
                kind: pitch_types::TrackingEventKind::Finalized { pitch_index: 1, accepted: true },
            },
        ];
        write_event_log(dir.path(), &events).unwrap();

        let text = std::fs::read_to_string(dir.path().join("event_log.jsonl")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<TrackingEvent>(line).unwrap();
        }
    }
}
