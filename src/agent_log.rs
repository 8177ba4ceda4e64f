use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::TranscriptEntry;

const TRANSCRIPT_PREFIX: &str = "friday-";
const MAX_TRANSCRIPT_FILES: usize = 7;

pub(crate) fn append_transcript(
    log_dir: &Path,
    entry: &TranscriptEntry,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    let date_str = Utc::now().format("%Y-%m-%d");
    let path = log_dir.join(format!("{TRANSCRIPT_PREFIX}{date_str}.jsonl"));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    prune_transcripts(log_dir);
    Ok(())
}

/// Keep the newest `MAX_TRANSCRIPT_FILES` daily files.
fn prune_transcripts(log_dir: &Path) {
    for stale in transcript_files(log_dir).into_iter().skip(MAX_TRANSCRIPT_FILES) {
        if let Err(err) = fs::remove_file(&stale) {
            tracing::warn!(path = %stale.display(), %err, "failed to prune transcript");
        }
    }
}

fn transcript_files(log_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(log_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(TRANSCRIPT_PREFIX) && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect(),
        Err(_) => return Vec::new(),
    };
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    files
}

/// Most recent `limit` entries, oldest first. Unreadable lines are skipped.
pub(crate) fn load_recent_transcript(log_dir: &Path, limit: usize) -> Vec<TranscriptEntry> {
    let mut collected: Vec<TranscriptEntry> = Vec::new();
    for path in transcript_files(log_dir).into_iter().take(MAX_TRANSCRIPT_FILES) {
        if collected.len() >= limit {
            break;
        }
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => continue,
        };
        let mut day: Vec<TranscriptEntry> = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();
        day.append(&mut collected);
        collected = day;
    }
    let skip = collected.len().saturating_sub(limit);
    collected.split_off(skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64, route: &str) -> TranscriptEntry {
        TranscriptEntry {
            ts_utc: n,
            route: route.to_string(),
            utterance: format!("friday {n}"),
            reply: Some(format!("reply {n}")),
        }
    }

    #[test]
    fn recent_entries_span_days_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("friday-2026-01-01.jsonl");
        let lines: Vec<String> = (1..=3)
            .map(|n| serde_json::to_string(&entry(n, "local")).unwrap())
            .collect();
        fs::write(&old, format!("{}\nnot json\n", lines.join("\n"))).unwrap();
        fs::write(dir.path().join("unrelated.jsonl"), "{}\n").unwrap();

        append_transcript(dir.path(), &entry(4, "remote")).unwrap();
        append_transcript(dir.path(), &entry(5, "ignored")).unwrap();

        let recent = load_recent_transcript(dir.path(), 3);
        let stamps: Vec<i64> = recent.iter().map(|e| e.ts_utc).collect();
        assert_eq!(stamps, vec![3, 4, 5]);
        assert_eq!(recent[1].route, "remote");
    }

    #[test]
    fn old_daily_files_are_pruned_on_append() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=9 {
            let path = dir.path().join(format!("friday-2020-01-{day:02}.jsonl"));
            fs::write(path, "{}\n").unwrap();
        }
        append_transcript(dir.path(), &entry(1, "local")).unwrap();

        let kept = transcript_files(dir.path());
        assert_eq!(kept.len(), MAX_TRANSCRIPT_FILES);
        assert!(!dir.path().join("friday-2020-01-03.jsonl").exists());
        assert!(dir.path().join("friday-2020-01-09.jsonl").exists());
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_recent_transcript(&dir.path().join("nope"), 10).is_empty());
    }
}
