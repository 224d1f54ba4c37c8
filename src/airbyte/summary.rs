// ABOUTME: Aggregation of per-stream statistics for a finished sync job
// ABOUTME: Sums record counts across every attempt of the final job snapshot

use std::collections::BTreeMap;
use std::fmt;

use super::models::Job;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Stream name to records emitted, summed over attempts.
    pub records_by_stream: BTreeMap<String, u64>,
    pub total_records: u64,
    pub total_records_committed: u64,
    pub total_bytes_emitted: u64,
}

pub fn summarize(job: &Job) -> SyncSummary {
    let mut summary = SyncSummary::default();

    for stream in job.attempts.iter().flat_map(|a| a.stream_stats.iter()) {
        let records = stream.stats.records_emitted.unwrap_or(0);
        *summary
            .records_by_stream
            .entry(stream.stream_name.clone())
            .or_insert(0) += records;
        summary.total_records += records;
        summary.total_records_committed += stream.stats.records_committed.unwrap_or(0);
        summary.total_bytes_emitted += stream.stats.bytes_emitted.unwrap_or(0);
    }

    summary
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Total records: {}", self.total_records)?;
        writeln!(f, "Records committed: {}", self.total_records_committed)?;
        writeln!(f, "Bytes emitted: {}", self.total_bytes_emitted)?;
        for (stream, records) in &self.records_by_stream {
            writeln!(f, "  {}: {}", stream, records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airbyte::models::{Attempt, StreamStat, StreamStats};

    fn stat(name: &str, emitted: Option<u64>) -> StreamStat {
        StreamStat {
            stream_name: name.to_string(),
            stats: StreamStats {
                records_emitted: emitted,
                records_committed: emitted,
                bytes_emitted: emitted.map(|n| n * 10),
            },
        }
    }

    fn attempt(stats: Vec<StreamStat>) -> Attempt {
        Attempt {
            stream_stats: stats,
            ..Default::default()
        }
    }

    #[test]
    fn empty_attempts_give_zero_total() {
        let summary = summarize(&Job::default());
        assert_eq!(summary.total_records, 0);
        assert!(summary.records_by_stream.is_empty());
    }

    #[test]
    fn sums_streams_across_attempts() {
        let job = Job {
            attempts: vec![
                attempt(vec![stat("daily", Some(100)), stat("hourly", Some(20))]),
                attempt(vec![stat("daily", Some(5))]),
            ],
            ..Default::default()
        };

        let summary = summarize(&job);
        assert_eq!(summary.records_by_stream["daily"], 105);
        assert_eq!(summary.records_by_stream["hourly"], 20);
        assert_eq!(summary.total_records, 125);
        assert_eq!(summary.total_records_committed, 125);
        assert_eq!(summary.total_bytes_emitted, 1250);
    }

    #[test]
    fn missing_counts_are_zero() {
        let job = Job {
            attempts: vec![attempt(vec![stat("current", None)])],
            ..Default::default()
        };

        let summary = summarize(&job);
        assert_eq!(summary.records_by_stream["current"], 0);
        assert_eq!(summary.total_records, 0);
    }

    #[test]
    fn display_lists_streams_in_order() {
        let job = Job {
            attempts: vec![attempt(vec![stat("b", Some(2)), stat("a", Some(1))])],
            ..Default::default()
        };
        let rendered = summarize(&job).to_string();
        assert_eq!(
            rendered,
            "Total records: 3\nRecords committed: 3\nBytes emitted: 30\n  a: 1\n  b: 2\n"
        );
    }
}
