//! Age-tier classification of archive files.
//!
//! Age is measured in whole days between `today` and the date embedded in
//! the file name. Recent files are kept untouched; older ones are thinned
//! to one file per calendar day, and beyond that to one file per ISO week.
//! Protected files are set aside before thinning and never pruned.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::RetentionConfig;
use crate::model::entry::{Index, IndexEntry};
use crate::retention::protect::{ProtectReason, ProtectionRules};

/// Retention tier a file falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Up to `keep_all_days`.
    KeepAll,
    /// Up to `full_retention_days`, still kept in full.
    Full,
    /// Up to `daily_retention_days`, one file per day.
    Daily,
    /// Older, one file per ISO week.
    Weekly,
}

impl Tier {
    pub fn for_age(age_days: i64, config: &RetentionConfig) -> Self {
        if age_days <= config.keep_all_days {
            Self::KeepAll
        } else if age_days <= config.full_retention_days {
            Self::Full
        } else if age_days <= config.daily_retention_days {
            Self::Daily
        } else {
            Self::Weekly
        }
    }
}

/// Result of classifying every archive file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Classification {
    pub keep: Vec<String>,
    pub prune: Vec<String>,
    pub protected: Vec<(String, ProtectReason)>,
    /// Files without a parseable date prefix; always kept.
    pub unknown: Vec<String>,
    /// Number of dated files seen per tier.
    pub tier_counts: BTreeMap<Tier, usize>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.keep.len() + self.prune.len() + self.protected.len() + self.unknown.len()
    }
}

/// Date from a `YYYYMMDD_...` file name.
pub fn parse_filename_date(filename: &str) -> Option<NaiveDate> {
    let bytes = filename.as_bytes();
    if bytes.len() < 9 || bytes[8] != b'_' || !all_digits(&bytes[..8]) {
        return None;
    }
    let year = filename[0..4].parse().ok()?;
    let month = filename[4..6].parse().ok()?;
    let day = filename[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Date and time from a `YYYYMMDD_HHMMSS_...` file name.
pub fn parse_filename_datetime(filename: &str) -> Option<NaiveDateTime> {
    let date = parse_filename_date(filename)?;
    let bytes = filename.as_bytes();
    if bytes.len() < 16 || bytes[15] != b'_' || !all_digits(&bytes[9..15]) {
        return None;
    }
    let hour = filename[9..11].parse().ok()?;
    let minute = filename[11..13].parse().ok()?;
    let second = filename[13..15].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second).map(|t| date.and_time(t))
}

fn all_digits(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_digit)
}

/// Classify `files` (archive file names) against the index.
pub fn classify(
    index: &Index,
    files: &[String],
    today: NaiveDate,
    config: &RetentionConfig,
    rules: &ProtectionRules,
) -> Classification {
    let by_filename: HashMap<&str, &IndexEntry> = index
        .values()
        .filter(|e| !e.filename.is_empty())
        .map(|e| (e.filename.as_str(), e))
        .collect();

    let mut result = Classification::default();
    let mut by_day: BTreeMap<NaiveDate, Vec<&str>> = BTreeMap::new();
    for name in files {
        match parse_filename_date(name) {
            Some(day) => by_day.entry(day).or_default().push(name),
            None => result.unknown.push(name.clone()),
        }
    }

    let mut by_week: BTreeMap<(i32, u32), Vec<(NaiveDate, &str)>> = BTreeMap::new();

    for (day, mut names) in by_day {
        // Earliest embedded time first; names without a valid time lead.
        names.sort_by_key(|n| parse_filename_datetime(n));
        let tier = Tier::for_age((today - day).num_days(), config);
        *result.tier_counts.entry(tier).or_default() += names.len();

        match tier {
            Tier::KeepAll | Tier::Full => {
                result.keep.extend(names.into_iter().map(String::from));
            }
            Tier::Daily => {
                let candidates = set_aside_protected(&mut result, names, &by_filename, rules);
                keep_first(&mut result, candidates);
            }
            Tier::Weekly => {
                let week = day.iso_week();
                by_week
                    .entry((week.year(), week.week()))
                    .or_default()
                    .extend(names.into_iter().map(|n| (day, n)));
            }
        }
    }

    for (_, mut day_files) in by_week {
        day_files.sort();
        let names = day_files.into_iter().map(|(_, n)| n).collect();
        let candidates = set_aside_protected(&mut result, names, &by_filename, rules);
        keep_first(&mut result, candidates);
    }

    result
}

/// Move protected files into `result.protected`, returning the rest in order.
fn set_aside_protected<'a>(
    result: &mut Classification,
    names: Vec<&'a str>,
    by_filename: &HashMap<&str, &IndexEntry>,
    rules: &ProtectionRules,
) -> Vec<&'a str> {
    let mut candidates = Vec::with_capacity(names.len());
    for name in names {
        match rules.protects(by_filename.get(name).copied()) {
            Some(reason) => result.protected.push((name.to_string(), reason)),
            None => candidates.push(name),
        }
    }
    candidates
}

fn keep_first(result: &mut Classification, candidates: Vec<&str>) {
    let mut iter = candidates.into_iter();
    if let Some(first) = iter.next() {
        result.keep.push(first.to_string());
    }
    result.prune.extend(iter.map(String::from));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::Attachment;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn name_for(day: NaiveDate, time: &str, tag: &str) -> String {
        format!("{}_{time}_Subject_{tag}.txt", day.format("%Y%m%d"))
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - chrono::Duration::days(n)
    }

    fn entry_for(name: &str) -> IndexEntry {
        IndexEntry {
            filename: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_filename_dates() {
        assert_eq!(
            parse_filename_date("20260215_082914_Subject_abc.txt"),
            NaiveDate::from_ymd_opt(2026, 2, 15)
        );
        assert_eq!(
            parse_filename_datetime("20260215_082914_Subject_abc.txt"),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap().and_hms_opt(8, 29, 14)
        );
        assert_eq!(parse_filename_date("00000000_000000_x_abc.txt"), None);
        assert_eq!(parse_filename_date("20261340_000000_x.txt"), None);
        assert_eq!(parse_filename_date("notes.txt"), None);
        assert_eq!(parse_filename_date("2026021_x.txt"), None);
        assert_eq!(parse_filename_datetime("20260215_99_x.txt"), None);
    }

    #[test]
    fn test_tier_boundaries() {
        let cfg = RetentionConfig::default();
        assert_eq!(Tier::for_age(0, &cfg), Tier::KeepAll);
        assert_eq!(Tier::for_age(7, &cfg), Tier::KeepAll);
        assert_eq!(Tier::for_age(8, &cfg), Tier::Full);
        assert_eq!(Tier::for_age(90, &cfg), Tier::Full);
        assert_eq!(Tier::for_age(91, &cfg), Tier::Daily);
        assert_eq!(Tier::for_age(365, &cfg), Tier::Daily);
        assert_eq!(Tier::for_age(366, &cfg), Tier::Weekly);
        assert_eq!(Tier::for_age(-3, &cfg), Tier::KeepAll);
    }

    #[test]
    fn test_recent_days_keep_everything() {
        let files: Vec<String> = (0..5)
            .map(|i| name_for(days_ago(30), &format!("1{i}0000"), &i.to_string()))
            .collect();
        let c = classify(
            &Index::new(),
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );
        assert_eq!(c.keep.len(), 5);
        assert!(c.prune.is_empty());
    }

    #[test]
    fn test_daily_tier_keeps_earliest_unprotected() {
        let day = days_ago(120);
        let late = name_for(day, "180000", "late");
        let early = name_for(day, "080000", "early");
        let noon = name_for(day, "120000", "noon");
        let files = vec![late.clone(), early.clone(), noon.clone()];

        let mut index = Index::new();
        let mut with_att = entry_for(&early);
        with_att.attachments = vec![Attachment::failed("a", "text/plain", 1, "x")];
        index.insert("k1".into(), with_att);

        let c = classify(
            &index,
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );
        assert_eq!(c.protected, vec![(early, ProtectReason::HasAttachments)]);
        assert_eq!(c.keep, vec![noon]);
        assert_eq!(c.prune, vec![late]);
        assert_eq!(c.tier_counts[&Tier::Daily], 3);
    }

    #[test]
    fn test_weekly_tier_groups_by_iso_week() {
        // 2024-01-01 is a Monday; 2024-01-07 a Sunday, 2024-01-08 the next Monday.
        let mon = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sun = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        let next_mon = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let files = vec![
            name_for(sun, "000000", "b"),
            name_for(mon, "230000", "a"),
            name_for(next_mon, "000000", "c"),
        ];
        let c = classify(
            &Index::new(),
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );
        assert_eq!(
            c.keep,
            vec![name_for(mon, "230000", "a"), name_for(next_mon, "000000", "c")]
        );
        assert_eq!(c.prune, vec![name_for(sun, "000000", "b")]);
    }

    #[test]
    fn test_unknown_dates_never_pruned() {
        let files = vec![
            "00000000_000000_Hi_abc.txt".to_string(),
            "readme.txt".to_string(),
        ];
        let c = classify(
            &Index::new(),
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );
        assert_eq!(c.unknown, files);
        assert!(c.prune.is_empty() && c.keep.is_empty());
        assert_eq!(c.total(), 2);
    }

    #[test]
    fn test_four_hundred_days_one_file_each() {
        let files: Vec<String> = (0..400)
            .map(|n| name_for(days_ago(n), "120000", &n.to_string()))
            .collect();
        let c = classify(
            &Index::new(),
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );

        let mut weeks: Vec<_> = (366..400)
            .map(|n| {
                let w = days_ago(n).iso_week();
                (w.year(), w.week())
            })
            .collect();
        weeks.dedup();

        // Ages 0..=90 in full, one per day for 91..=365, one per ISO week beyond.
        assert_eq!(c.keep.len(), 91 + 275 + weeks.len());
        assert_eq!(c.prune.len(), 34 - weeks.len());
        assert!(c.protected.is_empty() && c.unknown.is_empty());
        assert_eq!(c.total(), 400);
    }

    #[test]
    fn test_protected_files_excluded_in_every_thinned_tier() {
        let files: Vec<String> = (0..400)
            .flat_map(|n| {
                vec![
                    name_for(days_ago(n), "090000", &format!("{n}a")),
                    name_for(days_ago(n), "100000", &format!("{n}b")),
                ]
            })
            .collect();
        let mut index = Index::new();
        for (i, name) in files.iter().enumerate().filter(|(i, _)| i % 2 == 1) {
            let mut e = entry_for(name);
            e.attachments = vec![Attachment::failed("a", "text/plain", 1, "x")];
            index.insert(format!("k{i}"), e);
        }

        let c = classify(
            &index,
            &files,
            today(),
            &RetentionConfig::default(),
            &ProtectionRules::standard(None),
        );
        for (name, _) in &c.protected {
            assert!(!c.prune.contains(name));
        }
        for (i, name) in files.iter().enumerate() {
            if i % 2 == 1 {
                assert!(!c.prune.contains(name), "{name} has attachments");
            }
        }
        assert_eq!(c.protected.len(), 400 - 91);
    }
}
