//! Index querying utilities.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::model::entry::{Index, IndexEntry};
use crate::parser::header::parse_date;

/// Mailbox filter value that matches every entry.
pub const ALL_MAILBOXES: &str = "all";

/// Filtered listing: the entries shown plus how many matched in total.
#[derive(Debug, Clone)]
pub struct Listing<'a> {
    pub entries: Vec<(&'a str, &'a IndexEntry)>,
    pub matched: usize,
}

/// List entries newest first, filtered by mailbox label and read flag.
///
/// `mailbox` of [`ALL_MAILBOXES`] disables the label filter. Entries whose
/// date cannot be parsed sort after all dated ones.
pub fn list_entries<'a>(
    index: &'a Index,
    mailbox: &str,
    only_unread: bool,
    limit: usize,
) -> Listing<'a> {
    let mut entries: Vec<(&str, &IndexEntry)> = index
        .iter()
        .filter(|(_, e)| mailbox == ALL_MAILBOXES || e.mailbox == mailbox)
        .filter(|(_, e)| !only_unread || !e.read)
        .map(|(k, e)| (k.as_str(), e))
        .collect();

    sort_by_date(&mut entries, false);
    let matched = entries.len();
    entries.truncate(limit);
    Listing { entries, matched }
}

/// Unread entries, oldest first.
pub fn unread(index: &Index) -> Vec<(&str, &IndexEntry)> {
    let mut entries: Vec<(&str, &IndexEntry)> = index
        .iter()
        .filter(|(_, e)| !e.read)
        .map(|(k, e)| (k.as_str(), e))
        .collect();
    sort_by_date(&mut entries, true);
    entries
}

/// Sort by parsed `Date` header, undated entries last in either direction.
/// Ties fall back to the key so the order is stable across runs.
fn sort_by_date(entries: &mut [(&str, &IndexEntry)], ascending: bool) {
    let mut keyed: Vec<(Option<DateTime<Utc>>, &str, &IndexEntry)> = entries
        .iter()
        .map(|&(k, e)| (parse_date(&e.date), k, e))
        .collect();

    keyed.sort_by(|a, b| {
        let by_date = match (a.0, b.0) {
            (Some(x), Some(y)) if ascending => x.cmp(&y),
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_date.then_with(|| a.1.cmp(b.1))
    });

    for (slot, (_, k, e)) in entries.iter_mut().zip(keyed) {
        *slot = (k, e);
    }
}

/// Summary counts over the whole index.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub unread: usize,
    pub with_attachments: usize,
    /// Entry count per mailbox label.
    pub per_mailbox: BTreeMap<String, usize>,
}

/// Count entries by read flag, attachments and mailbox.
pub fn stats(index: &Index) -> IndexStats {
    let mut stats = IndexStats {
        total: index.len(),
        ..Default::default()
    };
    for entry in index.values() {
        if !entry.read {
            stats.unread += 1;
        }
        if entry.has_attachments() {
            stats.with_attachments += 1;
        }
        *stats.per_mailbox.entry(entry.mailbox.clone()).or_default() += 1;
    }
    stats
}

/// Return the date range (oldest, newest) across entries with a parseable date.
pub fn date_range(index: &Index) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut dates = index.values().filter_map(|e| parse_date(&e.date));
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d))))
}

/// Return the top N senders by message count.
pub fn top_senders(index: &Index, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in index.values() {
        *counts.entry(entry.from.as_str()).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(sender, count)| (sender.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}
