//! Prefix/delimiter listing fold, shared by `list` and `list_versions`
//! (§4.2, §8 property 10 "list idempotence").

use std::collections::HashSet;

use crate::model::{ListEntry, ListResult};

/// Fold `(key, entry)` pairs already in lexicographic order into a
/// [`ListResult`], applying `marker`/`prefix`/`delimiter`/`max_keys` the way
/// §4.2's `list` describes: keys sharing a common prefix up to the next
/// delimiter after `prefix` collapse into one `CommonPrefix`.
pub fn fold<'a>(
    items: impl Iterator<Item = (&'a str, ListEntry)>,
    prefix: &str,
    delimiter: &str,
    marker: &str,
    max_keys: usize,
) -> ListResult {
    let mut entries = Vec::new();
    let mut common_prefixes = Vec::new();
    let mut seen_prefixes = HashSet::new();
    let mut is_truncated = false;

    for (key, entry) in items {
        if !marker.is_empty() && key <= marker {
            continue;
        }
        if !prefix.is_empty() && !key.starts_with(prefix) {
            continue;
        }

        if !delimiter.is_empty() {
            let after_prefix = &key[prefix.len()..];
            if let Some(pos) = after_prefix.find(delimiter) {
                let common = format!("{prefix}{}{delimiter}", &after_prefix[..pos]);
                if seen_prefixes.insert(common.clone()) {
                    common_prefixes.push(common);
                }
                continue;
            }
        }

        if entries.len() >= max_keys {
            is_truncated = true;
            break;
        }
        entries.push(entry);
    }

    let next_marker = is_truncated.then(|| entries.last().map(|e| e.key.clone())).flatten();

    ListResult {
        entries,
        common_prefixes,
        is_truncated,
        next_marker,
    }
}
