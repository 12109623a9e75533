//! Destination-prefix matching against the reverse destination index

use tracing::debug;

use crate::error::ChargingError;
use crate::ports::AccountingStorage;
use crate::string_map::StringMap;

/// Prefixes of `destination` from the longest down to `min_len` characters
pub fn split_prefix(destination: &str, min_len: usize) -> Vec<&str> {
    let min_len = min_len.max(1);
    let mut bounds: Vec<usize> = destination
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .collect();
    bounds.reverse();
    bounds
        .into_iter()
        .enumerate()
        .take_while(|(i, _)| destination.chars().count() - i >= min_len)
        .map(|(_, end)| &destination[..end])
        .collect()
}

/// Matches a balance's destination rules against `destination`
///
/// Walks the prefixes longest first and stops at the first prefix whose
/// reverse lookup yields ids relevant to the rules. Returns the matched
/// prefix length (the precision) when the balance may pay, `None` when it is
/// excluded or nothing matched. A prefix whose relevant ids mix inclusions
/// and exclusions excludes the balance. Rules made only of exclusions admit
/// every destination they do not exclude, including one without any match
/// in the index (precision 0).
pub fn match_destination(
    rules: &StringMap,
    destination: &str,
    storage: &dyn AccountingStorage,
    min_prefix_match: usize,
) -> Result<Option<usize>, ChargingError> {
    let all_exclusions = rules.is_all_exclusions();
    for prefix in split_prefix(destination, min_prefix_match) {
        let ids = match storage.get_reverse_destination(prefix) {
            Ok(ids) => ids,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        let mut found = false;
        let mut all_include = true;
        for id in &ids {
            if let Some(include) = rules.get(id) {
                found = true;
                all_include &= include;
            }
        }
        if found || (all_exclusions && !ids.is_empty()) {
            let precision = prefix.chars().count();
            debug!(prefix, precision, included = all_include, "destination rules matched");
            return Ok(all_include.then_some(precision));
        }
    }
    Ok(all_exclusions.then_some(0))
}
