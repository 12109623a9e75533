//! Tags shared with external tooling

/// Money balances, also the balance type the negative fallback debits
pub const MONETARY: &str = "*monetary";
/// Time units
pub const VOICE: &str = "*voice";
/// Data volume
pub const DATA: &str = "*data";
/// Message counts
pub const SMS: &str = "*sms";
/// Balances that pay for any non-monetary balance type
pub const GENERIC: &str = "*generic";

/// Id of the balance that absorbs debt
pub const META_DEFAULT: &str = "*default";
/// Wildcard destination id / sharing-parameters key
pub const META_ANY: &str = "*any";
/// Rating subject prefix of balances consumed at zero cost, e.g. `*zero1s`
pub const ZERO_RATING_SUBJECT_PREFIX: &str = "*zero";

/// Separator of list-valued filter strings
pub const INFIELD_SEP: char = ';';
/// Marks an excluded entry inside a filter string
pub const NEGATIVE_PREFIX: char = '!';

/// Shared-group lock ids live beside account ids in the same guardian
pub const SHARED_GROUP_LOCK_PREFIX: &str = "*shared_group:";
