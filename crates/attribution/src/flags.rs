use std::collections::BTreeSet;

/// Ordered, deduplicated set of flag names.
pub type FlagSet = BTreeSet<String>;

pub const HARD_DRAWDOWN: &str = "HARD_DRAWDOWN";
pub const LATE_CRASH: &str = "LATE_CRASH";
pub const LOW_EDGE: &str = "LOW_EDGE";
pub const UNATTRIBUTED: &str = "UNATTRIBUTED";

/// Serialize flags as `A|B|C`, sorted.
pub fn format_flags(flags: &FlagSet) -> String {
    flags.iter().map(String::as_str).collect::<Vec<_>>().join("|")
}

/// Parse a flag column.
///
/// Two grammars are recognised:
/// - pipe-delimited: `HARD_DRAWDOWN|LATE_CRASH`
/// - legacy list: `['HARD_DRAWDOWN', "LATE_CRASH"]`
///
/// Flag names may contain ASCII letters, digits, `_` and `-`. Anything that
/// fits neither grammar yields an empty set.
pub fn parse_flags(raw: &str) -> FlagSet {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix('[') {
        Some(rest) => match rest.strip_suffix(']') {
            Some(inner) => parse_list(inner),
            None => None,
        },
        None => parse_piped(raw),
    };
    parsed.unwrap_or_default()
}

fn parse_piped(raw: &str) -> Option<FlagSet> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| is_flag_name(s).then(|| s.to_string()))
        .collect()
}

fn parse_list(inner: &str) -> Option<FlagSet> {
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let name = unquote(item)?;
            is_flag_name(name).then(|| name.to_string())
        })
        .collect()
}

fn unquote(item: &str) -> Option<&str> {
    ['\'', '"']
        .iter()
        .find_map(|&q| item.strip_prefix(q)?.strip_suffix(q))
}

fn is_flag_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
