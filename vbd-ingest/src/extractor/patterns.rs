//! Line classification rules
//!
//! Rules are tried in a fixed priority order and the first match wins, so
//! every line maps to at most one [`LogLine`].

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Most `key=value` pairs recognised on one epoch or metrics line
pub const MAX_PAIRS_PER_LINE: usize = 10;

static DEVICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"INFO: training on (.*) -> (.*)$").expect("valid device regex"));

static ARGS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INFO: full set of arguments: (.*)$").expect("valid arguments regex")
});

static OLD_ARGS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INFO: full set of old arguments: (.*)$").expect("valid old arguments regex")
});

static EXPERIMENT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INFO: .* experiment_id=(.*)$").expect("valid experiment id regex")
});

static RUN_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INFO: Run name: .*_(\d+\.\d+\.\d+)_(\d+:\d+:\d+).*").expect("valid run date regex")
});

static RUN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"INFO: Run name: '(.*)'").expect("valid run name regex"));

static EPOCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&pairs_pattern(r"INFO: epoch (\d+): ")).expect("valid epoch regex")
});

static EFFICIENCY_PAIRS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&pairs_pattern(r"INFO: Efficiency metrics: ")).expect("valid efficiency regex")
});

static EFFICIENCY_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INFO: (?:Efficiency m|M)etrics: (.*)$").expect("valid metrics literal regex")
});

/// `prefix` followed by one to [`MAX_PAIRS_PER_LINE`] comma-separated pairs
fn pairs_pattern(prefix: &str) -> String {
    format!(
        "{}(?:([^=,]*)=([^=,]*)){}$",
        prefix,
        "(?:, ([^=]*)=([^=,]*))?".repeat(MAX_PAIRS_PER_LINE - 1)
    )
}

/// A recognised log line
#[derive(Debug, Clone, PartialEq)]
pub enum LogLine<'a> {
    /// `training on <x> -> <device>`
    Device(&'a str),
    /// Current arguments, as a Python dict literal
    Arguments(&'a str),
    /// Arguments of the run this one continued from
    OldArguments(&'a str),
    /// Raw experiment id text
    ExperimentId(&'a str),
    /// Run line; the name is `None` when the quoted name is missing
    RunDate {
        date: String,
        run_name: Option<&'a str>,
    },
    Epoch {
        epoch: &'a str,
        pairs: Vec<(&'a str, &'a str)>,
    },
    EfficiencyPairs(Vec<(&'a str, &'a str)>),
    EfficiencyLiteral(&'a str),
}

/// Classify one line (without its line terminator)
pub fn classify(line: &str) -> Option<LogLine<'_>> {
    if let Some(caps) = DEVICE_RE.captures(line) {
        return Some(LogLine::Device(group(&caps, 2)));
    }
    if let Some(caps) = ARGS_RE.captures(line) {
        return Some(LogLine::Arguments(group(&caps, 1)));
    }
    if let Some(caps) = OLD_ARGS_RE.captures(line) {
        return Some(LogLine::OldArguments(group(&caps, 1)));
    }
    if let Some(caps) = EXPERIMENT_ID_RE.captures(line) {
        return Some(LogLine::ExperimentId(group(&caps, 1)));
    }
    if let Some(caps) = RUN_DATE_RE.captures(line) {
        let date = format!("{} {}", group(&caps, 1), group(&caps, 2));
        let run_name = RUN_NAME_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        return Some(LogLine::RunDate { date, run_name });
    }
    if let Some(caps) = EPOCH_RE.captures(line) {
        return Some(LogLine::Epoch {
            epoch: group(&caps, 1),
            pairs: pairs(&caps, 2),
        });
    }
    if let Some(caps) = EFFICIENCY_PAIRS_RE.captures(line) {
        return Some(LogLine::EfficiencyPairs(pairs(&caps, 1)));
    }
    if let Some(caps) = EFFICIENCY_LITERAL_RE.captures(line) {
        return Some(LogLine::EfficiencyLiteral(group(&caps, 1)));
    }
    None
}

fn group<'a>(caps: &Captures<'a>, idx: usize) -> &'a str {
    caps.get(idx).map(|m| m.as_str()).unwrap_or("")
}

/// Collect key/value groups starting at `first`, stopping at the first
/// pair that did not participate in the match
fn pairs<'a>(caps: &Captures<'a>, first: usize) -> Vec<(&'a str, &'a str)> {
    let mut out = Vec::new();
    let mut idx = first;
    while let Some(key) = caps.get(idx) {
        out.push((key.as_str(), group(caps, idx + 1)));
        idx += 2;
    }
    out
}
