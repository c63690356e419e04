use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Where a stream starts in the source's event history.
///
/// - `Now`: only changes that happen after registration (default).
/// - `EventId(n)`: replay from a previously observed event id, for sources
///   that keep history. Sources without history log and fall back to `Now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "SinceSpec")]
pub enum Since {
    #[default]
    Now,
    EventId(u64),
}

impl FromStr for Since {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("now") {
            return Ok(Since::Now);
        }
        trimmed.parse::<u64>().map(Since::EventId).map_err(|_| {
            format!("invalid since: {trimmed} (expected \"now\" or an event id)")
        })
    }
}

impl fmt::Display for Since {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Since::Now => f.write_str("now"),
            Since::EventId(id) => write!(f, "{id}"),
        }
    }
}

/// TOML accepts both `since = "now"` and `since = 1234`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SinceSpec {
    Id(u64),
    Keyword(String),
}

impl TryFrom<SinceSpec> for Since {
    type Error = String;

    fn try_from(spec: SinceSpec) -> Result<Self, Self::Error> {
        match spec {
            SinceSpec::Id(id) => Ok(Since::EventId(id)),
            SinceSpec::Keyword(s) => s.parse(),
        }
    }
}
