/// Sentinel accepted by every pattern position meaning "match all".
pub const MATCH_ALL: &str = "*";

/// Query-time matcher for job types and instances.
///
/// The mirror only understands exact values and the `*` sentinel. Richer globs are a
/// feature of the telemetry source's query language and are passed through verbatim there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Exact(String),
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        if raw == MATCH_ALL {
            Pattern::Any
        } else {
            Pattern::Exact(raw.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(v) => v == value,
        }
    }

    pub fn exact(&self) -> Option<&str> {
        match self {
            Pattern::Any => None,
            Pattern::Exact(v) => Some(v.as_str()),
        }
    }
}
