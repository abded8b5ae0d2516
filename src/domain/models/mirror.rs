use serde::{Deserialize, Serialize};

/// What happens when the graph half of a dual write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorPolicy {
    /// Log, count and carry on; the vector-store write is reported as a success.
    #[default]
    FailOpen,
    /// Report `MirrorWriteFailed` to the caller. The vector-store write is kept.
    FailClosed,
}

impl MirrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorPolicy::FailOpen => "fail-open",
            MirrorPolicy::FailClosed => "fail-closed",
        }
    }
}

impl std::str::FromStr for MirrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(MirrorPolicy::FailOpen),
            "fail-closed" | "fail_closed" | "closed" => Ok(MirrorPolicy::FailClosed),
            other => Err(format!(
                "unknown mirror policy '{}', expected fail-open or fail-closed",
                other
            )),
        }
    }
}

impl std::fmt::Display for MirrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters describing graph mirror health since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorStats {
    pub mirror_writes: u64,
    pub mirror_failures: u64,
}

/// Outcome of comparing vector-store ids with graph node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub documents_checked: usize,
    pub nodes_checked: usize,
    /// Documents with no node in the graph.
    pub missing_in_graph: Vec<String>,
    /// Nodes whose document no longer exists.
    pub orphaned_in_graph: Vec<String>,
    pub repaired_missing: usize,
    pub removed_orphans: usize,
}

impl DriftReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_in_graph.is_empty() && self.orphaned_in_graph.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_from_cli_spellings() {
        assert_eq!("fail-open".parse::<MirrorPolicy>(), Ok(MirrorPolicy::FailOpen));
        assert_eq!("FAIL_CLOSED".parse::<MirrorPolicy>(), Ok(MirrorPolicy::FailClosed));
        assert!("sometimes".parse::<MirrorPolicy>().is_err());
        assert_eq!(MirrorPolicy::default(), MirrorPolicy::FailOpen);
    }
}
