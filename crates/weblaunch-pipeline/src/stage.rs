//! Pipeline stages, their progress weights and failure policies

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weblaunch_core::StageTimeouts;

/// One step of the toolchain pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resources,
    Compile,
    Dex,
    Package,
    Sign,
    Align,
    Bundle,
}

/// What a stage failure does to the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The job fails
    Fatal,
    /// The job continues with the previous stage's output
    Degrade,
    /// The job succeeds without this stage's artifact
    Optional,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Resources,
        Stage::Compile,
        Stage::Dex,
        Stage::Package,
        Stage::Sign,
        Stage::Align,
        Stage::Bundle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Compile => "compile",
            Self::Dex => "dex",
            Self::Package => "package",
            Self::Sign => "sign",
            Self::Align => "align",
            Self::Bundle => "bundle",
        }
    }

    /// Share of the overall progress bar; all weights sum to 100
    pub fn weight(&self) -> u8 {
        match self {
            Self::Resources => 10,
            Self::Compile => 25,
            Self::Dex => 10,
            Self::Package => 15,
            Self::Sign => 15,
            Self::Align => 5,
            Self::Bundle => 20,
        }
    }

    /// Percentage reported when the stage starts
    pub fn entry_percent(&self) -> u8 {
        Self::ALL
            .iter()
            .take_while(|s| *s != self)
            .map(|s| s.weight())
            .sum()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Self::Align => FailurePolicy::Degrade,
            Self::Bundle => FailurePolicy::Optional,
            _ => FailurePolicy::Fatal,
        }
    }

    pub fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        match self {
            Self::Resources => timeouts.resources,
            Self::Compile => timeouts.compile,
            Self::Dex => timeouts.dex,
            Self::Package => timeouts.package,
            Self::Sign => timeouts.sign,
            Self::Align => timeouts.align,
            Self::Bundle => timeouts.bundle,
        }
    }

    /// Message published when the stage starts
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Resources => "Compiling resources",
            Self::Compile => "Compiling sources",
            Self::Dex => "Converting bytecode",
            Self::Package => "Packaging application",
            Self::Sign => "Signing package",
            Self::Align => "Aligning package",
            Self::Bundle => "Building app bundle",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = Stage::ALL.iter().map(|s| s.weight() as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_entry_anchors() {
        let anchors: Vec<u8> = Stage::ALL.iter().map(|s| s.entry_percent()).collect();
        assert_eq!(anchors, vec![0, 10, 35, 45, 60, 75, 80]);
    }

    #[test]
    fn test_failure_policies() {
        assert_eq!(Stage::Sign.failure_policy(), FailurePolicy::Fatal);
        assert_eq!(Stage::Align.failure_policy(), FailurePolicy::Degrade);
        assert_eq!(Stage::Bundle.failure_policy(), FailurePolicy::Optional);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Stage::Dex).unwrap(), "\"dex\"");
        assert_eq!(Stage::Bundle.to_string(), "bundle");
    }
}
