use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use docflow_core::{OrchestratorError, TierSettings};

/// 作业层级
///
/// premium/normal按用户套餐划分，large按文件大小隔离，
/// 避免大文件作业拖垮其他层级的吞吐。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierName {
    #[serde(rename = "premium")]
    Premium,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "large")]
    Large,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Premium => "premium",
            TierName::Normal => "normal",
            TierName::Large => "large",
        }
    }

    pub fn all() -> [TierName; 3] {
        [TierName::Premium, TierName::Normal, TierName::Large]
    }

    /// 该层级在队列代理上的队列名
    pub fn queue_name(&self) -> String {
        format!("docflow.jobs.{}", self.as_str())
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierName {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium" => Ok(TierName::Premium),
            "normal" => Ok(TierName::Normal),
            "large" => Ok(TierName::Large),
            _ => Err(OrchestratorError::Configuration(format!(
                "未知的层级名称: {s}"
            ))),
        }
    }
}

/// 层级静态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: TierName,
    pub priority_weight: u32,
    pub concurrency_limit: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

impl TierConfig {
    pub fn from_settings(name: TierName, settings: &TierSettings) -> Self {
        Self {
            name,
            priority_weight: settings.priority_weight,
            concurrency_limit: settings.concurrency_limit,
            min_workers: settings.min_workers,
            max_workers: settings.max_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_name_round_trip() {
        for tier in TierName::all() {
            let parsed: TierName = tier.as_str().parse().expect("parse tier");
            assert_eq!(parsed, tier);
        }
        assert!("gold".parse::<TierName>().is_err());
    }

    #[test]
    fn test_queue_names_are_distinct() {
        assert_eq!(TierName::Premium.queue_name(), "docflow.jobs.premium");
        assert_ne!(
            TierName::Normal.queue_name(),
            TierName::Large.queue_name()
        );
    }
}
