use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use wayfare_shared::AppError;

/// Summary figure tracked across monthly windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendMetric {
    #[serde(rename = "retention_day_1")]
    RetentionDay1,
    #[serde(rename = "retention_day_7")]
    RetentionDay7,
    #[serde(rename = "retention_day_30")]
    RetentionDay30,
    #[serde(rename = "churn_rate")]
    ChurnRate,
    #[serde(rename = "total_users")]
    TotalUsers,
}

impl TrendMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendMetric::RetentionDay1 => "retention_day_1",
            TrendMetric::RetentionDay7 => "retention_day_7",
            TrendMetric::RetentionDay30 => "retention_day_30",
            TrendMetric::ChurnRate => "churn_rate",
            TrendMetric::TotalUsers => "total_users",
        }
    }
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retention_day_1" => Ok(TrendMetric::RetentionDay1),
            "retention_day_7" => Ok(TrendMetric::RetentionDay7),
            "retention_day_30" => Ok(TrendMetric::RetentionDay30),
            "churn_rate" => Ok(TrendMetric::ChurnRate),
            "total_users" => Ok(TrendMetric::TotalUsers),
            other => Err(AppError::invalid_format(format!("unknown trend metric: {}", other))
                .with_detail("metric", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub window_start: NaiveDate,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        for metric in [
            TrendMetric::RetentionDay1,
            TrendMetric::RetentionDay7,
            TrendMetric::RetentionDay30,
            TrendMetric::ChurnRate,
            TrendMetric::TotalUsers,
        ] {
            assert_eq!(metric.as_str().parse::<TrendMetric>().unwrap(), metric);
            assert_eq!(serde_json::to_value(metric).unwrap(), serde_json::json!(metric.as_str()));
        }
        assert!("weekly_active".parse::<TrendMetric>().is_err());
    }
}
