//! 換線（材質切換）時間表

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 材質切換時間
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupTime {
    /// 前一材質
    pub from_material: String,

    /// 下一材質
    pub to_material: String,

    /// 換線時數
    pub hours: Decimal,
}

impl SetupTime {
    pub fn new(from: impl Into<String>, to: impl Into<String>, hours: Decimal) -> Self {
        Self {
            from_material: from.into(),
            to_material: to.into(),
            hours,
        }
    }
}

/// 換線時間表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SetupTime>", into = "Vec<SetupTime>")]
pub struct SetupTimeTable {
    entries: HashMap<(String, String), Decimal>,
}

impl SetupTimeTable {
    pub fn new(entries: Vec<SetupTime>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| ((e.from_material, e.to_material), e.hours))
                .collect(),
        }
    }

    /// 換線時數；材質相同或無設定時為 0
    pub fn hours(&self, from: &str, to: &str) -> f64 {
        if from == to {
            return 0.0;
        }
        self.entries
            .get(&(from.to_string(), to.to_string()))
            .and_then(|h| h.to_f64())
            .unwrap_or(0.0)
    }

    /// 換線分鐘數；前一材質未知時不計換線
    pub fn minutes_between(&self, from: Option<&str>, to: &str) -> f64 {
        from.map(|f| self.hours(f, to) * 60.0).unwrap_or(0.0)
    }
}

impl From<Vec<SetupTime>> for SetupTimeTable {
    fn from(entries: Vec<SetupTime>) -> Self {
        Self::new(entries)
    }
}

impl From<SetupTimeTable> for Vec<SetupTime> {
    fn from(table: SetupTimeTable) -> Self {
        let mut entries: Vec<SetupTime> = table
            .entries
            .into_iter()
            .map(|((from, to), hours)| SetupTime::new(from, to, hours))
            .collect();
        entries.sort_by(|a, b| {
            (a.from_material.as_str(), a.to_material.as_str())
                .cmp(&(b.from_material.as_str(), b.to_material.as_str()))
        });
        entries
    }
}
