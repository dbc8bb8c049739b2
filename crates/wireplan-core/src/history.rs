//! 已提交排程歷史（用於推算各機台可開工時間）

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 已提交的執行計劃
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedPlan {
    /// 機台代碼
    pub machine: String,

    /// 物料名稱
    pub item: String,

    /// 完工時間
    pub completion_time: NaiveDateTime,
}

/// 已提交的時間單元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedTimeUnit {
    /// 機台代碼
    pub machine: String,

    /// 完工時間
    pub completion_time: NaiveDateTime,
}

/// 機台歷史：每台機台最後一筆已提交計劃與時間單元
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineHistory {
    last_plans: HashMap<String, CommittedPlan>,
    last_time_units: HashMap<String, NaiveDateTime>,
}

impl MachineHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從歷史紀錄建立（每台機台只保留最晚完工者）
    pub fn from_records(plans: Vec<CommittedPlan>, time_units: Vec<CommittedTimeUnit>) -> Self {
        let mut history = Self::new();
        for plan in plans {
            history.record_plan(plan);
        }
        for tu in time_units {
            history.record_time_unit(tu);
        }
        history
    }

    /// 記錄已提交計劃
    pub fn record_plan(&mut self, plan: CommittedPlan) {
        match self.last_plans.get(&plan.machine) {
            Some(existing) if existing.completion_time >= plan.completion_time => {}
            _ => {
                self.last_plans.insert(plan.machine.clone(), plan);
            }
        }
    }

    /// 記錄已提交時間單元
    pub fn record_time_unit(&mut self, tu: CommittedTimeUnit) {
        let entry = self
            .last_time_units
            .entry(tu.machine)
            .or_insert(tu.completion_time);
        if tu.completion_time > *entry {
            *entry = tu.completion_time;
        }
    }

    /// 機台最後一筆已提交計劃
    pub fn last_plan(&self, machine: &str) -> Option<&CommittedPlan> {
        self.last_plans.get(machine)
    }

    /// 機台最後一個時間單元的完工時間
    pub fn last_time_unit_completion(&self, machine: &str) -> Option<NaiveDateTime> {
        self.last_time_units.get(machine).copied()
    }
}
