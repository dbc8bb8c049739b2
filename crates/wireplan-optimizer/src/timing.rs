//! 時間計算工具

use chrono::{Duration, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use wireplan_core::{PlanError, PlanId, PlanningContext, Result, ShiftCalendar};

/// 分鐘數（可含小數）轉為時間長度，精度到毫秒
pub fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

/// 兩個時間點相差的分鐘數
pub fn minutes_between(later: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// 延遲分鐘數：`max(完工 - 交期, 0)`
pub fn tardiness_minutes(completion: NaiveDateTime, due_date: NaiveDateTime) -> f64 {
    minutes_between(completion, due_date).max(0.0)
}

/// 提早完工分鐘數：`max(交期 - 完工, 0)`
pub fn earliness_minutes(completion: NaiveDateTime, due_date: NaiveDateTime) -> f64 {
    minutes_between(due_date, completion).max(0.0)
}

/// 計劃在機台上的加工分鐘數（週期時間 × 數量）
pub fn processing_minutes(ctx: &PlanningContext, machine: &str, plan: PlanId) -> Result<f64> {
    let plan = ctx.plan(plan)?;
    let cycle_time = ctx
        .plant()
        .routings()
        .cycle_time(machine, &plan.item)
        .ok_or_else(|| PlanError::RoutingMissing {
            item: plan.item.clone(),
            machine: machine.to_string(),
        })?;
    Ok((cycle_time * plan.quantity).to_f64().unwrap_or(0.0))
}

/// 機台起始狀態：上一筆已承諾計劃的材質與可開工時間
#[derive(Debug, Clone, PartialEq)]
pub struct MachineStart {
    pub last_item: Option<String>,
    pub last_material: Option<String>,
    pub start: NaiveDateTime,
}

impl MachineStart {
    /// 以執行計劃歷史推算（第一、三階段）
    pub fn from_plan_history(ctx: &PlanningContext, calendar: &ShiftCalendar, machine: &str) -> Self {
        let last = ctx.history().last_plan(machine);
        let last_item = last.map(|p| p.item.clone());
        let last_material = last_item
            .as_deref()
            .and_then(|item| ctx.plant().material_of(item))
            .map(str::to_string);
        Self {
            last_item,
            last_material,
            start: calendar.machine_start(last.map(|p| p.completion_time), ctx.current_time),
        }
    }
}

/// 單筆計劃的排程結果
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTiming {
    pub plan: PlanId,
    pub machine: String,
    pub position: u32,
    pub start: NaiveDateTime,
    pub completion: NaiveDateTime,
}

/// 將排程結果寫回執行計劃
pub fn apply_timings(ctx: &mut PlanningContext, timings: &[PlanTiming]) -> Result<()> {
    for timing in timings {
        let plan = ctx.plan_mut(timing.plan)?;
        plan.assign(timing.machine.clone(), timing.position);
        plan.set_times(timing.start, timing.completion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 6)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[rstest]
    #[case(30.0, 1_800_000)]
    #[case(0.5, 30_000)]
    #[case(1.25, 75_000)]
    fn test_minutes(#[case] value: f64, #[case] millis: i64) {
        assert_eq!(minutes(value), Duration::milliseconds(millis));
    }

    #[test]
    fn test_tardiness_and_earliness() {
        assert_eq!(tardiness_minutes(at(10, 30), at(10, 0)), 30.0);
        assert_eq!(tardiness_minutes(at(9, 0), at(10, 0)), 0.0);
        assert_eq!(earliness_minutes(at(9, 0), at(10, 0)), 60.0);
        assert_eq!(earliness_minutes(at(11, 0), at(10, 0)), 0.0);
    }
}
