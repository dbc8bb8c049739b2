//! 測試用共用資料

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use wireplan_core::{Criteria, PlanningContext, PlantData};

/// 2025-10-06（週一）的指定時間
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// 排程基準時間 2025-10-06 09:00
pub fn now() -> NaiveDateTime {
    at(6, 9, 0)
}

pub fn context(plant: PlantData, criteria: Criteria) -> PlanningContext {
    PlanningContext::new(Arc::new(plant), criteria, now())
}
