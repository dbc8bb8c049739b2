//! 執行計劃與時間單元模型

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BomId, OrderId, ProcessStage};

/// 執行計劃識別碼（本次排程內遞增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u32);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EP#{}", self.0)
    }
}

/// 時間單元識別碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeUnitId(pub u32);

impl fmt::Display for TimeUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TU#{}", self.0)
    }
}

/// 執行計劃（排程的最小單位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// 計劃ID
    pub id: PlanId,

    /// 上層物料（此計劃服務的 BOM 根）
    pub parent_item: Option<String>,

    /// 生產物料
    pub item: String,

    /// 物料所屬製程階段
    pub stage: ProcessStage,

    /// 生產數量
    pub quantity: Decimal,

    /// 指派機台
    pub machine: Option<String>,

    /// 機台佇列中的位置（從 1 開始）
    pub position: Option<u32>,

    /// 開始時間
    pub start_time: Option<NaiveDateTime>,

    /// 完工時間
    pub completion_time: Option<NaiveDateTime>,

    /// 所屬生產訂單
    pub order: OrderId,

    /// 來源 BOM（僅排程過程使用，不持久化）
    #[serde(skip)]
    pub bom: Option<BomId>,
}

impl ExecutionPlan {
    /// 創建新的執行計劃
    pub fn new(id: PlanId, item: impl Into<String>, stage: ProcessStage, quantity: Decimal, order: OrderId) -> Self {
        Self {
            id,
            parent_item: None,
            item: item.into(),
            stage,
            quantity,
            machine: None,
            position: None,
            start_time: None,
            completion_time: None,
            order,
            bom: None,
        }
    }

    /// 建構器模式：設置上層物料
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_item = Some(parent.into());
        self
    }

    /// 建構器模式：設置來源 BOM
    pub fn with_bom(mut self, bom: BomId) -> Self {
        self.bom = Some(bom);
        self
    }

    /// 指派機台與位置
    pub fn assign(&mut self, machine: impl Into<String>, position: u32) {
        self.machine = Some(machine.into());
        self.position = Some(position);
    }

    /// 設置時間
    pub fn set_times(&mut self, start: NaiveDateTime, completion: NaiveDateTime) {
        self.start_time = Some(start);
        self.completion_time = Some(completion);
    }

    /// 是否已排定時間
    pub fn is_scheduled(&self) -> bool {
        self.start_time.is_some() && self.completion_time.is_some()
    }
}

/// 時間單元：同機台同時段的一批執行計劃（第二階段輸出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeUnit {
    /// 時間單元ID
    pub id: TimeUnitId,

    /// 機台代碼
    pub machine: String,

    /// 批內執行計劃（依位置排序）
    pub plans: Vec<PlanId>,

    /// 開始時間
    pub start_time: Option<NaiveDateTime>,

    /// 完工時間（批內最長者）
    pub completion_time: Option<NaiveDateTime>,
}

impl TimeUnit {
    /// 創建新的時間單元
    pub fn new(id: TimeUnitId, machine: impl Into<String>, plans: Vec<PlanId>) -> Self {
        Self {
            id,
            machine: machine.into(),
            plans,
            start_time: None,
            completion_time: None,
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_create_plan() {
        let plan = ExecutionPlan::new(PlanId(7), "STRAND", ProcessStage::Tref, Decimal::from(40), OrderId(1))
            .with_parent("CABLE")
            .with_bom(BomId(3));

        assert_eq!(plan.parent_item.as_deref(), Some("CABLE"));
        assert_eq!(plan.bom, Some(BomId(3)));
        assert!(!plan.is_scheduled());
        assert_eq!(plan.id.to_string(), "EP#7");
    }

    #[test]
    fn test_assign_and_times() {
        let mut plan = ExecutionPlan::new(PlanId(1), "ROD-8", ProcessStage::Rod, Decimal::ONE, OrderId(1));
        let start = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap().and_hms_opt(8, 0, 0).unwrap();

        plan.assign("R01", 2);
        plan.set_times(start, start + chrono::Duration::minutes(30));

        assert_eq!(plan.machine.as_deref(), Some("R01"));
        assert_eq!(plan.position, Some(2));
        assert!(plan.is_scheduled());
    }

    #[test]
    fn test_bom_not_serialized() {
        let plan = ExecutionPlan::new(PlanId(1), "A", ProcessStage::Rod, Decimal::ONE, OrderId(1))
            .with_bom(BomId(9));
        let json = serde_json::to_string(&plan).unwrap();
        assert!(!json.contains("bom"));
    }
}
