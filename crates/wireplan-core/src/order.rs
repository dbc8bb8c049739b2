//! 生產訂單模型

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 生產訂單識別碼（本次排程內遞增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u32);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PO#{}", self.0)
    }
}

/// 生產訂單
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    /// 訂單ID
    pub id: OrderId,

    /// 產品物料名稱
    pub item: String,

    /// 生產數量
    pub quantity: Decimal,

    /// 交期
    pub due_date: NaiveDateTime,

    /// 權重/優先級
    pub weight: u32,

    /// 完工時間（所屬執行計劃的最大完工時間）
    pub completion_time: Option<NaiveDateTime>,
}

impl ProductionOrder {
    /// 創建新的生產訂單
    pub fn new(id: OrderId, item: impl Into<String>, quantity: Decimal, due_date: NaiveDateTime) -> Self {
        Self {
            id,
            item: item.into(),
            quantity,
            due_date,
            weight: 1,
            completion_time: None,
        }
    }

    /// 建構器模式：設置權重
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// 延遲分鐘數（未完工或準時為 0）
    pub fn tardiness_minutes(&self) -> i64 {
        self.completion_time
            .map(|cot| (cot - self.due_date).num_minutes().max(0))
            .unwrap_or(0)
    }

    /// 是否逾期
    pub fn is_late(&self) -> bool {
        self.completion_time
            .map(|cot| cot > self.due_date)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_create_order() {
        let order = ProductionOrder::new(OrderId(1), "CABLE-3x2.5", Decimal::from(500), at(20, 8))
            .with_weight(3);

        assert_eq!(order.id.to_string(), "PO#1");
        assert_eq!(order.weight, 3);
        assert!(!order.is_late());
        assert_eq!(order.tardiness_minutes(), 0);
    }

    #[test]
    fn test_tardiness() {
        let mut order = ProductionOrder::new(OrderId(2), "CABLE", Decimal::ONE, at(20, 8));

        order.completion_time = Some(at(20, 10));
        assert!(order.is_late());
        assert_eq!(order.tardiness_minutes(), 120);

        // 提前完工不產生負延遲
        order.completion_time = Some(at(19, 8));
        assert_eq!(order.tardiness_minutes(), 0);
    }
}
