//! 訂單受理與庫存沖銷

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wireplan_core::{OrderId, PlanningContext};

use crate::ExpansionReport;

/// 需求列（外部輸入的一筆訂單需求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRow {
    /// 產品物料名稱
    pub item: String,

    /// 需求數量
    pub quantity: Decimal,

    /// 交期
    pub due_date: NaiveDateTime,

    /// 權重/優先級
    pub weight: u32,
}

impl DemandRow {
    pub fn new(item: impl Into<String>, quantity: Decimal, due_date: NaiveDateTime) -> Self {
        Self {
            item: item.into(),
            quantity,
            due_date,
            weight: 1,
        }
    }

    /// 建構器模式：設置權重
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// 訂單受理器
pub struct OrderIntake;

impl OrderIntake {
    /// 受理需求列，建立生產訂單
    ///
    /// 啟用庫存扣用時，先以本次排程的庫存複本沖銷需求；
    /// 需求完全被庫存滿足的列不建立訂單。
    pub fn register(ctx: &mut PlanningContext, rows: Vec<DemandRow>) -> (Vec<OrderId>, ExpansionReport) {
        let mut report = ExpansionReport::empty();
        let mut created = Vec::with_capacity(rows.len());
        let consume_stock = ctx.criteria().consume_stock;

        for row in rows {
            let quantity = if consume_stock {
                ctx.stock_mut().net_requirement(&row.item, row.quantity)
            } else {
                row.quantity
            };

            if quantity <= Decimal::ZERO {
                tracing::debug!("需求 {} 數量 {} 已由庫存滿足", row.item, row.quantity);
                report.covered_by_stock.push(row.item);
                continue;
            }

            created.push(ctx.add_order(row.item, quantity, row.due_date, row.weight));
        }

        tracing::info!(
            "受理需求：建立訂單 {} 筆，庫存滿足 {} 筆",
            created.len(),
            report.covered_by_stock.len()
        );
        (created, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use wireplan_core::{Criteria, PlantData, Stock};

    fn due() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn plant() -> Arc<PlantData> {
        Arc::new(PlantData::new("P1").with_stock(vec![Stock::new("CABLE", Decimal::from(150))]))
    }

    #[test]
    fn test_register_without_stock() {
        let mut ctx = PlanningContext::new(plant(), Criteria::new(), due());
        let (orders, report) = OrderIntake::register(
            &mut ctx,
            vec![DemandRow::new("CABLE", Decimal::from(100), due()).with_weight(2)],
        );

        assert_eq!(orders.len(), 1);
        let order = ctx.order(orders[0]).unwrap();
        assert_eq!(order.quantity, Decimal::from(100));
        assert_eq!(order.weight, 2);
        assert!(report.covered_by_stock.is_empty());
    }

    #[test]
    fn test_register_consumes_stock() {
        let criteria = Criteria::new().with_consume_stock(true);
        let mut ctx = PlanningContext::new(plant(), criteria, due());
        let (orders, report) = OrderIntake::register(
            &mut ctx,
            vec![
                DemandRow::new("CABLE", Decimal::from(100), due()),
                DemandRow::new("CABLE", Decimal::from(100), due()),
            ],
        );

        // 第一筆完全由庫存滿足，第二筆只剩 50
        assert_eq!(orders.len(), 1);
        assert_eq!(ctx.order(orders[0]).unwrap().quantity, Decimal::from(50));
        assert_eq!(report.covered_by_stock, vec!["CABLE".to_string()]);
    }
}
