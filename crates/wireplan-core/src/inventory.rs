//! 庫存模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 庫存狀態
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    /// 物料名稱
    pub item: String,

    /// 現有庫存
    pub on_hand_qty: Decimal,

    /// 已分配數量（本次排程已扣用）
    pub allocated_qty: Decimal,
}

impl Stock {
    /// 創建新的庫存記錄
    pub fn new(item: impl Into<String>, on_hand_qty: Decimal) -> Self {
        Self {
            item: item.into(),
            on_hand_qty,
            allocated_qty: Decimal::ZERO,
        }
    }

    /// 可用庫存（現有 - 已分配）
    pub fn available_qty(&self) -> Decimal {
        (self.on_hand_qty - self.allocated_qty).max(Decimal::ZERO)
    }

    /// 扣用庫存，回傳仍需生產的數量
    pub fn consume(&mut self, required: Decimal) -> Decimal {
        let used = required.min(self.available_qty());
        self.allocated_qty += used;
        required - used
    }
}

/// 庫存帳（每次排程一份複本）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockLedger {
    stocks: HashMap<String, Stock>,
}

impl StockLedger {
    /// 從庫存清單建立（同物料數量合併）
    pub fn new(stocks: impl IntoIterator<Item = Stock>) -> Self {
        let mut ledger = Self::default();
        for stock in stocks {
            ledger
                .stocks
                .entry(stock.item.clone())
                .and_modify(|s| s.on_hand_qty += stock.on_hand_qty)
                .or_insert(stock);
        }
        ledger
    }

    /// 物料可用庫存
    pub fn available(&self, item: &str) -> Decimal {
        self.stocks
            .get(item)
            .map(Stock::available_qty)
            .unwrap_or(Decimal::ZERO)
    }

    /// 以庫存抵扣需求，回傳淨需求
    pub fn net_requirement(&mut self, item: &str, required: Decimal) -> Decimal {
        match self.stocks.get_mut(item) {
            Some(stock) => stock.consume(required),
            None => required,
        }
    }
}
