//! 物料模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 製程階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessStage {
    /// 第一階段：拉線（Rod）
    #[serde(rename = "ROD")]
    Rod,
    /// 第二階段：絞線（Tref）
    #[serde(rename = "MDW")]
    Tref,
    /// 第三階段：撚線/束線（Torc）
    #[serde(rename = "BUN")]
    Torc,
}

impl ProcessStage {
    /// 從製程代碼解析
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "ROD" => Some(Self::Rod),
            "MDW" => Some(Self::Tref),
            "BUN" => Some(Self::Torc),
            _ => None,
        }
    }

    /// 製程代碼
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rod => "ROD",
            Self::Tref => "MDW",
            Self::Torc => "BUN",
        }
    }
}

/// 物料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// 物料名稱（工廠內唯一）
    pub name: String,

    /// 材質類型
    pub material_type: String,

    /// 單位
    pub unit: String,

    /// 投入倍數（絞線股數，裝箱重量）
    pub input: u32,

    /// 線徑
    pub diameter: Decimal,

    /// 製程階段
    pub process: ProcessStage,

    /// 訂購增量（0 表示不拆批）
    pub order_increment: Decimal,
}

impl Item {
    /// 創建新的物料
    pub fn new(name: impl Into<String>, material_type: impl Into<String>, process: ProcessStage) -> Self {
        Self {
            name: name.into(),
            material_type: material_type.into(),
            unit: "KG".to_string(),
            input: 1,
            diameter: Decimal::ZERO,
            process,
            order_increment: Decimal::ZERO,
        }
    }

    /// 建構器模式：設置單位
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// 建構器模式：設置投入倍數
    pub fn with_input(mut self, input: u32) -> Self {
        self.input = input;
        self
    }

    /// 建構器模式：設置線徑
    pub fn with_diameter(mut self, diameter: Decimal) -> Self {
        self.diameter = diameter;
        self
    }

    /// 建構器模式：設置訂購增量
    pub fn with_order_increment(mut self, increment: Decimal) -> Self {
        self.order_increment = increment;
        self
    }

    /// 線徑鍵（千分之一精度，用於同徑判斷）
    pub fn diameter_key(&self) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.diameter * Decimal::from(1000)).trunc().to_i64().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_stage_codes() {
        assert_eq!(ProcessStage::from_code("rod"), Some(ProcessStage::Rod));
        assert_eq!(ProcessStage::from_code("MDW"), Some(ProcessStage::Tref));
        assert_eq!(ProcessStage::from_code(" BUN "), Some(ProcessStage::Torc));
        assert_eq!(ProcessStage::from_code("XXX"), None);
        assert_eq!(ProcessStage::Tref.code(), "MDW");
    }

    #[test]
    fn test_item_builder() {
        let item = Item::new("CU-0.5", "CU", ProcessStage::Tref)
            .with_input(7)
            .with_diameter(Decimal::new(512, 3))
            .with_order_increment(Decimal::from(500));

        assert_eq!(item.input, 7);
        assert_eq!(item.diameter_key(), 512);
        assert_eq!(item.order_increment, Decimal::from(500));
        assert_eq!(item.unit, "KG");
        assert_eq!(item.with_unit("M").unit, "M");
    }

    #[test]
    fn test_stage_serde_uses_codes() {
        let json = serde_json::to_string(&ProcessStage::Torc).unwrap();
        assert_eq!(json, "\"BUN\"");
        let parsed: ProcessStage = serde_json::from_str("\"ROD\"").unwrap();
        assert_eq!(parsed, ProcessStage::Rod);
    }
}
