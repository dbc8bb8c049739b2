//! 物料清單（BOM）模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// BOM 識別碼（同一根物料可有多個版本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BomId(pub u32);

impl fmt::Display for BomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BOM#{}", self.0)
    }
}

/// BOM 明細行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLine {
    /// 子件物料名稱
    pub item: String,

    /// 重複行數（每行產生一個執行計劃）
    pub count: u32,

    /// 淨用量
    pub net_quantity: Decimal,
}

impl BomLine {
    /// 創建新的明細行
    pub fn new(item: impl Into<String>, count: u32, net_quantity: Decimal) -> Self {
        Self {
            item: item.into(),
            count,
            net_quantity,
        }
    }
}

/// 物料清單
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillOfMaterials {
    /// BOM 識別碼
    pub id: BomId,

    /// 根物料名稱
    pub root: String,

    /// 基準數量
    pub quantity: Decimal,

    /// 版本
    pub revision: Option<String>,

    /// 明細行（有序）
    pub lines: Vec<BomLine>,
}

impl BillOfMaterials {
    /// 創建新的 BOM
    pub fn new(id: u32, root: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            id: BomId(id),
            root: root.into(),
            quantity,
            revision: None,
            lines: Vec::new(),
        }
    }

    /// 建構器模式：設置版本
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// 建構器模式：添加明細行
    pub fn with_line(mut self, line: BomLine) -> Self {
        self.lines.push(line);
        self
    }

    /// 單位需求量：淨用量 × 訂單數量 / 基準數量
    pub fn production_quantity(&self, line: &BomLine, order_quantity: Decimal) -> Decimal {
        if self.quantity.is_zero() {
            return line.net_quantity * order_quantity;
        }
        line.net_quantity * order_quantity / self.quantity
    }

    /// 子件組合簽章（依明細順序展開重複行）
    pub fn signature(&self) -> Vec<String> {
        self.lines
            .iter()
            .flat_map(|line| std::iter::repeat(line.item.clone()).take(line.count as usize))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_quantity() {
        let bom = BillOfMaterials::new(1, "CABLE", Decimal::from(100))
            .with_line(BomLine::new("STRAND", 2, Decimal::from(50)));

        let line = &bom.lines[0];
        // 50 × 400 / 100 = 200
        assert_eq!(bom.production_quantity(line, Decimal::from(400)), Decimal::from(200));
    }

    #[test]
    fn test_zero_base_quantity() {
        let bom = BillOfMaterials::new(2, "CABLE", Decimal::ZERO)
            .with_line(BomLine::new("STRAND", 1, Decimal::from(3)));
        assert_eq!(bom.production_quantity(&bom.lines[0], Decimal::from(10)), Decimal::from(30));
    }

    #[test]
    fn test_signature_expands_counts() {
        let bom = BillOfMaterials::new(3, "CABLE", Decimal::ONE)
            .with_revision("B")
            .with_line(BomLine::new("A", 2, Decimal::ONE))
            .with_line(BomLine::new("B", 1, Decimal::ONE));
        assert_eq!(bom.signature(), vec!["A", "A", "B"]);
        assert_eq!(bom.id.to_string(), "BOM#3");
        assert_eq!(bom.revision.as_deref(), Some("B"));
    }
}
