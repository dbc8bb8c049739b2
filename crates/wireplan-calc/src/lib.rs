//! # Wireplan Calculation
//!
//! 訂單受理、庫存沖銷、BOM 相依展開

pub mod exclusion;
pub mod expansion;
pub mod lot_sizing;
pub mod netting;

// Re-export 主要類型
pub use exclusion::BomExclusion;
pub use expansion::DependencyExpander;
pub use lot_sizing::IncrementSplitter;
pub use netting::{DemandRow, OrderIntake};

/// 展開結果報告
#[derive(Debug, Clone, Default)]
pub struct ExpansionReport {
    /// 建立的執行計劃數量
    pub plans_created: usize,

    /// 因停用組合移除的執行計劃數量
    pub plans_excluded: usize,

    /// 因庫存足夠而未建立的訂單
    pub covered_by_stock: Vec<String>,

    /// 警告信息（無途程、無 BOM）
    pub warnings: Vec<ExpansionWarning>,
}

impl ExpansionReport {
    /// 創建空的報告
    pub fn empty() -> Self {
        Self::default()
    }

    /// 添加警告（同物料同類型只記一次）
    pub fn add_warning(&mut self, warning: ExpansionWarning) {
        let duplicate = self
            .warnings
            .iter()
            .any(|w| w.item == warning.item && w.kind == warning.kind);
        if !duplicate {
            self.warnings.push(warning);
        }
    }

    /// 無可用途程的物料
    pub fn no_routing(&self) -> Vec<&str> {
        self.items_of(WarningKind::NoRouting)
    }

    /// 無 BOM 的物料
    pub fn no_bom(&self) -> Vec<&str> {
        self.items_of(WarningKind::NoBom)
    }

    fn items_of(&self, kind: WarningKind) -> Vec<&str> {
        self.warnings
            .iter()
            .filter(|w| w.kind == kind)
            .map(|w| w.item.as_str())
            .collect()
    }

    /// 合併另一份報告
    pub fn merge(&mut self, other: ExpansionReport) {
        self.plans_created += other.plans_created;
        self.plans_excluded += other.plans_excluded;
        self.covered_by_stock.extend(other.covered_by_stock);
        for warning in other.warnings {
            self.add_warning(warning);
        }
    }
}

/// 展開警告類型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// 無可用途程
    NoRouting,
    /// 無 BOM
    NoBom,
}

/// 展開警告
#[derive(Debug, Clone)]
pub struct ExpansionWarning {
    pub item: String,
    pub kind: WarningKind,
    pub message: String,
    pub severity: WarningSeverity,
}

impl ExpansionWarning {
    pub fn no_routing(item: &str) -> Self {
        Self {
            item: item.to_string(),
            kind: WarningKind::NoRouting,
            message: format!("物料 {item} 在可用機台上沒有途程"),
            severity: WarningSeverity::Warning,
        }
    }

    pub fn no_bom(item: &str) -> Self {
        Self {
            item: item.to_string(),
            kind: WarningKind::NoBom,
            message: format!("物料 {item} 沒有 BOM"),
            severity: WarningSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}
