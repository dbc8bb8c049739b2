//! # Wireplan Optimizer
//!
//! 優化算法模組（產能、排程、約束求解）

pub mod capacity;
pub mod combination;
pub mod constraint;
pub mod scheduling;
pub mod timing;

// Re-export 主要類型
pub use capacity::CapacityPlanner;
pub use combination::Combinations;
pub use constraint::{AllowedPair, BinPackingSolver, MilpBinPacker, PackingAssignment, PackingProblem};
pub use scheduling::{RunOutcome, RunSummary, Scheduler};

use wireplan_core::ProcessStage;

/// 單一階段的優化結果
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// 製程階段
    pub stage: ProcessStage,

    /// 已排程的執行計劃數量
    pub scheduled: usize,

    /// 未被選用而移除的執行計劃數量
    pub discarded: usize,

    /// 優化信息
    pub messages: Vec<String>,
}

impl StageOutcome {
    /// 創建階段結果
    pub fn new(stage: ProcessStage, scheduled: usize, discarded: usize) -> Self {
        Self {
            stage,
            scheduled,
            discarded,
            messages: Vec::new(),
        }
    }

    /// 該階段沒有任何計劃
    pub fn skipped(stage: ProcessStage) -> Self {
        Self::new(stage, 0, 0).with_message(format!("{} 階段沒有執行計劃", stage.code()))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}
