//! # Wireplan Core
//!
//! 核心資料模型與類型定義（參考資料、排程輸出、規劃上下文）

pub mod bom;
pub mod calendar;
pub mod cancel;
pub mod config;
pub mod context;
pub mod history;
pub mod inventory;
pub mod item;
pub mod machine;
pub mod order;
pub mod plan;
pub mod plant;
pub mod routing;
pub mod setup;
pub mod source;

// Re-export 主要類型
pub use bom::{BillOfMaterials, BomId, BomLine};
pub use calendar::ShiftCalendar;
pub use cancel::{CancelRegistry, CancellationToken, Checkpoint};
pub use config::{
    AnnealingConfig, CandidateSelection, Criteria, RodConfig, SchedulerConfig, TrefConfig,
};
pub use context::{PlanningContext, PlantVariant};
pub use history::{CommittedPlan, CommittedTimeUnit, MachineHistory};
pub use inventory::{Stock, StockLedger};
pub use item::{Item, ProcessStage};
pub use machine::{Machine, MachineAvailability};
pub use order::{OrderId, ProductionOrder};
pub use plan::{ExecutionPlan, PlanId, TimeUnit, TimeUnitId};
pub use plant::PlantData;
pub use routing::{Routing, RoutingTable};
pub use setup::{SetupTime, SetupTimeTable};
pub use source::{
    HistoryRepository, InMemoryHistory, InMemoryPlantRepository, PlantRepository, ScheduleOutput,
};

/// 排程錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("排程已被使用者中止")]
    Cancelled,

    #[error("找不到物料: {0}")]
    ItemNotFound(String),

    #[error("找不到機台: {0}")]
    MachineNotFound(String),

    #[error("物料 {item} 在機台 {machine} 上沒有途程")]
    RoutingMissing { item: String, machine: String },

    #[error("找不到生產訂單: {0}")]
    OrderNotFound(OrderId),

    #[error("找不到執行計劃: {0}")]
    PlanNotFound(PlanId),

    #[error("BOM 結構存在循環: {0}")]
    BomCycle(String),

    #[error("無效的配置: {0}")]
    InvalidConfig(String),

    #[error("求解器錯誤: {0}")]
    Solver(String),

    #[error("排程結果違反不變量: {0}")]
    InvariantViolation(String),

    #[error("執行緒池已滿，無法接受新的排程")]
    PoolSaturated,

    #[error("使用者 {0} 已有排程執行中")]
    RunAlreadyActive(String),

    #[error("資料存取失敗: {0}")]
    DataAccess(#[from] anyhow::Error),
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
