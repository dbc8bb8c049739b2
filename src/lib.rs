//! # Wireplan
//!
//! 線材廠三階段排程引擎（拉線、絞線、撚線）
//!
//! 對外提供工廠參考資料快取、有上限的排程執行緒池與日誌初始化；
//! 排程演算法本身位於 `wireplan-optimizer`。

pub mod catalog;
pub mod logging;
pub mod pool;

pub use catalog::PlantCatalog;
pub use pool::{RunPool, RunRequest, RunStatus, RunTicket};

pub use wireplan_calc::{DemandRow, ExpansionReport, OrderIntake};
pub use wireplan_core::{
    CancellationToken, Criteria, PlanError, PlanningContext, PlantData, PlantVariant, Result, ScheduleOutput,
    SchedulerConfig,
};
pub use wireplan_optimizer::{RunOutcome, RunSummary, Scheduler};
