//! 外部協作介面：參考資料讀取、歷史讀寫、排程輸出

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{
    CommittedPlan, CommittedTimeUnit, ExecutionPlan, MachineHistory, OrderId, PlanningContext,
    PlantData, TimeUnit,
};

/// 工廠參考資料來源
pub trait PlantRepository: Send + Sync {
    /// 讀取指定工廠的參考資料
    fn load_plant(&self, plant_id: &str) -> anyhow::Result<PlantData>;
}

/// 已提交排程的讀寫
pub trait HistoryRepository: Send + Sync {
    /// 讀取機台歷史
    fn load_history(&self, plant_id: &str) -> anyhow::Result<MachineHistory>;

    /// 寫入完成的排程
    fn append(&self, plant_id: &str, output: &ScheduleOutput) -> anyhow::Result<()>;
}

/// 排程輸出（交付持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutput {
    /// 排程ID
    pub run_id: Uuid,

    /// 執行計劃
    pub plans: Vec<ExecutionPlan>,

    /// 時間單元
    pub time_units: Vec<TimeUnit>,

    /// 各生產訂單完工時間
    pub order_completions: Vec<(OrderId, Option<NaiveDateTime>)>,

    /// 逾期產品名稱
    pub late_products: Vec<String>,
}

impl ScheduleOutput {
    /// 從完成的上下文建立
    pub fn from_context(ctx: &PlanningContext) -> Self {
        Self {
            run_id: ctx.run_id,
            plans: ctx.plans().cloned().collect(),
            time_units: ctx.time_units().cloned().collect(),
            order_completions: ctx.orders().map(|o| (o.id, o.completion_time)).collect(),
            late_products: ctx.late_products(),
        }
    }

    /// 轉為已提交歷史紀錄
    pub fn committed_records(&self) -> (Vec<CommittedPlan>, Vec<CommittedTimeUnit>) {
        let plans = self
            .plans
            .iter()
            .filter_map(|p| match (&p.machine, p.completion_time) {
                (Some(machine), Some(cot)) => Some(CommittedPlan {
                    machine: machine.clone(),
                    item: p.item.clone(),
                    completion_time: cot,
                }),
                _ => None,
            })
            .collect();
        let time_units = self
            .time_units
            .iter()
            .filter_map(|tu| {
                tu.completion_time.map(|cot| CommittedTimeUnit {
                    machine: tu.machine.clone(),
                    completion_time: cot,
                })
            })
            .collect();
        (plans, time_units)
    }
}

/// 記憶體內的工廠資料來源
#[derive(Debug, Default)]
pub struct InMemoryPlantRepository {
    plants: RwLock<HashMap<String, PlantData>>,
}

impl InMemoryPlantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：加入工廠
    pub fn with_plant(self, plant: PlantData) -> Self {
        if let Ok(mut plants) = self.plants.write() {
            plants.insert(plant.plant_id.clone(), plant);
        }
        self
    }
}

impl PlantRepository for InMemoryPlantRepository {
    fn load_plant(&self, plant_id: &str) -> anyhow::Result<PlantData> {
        let plants = self
            .plants
            .read()
            .map_err(|_| anyhow::anyhow!("工廠資料鎖已損壞"))?;
        plants
            .get(plant_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("找不到工廠: {plant_id}"))
    }
}

/// 記憶體內的排程歷史
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: RwLock<HashMap<String, (Vec<CommittedPlan>, Vec<CommittedTimeUnit>)>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交計劃數
    pub fn committed_plan_count(&self, plant_id: &str) -> usize {
        self.records
            .read()
            .ok()
            .and_then(|r| r.get(plant_id).map(|(plans, _)| plans.len()))
            .unwrap_or(0)
    }
}

impl HistoryRepository for InMemoryHistory {
    fn load_history(&self, plant_id: &str) -> anyhow::Result<MachineHistory> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("歷史資料鎖已損壞"))?;
        Ok(records
            .get(plant_id)
            .map(|(plans, tus)| MachineHistory::from_records(plans.clone(), tus.clone()))
            .unwrap_or_default())
    }

    fn append(&self, plant_id: &str, output: &ScheduleOutput) -> anyhow::Result<()> {
        let (plans, tus) = output.committed_records();
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("歷史資料鎖已損壞"))?;
        let entry = records.entry(plant_id.to_string()).or_default();
        entry.0.extend(plans);
        entry.1.extend(tus);
        Ok(())
    }
}
