//! 規劃上下文：單次排程的可變資料集
//!
//! 參考資料以 `Arc<PlantData>` 共享唯讀；排程輸出（生產訂單、執行計劃、
//! 時間單元）存放在本次排程專屬的表中，以遞增索引互相引用。

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    BomId, Criteria, ExecutionPlan, Item, Machine, MachineAvailability, MachineHistory, OrderId,
    PlanError, PlanId, PlantData, ProcessStage, ProductionOrder, Result, StockLedger, TimeUnit,
    TimeUnitId,
};

/// 工廠變體
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlantVariant {
    /// 相依模式：第二階段批次需等待第一階段供料
    Dependent,
    /// 簡單模式：第二階段依機台循序排程
    Simple,
}

/// 規劃上下文
#[derive(Debug, Clone)]
pub struct PlanningContext {
    /// 本次排程ID
    pub run_id: Uuid,

    /// 排程基準時間（現在）
    pub current_time: NaiveDateTime,

    plant: Arc<PlantData>,
    criteria: Criteria,
    availability: MachineAvailability,
    history: MachineHistory,
    stock: StockLedger,

    orders: BTreeMap<OrderId, ProductionOrder>,
    plans: BTreeMap<PlanId, ExecutionPlan>,
    time_units: BTreeMap<TimeUnitId, TimeUnit>,
    expanded: BTreeSet<OrderId>,

    next_order: u32,
    next_plan: u32,
    next_time_unit: u32,
}

impl PlanningContext {
    /// 創建新的規劃上下文
    pub fn new(plant: Arc<PlantData>, criteria: Criteria, current_time: NaiveDateTime) -> Self {
        let availability = MachineAvailability::new(criteria.deactivated_machines.iter().cloned());
        let stock = StockLedger::new(plant.stock().iter().cloned());
        Self {
            run_id: Uuid::new_v4(),
            current_time,
            plant,
            criteria,
            availability,
            history: MachineHistory::default(),
            stock,
            orders: BTreeMap::new(),
            plans: BTreeMap::new(),
            time_units: BTreeMap::new(),
            expanded: BTreeSet::new(),
            next_order: 1,
            next_plan: 1,
            next_time_unit: 1,
        }
    }

    /// 建構器模式：設置機台歷史
    pub fn with_history(mut self, history: MachineHistory) -> Self {
        self.history = history;
        self
    }

    pub fn plant(&self) -> &PlantData {
        &self.plant
    }

    /// 共享的工廠資料（供跨執行緒傳遞）
    pub fn plant_arc(&self) -> Arc<PlantData> {
        Arc::clone(&self.plant)
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn history(&self) -> &MachineHistory {
        &self.history
    }

    pub fn stock_mut(&mut self) -> &mut StockLedger {
        &mut self.stock
    }

    // ---- 機台可用性 ----

    pub fn availability(&self) -> &MachineAvailability {
        &self.availability
    }

    /// 停用機台（僅影響本次排程）
    pub fn deactivate_machine(&mut self, code: impl Into<String>) {
        self.availability.deactivate(code);
    }

    pub fn is_machine_active(&self, code: &str) -> bool {
        self.availability.is_active(code)
    }

    /// 指定階段的可用機台（依輸入順序）
    pub fn active_machines(&self, stage: ProcessStage) -> Vec<&Machine> {
        self.plant
            .machines_of(stage)
            .filter(|m| self.availability.is_active(&m.code))
            .collect()
    }

    /// 物料可用的機台（依途程輸入順序，週期時間須大於 0）
    pub fn eligible_machines(&self, item: &Item) -> Vec<&Machine> {
        self.plant
            .routings()
            .for_item(&item.name)
            .filter(|r| r.cycle_time > Decimal::ZERO)
            .filter_map(|r| self.plant.machine(&r.machine))
            .filter(|m| m.stage == item.process && self.availability.is_active(&m.code))
            .collect()
    }

    /// 物料在其製程階段是否有可用途程
    pub fn has_active_routing(&self, item: &Item) -> bool {
        !self.eligible_machines(item).is_empty()
    }

    // ---- 生產訂單 ----

    /// 新增生產訂單
    pub fn add_order(&mut self, item: impl Into<String>, quantity: Decimal, due_date: NaiveDateTime, weight: u32) -> OrderId {
        let id = OrderId(self.next_order);
        self.next_order += 1;
        let order = ProductionOrder::new(id, item, quantity, due_date).with_weight(weight);
        self.orders.insert(id, order);
        id
    }

    pub fn order(&self, id: OrderId) -> Result<&ProductionOrder> {
        self.orders.get(&id).ok_or(PlanError::OrderNotFound(id))
    }

    pub fn orders(&self) -> impl Iterator<Item = &ProductionOrder> {
        self.orders.values()
    }

    /// 尚未展開的訂單
    pub fn unexpanded_orders(&self) -> Vec<OrderId> {
        self.orders
            .keys()
            .filter(|id| !self.expanded.contains(id))
            .copied()
            .collect()
    }

    /// 標記訂單已展開
    pub fn mark_expanded(&mut self, id: OrderId) {
        self.expanded.insert(id);
    }

    /// 以執行計劃更新訂單完工時間
    pub fn refresh_order_completions(&mut self) {
        for order in self.orders.values_mut() {
            order.completion_time = self
                .plans
                .values()
                .filter(|p| p.order == order.id)
                .filter_map(|p| p.completion_time)
                .max();
        }
    }

    /// 逾期訂單的產品名稱（去重，依訂單順序）
    pub fn late_products(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for order in self.orders.values().filter(|o| o.is_late()) {
            if !names.contains(&order.item) {
                names.push(order.item.clone());
            }
        }
        names
    }

    // ---- 執行計劃 ----

    /// 新增執行計劃
    pub fn add_plan(
        &mut self,
        parent: Option<&str>,
        item: &Item,
        quantity: Decimal,
        order: OrderId,
        bom: Option<BomId>,
    ) -> PlanId {
        let id = PlanId(self.next_plan);
        self.next_plan += 1;
        let mut plan = ExecutionPlan::new(id, item.name.clone(), item.process, quantity, order);
        plan.parent_item = parent.map(str::to_string);
        plan.bom = bom;
        self.plans.insert(id, plan);
        id
    }

    pub fn plan(&self, id: PlanId) -> Result<&ExecutionPlan> {
        self.plans.get(&id).ok_or(PlanError::PlanNotFound(id))
    }

    pub fn plan_mut(&mut self, id: PlanId) -> Result<&mut ExecutionPlan> {
        self.plans.get_mut(&id).ok_or(PlanError::PlanNotFound(id))
    }

    pub fn plans(&self) -> impl Iterator<Item = &ExecutionPlan> {
        self.plans.values()
    }

    /// 指定階段的執行計劃ID（依建立順序）
    pub fn plan_ids_of(&self, stage: ProcessStage) -> Vec<PlanId> {
        self.plans
            .values()
            .filter(|p| p.stage == stage)
            .map(|p| p.id)
            .collect()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// 移除執行計劃
    pub fn remove_plans(&mut self, ids: impl IntoIterator<Item = PlanId>) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.plans.remove(&id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let plans = &self.plans;
            for tu in self.time_units.values_mut() {
                tu.plans.retain(|p| plans.contains_key(p));
            }
            self.time_units.retain(|_, tu| !tu.is_empty());
        }
        removed
    }

    /// 物料對應的參考資料
    pub fn item_of(&self, id: PlanId) -> Result<&Item> {
        let plan = self.plan(id)?;
        self.plant.require_item(&plan.item)
    }

    // ---- 時間單元 ----

    /// 新增時間單元
    pub fn add_time_unit(&mut self, machine: impl Into<String>, plans: Vec<PlanId>) -> TimeUnitId {
        let id = TimeUnitId(self.next_time_unit);
        self.next_time_unit += 1;
        self.time_units.insert(id, TimeUnit::new(id, machine, plans));
        id
    }

    pub fn time_unit(&self, id: TimeUnitId) -> Option<&TimeUnit> {
        self.time_units.get(&id)
    }

    pub fn time_unit_mut(&mut self, id: TimeUnitId) -> Option<&mut TimeUnit> {
        self.time_units.get_mut(&id)
    }

    pub fn time_units(&self) -> impl Iterator<Item = &TimeUnit> {
        self.time_units.values()
    }

    /// 機台上的時間單元ID（依建立順序）
    pub fn time_units_on(&self, machine: &str) -> Vec<TimeUnitId> {
        self.time_units
            .values()
            .filter(|tu| tu.machine == machine)
            .map(|tu| tu.id)
            .collect()
    }
}
