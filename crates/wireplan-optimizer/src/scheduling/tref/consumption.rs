//! 拉線供料模擬：計算絞線機首個時間單元的最早開工閘門

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use wireplan_core::{PlanError, PlanningContext, ProcessStage, Result, ShiftCalendar, TimeUnitId};

use crate::scheduling::rod::RodSolution;
use crate::CapacityPlanner;

/// 每種拉線物料在各拉線機佇列上的讀取位置（槽位索引）
pub type Cursors = BTreeMap<String, Vec<usize>>;

/// 一台絞線機的供料需求
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyDemand {
    /// （拉線物料, 支數）
    pub items: Vec<(String, u32)>,
    /// 每種物料在各拉線機的分配支數
    pub allocation: BTreeMap<String, Vec<u32>>,
}

impl SupplyDemand {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 供料模擬器
pub struct RodConsumption<'a> {
    ctx: &'a PlanningContext,
    rod: &'a RodSolution,
}

impl<'a> RodConsumption<'a> {
    pub fn new(ctx: &'a PlanningContext, rod: &'a RodSolution) -> Self {
        Self { ctx, rod }
    }

    /// 時間單元所需的拉線物料
    ///
    /// 每筆絞線計劃取其拉線子計劃使用的 BOM（沒有子計劃時取該物料的所有 BOM），
    /// 每個子件需要與絞線物料輸入數相同的支數。需求依拉線機的輸入數比例分配。
    pub fn demand(&self, unit: TimeUnitId) -> Result<SupplyDemand> {
        let plant = self.ctx.plant();
        let tu = self
            .ctx
            .time_unit(unit)
            .ok_or_else(|| PlanError::InvariantViolation(format!("找不到時間單元 {unit}")))?;

        let mut items: Vec<(String, u32)> = Vec::new();
        for &id in &tu.plans {
            let plan = self.ctx.plan(id)?;
            let quantity = self.ctx.item_of(id)?.input;

            let selected = self
                .ctx
                .plans()
                .find(|p| {
                    p.stage == ProcessStage::Rod
                        && p.order == plan.order
                        && p.parent_item.as_deref() == Some(plan.item.as_str())
                })
                .and_then(|p| p.bom)
                .and_then(|bom| plant.bom(bom));
            let boms: Vec<_> = match selected {
                Some(bom) => vec![bom],
                None => plant.boms_of(&plan.item).collect(),
            };

            for bom in boms {
                for line in &bom.lines {
                    match items.iter_mut().find(|(name, _)| *name == line.item) {
                        Some((_, total)) => *total += quantity,
                        None => items.push((line.item.clone(), quantity)),
                    }
                }
            }
        }

        let allocation = items
            .iter()
            .map(|(item, quantity)| (item.clone(), self.allocate(item, *quantity)))
            .collect();
        Ok(SupplyDemand { items, allocation })
    }

    /// 依拉線機輸入數比例分配支數；沒有生產該物料的拉線機分配為 0
    fn allocate(&self, item: &str, quantity: u32) -> Vec<u32> {
        let producers: Vec<(usize, u32)> = self
            .rod
            .queues
            .iter()
            .enumerate()
            .filter(|(_, queue)| {
                queue
                    .slots
                    .iter()
                    .flatten()
                    .any(|id| self.ctx.plan(*id).is_ok_and(|p| p.item == item))
            })
            .map(|(index, queue)| {
                let input = self.ctx.plant().machine(&queue.machine).map_or(1, |m| m.input.max(1));
                (index, input)
            })
            .collect();

        let mut allocation = vec![0; self.rod.queues.len()];
        let capacities: Vec<u32> = producers.iter().map(|(_, input)| *input).collect();
        for ((index, _), share) in producers.iter().zip(CapacityPlanner::split_by_capacity(&capacities, quantity)) {
            allocation[*index] = share;
        }
        allocation
    }

    /// 自讀取位置起沿各拉線機佇列消耗分配的支數，回傳最晚完工時間與新的讀取位置
    pub fn gate(&self, demand: &SupplyDemand, cursors: &Cursors) -> Result<(NaiveDateTime, Cursors)> {
        let mut gate = ShiftCalendar::start_of_day(self.ctx.current_time);
        let mut advanced = cursors.clone();

        for (item, _) in &demand.items {
            let Some(allocation) = demand.allocation.get(item) else { continue };
            let positions = advanced
                .entry(item.clone())
                .or_insert_with(|| vec![0; self.rod.queues.len()]);

            for (index, queue) in self.rod.queues.iter().enumerate() {
                let wanted = allocation.get(index).copied().unwrap_or(0);
                let mut position = positions.get(index).copied().unwrap_or(0);
                let mut consumed = 0;
                while consumed < wanted && position < queue.slots.len() {
                    for &id in &queue.slots[position] {
                        let plan = self.ctx.plan(id)?;
                        if plan.item == *item {
                            consumed += 1;
                            if let Some(completion) = plan.completion_time {
                                gate = gate.max(completion);
                            }
                        }
                    }
                    position += 1;
                }
                if let Some(slot) = positions.get_mut(index) {
                    *slot = position;
                }
            }
        }
        Ok((gate, advanced))
    }
}
