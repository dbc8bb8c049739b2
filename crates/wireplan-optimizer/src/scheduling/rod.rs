//! 第一階段（拉線）排程
//!
//! 列舉替代 BOM 組合，每個組合以貪婪法指派機台，
//! 依延遲分鐘數選出一個組合後寫入時間並移除未選用的計劃。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use wireplan_core::{
    BomId, Checkpoint, Machine, OrderId, PlanError, PlanId, PlanningContext, ProcessStage, Result,
    RodConfig, ShiftCalendar,
};

use crate::timing::{apply_timings, minutes, processing_minutes, tardiness_minutes, MachineStart, PlanTiming};
use crate::{CapacityPlanner, Combinations, StageOutcome};

/// 單台拉線機的佇列；每個槽位內的計劃並行加工
#[derive(Debug, Clone, PartialEq)]
pub struct RodQueue {
    pub machine: String,
    pub output: u32,
    pub slots: Vec<Vec<PlanId>>,
}

impl RodQueue {
    fn new(machine: &Machine) -> Self {
        Self {
            machine: machine.code.clone(),
            output: machine.output.max(1),
            slots: Vec::new(),
        }
    }

    fn plan_count(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}

/// 第一階段排程解
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RodSolution {
    pub queues: Vec<RodQueue>,
}

impl RodSolution {
    /// 解中的所有計劃
    pub fn plan_ids(&self) -> BTreeSet<PlanId> {
        self.queues
            .iter()
            .flat_map(|q| q.slots.iter().flatten().copied())
            .collect()
    }

    pub fn queue(&self, machine: &str) -> Option<&RodQueue> {
        self.queues.iter().find(|q| q.machine == machine)
    }

    /// 只保留符合條件的計劃，並移除空槽位
    pub fn retain_plans(&mut self, keep: impl Fn(PlanId) -> bool) {
        for queue in &mut self.queues {
            for slot in &mut queue.slots {
                slot.retain(|id| keep(*id));
            }
            queue.slots.retain(|slot| !slot.is_empty());
        }
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(RodQueue::plan_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RodOp {
    id: PlanId,
    item: String,
    order: OrderId,
    due: NaiveDateTime,
    quantity: Decimal,
}

/// 第一階段排程器
pub struct RodScheduler<'a> {
    ctx: &'a PlanningContext,
    config: &'a RodConfig,
    machines: Vec<&'a Machine>,
    starts: HashMap<String, MachineStart>,
}

impl<'a> RodScheduler<'a> {
    pub fn new(ctx: &'a PlanningContext, config: &'a RodConfig, calendar: &ShiftCalendar) -> Self {
        let machines = ctx.active_machines(ProcessStage::Rod);
        let starts = machines
            .iter()
            .map(|m| (m.code.clone(), MachineStart::from_plan_history(ctx, calendar, &m.code)))
            .collect();
        Self {
            ctx,
            config,
            machines,
            starts,
        }
    }

    /// 完整執行第一階段：選組合、平衡槽位、寫入時間、移除未選用計劃
    pub fn run(
        ctx: &mut PlanningContext,
        config: &RodConfig,
        calendar: &ShiftCalendar,
        checkpoint: &mut Checkpoint,
    ) -> Result<(RodSolution, StageOutcome)> {
        let start_time = Instant::now();

        let (solution, timings) = {
            let scheduler = RodScheduler::new(ctx, config, calendar);
            let Some(mut solution) = scheduler.plan(checkpoint)? else {
                return Ok((RodSolution::default(), StageOutcome::skipped(ProcessStage::Rod)));
            };
            scheduler.rebalance(&mut solution)?;
            let timings = scheduler.timings(&solution)?;
            (solution, timings)
        };

        apply_timings(ctx, &timings)?;

        let kept = solution.plan_ids();
        let unselected: Vec<PlanId> = ctx
            .plan_ids_of(ProcessStage::Rod)
            .into_iter()
            .filter(|id| !kept.contains(id))
            .collect();
        let discarded = ctx.remove_plans(unselected);

        tracing::info!(
            "拉線排程完成：排程 {} 筆、移除 {} 筆，耗時 {:?}",
            kept.len(),
            discarded,
            start_time.elapsed()
        );
        Ok((solution.clone(), StageOutcome::new(ProcessStage::Rod, kept.len(), discarded)))
    }

    /// 依現有解重新計算時間（解被修剪後使用）
    pub fn retime(
        ctx: &mut PlanningContext,
        solution: &RodSolution,
        config: &RodConfig,
        calendar: &ShiftCalendar,
    ) -> Result<()> {
        let timings = RodScheduler::new(ctx, config, calendar).timings(solution)?;
        apply_timings(ctx, &timings)
    }

    /// 列舉替代組合並選出最佳解；沒有拉線計劃時回傳 None
    pub fn plan(&self, checkpoint: &mut Checkpoint) -> Result<Option<RodSolution>> {
        let (fixed, groups) = self.alternatives()?;
        if fixed.is_empty() && groups.is_empty() {
            return Ok(None);
        }

        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        tracing::info!(
            "拉線候選組合數：{}",
            Combinations::count_of(&sizes).map_or_else(|| "溢位".to_string(), |n| n.to_string())
        );

        let mut best: Option<(RodSolution, f64)> = None;
        let mut stale = 0usize;
        for (index, combination) in Combinations::new(sizes).enumerate() {
            if index >= self.config.max_combinations {
                tracing::warn!("拉線組合數達上限 {}，停止列舉", self.config.max_combinations);
                break;
            }
            checkpoint.tick()?;

            let mut plans = fixed.clone();
            for (group, choice) in groups.iter().zip(&combination) {
                plans.extend(group[*choice].iter().copied());
            }

            let candidate = self.construct(&plans)?;
            let score = self.objective(&candidate)?;
            tracing::debug!("拉線組合 #{}：延遲 {:.1} 分鐘", index, score);

            let replace = match &best {
                None => true,
                Some((_, best_score)) => self.config.selection.prefers(score, *best_score),
            };
            if replace {
                best = Some((candidate, score));
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.max_no_improvement {
                    break;
                }
            }
        }

        Ok(best.map(|(solution, _)| solution))
    }

    /// 拉線計劃依（上層物料, 訂單）分組，組內依 BOM 版本分為替代方案；
    /// 無上層或無 BOM 的計劃一律納入
    fn alternatives(&self) -> Result<(Vec<PlanId>, Vec<Vec<Vec<PlanId>>>)> {
        let mut fixed = Vec::new();
        let mut groups: BTreeMap<(String, OrderId), BTreeMap<BomId, Vec<PlanId>>> = BTreeMap::new();

        for id in self.ctx.plan_ids_of(ProcessStage::Rod) {
            let plan = self.ctx.plan(id)?;
            match (&plan.parent_item, plan.bom) {
                (Some(parent), Some(bom)) => groups
                    .entry((parent.clone(), plan.order))
                    .or_default()
                    .entry(bom)
                    .or_default()
                    .push(id),
                _ => fixed.push(id),
            }
        }

        let groups = groups
            .into_values()
            .map(|alternatives| alternatives.into_values().collect())
            .collect();
        Ok((fixed, groups))
    }

    fn op(&self, id: PlanId) -> Result<RodOp> {
        let plan = self.ctx.plan(id)?;
        let order = self.ctx.order(plan.order)?;
        Ok(RodOp {
            id,
            item: plan.item.clone(),
            order: plan.order,
            due: order.due_date,
            quantity: plan.quantity,
        })
    }

    /// 可加工機台，依偏好排序
    fn candidates(&self, op: &RodOp) -> Result<Vec<&'a Machine>> {
        let plant = self.ctx.plant();
        let item = plant.require_item(&op.item)?;
        let routings = plant.routings();
        let quantity = op.quantity.to_f64().unwrap_or(0.0);

        let cycle = |m: &Machine| {
            routings
                .cycle_time(&m.code, &op.item)
                .and_then(|ct| ct.to_f64())
                .map_or(f64::INFINITY, |ct| ct * quantity)
        };
        let weight = |m: &Machine| routings.weight(&m.code, &op.item).unwrap_or(0);

        let mut machines = self.ctx.eligible_machines(item);
        if self.ctx.criteria().weight_by_cycle_time {
            machines.sort_by(|a, b| cycle(a).total_cmp(&cycle(b)).then_with(|| weight(b).cmp(&weight(a))));
        } else {
            machines.sort_by_key(|m| std::cmp::Reverse(weight(m)));
        }
        Ok(machines)
    }

    /// 以貪婪法建構一個組合的解
    fn construct(&self, plans: &[PlanId]) -> Result<RodSolution> {
        let mut ops: Vec<RodOp> = plans.iter().map(|id| self.op(*id)).collect::<Result<_>>()?;
        ops.sort_by_key(|op| op.due);

        let candidates: Vec<Vec<&Machine>> = ops.iter().map(|op| self.candidates(op)).collect::<Result<_>>()?;
        let possible: Vec<&Machine> = self
            .machines
            .iter()
            .filter(|m| candidates.iter().flatten().any(|c| c.code == m.code))
            .copied()
            .collect();

        let outputs: Vec<u32> = possible.iter().map(|m| m.output).collect();
        let targets = CapacityPlanner::proportional_targets(&outputs, ops.len());
        let mut queues: Vec<RodQueue> = possible.iter().map(|m| RodQueue::new(m)).collect();

        let batch_key: HashMap<PlanId, (&str, OrderId)> =
            ops.iter().map(|op| (op.id, (op.item.as_str(), op.order))).collect();

        // 同產品同訂單的作業連續指派
        let mut batches: Vec<((&str, OrderId), Vec<usize>)> = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            let key = (op.item.as_str(), op.order);
            match batches.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(index),
                None => batches.push((key, vec![index])),
            }
        }

        for (key, members) in &batches {
            for &index in members {
                let op = &ops[index];
                let positions: Vec<usize> = candidates[index]
                    .iter()
                    .filter_map(|m| queues.iter().position(|q| q.machine == m.code))
                    .collect();
                let chosen = positions
                    .iter()
                    .copied()
                    .find(|&q| queues[q].plan_count() < targets[q])
                    // 候選機台皆達目標數時仍排入首選機台
                    .or_else(|| positions.first().copied());
                let Some(q) = chosen else {
                    tracing::warn!("拉線計劃 {} ({}) 沒有可用機台", op.id, op.item);
                    continue;
                };

                let queue = &mut queues[q];
                let output = queue.output as usize;
                let open_slot = if output > 1 {
                    queue.slots.iter_mut().find(|slot| {
                        slot.len() < output && slot.first().and_then(|first| batch_key.get(first)) == Some(key)
                    })
                } else {
                    None
                };
                match open_slot {
                    Some(slot) => slot.push(op.id),
                    None => queue.slots.push(vec![op.id]),
                }
            }
        }

        Ok(RodSolution { queues })
    }

    /// 機台佇列的時間軸
    ///
    /// 首槽自機台可開工時間開始；之後的槽位自前一槽最晚完工時間加換線時間開始。
    /// 開工時間另加轉運緩衝，完工 = 開工 + 加工時間。
    fn timeline(&self, queue: &RodQueue) -> Result<Vec<PlanTiming>> {
        let start = self
            .starts
            .get(&queue.machine)
            .ok_or_else(|| PlanError::MachineNotFound(queue.machine.clone()))?;
        let setups = self.ctx.plant().setup_times();

        let mut timings = Vec::with_capacity(queue.plan_count());
        let mut previous_material = start.last_material.clone();
        let mut previous_slot_completion: Option<NaiveDateTime> = None;

        for (index, slot) in queue.slots.iter().enumerate() {
            let mut slot_completion = ShiftCalendar::start_of_day(self.ctx.current_time);
            for &id in slot {
                let material = self.ctx.item_of(id)?.material_type.clone();
                let processing = processing_minutes(self.ctx, &queue.machine, id)?;

                let mut st = match previous_slot_completion {
                    Some(completion) => {
                        completion + minutes(setups.minutes_between(previous_material.as_deref(), &material))
                    }
                    None => start.start,
                };
                st += minutes(processing * self.config.transfer_buffer);
                let cot = st + minutes(processing);

                slot_completion = slot_completion.max(cot);
                previous_material = Some(material);
                timings.push(PlanTiming {
                    plan: id,
                    machine: queue.machine.clone(),
                    position: index as u32 + 1,
                    start: st,
                    completion: cot,
                });
            }
            previous_slot_completion = Some(slot_completion);
        }
        Ok(timings)
    }

    /// 目標值：所有計劃的延遲分鐘數總和
    fn objective(&self, solution: &RodSolution) -> Result<f64> {
        let mut total = 0.0;
        for queue in &solution.queues {
            for timing in self.timeline(queue)? {
                let plan = self.ctx.plan(timing.plan)?;
                let due = self.ctx.order(plan.order)?.due_date;
                total += tardiness_minutes(timing.completion, due);
            }
        }
        Ok(total)
    }

    /// 整個解的時間
    pub fn timings(&self, solution: &RodSolution) -> Result<Vec<PlanTiming>> {
        let mut timings = Vec::with_capacity(solution.len());
        for queue in &solution.queues {
            timings.extend(self.timeline(queue)?);
        }
        Ok(timings)
    }

    /// 多槽機台上同產品的未滿槽位合併
    pub fn rebalance(&self, solution: &mut RodSolution) -> Result<()> {
        for queue in solution.queues.iter_mut().filter(|q| q.output > 1) {
            let output = queue.output as usize;

            let mut by_item: Vec<(String, Vec<(usize, PlanId)>)> = Vec::new();
            for (index, slot) in queue.slots.iter().enumerate().filter(|(_, s)| s.len() < output) {
                for &id in slot {
                    let plan = self.ctx.plan(id)?;
                    match by_item.iter_mut().find(|(item, _)| *item == plan.item) {
                        Some((_, entries)) => entries.push((index, id)),
                        None => by_item.push((plan.item.clone(), vec![(index, id)])),
                    }
                }
            }

            for (_, entries) in by_item {
                let Some(&(mut current, _)) = entries.first() else { continue };
                for &(index, id) in &entries[1..] {
                    if index == current {
                        continue;
                    }
                    if queue.slots[current].len() < output {
                        queue.slots[index].retain(|p| *p != id);
                        queue.slots[current].push(id);
                    } else {
                        current = index;
                    }
                }
            }

            queue.slots.retain(|slot| !slot.is_empty());
        }
        Ok(())
    }
}
