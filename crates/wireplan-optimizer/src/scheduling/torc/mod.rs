//! 第三階段（撚線）排程
//!
//! 流程：建立問題資料 → 初始分配 → 模擬退火 → 暫定計時寫回 →（第二階段重排）→ 最終計時

mod annealing;
mod finalize;
mod moves;
mod objective;

pub use annealing::{Annealer, AnnealingStats, GeometricCooling};
pub use finalize::Finalizer;
pub use moves::{AppliedMove, Move, MoveGenerator, MoveMemory};
pub use objective::{ConsumptionGate, OrderGate, TorcEvaluator, UpstreamGate};

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use wireplan_core::{
    AnnealingConfig, Checkpoint, OrderId, PlanError, PlanId, PlanningContext, PlantData, PlantVariant,
    ProcessStage, Result, ShiftCalendar,
};

use crate::timing::{apply_timings, processing_minutes, MachineStart};
use crate::StageOutcome;

/// 撚線作業
#[derive(Debug, Clone)]
pub struct TorcOp {
    pub plan: PlanId,
    pub item: String,
    pub material: String,
    pub order: OrderId,
    pub due_date: NaiveDateTime,
    /// 可用機台 → 加工分鐘
    pub processing: BTreeMap<String, f64>,
}

impl TorcOp {
    pub fn can_run_on(&self, machine: &str) -> bool {
        self.processing.contains_key(machine)
    }

    /// 加工分鐘最短的機台
    pub fn fastest_machine(&self) -> Option<&str> {
        self.processing
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(m, _)| m.as_str())
    }
}

/// 第三階段問題資料，退火期間不變
#[derive(Debug, Clone)]
pub struct TorcProblem {
    plant: Arc<PlantData>,
    ops: HashMap<PlanId, TorcOp>,
    /// 參與退火的作業（交期由晚到早）
    movable: Vec<PlanId>,
    /// 以其他撚線產品為原料的特殊作業
    specials: Vec<PlanId>,
    /// 沒有可用機台的作業
    dropped: Vec<PlanId>,
    machines: Vec<String>,
    starts: BTreeMap<String, MachineStart>,
    order_gates: HashMap<OrderId, NaiveDateTime>,
    day_start: NaiveDateTime,
}

impl TorcProblem {
    pub fn new(ctx: &PlanningContext, calendar: &ShiftCalendar) -> Result<Self> {
        let plant = ctx.plant_arc();
        let machines: Vec<String> = ctx
            .active_machines(ProcessStage::Torc)
            .into_iter()
            .map(|m| m.code.clone())
            .collect();
        let starts = machines
            .iter()
            .map(|m| (m.clone(), MachineStart::from_plan_history(ctx, calendar, m)))
            .collect();

        let special_items: BTreeSet<&str> = ctx
            .plans()
            .filter(|p| p.stage == ProcessStage::Torc)
            .filter_map(|p| p.parent_item.as_deref())
            .collect();

        let mut ops = HashMap::new();
        let mut movable = Vec::new();
        let mut specials = Vec::new();
        let mut dropped = Vec::new();
        for plan in ctx.plans().filter(|p| p.stage == ProcessStage::Torc) {
            let item = ctx.item_of(plan.id)?;
            let mut processing = BTreeMap::new();
            for machine in ctx.eligible_machines(item) {
                if machine.stage == ProcessStage::Torc {
                    processing.insert(machine.code.clone(), processing_minutes(ctx, &machine.code, plan.id)?);
                }
            }
            if processing.is_empty() {
                tracing::warn!("撚線計劃 {} ({}) 沒有可用機台", plan.id, plan.item);
                dropped.push(plan.id);
                continue;
            }

            if special_items.contains(plan.item.as_str()) {
                specials.push(plan.id);
            } else {
                movable.push((plan.id, ctx.order(plan.order)?.due_date));
            }
            ops.insert(
                plan.id,
                TorcOp {
                    plan: plan.id,
                    item: plan.item.clone(),
                    material: item.material_type.clone(),
                    order: plan.order,
                    due_date: ctx.order(plan.order)?.due_date,
                    processing,
                },
            );
        }
        movable.sort_by_key(|(id, due)| (Reverse(*due), *id));

        let mut order_gates: HashMap<OrderId, NaiveDateTime> = HashMap::new();
        for tu in ctx.time_units() {
            let Some(completion) = tu.completion_time else { continue };
            for &id in &tu.plans {
                let order = ctx.plan(id)?.order;
                order_gates
                    .entry(order)
                    .and_modify(|t| *t = (*t).max(completion))
                    .or_insert(completion);
            }
        }

        Ok(Self {
            plant,
            ops,
            movable: movable.into_iter().map(|(id, _)| id).collect(),
            specials,
            dropped,
            machines,
            starts,
            order_gates,
            day_start: ShiftCalendar::start_of_day(ctx.current_time),
        })
    }

    pub fn plant(&self) -> &PlantData {
        &self.plant
    }

    pub fn op(&self, plan: PlanId) -> Result<&TorcOp> {
        self.ops.get(&plan).ok_or(PlanError::PlanNotFound(plan))
    }

    pub fn movable(&self) -> &[PlanId] {
        &self.movable
    }

    pub fn specials(&self) -> &[PlanId] {
        &self.specials
    }

    pub fn dropped(&self) -> &[PlanId] {
        &self.dropped
    }

    pub fn machines(&self) -> &[String] {
        &self.machines
    }

    pub fn machine_start(&self, machine: &str) -> Result<&MachineStart> {
        self.starts
            .get(machine)
            .ok_or_else(|| PlanError::MachineNotFound(machine.to_string()))
    }

    /// 訂單的第二階段最晚完工；沒有時間單元時為當日零點
    pub fn order_gate(&self, order: OrderId) -> NaiveDateTime {
        self.order_gates.get(&order).copied().unwrap_or(self.day_start)
    }

    pub fn day_start(&self) -> NaiveDateTime {
        self.day_start
    }

    /// 初始解
    ///
    /// 作業依（產品, 訂單）分組。簡單模式以最大單筆加工時間為每台機台的預算依序填入，
    /// 超出後輪流分配；相依模式直接在可用機台間輪流分配。
    pub fn initial_solution(&self, variant: PlantVariant) -> Result<TorcSolution> {
        let mut solution = TorcSolution::new(&self.machines);

        let mut groups: Vec<((String, OrderId), Vec<PlanId>)> = Vec::new();
        for &id in &self.movable {
            let op = self.op(id)?;
            let key = (op.item.clone(), op.order);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(id),
                None => groups.push((key, vec![id])),
            }
        }

        match variant {
            PlantVariant::Simple => {
                let budget = self
                    .movable
                    .iter()
                    .filter_map(|id| self.ops.get(id))
                    .flat_map(|op| op.processing.values().copied())
                    .fold(0.0, f64::max);
                for (_, members) in &groups {
                    self.fill_by_budget(&mut solution, members, budget)?;
                }
            }
            PlantVariant::Dependent => {
                for (_, members) in &groups {
                    for (index, &id) in members.iter().enumerate() {
                        let op = self.op(id)?;
                        let machines: Vec<&String> = op.processing.keys().collect();
                        let machine = machines[index % machines.len()];
                        solution.push(machine, id);
                    }
                }
            }
        }
        Ok(solution)
    }

    fn fill_by_budget(&self, solution: &mut TorcSolution, members: &[PlanId], budget: f64) -> Result<()> {
        let Some(&first) = members.first() else {
            return Ok(());
        };
        let mut candidates: Vec<(&String, f64)> = self.op(first)?.processing.iter().map(|(m, p)| (m, *p)).collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut next = 0;
        for (machine, _) in &candidates {
            let mut used = 0.0;
            while next < members.len() {
                used += self.op(members[next])?.processing.get(*machine).copied().unwrap_or(0.0);
                if used > budget {
                    break;
                }
                solution.push(machine, members[next]);
                next += 1;
            }
            if next >= members.len() {
                return Ok(());
            }
        }
        while next < members.len() {
            for (machine, _) in &candidates {
                if next >= members.len() {
                    break;
                }
                solution.push(machine, members[next]);
                next += 1;
            }
        }
        Ok(())
    }
}

/// 各撚線機的作業佇列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorcSolution {
    pub queues: BTreeMap<String, Vec<PlanId>>,
}

impl TorcSolution {
    pub fn new(machines: &[String]) -> Self {
        Self {
            queues: machines.iter().map(|m| (m.clone(), Vec::new())).collect(),
        }
    }

    pub fn queue(&self, machine: &str) -> &[PlanId] {
        self.queues.get(machine).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push(&mut self, machine: &str, plan: PlanId) {
        self.queues.entry(machine.to_string()).or_default().push(plan);
    }

    pub fn machine_of(&self, plan: PlanId) -> Option<&str> {
        self.queues
            .iter()
            .find(|(_, queue)| queue.contains(&plan))
            .map(|(m, _)| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 退火結果，供最終計時使用
#[derive(Debug, Clone)]
pub struct TorcRun {
    pub problem: TorcProblem,
    pub solution: TorcSolution,
    pub stats: AnnealingStats,
}

/// 第三階段排程器
pub struct TorcScheduler<'a> {
    config: &'a AnnealingConfig,
    calendar: &'a ShiftCalendar,
}

impl<'a> TorcScheduler<'a> {
    pub fn new(config: &'a AnnealingConfig, calendar: &'a ShiftCalendar) -> Self {
        Self { config, calendar }
    }

    /// 模擬退火指派，並以訂單閘門寫回暫定時間
    pub fn optimize(
        &self,
        ctx: &mut PlanningContext,
        variant: PlantVariant,
        checkpoint: &mut Checkpoint,
    ) -> Result<TorcRun> {
        let start_time = Instant::now();
        let problem = TorcProblem::new(ctx, self.calendar)?;
        let initial = problem.initial_solution(variant)?;

        let evaluator = TorcEvaluator::new(&problem, self.config);
        let (solution, score, stats) = Annealer::new(&problem, &evaluator, self.config).run(initial, checkpoint)?;

        let mut timings = Vec::new();
        for (machine, queue) in &solution.queues {
            timings.extend(evaluator.time_queue(machine, queue, &mut OrderGate::new(&problem))?);
        }
        apply_timings(ctx, &timings)?;

        tracing::info!(
            "撚線退火完成：作業 {} 筆、延遲成本 {:.1}、嘗試 {} 次、接受 {} 次，耗時 {:?}",
            solution.len(),
            score.tardiness,
            stats.iterations,
            stats.accepted,
            start_time.elapsed()
        );
        Ok(TorcRun {
            problem,
            solution,
            stats,
        })
    }

    /// 最終計時：完整上游相依、插入特殊作業並寫回
    pub fn finalize(&self, ctx: &mut PlanningContext, run: &TorcRun) -> Result<StageOutcome> {
        let evaluator = TorcEvaluator::new(&run.problem, self.config);
        let (solution, timings) = Finalizer::new(ctx, &run.problem, &evaluator).finalize(&run.solution)?;
        apply_timings(ctx, &timings)?;

        let dropped = run.problem.dropped().len();
        let mut outcome = StageOutcome::new(ProcessStage::Torc, solution.len(), 0);
        if dropped > 0 {
            outcome = outcome.with_message(format!("{dropped} 筆撚線計劃沒有可用機台"));
        }
        tracing::info!("撚線最終計時完成：作業 {} 筆", solution.len());
        Ok(outcome)
    }
}
