//! 撚線最終計時與特殊作業插入

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use wireplan_core::{PlanError, PlanId, PlanningContext, Result};

use super::{ConsumptionGate, TorcEvaluator, TorcProblem, TorcSolution, UpstreamGate};
use crate::timing::PlanTiming;

/// 最終計時器
pub struct Finalizer<'a> {
    ctx: &'a PlanningContext,
    problem: &'a TorcProblem,
    evaluator: &'a TorcEvaluator<'a>,
}

impl<'a> Finalizer<'a> {
    pub fn new(ctx: &'a PlanningContext, problem: &'a TorcProblem, evaluator: &'a TorcEvaluator<'a>) -> Self {
        Self {
            ctx,
            problem,
            evaluator,
        }
    }

    /// 依完整上游相依重新計時，插入特殊作業後反覆計時直到各特殊作業的原料完工不再變動
    pub fn finalize(&self, solution: &TorcSolution) -> Result<(TorcSolution, Vec<PlanTiming>)> {
        let order = self.machine_order(solution);
        let timings = self.time_all(&order, solution, HashMap::new())?;
        if self.problem.specials().is_empty() {
            return Ok((solution.clone(), timings));
        }

        let mut solution = solution.clone();
        let components = self.place_specials(&mut solution, &timings)?;
        let order = self.machine_order(&solution);

        let mut ready = HashMap::new();
        for _ in 0..components.len() + 2 {
            let timings = self.time_all(&order, &solution, ready.clone())?;
            let next = Self::component_ready(&components, &timings);
            if next == ready {
                return Ok((solution, timings));
            }
            ready = next;
        }
        Err(PlanError::InvariantViolation(
            "特殊作業與其原料作業互相等待，無法計時".to_string(),
        ))
    }

    /// 特殊作業 → 其所有原料作業的最晚完工
    fn component_ready(
        components: &HashMap<PlanId, Vec<PlanId>>,
        timings: &[PlanTiming],
    ) -> HashMap<PlanId, NaiveDateTime> {
        let completions: HashMap<PlanId, NaiveDateTime> = timings.iter().map(|t| (t.plan, t.completion)).collect();
        components
            .iter()
            .filter_map(|(special, consumed)| {
                consumed
                    .iter()
                    .filter_map(|id| completions.get(id).copied())
                    .max()
                    .map(|latest| (*special, latest))
            })
            .collect()
    }

    /// 機台依暫定最晚完工排序；空機台排最前
    fn machine_order(&self, solution: &TorcSolution) -> Vec<String> {
        let mut order: Vec<(NaiveDateTime, &String)> = solution
            .queues
            .iter()
            .map(|(machine, queue)| {
                let latest = queue
                    .iter()
                    .filter_map(|id| self.ctx.plan(*id).ok())
                    .filter_map(|p| p.completion_time)
                    .max()
                    .unwrap_or(self.problem.day_start());
                (latest, machine)
            })
            .collect();
        order.sort();
        order.into_iter().map(|(_, machine)| machine.clone()).collect()
    }

    fn time_all(
        &self,
        order: &[String],
        solution: &TorcSolution,
        ready: HashMap<PlanId, NaiveDateTime>,
    ) -> Result<Vec<PlanTiming>> {
        let mut gate = ConsumptionGate::new(self.ctx, self.problem).with_ready_times(ready);
        let mut timings = Vec::with_capacity(solution.len());
        for machine in order {
            gate.next_machine();
            timings.extend(self.evaluator.time_queue(machine, solution.queue(machine), &mut gate)?);
        }
        Ok(timings)
    }

    /// 將特殊作業插在其最晚完成之原料作業之後
    ///
    /// 原料作業所在機台可生產特殊品時插在同機台；否則放到加工最快的機台，
    /// 位置在最後一筆不晚於原料完工的作業之後。找不到原料作業時排在最快機台尾端。
    /// 回傳各特殊作業消耗的原料作業。
    fn place_specials(
        &self,
        solution: &mut TorcSolution,
        timings: &[PlanTiming],
    ) -> Result<HashMap<PlanId, Vec<PlanId>>> {
        let plant = self.problem.plant();
        let completions: HashMap<PlanId, NaiveDateTime> = timings.iter().map(|t| (t.plan, t.completion)).collect();

        let mut used = HashSet::new();
        let mut components = HashMap::new();
        for &special in self.problem.specials() {
            let op = self.problem.op(special)?;

            let bom = self
                .ctx
                .plans()
                .find(|p| p.order == op.order && p.parent_item.as_deref() == Some(op.item.as_str()) && p.bom.is_some())
                .and_then(|p| p.bom)
                .and_then(|id| plant.bom(id));

            let mut available: Vec<(NaiveDateTime, PlanId, &str)> = Vec::new();
            for timing in timings {
                let plan = self.ctx.plan(timing.plan)?;
                if plan.order == op.order && plan.parent_item.as_deref() == Some(op.item.as_str()) {
                    available.push((timing.completion, timing.plan, plan.item.as_str()));
                }
            }
            available.sort();

            let mut consumed = Vec::new();
            let mut latest: Option<(NaiveDateTime, PlanId)> = None;
            for line in bom.iter().flat_map(|b| b.lines.iter()) {
                for _ in 0..line.count {
                    let Some(&(completion, id, _)) = available
                        .iter()
                        .find(|(_, id, item)| *item == line.item && !used.contains(id))
                    else {
                        break;
                    };
                    used.insert(id);
                    consumed.push(id);
                    latest = latest.max(Some((completion, id)));
                }
            }

            let fastest = op
                .fastest_machine()
                .ok_or_else(|| PlanError::InvariantViolation(format!("特殊作業 {special} 沒有可用機台")))?
                .to_string();
            match latest {
                Some((completion, upstream)) => {
                    let host = solution
                        .machine_of(upstream)
                        .filter(|m| op.can_run_on(m))
                        .map(str::to_string);
                    match host {
                        Some(machine) => {
                            let queue = solution.queues.entry(machine).or_default();
                            let position = queue.iter().position(|id| *id == upstream).map_or(queue.len(), |p| p + 1);
                            queue.insert(position, special);
                        }
                        None => {
                            let queue = solution.queues.entry(fastest).or_default();
                            let position = queue
                                .iter()
                                .rposition(|id| completions.get(id).is_some_and(|c| *c <= completion))
                                .map_or(0, |p| p + 1);
                            queue.insert(position, special);
                        }
                    }
                }
                None => {
                    tracing::debug!("特殊作業 {} 找不到原料作業，排在 {} 尾端", special, fastest);
                    solution.push(&fastest, special);
                }
            }
            components.insert(special, consumed);
        }
        Ok(components)
    }
}
