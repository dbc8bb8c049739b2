//! 撚線目標函數與上游閘門

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use wireplan_cache::MachineScore;
use wireplan_core::{AnnealingConfig, BomId, OrderId, PlanError, PlanId, PlanningContext, ProcessStage, Result};

use super::{TorcOp, TorcProblem};
use crate::timing::{earliness_minutes, minutes, tardiness_minutes, PlanTiming};

/// 作業開工前須等待的上游完工時間
pub trait UpstreamGate {
    /// `floor` 為機台可開工與前一作業完工的較晚者
    fn gate(&mut self, op: &TorcOp, floor: NaiveDateTime) -> NaiveDateTime;

    /// 換到下一台機台時呼叫
    fn next_machine(&mut self) {}
}

/// 退火期間使用：等待同訂單所有時間單元完工
pub struct OrderGate<'a> {
    problem: &'a TorcProblem,
}

impl<'a> OrderGate<'a> {
    pub fn new(problem: &'a TorcProblem) -> Self {
        Self { problem }
    }
}

impl UpstreamGate for OrderGate<'_> {
    fn gate(&mut self, op: &TorcOp, _floor: NaiveDateTime) -> NaiveDateTime {
        self.problem.order_gate(op.order)
    }
}

/// 最終計時使用：依 BOM 逐支消耗上游計劃，每筆上游計劃只能被消耗一次
pub struct ConsumptionGate<'a> {
    problem: &'a TorcProblem,
    /// （訂單, 物料）→ 上游計劃，依完工時間排序
    upstream: HashMap<(OrderId, String), Vec<(PlanId, NaiveDateTime)>>,
    /// （訂單, 上層物料）→ 該訂單展開時選用的 BOM
    boms: HashMap<(OrderId, String), BomId>,
    used: HashSet<PlanId>,
    /// 本機台上各物料最後消耗的完工時間
    last: HashMap<String, NaiveDateTime>,
    /// 額外的最早開工時間（特殊作業）
    ready: HashMap<PlanId, NaiveDateTime>,
}

impl<'a> ConsumptionGate<'a> {
    pub fn new(ctx: &PlanningContext, problem: &'a TorcProblem) -> Self {
        let mut upstream: HashMap<(OrderId, String), Vec<(PlanId, NaiveDateTime)>> = HashMap::new();
        let mut boms = HashMap::new();
        for plan in ctx.plans() {
            if let Some(completion) = plan.completion_time {
                upstream
                    .entry((plan.order, plan.item.clone()))
                    .or_default()
                    .push((plan.id, completion));
            }
            if let (Some(parent), Some(bom)) = (&plan.parent_item, plan.bom) {
                boms.entry((plan.order, parent.clone())).or_insert(bom);
            }
        }
        for candidates in upstream.values_mut() {
            candidates.sort_by_key(|(id, completion)| (*completion, *id));
        }

        Self {
            problem,
            upstream,
            boms,
            used: HashSet::new(),
            last: HashMap::new(),
            ready: HashMap::new(),
        }
    }

    pub fn with_ready_times(mut self, ready: HashMap<PlanId, NaiveDateTime>) -> Self {
        self.ready = ready;
        self
    }

    /// 已消耗的上游計劃
    pub fn used(&self) -> &HashSet<PlanId> {
        &self.used
    }
}

impl UpstreamGate for ConsumptionGate<'_> {
    fn gate(&mut self, op: &TorcOp, floor: NaiveDateTime) -> NaiveDateTime {
        let plant = self.problem.plant();
        let mut latest = self.ready.get(&op.plan).map_or(floor, |ready| floor.max(*ready));
        let Some(bom) = self
            .boms
            .get(&(op.order, op.item.clone()))
            .and_then(|id| plant.bom(*id))
        else {
            return latest;
        };

        for line in &bom.lines {
            if plant.item(&line.item).is_some_and(|i| i.process == ProcessStage::Torc) {
                continue;
            }
            let Some(candidates) = self.upstream.get(&(op.order, line.item.clone())) else {
                continue;
            };
            for _ in 0..line.count {
                let after = self.last.get(&line.item).copied();
                let pick = candidates
                    .iter()
                    .find(|(id, completion)| !self.used.contains(id) && after.map_or(true, |a| *completion > a));
                let Some(&(id, completion)) = pick else {
                    break;
                };
                self.used.insert(id);
                self.last.insert(line.item.clone(), completion);
                latest = latest.max(completion);
            }
        }
        latest
    }

    fn next_machine(&mut self) {
        self.last.clear();
    }
}

/// 撚線目標函數
///
/// 每台機台依序計時：開工 = max(上游閘門, 機台可開工, 前一作業完工) + 換線 + 轉運緩衝，
/// 完工 = 開工 + 加工時間。延遲成本為延遲分鐘加上產品交替懲罰，提前完工分鐘只作次要比較。
pub struct TorcEvaluator<'a> {
    problem: &'a TorcProblem,
    config: &'a AnnealingConfig,
}

impl<'a> TorcEvaluator<'a> {
    pub fn new(problem: &'a TorcProblem, config: &'a AnnealingConfig) -> Self {
        Self { problem, config }
    }

    pub fn problem(&self) -> &'a TorcProblem {
        self.problem
    }

    pub fn config(&self) -> &'a AnnealingConfig {
        self.config
    }

    /// 作業在機台上的加工分鐘
    pub fn processing(&self, op: &TorcOp, machine: &str) -> Result<f64> {
        op.processing
            .get(machine)
            .copied()
            .ok_or_else(|| PlanError::RoutingMissing {
                item: op.item.clone(),
                machine: machine.to_string(),
            })
    }

    /// 機台佇列的計時
    pub fn time_queue(&self, machine: &str, queue: &[PlanId], gate: &mut dyn UpstreamGate) -> Result<Vec<PlanTiming>> {
        let start = self.problem.machine_start(machine)?;
        let setups = self.problem.plant().setup_times();

        let mut timings = Vec::with_capacity(queue.len());
        let mut previous: Option<NaiveDateTime> = None;
        let mut material = start.last_material.clone();
        for (index, &id) in queue.iter().enumerate() {
            let op = self.problem.op(id)?;
            let processing = self.processing(op, machine)?;
            let floor = previous.map_or(start.start, |p| p.max(start.start));
            let ready = gate.gate(op, floor).max(floor);

            let begin = ready
                + minutes(setups.minutes_between(material.as_deref(), &op.material))
                + minutes(processing * self.config.transfer_buffer);
            let completion = begin + minutes(processing);
            timings.push(PlanTiming {
                plan: id,
                machine: machine.to_string(),
                position: index as u32 + 1,
                start: begin,
                completion,
            });
            previous = Some(completion);
            material = Some(op.material.clone());
        }
        Ok(timings)
    }

    /// 單台機台的目標值（退火期間）
    pub fn score(&self, machine: &str, queue: &[PlanId]) -> Result<MachineScore> {
        let timings = self.time_queue(machine, queue, &mut OrderGate::new(self.problem))?;
        self.score_timings(&timings)
    }

    pub fn score_timings(&self, timings: &[PlanTiming]) -> Result<MachineScore> {
        let mut score = MachineScore::default();
        let mut last_item: Option<&str> = None;
        for timing in timings {
            let op = self.problem.op(timing.plan)?;
            let tardiness = tardiness_minutes(timing.completion, op.due_date);
            score.tardiness += tardiness;

            if last_item.is_some_and(|last| last != op.item) {
                let weight = if tardiness > 0.0 {
                    (tardiness / 1000.0).min(0.5)
                } else {
                    0.1
                };
                score.tardiness += self.config.alternation_penalty * weight;
            }
            score.early += earliness_minutes(timing.completion, op.due_date);
            last_item = Some(op.item.as_str());
        }
        Ok(score)
    }

    /// 整個解的各機台目標值
    pub fn score_all<'s>(
        &self,
        queues: impl IntoIterator<Item = (&'s String, &'s Vec<PlanId>)>,
    ) -> Result<Vec<(String, MachineScore)>> {
        queues
            .into_iter()
            .map(|(machine, queue)| Ok((machine.clone(), self.score(machine, queue)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::fixtures::{at, context};
    use crate::scheduling::torc::tests::with_orders;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use wireplan_core::{
        BillOfMaterials, BomLine, Criteria, Item, Machine, PlantData, Routing, RoutingTable, SetupTime,
        SetupTimeTable, ShiftCalendar,
    };

    fn problem(ctx: &PlanningContext) -> TorcProblem {
        TorcProblem::new(ctx, &ShiftCalendar::three_shifts()).unwrap()
    }

    #[test]
    fn test_time_queue_with_buffer() {
        let ctx = with_orders(&[("A", 7), ("A", 7)]);
        let problem = problem(&ctx);
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);

        let timings = evaluator
            .time_queue("B01", &[PlanId(1), PlanId(2)], &mut OrderGate::new(&problem))
            .unwrap();
        // 60 分鐘 × 8% = 4.8 分鐘緩衝
        assert_eq!(timings[0].start, at(6, 16, 0) + minutes(4.8));
        assert_eq!(timings[0].completion, timings[0].start + minutes(60.0));
        assert_eq!(timings[1].start, timings[0].completion + minutes(4.8));
        assert_eq!(timings[1].position, 2);
    }

    #[rstest]
    // 都在交期前完工：無延遲，同產品不罰
    #[case(&[("A", 8), ("A", 8)], 0.0)]
    // 產品交替且無延遲：4000 × 0.1
    #[case(&[("A", 8), ("B", 8)], 400.0)]
    fn test_score_alternation_penalty(#[case] orders: &[(&str, u32)], #[case] expected: f64) {
        let ctx = with_orders(orders);
        let problem = problem(&ctx);
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);

        let score = evaluator.score("B01", &[PlanId(1), PlanId(2)]).unwrap();
        assert!((score.tardiness - expected).abs() < 1e-6);
        assert!(score.early > 0.0);
    }

    #[test]
    fn test_score_late_alternation_scales_with_tardiness() {
        // 交期 6 日 17:00：第一筆 17:04.8 完工（延遲 4.8），第二筆 18:09.6 完工（延遲 69.6）
        let mut ctx = context(super::super::tests::plant(), Criteria::new());
        for name in ["A", "B"] {
            let item = ctx.plant().require_item(name).unwrap().clone();
            let order = ctx.add_order(name, Decimal::from(60), at(6, 17, 0), 1);
            ctx.add_plan(None, &item, Decimal::from(60), order, None);
        }
        let problem = problem(&ctx);
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);

        let score = evaluator.score("B01", &[PlanId(1), PlanId(2)]).unwrap();
        let expected = 4.8 + 69.6 + 4000.0 * (69.6 / 1000.0);
        assert!((score.tardiness - expected).abs() < 1e-6);
        assert_eq!(score.early, 0.0);
    }

    #[test]
    fn test_setup_between_materials() {
        let plant = super::super::tests::plant()
            .with_setup_times(SetupTimeTable::new(vec![SetupTime::new("CU", "AL", Decimal::ONE)]));
        let mut ctx = context(plant, Criteria::new());
        for name in ["A", "C"] {
            let item = ctx.plant().require_item(name).unwrap().clone();
            let order = ctx.add_order(name, Decimal::from(60), at(8, 0, 0), 1);
            ctx.add_plan(None, &item, Decimal::from(60), order, None);
        }
        let problem = problem(&ctx);
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);

        // B02：A 120 分鐘，C 60 分鐘
        let timings = evaluator
            .time_queue("B02", &[PlanId(1), PlanId(2)], &mut OrderGate::new(&problem))
            .unwrap();
        assert_eq!(timings[1].start, timings[0].completion + minutes(60.0) + minutes(4.8));
    }

    /// CABLE ← 2 × STRAND；兩筆 STRAND 分別於 17:00 與 20:00 完工
    fn consumption_context() -> PlanningContext {
        let plant = PlantData::new("P1")
            .with_items(vec![
                Item::new("CABLE", "CU", ProcessStage::Torc),
                Item::new("STRAND", "CU", ProcessStage::Tref),
            ])
            .with_machines(vec![Machine::new("B01", ProcessStage::Torc)])
            .with_routings(RoutingTable::new(vec![Routing::new("CABLE", "B01", Decimal::ONE)]))
            .with_boms(vec![
                BillOfMaterials::new(1, "CABLE", Decimal::ONE).with_line(BomLine::new("STRAND", 2, Decimal::ONE)),
            ]);
        let mut ctx = context(plant, Criteria::new());
        let cable = ctx.plant().require_item("CABLE").unwrap().clone();
        let strand = ctx.plant().require_item("STRAND").unwrap().clone();
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        ctx.add_plan(None, &cable, Decimal::from(10), order, None);
        for hour in [17, 20] {
            let id = ctx.add_plan(Some("CABLE"), &strand, Decimal::ONE, order, Some(BomId(1)));
            ctx.plan_mut(id).unwrap().set_times(at(6, hour - 1, 0), at(6, hour, 0));
        }
        ctx
    }

    #[test]
    fn test_consumption_gate_waits_for_latest_component() {
        let ctx = consumption_context();
        let problem = problem(&ctx);
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);

        let mut gate = ConsumptionGate::new(&ctx, &problem);
        let timings = evaluator.time_queue("B01", &[PlanId(1)], &mut gate).unwrap();
        assert_eq!(timings[0].start, at(6, 20, 0) + minutes(0.8));
        assert_eq!(gate.used().len(), 2);
    }

    #[test]
    fn test_consumption_gate_consumes_finished_components_without_waiting() {
        let ctx = consumption_context();
        let problem = problem(&ctx);
        let op = problem.op(PlanId(1)).unwrap().clone();

        let mut gate = ConsumptionGate::new(&ctx, &problem);
        // 機台 21:00 才可開工：上游都已完工，仍消耗但不等待
        assert_eq!(gate.gate(&op, at(6, 21, 0)), at(6, 21, 0));
        assert_eq!(gate.used().len(), 2);

        // 已用完，下一筆不再等待
        assert_eq!(gate.gate(&op, at(6, 16, 0)), at(6, 16, 0));
    }
}
