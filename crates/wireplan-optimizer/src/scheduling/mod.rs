//! 三階段排程
//!
//! 相依展開 → 拉線 → 絞線（前推）→ 撚線退火 → 絞線（依下游需求重排）→ 撚線最終計時。
//! 整個流程在上下文的副本上執行，成功後才寫回；中止或失敗時原上下文不變。

pub mod rod;
pub mod torc;
pub mod tref;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;
use wireplan_calc::{DependencyExpander, ExpansionReport};
use wireplan_core::{
    CancellationToken, Checkpoint, PlanError, PlanningContext, PlantVariant, Result, SchedulerConfig,
};

use crate::{BinPackingSolver, MilpBinPacker, StageOutcome};
use rod::RodScheduler;
use torc::TorcScheduler;
use tref::TrefScheduler;

/// 成功排程的摘要
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 排程ID
    pub run_id: Uuid,

    /// 訂單將逾期的產品名稱（不重複）
    pub late_products: Vec<String>,

    /// 相依展開報告（無途程、無 BOM）
    pub report: ExpansionReport,

    /// 各階段結果
    pub stages: Vec<StageOutcome>,
}

/// 排程結果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// 使用者中止，上下文未變更
    Aborted,
    /// 非預期錯誤，上下文未變更
    Failed(String),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn late_products(&self) -> Option<&[String]> {
        self.summary().map(|s| s.late_products.as_slice())
    }
}

/// 排程器
pub struct Scheduler {
    solver: Arc<dyn BinPackingSolver>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// 使用預設的 MILP 裝箱求解器
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            solver: Arc::new(MilpBinPacker),
            config,
        }
    }

    /// 建構器模式：替換裝箱求解器
    pub fn with_solver(mut self, solver: Arc<dyn BinPackingSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 執行一次完整排程
    pub fn run(&self, ctx: &mut PlanningContext, variant: PlantVariant, token: &CancellationToken) -> RunOutcome {
        if token.is_cancelled() {
            tracing::info!("排程 {} 開始前已被中止", ctx.run_id);
            return RunOutcome::Aborted;
        }

        let mut working = ctx.clone();
        match self.execute(&mut working, variant, token) {
            Ok(summary) => {
                *ctx = working;
                RunOutcome::Completed(summary)
            }
            Err(PlanError::Cancelled) => {
                tracing::info!("排程 {} 已中止，捨棄所有結果", ctx.run_id);
                RunOutcome::Aborted
            }
            Err(err) => {
                tracing::error!("排程 {} 失敗: {}", ctx.run_id, err);
                RunOutcome::Failed(err.to_string())
            }
        }
    }

    fn execute(
        &self,
        ctx: &mut PlanningContext,
        variant: PlantVariant,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let start_time = Instant::now();
        let calendar = self.config.calendar();
        let mut checkpoint = Checkpoint::new(token.clone(), self.config.cancel_check_interval);
        tracing::info!("開始排程 {}（{:?}）", ctx.run_id, variant);

        // 1. 相依展開
        let report = DependencyExpander::expand_all(ctx)?;
        checkpoint.check()?;

        // 2. 拉線
        let mut stages = Vec::with_capacity(3);
        let (mut rod, rod_outcome) = RodScheduler::run(ctx, &self.config.rod, &calendar, &mut checkpoint)?;
        stages.push(rod_outcome);

        // 3. 絞線裝箱與前推計時
        let tref = TrefScheduler::new(self.solver.as_ref(), &self.config.tref, &calendar);
        stages.push(tref.plan(ctx, &mut checkpoint)?);
        if TrefScheduler::prune_orphaned_rod_plans(ctx, &mut rod) > 0 {
            RodScheduler::retime(ctx, &rod, &self.config.rod, &calendar)?;
        }
        tref.schedule(ctx, variant, &rod, None)?;
        checkpoint.check()?;

        // 4. 撚線退火
        let torc = TorcScheduler::new(&self.config.torc, &calendar);
        let torc_run = torc.optimize(ctx, variant, &mut checkpoint)?;

        // 5. 絞線依撚線需求重排
        let needs = TrefScheduler::needs_from_torc(ctx);
        tref.schedule(ctx, variant, &rod, Some(&needs))?;
        checkpoint.check()?;

        // 6. 撚線最終計時
        stages.push(torc.finalize(ctx, &torc_run)?);

        ctx.refresh_order_completions();
        validate_schedule(ctx)?;
        let late_products = ctx.late_products();

        tracing::info!(
            "排程 {} 完成：計劃 {} 筆、時間單元 {} 筆、逾期產品 {} 項，耗時 {:?}",
            ctx.run_id,
            ctx.plan_count(),
            ctx.time_units().count(),
            late_products.len(),
            start_time.elapsed()
        );
        Ok(RunSummary {
            run_id: ctx.run_id,
            late_products,
            report,
            stages,
        })
    }
}

/// 檢查排程結果：完工不早於開工，時間單元不超過機台槽位
fn validate_schedule(ctx: &PlanningContext) -> Result<()> {
    for plan in ctx.plans() {
        if let (Some(st), Some(cot)) = (plan.start_time, plan.completion_time) {
            if cot < st {
                return Err(PlanError::InvariantViolation(format!(
                    "計劃 {} 完工 {} 早於開工 {}",
                    plan.id, cot, st
                )));
            }
        }
    }

    let plant = ctx.plant();
    for tu in ctx.time_units() {
        let machine = plant
            .machine(&tu.machine)
            .ok_or_else(|| PlanError::MachineNotFound(tu.machine.clone()))?;
        if tu.plans.len() > machine.output as usize {
            return Err(PlanError::InvariantViolation(format!(
                "時間單元 {} 有 {} 筆計劃，超過機台 {} 槽位 {}",
                tu.id,
                tu.plans.len(),
                machine.code,
                machine.output
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::fixtures::{at, context};
    use crate::timing::minutes;
    use crate::{PackingAssignment, PackingProblem};
    use rust_decimal::Decimal;
    use wireplan_core::{Criteria, Item, Machine, PlanId, PlantData, ProcessStage, Routing, RoutingTable};

    fn rod_only(due_day: u32, due_hour: u32) -> PlanningContext {
        let plant = PlantData::new("P1")
            .with_items(vec![Item::new("ROD-A", "CU", ProcessStage::Rod)])
            .with_machines(vec![Machine::new("R01", ProcessStage::Rod)])
            .with_routings(RoutingTable::new(vec![Routing::new("ROD-A", "R01", Decimal::ONE)]));
        let mut ctx = context(plant, Criteria::new());
        ctx.add_order("ROD-A", Decimal::from(60), at(due_day, due_hour, 0), 1);
        ctx
    }

    struct FailingSolver;

    impl BinPackingSolver for FailingSolver {
        fn solve(&self, _problem: &PackingProblem) -> Result<Option<PackingAssignment>> {
            Err(PlanError::Solver("無法連線".to_string()))
        }
    }

    #[test]
    fn test_single_stage_run_completes() {
        let mut ctx = rod_only(7, 0);
        let outcome = Scheduler::new(SchedulerConfig::default()).run(
            &mut ctx,
            PlantVariant::Simple,
            &CancellationToken::new(),
        );

        let summary = outcome.summary().unwrap();
        assert!(summary.late_products.is_empty());
        assert_eq!(summary.stages.len(), 3);

        let plan = ctx.plan(PlanId(1)).unwrap();
        assert_eq!(plan.machine.as_deref(), Some("R01"));
        assert_eq!(plan.start_time, Some(at(6, 16, 0) + minutes(4.8)));
        assert_eq!(plan.completion_time, Some(at(6, 17, 4) + minutes(0.8)));
    }

    #[test]
    fn test_late_products_reported() {
        let mut ctx = rod_only(6, 12);
        let outcome = Scheduler::new(SchedulerConfig::default()).run(
            &mut ctx,
            PlantVariant::Simple,
            &CancellationToken::new(),
        );
        assert_eq!(outcome.late_products(), Some(&["ROD-A".to_string()][..]));
    }

    #[test]
    fn test_cancelled_before_start_leaves_context_unchanged() {
        let mut ctx = rod_only(7, 0);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = Scheduler::new(SchedulerConfig::default()).run(&mut ctx, PlantVariant::Dependent, &token);
        assert!(matches!(outcome, RunOutcome::Aborted));
        assert_eq!(ctx.plan_count(), 0);
        assert_eq!(ctx.time_units().count(), 0);
    }

    #[test]
    fn test_invalid_config_fails_without_changes() {
        let mut ctx = rod_only(7, 0);
        let config = SchedulerConfig {
            cancel_check_interval: 0,
            ..SchedulerConfig::default()
        };

        let outcome = Scheduler::new(config).run(&mut ctx, PlantVariant::Simple, &CancellationToken::new());
        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(ctx.plan_count(), 0);
    }

    #[test]
    fn test_solver_error_is_reported_as_failure() {
        let plant = PlantData::new("P1")
            .with_items(vec![Item::new("STRAND", "CU", ProcessStage::Tref).with_input(7)])
            .with_machines(vec![Machine::new("T01", ProcessStage::Tref).with_input(14).with_output(2)])
            .with_routings(RoutingTable::new(vec![Routing::new("STRAND", "T01", Decimal::ONE)]));
        let mut ctx = context(plant, Criteria::new());
        ctx.add_order("STRAND", Decimal::from(10), at(7, 0, 0), 1);

        let outcome = Scheduler::new(SchedulerConfig::default())
            .with_solver(Arc::new(FailingSolver))
            .run(&mut ctx, PlantVariant::Simple, &CancellationToken::new());
        match outcome {
            RunOutcome::Failed(message) => assert!(message.contains("無法連線")),
            other => panic!("預期失敗，實際為 {other:?}"),
        }
        assert_eq!(ctx.plan_count(), 0);
    }
}
