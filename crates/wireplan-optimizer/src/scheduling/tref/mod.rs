//! 第二階段（絞線）排程
//!
//! 裝箱產生時間單元後，依工廠變體計時：
//! - 相依模式：各機台首個時間單元依供料模擬決定閘門，機台依最早可開工時間逐台決定；
//!   之後每個時間單元仍須等待同訂單供料給其成員的拉線計劃完工
//! - 簡單模式：各機台循序排程，不受上游限制

pub mod consumption;
pub mod packing;
pub mod sequencing;

pub use consumption::{Cursors, RodConsumption, SupplyDemand};
pub use packing::{apply_packings, CombinationPacking, ItemAffinity, PackedBatch, TrefPacker};
pub use sequencing::{apply_unit_timings, DiameterTrend, TimeUnitSequencer, TimeUnitTiming};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use chrono::NaiveDateTime;
use wireplan_core::{
    Checkpoint, OrderId, PlanId, PlanningContext, PlantVariant, ProcessStage, Result, ShiftCalendar,
    TimeUnitId, TrefConfig,
};

use crate::scheduling::rod::RodSolution;
use crate::{BinPackingSolver, StageOutcome};

/// 第二階段排程器
pub struct TrefScheduler<'a> {
    solver: &'a dyn BinPackingSolver,
    config: &'a TrefConfig,
    calendar: &'a ShiftCalendar,
}

impl<'a> TrefScheduler<'a> {
    pub fn new(solver: &'a dyn BinPackingSolver, config: &'a TrefConfig, calendar: &'a ShiftCalendar) -> Self {
        Self {
            solver,
            config,
            calendar,
        }
    }

    /// 裝箱並建立時間單元，移除未裝入的計劃
    pub fn plan(&self, ctx: &mut PlanningContext, checkpoint: &mut Checkpoint) -> Result<StageOutcome> {
        let start_time = Instant::now();
        if ctx.plan_ids_of(ProcessStage::Tref).is_empty() {
            return Ok(StageOutcome::skipped(ProcessStage::Tref));
        }

        let packings = TrefPacker::new(ctx, self.solver, self.config).pack(checkpoint)?;
        let dropped: usize = packings.iter().map(|p| p.dropped.len()).sum();
        let (units, removed) = apply_packings(ctx, &packings)?;
        let scheduled = ctx.plan_ids_of(ProcessStage::Tref).len();

        tracing::info!(
            "絞線裝箱完成：批次 {} 個、時間單元 {} 個、計劃 {} 筆、移除 {} 筆，耗時 {:?}",
            packings.len(),
            units,
            scheduled,
            removed,
            start_time.elapsed()
        );

        let mut outcome = StageOutcome::new(ProcessStage::Tref, scheduled, removed);
        if dropped > 0 {
            outcome = outcome.with_message(format!("{dropped} 筆絞線計劃無可用機台"));
        }
        Ok(outcome)
    }

    /// 移除供料給已不存在之絞線計劃的拉線計劃，並同步修剪拉線解
    pub fn prune_orphaned_rod_plans(ctx: &mut PlanningContext, rod: &mut RodSolution) -> usize {
        let plant = ctx.plant_arc();
        let tref_keys: BTreeSet<(OrderId, String)> = ctx
            .plans()
            .filter(|p| p.stage == ProcessStage::Tref)
            .map(|p| (p.order, p.item.clone()))
            .collect();

        let orphans: BTreeSet<PlanId> = ctx
            .plans()
            .filter(|p| p.stage == ProcessStage::Rod)
            .filter(|p| {
                p.parent_item.as_ref().is_some_and(|parent| {
                    plant.item(parent).is_some_and(|i| i.process == ProcessStage::Tref)
                        && !tref_keys.contains(&(p.order, parent.clone()))
                })
            })
            .map(|p| p.id)
            .collect();

        if orphans.is_empty() {
            return 0;
        }
        rod.retain_plans(|id| !orphans.contains(&id));
        let removed = ctx.remove_plans(orphans);
        tracing::info!("移除無下游的拉線計劃 {} 筆", removed);
        removed
    }

    /// 排序並計算所有時間單元的時間
    ///
    /// `needs` 為重排階段各時間單元的下游需求時間。
    pub fn schedule(
        &self,
        ctx: &mut PlanningContext,
        variant: PlantVariant,
        rod: &RodSolution,
        needs: Option<&HashMap<TimeUnitId, NaiveDateTime>>,
    ) -> Result<()> {
        let timings = {
            let sequencer = TimeUnitSequencer::new(ctx, self.calendar, self.config.time_unit_buffer);
            let sequencer = match variant {
                PlantVariant::Dependent => sequencer.with_rod_supply(),
                PlantVariant::Simple => sequencer,
            };

            let mut sequences: BTreeMap<String, Vec<TimeUnitId>> = BTreeMap::new();
            for machine in ctx.active_machines(ProcessStage::Tref) {
                let units = ctx.time_units_on(&machine.code);
                if units.is_empty() {
                    continue;
                }
                sequences.insert(machine.code.clone(), sequencer.sequence(&machine.code, &units, needs)?);
            }

            let order = match variant {
                PlantVariant::Dependent => Self::gated_order(ctx, rod, &sequences)?,
                PlantVariant::Simple => sequences.keys().map(|m| (m.clone(), None)).collect(),
            };

            let mut timings = Vec::new();
            for (machine, gate) in order {
                if let Some(units) = sequences.get(&machine) {
                    timings.extend(sequencer.time_machine(&machine, units, gate)?);
                }
            }
            timings
        };

        apply_unit_timings(ctx, &timings)?;
        tracing::debug!("絞線計時完成：時間單元 {} 個", timings.len());
        Ok(())
    }

    /// 相依模式的機台順序與各機台首個時間單元的供料閘門
    ///
    /// 每輪選出閘門最早的機台，並以其消耗後的讀取位置重新評估其餘機台；
    /// 沒有供料需求的機台最後以無閘門方式排程。
    fn gated_order(
        ctx: &PlanningContext,
        rod: &RodSolution,
        sequences: &BTreeMap<String, Vec<TimeUnitId>>,
    ) -> Result<Vec<(String, Option<NaiveDateTime>)>> {
        let consumption = RodConsumption::new(ctx, rod);

        let mut demands: BTreeMap<String, SupplyDemand> = BTreeMap::new();
        for (machine, units) in sequences {
            let Some(&first) = units.first() else { continue };
            let demand = consumption.demand(first)?;
            if !demand.is_empty() {
                demands.insert(machine.clone(), demand);
            }
        }

        let mut pending: BTreeMap<String, NaiveDateTime> = BTreeMap::new();
        let mut advanced: BTreeMap<String, Cursors> = BTreeMap::new();
        for (machine, demand) in &demands {
            let (gate, cursors) = consumption.gate(demand, &Cursors::new())?;
            pending.insert(machine.clone(), gate);
            advanced.insert(machine.clone(), cursors);
        }

        let mut order = Vec::with_capacity(sequences.len());
        while let Some((machine, gate)) = pending
            .iter()
            .min_by_key(|(_, gate)| **gate)
            .map(|(m, g)| (m.clone(), *g))
        {
            pending.remove(&machine);
            let cursors = advanced.remove(&machine).unwrap_or_default();
            order.push((machine, Some(gate)));

            for (other, other_gate) in pending.iter_mut() {
                if let Some(demand) = demands.get(other) {
                    let (gate, next) = consumption.gate(demand, &cursors)?;
                    *other_gate = gate;
                    advanced.insert(other.clone(), next);
                }
            }
        }

        for machine in sequences.keys() {
            if !demands.contains_key(machine) {
                order.push((machine.clone(), None));
            }
        }
        Ok(order)
    }

    /// 各時間單元的下游需求時間：同訂單中以其成員為上層物料的第三階段計劃最早開工時間
    pub fn needs_from_torc(ctx: &PlanningContext) -> HashMap<TimeUnitId, NaiveDateTime> {
        let mut earliest: HashMap<(OrderId, &str), NaiveDateTime> = HashMap::new();
        for plan in ctx.plans().filter(|p| p.stage == ProcessStage::Torc) {
            let Some(start) = plan.start_time else { continue };
            earliest
                .entry((plan.order, plan.item.as_str()))
                .and_modify(|t| *t = (*t).min(start))
                .or_insert(start);
        }

        let mut needs = HashMap::new();
        for tu in ctx.time_units() {
            let need = tu
                .plans
                .iter()
                .filter_map(|id| ctx.plan(*id).ok())
                .filter_map(|p| {
                    p.parent_item
                        .as_deref()
                        .and_then(|parent| earliest.get(&(p.order, parent)).copied())
                })
                .min();
            if let Some(need) = need {
                needs.insert(tu.id, need);
            }
        }
        needs
    }
}
