//! 時間單元排序與計時

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use wireplan_core::{OrderId, PlanError, PlanId, PlanningContext, ProcessStage, Result, ShiftCalendar, TimeUnitId};

use crate::timing::{minutes, minutes_between, processing_minutes, PlanTiming};

/// 線徑排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiameterTrend {
    Ascending,
    Descending,
}

/// 時間單元的複合排序鍵
#[derive(Debug, Clone)]
struct SortKey {
    need: Option<NaiveDateTime>,
    diameter: Option<f64>,
    material: Option<String>,
    due_offset: f64,
    weight: f64,
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        let need = match (self.need, other.need) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        need.then_with(|| match (self.diameter, other.diameter) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        })
        .then_with(|| self.material.cmp(&other.material))
        .then_with(|| self.due_offset.total_cmp(&other.due_offset))
        .then_with(|| self.weight.total_cmp(&other.weight))
    }
}

/// 時間單元計時結果
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnitTiming {
    pub unit: TimeUnitId,
    pub start: NaiveDateTime,
    pub completion: NaiveDateTime,
    pub plans: Vec<PlanTiming>,
}

/// 時間單元排序與計時器
pub struct TimeUnitSequencer<'a> {
    ctx: &'a PlanningContext,
    calendar: &'a ShiftCalendar,
    buffer: f64,
    /// （訂單, 絞線物料）→ 供料拉線計劃的最晚完工；僅相依模式
    supply: Option<HashMap<(OrderId, &'a str), NaiveDateTime>>,
}

impl<'a> TimeUnitSequencer<'a> {
    pub fn new(ctx: &'a PlanningContext, calendar: &'a ShiftCalendar, buffer: f64) -> Self {
        Self {
            ctx,
            calendar,
            buffer,
            supply: None,
        }
    }

    /// 建構器模式：每個時間單元都須等待同訂單供料給其成員的拉線計劃完工
    pub fn with_rod_supply(mut self) -> Self {
        let ctx = self.ctx;
        let mut supply: HashMap<(OrderId, &'a str), NaiveDateTime> = HashMap::new();
        for plan in ctx.plans().filter(|p| p.stage == ProcessStage::Rod) {
            let (Some(parent), Some(completion)) = (plan.parent_item.as_deref(), plan.completion_time) else {
                continue;
            };
            supply
                .entry((plan.order, parent))
                .and_modify(|t| *t = (*t).max(completion))
                .or_insert(completion);
        }
        self.supply = Some(supply);
        self
    }

    /// 時間單元成員的拉線供料最晚完工
    fn supply_ready(&self, plans: &[PlanId]) -> Result<Option<NaiveDateTime>> {
        let Some(supply) = &self.supply else {
            return Ok(None);
        };
        let mut ready = None;
        for &id in plans {
            let plan = self.ctx.plan(id)?;
            if let Some(&completion) = supply.get(&(plan.order, plan.item.as_str())) {
                ready = ready.max(Some(completion));
            }
        }
        Ok(ready)
    }

    /// 依機台上一筆歷史物料的線徑決定延續方向
    ///
    /// 無歷史時由粗到細；歷史線徑落在本批範圍內時往較近的一端延續。
    pub fn diameter_trend(&self, machine: &str, units: &[TimeUnitId]) -> DiameterTrend {
        let plant = self.ctx.plant();
        let Some(last) = self
            .ctx
            .history()
            .last_plan(machine)
            .and_then(|p| plant.item(&p.item))
        else {
            return DiameterTrend::Descending;
        };

        let diameters: Vec<i64> = units
            .iter()
            .filter_map(|id| self.ctx.time_unit(*id))
            .flat_map(|tu| tu.plans.iter())
            .filter_map(|id| self.ctx.item_of(*id).ok())
            .map(|item| item.diameter_key())
            .collect();
        let (Some(&min), Some(&max)) = (diameters.iter().min(), diameters.iter().max()) else {
            return DiameterTrend::Descending;
        };

        let last = last.diameter_key();
        if min < last && last < max {
            if max - last < last - min {
                DiameterTrend::Descending
            } else {
                DiameterTrend::Ascending
            }
        } else if last >= max {
            DiameterTrend::Descending
        } else {
            DiameterTrend::Ascending
        }
    }

    fn sort_key(
        &self,
        unit: TimeUnitId,
        trend: Option<DiameterTrend>,
        needs: Option<&HashMap<TimeUnitId, NaiveDateTime>>,
    ) -> Result<SortKey> {
        let tu = self
            .ctx
            .time_unit(unit)
            .ok_or_else(|| PlanError::InvariantViolation(format!("找不到時間單元 {unit}")))?;
        let count = tu.plans.len().max(1) as f64;

        let mut diameter_sum = 0.0;
        let mut due_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut materials = BTreeSet::new();
        for &id in &tu.plans {
            let plan = self.ctx.plan(id)?;
            let item = self.ctx.item_of(id)?;
            let order = self.ctx.order(plan.order)?;
            diameter_sum += item.diameter_key() as f64;
            due_sum += minutes_between(order.due_date, self.ctx.current_time);
            weight_sum += order.weight as f64;
            materials.insert(item.material_type.clone());
        }

        let average_diameter = diameter_sum / count;
        Ok(SortKey {
            need: needs.and_then(|n| n.get(&unit).copied()),
            diameter: trend.map(|t| match t {
                DiameterTrend::Ascending => average_diameter,
                DiameterTrend::Descending => -average_diameter,
            }),
            material: if self.ctx.criteria().group_by_material {
                materials.into_iter().next()
            } else {
                None
            },
            due_offset: due_sum / count,
            weight: -(weight_sum / count),
        })
    }

    /// 排序機台上的時間單元
    ///
    /// 順序鍵：需求時間（僅重排階段）、線徑延續、主要材質、平均交期、平均權重（高者先）。
    pub fn sequence(
        &self,
        machine: &str,
        units: &[TimeUnitId],
        needs: Option<&HashMap<TimeUnitId, NaiveDateTime>>,
    ) -> Result<Vec<TimeUnitId>> {
        let trend = self
            .ctx
            .criteria()
            .diameter_trend
            .then(|| self.diameter_trend(machine, units));

        let mut keyed = Vec::with_capacity(units.len());
        for &unit in units {
            keyed.push((self.sort_key(unit, trend, needs)?, unit));
        }
        keyed.sort_by(|a, b| a.0.compare(&b.0));
        Ok(keyed.into_iter().map(|(_, unit)| unit).collect())
    }

    /// 依序計算機台上各時間單元的時間
    ///
    /// 首個時間單元自機台可開工時間（與供料閘門取較晚者）開始，之後接續前一單元完工
    /// 加換線時間；設有拉線供料時，每個單元另須等待其成員的拉線計劃完工。
    /// 開工另加最長成員加工時間的上料緩衝。成員計劃同時開工，各自依加工時間完工。
    pub fn time_machine(
        &self,
        machine: &str,
        ordered: &[TimeUnitId],
        gate: Option<NaiveDateTime>,
    ) -> Result<Vec<TimeUnitTiming>> {
        let setups = self.ctx.plant().setup_times();
        let machine_start = self
            .calendar
            .machine_start(self.ctx.history().last_time_unit_completion(machine), self.ctx.current_time);

        let mut timings = Vec::with_capacity(ordered.len());
        let mut previous: Option<(NaiveDateTime, String)> = None;
        for &unit in ordered {
            let tu = self
                .ctx
                .time_unit(unit)
                .ok_or_else(|| PlanError::InvariantViolation(format!("找不到時間單元 {unit}")))?;
            let Some(&first) = tu.plans.first() else {
                continue;
            };
            let material = self.ctx.item_of(first)?.material_type.clone();

            let mut processing = Vec::with_capacity(tu.plans.len());
            for &id in &tu.plans {
                processing.push((id, processing_minutes(self.ctx, machine, id)?));
            }
            let longest = processing.iter().map(|(_, m)| *m).fold(0.0, f64::max);

            let mut start = match &previous {
                Some((completion, previous_material)) => {
                    *completion + minutes(setups.hours(previous_material, &material) * 60.0)
                }
                None => gate.map_or(machine_start, |g| g.max(machine_start)),
            };
            if let Some(ready) = self.supply_ready(&tu.plans)? {
                start = start.max(ready);
            }
            start += minutes(longest * self.buffer);
            let completion = start + minutes(longest);

            let plans = processing
                .into_iter()
                .enumerate()
                .map(|(position, (id, mins))| PlanTiming {
                    plan: id,
                    machine: machine.to_string(),
                    position: position as u32 + 1,
                    start,
                    completion: start + minutes(mins),
                })
                .collect();

            timings.push(TimeUnitTiming {
                unit,
                start,
                completion,
                plans,
            });
            previous = Some((completion, material));
        }
        Ok(timings)
    }
}

/// 將時間單元計時寫回上下文
pub fn apply_unit_timings(ctx: &mut PlanningContext, timings: &[TimeUnitTiming]) -> Result<()> {
    for timing in timings {
        let tu = ctx
            .time_unit_mut(timing.unit)
            .ok_or_else(|| PlanError::InvariantViolation(format!("找不到時間單元 {}", timing.unit)))?;
        tu.start_time = Some(timing.start);
        tu.completion_time = Some(timing.completion);
        crate::timing::apply_timings(ctx, &timing.plans)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::fixtures::{at, context};
    use rust_decimal::Decimal;
    use wireplan_core::{
        CommittedPlan, Criteria, Item, Machine, MachineHistory, OrderId, PlanId, PlantData, ProcessStage,
        Routing, RoutingTable, SetupTime, SetupTimeTable,
    };

    fn plant() -> PlantData {
        PlantData::new("P1")
            .with_items(vec![
                Item::new("THIN", "CU", ProcessStage::Tref).with_diameter(Decimal::new(3, 1)),
                Item::new("MID", "CU", ProcessStage::Tref).with_diameter(Decimal::new(5, 1)),
                Item::new("THICK", "AL", ProcessStage::Tref).with_diameter(Decimal::new(9, 1)),
            ])
            .with_machines(vec![Machine::new("T01", ProcessStage::Tref).with_input(10)])
            .with_routings(RoutingTable::new(vec![
                Routing::new("THIN", "T01", Decimal::ONE),
                Routing::new("MID", "T01", Decimal::ONE),
                Routing::new("THICK", "T01", Decimal::from(2)),
            ]))
            .with_setup_times(SetupTimeTable::new(vec![SetupTime::new("CU", "AL", Decimal::new(5, 1))]))
    }

    /// 每個物料一個時間單元，交期依序為 8、9、10 日
    fn setup(criteria: Criteria) -> (PlanningContext, Vec<TimeUnitId>) {
        let mut ctx = context(plant(), criteria);
        let mut units = Vec::new();
        for (day, name) in [(8, "THIN"), (9, "THICK"), (10, "MID")] {
            let item = ctx.plant().require_item(name).unwrap().clone();
            let order = ctx.add_order(name, Decimal::from(10), at(day, 0, 0), 1);
            let id = ctx.add_plan(None, &item, Decimal::from(10), order, None);
            units.push(ctx.add_time_unit("T01", vec![id]));
        }
        (ctx, units)
    }

    #[test]
    fn test_sequence_by_due_date() {
        let (ctx, units) = setup(Criteria::new());
        let calendar = ShiftCalendar::three_shifts();
        let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);
        assert_eq!(sequencer.sequence("T01", &units, None).unwrap(), units);
    }

    #[test]
    fn test_sequence_with_descending_diameter() {
        let (ctx, units) = setup(Criteria::new().with_diameter_trend(true));
        let calendar = ShiftCalendar::three_shifts();
        let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);
        // 無歷史：由粗到細
        let order = sequencer.sequence("T01", &units, None).unwrap();
        assert_eq!(order, vec![units[1], units[2], units[0]]);
    }

    #[test]
    fn test_diameter_trend_follows_history() {
        let (ctx, units) = setup(Criteria::new().with_diameter_trend(true));
        let history = MachineHistory::from_records(
            vec![CommittedPlan {
                machine: "T01".to_string(),
                item: "THIN".to_string(),
                completion_time: at(5, 0, 0),
            }],
            Vec::new(),
        );
        let ctx = ctx.with_history(history);
        let calendar = ShiftCalendar::three_shifts();
        let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);

        assert_eq!(sequencer.diameter_trend("T01", &units), DiameterTrend::Ascending);
        assert_eq!(sequencer.diameter_trend("T99", &units), DiameterTrend::Descending);
    }

    #[test]
    fn test_needs_take_priority() {
        let (ctx, units) = setup(Criteria::new());
        let calendar = ShiftCalendar::three_shifts();
        let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);
        let needs: HashMap<TimeUnitId, NaiveDateTime> = [(units[2], at(7, 0, 0))].into_iter().collect();

        let order = sequencer.sequence("T01", &units, Some(&needs)).unwrap();
        assert_eq!(order[0], units[2]);
    }

    #[test]
    fn test_time_machine_with_buffer_and_setup() {
        let (ctx, units) = setup(Criteria::new());
        let calendar = ShiftCalendar::three_shifts();
        let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);

        let timings = sequencer.time_machine("T01", &units, None).unwrap();
        assert_eq!(timings.len(), 3);

        // 首單元：16:00 + 16% × 10 分鐘
        assert_eq!(timings[0].start, at(6, 16, 0) + minutes(1.6));
        assert_eq!(timings[0].completion, timings[0].start + minutes(10.0));

        // CU → AL 換線 0.5 小時，THICK 週期 2 → 20 分鐘
        assert_eq!(timings[1].start, timings[0].completion + minutes(30.0) + minutes(3.2));
        assert_eq!(timings[1].completion, timings[1].start + minutes(20.0));

        // AL → CU 無設定，不計換線
        assert_eq!(timings[2].start, timings[1].completion + minutes(1.6));
    }

    #[test]
    fn test_gate_delays_first_unit() {
        let (mut ctx, units) = setup(Criteria::new());
        let calendar = ShiftCalendar::three_shifts();
        let timings = {
            let sequencer = TimeUnitSequencer::new(&ctx, &calendar, 0.16);
            sequencer.time_machine("T01", &units[..1], Some(at(7, 3, 0))).unwrap()
        };
        assert_eq!(timings[0].start, at(7, 3, 0) + minutes(1.6));

        apply_unit_timings(&mut ctx, &timings).unwrap();
        let tu = ctx.time_unit(units[0]).unwrap();
        assert_eq!(tu.start_time, Some(timings[0].start));
        let plan = ctx.plan(PlanId(1)).unwrap();
        assert_eq!(plan.order, OrderId(1));
        assert_eq!(plan.start_time, tu.start_time);
        assert_eq!(plan.position, Some(1));
    }
}
