//! 第二階段裝箱
//!
//! 訂單依交期分批（每批至多 `batch_size` 筆），批內列舉替代 BOM 組合；
//! 每個組合反覆呼叫裝箱求解器，直到所有計劃都被裝入或捨棄。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::prelude::ToPrimitive;
use wireplan_core::{
    BomId, Checkpoint, OrderId, PlanError, PlanId, PlanningContext, ProcessStage, Result, TrefConfig,
};

use crate::timing::processing_minutes;
use crate::{BinPackingSolver, CapacityPlanner, Combinations, PackingProblem};

/// 物料與機台的親和記錄：物料第一次被裝入的機台，之後優先裝入同一台
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemAffinity {
    assignments: BTreeMap<String, String>,
}

impl ItemAffinity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine_of(&self, item: &str) -> Option<&str> {
        self.assignments.get(item).map(String::as_str)
    }

    /// 只記錄第一次
    pub fn record(&mut self, item: &str, machine: &str) {
        self.assignments
            .entry(item.to_string())
            .or_insert_with(|| machine.to_string());
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// 一次求解的結果：每台機台一組計劃（日後成為一個時間單元）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedBatch {
    pub allocations: Vec<(String, Vec<PlanId>)>,
    pub weight: f64,
    pub value: f64,
}

impl PackedBatch {
    pub fn plan_ids(&self) -> impl Iterator<Item = PlanId> + '_ {
        self.allocations.iter().flat_map(|(_, ids)| ids.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.iter().all(|(_, ids)| ids.is_empty())
    }
}

/// 一個組合的裝箱結果
#[derive(Debug, Clone, Default)]
pub struct CombinationPacking {
    pub batches: Vec<PackedBatch>,
    pub weight: f64,
    pub value: f64,
    /// 求解次數
    pub iterations: usize,
    /// 無法裝箱而捨棄的計劃
    pub dropped: Vec<PlanId>,
    /// 裝箱後的親和記錄
    pub affinity: ItemAffinity,
}

impl CombinationPacking {
    pub fn plan_ids(&self) -> BTreeSet<PlanId> {
        self.batches.iter().flat_map(PackedBatch::plan_ids).collect()
    }

    /// 價值較高者勝；價值相同時求解次數較少或重量較高者勝
    pub fn is_better_than(&self, other: &CombinationPacking) -> bool {
        if self.value > other.value + f64::EPSILON {
            return true;
        }
        (self.value - other.value).abs() <= f64::EPSILON
            && (self.iterations < other.iterations || self.weight > other.weight)
    }
}

struct Bin {
    code: String,
    capacity: f64,
    slots: u32,
}

/// 單一訂單的第二階段計劃
struct OrderGroup {
    fixed: Vec<PlanId>,
    alternatives: Vec<Vec<Vec<PlanId>>>,
}

/// 第二階段裝箱器
pub struct TrefPacker<'a> {
    ctx: &'a PlanningContext,
    solver: &'a dyn BinPackingSolver,
    config: &'a TrefConfig,
    bins: Vec<Bin>,
}

impl<'a> TrefPacker<'a> {
    pub fn new(ctx: &'a PlanningContext, solver: &'a dyn BinPackingSolver, config: &'a TrefConfig) -> Self {
        let bins = ctx
            .active_machines(ProcessStage::Tref)
            .into_iter()
            .map(|m| Bin {
                code: m.code.clone(),
                capacity: m.input as f64,
                slots: m.output,
            })
            .collect();
        Self {
            ctx,
            solver,
            config,
            bins,
        }
    }

    /// 逐批列舉組合，回傳每批的最佳裝箱
    pub fn pack(&self, checkpoint: &mut Checkpoint) -> Result<Vec<CombinationPacking>> {
        let orders = self.order_groups()?;
        let mut affinity = ItemAffinity::new();
        let mut results = Vec::new();

        for (batch_index, chunk) in orders.chunks(self.config.batch_size.max(1)).enumerate() {
            let groups: Vec<(usize, &Vec<Vec<PlanId>>)> = chunk
                .iter()
                .enumerate()
                .flat_map(|(order_index, order)| order.alternatives.iter().map(move |g| (order_index, g)))
                .collect();
            let sizes: Vec<usize> = groups.iter().map(|(_, g)| g.len()).collect();
            tracing::debug!(
                "絞線第 {} 批：訂單 {} 筆，組合數 {:?}",
                batch_index + 1,
                chunk.len(),
                Combinations::count_of(&sizes)
            );

            let mut best: Option<CombinationPacking> = None;
            let mut stale = 0usize;
            for combination in Combinations::new(sizes) {
                checkpoint.tick()?;

                let mut plans = Vec::new();
                for (order_index, order) in chunk.iter().enumerate() {
                    plans.extend(order.fixed.iter().copied());
                    for ((owner, group), choice) in groups.iter().zip(&combination) {
                        if *owner == order_index {
                            plans.extend(group[*choice].iter().copied());
                        }
                    }
                }

                let candidate = self.pack_combination(&plans, affinity.clone(), checkpoint)?;
                let replace = best.as_ref().map_or(true, |b| candidate.is_better_than(b));
                if replace {
                    best = Some(candidate);
                    stale = 0;
                } else {
                    stale += 1;
                    if stale >= self.config.max_no_improvement {
                        break;
                    }
                }
            }

            if let Some(best) = best {
                affinity = best.affinity.clone();
                results.push(best);
            }
        }

        Ok(results)
    }

    /// 訂單依交期排序；每筆訂單的計劃依上層物料分組，組內依 BOM 版本分為替代方案
    fn order_groups(&self) -> Result<Vec<OrderGroup>> {
        let mut orders: Vec<(OrderId, chrono::NaiveDateTime)> =
            self.ctx.orders().map(|o| (o.id, o.due_date)).collect();
        orders.sort_by_key(|(_, due)| *due);

        let mut by_order: HashMap<OrderId, (Vec<PlanId>, BTreeMap<String, BTreeMap<BomId, Vec<PlanId>>>)> =
            HashMap::new();
        for id in self.ctx.plan_ids_of(ProcessStage::Tref) {
            let plan = self.ctx.plan(id)?;
            let entry = by_order.entry(plan.order).or_default();
            match (&plan.parent_item, plan.bom) {
                (Some(parent), Some(bom)) => entry
                    .1
                    .entry(parent.clone())
                    .or_default()
                    .entry(bom)
                    .or_default()
                    .push(id),
                _ => entry.0.push(id),
            }
        }

        Ok(orders
            .into_iter()
            .filter_map(|(id, _)| by_order.remove(&id))
            .map(|(fixed, parents)| OrderGroup {
                fixed,
                alternatives: parents
                    .into_values()
                    .map(|boms| boms.into_values().collect())
                    .collect(),
            })
            .collect())
    }

    /// 反覆求解直到組合內的計劃全部裝入或捨棄
    pub fn pack_combination(
        &self,
        plans: &[PlanId],
        affinity: ItemAffinity,
        checkpoint: &mut Checkpoint,
    ) -> Result<CombinationPacking> {
        let mut packing = CombinationPacking {
            affinity,
            ..CombinationPacking::default()
        };
        let mut remaining: Vec<PlanId> = plans.to_vec();
        let mut running: BTreeMap<String, f64> = self.bins.iter().map(|b| (b.code.clone(), 0.0)).collect();
        let mut excluded: BTreeSet<String> = BTreeSet::new();

        while let Some(&first) = remaining.first() {
            checkpoint.tick()?;

            // 所有剩餘物料都只能上被排除的機台時，本輪暫停排除
            let saved = if self.all_blocked(&remaining, &excluded)? {
                Some(std::mem::take(&mut excluded))
            } else {
                None
            };

            let material = self.ctx.item_of(first)?.material_type.clone();
            let mut candidates = Vec::new();
            for &id in &remaining {
                if self.ctx.item_of(id)?.material_type == material {
                    candidates.push(id);
                }
            }

            packing.iterations += 1;
            match self.solve_once(&candidates, &packing.affinity, &excluded)? {
                Some(batch) if !batch.is_empty() => {
                    for (machine, ids) in &batch.allocations {
                        for &id in ids {
                            packing.affinity.record(&self.ctx.plan(id)?.item, machine);
                            *running.entry(machine.clone()).or_default() +=
                                processing_minutes(self.ctx, machine, id)?;
                        }
                    }
                    let packed: BTreeSet<PlanId> = batch.plan_ids().collect();
                    remaining.retain(|id| !packed.contains(id));
                    packing.weight += batch.weight;
                    packing.value += batch.value;
                    packing.batches.push(batch);
                    excluded = CapacityPlanner::overloaded(&running);
                }
                _ if !excluded.is_empty() => {
                    excluded.clear();
                    continue;
                }
                _ => {
                    tracing::warn!("材質 {} 的 {} 筆絞線計劃無法裝箱，已捨棄", material, candidates.len());
                    remaining.retain(|id| !candidates.contains(id));
                    packing.dropped.extend(candidates);
                    if let Some(saved) = saved {
                        excluded = saved;
                    }
                }
            }
        }

        Ok(packing)
    }

    /// 每個剩餘物料是否都沒有未被排除的可用機台
    fn all_blocked(&self, remaining: &[PlanId], excluded: &BTreeSet<String>) -> Result<bool> {
        if excluded.is_empty() {
            return Ok(false);
        }
        let routings = self.ctx.plant().routings();
        for &id in remaining {
            let item = &self.ctx.plan(id)?.item;
            let open = self.bins.iter().any(|bin| {
                !excluded.contains(&bin.code)
                    && routings
                        .cycle_time(&bin.code, item)
                        .is_some_and(|ct| ct > rust_decimal::Decimal::ZERO)
            });
            if open {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 建立並求解一次裝箱問題
    ///
    /// 每台機台只允許本次候選中最常見的線徑；物料已有親和機台時只允許該機台，
    /// 若因此沒有任何配對則忽略親和記錄。
    fn solve_once(
        &self,
        candidates: &[PlanId],
        affinity: &ItemAffinity,
        excluded: &BTreeSet<String>,
    ) -> Result<Option<PackedBatch>> {
        let plant = self.ctx.plant();
        let routings = plant.routings();

        let mut items = Vec::with_capacity(candidates.len());
        for &id in candidates {
            items.push(self.ctx.item_of(id)?);
        }

        let pairs_for = |use_affinity: bool| -> Vec<(usize, usize, f64)> {
            let mut pairs = Vec::new();
            for (i, item) in items.iter().enumerate() {
                for (b, bin) in self.bins.iter().enumerate() {
                    let Some(ct) = routings.cycle_time(&bin.code, &item.name).and_then(|ct| ct.to_f64()) else {
                        continue;
                    };
                    if ct <= 0.0 || excluded.contains(&bin.code) {
                        continue;
                    }
                    if use_affinity && affinity.machine_of(&item.name).is_some_and(|m| m != bin.code) {
                        continue;
                    }
                    pairs.push((i, b, ct));
                }
            }
            pairs
        };

        let mut pairs = pairs_for(true);
        if pairs.is_empty() {
            pairs = pairs_for(false);
        }
        if pairs.is_empty() {
            return Ok(None);
        }

        // 每台機台的主要線徑（出現次數嚴格較多才更換）
        let mut counts: HashMap<usize, HashMap<i64, usize>> = HashMap::new();
        let mut dominant: HashMap<usize, i64> = HashMap::new();
        for &(i, b, _) in &pairs {
            let diameter = items[i].diameter_key();
            let bin_counts = counts.entry(b).or_default();
            *bin_counts.entry(diameter).or_default() += 1;
            let count = bin_counts[&diameter];
            match dominant.get(&b) {
                Some(current) if bin_counts.get(current).copied().unwrap_or(0) >= count => {}
                _ => {
                    dominant.insert(b, diameter);
                }
            }
        }

        let mut problem = PackingProblem::new(
            items.iter().map(|item| item.input as f64).collect(),
            self.bins.iter().map(|b| b.capacity).collect(),
            self.bins.iter().map(|b| b.slots).collect(),
        );
        let weight_by_cycle_time = self.ctx.criteria().weight_by_cycle_time;
        for &(i, b, ct) in &pairs {
            if dominant.get(&b) != Some(&items[i].diameter_key()) {
                continue;
            }
            let weight = routings.weight(&self.bins[b].code, &items[i].name).unwrap_or(0) as f64;
            let value = if weight_by_cycle_time {
                weight / (ct * 100.0) * items[i].input as f64
            } else {
                weight
            };
            problem.allow(i, b, value);
        }

        let Some(assignment) = self.solver.solve(&problem)? else {
            return Ok(None);
        };

        let mut assigned = assignment.assigned.clone();
        assigned.sort_by_key(|(i, b)| (*b, *i));

        let mut batch = PackedBatch {
            value: assignment.objective,
            ..PackedBatch::default()
        };
        for (i, b) in assigned {
            let code = &self.bins[b].code;
            match batch.allocations.iter_mut().find(|(m, _)| m == code) {
                Some((_, ids)) => ids.push(candidates[i]),
                None => batch.allocations.push((code.clone(), vec![candidates[i]])),
            }
            batch.weight += items[i].input as f64;
        }
        Ok(Some(batch))
    }
}

/// 將各批最佳裝箱寫入上下文：建立時間單元、指派機台與順序，
/// 並移除未被裝入的第二階段計劃。回傳（時間單元數, 移除數）
pub fn apply_packings(ctx: &mut PlanningContext, packings: &[CombinationPacking]) -> Result<(usize, usize)> {
    let mut allocated = BTreeSet::new();
    let mut units = 0;
    for packing in packings {
        for batch in &packing.batches {
            for (machine, ids) in &batch.allocations {
                if ids.is_empty() {
                    continue;
                }
                ctx.add_time_unit(machine.clone(), ids.clone());
                units += 1;
                for (position, id) in ids.iter().enumerate() {
                    ctx.plan_mut(*id)?.assign(machine.clone(), position as u32 + 1);
                    if !allocated.insert(*id) {
                        return Err(PlanError::InvariantViolation(format!("執行計劃 {id} 被裝入兩個時間單元")));
                    }
                }
            }
        }
    }

    let unallocated: Vec<PlanId> = ctx
        .plan_ids_of(ProcessStage::Tref)
        .into_iter()
        .filter(|id| !allocated.contains(id))
        .collect();
    let removed = ctx.remove_plans(unallocated);
    Ok((units, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::fixtures::{at, context};
    use crate::MilpBinPacker;
    use rust_decimal::Decimal;
    use wireplan_core::{CancellationToken, Criteria, Item, Machine, PlantData, Routing, RoutingTable};

    fn checkpoint() -> Checkpoint {
        Checkpoint::new(CancellationToken::new(), 1)
    }

    /// 兩台絞線機（容量 14、2 槽），S7 線徑 0.5 需 7 支，S3 線徑 0.8 需 3 支；ORPHAN 無途程
    fn plant() -> PlantData {
        PlantData::new("P1")
            .with_items(vec![
                Item::new("S7", "CU", ProcessStage::Tref).with_input(7).with_diameter(Decimal::new(5, 1)),
                Item::new("S3", "CU", ProcessStage::Tref).with_input(3).with_diameter(Decimal::new(8, 1)),
                Item::new("AL7", "AL", ProcessStage::Tref).with_input(7).with_diameter(Decimal::new(5, 1)),
                Item::new("ORPHAN", "PP", ProcessStage::Tref),
                Item::new("CABLE", "CU", ProcessStage::Torc),
            ])
            .with_machines(vec![
                Machine::new("T01", ProcessStage::Tref).with_input(14).with_output(2),
                Machine::new("T02", ProcessStage::Tref).with_input(14).with_output(2),
            ])
            .with_routings(RoutingTable::new(vec![
                Routing::new("S7", "T01", Decimal::ONE),
                Routing::new("S7", "T02", Decimal::ONE),
                Routing::new("S3", "T01", Decimal::ONE),
                Routing::new("S3", "T02", Decimal::ONE),
                Routing::new("AL7", "T02", Decimal::ONE),
            ]))
    }

    fn add(ctx: &mut PlanningContext, item: &str, order: OrderId) -> PlanId {
        let item = ctx.plant().require_item(item).unwrap().clone();
        ctx.add_plan(None, &item, Decimal::from(10), order, None)
    }

    #[test]
    fn test_affinity_records_first_machine_only() {
        let mut affinity = ItemAffinity::new();
        affinity.record("S7", "T01");
        affinity.record("S7", "T02");
        assert_eq!(affinity.machine_of("S7"), Some("T01"));
        assert_eq!(affinity.len(), 1);
    }

    #[test]
    fn test_is_better_than() {
        let base = CombinationPacking {
            value: 10.0,
            weight: 20.0,
            iterations: 3,
            ..CombinationPacking::default()
        };
        let higher = CombinationPacking {
            value: 11.0,
            ..CombinationPacking::default()
        };
        let fewer_iterations = CombinationPacking {
            value: 10.0,
            weight: 5.0,
            iterations: 2,
            ..CombinationPacking::default()
        };
        let worse = CombinationPacking {
            value: 10.0,
            weight: 20.0,
            iterations: 3,
            ..CombinationPacking::default()
        };
        assert!(higher.is_better_than(&base));
        assert!(fewer_iterations.is_better_than(&base));
        assert!(!worse.is_better_than(&base));
    }

    #[test]
    fn test_every_plan_packed_within_capacity() {
        let mut ctx = context(plant(), Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        let ids: Vec<PlanId> = (0..4).map(|_| add(&mut ctx, "S7", order)).collect();

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packings = TrefPacker::new(&ctx, &solver, &config).pack(&mut checkpoint()).unwrap();
        assert_eq!(packings.len(), 1);

        let packing = &packings[0];
        assert_eq!(packing.plan_ids().len(), 4);
        assert!(packing.dropped.is_empty());
        for batch in &packing.batches {
            for (_, members) in &batch.allocations {
                // 容量 14 / 每支 7 → 每台至多 2 筆
                assert!(members.len() <= 2);
            }
        }

        let (units, removed) = apply_packings(&mut ctx, &packings).unwrap();
        assert_eq!(removed, 0);
        assert!(units >= 2);
        for id in ids {
            assert!(ctx.plan(id).unwrap().machine.is_some());
        }
    }

    #[test]
    fn test_single_material_per_solve() {
        let mut ctx = context(plant(), Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        add(&mut ctx, "S7", order);
        add(&mut ctx, "AL7", order);

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packer = TrefPacker::new(&ctx, &solver, &config);
        let plans = ctx.plan_ids_of(ProcessStage::Tref);
        let packing = packer.pack_combination(&plans, ItemAffinity::new(), &mut checkpoint()).unwrap();

        assert_eq!(packing.batches.len(), 2);
        for batch in &packing.batches {
            let materials: BTreeSet<String> = batch
                .plan_ids()
                .map(|id| ctx.item_of(id).unwrap().material_type.clone())
                .collect();
            assert_eq!(materials.len(), 1);
        }
    }

    #[test]
    fn test_single_diameter_per_machine_per_solve() {
        let mut ctx = context(plant(), Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        add(&mut ctx, "S7", order);
        add(&mut ctx, "S7", order);
        add(&mut ctx, "S3", order);

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packer = TrefPacker::new(&ctx, &solver, &config);
        let plans = ctx.plan_ids_of(ProcessStage::Tref);
        let packing = packer.pack_combination(&plans, ItemAffinity::new(), &mut checkpoint()).unwrap();

        assert_eq!(packing.plan_ids().len(), 3);
        for batch in &packing.batches {
            for (_, members) in &batch.allocations {
                let diameters: BTreeSet<i64> = members
                    .iter()
                    .map(|id| ctx.item_of(*id).unwrap().diameter_key())
                    .collect();
                assert_eq!(diameters.len(), 1);
            }
        }
    }

    /// 解除排除的一輪裝箱成功後，排除名單依新負載重算
    #[test]
    fn test_exclusions_recomputed_after_lifted_round() {
        let plant = PlantData::new("P1")
            .with_items(vec![
                Item::new("X1", "M1", ProcessStage::Tref),
                Item::new("X2", "M1", ProcessStage::Tref),
                Item::new("X3", "M1", ProcessStage::Tref),
                Item::new("Y", "M2", ProcessStage::Tref),
                Item::new("Z", "M3", ProcessStage::Tref),
                Item::new("CABLE", "CU", ProcessStage::Torc),
            ])
            .with_machines(vec![
                Machine::new("T01", ProcessStage::Tref).with_input(14).with_output(2),
                Machine::new("T02", ProcessStage::Tref).with_input(14).with_output(2),
                Machine::new("T03", ProcessStage::Tref).with_input(14).with_output(2),
            ])
            .with_routings(RoutingTable::new(vec![
                Routing::new("X1", "T01", Decimal::ONE),
                Routing::new("X2", "T02", Decimal::ONE),
                Routing::new("X3", "T03", Decimal::ONE),
                Routing::new("Y", "T02", Decimal::ONE),
                Routing::new("Z", "T01", Decimal::ONE),
                Routing::new("Z", "T02", Decimal::ONE).with_weight(10),
            ]));
        let mut ctx = context(plant, Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        for (name, quantity) in [("X1", 100), ("X2", 100), ("X3", 10), ("Y", 1000), ("Z", 10)] {
            let item = ctx.plant().require_item(name).unwrap().clone();
            ctx.add_plan(None, &item, Decimal::from(quantity), order, None);
        }

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packer = TrefPacker::new(&ctx, &solver, &config);
        let plans = ctx.plan_ids_of(ProcessStage::Tref);
        let packing = packer.pack_combination(&plans, ItemAffinity::new(), &mut checkpoint()).unwrap();

        // 第一輪後 T01、T02 超載；Y 只能上 T02，解除排除後裝入，T02 成為唯一超載機台
        assert_eq!(packing.batches.len(), 3);
        assert!(packing.dropped.is_empty());
        let z = *plans.last().unwrap();
        let machine_of_z = packing.batches[2]
            .allocations
            .iter()
            .find(|(_, ids)| ids.contains(&z))
            .map(|(machine, _)| machine.as_str());
        assert_eq!(machine_of_z, Some("T01"));
    }

    #[test]
    fn test_unroutable_plans_are_dropped() {
        let mut ctx = context(plant(), Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        let orphan = add(&mut ctx, "ORPHAN", order);
        add(&mut ctx, "S7", order);

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packings = TrefPacker::new(&ctx, &solver, &config).pack(&mut checkpoint()).unwrap();
        assert_eq!(packings[0].dropped, vec![orphan]);

        let (_, removed) = apply_packings(&mut ctx, &packings).unwrap();
        assert_eq!(removed, 1);
        assert!(ctx.plan(orphan).is_err());
    }

    #[test]
    fn test_bom_alternatives_pick_one() {
        let mut ctx = context(plant(), Criteria::new());
        let order = ctx.add_order("CABLE", Decimal::from(10), at(8, 0, 0), 1);
        let s7 = ctx.plant().require_item("S7").unwrap().clone();
        let s3 = ctx.plant().require_item("S3").unwrap().clone();
        ctx.add_plan(Some("CABLE"), &s7, Decimal::from(10), order, Some(BomId(1)));
        ctx.add_plan(Some("CABLE"), &s3, Decimal::from(10), order, Some(BomId(2)));

        let config = TrefConfig::default();
        let solver = MilpBinPacker;
        let packings = TrefPacker::new(&ctx, &solver, &config).pack(&mut checkpoint()).unwrap();
        assert_eq!(packings[0].plan_ids().len(), 1);

        let (_, removed) = apply_packings(&mut ctx, &packings).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ctx.plan_ids_of(ProcessStage::Tref).len(), 1);
    }
}
