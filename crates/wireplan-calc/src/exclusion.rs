//! 停用 BOM 子件組合

use std::collections::BTreeSet;
use wireplan_core::{BomId, OrderId, PlanId, PlanningContext};

/// 停用組合處理器
pub struct BomExclusion;

impl BomExclusion {
    /// 移除符合停用組合的已建立計劃，回傳移除筆數
    ///
    /// 組合比對以 BOM 版本的子件簽章為準；被移除計劃的下游子計劃
    /// （同訂單、上層物料已無任何計劃）一併移除。
    pub fn apply(ctx: &mut PlanningContext) -> usize {
        let criteria = ctx.criteria().clone();
        if criteria.deactivated_boms.is_empty() {
            return 0;
        }
        let plant = ctx.plant_arc();

        let excluded: BTreeSet<(String, BomId)> = criteria
            .deactivated_boms
            .keys()
            .flat_map(|root| plant.boms_of(root))
            .filter(|bom| criteria.is_bom_deactivated(&bom.root, &bom.signature()))
            .map(|bom| (bom.root.clone(), bom.id))
            .collect();

        let mut doomed: Vec<PlanId> = ctx
            .plans()
            .filter(|p| match (&p.parent_item, p.bom) {
                (Some(parent), Some(bom)) => excluded.contains(&(parent.clone(), bom)),
                _ => false,
            })
            .map(|p| p.id)
            .collect();

        let mut removed = 0;
        while !doomed.is_empty() {
            // 記錄被移除的 (訂單, 物料)，用於找出失去上層的子計劃
            let lost: BTreeSet<(OrderId, String)> = doomed
                .iter()
                .filter_map(|id| ctx.plan(*id).ok())
                .map(|p| (p.order, p.item.clone()))
                .collect();
            removed += ctx.remove_plans(doomed.drain(..));

            let still_present: BTreeSet<(OrderId, String)> =
                ctx.plans().map(|p| (p.order, p.item.clone())).collect();
            doomed = ctx
                .plans()
                .filter(|p| {
                    p.parent_item.as_ref().is_some_and(|parent| {
                        let key = (p.order, parent.clone());
                        lost.contains(&key) && !still_present.contains(&key)
                    })
                })
                .map(|p| p.id)
                .collect();
        }

        if removed > 0 {
            tracing::info!("停用 BOM 組合：移除執行計劃 {} 筆", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DependencyExpander;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use wireplan_core::{
        BillOfMaterials, BomLine, Criteria, Item, Machine, PlantData, ProcessStage, Routing,
        RoutingTable,
    };

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    /// CABLE 有兩個版本：A×2 或 B×2；A 又由 ROD 組成
    fn plant() -> Arc<PlantData> {
        Arc::new(
            PlantData::new("P1")
                .with_items(vec![
                    Item::new("CABLE", "CU", ProcessStage::Torc),
                    Item::new("A", "CU", ProcessStage::Tref),
                    Item::new("B", "CU", ProcessStage::Tref),
                    Item::new("ROD", "CU", ProcessStage::Rod),
                ])
                .with_machines(vec![
                    Machine::new("B01", ProcessStage::Torc),
                    Machine::new("T01", ProcessStage::Tref),
                    Machine::new("R01", ProcessStage::Rod),
                ])
                .with_routings(RoutingTable::new(vec![
                    Routing::new("CABLE", "B01", Decimal::ONE),
                    Routing::new("A", "T01", Decimal::ONE),
                    Routing::new("B", "T01", Decimal::ONE),
                    Routing::new("ROD", "R01", Decimal::ONE),
                ]))
                .with_boms(vec![
                    BillOfMaterials::new(1, "CABLE", Decimal::ONE).with_line(BomLine::new("A", 2, Decimal::ONE)),
                    BillOfMaterials::new(2, "CABLE", Decimal::ONE).with_line(BomLine::new("B", 2, Decimal::ONE)),
                    BillOfMaterials::new(3, "A", Decimal::ONE).with_line(BomLine::new("ROD", 1, Decimal::ONE)),
                ]),
        )
    }

    #[test]
    fn test_excluded_combination_and_children_removed() {
        let criteria =
            Criteria::new().with_deactivated_bom("CABLE", vec!["A".to_string(), "A".to_string()]);
        let mut ctx = PlanningContext::new(plant(), criteria, now());
        ctx.add_order("CABLE", Decimal::from(10), now(), 1);

        let report = DependencyExpander::expand_all(&mut ctx).unwrap();

        // 2 × A 與其下 2 × ROD 全部移除
        assert_eq!(report.plans_excluded, 4);
        assert!(ctx.plans().all(|p| p.item != "A" && p.item != "ROD"));
        assert_eq!(ctx.plans().filter(|p| p.item == "B").count(), 2);
    }

    #[test]
    fn test_partial_signature_does_not_match() {
        let criteria = Criteria::new().with_deactivated_bom("CABLE", vec!["A".to_string()]);
        let mut ctx = PlanningContext::new(plant(), criteria, now());
        ctx.add_order("CABLE", Decimal::from(10), now(), 1);

        let report = DependencyExpander::expand_all(&mut ctx).unwrap();
        assert_eq!(report.plans_excluded, 0);
        assert_eq!(ctx.plans().filter(|p| p.item == "A").count(), 2);
    }
}
