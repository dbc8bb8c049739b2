//! BOM 相依展開
//!
//! 將生產訂單沿 BOM 樹深度優先展開為各製程的執行計劃草稿。

use rust_decimal::Decimal;
use wireplan_core::{BillOfMaterials, Item, OrderId, PlanError, PlanningContext, Result};

use crate::{BomExclusion, ExpansionReport, ExpansionWarning, IncrementSplitter};

/// BOM 展開的最大深度
const MAX_DEPTH: usize = 16;

/// 相依展開器
pub struct DependencyExpander;

impl DependencyExpander {
    /// 展開上下文中所有尚未展開的訂單，並套用停用組合
    pub fn expand_all(ctx: &mut PlanningContext) -> Result<ExpansionReport> {
        let start_time = std::time::Instant::now();
        let pending = ctx.unexpanded_orders();
        tracing::info!("開始 BOM 展開：訂單 {} 筆", pending.len());

        let mut report = ExpansionReport::empty();
        for order_id in pending {
            report.merge(Self::expand_order(ctx, order_id)?);
            ctx.mark_expanded(order_id);
        }

        report.plans_excluded = BomExclusion::apply(ctx);

        tracing::info!(
            "BOM 展開完成：建立 {} 筆、排除 {} 筆、無途程 {} 項、無 BOM {} 項，耗時 {:?}",
            report.plans_created,
            report.plans_excluded,
            report.no_routing().len(),
            report.no_bom().len(),
            start_time.elapsed()
        );
        Ok(report)
    }

    /// 展開單一訂單
    pub fn expand_order(ctx: &mut PlanningContext, order_id: OrderId) -> Result<ExpansionReport> {
        let mut report = ExpansionReport::empty();
        let order = ctx.order(order_id)?.clone();
        let plant = ctx.plant_arc();

        let Some(root) = plant.item(&order.item) else {
            report.add_warning(ExpansionWarning::no_bom(&order.item));
            return Ok(report);
        };

        let boms: Vec<&BillOfMaterials> = plant.boms_of(&root.name).collect();
        if boms.is_empty() {
            // 單一製程產品：有途程即直接成為一筆計劃
            if ctx.has_active_routing(root) {
                ctx.add_plan(None, root, order.quantity, order_id, None);
                report.plans_created += 1;
            } else {
                report.add_warning(ExpansionWarning::no_bom(&root.name));
                report.add_warning(ExpansionWarning::no_routing(&root.name));
            }
            return Ok(report);
        }

        for quantity in IncrementSplitter::split(order.quantity, root.order_increment) {
            if ctx.has_active_routing(root) {
                ctx.add_plan(None, root, quantity, order_id, None);
                report.plans_created += 1;
            } else {
                report.add_warning(ExpansionWarning::no_routing(&root.name));
            }

            for bom in &boms {
                Self::expand_bom(ctx, &mut report, order_id, root, bom, quantity, 1)?;
            }
        }

        tracing::debug!("訂單 {} 展開 {} 筆計劃", order_id, report.plans_created);
        Ok(report)
    }

    /// 展開一個 BOM 版本（子件若本身為 BOM 根則遞迴）
    fn expand_bom(
        ctx: &mut PlanningContext,
        report: &mut ExpansionReport,
        order_id: OrderId,
        parent: &Item,
        bom: &BillOfMaterials,
        quantity: Decimal,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(PlanError::BomCycle(parent.name.clone()));
        }
        let plant = ctx.plant_arc();

        for line in &bom.lines {
            let Some(child) = plant.item(&line.item) else {
                report.add_warning(ExpansionWarning::no_bom(&line.item));
                continue;
            };

            let production_qty = bom.production_quantity(line, quantity);
            if production_qty <= Decimal::ZERO {
                continue;
            }

            for _ in 0..line.count {
                if ctx.has_active_routing(child) {
                    ctx.add_plan(Some(&parent.name), child, production_qty, order_id, Some(bom.id));
                    report.plans_created += 1;
                } else {
                    report.add_warning(ExpansionWarning::no_routing(&child.name));
                }

                for sub_bom in plant.boms_of(&child.name) {
                    Self::expand_bom(ctx, report, order_id, child, sub_bom, quantity, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}
