//! 線材廠三階段排程示例
//!
//! 執行：`RUST_LOG=info cargo run --example wire_plant`

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use wireplan::{
    logging, CancellationToken, Criteria, DemandRow, OrderIntake, PlanningContext, PlantCatalog, PlantData,
    PlantVariant, RunOutcome, RunPool, RunRequest, ScheduleOutput, Scheduler, SchedulerConfig,
};
use wireplan_core::{
    BillOfMaterials, BomLine, InMemoryHistory, InMemoryPlantRepository, Item, Machine, ProcessStage, Routing,
    RoutingTable, SetupTime, SetupTimeTable,
};

fn plant() -> PlantData {
    PlantData::new("WIRE-01")
        .with_items(vec![
            Item::new("CABLE-CU-7", "CU", ProcessStage::Torc),
            Item::new("CABLE-AL-7", "AL", ProcessStage::Torc),
            Item::new("STRAND-CU", "CU", ProcessStage::Tref).with_input(7).with_diameter(Decimal::new(5, 1)),
            Item::new("STRAND-AL", "AL", ProcessStage::Tref).with_input(7).with_diameter(Decimal::new(5, 1)),
            Item::new("ROD-CU-8", "CU", ProcessStage::Rod),
            Item::new("ROD-AL-8", "AL", ProcessStage::Rod),
        ])
        .with_machines(vec![
            Machine::new("R01", ProcessStage::Rod),
            Machine::new("R02", ProcessStage::Rod).with_output(2),
            Machine::new("T01", ProcessStage::Tref).with_input(14).with_output(2),
            Machine::new("T02", ProcessStage::Tref).with_input(14).with_output(2),
            Machine::new("B01", ProcessStage::Torc),
            Machine::new("B02", ProcessStage::Torc),
        ])
        .with_routings(RoutingTable::new(vec![
            Routing::new("ROD-CU-8", "R01", Decimal::new(2, 1)),
            Routing::new("ROD-CU-8", "R02", Decimal::new(3, 1)),
            Routing::new("ROD-AL-8", "R02", Decimal::new(2, 1)),
            Routing::new("STRAND-CU", "T01", Decimal::new(5, 1)),
            Routing::new("STRAND-CU", "T02", Decimal::new(5, 1)),
            Routing::new("STRAND-AL", "T02", Decimal::new(4, 1)),
            Routing::new("CABLE-CU-7", "B01", Decimal::ONE),
            Routing::new("CABLE-CU-7", "B02", Decimal::new(12, 1)),
            Routing::new("CABLE-AL-7", "B02", Decimal::ONE),
        ]))
        .with_boms(vec![
            BillOfMaterials::new(1, "CABLE-CU-7", Decimal::from(100))
                .with_line(BomLine::new("STRAND-CU", 3, Decimal::from(100))),
            BillOfMaterials::new(2, "CABLE-AL-7", Decimal::from(100))
                .with_line(BomLine::new("STRAND-AL", 3, Decimal::from(100))),
            BillOfMaterials::new(3, "STRAND-CU", Decimal::from(100))
                .with_line(BomLine::new("ROD-CU-8", 1, Decimal::from(100))),
            BillOfMaterials::new(4, "STRAND-AL", Decimal::from(100))
                .with_line(BomLine::new("ROD-AL-8", 1, Decimal::from(100))),
        ])
        .with_setup_times(SetupTimeTable::new(vec![
            SetupTime::new("CU", "AL", Decimal::ONE),
            SetupTime::new("AL", "CU", Decimal::ONE),
        ]))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    println!("=== 線材廠三階段排程示例 ===\n");

    let due = |day: u32| NaiveDate::from_ymd_opt(2025, 11, day).and_then(|d| d.and_hms_opt(16, 0, 0));
    let now = NaiveDate::from_ymd_opt(2025, 11, 3)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .ok_or("日期無效")?;
    let demands = vec![
        DemandRow::new("CABLE-CU-7", Decimal::from(80), due(4).ok_or("日期無效")?),
        DemandRow::new("CABLE-AL-7", Decimal::from(60), due(5).ok_or("日期無效")?),
        DemandRow::new("CABLE-CU-7", Decimal::from(120), due(6).ok_or("日期無效")?).with_weight(3),
    ];

    // 1. 單次排程，直接檢視結果
    let mut ctx = PlanningContext::new(Arc::new(plant()), Criteria::new().with_diameter_trend(true), now);
    OrderIntake::register(&mut ctx, demands.clone());

    let scheduler = Scheduler::new(SchedulerConfig::default());
    match scheduler.run(&mut ctx, PlantVariant::Dependent, &CancellationToken::new()) {
        RunOutcome::Completed(summary) => {
            println!("排程 {} 完成", summary.run_id);
            for stage in &summary.stages {
                println!("  {:?}: 排程 {} 筆、移除 {} 筆", stage.stage, stage.scheduled, stage.discarded);
            }
            println!("  逾期產品: {:?}\n", summary.late_products);
        }
        other => println!("排程未完成: {other:?}"),
    }

    println!("{:<6} {:<12} {:<6} {:>4} {:<20} {:<20}", "計劃", "物料", "機台", "順序", "開工", "完工");
    let mut plans: Vec<_> = ctx.plans().filter(|p| p.start_time.is_some()).collect();
    plans.sort_by_key(|p| (p.stage, p.machine.clone(), p.start_time));
    for plan in plans {
        println!(
            "{:<6} {:<12} {:<6} {:>4} {:<20} {:<20}",
            plan.id.to_string(),
            plan.item,
            plan.machine.as_deref().unwrap_or("-"),
            plan.position.unwrap_or(0),
            plan.start_time.map(|t| t.to_string()).unwrap_or_default(),
            plan.completion_time.map(|t| t.to_string()).unwrap_or_default(),
        );
    }

    let output = ScheduleOutput::from_context(&ctx);
    println!("\n輸出 JSON 長度: {} bytes", serde_json::to_string(&output)?.len());

    // 2. 經由執行緒池提交，結果寫入歷史
    let repository = Arc::new(InMemoryPlantRepository::new().with_plant(plant()));
    let history = Arc::new(InMemoryHistory::new());
    let pool = RunPool::new(2, Arc::new(PlantCatalog::new(repository)), history.clone(), scheduler)?;

    let request = demands
        .into_iter()
        .fold(RunRequest::new("planner-01", "WIRE-01", PlantVariant::Dependent, now), |r, d| {
            r.with_demand(d)
        });
    let outcome = pool.submit(request)?.wait();
    println!(
        "\n執行緒池排程: {:?}，已提交計劃 {} 筆",
        pool.status("planner-01"),
        history.committed_plan_count("WIRE-01")
    );
    if let RunOutcome::Failed(message) = outcome {
        println!("排程失敗: {message}");
    }

    Ok(())
}
