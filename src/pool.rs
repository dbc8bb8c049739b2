//! 排程執行緒池
//!
//! 每位使用者同時只能有一個排程；所有工作執行緒忙碌時直接拒絕，不排隊等待。
//! 每次排程都在自己的規劃上下文上執行，完成後才交付歷史資料庫。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use wireplan_calc::{DemandRow, ExpansionReport, OrderIntake};
use wireplan_core::{
    CancelRegistry, CancellationToken, Criteria, HistoryRepository, PlanError, PlanningContext, PlantVariant,
    Result, ScheduleOutput,
};
use wireplan_optimizer::{RunOutcome, Scheduler};

use crate::PlantCatalog;

/// 使用者排程狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed { late_products: Vec<String> },
    Aborted,
    Failed(String),
}

impl From<&RunOutcome> for RunStatus {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(summary) => RunStatus::Completed {
                late_products: summary.late_products.clone(),
            },
            RunOutcome::Aborted => RunStatus::Aborted,
            RunOutcome::Failed(message) => RunStatus::Failed(message.clone()),
        }
    }
}

/// 排程請求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_id: String,
    pub plant_id: String,
    pub demands: Vec<DemandRow>,
    pub criteria: Criteria,
    pub variant: PlantVariant,
    /// 排程基準時間
    pub current_time: NaiveDateTime,
}

impl RunRequest {
    pub fn new(
        user_id: impl Into<String>,
        plant_id: impl Into<String>,
        variant: PlantVariant,
        current_time: NaiveDateTime,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            plant_id: plant_id.into(),
            demands: Vec::new(),
            criteria: Criteria::new(),
            variant,
            current_time,
        }
    }

    /// 建構器模式：加入需求列
    pub fn with_demand(mut self, demand: DemandRow) -> Self {
        self.demands.push(demand);
        self
    }

    /// 建構器模式：設置排程選項
    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }
}

/// 已提交的排程，可等待結果
#[derive(Debug)]
pub struct RunTicket {
    user_id: String,
    receiver: mpsc::Receiver<RunOutcome>,
}

impl RunTicket {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 阻塞直到排程結束
    pub fn wait(self) -> RunOutcome {
        self.receiver
            .recv()
            .unwrap_or_else(|_| RunOutcome::Failed("排程工作執行緒意外結束".to_string()))
    }
}

/// 有上限的排程執行緒池
pub struct RunPool {
    pool: rayon::ThreadPool,
    capacity: usize,
    active: Arc<AtomicUsize>,
    statuses: Arc<Mutex<HashMap<String, RunStatus>>>,
    cancels: Arc<CancelRegistry>,
    catalog: Arc<PlantCatalog>,
    history: Arc<dyn HistoryRepository>,
    scheduler: Arc<Scheduler>,
}

impl RunPool {
    pub fn new(
        capacity: usize,
        catalog: Arc<PlantCatalog>,
        history: Arc<dyn HistoryRepository>,
        scheduler: Scheduler,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(PlanError::InvalidConfig("執行緒池容量必須大於 0".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|index| format!("wireplan-run-{index}"))
            .build()
            .map_err(|e| PlanError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            pool,
            capacity,
            active: Arc::new(AtomicUsize::new(0)),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            cancels: Arc::new(CancelRegistry::new()),
            catalog,
            history,
            scheduler: Arc::new(scheduler),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 執行中的排程數
    pub fn active_runs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 提交排程
    ///
    /// 同一使用者已有排程執行中時回傳 `RunAlreadyActive`；
    /// 所有工作執行緒忙碌時回傳 `PoolSaturated`。
    pub fn submit(&self, request: RunRequest) -> Result<RunTicket> {
        let user_id = request.user_id.clone();
        let token = {
            let mut statuses = self.lock_statuses()?;
            if matches!(statuses.get(&user_id), Some(RunStatus::Running)) {
                return Err(PlanError::RunAlreadyActive(user_id));
            }
            self.active
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < self.capacity).then_some(n + 1))
                .map_err(|_| PlanError::PoolSaturated)?;
            statuses.insert(user_id.clone(), RunStatus::Running);
            self.cancels.issue(&user_id)
        };
        let (sender, receiver) = mpsc::channel();
        let active = Arc::clone(&self.active);
        let statuses = Arc::clone(&self.statuses);
        let cancels = Arc::clone(&self.cancels);
        let catalog = Arc::clone(&self.catalog);
        let history = Arc::clone(&self.history);
        let scheduler = Arc::clone(&self.scheduler);

        tracing::info!("使用者 {} 提交排程（工廠 {}）", user_id, request.plant_id);
        self.pool.spawn(move || {
            let user_id = request.user_id.clone();
            let outcome = execute(&catalog, history.as_ref(), &scheduler, request, &token);

            cancels.release(&user_id);
            // 釋放名額與公布狀態在同一把鎖內完成
            let mut guard = statuses.lock().ok();
            active.fetch_sub(1, Ordering::SeqCst);
            if let Some(statuses) = guard.as_mut() {
                statuses.insert(user_id, RunStatus::from(&outcome));
            }
            drop(guard);
            let _ = sender.send(outcome);
        });

        Ok(RunTicket { user_id, receiver })
    }

    /// 中止使用者的排程；回傳是否有執行中的排程
    pub fn cancel(&self, user_id: &str) -> bool {
        let cancelled = self.cancels.cancel(user_id);
        if cancelled {
            tracing::info!("使用者 {} 要求中止排程", user_id);
        }
        cancelled
    }

    /// 使用者最近一次排程的狀態
    pub fn status(&self, user_id: &str) -> Option<RunStatus> {
        self.lock_statuses().ok().and_then(|s| s.get(user_id).cloned())
    }

    fn lock_statuses(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, RunStatus>>> {
        self.statuses
            .lock()
            .map_err(|_| PlanError::DataAccess(anyhow::anyhow!("排程狀態鎖已損壞")))
    }
}

/// 準備上下文、執行排程，成功後交付歷史資料庫
fn execute(
    catalog: &PlantCatalog,
    history: &dyn HistoryRepository,
    scheduler: &Scheduler,
    request: RunRequest,
    token: &CancellationToken,
) -> RunOutcome {
    let prepared = prepare(catalog, history, request);
    let (mut ctx, plant_id, variant, intake) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            tracing::error!("排程準備失敗: {}", err);
            return RunOutcome::Failed(err.to_string());
        }
    };

    match scheduler.run(&mut ctx, variant, token) {
        RunOutcome::Completed(mut summary) => {
            summary.report.merge(intake);
            let output = ScheduleOutput::from_context(&ctx);
            if let Err(err) = history.append(&plant_id, &output) {
                tracing::error!("排程 {} 寫入歷史失敗: {}", summary.run_id, err);
                return RunOutcome::Failed(PlanError::DataAccess(err).to_string());
            }
            RunOutcome::Completed(summary)
        }
        other => other,
    }
}

fn prepare(
    catalog: &PlantCatalog,
    history: &dyn HistoryRepository,
    request: RunRequest,
) -> Result<(PlanningContext, String, PlantVariant, ExpansionReport)> {
    let plant = catalog.get(&request.plant_id)?;
    let machine_history = history.load_history(&request.plant_id)?;
    let mut ctx = PlanningContext::new(plant, request.criteria, request.current_time).with_history(machine_history);
    let (_, intake) = OrderIntake::register(&mut ctx, request.demands);
    Ok((ctx, request.plant_id, request.variant, intake))
}
