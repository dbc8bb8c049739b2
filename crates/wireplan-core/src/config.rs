//! 排程條件與參數配置

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{PlanError, Result, ShiftCalendar};

/// 排程條件（啟用的啟發式與排除清單）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Criteria {
    /// 以週期時間衡量機台效率（否則只看途程權重）
    pub weight_by_cycle_time: bool,

    /// 延續機台上一個線徑的趨勢
    pub diameter_trend: bool,

    /// 扣用庫存
    pub consume_stock: bool,

    /// 依材質分組時間單元
    pub group_by_material: bool,

    /// 停用機台清單
    pub deactivated_machines: Vec<String>,

    /// 停用的 BOM 子件組合（根物料 → 子件組合清單）
    pub deactivated_boms: BTreeMap<String, Vec<Vec<String>>>,
}

impl Criteria {
    /// 創建預設條件（全部關閉）
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：設置週期時間權重
    pub fn with_weight_by_cycle_time(mut self, enabled: bool) -> Self {
        self.weight_by_cycle_time = enabled;
        self
    }

    /// 建構器模式：設置線徑趨勢
    pub fn with_diameter_trend(mut self, enabled: bool) -> Self {
        self.diameter_trend = enabled;
        self
    }

    /// 建構器模式：設置庫存扣用
    pub fn with_consume_stock(mut self, enabled: bool) -> Self {
        self.consume_stock = enabled;
        self
    }

    /// 建構器模式：設置材質分組
    pub fn with_group_by_material(mut self, enabled: bool) -> Self {
        self.group_by_material = enabled;
        self
    }

    /// 建構器模式：停用機台
    pub fn with_deactivated_machine(mut self, code: impl Into<String>) -> Self {
        self.deactivated_machines.push(code.into());
        self
    }

    /// 建構器模式：停用 BOM 子件組合
    pub fn with_deactivated_bom(mut self, root: impl Into<String>, combination: Vec<String>) -> Self {
        self.deactivated_boms
            .entry(root.into())
            .or_default()
            .push(combination);
        self
    }

    /// 子件組合是否被停用
    pub fn is_bom_deactivated(&self, root: &str, signature: &[String]) -> bool {
        self.deactivated_boms
            .get(root)
            .map(|combos| combos.iter().any(|c| c.as_slice() == signature))
            .unwrap_or(false)
    }

    /// 從前端的稀疏數字鍵格式解析
    ///
    /// `"1"` 週期時間權重、`"2"` 線徑趨勢、`"3"` 庫存扣用、`"4"` 材質分組、
    /// `"5"` 停用 BOM 組合（根物料 → 子件組合）、`"machines"` 停用機台。
    pub fn from_sparse_json(raw: &str) -> Result<Self> {
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        let flag = |key: &str| map.get(key).map(is_truthy).unwrap_or(false);

        let mut criteria = Self::new()
            .with_weight_by_cycle_time(flag("1"))
            .with_diameter_trend(flag("2"))
            .with_consume_stock(flag("3"))
            .with_group_by_material(flag("4"));

        if let Some(value) = map.get("5") {
            criteria.deactivated_boms = serde_json::from_value(value.clone())?;
        }
        if let Some(value) = map.get("machines") {
            criteria.deactivated_machines = serde_json::from_value(value.clone())?;
        }
        Ok(criteria)
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        serde_json::Value::Null => false,
        _ => true,
    }
}

/// 第一階段候選組合的選擇方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSelection {
    /// 選擇目標值最高者（沿用既有行為，同分取後者）
    HighestObjective,
    /// 選擇目標值最低者（同分取先者）
    LowestObjective,
}

impl CandidateSelection {
    /// 候選目標值是否取代目前最佳值
    pub fn prefers(&self, candidate: f64, best: f64) -> bool {
        match self {
            CandidateSelection::HighestObjective => candidate >= best,
            CandidateSelection::LowestObjective => candidate < best,
        }
    }
}

/// 第一階段（拉線）參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RodConfig {
    /// 轉運緩衝（週期時間比例）
    pub transfer_buffer: f64,

    /// 候選組合上限
    pub max_combinations: usize,

    /// 連續未改善即停止
    pub max_no_improvement: usize,

    /// 候選選擇方向
    pub selection: CandidateSelection,
}

impl Default for RodConfig {
    fn default() -> Self {
        Self {
            transfer_buffer: 0.08,
            max_combinations: 100_000,
            max_no_improvement: 1000,
            selection: CandidateSelection::HighestObjective,
        }
    }
}

/// 第二階段（絞線）參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrefConfig {
    /// 每批訂單數
    pub batch_size: usize,

    /// 每批連續未改善的組合數上限
    pub max_no_improvement: usize,

    /// 時間單元上料緩衝（最長成員週期時間比例）
    pub time_unit_buffer: f64,
}

impl Default for TrefConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_no_improvement: 1000,
            time_unit_buffer: 0.16,
        }
    }
}

/// 第三階段（撚線）模擬退火參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// 初始溫度 = 此值 × 作業數
    pub initial_temperature_per_op: f64,

    /// 冷卻係數
    pub cooling_factor: f64,

    /// 每個溫度的嘗試次數
    pub moves_per_temperature: usize,

    /// 終止溫度
    pub final_temperature: f64,

    /// 產品交替懲罰常數
    pub alternation_penalty: f64,

    /// 轉運緩衝（週期時間比例）
    pub transfer_buffer: f64,

    /// 隨機種子（None 表示由系統產生）
    pub seed: Option<u64>,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature_per_op: 500.0,
            cooling_factor: 0.99,
            moves_per_temperature: 100,
            final_temperature: 0.01,
            alternation_penalty: 4000.0,
            transfer_buffer: 0.08,
            seed: None,
        }
    }
}

impl AnnealingConfig {
    /// 建構器模式：設置隨機種子
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// 排程引擎參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 班別開始時間
    pub shift_starts: Vec<NaiveTime>,

    /// 中止旗標檢查間隔（迴圈次數）
    pub cancel_check_interval: u32,

    /// 第一階段參數
    pub rod: RodConfig,

    /// 第二階段參數
    pub tref: TrefConfig,

    /// 第三階段參數
    pub torc: AnnealingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shift_starts: ShiftCalendar::three_shifts().shift_starts,
            cancel_check_interval: 10,
            rod: RodConfig::default(),
            tref: TrefConfig::default(),
            torc: AnnealingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// 從 JSON 載入（缺少的欄位使用預設值）
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 建構器模式：設置退火參數
    pub fn with_annealing(mut self, annealing: AnnealingConfig) -> Self {
        self.torc = annealing;
        self
    }

    /// 建構器模式：設置第一階段選擇方向
    pub fn with_rod_selection(mut self, selection: CandidateSelection) -> Self {
        self.rod.selection = selection;
        self
    }

    /// 檢查參數範圍
    pub fn validate(&self) -> Result<()> {
        if self.cancel_check_interval == 0 {
            return Err(PlanError::InvalidConfig("中止檢查間隔必須大於 0".to_string()));
        }
        if self.tref.batch_size == 0 {
            return Err(PlanError::InvalidConfig("每批訂單數必須大於 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.torc.cooling_factor) {
            return Err(PlanError::InvalidConfig(format!(
                "冷卻係數必須介於 0 與 1 之間: {}",
                self.torc.cooling_factor
            )));
        }
        if self.torc.final_temperature <= 0.0 {
            return Err(PlanError::InvalidConfig("終止溫度必須大於 0".to_string()));
        }
        Ok(())
    }

    /// 班別日曆
    pub fn calendar(&self) -> ShiftCalendar {
        ShiftCalendar::new(self.shift_starts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_builder() {
        let criteria = Criteria::new()
            .with_weight_by_cycle_time(true)
            .with_deactivated_machine("T03")
            .with_deactivated_bom("CABLE", vec!["A".to_string(), "B".to_string()]);

        assert!(criteria.weight_by_cycle_time);
        assert!(!criteria.diameter_trend);
        assert_eq!(criteria.deactivated_machines, vec!["T03".to_string()]);
        assert!(criteria.is_bom_deactivated("CABLE", &["A".to_string(), "B".to_string()]));
        assert!(!criteria.is_bom_deactivated("CABLE", &["A".to_string()]));
    }

    #[test]
    fn test_criteria_from_sparse_json() {
        let raw = r#"{"1": true, "3": 1, "4": "0", "5": {"CABLE": [["A", "A", "B"]]}, "machines": ["R02"]}"#;
        let criteria = Criteria::from_sparse_json(raw).unwrap();

        assert!(criteria.weight_by_cycle_time);
        assert!(!criteria.diameter_trend);
        assert!(criteria.consume_stock);
        assert!(!criteria.group_by_material);
        assert_eq!(criteria.deactivated_machines, vec!["R02".to_string()]);
        assert_eq!(criteria.deactivated_boms["CABLE"].len(), 1);
    }

    #[test]
    fn test_criteria_from_invalid_json() {
        let err = Criteria::from_sparse_json("{not json").unwrap_err();
        assert!(matches!(err, PlanError::InvalidConfig(_)));
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.shift_starts.len(), 3);
        assert_eq!(config.cancel_check_interval, 10);
        assert_eq!(config.tref.batch_size, 25);
        assert_eq!(config.torc.moves_per_temperature, 100);
        assert_eq!(config.rod.selection, CandidateSelection::HighestObjective);
    }

    #[test]
    fn test_scheduler_config_partial_json() {
        let raw = r#"{"torc": {"seed": 42, "moves_per_temperature": 10}, "tref": {"batch_size": 5}}"#;
        let config = SchedulerConfig::from_json_str(raw).unwrap();

        assert_eq!(config.torc.seed, Some(42));
        assert_eq!(config.torc.moves_per_temperature, 10);
        assert_eq!(config.torc.cooling_factor, 0.99);
        assert_eq!(config.tref.batch_size, 5);
        assert_eq!(config.tref.max_no_improvement, 1000);
    }

    #[test]
    fn test_candidate_selection() {
        assert!(CandidateSelection::HighestObjective.prefers(5.0, 5.0));
        assert!(!CandidateSelection::HighestObjective.prefers(4.0, 5.0));
        assert!(CandidateSelection::LowestObjective.prefers(4.0, 5.0));
        assert!(!CandidateSelection::LowestObjective.prefers(5.0, 5.0));

        let config = SchedulerConfig::default().with_rod_selection(CandidateSelection::LowestObjective);
        assert_eq!(config.rod.selection, CandidateSelection::LowestObjective);
    }

    #[test]
    fn test_scheduler_config_validation() {
        let raw = r#"{"torc": {"cooling_factor": 1.5}}"#;
        assert!(SchedulerConfig::from_json_str(raw).is_err());

        let raw = r#"{"cancel_check_interval": 0}"#;
        assert!(SchedulerConfig::from_json_str(raw).is_err());
    }
}
