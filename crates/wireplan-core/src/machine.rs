//! 機台模型與可用性快照

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ProcessStage;

/// 機台
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// 機台代碼
    pub code: String,

    /// 所屬製程階段
    pub stage: ProcessStage,

    /// 投入容量（重量/體積上限）
    pub input: u32,

    /// 產出容量（每批最大平行槽位）
    pub output: u32,

    /// 運轉時間係數
    pub running_time_factor: Decimal,
}

impl Machine {
    /// 創建新的機台
    pub fn new(code: impl Into<String>, stage: ProcessStage) -> Self {
        Self {
            code: code.into(),
            stage,
            input: 1,
            output: 1,
            running_time_factor: Decimal::ONE,
        }
    }

    /// 建構器模式：設置投入容量
    pub fn with_input(mut self, input: u32) -> Self {
        self.input = input;
        self
    }

    /// 建構器模式：設置產出容量
    pub fn with_output(mut self, output: u32) -> Self {
        self.output = output.max(1);
        self
    }

    /// 建構器模式：設置運轉時間係數
    pub fn with_running_time_factor(mut self, factor: Decimal) -> Self {
        self.running_time_factor = factor;
        self
    }

    /// 是否為多槽位機台
    pub fn is_multi_slot(&self) -> bool {
        self.output > 1
    }
}

/// 機台可用性快照
///
/// 每次排程持有自己的停用機台集合；停用只影響本次排程，
/// 不會改動工廠共用的參考資料。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAvailability {
    excluded: BTreeSet<String>,
}

impl MachineAvailability {
    /// 從停用清單建立快照
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// 停用機台
    pub fn deactivate(&mut self, code: impl Into<String>) {
        self.excluded.insert(code.into());
    }

    /// 重新啟用機台
    pub fn activate(&mut self, code: &str) {
        self.excluded.remove(code);
    }

    /// 檢查機台是否可用
    pub fn is_active(&self, code: &str) -> bool {
        !self.excluded.contains(code)
    }

    /// 停用機台清單
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_builder() {
        let machine = Machine::new("T01", ProcessStage::Tref)
            .with_input(24)
            .with_output(0)
            .with_running_time_factor(Decimal::new(95, 2));

        assert_eq!(machine.input, 24);
        // 產出容量至少為 1
        assert_eq!(machine.output, 1);
        assert!(!machine.is_multi_slot());
        assert_eq!(machine.running_time_factor, Decimal::new(95, 2));
    }

    #[test]
    fn test_availability_snapshot() {
        let mut availability = MachineAvailability::new(["R02"]);
        assert!(availability.is_active("R01"));
        assert!(!availability.is_active("R02"));

        availability.deactivate("R01");
        availability.activate("R02");
        assert!(!availability.is_active("R01"));
        assert!(availability.is_active("R02"));
        assert_eq!(availability.excluded().collect::<Vec<_>>(), vec!["R01"]);
    }
}
