//! 產能分配工具

use std::collections::{BTreeMap, BTreeSet};

/// 產能規劃器
pub struct CapacityPlanner;

impl CapacityPlanner {
    /// 依機台產出比例分配作業數目標
    ///
    /// 目標 = round(產出 / 總產出 × 作業數)；四捨五入後的差額依機台順序逐台補 1。
    pub fn proportional_targets(outputs: &[u32], operations: usize) -> Vec<usize> {
        let total: u32 = outputs.iter().sum();
        if total == 0 {
            return vec![0; outputs.len()];
        }

        let mut targets: Vec<usize> = outputs
            .iter()
            .map(|&o| (o as f64 / total as f64 * operations as f64).round() as usize)
            .collect();

        let assigned: usize = targets.iter().sum();
        let mut remainder = operations.saturating_sub(assigned);
        for target in targets.iter_mut() {
            if remainder == 0 {
                break;
            }
            *target += 1;
            remainder -= 1;
        }
        targets
    }

    /// 負載平衡：預估完工時間高於平均值的機台暫時排除
    ///
    /// 平均值只計入已有負載（大於 0）的機台。
    pub fn overloaded(running: &BTreeMap<String, f64>) -> BTreeSet<String> {
        let loaded: Vec<f64> = running.values().copied().filter(|v| *v > 0.0).collect();
        if loaded.is_empty() {
            return BTreeSet::new();
        }
        let average = loaded.iter().sum::<f64>() / loaded.len() as f64;
        running
            .iter()
            .filter(|(_, v)| **v > average)
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// 依容量比例切分數量（向下取整，餘數輪流補 1）
    pub fn split_by_capacity(capacities: &[u32], quantity: u32) -> Vec<u32> {
        let total: u32 = capacities.iter().sum();
        if total == 0 {
            return vec![0; capacities.len()];
        }

        let mut shares: Vec<u32> = capacities
            .iter()
            .map(|&c| (c as u64 * quantity as u64 / total as u64) as u32)
            .collect();

        let mut remainder = quantity - shares.iter().sum::<u32>();
        let mut index = 0;
        while remainder > 0 {
            if capacities[index] > 0 {
                shares[index] += 1;
                remainder -= 1;
            }
            index = (index + 1) % capacities.len();
        }
        shares
    }
}
