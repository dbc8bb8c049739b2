//! 增量目標值快取
//!
//! 每台機台的目標值分開快取；移動只標記受影響的機台，
//! 提案時只重算髒機台，接受後才寫回快取。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::DirtyTracker;

/// 單台機台的目標值
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineScore {
    /// 延遲成本（延遲分鐘 + 交替懲罰）
    pub tardiness: f64,

    /// 提前完工分鐘（次要比較）
    pub early: f64,
}

impl MachineScore {
    pub fn new(tardiness: f64, early: f64) -> Self {
        Self { tardiness, early }
    }
}

impl std::ops::Add for MachineScore {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.tardiness + rhs.tardiness, self.early + rhs.early)
    }
}

/// 待確認的重算結果
#[derive(Debug, Clone)]
pub struct Proposal<K> {
    /// 重算後的機台目標值
    pub updates: Vec<(K, MachineScore)>,

    /// 套用後的總目標值
    pub total: MachineScore,
}

/// 增量目標值
#[derive(Debug, Clone)]
pub struct IncrementalObjective<K: Ord + Clone = String> {
    scores: BTreeMap<K, MachineScore>,
    dirty: DirtyTracker<K>,
    total: MachineScore,
}

impl<K: Ord + Clone> IncrementalObjective<K> {
    pub fn new() -> Self {
        Self {
            scores: BTreeMap::new(),
            dirty: DirtyTracker::new(),
            total: MachineScore::default(),
        }
    }

    /// 以完整評估結果重建快取
    pub fn rebuild(&mut self, scores: impl IntoIterator<Item = (K, MachineScore)>) {
        self.scores = scores.into_iter().collect();
        self.dirty.clear();
        self.total = Self::sum(self.scores.values());
    }

    /// 標記機台需要重算
    pub fn mark_dirty(&mut self, key: K) {
        self.dirty.mark_dirty(key);
    }

    /// 重算髒機台並提出新總值（不寫回快取）
    pub fn propose<F, E>(&mut self, mut evaluate: F) -> Result<Proposal<K>, E>
    where
        F: FnMut(&K) -> Result<MachineScore, E>,
    {
        let keys = self.dirty.drain();
        let mut updates = Vec::with_capacity(keys.len());
        for key in keys {
            let score = evaluate(&key)?;
            updates.push((key, score));
        }

        let total = Self::sum(self.scores.iter().map(|(key, score)| {
            updates
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, s)| s)
                .unwrap_or(score)
        })) + Self::sum(
            updates
                .iter()
                .filter(|(k, _)| !self.scores.contains_key(k))
                .map(|(_, s)| s),
        );

        Ok(Proposal { updates, total })
    }

    /// 接受提案
    pub fn commit(&mut self, proposal: Proposal<K>) {
        for (key, score) in proposal.updates {
            self.scores.insert(key, score);
        }
        self.total = proposal.total;
    }

    /// 目前總值
    pub fn total(&self) -> MachineScore {
        self.total
    }

    /// 單台機台的快取值
    pub fn score(&self, key: &K) -> Option<MachineScore> {
        self.scores.get(key).copied()
    }

    fn sum<'a>(scores: impl Iterator<Item = &'a MachineScore>) -> MachineScore {
        scores.fold(MachineScore::default(), |acc, s| acc + *s)
    }
}

impl<K: Ord + Clone> Default for IncrementalObjective<K> {
    fn default() -> Self {
        Self::new()
    }
}
