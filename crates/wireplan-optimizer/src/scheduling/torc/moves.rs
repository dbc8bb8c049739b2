//! 退火鄰域移動：機台內交換與跨機台轉移

use std::collections::HashSet;

use rand::seq::{index, IteratorRandom, SliceRandom};
use rand::Rng;
use wireplan_core::{PlanId, Result};

use super::{TorcProblem, TorcSolution};

/// 鄰域移動
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Move {
    /// 同機台內交換兩筆作業
    Swap(PlanId, PlanId),
    /// 將作業移到另一台機台的佇列尾端
    Relocate(PlanId, String),
}

impl Move {
    /// 交換不分順序
    fn normalized(&self) -> Move {
        match self {
            Move::Swap(a, b) if b < a => Move::Swap(*b, *a),
            other => other.clone(),
        }
    }
}

/// 已套用的移動，可還原
#[derive(Debug, Clone)]
pub struct AppliedMove {
    /// 受影響的機台
    pub touched: Vec<String>,
    undo: Undo,
}

#[derive(Debug, Clone)]
enum Undo {
    Swap { machine: String, first: usize, second: usize },
    Relocate { plan: PlanId, from: String, index: usize, to: String },
}

/// 失敗移動的記憶，改善時清除
#[derive(Debug, Clone, Default)]
pub struct MoveMemory {
    tried: HashSet<Move>,
}

impl MoveMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, mv: &Move) -> bool {
        self.tried.contains(&mv.normalized())
    }

    pub fn remember(&mut self, mv: &Move) {
        self.tried.insert(mv.normalized());
    }

    pub fn clear(&mut self) {
        self.tried.clear();
    }

    pub fn len(&self) -> usize {
        self.tried.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tried.is_empty()
    }
}

/// 移動產生器：偶數次交換、奇數次轉移
pub struct MoveGenerator<'a> {
    problem: &'a TorcProblem,
}

impl<'a> MoveGenerator<'a> {
    pub fn new(problem: &'a TorcProblem) -> Self {
        Self { problem }
    }

    /// 隨機產生移動；記憶中的移動與同產品交換不產生
    pub fn propose<R: Rng + ?Sized>(&self, rng: &mut R, iteration: usize, memory: &MoveMemory) -> Result<Option<Move>> {
        let ops = self.problem.movable();
        let mv = if iteration % 2 == 0 {
            if ops.len() < 2 {
                return Ok(None);
            }
            let picked = index::sample(rng, ops.len(), 2);
            let (first, second) = (ops[picked.index(0)], ops[picked.index(1)]);
            if self.problem.op(first)?.item == self.problem.op(second)?.item {
                return Ok(None);
            }
            Move::Swap(first, second)
        } else {
            let Some(&plan) = ops.choose(rng) else {
                return Ok(None);
            };
            let Some(machine) = self.problem.op(plan)?.processing.keys().choose(rng) else {
                return Ok(None);
            };
            Move::Relocate(plan, machine.clone())
        };

        Ok((!memory.contains(&mv)).then_some(mv))
    }
}

impl TorcSolution {
    /// 套用移動；不可行時回傳 None 且解不變
    ///
    /// 交換須兩筆作業在同一台機台，且任一位置不在三筆以上相同產品的連續區段中間。
    pub fn apply(&mut self, problem: &TorcProblem, mv: &Move) -> Result<Option<AppliedMove>> {
        match mv {
            Move::Swap(a, b) => {
                let Some((machine, queue)) = self
                    .queues
                    .iter_mut()
                    .find(|(_, queue)| queue.contains(a) && queue.contains(b))
                else {
                    return Ok(None);
                };
                let (Some(first), Some(second)) =
                    (queue.iter().position(|id| id == a), queue.iter().position(|id| id == b))
                else {
                    return Ok(None);
                };
                if inside_run(problem, queue, first)? || inside_run(problem, queue, second)? {
                    return Ok(None);
                }
                queue.swap(first, second);
                Ok(Some(AppliedMove {
                    touched: vec![machine.clone()],
                    undo: Undo::Swap {
                        machine: machine.clone(),
                        first,
                        second,
                    },
                }))
            }
            Move::Relocate(plan, to) => {
                let Some(from) = self.machine_of(*plan).map(str::to_string) else {
                    return Ok(None);
                };
                if from == *to || !self.queues.contains_key(to) {
                    return Ok(None);
                }
                let Some(queue) = self.queues.get_mut(&from) else {
                    return Ok(None);
                };
                let Some(index) = queue.iter().position(|id| id == plan) else {
                    return Ok(None);
                };
                queue.remove(index);
                self.push(to, *plan);
                Ok(Some(AppliedMove {
                    touched: vec![from.clone(), to.clone()],
                    undo: Undo::Relocate {
                        plan: *plan,
                        from,
                        index,
                        to: to.clone(),
                    },
                }))
            }
        }
    }

    /// 還原移動
    pub fn undo(&mut self, applied: AppliedMove) {
        match applied.undo {
            Undo::Swap { machine, first, second } => {
                if let Some(queue) = self.queues.get_mut(&machine) {
                    queue.swap(first, second);
                }
            }
            Undo::Relocate { plan, from, index, to } => {
                if let Some(queue) = self.queues.get_mut(&to) {
                    queue.retain(|id| *id != plan);
                }
                if let Some(queue) = self.queues.get_mut(&from) {
                    queue.insert(index.min(queue.len()), plan);
                }
            }
        }
    }
}

/// 位置是否夾在兩筆相同產品之間（三筆連續相同）
fn inside_run(problem: &TorcProblem, queue: &[PlanId], position: usize) -> Result<bool> {
    if position == 0 || position + 1 >= queue.len() {
        return Ok(false);
    }
    let item = &problem.op(queue[position])?.item;
    Ok(problem.op(queue[position - 1])?.item == *item && problem.op(queue[position + 1])?.item == *item)
}
