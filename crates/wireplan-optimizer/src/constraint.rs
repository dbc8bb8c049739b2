//! 約束求解：0/1 裝箱 MILP

use good_lp::{default_solver, variable, variables, Expression, Solution, SolverModel, Variable};
use wireplan_core::{PlanError, Result};

/// 允許的（物品, 箱）配對與其價值係數
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllowedPair {
    pub item: usize,
    pub bin: usize,
    pub value: f64,
}

/// 裝箱問題
///
/// 最大化 Σ value·x，限制每個物品至多裝入一箱，
/// 每箱重量不超過容量、件數不超過槽數。
#[derive(Debug, Clone, Default)]
pub struct PackingProblem {
    pub item_weights: Vec<f64>,
    pub bin_weight_caps: Vec<f64>,
    pub bin_slot_caps: Vec<u32>,
    pub pairs: Vec<AllowedPair>,
}

impl PackingProblem {
    pub fn new(item_weights: Vec<f64>, bin_weight_caps: Vec<f64>, bin_slot_caps: Vec<u32>) -> Self {
        Self {
            item_weights,
            bin_weight_caps,
            bin_slot_caps,
            pairs: Vec::new(),
        }
    }

    /// 允許物品裝入某箱
    pub fn allow(&mut self, item: usize, bin: usize, value: f64) {
        self.pairs.push(AllowedPair { item, bin, value });
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 驗證索引與維度
    pub fn validate(&self) -> Result<()> {
        if self.bin_weight_caps.len() != self.bin_slot_caps.len() {
            return Err(PlanError::Solver(format!(
                "箱容量 {} 筆與槽數 {} 筆不一致",
                self.bin_weight_caps.len(),
                self.bin_slot_caps.len()
            )));
        }
        for pair in &self.pairs {
            if pair.item >= self.item_weights.len() || pair.bin >= self.bin_weight_caps.len() {
                return Err(PlanError::Solver(format!(
                    "配對 ({}, {}) 超出範圍",
                    pair.item, pair.bin
                )));
            }
        }
        Ok(())
    }
}

/// 裝箱結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackingAssignment {
    /// (物品, 箱)
    pub assigned: Vec<(usize, usize)>,

    /// 目標值
    pub objective: f64,
}

impl PackingAssignment {
    /// 物品被裝入的箱
    pub fn bin_of(&self, item: usize) -> Option<usize> {
        self.assigned.iter().find(|(i, _)| *i == item).map(|(_, b)| *b)
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// 裝箱求解器介面
///
/// 回傳 `Ok(None)` 代表無可行解（或沒有任何允許配對）。
pub trait BinPackingSolver: Send + Sync {
    fn solve(&self, problem: &PackingProblem) -> Result<Option<PackingAssignment>>;
}

/// 以 good_lp 建模的 MILP 裝箱求解器
#[derive(Debug, Clone, Copy, Default)]
pub struct MilpBinPacker;

impl BinPackingSolver for MilpBinPacker {
    fn solve(&self, problem: &PackingProblem) -> Result<Option<PackingAssignment>> {
        problem.validate()?;
        if problem.is_empty() {
            return Ok(None);
        }

        let mut vars = variables!();
        let xs: Vec<Variable> = problem
            .pairs
            .iter()
            .map(|_| vars.add(variable().binary()))
            .collect();

        let objective: Expression = problem
            .pairs
            .iter()
            .zip(&xs)
            .fold(Expression::from(0.0), |acc, (pair, x)| acc + pair.value * *x);

        let mut model = vars.maximise(objective).using(default_solver);

        // 每個物品至多一箱
        for item in 0..problem.item_weights.len() {
            let terms: Vec<Variable> = problem
                .pairs
                .iter()
                .zip(&xs)
                .filter(|(p, _)| p.item == item)
                .map(|(_, x)| *x)
                .collect();
            if terms.len() > 1 {
                let sum: Expression = terms.into_iter().fold(Expression::from(0.0), |acc, x| acc + x);
                model.add_constraint(sum.leq(1.0));
            }
        }

        // 每箱重量與槽數上限
        for bin in 0..problem.bin_weight_caps.len() {
            let members: Vec<(&AllowedPair, Variable)> = problem
                .pairs
                .iter()
                .zip(&xs)
                .filter(|(p, _)| p.bin == bin)
                .map(|(p, x)| (p, *x))
                .collect();
            if members.is_empty() {
                continue;
            }

            let weight: Expression = members
                .iter()
                .fold(Expression::from(0.0), |acc, (p, x)| acc + problem.item_weights[p.item] * *x);
            model.add_constraint(weight.leq(problem.bin_weight_caps[bin]));

            let slots: Expression = members.iter().fold(Expression::from(0.0), |acc, (_, x)| acc + *x);
            model.add_constraint(slots.leq(problem.bin_slot_caps[bin] as f64));
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(err) => {
                tracing::debug!("裝箱求解失敗：{}", err);
                return Ok(None);
            }
        };

        let mut assignment = PackingAssignment::default();
        for (pair, x) in problem.pairs.iter().zip(&xs) {
            if solution.value(*x) >= 0.5 {
                assignment.assigned.push((pair.item, pair.bin));
                assignment.objective += pair.value;
            }
        }
        Ok(Some(assignment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_problem_is_infeasible() {
        let problem = PackingProblem::new(vec![1.0], vec![10.0], vec![1]);
        assert_eq!(MilpBinPacker.solve(&problem).unwrap(), None);
    }

    #[test]
    fn test_respects_weight_capacity() {
        // 三件各重 4，單箱容量 10：最多裝兩件，挑價值高者
        let mut problem = PackingProblem::new(vec![4.0, 4.0, 4.0], vec![10.0], vec![5]);
        problem.allow(0, 0, 1.0);
        problem.allow(1, 0, 5.0);
        problem.allow(2, 0, 3.0);

        let assignment = MilpBinPacker.solve(&problem).unwrap().unwrap();
        assert_eq!(assignment.assigned.len(), 2);
        assert_eq!(assignment.bin_of(0), None);
        assert_eq!(assignment.bin_of(1), Some(0));
        assert_eq!(assignment.bin_of(2), Some(0));
        assert!((assignment.objective - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_respects_slot_capacity_and_single_bin() {
        let mut problem = PackingProblem::new(vec![1.0, 1.0, 1.0], vec![100.0, 100.0], vec![1, 1]);
        for item in 0..3 {
            problem.allow(item, 0, 1.0);
            problem.allow(item, 1, 1.0);
        }

        let assignment = MilpBinPacker.solve(&problem).unwrap().unwrap();
        assert_eq!(assignment.assigned.len(), 2);
        let bins: Vec<usize> = assignment.assigned.iter().map(|(_, b)| *b).collect();
        assert!(bins.contains(&0) && bins.contains(&1));
    }

    #[test]
    fn test_invalid_pair_is_an_error() {
        let mut problem = PackingProblem::new(vec![1.0], vec![1.0], vec![1]);
        problem.allow(3, 0, 1.0);
        assert!(matches!(MilpBinPacker.solve(&problem), Err(PlanError::Solver(_))));
    }
}
