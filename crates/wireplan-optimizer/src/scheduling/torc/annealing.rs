//! 模擬退火

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wireplan_cache::{IncrementalObjective, MachineScore};
use wireplan_core::{AnnealingConfig, Checkpoint, PlanError, Result};

use super::{MoveGenerator, MoveMemory, TorcEvaluator, TorcProblem, TorcSolution};

/// 幾何冷卻：`T(k+1) = T(k) × alpha`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricCooling {
    initial: f64,
    current: f64,
    alpha: f64,
    min_temp: f64,
}

impl GeometricCooling {
    pub fn new(initial: f64, alpha: f64, min_temp: f64) -> Self {
        Self {
            initial,
            current: initial,
            alpha,
            min_temp,
        }
    }

    /// 初始溫度與作業數成正比
    pub fn from_config(config: &AnnealingConfig, operations: usize) -> Self {
        Self::new(
            config.initial_temperature_per_op * operations as f64,
            config.cooling_factor,
            config.final_temperature,
        )
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn update(&mut self) {
        self.current *= self.alpha;
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// 溫度不高於終止溫度
    pub fn is_frozen(&self) -> bool {
        self.current <= self.min_temp
    }
}

/// 退火統計
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnnealingStats {
    pub iterations: usize,
    pub temperature_steps: usize,
    pub accepted: usize,
    pub improved: usize,
    pub skipped: usize,
}

/// 模擬退火求解器
pub struct Annealer<'a> {
    problem: &'a TorcProblem,
    evaluator: &'a TorcEvaluator<'a>,
    config: &'a AnnealingConfig,
}

impl<'a> Annealer<'a> {
    pub fn new(problem: &'a TorcProblem, evaluator: &'a TorcEvaluator<'a>, config: &'a AnnealingConfig) -> Self {
        Self {
            problem,
            evaluator,
            config,
        }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// 從初始解開始退火，回傳最佳解與其目標值
    ///
    /// 延遲成本下降即接受，否則以 `exp(-Δ/T)` 機率接受。最佳解在延遲成本更低，
    /// 或相同但提前完工更多時更新，並清除失敗移動記憶。
    pub fn run(
        &self,
        initial: TorcSolution,
        checkpoint: &mut Checkpoint,
    ) -> Result<(TorcSolution, MachineScore, AnnealingStats)> {
        let mut objective: IncrementalObjective<String> = IncrementalObjective::new();
        objective.rebuild(self.evaluator.score_all(&initial.queues)?);

        let mut current = initial;
        let mut best = current.clone();
        let mut best_score = objective.total();
        let mut stats = AnnealingStats::default();

        let generator = MoveGenerator::new(self.problem);
        let mut memory = MoveMemory::new();
        let mut rng = self.rng();
        let mut cooling = GeometricCooling::from_config(self.config, self.problem.movable().len());

        while !cooling.is_frozen() {
            for _ in 0..self.config.moves_per_temperature {
                stats.iterations += 1;
                checkpoint.tick()?;

                let Some(mv) = generator.propose(&mut rng, stats.iterations, &memory)? else {
                    stats.skipped += 1;
                    continue;
                };
                let Some(applied) = current.apply(self.problem, &mv)? else {
                    memory.remember(&mv);
                    continue;
                };

                for machine in &applied.touched {
                    objective.mark_dirty(machine.clone());
                }
                let proposal = objective.propose(|machine| self.evaluator.score(machine, current.queue(machine)))?;
                let delta = proposal.total.tardiness - objective.total().tardiness;

                if delta < 0.0 {
                    objective.commit(proposal);
                    stats.accepted += 1;
                    let score = objective.total();
                    if score.tardiness < best_score.tardiness
                        || (score.tardiness == best_score.tardiness && score.early > best_score.early)
                    {
                        best = current.clone();
                        best_score = score;
                        stats.improved += 1;
                        memory.clear();
                    }
                } else if rng.gen::<f64>() < (-delta / cooling.current()).exp() {
                    objective.commit(proposal);
                    stats.accepted += 1;
                } else {
                    current.undo(applied);
                    memory.remember(&mv);
                }
            }

            cooling.update();
            stats.temperature_steps += 1;
            if stats.temperature_steps % 100 == 0 {
                tracing::debug!(
                    "退火溫度 {:.3}：目前 {:.1}、最佳 {:.1}",
                    cooling.current(),
                    objective.total().tardiness,
                    best_score.tardiness
                );
            }
        }

        if best.len() != self.problem.movable().len() {
            return Err(PlanError::InvariantViolation(format!(
                "退火結果作業數 {} 與問題作業數 {} 不符",
                best.len(),
                self.problem.movable().len()
            )));
        }
        Ok((best, best_score, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::torc::tests::with_orders;
    use wireplan_core::{CancellationToken, PlanId, PlantVariant, ShiftCalendar};

    #[test]
    fn test_geometric_cooling() {
        let config = AnnealingConfig::default();
        let mut cooling = GeometricCooling::from_config(&config, 4);
        assert_eq!(cooling.current(), 2000.0);
        cooling.update();
        assert!((cooling.current() - 1980.0).abs() < 1e-9);
        assert!(!cooling.is_frozen());
        cooling.reset();
        assert_eq!(cooling.current(), 2000.0);

        assert!(GeometricCooling::from_config(&config, 0).is_frozen());
    }

    #[test]
    fn test_annealing_never_worse_than_initial() {
        let ctx = with_orders(&[("A", 7), ("B", 7), ("A", 7), ("B", 7), ("C", 7)]);
        let problem = TorcProblem::new(&ctx, &ShiftCalendar::three_shifts()).unwrap();
        let config = AnnealingConfig {
            moves_per_temperature: 20,
            final_temperature: 1.0,
            ..AnnealingConfig::default().with_seed(42)
        };
        let evaluator = TorcEvaluator::new(&problem, &config);

        // 全部擠在 B02（C 只能在 B02）
        let mut initial = TorcSolution::new(problem.machines());
        for id in problem.movable() {
            initial.push("B02", *id);
        }
        let initial_score: f64 = evaluator
            .score_all(&initial.queues)
            .unwrap()
            .iter()
            .map(|(_, s)| s.tardiness)
            .sum();

        let mut checkpoint = Checkpoint::new(CancellationToken::new(), 10);
        let (best, score, stats) = Annealer::new(&problem, &evaluator, &config)
            .run(initial, &mut checkpoint)
            .unwrap();

        assert!(score.tardiness <= initial_score);
        assert_eq!(best.len(), 5);
        assert!(stats.iterations > 0);
        assert_eq!(best.machine_of(PlanId(5)), Some("B02"));
    }

    #[test]
    fn test_annealing_without_operations() {
        let ctx = with_orders(&[]);
        let problem = TorcProblem::new(&ctx, &ShiftCalendar::three_shifts()).unwrap();
        let config = AnnealingConfig::default();
        let evaluator = TorcEvaluator::new(&problem, &config);
        let initial = problem.initial_solution(PlantVariant::Simple).unwrap();

        let mut checkpoint = Checkpoint::new(CancellationToken::new(), 10);
        let (best, score, stats) = Annealer::new(&problem, &evaluator, &config)
            .run(initial, &mut checkpoint)
            .unwrap();
        assert!(best.is_empty());
        assert_eq!(score, MachineScore::default());
        assert_eq!(stats.iterations, 0);
    }
}
