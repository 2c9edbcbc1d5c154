use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::judge::JudgeResult;

/// Score threshold shared by the score-based strategies.
pub const PASS_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    #[default]
    WeightedAverage,
    MajorityPass,
    AllMustPass,
    AnyPass,
    MinScore,
    MaxScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub strategy: AggregationStrategy,
    pub passed: bool,
    pub final_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub score_stddev: f64,
    /// Percent of judges whose verdict was PASS.
    pub pass_rate: f64,
    pub total_execution_time_ms: u64,
    pub total_cost_usd: f64,
    pub dimension_averages: HashMap<String, f64>,
    pub results: Vec<JudgeResult>,
}

/// Combine ordered judge verdicts. `weights` aligns with `results`; a
/// missing weight counts as 1.
pub fn aggregate(
    results: Vec<JudgeResult>,
    weights: &[Option<f64>],
    strategy: AggregationStrategy,
) -> AggregateResult {
    let n = results.len();
    let scores: Vec<f64> = results.iter().map(|r| r.overall_score).collect();

    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (i, score) in scores.iter().enumerate() {
        let weight = weights.get(i).copied().flatten().unwrap_or(1.0);
        weight_sum += weight;
        weighted_sum += score * weight;
    }
    let final_score = if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    };

    let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let min_score = if min_score.is_finite() { min_score } else { 0.0 };
    let max_score = scores.iter().copied().fold(0.0, f64::max);

    let score_stddev = if n > 0 {
        let mean = scores.iter().sum::<f64>() / n as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        variance.sqrt()
    } else {
        0.0
    };

    let pass_count = results.iter().filter(|r| r.verdict == "PASS").count();
    let pass_rate = if n > 0 {
        pass_count as f64 / n as f64 * 100.0
    } else {
        0.0
    };

    let total_execution_time_ms = results.iter().map(|r| r.execution_time_ms).sum();
    let total_cost_usd = results.iter().map(|r| r.cost_usd).sum();

    let mut dimension_sums: HashMap<String, (f64, usize)> = HashMap::new();
    for result in &results {
        for (name, score) in &result.dimension_scores {
            let entry = dimension_sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    let dimension_averages = dimension_sums
        .into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect();

    let passed = match strategy {
        AggregationStrategy::WeightedAverage => final_score >= PASS_THRESHOLD,
        AggregationStrategy::MajorityPass => pass_count * 2 > n,
        AggregationStrategy::AllMustPass => n > 0 && pass_count == n,
        AggregationStrategy::AnyPass => pass_count > 0,
        AggregationStrategy::MinScore => n > 0 && min_score >= PASS_THRESHOLD,
        AggregationStrategy::MaxScore => max_score >= PASS_THRESHOLD,
    };

    AggregateResult {
        strategy,
        passed,
        final_score,
        min_score,
        max_score,
        score_stddev,
        pass_rate,
        total_execution_time_ms,
        total_cost_usd,
        dimension_averages,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64, verdict: &str) -> JudgeResult {
        JudgeResult {
            judge_id: id.to_string(),
            judge_name: id.to_string(),
            overall_score: score,
            verdict: verdict.to_string(),
            reasoning: String::new(),
            suggestions: Vec::new(),
            dimension_scores: HashMap::new(),
            execution_time_ms: 100,
            cost_usd: 0.001,
        }
    }

    #[test]
    fn weighted_average_at_threshold_passes() {
        let results = vec![result("a", 90.0, "PASS"), result("b", 70.0, "PASS")];
        let agg = aggregate(results, &[None, None], AggregationStrategy::WeightedAverage);
        assert_eq!(agg.final_score, 80.0);
        assert!(agg.passed);

        let results = vec![result("a", 90.0, "PASS"), result("b", 60.0, "FAIL")];
        let agg = aggregate(results, &[None, None], AggregationStrategy::WeightedAverage);
        assert_eq!(agg.final_score, 75.0);
        assert!(!agg.passed);
    }

    #[test]
    fn explicit_weights_shift_the_average() {
        let results = vec![result("a", 100.0, "PASS"), result("b", 0.0, "FAIL")];
        let agg = aggregate(
            results,
            &[Some(3.0), Some(1.0)],
            AggregationStrategy::WeightedAverage,
        );
        assert_eq!(agg.final_score, 75.0);
    }

    #[test]
    fn majority_pass_requires_strict_majority() {
        let results = vec![
            result("a", 90.0, "PASS"),
            result("b", 90.0, "FAIL"),
        ];
        let agg = aggregate(results, &[], AggregationStrategy::MajorityPass);
        // 1 of 2 is not a majority
        assert!(!agg.passed);

        let results = vec![
            result("a", 90.0, "PASS"),
            result("b", 90.0, "PASS"),
            result("c", 90.0, "FAIL"),
        ];
        let agg = aggregate(results, &[], AggregationStrategy::MajorityPass);
        assert!(agg.passed);
    }

    #[test]
    fn all_any_min_max_strategies() {
        let results = vec![result("a", 95.0, "PASS"), result("b", 75.0, "FAIL")];

        let agg = aggregate(results.clone(), &[], AggregationStrategy::AllMustPass);
        assert!(!agg.passed);

        let agg = aggregate(results.clone(), &[], AggregationStrategy::AnyPass);
        assert!(agg.passed);

        let agg = aggregate(results.clone(), &[], AggregationStrategy::MinScore);
        assert!(!agg.passed);
        assert_eq!(agg.min_score, 75.0);

        let agg = aggregate(results, &[], AggregationStrategy::MaxScore);
        assert!(agg.passed);
        assert_eq!(agg.max_score, 95.0);
    }

    #[test]
    fn pass_rate_and_totals() {
        let results = vec![
            result("a", 90.0, "PASS"),
            result("b", 80.0, "PASS"),
            result("c", 40.0, "FAIL"),
        ];
        let agg = aggregate(results, &[], AggregationStrategy::WeightedAverage);
        assert!((agg.pass_rate - 66.666).abs() < 0.01);
        assert_eq!(agg.total_execution_time_ms, 300);
        assert!((agg.total_cost_usd - 0.003).abs() < 1e-9);
    }

    #[test]
    fn dimension_averages_only_over_reporting_judges() {
        let mut a = result("a", 90.0, "PASS");
        a.dimension_scores.insert("clarity".to_string(), 80.0);
        a.dimension_scores.insert("accuracy".to_string(), 100.0);
        let mut b = result("b", 70.0, "FAIL");
        b.dimension_scores.insert("clarity".to_string(), 60.0);

        let agg = aggregate(vec![a, b], &[], AggregationStrategy::WeightedAverage);
        assert_eq!(agg.dimension_averages.get("clarity"), Some(&70.0));
        assert_eq!(agg.dimension_averages.get("accuracy"), Some(&100.0));
    }

    #[test]
    fn stddev_of_identical_scores_is_zero() {
        let results = vec![result("a", 80.0, "PASS"), result("b", 80.0, "PASS")];
        let agg = aggregate(results, &[], AggregationStrategy::WeightedAverage);
        assert_eq!(agg.score_stddev, 0.0);
    }
}
