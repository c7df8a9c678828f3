//! Pick the best model out of a finished sweep

use std::cmp::Ordering;

use crate::error::{Result, TopicError};
use crate::model::{HyperParams, TrainedModel};
use crate::sweep::ResultTable;

/// Highest coherence wins; ties go to fewer topics, then fewer passes,
/// then the count encoding.
pub fn select_best(table: &ResultTable) -> Result<(HyperParams, &TrainedModel)> {
    let mut best: Option<(HyperParams, &TrainedModel, f64)> = None;

    for (params, entry) in table.iter() {
        let (Some(model), Some(score)) = (entry.model(), entry.coherence()) else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }
        let better = match &best {
            None => true,
            // Scores are finite here, and 0.0 must tie with -0.0
            Some((best_params, _, best_score)) => match score.partial_cmp(best_score) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => params < best_params,
                _ => false,
            },
        };
        if better {
            best = Some((*params, model, score));
        }
    }

    best.map(|(params, model, _)| (params, model))
        .ok_or(TopicError::NoSuccessfulModel {
            entries: table.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::EncodingKind;
    use crate::sweep::{Outcome, SweepEntry};
    use std::time::Duration;

    fn params(topic_count: usize, iteration_budget: usize) -> HyperParams {
        HyperParams {
            topic_count,
            iteration_budget,
            encoding: EncodingKind::Count,
        }
    }

    fn success(p: HyperParams, coherence: f64) -> SweepEntry {
        let k = p.topic_count;
        let model = TrainedModel::from_parts(
            p,
            0,
            vec![1.0 / k as f64; k],
            vec![vec![1.0, 2.0]; k],
            vec![],
        );
        SweepEntry {
            seed: 0,
            duration: Duration::ZERO,
            outcome: Outcome::Succeeded { model, coherence },
        }
    }

    fn failure() -> SweepEntry {
        SweepEntry {
            seed: 0,
            duration: Duration::ZERO,
            outcome: Outcome::Failed {
                reason: "invalid_hyperparameter".into(),
            },
        }
    }

    #[test]
    fn test_picks_max_coherence() {
        let mut table = ResultTable::new();
        table.insert(params(2, 1), success(params(2, 1), 0.31));
        table.insert(params(3, 1), success(params(3, 1), 0.45));
        table.insert(params(4, 1), failure());

        let (best, model) = select_best(&table).unwrap();
        assert_eq!(best, params(3, 1));
        assert_eq!(model.num_topics(), 3);
    }

    #[test]
    fn test_tie_prefers_fewer_topics_then_passes() {
        let mut table = ResultTable::new();
        table.insert(params(5, 1), success(params(5, 1), 0.5));
        table.insert(params(2, 9), success(params(2, 9), 0.5));
        table.insert(params(2, 3), success(params(2, 3), 0.5));
        table.insert(params(1, 1), success(params(1, 1), 0.2));

        let (best, _) = select_best(&table).unwrap();
        assert_eq!(best, params(2, 3));
    }

    #[test]
    fn test_signed_zero_scores_tie() {
        let mut table = ResultTable::new();
        table.insert(params(3, 1), success(params(3, 1), 0.0));
        table.insert(params(2, 1), success(params(2, 1), -0.0));

        let (best, _) = select_best(&table).unwrap();
        assert_eq!(best, params(2, 1));
    }

    #[test]
    fn test_no_successful_model() {
        let mut table = ResultTable::new();
        table.insert(params(2, 1), failure());
        let err = select_best(&table).unwrap_err();
        assert!(matches!(err, TopicError::NoSuccessfulModel { entries: 1 }));

        let err = select_best(&ResultTable::new()).unwrap_err();
        assert!(matches!(err, TopicError::NoSuccessfulModel { entries: 0 }));
    }
}
