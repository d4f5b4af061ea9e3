//! End-to-end scenarios for the model driver and predictors.
//!
//! Fixtures use a binary alphabet (base probability 0.5) and seeded
//! sampling, so every run is deterministic.

use seqmem_core::{
    AddRemoveRestaurant, CountRestaurant, GradientParameters, HpypModel, ModelConfig,
    Parameters, PredictMode, Restaurant, SeatingRestaurant,
};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

fn binary_config(seed: u64) -> ModelConfig {
    ModelConfig {
        seed,
        ..ModelConfig::new(2)
    }
}

fn seating_model(discount: f64, seed: u64) -> HpypModel<SeatingRestaurant, GradientParameters> {
    HpypModel::new(
        SeatingRestaurant,
        GradientParameters::with_uniform_discount(discount),
        binary_config(seed),
    )
    .unwrap()
}

/// Pseudo-random but fully deterministic binary sequence.
fn noise_sequence(len: usize) -> Vec<usize> {
    (0..len)
        .map(|i| ((i.wrapping_mul(2_654_435_761) >> 7) ^ (i >> 3)) & 1)
        .collect()
}

/// Observations currently seated in the tree: customers not accounted for
/// by child tables.
fn seated_observations<R, P>(model: &HpypModel<R, P>) -> isize
where
    R: AddRemoveRestaurant,
    P: Parameters,
{
    let mut total = 0isize;
    model.tree().visit_with_children(|node, children| {
        total += model.restaurant().customers(model.tree().payload(node.id)) as isize;
        for child in children {
            total -= model.restaurant().tables(model.tree().payload(child.id)) as isize;
        }
    });
    total
}

mod empty_history {
    use super::*;

    #[test]
    fn root_only_model_predicts_the_base_rate() {
        let model = seating_model(0.5, 0);
        assert_eq!(model.predict(0, 0, 0).unwrap(), 0.5);
        assert_eq!(model.predict(0, 0, 1).unwrap(), 0.5);
        let dist = model.predictive_distribution(0, 0).unwrap();
        assert!(approx_eq(dist.iter().sum::<f64>(), 1.0, 1e-12));
    }
}

mod single_observation {
    use super::*;

    #[test]
    fn one_seated_zero_shifts_the_root_predictive() {
        let mut model = seating_model(0.5, 0);
        model.append(&[0]).unwrap();
        model.insert_root(0).unwrap();
        // c_0 = t_0 = 1, d = 0.5, a = 0:
        // (1 - 0.5)/1 + (0.5/1) * 0.5 = 0.75
        assert!(approx_eq(model.predict(0, 1, 0).unwrap(), 0.75, 1e-12));
        assert_eq!(seated_observations(&model), 1);
    }
}

mod losses {
    use super::*;

    #[test]
    fn short_sequence_losses_start_at_the_base_rate() {
        let mut model = seating_model(0.5, 1);
        model.append(&[0, 0, 1, 0]).unwrap();
        let losses = model.compute_losses(0, 4).unwrap();
        assert_eq!(losses.len(), 4);
        assert!(approx_eq(losses[0], 1.0, 1e-12), "first symbol costs log2 K");
        assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
        // the final 0 continues the majority symbol and is cheap
        assert!(losses[3] <= 1.0, "losses = {losses:?}");
        assert!(model.check_consistency());
    }

    #[test]
    fn repetitive_sequences_compress_below_the_base_rate() {
        let mut model = HpypModel::new(
            SeatingRestaurant,
            GradientParameters::default(),
            binary_config(2),
        )
        .unwrap();
        let seq: Vec<usize> = (0..200).map(|i| i % 2).collect();
        model.append(&seq).unwrap();
        let losses = model.compute_losses(0, 200).unwrap();
        let late: f64 = losses[100..].iter().sum::<f64>() / 100.0;
        assert!(
            late < 0.5,
            "an alternating sequence should cost well under 1 bit, got {late}"
        );
    }
}

mod sliding_window {
    use super::*;

    #[test]
    fn deletion_lag_keeps_exactly_lag_observations() {
        let mut model = seating_model(0.5, 3);
        model.append(&[0, 1, 0, 1, 0, 1]).unwrap();
        let losses = model.compute_losses_with_deletion(0, 6, 2).unwrap();
        assert_eq!(losses.len(), 6);
        assert_eq!(
            seated_observations(&model),
            2,
            "every position up to e - lag must have been removed exactly once"
        );
        assert!(model.check_consistency());
    }

    #[test]
    fn lag_beyond_the_range_removes_nothing() {
        let mut model = seating_model(0.5, 3);
        model.append(&[0, 1, 0, 1, 0, 1]).unwrap();
        model.compute_losses_with_deletion(0, 6, 6).unwrap();
        assert_eq!(seated_observations(&model), 6);
    }

    #[test]
    fn window_runs_hold_fewer_observations_than_full_runs() {
        let seq = noise_sequence(80);
        let mut full = seating_model(0.5, 4);
        full.append(&seq).unwrap();
        full.compute_losses(0, 80).unwrap();
        let mut windowed = seating_model(0.5, 4);
        windowed.append(&seq).unwrap();
        windowed.compute_losses_with_deletion(0, 80, 8).unwrap();
        assert_eq!(seated_observations(&full), 80);
        assert_eq!(seated_observations(&windowed), 8);
    }
}

mod fragmentation {
    use super::*;

    /// Build [0, 1, 0, 1] so that the context "1 0" only exists virtually,
    /// two symbols into the edge from "0" down to "0 1 0".
    fn edge_split_fixture(seed: u64) -> HpypModel<SeatingRestaurant, GradientParameters> {
        let mut model = seating_model(0.5, seed);
        model.append(&[0, 1, 0, 1]).unwrap();
        model.compute_losses(0, 4).unwrap();
        model
    }

    #[test]
    fn fragment_prediction_differs_from_above() {
        let mut model = edge_split_fixture(5);
        let above = model.predict(1, 3, 1).unwrap();
        let fragment = model.predict_with_fragmentation(1, 3, 1).unwrap();
        let below = model.predict_below(1, 3, 1).unwrap();
        for p in [above, fragment, below] {
            assert!(p > 0.0 && p < 1.0);
        }
        // the transient restaurant holds the fragmented tables, so its
        // smoothing pulls the estimate away from the plain suffix path
        assert!(
            (fragment - above).abs() > 1e-9,
            "fragment={fragment} above={above}"
        );
    }

    #[test]
    fn fragment_prediction_is_nondestructive() {
        let mut model = edge_split_fixture(6);
        let dist_before = model.predictive_distribution(1, 3).unwrap();
        let consistent_before = model.check_consistency();
        for symbol in 0..2 {
            model.predict_with_fragmentation(1, 3, symbol).unwrap();
        }
        assert_eq!(model.predictive_distribution(1, 3).unwrap(), dist_before);
        assert_eq!(model.check_consistency(), consistent_before);
    }

    #[test]
    fn exact_contexts_make_all_three_modes_agree() {
        let mut model = edge_split_fixture(7);
        // context [0, 3) exists as a real node
        let above = model.predict(0, 3, 1).unwrap();
        let fragment = model.predict_with_fragmentation(0, 3, 1).unwrap();
        let below = model.predict_below(0, 3, 1).unwrap();
        assert!(approx_eq(above, fragment, 1e-12));
        assert!(approx_eq(above, below, 1e-12));
    }

    #[test]
    fn predict_sequence_covers_all_modes() {
        let mut model = edge_split_fixture(8);
        for mode in [PredictMode::Above, PredictMode::Fragment, PredictMode::Below] {
            let probs = model.predict_sequence(0, 4, mode).unwrap();
            assert_eq!(probs.len(), 4);
            assert!(probs.iter().all(|p| *p > 0.0 && *p < 1.0));
        }
    }
}

mod distribution {
    use super::*;

    #[test]
    fn predictive_distributions_normalize_for_both_representations() {
        let seq = noise_sequence(64);

        let mut seating = seating_model(0.5, 9);
        seating.append(&seq).unwrap();
        seating.compute_losses(0, 64).unwrap();

        let mut compact = HpypModel::new(
            CountRestaurant,
            GradientParameters::default(),
            binary_config(9),
        )
        .unwrap();
        compact.append(&seq).unwrap();
        compact.compute_losses(0, 64).unwrap();

        for end in [0, 1, 7, 31, 64] {
            for dist in [
                seating.predictive_distribution(0, end).unwrap(),
                compact.predictive_distribution(0, end).unwrap(),
            ] {
                let total: f64 = dist.iter().sum();
                assert!(approx_eq(total, 1.0, 1e-9), "end={end} total={total}");
                assert!(dist.iter().all(|p| *p > 0.0 && *p < 1.0));
            }
        }
    }

    #[test]
    fn mixing_distribution_stays_normalized() {
        let mut model = seating_model(0.5, 10);
        model.append(&noise_sequence(32)).unwrap();
        model.compute_losses(0, 32).unwrap();
        let dist = model
            .predictive_distribution_with_mixing(0, 20, &[0.25, 0.25, 0.25])
            .unwrap();
        assert!(approx_eq(dist.iter().sum::<f64>(), 1.0, 1e-9));
    }
}

mod reversibility {
    use super::*;

    #[test]
    fn removing_every_observation_in_reverse_empties_the_model() {
        let seq = noise_sequence(1000);
        let mut model = HpypModel::new(
            SeatingRestaurant,
            GradientParameters::default(),
            binary_config(11),
        )
        .unwrap();
        model.append(&seq).unwrap();
        model.compute_losses(0, 1000).unwrap();
        assert_eq!(seated_observations(&model), 1000);

        for i in (1..1000).rev() {
            model.remove_observation(0, i, seq[i], None).unwrap();
        }
        model.remove_observation(0, 0, seq[0], None).unwrap();

        for payload in model.tree().payloads() {
            assert_eq!(model.restaurant().customers(payload), 0);
            assert_eq!(model.restaurant().tables(payload), 0);
        }
        assert!(model.check_consistency());
    }

    #[test]
    fn compact_representation_is_reversible_too() {
        let seq = noise_sequence(300);
        let mut model = HpypModel::new(
            CountRestaurant,
            GradientParameters::default(),
            binary_config(12),
        )
        .unwrap();
        model.append(&seq).unwrap();
        model.compute_losses(0, 300).unwrap();
        for i in (1..300).rev() {
            model.remove_observation(0, i, seq[i], None).unwrap();
        }
        model.remove_observation(0, 0, seq[0], None).unwrap();
        for payload in model.tree().payloads() {
            assert_eq!(model.restaurant().customers(payload), 0);
            assert_eq!(model.restaurant().tables(payload), 0);
        }
    }
}

mod reseating {
    use super::*;

    #[test]
    fn remove_add_sweep_preserves_observations() {
        let seq = noise_sequence(120);
        let mut model = seating_model(0.5, 13);
        model.append(&seq).unwrap();
        model.compute_losses(0, 120).unwrap();
        let before = seated_observations(&model);
        model.remove_add_sweep(0, 120).unwrap();
        assert_eq!(seated_observations(&model), before);
        assert!(model.check_consistency());
    }
}
