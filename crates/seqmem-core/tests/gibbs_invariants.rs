//! Sampler invariants: seating-structure conservation, consistency after
//! sweeps, and log-joint sanity for both restaurant representations.

use seqmem_core::{
    AddRemoveRestaurant, CountRestaurant, GradientParameters, HpypModel, ModelConfig,
    Parameters, SeatingRestaurant,
};

fn config(seed: u64) -> ModelConfig {
    ModelConfig {
        seed,
        ..ModelConfig::new(3)
    }
}

/// A ternary sequence with enough repeated structure to grow a deep tree
/// with multi-customer restaurants.
fn fixture_sequence() -> Vec<usize> {
    let pattern = [0usize, 1, 2, 0, 1, 0, 2, 2, 1, 0];
    (0..150).map(|i| pattern[i % pattern.len()]).collect()
}

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

#[test]
fn add_remove_sweeps_leave_a_consistent_model() {
    let mut model = HpypModel::new(
        SeatingRestaurant,
        GradientParameters::default(),
        config(101),
    )
    .unwrap();
    let seq = fixture_sequence();
    model.append(&seq).unwrap();
    model.compute_losses(0, seq.len()).unwrap();
    let seated = seated_observations(&model);
    assert_eq!(seated, seq.len() as isize);

    for sweep in 0..5 {
        model.gibbs_sweep_add_remove();
        assert!(model.check_consistency(), "sweep {sweep}");
        assert_eq!(seated_observations(&model), seated, "sweep {sweep}");
        let dist = model.predictive_distribution(0, seq.len()).unwrap();
        let total: f64 = dist.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn direct_sweeps_leave_a_consistent_model() {
    let mut model =
        HpypModel::new(CountRestaurant, GradientParameters::default(), config(102)).unwrap();
    let seq = fixture_sequence();
    model.append(&seq).unwrap();
    model.compute_losses(0, seq.len()).unwrap();
    let seated = seated_observations(&model);

    for sweep in 0..5 {
        model.gibbs_sweep_direct();
        assert!(model.check_consistency(), "sweep {sweep}");
        assert_eq!(seated_observations(&model), seated, "sweep {sweep}");
    }
}

#[test]
fn log_joint_stays_finite_and_nonpositive_across_sweeps() {
    let mut model =
        HpypModel::new(CountRestaurant, GradientParameters::default(), config(103)).unwrap();
    let seq = fixture_sequence();
    model.append(&seq).unwrap();
    model.compute_losses(0, seq.len()).unwrap();

    let mut values = Vec::new();
    values.push(model.log_joint());
    for _ in 0..8 {
        model.gibbs_sweep_direct();
        values.push(model.log_joint());
    }
    for v in &values {
        assert!(v.is_finite());
        assert!(*v <= 1e-9, "log joint must not be positive, got {v}");
    }
    // the sampler explores but stays in a plausible band around the start
    let first = values[0];
    for v in &values[1..] {
        assert!((v - first).abs() < first.abs() + 100.0);
    }
}

#[test]
fn sweeps_change_table_configurations_but_not_leaf_customers() {
    let mut model = HpypModel::new(
        SeatingRestaurant,
        GradientParameters::default(),
        config(104),
    )
    .unwrap();
    let seq = fixture_sequence();
    model.append(&seq).unwrap();
    model.compute_losses(0, seq.len()).unwrap();

    // root customers of each type before sweeps depend on child tables,
    // but total root customers of observations seated at the root itself
    // are conserved through the tree-wide audit above; here we pin down a
    // cheaper signal: the tree shape never changes
    let nodes = model.tree().node_count();
    for _ in 0..3 {
        model.gibbs_sweep_add_remove();
        assert_eq!(model.tree().node_count(), nodes);
    }
}

#[test]
fn both_samplers_agree_on_average_predictive_mass() {
    // P5 smoke check: after burn-in, the two samplers' predictive
    // distributions at the full context should be close on average
    let seq = fixture_sequence();

    let mut seating = HpypModel::new(
        SeatingRestaurant,
        GradientParameters::default(),
        config(105),
    )
    .unwrap();
    seating.append(&seq).unwrap();
    seating.compute_losses(0, seq.len()).unwrap();

    let mut compact =
        HpypModel::new(CountRestaurant, GradientParameters::default(), config(106)).unwrap();
    compact.append(&seq).unwrap();
    compact.compute_losses(0, seq.len()).unwrap();

    let sweeps = 10;
    let mut seating_avg = vec![0.0; 3];
    let mut compact_avg = vec![0.0; 3];
    for _ in 0..sweeps {
        seating.gibbs_sweep_add_remove();
        compact.gibbs_sweep_direct();
        for (acc, p) in seating_avg
            .iter_mut()
            .zip(seating.predictive_distribution(0, seq.len()).unwrap())
        {
            *acc += p / sweeps as f64;
        }
        for (acc, p) in compact_avg
            .iter_mut()
            .zip(compact.predictive_distribution(0, seq.len()).unwrap())
        {
            *acc += p / sweeps as f64;
        }
    }
    for (a, b) in seating_avg.iter().zip(&compact_avg) {
        assert!(
            (a - b).abs() < 0.15,
            "sampler marginals diverged: {seating_avg:?} vs {compact_avg:?}"
        );
    }
}
