use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use finvision::inference;
use finvision::model::{
    Aggregation, Estimator, LinearModel, RegressionTree, TrainedModel, TreeEnsemble, TreeNode,
};
use ndarray::Array2;
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_FEATURES: usize = 24;

fn random_rows(n_rows: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(0xF0CA_57 + n_rows as u64);
    Array2::from_shape_fn((n_rows, N_FEATURES), |_| rng.sample::<f64, _>(Standard) * 10_000.0)
}

// Complete binary tree of the given depth, splitting on features in rotation.
fn balanced_tree(rng: &mut StdRng, depth: usize) -> RegressionTree {
    let n_internal = (1 << depth) - 1;
    let n_nodes = (1 << (depth + 1)) - 1;
    let nodes = (0..n_nodes)
        .map(|idx| {
            if idx < n_internal {
                TreeNode::Split {
                    feature: rng.gen_range(0..N_FEATURES),
                    threshold: rng.gen_range(0.0..10_000.0),
                    left: 2 * idx + 1,
                    right: 2 * idx + 2,
                    gain: rng.gen_range(0.1..5.0),
                }
            } else {
                TreeNode::Leaf {
                    value: rng.gen_range(0.0..50_000.0),
                }
            }
        })
        .collect();
    RegressionTree { nodes }
}

fn forest(n_trees: usize, depth: usize) -> TrainedModel {
    let mut rng = StdRng::seed_from_u64(0x7EE5);
    TrainedModel {
        name: Some("bench forest".to_string()),
        n_features: N_FEATURES,
        feature_importances: None,
        estimator: Estimator::TreeEnsemble(TreeEnsemble {
            aggregation: Aggregation::Mean,
            base_score: 0.0,
            trees: (0..n_trees).map(|_| balanced_tree(&mut rng, depth)).collect(),
        }),
    }
}

fn linear() -> TrainedModel {
    TrainedModel {
        name: None,
        n_features: N_FEATURES,
        feature_importances: None,
        estimator: Estimator::Linear(LinearModel {
            intercept: 250.0,
            coefficients: (0..N_FEATURES).map(|i| 0.5 + i as f64 * 0.1).collect(),
        }),
    }
}

fn benchmark_batch_inference(c: &mut Criterion) {
    let forest = forest(100, 8);
    let linear = linear();
    let sizes = [1_usize, 1_000, 20_000];

    let mut group = c.benchmark_group("batch_inference");
    for &size in &sizes {
        let rows = random_rows(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("forest", size), &rows, |b, input| {
            b.iter(|| {
                let predictions = inference::predict(&forest, black_box(input.view()));
                black_box(predictions.ok());
            });
        });

        group.bench_with_input(BenchmarkId::new("linear", size), &rows, |b, input| {
            b.iter(|| {
                let predictions = inference::predict(&linear, black_box(input.view()));
                black_box(predictions.ok());
            });
        });
    }
    group.finish();
}

criterion_group!(batch_inference, benchmark_batch_inference);
criterion_main!(batch_inference);
