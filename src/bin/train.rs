//! Train a decorrelation-penalized MLP on a CSV dataset
//!
//! Usage: cargo run --bin train -- --data digits.csv --epochs 100 --cor-penalty 0.0001

use anyhow::{bail, Result};
use decorr_mlp::{
    ActivationStats, Dataset, DecorrelationPenalty, DegeneratePolicy, Mlp, MlpConfig,
    StandardScaler, StatsOptions, TrainConfig,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut data_path = "train.csv".to_string();
    let mut model_path = "model.json".to_string();
    let mut epochs = 100usize;
    let mut batch_size = 20usize;
    let mut learning_rate = 0.01f64;
    let mut n_hidden = 500usize;
    let mut l1 = 0.0f64;
    let mut l2 = 0.0001f64;
    let mut cov_penalty = 0.0f64;
    let mut cor_penalty = 0.0f64;
    let mut train_fraction = 0.8f64;
    let mut seed = 1234u64;
    let mut standardize = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data" | "-d" => {
                data_path = args.get(i + 1).cloned().unwrap_or(data_path);
                i += 2;
            }
            "--model" | "-m" => {
                model_path = args.get(i + 1).cloned().unwrap_or(model_path);
                i += 2;
            }
            "--epochs" | "-e" => {
                epochs = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(epochs);
                i += 2;
            }
            "--batch" | "-b" => {
                batch_size = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(batch_size);
                i += 2;
            }
            "--lr" => {
                learning_rate = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(learning_rate);
                i += 2;
            }
            "--hidden" => {
                n_hidden = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(n_hidden);
                i += 2;
            }
            "--l1" => {
                l1 = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(l1);
                i += 2;
            }
            "--l2" => {
                l2 = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(l2);
                i += 2;
            }
            "--cov-penalty" => {
                cov_penalty = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(cov_penalty);
                i += 2;
            }
            "--cor-penalty" => {
                cor_penalty = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(cor_penalty);
                i += 2;
            }
            "--train-fraction" => {
                train_fraction = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(train_fraction);
                i += 2;
            }
            "--seed" => {
                seed = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(seed);
                i += 2;
            }
            "--standardize" => {
                standardize = true;
                i += 1;
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    if cov_penalty != 0.0 && cor_penalty != 0.0 {
        bail!("cannot use covariance and correlation penalties simultaneously");
    }

    println!("═══════════════════════════════════════════════════════════════");
    println!("          Decorrelation-Penalized MLP Training");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    // Load data
    println!("Loading data from {}...", data_path);
    let dataset = Dataset::from_csv(&data_path)?;
    println!(
        "Loaded {} samples with {} features, {} classes",
        dataset.len(),
        dataset.n_features(),
        dataset.n_classes()
    );

    let (train_set, valid_set) = dataset.split(train_fraction);
    println!("\nDataset split:");
    println!("  Training samples: {}", train_set.len());
    println!("  Validation samples: {}", valid_set.len());

    // Standardize features on the training split only
    let (train_features, valid_features) = if standardize {
        let mut scaler = StandardScaler::new();
        let train = scaler.fit_transform(&train_set.features);
        let valid = scaler.transform(&valid_set.features);
        println!("  Features standardized (fit on training split)");
        (train, valid)
    } else {
        (train_set.features.clone(), valid_set.features.clone())
    };

    // Create model
    println!("\nCreating network...");
    let mut config = MlpConfig::new(dataset.n_features(), n_hidden, dataset.n_classes())
        .with_l1(l1)
        .with_l2(l2)
        .with_seed(seed);

    if cov_penalty != 0.0 {
        config = config.with_penalty(DecorrelationPenalty::covariance(cov_penalty));
        println!("  Covariance penalty: {}", cov_penalty);
    } else if cor_penalty != 0.0 {
        config = config.with_penalty(DecorrelationPenalty::correlation(cor_penalty));
        println!("  Correlation penalty: {}", cor_penalty);
    }

    let mut model = Mlp::new(config)?;
    println!(
        "  {} inputs -> {} hidden ({:?}) -> {} classes, {} parameters",
        model.config.n_inputs,
        model.config.n_hidden,
        model.config.activation,
        model.config.n_classes,
        model.num_parameters()
    );

    // Train
    println!("\nTraining for {} epochs with batch size {}...", epochs, batch_size);
    println!("─────────────────────────────────────────────────────────────────");

    let train_config = TrainConfig {
        epochs,
        batch_size,
        learning_rate,
    };
    let history = model.fit(
        &train_features,
        &train_set.labels,
        Some((&valid_features, valid_set.labels.as_slice())),
        &train_config,
    )?;

    println!("─────────────────────────────────────────────────────────────────");

    // Evaluate
    let train_error = model.evaluate(&train_features, &train_set.labels)?;
    let valid_error = model.evaluate(&valid_features, &valid_set.labels)?;

    println!("\nResults:");
    println!("  Training error: {:.2}%", train_error * 100.0);
    println!("  Validation error: {:.2}%", valid_error * 100.0);
    if let Some(best) = history.best_epoch {
        println!(
            "  Best validation error: {:.2}% (epoch {})",
            history.best_valid_error * 100.0,
            best + 1
        );
    }

    // Summarize how correlated the hidden units ended up
    let activations = model.hidden_activations(&valid_features)?;
    let stats = ActivationStats::compute(
        &activations,
        &StatsOptions::with_correlation().degenerate(DegeneratePolicy::Zero),
    )?;
    let d = model.config.n_hidden;
    let off_diag_pairs = ((d * d).saturating_sub(d)).max(1) as f64;
    let mean_sq_cor = stats.off_diagonal_correlation_sq().unwrap_or(0.0) / off_diag_pairs;

    println!("\nHidden-unit correlation structure (validation split):");
    println!("  Mean squared off-diagonal correlation: {:.6}", mean_sq_cor);
    println!(
        "  Mean squared off-diagonal covariance: {:.6}",
        stats.off_diagonal_covariance_sq() / off_diag_pairs
    );

    // Save model
    println!("\nSaving model to {}...", model_path);
    model.save(&model_path)?;
    println!("Model saved successfully!");

    Ok(())
}

fn print_help() {
    println!("Train a decorrelation-penalized MLP classifier");
    println!();
    println!("USAGE:");
    println!("    cargo run --bin train -- [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -d, --data <PATH>         Input CSV (feature columns then a label column)");
    println!("    -m, --model <PATH>        Output model file (default: model.json)");
    println!("    -e, --epochs <N>          Training epochs (default: 100)");
    println!("    -b, --batch <SIZE>        Minibatch size (default: 20)");
    println!("        --lr <RATE>           Learning rate (default: 0.01)");
    println!("        --hidden <N>          Hidden units (default: 500)");
    println!("        --l1 <COEF>           L1 weight penalty (default: 0)");
    println!("        --l2 <COEF>           L2 weight penalty (default: 0.0001)");
    println!("        --cov-penalty <COEF>  Covariance decorrelation penalty");
    println!("        --cor-penalty <COEF>  Correlation decorrelation penalty");
    println!("        --train-fraction <F>  Fraction of rows used for training (default: 0.8)");
    println!("        --seed <N>            RNG seed (default: 1234)");
    println!("        --standardize         Z-score features using the training split");
    println!("        --help                Print help information");
    println!();
    println!("The covariance and correlation penalties are mutually exclusive.");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run --bin train -- --data digits.csv --epochs 200");
    println!("    cargo run --bin train -- -d digits.csv --cor-penalty 0.0001 --standardize");
}
