//! Walkthroughs for `gradlab`: a logistic admissions classifier over a
//! preprocessed table, a fully-connected image classifier trained with
//! autograd and saved to a checkpoint, and evaluation of a saved checkpoint.
//!
//! # Usage
//! ```sh
//! cargo run -- admissions
//! cargo run -- train --data-dir data
//! cargo run -- eval --data-dir data --checkpoint mlp.ckpt
//! ```

use std::{error::Error, fs, path::Path, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use gradlab::{
    autograd::Var,
    checkpoint,
    dataloader::DataLoader,
    images::ImageSet,
    loss::NllLoss,
    nn::{Mlp, Module, argmax},
    optim::{Adam, Optim, Sgd},
    perceptron::Perceptron,
    plot::{plot_loss_curve, plot_tabular},
    tabular::{Table, synthetic_admissions},
};

#[derive(Parser)]
#[command(about = "Feed-forward neural network walkthroughs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a single logistic unit on the admissions table
    Admissions {
        /// CSV with admit,gre,gpa,rank columns; synthesized when omitted
        #[clap(long)]
        csv: Option<PathBuf>,
        /// Rows to synthesize when --csv is not given
        #[clap(long, default_value_t = 400)]
        rows: usize,
        #[clap(short, long, default_value_t = 1000)]
        epochs: usize,
        #[clap(short, long, default_value_t = 0.5)]
        lr: f32,
        #[clap(long, default_value_t = 0.2)]
        test_frac: f32,
        #[clap(short, long, default_value_t = format!("output"))]
        output_dir: String,
    },
    /// Train the fully-connected image classifier and save a checkpoint
    Train {
        /// Directory with train-images-idx3-ubyte[.gz] and train-labels-idx1-ubyte[.gz]
        #[clap(short, long)]
        data_dir: PathBuf,
        #[clap(short, long, default_value_t = 5)]
        epochs: usize,
        #[clap(short, long, default_value_t = 32)]
        batch_size: usize,
        #[clap(short, long, default_value_t = 0.001)]
        lr: f32,
        #[clap(short, long, default_value_t = 0.9)]
        momentum: f32,
        #[clap(long, default_value_t = 32)]
        hidden_units: usize,
        #[clap(long, value_enum, default_value_t = OptimKind::Sgd)]
        optimizer: OptimKind,
        /// Cap on training rows; scalar autograd is slow on full datasets
        #[clap(long, default_value_t = 1000)]
        limit: usize,
        #[clap(long, default_value = "mlp.ckpt")]
        checkpoint: PathBuf,
        #[clap(short, long, default_value_t = format!("output"))]
        output_dir: String,
    },
    /// Evaluate a saved checkpoint on the t10k split
    Eval {
        /// Directory with t10k-images-idx3-ubyte[.gz] and t10k-labels-idx1-ubyte[.gz]
        #[clap(short, long)]
        data_dir: PathBuf,
        #[clap(long, default_value = "mlp.ckpt")]
        checkpoint: PathBuf,
        /// Must match the architecture the checkpoint was trained with,
        /// otherwise loading fails with a shape mismatch
        #[clap(long, default_value_t = 32)]
        hidden_units: usize,
        #[clap(long, default_value_t = 1000)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptimKind {
    Sgd,
    Adam,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Args::parse().command {
        Command::Admissions {
            csv,
            rows,
            epochs,
            lr,
            test_frac,
            output_dir,
        } => run_admissions(csv, rows, epochs, lr, test_frac, &output_dir),
        Command::Train {
            data_dir,
            epochs,
            batch_size,
            lr,
            momentum,
            hidden_units,
            optimizer,
            limit,
            checkpoint,
            output_dir,
        } => run_train(
            &data_dir,
            epochs,
            batch_size,
            lr,
            momentum,
            hidden_units,
            optimizer,
            limit,
            &checkpoint,
            &output_dir,
        ),
        Command::Eval {
            data_dir,
            checkpoint,
            hidden_units,
            limit,
        } => run_eval(&data_dir, &checkpoint, hidden_units, limit),
    }
}

fn run_admissions(
    csv: Option<PathBuf>,
    rows: usize,
    epochs: usize,
    lr: f32,
    test_frac: f32,
    output_dir: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir)?;
    let table = match csv {
        Some(path) => Table::read_csv(&path)?,
        None => {
            log::info!("no --csv given, synthesizing {} admissions rows", rows);
            synthetic_admissions(rows, &mut rand::rng())
        }
    };
    plot_tabular(
        &table,
        "gre",
        "gpa",
        "admit",
        &format!("{}/admissions_data.png", output_dir),
    )?;

    // preprocessing: rank is categorical, gre/gpa live on very different
    // scales than the indicator columns
    let mut table = table.one_hot("rank")?;
    table.min_max_scale("gre")?;
    table.min_max_scale("gpa")?;

    let (train, test) = table.train_test_split(test_frac, &mut rand::rng());
    let (train_x, train_y) = train.features_and_targets("admit")?;
    let (test_x, test_y) = test.features_and_targets("admit")?;

    let mut unit = Perceptron::new(train_x[0].len());
    let losses = unit.fit(&train_x, &train_y, epochs, lr)?;
    plot_loss_curve(
        &losses,
        &format!("{}/admissions_loss.png", output_dir),
        "Admissions training loss",
    )?;

    let train_acc = unit.accuracy(&train_x, &train_y)?;
    let test_acc = unit.accuracy(&test_x, &test_y)?;
    log::info!(
        "final loss: {:.6}, train accuracy: {:.3}, test accuracy: {:.3}",
        losses.last().copied().unwrap_or(f32::NAN),
        train_acc,
        test_acc
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    data_dir: &Path,
    epochs: usize,
    batch_size: usize,
    lr: f32,
    momentum: f32,
    hidden_units: usize,
    optimizer: OptimKind,
    limit: usize,
    checkpoint_path: &Path,
    output_dir: &str,
) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(output_dir)?;
    let mut train_set = ImageSet::load(
        &data_dir.join("train-images-idx3-ubyte"),
        &data_dir.join("train-labels-idx1-ubyte"),
    )?;
    if train_set.len() > limit {
        log::info!("limiting training set to {} of {} images", limit, train_set.len());
        train_set.truncate(limit);
    }
    let n_classes = train_set.n_classes();
    let labels = train_set.one_hot_labels(n_classes);

    let model = Mlp::new(train_set.feature_len(), hidden_units, n_classes);
    let mut optim: Box<dyn Optim> = match optimizer {
        OptimKind::Sgd => Box::new(Sgd::new(model.parameters(), lr, momentum)),
        OptimKind::Adam => Box::new(Adam::new(model.parameters(), lr)),
    };
    let data_loader = DataLoader::new(train_set.images().to_vec(), labels, batch_size, true)?;

    let mut epoch_losses = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let mut epoch_loss = 0.0;
        let mut n_correct = 0usize;
        let mut n_dead_units = 0usize;
        for (batch_data, batch_labels) in data_loader.iter() {
            for (data, label) in batch_data.into_iter().zip(batch_labels.into_iter()) {
                // intermediate graph nodes are freed (and their gradients
                // with them) once y_pred goes out of scope; only the model
                // parameters persist between samples
                let y_pred = model.forward(data)?;
                let loss = NllLoss::call(&y_pred, label);
                loss.backward();
                epoch_loss += loss.data();
                n_dead_units += model.n_dead_units();

                let target = label.iter().position(|v| v.data() == 1.0).unwrap_or(0);
                if argmax(&y_pred) == target {
                    n_correct += 1;
                }
            }
            // gradients accumulate over the mini batch, then one step
            optim.step();
            optim.zero_grad();
        }
        let mean_loss = epoch_loss / data_loader.len() as f32;
        epoch_losses.push(mean_loss);
        log::debug!(
            "epoch {}: mean dead hidden units {}",
            epoch + 1,
            n_dead_units / data_loader.len()
        );
        log::info!(
            "epoch {}: loss {:.6}, accuracy {:.3}",
            epoch + 1,
            mean_loss,
            n_correct as f32 / data_loader.len() as f32
        );
    }

    checkpoint::save(checkpoint_path, &model.state_dict())?;
    plot_loss_curve(
        &epoch_losses,
        &format!("{}/mlp_loss.png", output_dir),
        "Classifier training loss",
    )?;
    Ok(())
}

fn run_eval(
    data_dir: &Path,
    checkpoint_path: &Path,
    hidden_units: usize,
    limit: usize,
) -> Result<(), Box<dyn Error>> {
    let mut test_set = ImageSet::load(
        &data_dir.join("t10k-images-idx3-ubyte"),
        &data_dir.join("t10k-labels-idx1-ubyte"),
    )?;
    if test_set.len() > limit {
        test_set.truncate(limit);
    }
    let n_classes = test_set.n_classes();

    let mut model = Mlp::new(test_set.feature_len(), hidden_units, n_classes);
    let tensors = checkpoint::load(checkpoint_path)?;
    model.load_state_dict(&tensors)?;

    let mut n_correct = 0usize;
    for (image, &label) in test_set.images().iter().zip(test_set.labels().iter()) {
        let inputs: Vec<_> = image.iter().map(|&p| Var::new(p)).collect();
        if model.predict(&inputs)? == label as usize {
            n_correct += 1;
        }
    }
    log::info!(
        "eval accuracy: {:.3} ({}/{})",
        n_correct as f32 / test_set.len() as f32,
        n_correct,
        test_set.len()
    );
    Ok(())
}
