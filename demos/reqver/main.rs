use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_reqver::prelude::*;
use burn_reqver::training::optimizer_config;

pub use backend::{MainAutoBackend, MainBackend, MainDevice};
pub use cli::AppArgs;

pub mod backend;
pub mod cli;
pub mod inference;
pub mod training;

pub fn launch<B, AutoB>(app_args: &AppArgs)
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    app_args.create_artifact_dir();

    // setup training and model configs
    let training_config = app_args.load_training_config().unwrap_or_else(|| {
        TrainingConfig::new(optimizer_config())
            .with_num_epochs(20)
            .with_batch_size(8)
            .with_lr(1e-3)
    });
    let model_config = app_args.load_model_config().unwrap_or_else(|| {
        // the sample dataset is tiny
        ReqVerConfig::new()
            .with_output_units(64)
            .with_desc_max_seq_len(32)
            .with_sc_max_tok_len(64)
            .with_emb_size(64)
            .with_desc_bert_hidden_size(64)
            .with_sc_bert_hidden_size(64)
            .with_sc_rnn_units(64)
    });
    // save configs
    app_args.save_training_config(&training_config);
    app_args.save_model_config(&model_config);
    model_config
        .validate()
        .expect("Invalid model configuration");

    let dataset =
        ReqVerDataset::from_jsonl(&app_args.dataset).expect("Failed to load the dataset");
    let (train_set, valid_set) = dataset.clone().split(training::VALID_FRACTION);
    println!(
        "{} pairs for training, {} for validation",
        train_set.len(),
        valid_set.len()
    );
    let (desc_vocab, sc_vocab) = app_args.load_or_build_vocabs(&train_set);

    if app_args.training {
        training::train::<AutoB>(
            &training_config,
            &model_config,
            (train_set, valid_set),
            (&desc_vocab, &sc_vocab),
            AutoB::main_device(),
            app_args,
        );
    }

    if app_args.inference {
        inference::infer::<B>(
            &model_config,
            &dataset,
            (desc_vocab, sc_vocab),
            B::main_device(),
            app_args,
        );
    }

    if !app_args.inference && !app_args.training {
        println!("neither training nor inference were enabled");
        println!("{}", cli::HELP);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let app_args = AppArgs::parse().unwrap();
    launch::<MainBackend, MainAutoBackend>(&app_args);
}
