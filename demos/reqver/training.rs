use crate::cli::AppArgs;
use burn::data::dataset::Dataset;
use burn::tensor::backend::AutodiffBackend;
use burn_reqver::prelude::*;
use burn_reqver::training::{dataloader, fit};
use std::sync::Arc;

/// Share of the dataset held out for validation.
pub const VALID_FRACTION: f64 = 0.2;

pub fn train<AutoB: AutodiffBackend>(
    training_config: &TrainingConfig,
    model_config: &ReqVerConfig,
    (train, valid): (ReqVerDataset, ReqVerDataset),
    (desc_vocab, sc_vocab): (&Vocab, &Vocab),
    training_device: AutoB::Device,
    app_args: &AppArgs,
) {
    AutoB::seed(&training_device, training_config.seed);

    // load (or init and save) the model
    let model: ReqVerModel<AutoB> =
        app_args.load_or_save_model(model_config, (desc_vocab, sc_vocab), &training_device);

    let batcher = ReqVerBatcher::new(
        model_config,
        Arc::new(desc_vocab.clone()),
        Arc::new(sc_vocab.clone()),
    );
    println!("Training {}", model_config.model_name());
    let dataloader_train = dataloader::<AutoB>(batcher.clone(), train, training_config, true);
    let dataloader_valid = (valid.len() > 0).then(|| {
        dataloader::<AutoB::InnerBackend>(batcher, valid, training_config, false)
    });

    let (model, history) = fit(model, training_config, dataloader_train, dataloader_valid)
        .expect("Training failed");
    if let Some(last) = history.last() {
        println!(
            "Final epoch: loss {:.4}, mrr {:.4}, valid mrr {:?}",
            last.train_loss, last.train_mrr, last.valid_mrr
        );
    }
    app_args.save_model(&model);
}
