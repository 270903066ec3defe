//! Contrastive training of the joint model.
//!
//! Each batch holds aligned description/code pairs; every other snippet in the
//! batch serves as a negative for a description.

use crate::data::{ReqVerBatch, ReqVerBatcher, ReqVerDataset};
use crate::error::ReqVerError;
use crate::model::ReqVerModel;
use crate::utils::loss::{CosineLoss, CosineLossConfig};
use crate::utils::metric::{MrrInput, MrrMetric, mrr};
use burn::data::dataloader::{DataLoader, DataLoaderBuilder, Progress};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{Adaptor, LossInput, LossMetric, Metric, MetricMetadata, Numeric};
use std::sync::Arc;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: AdamWConfig,
    #[config(default = "CosineLossConfig::new()")]
    pub loss: CosineLossConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    /// Also the number of candidates each description is ranked against.
    #[config(default = 32)]
    pub batch_size: usize,
    /// `0` loads batches on the training thread.
    #[config(default = 0)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 0)]
    pub seed: u64,
}

pub fn optimizer_config() -> AdamWConfig {
    AdamWConfig::new()
        .with_weight_decay(1e-4)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(1.0)))
}

/// Similarity logits of one batch and their loss.
#[derive(Debug, Clone)]
pub struct ReqVerOutput<B: Backend> {
    /// # Shape
    /// [1]
    pub loss: Tensor<B, 1>,
    /// # Shape
    /// [batch, batch]
    pub similarity: Tensor<B, 2>,
}

impl<B: Backend> ReqVerOutput<B> {
    pub fn new(loss: Tensor<B, 1>, similarity: Tensor<B, 2>) -> Self {
        Self { loss, similarity }
    }

    pub fn batch_size(&self) -> usize {
        self.similarity.dims()[0]
    }

    pub fn loss_value(&self) -> f64 {
        self.loss.clone().into_scalar().elem::<f64>()
    }

    pub fn mrr_value(&self) -> f64 {
        mrr(self.similarity.clone()).into_scalar().elem::<f64>()
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for ReqVerOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<MrrInput<B>> for ReqVerOutput<B> {
    fn adapt(&self) -> MrrInput<B> {
        MrrInput::new(self.similarity.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_mrr: f64,
    pub valid_loss: Option<f64>,
    pub valid_mrr: Option<f64>,
}

pub type Dataloader<B> = Arc<dyn DataLoader<B, ReqVerBatch<B>>>;

/// Scores one batch against itself.
pub fn forward_step<B: Backend>(
    model: &ReqVerModel<B>,
    loss: &CosineLoss,
    batch: ReqVerBatch<B>,
) -> Result<ReqVerOutput<B>, ReqVerError> {
    let similarity = model.forward(batch.desc, batch.code)?;
    let loss = loss.forward(similarity.clone());
    Ok(ReqVerOutput::new(loss, similarity))
}

/// Runs forward, loss, backward and one optimizer step.
pub fn train_step<B, O>(
    model: ReqVerModel<B>,
    optim: &mut O,
    loss: &CosineLoss,
    batch: ReqVerBatch<B>,
    lr: f64,
) -> Result<(ReqVerModel<B>, ReqVerOutput<B>), ReqVerError>
where
    B: AutodiffBackend,
    O: Optimizer<ReqVerModel<B>, B>,
{
    let output = forward_step(&model, loss, batch)?;
    let grads = output.loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optim.step(lr, model, grads);
    Ok((model, output))
}

/// Scores one batch without updating the model.
pub fn valid_step<B: Backend>(
    model: &ReqVerModel<B>,
    loss: &CosineLoss,
    batch: ReqVerBatch<B>,
) -> Result<ReqVerOutput<B>, ReqVerError> {
    forward_step(model, loss, batch)
}

/// Builds a data loader over `dataset`, shuffled when `shuffle` is set.
pub fn dataloader<B: Backend>(
    batcher: ReqVerBatcher,
    dataset: ReqVerDataset,
    config: &TrainingConfig,
    shuffle: bool,
) -> Dataloader<B> {
    let mut builder = DataLoaderBuilder::new(batcher).batch_size(config.batch_size);
    if shuffle {
        builder = builder.shuffle(config.seed);
    }
    if config.num_workers > 0 {
        builder = builder.num_workers(config.num_workers);
    }
    builder.build(dataset)
}

fn metric_metadata(config: &TrainingConfig, epoch: usize, num_items: usize) -> MetricMetadata {
    MetricMetadata {
        progress: Progress::new(0, num_items),
        epoch,
        epoch_total: config.num_epochs,
        iteration: 0,
        lr: Some(config.lr),
    }
}

/// Averages loss and MRR of [`valid_step`] over a whole data loader.
///
/// Returns `None` when the loader yields no batch.
pub fn evaluate<B: Backend>(
    model: &ReqVerModel<B>,
    config: &TrainingConfig,
    epoch: usize,
    dataloader: &Dataloader<B>,
) -> Result<Option<(f64, f64)>, ReqVerError> {
    let loss = config.loss.init();
    let mut metric_meta = metric_metadata(config, epoch, dataloader.num_items());
    let mut loss_metric = LossMetric::<B>::new();
    let mut mrr_metric = MrrMetric::<B>::new();

    for batch in dataloader.iter() {
        let output = valid_step(model, &loss, batch)?;
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += output.batch_size();
        loss_metric.update(&output.adapt(), &metric_meta);
        mrr_metric.update(&output.adapt(), &metric_meta);
    }

    Ok((metric_meta.iteration > 0).then(|| {
        (
            loss_metric.running_value().current(),
            mrr_metric.running_value().current(),
        )
    }))
}

/// Trains for `config.num_epochs` epochs, validating after each one.
pub fn fit<B: AutodiffBackend>(
    mut model: ReqVerModel<B>,
    config: &TrainingConfig,
    dataloader_train: Dataloader<B>,
    dataloader_valid: Option<Dataloader<B::InnerBackend>>,
) -> Result<(ReqVerModel<B>, Vec<EpochSummary>), ReqVerError> {
    let train_num_items = dataloader_train.num_items();
    if train_num_items == 0 {
        return Err(ReqVerError::EmptyDataset("train"));
    }
    let mut optim = config.optimizer.init::<B, ReqVerModel<B>>();
    let loss = config.loss.init();
    let num_batches = train_num_items.div_ceil(config.batch_size.max(1));
    let mut metric_meta = metric_metadata(config, 1, train_num_items);
    let mut history = Vec::with_capacity(config.num_epochs);

    tracing::info!(
        epochs = config.num_epochs,
        items = train_num_items,
        "starting training"
    );
    for epoch in 1..config.num_epochs + 1 {
        metric_meta.epoch = epoch;
        metric_meta.progress = Progress::new(0, train_num_items);
        let mut loss_metric = LossMetric::<B>::new();
        let mut mrr_metric = MrrMetric::<B>::new();

        for (b, batch) in dataloader_train.iter().enumerate() {
            let (model_, output) = train_step(model, &mut optim, &loss, batch, config.lr)?;
            model = model_;
            metric_meta.iteration += 1;
            metric_meta.progress.items_processed += output.batch_size();
            loss_metric.update(&output.adapt(), &metric_meta);
            mrr_metric.update(&output.adapt(), &metric_meta);
            tracing::debug!(
                "Epoch {epoch}/{}, Batch {}/{num_batches}, Loss {:.4}, MRR {:.4}",
                config.num_epochs,
                b + 1,
                loss_metric.value().current(),
                mrr_metric.value().current(),
            );
        }

        let valid = match &dataloader_valid {
            Some(dataloader) => evaluate(&model.valid(), config, epoch, dataloader)?,
            None => None,
        };
        let summary = EpochSummary {
            epoch,
            train_loss: loss_metric.running_value().current(),
            train_mrr: mrr_metric.running_value().current(),
            valid_loss: valid.map(|(loss, _)| loss),
            valid_mrr: valid.map(|(_, mrr)| mrr),
        };
        tracing::info!(
            "Epoch {epoch}/{}, Avg Loss {:.4}, Avg MRR {:.4}, Valid {:?}",
            config.num_epochs,
            summary.train_loss,
            summary.train_mrr,
            valid,
        );
        history.push(summary);
    }
    tracing::info!("training finished");

    Ok((model, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderKind;
    use crate::data::{ReqVerItem, build_vocabs};
    use crate::model::tests::small_config;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn items() -> Vec<ReqVerItem> {
        vec![
            ReqVerItem::new("open a file for reading", "fn read(path) { File::open(path) }"),
            ReqVerItem::new("send bytes over the socket", "fn send(sock, buf) { sock.write(buf) }"),
            ReqVerItem::new("sort the list of users", "fn sort_users(users) { users.sort() }"),
            ReqVerItem::new("hash the password", "fn hash(pw) { sha256(pw.bytes()) }"),
        ]
    }

    fn batcher(model: EncoderKind) -> ReqVerBatcher {
        let (desc_vocab, sc_vocab) = build_vocabs(&items(), 1, 100);
        ReqVerBatcher::new(&small_config(model), Arc::new(desc_vocab), Arc::new(sc_vocab))
    }

    fn init_model<B: Backend>(model: EncoderKind, batcher: &ReqVerBatcher) -> ReqVerModel<B> {
        small_config(model)
            .with_sc_dropout_rate(0.0)
            .init_with_vocabs(&batcher.desc_vocab, &batcher.sc_vocab, &Default::default())
            .unwrap()
    }

    #[test]
    fn train_steps_reduce_the_loss() {
        let device = Default::default();
        TestAutodiffBackend::seed(&device, 0);
        let batcher = batcher(EncoderKind::NGram);
        let mut model = init_model::<TestAutodiffBackend>(EncoderKind::NGram, &batcher);
        let mut optim = optimizer_config().init::<TestAutodiffBackend, ReqVerModel<_>>();
        let loss = CosineLoss::default();

        let valid_batch: ReqVerBatch<TestBackend> = batcher.batch(items(), &device);
        let before = valid_step(&model.valid(), &loss, valid_batch.clone()).unwrap();
        assert_eq!(before.batch_size(), 4);

        for _ in 0..40 {
            let batch: ReqVerBatch<TestAutodiffBackend> = batcher.batch(items(), &device);
            let (model_, output) = train_step(model, &mut optim, &loss, batch, 1e-2).unwrap();
            model = model_;
            assert!(output.loss_value().is_finite());
            assert!((0.25..=1.0).contains(&output.mrr_value()));
        }

        let after = valid_step(&model.valid(), &loss, valid_batch).unwrap();
        assert!(
            after.loss_value() < before.loss_value(),
            "loss did not decrease: {} -> {}",
            before.loss_value(),
            after.loss_value()
        );
    }

    #[test]
    fn transformer_code_encoder_trains() {
        let device = Default::default();
        TestAutodiffBackend::seed(&device, 0);
        let batcher = batcher(EncoderKind::Bert);
        let mut model = init_model::<TestAutodiffBackend>(EncoderKind::Bert, &batcher);
        let mut optim = optimizer_config().init::<TestAutodiffBackend, ReqVerModel<_>>();
        let loss = CosineLoss::default();

        for _ in 0..3 {
            let batch: ReqVerBatch<TestAutodiffBackend> = batcher.batch(items(), &device);
            let (model_, output) = train_step(model, &mut optim, &loss, batch, 1e-2).unwrap();
            model = model_;
            assert_eq!(output.similarity.dims(), [4, 4]);
            assert!(output.loss_value().is_finite());
        }
    }

    #[test]
    fn fit_reports_every_epoch() {
        let device = Default::default();
        let batcher = batcher(EncoderKind::Api);
        let model = small_config(EncoderKind::Api)
            .init_with_vocabs::<TestAutodiffBackend>(&batcher.desc_vocab, &batcher.sc_vocab, &device)
            .unwrap();
        let training_config = TrainingConfig::new(optimizer_config())
            .with_num_epochs(2)
            .with_batch_size(3);

        let (train, valid) = ReqVerDataset::new(items()).split(0.5);
        let dataloader_train =
            dataloader::<TestAutodiffBackend>(batcher.clone(), train, &training_config, true);
        let dataloader_valid = dataloader::<TestBackend>(batcher, valid, &training_config, false);

        let (_model, history) =
            fit(model, &training_config, dataloader_train, Some(dataloader_valid)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].epoch, 2);
        assert!(history.iter().all(|e| e.train_loss.is_finite()));
        assert!(history.iter().all(|e| (0.0..=1.0).contains(&e.train_mrr)));
        assert!(history.iter().all(|e| e.valid_mrr.is_some()));
    }

    #[test]
    fn fit_without_validation() {
        let batcher = batcher(EncoderKind::Bert);
        let model = init_model::<TestAutodiffBackend>(EncoderKind::Bert, &batcher);
        let training_config = TrainingConfig::new(optimizer_config())
            .with_num_epochs(1)
            .with_batch_size(2);
        let dataloader_train = dataloader::<TestAutodiffBackend>(
            batcher,
            ReqVerDataset::new(items()),
            &training_config,
            false,
        );

        let (_model, history) = fit(model, &training_config, dataloader_train, None).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].train_loss.is_finite());
        assert_eq!(history[0].valid_loss, None);
        assert_eq!(history[0].valid_mrr, None);
    }

    #[test]
    fn fit_rejects_an_empty_training_set() {
        let batcher = batcher(EncoderKind::NGram);
        let model = init_model::<TestAutodiffBackend>(EncoderKind::NGram, &batcher);
        let training_config = TrainingConfig::new(optimizer_config());
        let dataloader_train = dataloader::<TestAutodiffBackend>(
            batcher,
            ReqVerDataset::new(Vec::new()),
            &training_config,
            false,
        );
        assert!(matches!(
            fit(model, &training_config, dataloader_train, None),
            Err(ReqVerError::EmptyDataset("train"))
        ));
    }

    #[test]
    fn evaluate_averages_over_batches() {
        let device = Default::default();
        let batcher = batcher(EncoderKind::NGram);
        let model = init_model::<TestBackend>(EncoderKind::NGram, &batcher);
        let training_config = TrainingConfig::new(optimizer_config()).with_batch_size(2);
        let dataloader_valid = dataloader::<TestBackend>(
            batcher.clone(),
            ReqVerDataset::new(items()),
            &training_config,
            false,
        );

        let (loss, mrr) = evaluate(&model, &training_config, 1, &dataloader_valid)
            .unwrap()
            .unwrap();
        let halves: Vec<ReqVerOutput<TestBackend>> = items()
            .chunks(2)
            .map(|chunk| {
                let batch = batcher.batch(chunk.to_vec(), &device);
                valid_step(&model, &CosineLoss::default(), batch).unwrap()
            })
            .collect();
        let mean = |f: fn(&ReqVerOutput<TestBackend>) -> f64| {
            halves.iter().map(f).sum::<f64>() / halves.len() as f64
        };
        assert!((loss - mean(ReqVerOutput::loss_value)).abs() < 1e-5);
        assert!((mrr - mean(ReqVerOutput::mrr_value)).abs() < 1e-5);
    }

    #[test]
    fn mismatched_inputs_fail_the_step() {
        let device = Default::default();
        let api_batcher = batcher(EncoderKind::Api);
        let model = init_model::<TestBackend>(EncoderKind::NGram, &api_batcher);
        let batch: ReqVerBatch<TestBackend> = api_batcher.batch(items(), &device);
        assert!(matches!(
            valid_step(&model, &CosineLoss::default(), batch),
            Err(ReqVerError::InputMismatch { .. })
        ));
    }
}
