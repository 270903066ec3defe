use crate::cli::AppArgs;
use burn::prelude::*;
use burn_reqver::prelude::*;
use std::sync::Arc;

/// Snippets encoded per forward pass when filling the index.
pub const INDEX_BATCH_SIZE: usize = 32;

pub fn infer<B: Backend>(
    model_config: &ReqVerConfig,
    dataset: &ReqVerDataset,
    (desc_vocab, sc_vocab): (Vocab, Vocab),
    device: B::Device,
    app_args: &AppArgs,
) {
    let model: ReqVerModel<B> = app_args
        .load_model(model_config, (&desc_vocab, &sc_vocab), &device)
        .expect("Trained model should exist; run with --training first");
    let batcher = ReqVerBatcher::new(model_config, Arc::new(desc_vocab), Arc::new(sc_vocab));

    let items = dataset.to_vec();
    let mut index: Option<RetrievalIndex<B>> = None;
    for chunk in items.chunks(INDEX_BATCH_SIZE) {
        let code = model
            .encode_code(batcher.code_input(chunk, &device))
            .expect("The batcher follows the model config");
        index = Some(match index.take() {
            Some(mut index) => {
                index.extend(code);
                index
            }
            None => RetrievalIndex::new(code),
        });
    }
    let Some(index) = index else {
        println!("the dataset is empty, nothing to search");
        return;
    };

    let queries: Vec<&str> = match &app_args.query {
        Some(query) => vec![query.as_str()],
        None => items.iter().take(3).map(|item| item.desc.as_str()).collect(),
    };
    let query = model.encode_desc(batcher.desc_tensor(&queries, &device));
    let hits = index
        .search(query, app_args.top_k)
        .expect("Failed to read the scores");

    for (query, hits) in queries.iter().zip(hits) {
        println!("query: {query:?}");
        for hit in hits {
            let code = items[hit.index].code.lines().next().unwrap_or_default();
            println!("- {:+.3} #{} {code}", hit.score, hit.index);
        }
    }
}
