use crate::backend::RecorderTy;
use burn::record::FileRecorder;
use burn::prelude::*;
use burn_reqver::prelude::*;
use std::path::{Path, PathBuf};

pub const HELP: &str = "\
Burn ReqVer Demo

Trains a dual encoder that scores requirement descriptions against source code,
and/or ranks the dataset's code snippets against descriptions.
Configurations, vocabularies and model weights are persisted in an artifacts directory.

USAGE:
    reqver [OPTIONS]

When no --training or --inference flag is provided, the program exits after handling configuration logic.

BEHAVIOR OVERVIEW
- The program manages two configurations: training config and model config.
- If --training-config or --model-config is given, the corresponding config is loaded from the specified file and saved to the artifacts directory (overwriting any existing file).
- If no explicit config file is provided for a component, the program attempts to load it from the artifacts directory; if absent, a default configuration is created and saved.
- Vocabularies are built from the training split of the dataset on first use and then reused from the artifacts directory.
- With --remove-artifacts, any existing model and vocabulary files in the artifacts directory are deleted before training (if --training is active).
- If both --training and --inference are specified, training executes first, followed by inference using the trained model.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --training              Run training (creates or updates the model)
    -i, --inference             Rank code snippets against descriptions
    -r, --remove-artifacts      Delete existing model and vocabulary files from the artifacts directory before training
                                (has no effect if --training is not used)
    -d, --dataset <PATH>        JSON Lines file of {\"desc\", \"code\", \"fname\"?, \"apis\"?} records
                                Defaults to the bundled sample dataset.
    -q, --query <TEXT>          Description to search for during inference
                                Defaults to the first dataset descriptions.
    -k, --top-k <N>             Number of snippets shown per query [default: 3]
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations, vocabularies and model weights are saved and loaded.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).
";

pub const SAMPLE_DATASET: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/reqver/sample.jsonl");

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub inference: bool,
    pub remove_artifacts: bool,
    pub dataset: PathBuf,
    pub query: Option<String>,
    pub top_k: usize,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            dataset: pargs
                .opt_value_from_os_str(["-d", "--dataset"], parse_path)?
                .unwrap_or_else(|| SAMPLE_DATASET.into()),
            query: pargs.opt_value_from_str(["-q", "--query"])?,
            top_k: pargs.opt_value_from_str(["-k", "--top-k"])?.unwrap_or(3),
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/burn-reqver-reqver-abcd-0
                    let name = format!(
                        "{}-{}-",
                        std::env!("CARGO_PKG_NAME"), // burn-reqver
                        std::env!("CARGO_BIN_NAME")  // reqver
                    );
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            inference: pargs.contains(["-i", "--inference"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            panic!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }

    pub fn create_artifact_dir(&self) {
        create_artifact_dir(&self.artifacts_path, self.remove_artifacts && self.training)
    }

    pub fn load_training_config(&self) -> Option<TrainingConfig> {
        self.load_config(&self.training_config, TRAINING_CONFIG_NAME)
    }

    pub fn save_training_config(&self, training_config: &TrainingConfig) {
        self.save_config(training_config, TRAINING_CONFIG_NAME)
    }

    pub fn load_model_config(&self) -> Option<ReqVerConfig> {
        self.load_config(&self.model_config, MODEL_CONFIG_NAME)
    }

    pub fn save_model_config(&self, model_config: &ReqVerConfig) {
        self.save_config(model_config, MODEL_CONFIG_NAME)
    }

    fn load_config<C: Config>(&self, explicit: &Option<PathBuf>, name: &str) -> Option<C> {
        explicit
            .as_ref()
            .map(|path| {
                load_config(path).unwrap_or_else(|| panic!("Failed to find the config file {path:?}"))
            })
            .or_else(|| load_config(&self.artifact(name).with_extension("json")))
    }

    fn save_config(&self, config: &impl Config, name: &str) {
        let path = self.artifact(name).with_extension("json");
        println!("Saving {name} into {path:?}");
        config.save(path).expect("Failed to save the config");
    }

    /// Loads both vocabularies, or builds them from `dataset` and saves them.
    ///
    /// Pass the training split only, so validation tokens stay unknown.
    pub fn load_or_build_vocabs(&self, dataset: &ReqVerDataset) -> (Vocab, Vocab) {
        let desc_path = self.artifact(DESC_VOCAB_NAME).with_extension("json");
        let sc_path = self.artifact(SC_VOCAB_NAME).with_extension("json");
        let exists = |p: &Path| std::fs::exists(p).expect("failed to check the vocab path");
        if exists(&desc_path) && exists(&sc_path) {
            println!("Loading vocabularies from {:?}", self.artifacts_path);
            let desc_vocab = Vocab::load(&desc_path).expect("Failed to load the desc vocab");
            let sc_vocab = Vocab::load(&sc_path).expect("Failed to load the sc vocab");
            return (desc_vocab, sc_vocab);
        }
        let items = dataset.to_vec();
        println!("Building vocabularies from {} items", items.len());
        let (desc_vocab, sc_vocab) = build_vocabs(&items, 1, VOCAB_MAX_SIZE);
        desc_vocab.save(&desc_path).expect("Failed to save the desc vocab");
        sc_vocab.save(&sc_path).expect("Failed to save the sc vocab");
        (desc_vocab, sc_vocab)
    }

    pub fn save_model<B: Backend>(&self, model: &ReqVerModel<B>) {
        let path = self.artifact(MODEL_NAME);
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        println!("Saving model to {:?}", path.with_extension(file_ext));
        model
            .clone()
            .save_file(path, &RecorderTy::new()) // ext added automatically
            .expect("Failed to save the model");
    }

    pub fn load_model<B: Backend>(
        &self,
        model_config: &ReqVerConfig,
        vocabs: (&Vocab, &Vocab),
        device: &B::Device,
    ) -> Option<ReqVerModel<B>> {
        let path = self.artifact(MODEL_NAME);
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        let path_ext = path.with_extension(file_ext);
        let exists = std::fs::exists(&path_ext).expect("failed to check the model path");
        if exists {
            println!("Loading model from {path_ext:?}");
            let model = init_model(model_config, vocabs, device)
                .load_file(path, &RecorderTy::new(), device) // ext added automatically
                .expect("Failed to load the model");
            Some(model)
        } else {
            None
        }
    }

    pub fn load_or_save_model<B: Backend>(
        &self,
        model_config: &ReqVerConfig,
        vocabs: (&Vocab, &Vocab),
        device: &B::Device,
    ) -> ReqVerModel<B> {
        self.load_model(model_config, vocabs, device)
            .unwrap_or_else(|| {
                println!("Initializing new model {}", model_config.model_name());
                let model = init_model(model_config, vocabs, device);
                self.save_model(&model);
                model
            })
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.artifacts_path.join(name)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<std::path::PathBuf, &'static str> {
    Ok(s.into())
}

// Create the directory to save the model, vocabularies and configs
pub fn create_artifact_dir(artifact_dir: &Path, delete: bool) {
    if delete {
        println!("removing {artifact_dir:?}/{{model,desc_vocab,sc_vocab}}");
        let entries = std::fs::read_dir(artifact_dir).into_iter().flatten().flatten();
        for path in entries.map(|entry| entry.path()) {
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            if stem.is_some_and(|stem| [MODEL_NAME, DESC_VOCAB_NAME, SC_VOCAB_NAME].contains(&stem)) {
                std::fs::remove_file(&path).expect("failed to remove an artifact");
            }
        }
    }
    std::fs::create_dir_all(artifact_dir).ok();
}

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "model_config";
pub const MODEL_NAME: &str = "model";
pub const DESC_VOCAB_NAME: &str = "desc_vocab";
pub const SC_VOCAB_NAME: &str = "sc_vocab";
pub const VOCAB_MAX_SIZE: usize = 10_000;

pub fn load_config<C: Config>(path: &Path) -> Option<C> {
    let exists = std::fs::exists(path).expect("failed to check the config path");
    if exists {
        println!("Loading config from {path:?}");
        Some(C::load(path).expect("Failed to load the config"))
    } else {
        None
    }
}

pub fn init_model<B: Backend>(
    model_config: &ReqVerConfig,
    (desc_vocab, sc_vocab): (&Vocab, &Vocab),
    device: &B::Device,
) -> ReqVerModel<B> {
    model_config
        .init_with_vocabs(desc_vocab, sc_vocab, device)
        .expect("Invalid model configuration or vocabularies")
}
