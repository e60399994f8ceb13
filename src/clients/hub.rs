//! Model artifact resolution.
//!
//! A model name is either a local directory laid out like a
//! sentence-transformers export, or a HuggingFace Hub repository id whose
//! files are downloaded into the local hub cache.

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MODEL_CANDIDATES: &[&str] = &["onnx/model.onnx", "model.onnx"];
const TOKENIZER_CANDIDATES: &[&str] = &["tokenizer.json", "onnx/tokenizer.json"];
const POOLING_CONFIG: &str = "1_Pooling/config.json";
const MODULES_CONFIG: &str = "modules.json";
const SENTENCE_CONFIG: &str = "sentence_bert_config.json";

/// How token states are reduced to a sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// First token hidden state.
    Cls,
    /// Attention-masked mean of all token states.
    Mean,
}

/// Everything needed to build an encoder.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub pooling: Pooling,
    pub normalize: bool,
    /// Longest token sequence the model accepts, when the export declares it.
    pub max_seq_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
    #[serde(default)]
    pooling_mode_mean_tokens: bool,
}

#[derive(Debug, Deserialize)]
struct SentenceConfig {
    max_seq_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    #[serde(rename = "type")]
    kind: String,
}

enum Source {
    Local(PathBuf),
    Hub(ApiRepo),
}

impl Source {
    fn fetch(&self, file: &str) -> Option<PathBuf> {
        match self {
            Source::Local(dir) => {
                let path = dir.join(file);
                path.is_file().then_some(path)
            }
            Source::Hub(repo) => match repo.get(file) {
                Ok(path) => Some(path),
                Err(e) => {
                    debug!("Hub file {} unavailable: {}", file, e);
                    None
                }
            },
        }
    }

    fn first_of<'a>(&self, candidates: &[&'a str], what: &str) -> Result<(&'a str, PathBuf)> {
        candidates
            .iter()
            .find_map(|file| self.fetch(file).map(|path| (*file, path)))
            .ok_or_else(|| anyhow!("No {} found, tried {:?}", what, candidates))
    }
}

/// Resolve `model_name` to local model, tokenizer and pipeline settings.
pub fn resolve(model_name: &str) -> Result<ModelFiles> {
    let local = Path::new(model_name);
    let source = if local.is_dir() {
        info!("Loading model from local directory {}", local.display());
        Source::Local(local.to_path_buf())
    } else {
        info!("Fetching model {} from the HuggingFace Hub", model_name);
        let api = Api::new().context("Failed to initialize HuggingFace Hub client")?;
        Source::Hub(api.model(model_name.to_string()))
    };

    let (model_file, model_path) = source
        .first_of(MODEL_CANDIDATES, "ONNX model")
        .with_context(|| format!("Model {} has no ONNX export", model_name))?;

    // Large exports keep their weights in a sibling file the runtime
    // loads from the model's directory.
    let data_file = format!("{}_data", model_file);
    if source.fetch(&data_file).is_some() {
        debug!("External weights {} present for {}", data_file, model_name);
    }

    let (_, tokenizer_path) = source.first_of(TOKENIZER_CANDIDATES, "tokenizer")?;
    let pooling = match source.fetch(POOLING_CONFIG) {
        Some(path) => read_pooling(&path)?,
        None => Pooling::Cls,
    };
    let normalize = match source.fetch(MODULES_CONFIG) {
        Some(path) => read_normalize(&path)?,
        None => true,
    };
    let max_seq_length = match source.fetch(SENTENCE_CONFIG) {
        Some(path) => read_json::<SentenceConfig>(&path)?.max_seq_length,
        None => None,
    };

    info!(
        "Resolved model {}: {} (pooling: {:?}, normalize: {})",
        model_name,
        model_path.display(),
        pooling,
        normalize
    );

    Ok(ModelFiles {
        model_path,
        tokenizer_path,
        pooling,
        normalize,
        max_seq_length,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_pooling(path: &Path) -> Result<Pooling> {
    let config: PoolingConfig = read_json(path)?;
    Ok(match (config.pooling_mode_cls_token, config.pooling_mode_mean_tokens) {
        (false, true) => Pooling::Mean,
        _ => Pooling::Cls,
    })
}

fn read_normalize(path: &Path) -> Result<bool> {
    let modules: Vec<ModuleEntry> = read_json(path)?;
    Ok(modules.iter().any(|m| m.kind.ends_with(".Normalize")))
}
