//! Local sentence encoder using ONNX Runtime.
//!
//! Runs a transformer export entirely on-device. Inputs are tokenized,
//! grouped into padded batches and pooled into one vector per sentence.

use anyhow::{anyhow, Context, Result};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::clients::hub::{ModelFiles, Pooling};
use crate::config::DevicePreference;
use crate::services::vector_ops::VectorOps;
use crate::traits::{Device, SentenceEncoder};

/// Configuration for the local embedding model.
#[derive(Debug, Clone)]
pub struct LocalModelConfig {
    /// Model name for identification.
    pub model_name: String,
    /// Resolved model artifacts.
    pub files: ModelFiles,
    /// Requested compute device.
    pub device: DevicePreference,
}

/// Local embedding client using ONNX Runtime for inference.
pub struct LocalEmbeddingClient {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_name: String,
    pooling: Pooling,
    normalize: bool,
    max_seq_length: Option<usize>,
    uses_token_type_ids: bool,
    device: Device,
    dimension: usize,
}

/// Token ids and attention masks for one padded batch.
struct Batch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl LocalEmbeddingClient {
    /// Create a new local embedding client.
    ///
    /// Loads the ONNX session on the requested device, loads the tokenizer
    /// and runs a warm-up inference to learn the output dimension.
    pub fn new(config: LocalModelConfig) -> Result<Self> {
        info!("Initializing local embedding model: {}", config.model_name);

        let (session, device) = build_session(&config.files.model_path, config.device)?;
        info!("✓ ONNX session created for {} on {}", config.model_name, device);

        let tokenizer = Tokenizer::from_file(&config.files.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        info!("✓ Tokenizer loaded");

        let uses_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut client = Self {
            session: Mutex::new(session),
            tokenizer,
            model_name: config.model_name,
            pooling: config.files.pooling,
            normalize: config.files.normalize,
            max_seq_length: config.files.max_seq_length,
            uses_token_type_ids,
            device,
            dimension: 0,
        };

        let warmup = client
            .encode(&["validation test".to_string()], 1, 16)
            .context("Warm-up inference failed")?;
        client.dimension = warmup.first().map(Vec::len).unwrap_or(0);
        if client.dimension == 0 {
            return Err(anyhow!("Model {} produced empty embeddings", client.model_name));
        }

        info!(
            "✓ Local embedding model ready: {} ({}D, {:?} pooling)",
            client.model_name, client.dimension, client.pooling
        );
        Ok(client)
    }

    /// Tokenize texts and pad them into one batch.
    fn tokenize(&self, texts: &[String], max_tokens: usize) -> Result<Batch> {
        let limit = match self.max_seq_length {
            Some(model_max) => max_tokens.min(model_max),
            None => max_tokens,
        };

        let mut rows: Vec<(Vec<i64>, Vec<i64>)> = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

            let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            rows.push(truncate_row(ids, mask, limit));
        }

        let seq_len = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);
        let mut input_ids = Vec::with_capacity(rows.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(rows.len() * seq_len);

        for (ids, mask) in &rows {
            let padding = seq_len - ids.len();
            input_ids.extend_from_slice(ids);
            input_ids.extend(std::iter::repeat(self.pad_id()).take(padding));
            attention_mask.extend_from_slice(mask);
            attention_mask.extend(std::iter::repeat(0i64).take(padding));
        }

        Ok(Batch {
            rows: rows.len(),
            seq_len,
            input_ids,
            attention_mask,
        })
    }

    fn pad_id(&self) -> i64 {
        self.tokenizer
            .get_padding()
            .map(|p| p.pad_id as i64)
            .unwrap_or(0)
    }

    /// Run one padded batch through the session.
    fn run_batch(&self, batch: Batch) -> Result<Vec<Vec<f32>>> {
        let shape = [batch.rows, batch.seq_len];
        let mask = batch.attention_mask.clone();

        let input_ids = Tensor::from_array((shape, batch.input_ids.into_boxed_slice()))?;
        let attention_mask = Tensor::from_array((shape, batch.attention_mask.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Failed to lock session: {}", e))?;

        // Copy the output out so the session is released before pooling.
        let (dims, data) = {
            let outputs = if self.uses_token_type_ids {
                let token_type_ids = vec![0i64; batch.rows * batch.seq_len];
                let token_type_ids = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;
                session.run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                    "token_type_ids" => token_type_ids
                ])?
            } else {
                session.run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask
                ])?
            };

            let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
            (dims, data.to_vec())
        };
        drop(session);

        pool(&dims, &data, &mask, self.pooling)
    }
}

impl SentenceEncoder for LocalEmbeddingClient {
    fn encode(&self, texts: &[String], batch_size: usize, max_tokens: usize) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size.max(1)) {
            let batch = self.tokenize(chunk, max_tokens)?;
            debug!("Running batch of {} x {} tokens", batch.rows, batch.seq_len);
            embeddings.extend(self.run_batch(batch)?);
        }

        if self.normalize {
            VectorOps::batch_normalize(&mut embeddings);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> Device {
        self.device
    }
}

/// Create a session on the preferred device.
///
/// `Auto` tries CUDA first and falls back to CPU.
fn build_session(model_path: &Path, preference: DevicePreference) -> Result<(Session, Device)> {
    match preference {
        DevicePreference::Cpu => Ok((cpu_session(model_path)?, Device::Cpu)),
        DevicePreference::Cuda => Ok((cuda_session(model_path)?, Device::Cuda)),
        DevicePreference::Auto => match cuda_session(model_path) {
            Ok(session) => Ok((session, Device::Cuda)),
            Err(e) => {
                warn!("CUDA execution provider unavailable: {:#}", e);
                warn!("Falling back to CPU execution provider");
                Ok((cpu_session(model_path)?, Device::Cpu))
            }
        },
    }
}

fn cuda_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
        .context("Failed to set CUDA execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
    Ok(session)
}

fn cpu_session(model_path: &Path) -> Result<Session> {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
    Ok(session)
}

/// Cut a token row down to `limit`, keeping the closing special token.
///
/// The mask is cut plainly: its slots stay aligned with the kept ids.
fn truncate_row(mut ids: Vec<i64>, mut mask: Vec<i64>, limit: usize) -> (Vec<i64>, Vec<i64>) {
    if limit == 0 || ids.len() <= limit {
        return (ids, mask);
    }
    let last = ids[ids.len() - 1];
    ids.truncate(limit);
    ids[limit - 1] = last;
    mask.truncate(limit);
    (ids, mask)
}

/// Reduce model output to one vector per row.
///
/// `[rows, seq, hidden]` outputs are pooled, `[rows, hidden]` outputs are
/// taken as already pooled.
fn pool(dims: &[usize], data: &[f32], mask: &[i64], pooling: Pooling) -> Result<Vec<Vec<f32>>> {
    if dims.iter().skip(1).any(|&d| d == 0) {
        return Err(anyhow!("Degenerate output tensor shape: {:?}", dims));
    }
    let expected: usize = dims.iter().product();
    if data.len() < expected {
        return Err(anyhow!(
            "Output tensor holds {} values, shape {:?} needs {}",
            data.len(),
            dims,
            expected
        ));
    }

    match *dims {
        [rows, seq_len, hidden] => {
            if mask.len() < rows * seq_len {
                return Err(anyhow!(
                    "Attention mask covers {} tokens, output has {}",
                    mask.len(),
                    rows * seq_len
                ));
            }
            let mut pooled = Vec::with_capacity(rows);
            for row in 0..rows {
                let states = &data[row * seq_len * hidden..(row + 1) * seq_len * hidden];
                let row_mask = &mask[row * seq_len..(row + 1) * seq_len];

                let vector = match pooling {
                    Pooling::Cls => states[..hidden].to_vec(),
                    Pooling::Mean => {
                        let mut sum = vec![0.0f32; hidden];
                        let mut count = 0.0f32;
                        for (token, &m) in states.chunks(hidden).zip(row_mask) {
                            if m == 0 {
                                continue;
                            }
                            count += 1.0;
                            for (acc, &v) in sum.iter_mut().zip(token) {
                                *acc += v;
                            }
                        }
                        sum.iter_mut().for_each(|v| *v /= count.max(1e-9));
                        sum
                    }
                };
                pooled.push(vector);
            }
            Ok(pooled)
        }
        [rows, hidden] => Ok(data[..rows * hidden]
            .chunks(hidden)
            .map(|c| c.to_vec())
            .collect()),
        _ => Err(anyhow!("Unexpected output tensor shape: {:?}", dims)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_closing_token() {
        let (ids, mask) = truncate_row(vec![0, 5, 6, 7, 2], vec![1; 5], 3);
        assert_eq!(ids, vec![0, 5, 2]);
        assert_eq!(mask, vec![1, 1, 1]);

        let (ids, _) = truncate_row(vec![0, 5, 2], vec![1; 3], 8);
        assert_eq!(ids, vec![0, 5, 2]);
    }

    #[test]
    fn test_truncate_keeps_mask_aligned_with_fixed_padding() {
        // tokenizer padded to a fixed length: trailing mask slots are 0
        let ids = vec![0, 5, 6, 7, 2, 1, 1];
        let mask = vec![1, 1, 1, 1, 1, 0, 0];
        let (ids, mask) = truncate_row(ids, mask, 4);
        assert_eq!(ids, vec![0, 5, 6, 1]);
        assert_eq!(mask, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_pool_cls() {
        // 2 rows, 2 tokens, hidden 2
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mask = [1, 1, 1, 0];
        let pooled = pool(&[2, 2, 2], &data, &mask, Pooling::Cls).unwrap();
        assert_eq!(pooled, vec![vec![1.0, 2.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_pool_mean_ignores_padding() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 100.0, 100.0];
        let mask = [1, 1, 1, 0];
        let pooled = pool(&[2, 2, 2], &data, &mask, Pooling::Mean).unwrap();
        assert_eq!(pooled, vec![vec![2.0, 3.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_pool_already_pooled_output() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let pooled = pool(&[2, 2], &data, &[], Pooling::Mean).unwrap();
        assert_eq!(pooled, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_pool_rejects_degenerate_output() {
        assert!(pool(&[2, 0], &[], &[], Pooling::Cls).is_err());
        assert!(pool(&[1, 2, 0], &[], &[1, 1], Pooling::Mean).is_err());
        // fewer values than the shape claims
        assert!(pool(&[2, 3], &[0.0; 4], &[], Pooling::Cls).is_err());
        // mask shorter than the token grid
        assert!(pool(&[1, 2, 2], &[0.0; 4], &[1], Pooling::Mean).is_err());
    }

    #[test]
    fn test_pool_rejects_unknown_shape() {
        assert!(pool(&[4], &[0.0; 4], &[], Pooling::Cls).is_err());
    }

    #[test]
    #[ignore] // Requires model files to be present
    fn test_local_embedding() {
        let files = crate::clients::hub::resolve("./models/bge-m3").unwrap();
        let client = LocalEmbeddingClient::new(LocalModelConfig {
            model_name: "bge-m3".to_string(),
            files,
            device: DevicePreference::Cpu,
        })
        .unwrap();

        let texts = vec!["hello world".to_string(), "xxx".to_string()];
        let embeddings = client.encode(&texts, 32, 512).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == client.dimension()));
    }
}
