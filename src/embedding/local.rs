//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] using the all-MiniLM-L6-v2
//! model via `ort`. Handles tokenization, inference, mean pooling, and L2 normalization.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, LOCAL_EMBEDDING_DIM};
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

fn backend(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Backend(e.to_string())
}

fn model_load(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Configuration(format!("failed to load ONNX model: {e}"))
}

/// Build an optimized ONNX Runtime session for the model at `model_path`.
pub(crate) fn open_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(model_load)?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(model_load)?
        .with_intra_threads(4)
        .map_err(model_load)?
        .commit_from_file(model_path)
        .map_err(model_load)
}

/// Pick the named output if the export has it, else the first of `count` outputs.
/// ONNX exports disagree on output names; an export with no outputs is a backend error.
pub(crate) fn select_output<'a, V>(
    named: Option<&'a V>,
    count: usize,
    first: impl FnOnce() -> &'a V,
    model: &str,
) -> Result<&'a V> {
    match named {
        Some(value) => Ok(value),
        None if count > 0 => Ok(first()),
        None => Err(MemoryError::Backend(format!("{model} produced no outputs"))),
    }
}

/// Load a HuggingFace tokenizer with truncation at `max_length` and batch-longest padding.
pub(crate) fn load_tokenizer(tokenizer_path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| MemoryError::Configuration(format!("failed to load tokenizer: {e}")))?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| MemoryError::Configuration(format!("failed to set truncation: {e}")))?;

    tokenizer.with_padding(Some(tokenizers::PaddingParams {
        strategy: tokenizers::PaddingStrategy::BatchLongest,
        ..Default::default()
    }));

    Ok(tokenizer)
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(MemoryError::Configuration(format!(
                "ONNX model not found at {}. Run `mnemo model download` first.",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(MemoryError::Configuration(format!(
                "Tokenizer not found at {}. Run `mnemo model download` first.",
                tokenizer_path.display()
            )));
        }

        let session = open_session(&model_path)?;
        tracing::info!(model = %model_path.display(), "ONNX embedding model loaded");

        let tokenizer = load_tokenizer(&tokenizer_path, MAX_SEQ_LEN)?;
        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Backend("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        // Step 1: Tokenize
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| MemoryError::Backend(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        // Step 2: Build flat input tensors as i64
        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))
                .map_err(backend)?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask_flat.clone().into_boxed_slice()))
                .map_err(backend)?;
        // token_type_ids: all zeros (single sentence, no segment B)
        let token_type_ids = vec![0i64; batch_size * seq_len];
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice())).map_err(backend)?;

        // Step 3: Run ONNX inference
        let mut session = self
            .session
            .lock()
            .map_err(|e| MemoryError::Backend(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(backend)?;

        // Step 4: Extract token embeddings, shape [batch, seq_len, 384]
        // The output name varies by ONNX export. Try common names, fall back to index 0.
        let token_emb_value = select_output(
            outputs
                .get("token_embeddings")
                .or_else(|| outputs.get("last_hidden_state")),
            outputs.len(),
            || &outputs[0],
            "embedding model",
        )?;

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .map_err(|e| MemoryError::Backend(format!("failed to extract token_embeddings: {e}")))?;

        let dims: &[i64] = &shape;
        if dims.len() != 3 || dims[2] != LOCAL_EMBEDDING_DIM as i64 {
            return Err(MemoryError::Backend(format!(
                "unexpected token_embeddings shape: {dims:?}, expected [batch, seq, {LOCAL_EMBEDDING_DIM}]"
            )));
        }
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        // Step 5: Mean pooling with attention mask
        let mut results = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for s in 0..actual_seq_len {
                let mask = attention_mask_flat[b * seq_len + s] as f32;
                if mask > 0.0 {
                    let offset = (b * actual_seq_len + s) * hidden_dim;
                    for (d, acc) in sum.iter_mut().enumerate() {
                        *acc += data[offset + d] * mask;
                    }
                    count += mask;
                }
            }

            if count > 0.0 {
                sum.iter_mut().for_each(|x| *x /= count);
            }

            // Step 6: L2 normalize
            results.push(l2_normalize(&sum));
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_output_wins_then_first_slot() {
        let outputs = ["logits".to_string(), "hidden".to_string()];
        let picked = select_output(Some(&outputs[1]), 2, || &outputs[0], "model").unwrap();
        assert_eq!(picked, "hidden");
        let picked = select_output(None, 2, || &outputs[0], "model").unwrap();
        assert_eq!(picked, "logits");
    }

    #[test]
    fn model_without_outputs_is_backend_error() {
        let never: Vec<String> = Vec::new();
        let err = select_output(None, 0, || &never[0], "cross-encoder").unwrap_err();
        assert!(err.is_backend());
        assert!(err.to_string().contains("cross-encoder produced no outputs"));
    }

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "local".into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_model_is_configuration_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            cache_dir: tmp.path().to_string_lossy().into_owned(),
            ..test_config()
        };
        let err = LocalEmbeddingProvider::new(&config).err().expect("no model files");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("mnemo model download"));
    }

    #[test]
    #[ignore] // Requires model files; run with: cargo test -- --ignored
    fn test_embed_produces_384_dims() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let embedding = provider.embed("Hello world").unwrap();
        assert_eq!(embedding.len(), LOCAL_EMBEDDING_DIM);
    }

    #[test]
    #[ignore]
    fn test_embed_is_l2_normalized() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let embedding = provider.embed("Test sentence for normalization").unwrap();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    #[ignore]
    fn test_embed_batch() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let texts = vec!["First sentence", "Second sentence", "Third sentence"];
        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), LOCAL_EMBEDDING_DIM);
        }
    }
}
