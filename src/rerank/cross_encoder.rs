//! ONNX Runtime cross-encoder (ms-marco-MiniLM-L-6-v2).
//!
//! Encodes each `(query, passage)` pair as one sequence with segment ids and
//! reads the single relevance logit per pair.

use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{EncodeInput, Tokenizer};

use super::Reranker;
use crate::config::RerankConfig;
use crate::embedding::local::{load_tokenizer, open_session, select_output};
use crate::error::{MemoryError, Result};

/// Maximum sequence length for the pair encoding.
const MAX_SEQ_LEN: usize = 512;

/// Pairs per inference call.
const BATCH_SIZE: usize = 16;

pub struct CrossEncoderReranker {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
unsafe impl Send for CrossEncoderReranker {}
unsafe impl Sync for CrossEncoderReranker {}

fn backend(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Backend(format!("rerank failed: {e}"))
}

impl CrossEncoderReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(MemoryError::Configuration(format!(
                    "cross-encoder file not found at {}. Run `mnemo model download` first.",
                    path.display()
                )));
            }
        }

        let session = open_session(&model_path)?;
        let tokenizer = load_tokenizer(&tokenizer_path, MAX_SEQ_LEN)?;
        tracing::info!(model = %model_path.display(), "cross-encoder loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }

    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let inputs: Vec<EncodeInput> = passages
            .iter()
            .map(|p| EncodeInput::Dual(query.into(), (*p).into()))
            .collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| MemoryError::Backend(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&v| v as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&v| v as i64));
            token_type_ids.extend(encoding.get_type_ids().iter().map(|&v| v as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(backend)?;
        let attention_mask = Tensor::from_array((shape.clone(), attention_mask.into_boxed_slice()))
            .map_err(backend)?;
        let token_type_ids =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice())).map_err(backend)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| MemoryError::Backend(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            })
            .map_err(backend)?;

        let logits = select_output(
            outputs.get("logits"),
            outputs.len(),
            || &outputs[0],
            "cross-encoder",
        )?;
        let (shape, data) = logits
            .try_extract_tensor::<f32>()
            .map_err(|e| MemoryError::Backend(format!("failed to extract logits: {e}")))?;

        // Expected [batch, 1]; some exports emit [batch].
        let dims: &[i64] = &shape;
        let per_row = match dims {
            [b] if *b as usize == batch_size => 1,
            [b, n] if *b as usize == batch_size && *n >= 1 => *n as usize,
            _ => {
                return Err(MemoryError::Backend(format!(
                    "unexpected logits shape: {dims:?}, expected [{batch_size}, 1]"
                )))
            }
        };

        // Multi-logit heads put relevance in the last column.
        Ok((0..batch_size)
            .map(|b| data[b * per_row + per_row - 1])
            .collect())
    }
}

impl Reranker for CrossEncoderReranker {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for batch in passages.chunks(BATCH_SIZE) {
            scores.extend(self.score_batch(query, batch)?);
        }
        Ok(scores)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
