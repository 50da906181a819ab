//! ONNX sentence-embedding model used for both corpus and queries.
//!
//! The same bi-encoder embeds catalog entries once at index build time and
//! each query at search time, so their vectors are directly comparable.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::inference::model::EncoderPool;
use crate::inference::tokenize::TokenizerWrapper;
use crate::inference::Embedder;
use ndarray::{concatenate, Array2, ArrayView2, Axis};

pub struct BiEncoder {
    pool: EncoderPool,
    tokenizer: TokenizerWrapper,
    batch_size: usize,
}

impl BiEncoder {
    /// Load the model pool and tokenizer described by `config`, then run a
    /// warmup pass so the first real query doesn't pay lazy-init cost.
    pub fn load(config: &Config) -> Result<Self> {
        let tokenizer = TokenizerWrapper::load(&config.tokenizer_path, config.max_sequence_length)?;
        let pool = EncoderPool::load_pool(
            &config.model_path,
            config.effective_pool_size(),
            config.intra_threads,
        )?;

        let encoder = Self {
            pool,
            tokenizer,
            batch_size: config.batch_size.max(1),
        };
        encoder.warmup()?;

        Ok(encoder)
    }

    fn warmup(&self) -> Result<()> {
        tracing::info!("Running model warmup...");
        let embedding = self.encode("warmup query")?;
        tracing::info!(dimension = embedding.len(), "Model warmup completed successfully");
        Ok(())
    }
}

impl Embedder for BiEncoder {
    fn encode_batch(&self, texts: &[String]) -> Result<Array2<f32>> {
        if texts.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }

        let mut batches = Vec::with_capacity(texts.len().div_ceil(self.batch_size));
        for chunk in texts.chunks(self.batch_size) {
            let (input_ids, attention_mask, token_type_ids) = self.tokenizer.tokenize_batch(chunk)?;
            batches.push(self.pool.embed(input_ids, attention_mask, token_type_ids)?);
        }

        let views: Vec<ArrayView2<'_, f32>> = batches.iter().map(|b| b.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| AppError::ModelError(e.to_string()))
    }
}
