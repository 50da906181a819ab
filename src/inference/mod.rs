pub mod bi_encoder;
pub mod model;
pub mod tokenize;

pub use bi_encoder::BiEncoder;
pub use model::{EncoderPool, SessionSlots};
pub use tokenize::TokenizerWrapper;

use crate::error::{AppError, Result};
use ndarray::{Array1, Array2};

/// Text-to-vector model. Identical input must give identical output.
pub trait Embedder: Send + Sync {
    /// Embed texts in order; one row per input, all rows the same length.
    fn encode_batch(&self, texts: &[String]) -> Result<Array2<f32>>;

    /// Embed a single text.
    fn encode(&self, text: &str) -> Result<Array1<f32>> {
        let batch = self.encode_batch(&[text.to_string()])?;
        if batch.nrows() != 1 {
            return Err(AppError::ModelError(format!(
                "Expected 1 embedding, got {}",
                batch.nrows()
            )));
        }
        Ok(batch.row(0).to_owned())
    }
}
