use crate::error::{AppError, Result};
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::Backoff;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::cell::UnsafeCell;
use std::path::Path;
use std::time::{Duration, Instant};

/// How long a caller waits for a free session before giving up.
const SESSION_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exclusive handout of session indices `0..size`.
///
/// A caller that finds every index taken waits for one to come back instead
/// of failing, so corpus rebuilds and live queries can share one pool.
pub struct SessionSlots {
    available: ArrayQueue<usize>,
    wait_timeout: Duration,
}

impl SessionSlots {
    pub fn new(size: usize, wait_timeout: Duration) -> Self {
        let size = size.max(1);
        let available = ArrayQueue::new(size);
        for i in 0..size {
            // Capacity is exactly `size`
            let _ = available.push(i);
        }
        Self {
            available,
            wait_timeout,
        }
    }

    /// Take a free index, waiting up to the configured timeout.
    ///
    /// The index goes back to the queue when the guard drops.
    pub fn acquire(&self) -> Result<SlotGuard<'_>> {
        let deadline = Instant::now() + self.wait_timeout;
        let backoff = Backoff::new();

        loop {
            if let Some(index) = self.available.pop() {
                return Ok(SlotGuard { slots: self, index });
            }
            if Instant::now() >= deadline {
                return Err(AppError::ResourceError(format!(
                    "No session freed up within {}ms",
                    self.wait_timeout.as_millis()
                )));
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }
}

/// A session index held by one caller.
pub struct SlotGuard<'a> {
    slots: &'a SessionSlots,
    index: usize,
}

impl SlotGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let _ = self.slots.available.push(self.index);
    }
}

/// A pool of ONNX Runtime sessions for a sentence-embedding model.
///
/// `Session::run` needs `&mut self`. Rather than serializing every query on a
/// Mutex, the pool holds N independent sessions and hands out exclusive
/// indices through [`SessionSlots`].
///
/// # Safety
/// Each session index is held by at most one thread at a time; the slot
/// guard enforces this through atomic pop/push, which makes the
/// UnsafeCell access in `run_on_session` exclusive.
pub struct EncoderPool {
    /// Pool of ONNX sessions - exclusive access guaranteed by `slots`
    sessions: Vec<UnsafeCell<Session>>,
    slots: SessionSlots,
}

impl EncoderPool {
    /// Load `pool_size` sessions from one model file.
    pub fn load_pool(model_path: &Path, pool_size: usize, intra_threads: usize) -> Result<Self> {
        let pool_size = pool_size.max(1);

        // Read model file once
        let model_bytes = std::fs::read(model_path)
            .map_err(|e| AppError::ModelError(format!("Failed to read model file: {}", e)))?;

        let mut sessions = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| AppError::ModelError(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::ModelError(e.to_string()))?
                .with_intra_threads(intra_threads)
                .map_err(|e| AppError::ModelError(e.to_string()))?
                .commit_from_memory(&model_bytes)
                .map_err(|e: ort::Error| AppError::ModelError(e.to_string()))?;

            sessions.push(UnsafeCell::new(session));
        }

        tracing::info!(
            path = %model_path.display(),
            pool_size,
            intra_threads,
            "Embedding session pool loaded"
        );

        Ok(Self {
            sessions,
            slots: SessionSlots::new(pool_size, SESSION_WAIT_TIMEOUT),
        })
    }

    /// Embed a tokenized batch. Returns mean-pooled, unnormalized embeddings
    /// of shape (batch_size, hidden_size).
    pub fn embed(
        &self,
        input_ids: Array2<i64>,
        attention_mask: Array2<i64>,
        token_type_ids: Array2<i64>,
    ) -> Result<Array2<f32>> {
        let slot = self.slots.acquire()?;
        self.run_on_session(slot.index(), input_ids, attention_mask, token_type_ids)
    }

    fn run_on_session(
        &self,
        session_idx: usize,
        input_ids: Array2<i64>,
        attention_mask: Array2<i64>,
        token_type_ids: Array2<i64>,
    ) -> Result<Array2<f32>> {
        let (batch_size, seq_len) = input_ids.dim();
        let shape = [batch_size, seq_len];

        let input_ids_tensor = Tensor::from_array((shape, input_ids.iter().copied().collect::<Vec<i64>>()))
            .map_err(|e| AppError::ModelError(e.to_string()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape, attention_mask.iter().copied().collect::<Vec<i64>>()))
                .map_err(|e| AppError::ModelError(e.to_string()))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.iter().copied().collect::<Vec<i64>>()))
                .map_err(|e| AppError::ModelError(e.to_string()))?;

        // SAFETY: the caller holds the slot guard for session_idx, and only
        // one guard per index exists at a time.
        let session = unsafe { &mut *self.sessions[session_idx].get() };

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| AppError::ModelError(format!("Embedding inference failed: {}", e)))?;

        // last_hidden_state: (batch, seq_len, hidden_size)
        let hidden_state = outputs
            .get("last_hidden_state")
            .ok_or_else(|| AppError::ModelError("No 'last_hidden_state' output found".to_string()))?;

        let (shape_info, data) = hidden_state
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::ModelError(e.to_string()))?;

        if shape_info.len() != 3 {
            return Err(AppError::ModelError(format!(
                "Unexpected hidden state rank: {}",
                shape_info.len()
            )));
        }
        let hidden_size = shape_info[2] as usize;

        Ok(mean_pool(data, &attention_mask, hidden_size))
    }
}

// SAFETY: EncoderPool is Send + Sync because:
// - ArrayQueue is lock-free and thread-safe (crossbeam guarantee)
// - While a SlotGuard lives, only its thread can access that UnsafeCell<Session>
// - Sessions are never accessed without first acquiring a slot
unsafe impl Send for EncoderPool {}
unsafe impl Sync for EncoderPool {}

/// Average token embeddings over positions where the attention mask is set.
///
/// `hidden` is the row-major (batch, seq_len, hidden_size) output buffer.
pub fn mean_pool(hidden: &[f32], attention_mask: &Array2<i64>, hidden_size: usize) -> Array2<f32> {
    let (batch_size, seq_len) = attention_mask.dim();
    let mut embeddings = Array2::zeros((batch_size, hidden_size));

    for i in 0..batch_size {
        let mut count = 0.0f32;
        let mut row = embeddings.row_mut(i);

        for j in 0..seq_len {
            if attention_mask[[i, j]] == 1 {
                let base = (i * seq_len + j) * hidden_size;
                for (k, val) in row.iter_mut().enumerate() {
                    *val += hidden[base + k];
                }
                count += 1.0;
            }
        }

        if count > 0.0 {
            row.mapv_inplace(|v| v / count);
        }
    }

    embeddings
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // batch=1, seq_len=3, hidden=2; last token is padding
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = array![[1i64, 1, 0]];

        let pooled = mean_pool(&hidden, &mask, 2);

        assert_eq!(pooled.dim(), (1, 2));
        assert!((pooled[[0, 0]] - 2.0).abs() < 1e-6);
        assert!((pooled[[0, 1]] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_pool_batches_rows_independently() {
        // batch=2, seq_len=2, hidden=1
        let hidden = [2.0, 4.0, 10.0, 0.0];
        let mask = array![[1i64, 1], [1, 0]];

        let pooled = mean_pool(&hidden, &mask, 1);

        assert!((pooled[[0, 0]] - 3.0).abs() < 1e-6);
        assert!((pooled[[1, 0]] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_slots_hand_out_distinct_indices() {
        let slots = SessionSlots::new(3, Duration::from_millis(10));

        let a = slots.acquire().unwrap();
        let b = slots.acquire().unwrap();
        let c = slots.acquire().unwrap();

        let indices: HashSet<usize> = [a.index(), b.index(), c.index()].into_iter().collect();
        assert_eq!(indices, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let slots = Arc::new(SessionSlots::new(1, Duration::from_secs(5)));
        let held = slots.acquire().unwrap();

        let waiter = {
            let slots = Arc::clone(&slots);
            std::thread::spawn(move || slots.acquire().map(|slot| slot.index()))
        };

        std::thread::sleep(Duration::from_millis(30));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn test_acquire_times_out_when_never_released() {
        let slots = SessionSlots::new(1, Duration::from_millis(20));
        let _held = slots.acquire().unwrap();

        assert!(matches!(slots.acquire(), Err(AppError::ResourceError(_))));
    }

    #[test]
    fn test_slot_returns_after_drop() {
        let slots = SessionSlots::new(1, Duration::from_millis(10));

        drop(slots.acquire().unwrap());

        assert!(slots.acquire().is_ok());
    }
}
