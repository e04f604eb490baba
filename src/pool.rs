//! Scratch buffer pooling for the DWT's row/column working memory
//! (spec's concurrency model: "Scratch buffers are pooled per worker").
//! When `CLEAR_BUFFERS` / privacy mode is enabled, buffers are zeroed
//! before being returned to the pool rather than left with stale tile
//! data.

use std::sync::Mutex;

/// A pool of reusable `f64` scratch buffers, one per worker thread in
/// practice, guarded by a simple mutex since allocation churn is rare
/// relative to DWT work.
pub struct BufferPool {
  buffers: Mutex<Vec<Vec<f64>>>,
  clear_on_release: bool,
}

impl BufferPool {
  pub fn new(clear_on_release: bool) -> Self {
    Self { buffers: Mutex::new(Vec::new()), clear_on_release }
  }

  /// Builds a pool honoring the `CLEAR_BUFFERS` environment variable
  /// (Section 6's interface contract), defaulting to no clearing.
  pub fn from_env() -> Self {
    let clear = std::env::var("CLEAR_BUFFERS").map(|v| v == "true").unwrap_or(false);
    Self::new(clear)
  }

  /// Takes a buffer of at least `len` capacity from the pool, or
  /// allocates a fresh one.
  pub fn acquire(&self, len: usize) -> Vec<f64> {
    let mut pool = self.buffers.lock().expect("buffer pool mutex poisoned");
    match pool.pop() {
      Some(mut buf) => {
        buf.clear();
        buf.resize(len, 0.0);
        buf
      }
      None => vec![0.0; len],
    }
  }

  /// Returns a buffer to the pool, zeroing it first when privacy mode is
  /// enabled.
  pub fn release(&self, mut buf: Vec<f64>) {
    if self.clear_on_release {
      buf.iter_mut().for_each(|v| *v = 0.0);
    }
    let mut pool = self.buffers.lock().expect("buffer pool mutex poisoned");
    pool.push(buf);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn acquire_returns_zeroed_buffer_of_requested_length() {
    let pool = BufferPool::new(false);
    let buf = pool.acquire(8);
    assert_eq!(buf.len(), 8);
    assert!(buf.iter().all(|&v| v == 0.0));
  }

  #[test]
  fn release_with_clear_enabled_zeroes_contents() {
    let pool = BufferPool::new(true);
    let mut buf = pool.acquire(4);
    buf.iter_mut().for_each(|v| *v = 42.0);
    pool.release(buf);
    let reused = pool.acquire(4);
    assert!(reused.iter().all(|&v| v == 0.0));
  }
}
