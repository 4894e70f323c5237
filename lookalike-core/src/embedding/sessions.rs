use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8Path;
use log::debug;
use ort::session::{builder::GraphOptimizationLevel, Session};

/// Sessions need exclusive access while running, so concurrent callers each take one from the pool.
pub type SessionPool = Arc<Vec<Mutex<Session>>>;

pub trait SessionPoolExt {
    fn get_session(&'_ self) -> MutexGuard<'_, Session>;
}

impl SessionPoolExt for SessionPool {
    fn get_session(&'_ self) -> MutexGuard<'_, Session> {
        for session_mutex in self.iter() {
            if let Ok(session) = session_mutex.try_lock() {
                return session;
            }
        }
        // Fallback to waiting for the first session, poisoned or not
        self[0].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loads `pool_size` sessions (at least one) for the model at `model_path`.
pub fn create_session_pool(pool_size: usize, intra_threads: usize, model_path: &Utf8Path)
    -> Result<SessionPool, anyhow::Error>
{
    let sessions = (0..pool_size.max(1))
        .map(|i| {
            debug!("Creating inference session {} for model {}", i, model_path);
            let session = Session::builder()
                .map_err(|e| anyhow::anyhow!("Failed to create session builder: {e}"))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| anyhow::anyhow!("Failed to set optimization level: {e}"))?
                .with_intra_threads(intra_threads)
                .map_err(|e| anyhow::anyhow!("Failed to set intra threads: {e}"))?
                .commit_from_file(model_path)
                .map_err(|e| anyhow::anyhow!("Failed to load model from {model_path}: {e}"))?;
            Ok(Mutex::new(session))
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;

    Ok(Arc::new(sessions))
}
