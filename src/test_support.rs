use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock serializing tests that mutate environment variables.
/// Sync tests take `.blocking_lock()`, async tests `.lock().await`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());
