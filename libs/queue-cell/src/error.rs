use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Hook {hook} failed: {message}")]
    HookFailed { hook: &'static str, message: String },
}
