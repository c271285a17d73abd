// Panic isolation for worker tasks
use std::any::Any;
use tokio::task::JoinError;
use tracing::error;

/// Outcome of a supervised worker task
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    Success(T),
    Panicked(String),
    Cancelled,
}

impl<T> From<Result<T, JoinError>> for PanicGuardResult<T> {
    fn from(joined: Result<T, JoinError>) -> Self {
        match joined {
            Ok(value) => PanicGuardResult::Success(value),
            Err(err) if err.is_panic() => {
                let msg = panic_message(err.into_panic());
                error!(panic_msg = %msg, "Worker task panicked");
                PanicGuardResult::Panicked(msg)
            }
            Err(_) => PanicGuardResult::Cancelled,
        }
    }
}

/// Spawn `future` on its own task so a panic inside it cannot unwind into the caller
pub async fn execute_guarded<F>(future: F) -> PanicGuardResult<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future).await.into()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
