use log::warn;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::logging::log_file_error;

/// Extract panic info from panic value
pub fn extract_panic_info(panic_err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_err.downcast_ref::<&str>() {
        format!("Panic with message: {}", s)
    } else if let Some(s) = panic_err.downcast_ref::<String>() {
        format!("Panic with message: {}", s)
    } else {
        "Unknown panic occurred".to_string()
    }
}

/// Execute a function with a timeout.
///
/// Returns `Ok(T)` if the function completes within the timeout, or an
/// `std::io::Error` if it times out or panics. A timed-out worker is left to
/// finish in the background; its result is discarded.
pub fn execute_with_timeout<T, F>(
    path: &Path,
    operation_name: &str,
    timeout: Duration,
    task: F,
) -> Result<T, std::io::Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name(format!("{}-worker", operation_name.to_lowercase()))
        .spawn(move || {
            let result = task();
            // The receiver is gone if we already timed out
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            let _ = handle.join();
            Ok(result)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            // The sender was dropped without sending, so the task panicked
            let message = match handle.join() {
                Err(panic) => extract_panic_info(panic),
                Ok(()) => "worker exited without a result".to_string(),
            };
            let err = std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} failed: {}", operation_name, message),
            );
            log_file_error(path, operation_name, &err);
            Err(err)
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(
                "TIMEOUT: {} took longer than {}s for '{}'",
                operation_name,
                timeout.as_secs(),
                path.display()
            );

            let err = std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "{} timed out after {} seconds",
                    operation_name,
                    timeout.as_secs()
                ),
            );
            log_file_error(path, operation_name, &err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_within_timeout() {
        let result = execute_with_timeout(Path::new("a.jpg"), "Fingerprint", Duration::from_secs(5), || 42);
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_times_out() {
        let result = execute_with_timeout(
            Path::new("slow.jpg"),
            "Fingerprint",
            Duration::from_millis(50),
            || {
                thread::sleep(Duration::from_millis(500));
                1
            },
        );
        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_panic_becomes_error() {
        let result: Result<u32, _> = execute_with_timeout(
            Path::new("bad.jpg"),
            "Fingerprint",
            Duration::from_secs(5),
            || panic!("decoder exploded"),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("decoder exploded"));
    }
}
