//! Runtime utilities that abstract over the underlying async executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Intended for entry points and test harnesses; never call it from inside
/// an async context.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Returns `true` when called from within a runtime context.
pub fn in_runtime() -> bool {
    Handle::try_current().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_outside_runtime() {
        assert!(!in_runtime());
        assert_eq!(block_on(async { in_runtime() }), true);
    }
}
