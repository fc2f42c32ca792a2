use crate::udf::register_udfs;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::SessionConfig;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

static SHARED_CONTEXT: OnceCell<Arc<SessionContext>> = OnceCell::new();

/// Returns the process-wide execution context, creating it on first use.
///
/// Every caller shares one `SessionContext`; object stores registered on it
/// by one pass are visible to the next.
pub fn shared_context() -> Arc<SessionContext> {
    SHARED_CONTEXT
        .get_or_init(|| {
            info!("Creating shared execution context");
            Arc::new(new_context())
        })
        .clone()
}

/// A fresh context with the project UDFs registered. Outside of tests use
/// [`shared_context`].
pub(crate) fn new_context() -> SessionContext {
    let config = SessionConfig::new()
        .with_information_schema(false)
        .with_target_partitions(num_partitions());

    let ctx = SessionContext::new_with_config(config);
    register_udfs(&ctx);
    ctx
}

fn num_partitions() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
