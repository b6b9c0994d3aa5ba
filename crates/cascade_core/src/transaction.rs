use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::Connection;

tokio::task_local! {
    /// The connection each data source's ambient transaction, if any, is
    /// bound to for the current task. Driver calls made anywhere inside
    /// `QueryBuilder`/`Model` code running on this task transparently join
    /// whichever of these is present for their data source, instead of
    /// requiring the transaction handle to be threaded through every call.
    static CURRENT_TRANSACTION: RefCell<HashMap<String, Arc<dyn Connection>>>;
}

/// Runs `fut` with `connection` bound as the ambient transaction for
/// `data_source`, nesting on top of whatever bindings (for other data
/// sources) are already active on the current task.
pub async fn with_transaction<T>(
    data_source: &str,
    connection: Arc<dyn Connection>,
    fut: impl Future<Output = T>,
) -> T {
    let mut bindings = current_bindings();
    bindings.insert(data_source.to_string(), connection);
    CURRENT_TRANSACTION.scope(RefCell::new(bindings), fut).await
}

/// The connection bound to `data_source`'s ambient transaction on the
/// current task, if one is active.
pub fn current(data_source: &str) -> Option<Arc<dyn Connection>> {
    CURRENT_TRANSACTION
        .try_with(|bindings| bindings.borrow().get(data_source).cloned())
        .ok()
        .flatten()
}

pub fn in_transaction(data_source: &str) -> bool {
    current(data_source).is_some()
}

fn current_bindings() -> HashMap<String, Arc<dyn Connection>> {
    CURRENT_TRANSACTION
        .try_with(|bindings| bindings.borrow().clone())
        .unwrap_or_default()
}
