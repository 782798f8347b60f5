use std::sync::Arc;

use crate::service::transfer::TransferCoordinator;

/// transfer_request_interceptor
///
/// Intercepts transfer requests published by the backend shards and hands
/// them to the coordinator. Rejected requests are logged and dropped, the
/// bus has no way to redeliver them.
pub fn transfer_request_interceptor(coordinator: &Arc<TransferCoordinator>, payload: String) {
    trace!("Receiving transfer request from shard: {}", payload);
    match coordinator.on_transfer_request(&payload) {
        Ok(_) => (),
        Err(e) => {
            log!(e.level(), "Dropping transfer request: {}", e);
        }
    }
}
