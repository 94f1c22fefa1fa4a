// ── Device contract ──
//
// The reconciler talks to the blade through two narrow seams: an outbound
// `DeviceLink::write` and inbound `ObservedUpdate` callbacks. The keyword
// client behind them is a black box.

use std::future::Future;
use std::sync::Arc;

use crate::action::{Action, WritePolicy};
use crate::error::CoreError;

/// Outbound command contract.
///
/// Implementations send `action` to the device and resolve according to
/// `policy`. With [`WritePolicy::AcceptOnSend`] they must resolve as soon as
/// the request is on its way and must never wait for confirmation.
pub trait DeviceLink: Send + Sync + 'static {
    fn write(
        &self,
        action: Action,
        policy: WritePolicy,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

impl<T: DeviceLink> DeviceLink for Arc<T> {
    fn write(
        &self,
        action: Action,
        policy: WritePolicy,
    ) -> impl Future<Output = Result<(), CoreError>> + Send {
        (**self).write(action, policy)
    }
}

/// Inbound subscription contract: one callback per confirmed field change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservedUpdate {
    /// The device output now carries this slot, or a foreign source (`None`).
    Selected(Option<usize>),
    Hue { slot: usize, value: f64 },
    Saturation { slot: usize, value: f64 },
}
