use tracing::info;

use crate::error::CoreError;
use crate::model::InboundMessage;

/// Raises an OS-level notification for a message that arrived while the
/// application was not in front.
///
/// Attach [`InboundMessage::notification_payload`] to the notification so
/// a later tap or presentation callback resolves to the same message.
/// Implementations must return quickly; the router calls this inline.
pub trait SystemNotifier: Send + Sync {
    fn show(&self, message: &InboundMessage) -> Result<(), CoreError>;
}

/// Logs instead of showing anything. Default for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl SystemNotifier for TracingNotifier {
    fn show(&self, message: &InboundMessage) -> Result<(), CoreError> {
        info!(
            id = %message.id,
            title = %message.title,
            body = %message.body,
            "notification"
        );
        Ok(())
    }
}
