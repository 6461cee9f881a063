// ── Message model ──
//
// Types that cross from the transport and OS callbacks into the router,
// and from the router out to the application.

pub mod message;

pub use message::{
    AppLifecycle, InboundMessage, MessageResponse, MessageSource, MessageSystem,
    NotificationContent,
};
