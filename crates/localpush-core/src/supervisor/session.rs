// One connection session: connect, register, heartbeat, read frames,
// and reconnect with backoff until cancelled or out of retries.

use std::sync::Arc;
use std::time::Duration;

use localpush_api::wire::{self, Frame, RegisterFrame};
use localpush_api::{Connector, Link};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{SessionState, SessionStatus, SupervisorOptions};
use crate::error::CoreError;
use crate::events::PlatformHooks;
use crate::model::InboundMessage;
use crate::reconnect::ReconnectState;
use crate::settings::RelayTarget;

/// Upper bound on a graceful close before the link is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    Cancelled,
    Failed(CoreError),
}

enum LinkEnd {
    Cancelled,
    Lost(CoreError),
}

pub(crate) struct Session {
    pub generation: u64,
    pub target: RelayTarget,
    pub connector: Arc<dyn Connector>,
    pub identity: watch::Receiver<Option<RegisterFrame>>,
    pub hooks: PlatformHooks,
    pub status: Arc<watch::Sender<SessionStatus>>,
    pub options: SupervisorOptions,
    pub cancel: CancellationToken,
}

impl Session {
    fn publish(&self, state: SessionState) {
        self.status
            .send_replace(SessionStatus::new(Some(self.generation), state));
    }

    pub(crate) async fn run(mut self) -> SessionEnd {
        let endpoint = self.target.endpoint.clone();
        let mut retry = ReconnectState::new();

        loop {
            self.publish(SessionState::Starting);

            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Cancelled,
                result = self.connector.connect(&endpoint) => result,
            };

            let failure = match connected {
                Ok(link) => {
                    retry.on_connected();
                    self.publish(SessionState::Connected);
                    info!(
                        generation = self.generation,
                        endpoint = %endpoint,
                        authenticated = self.target.has_public_key(),
                        "session connected"
                    );
                    match self.drive(link).await {
                        LinkEnd::Cancelled => return SessionEnd::Cancelled,
                        LinkEnd::Lost(err) => err,
                    }
                }
                Err(e) => CoreError::from(e),
            };

            if !failure.is_transient() {
                error!(
                    generation = self.generation,
                    error = %failure,
                    "session failed permanently"
                );
                self.publish(SessionState::Failed {
                    reason: failure.to_string(),
                });
                return SessionEnd::Failed(failure);
            }

            let Some(delay) = retry.on_failure(&self.options.reconnect) else {
                let err = CoreError::RetriesExhausted {
                    attempts: retry.attempt(),
                    last_error: failure.to_string(),
                };
                error!(generation = self.generation, error = %err, "giving up on relay");
                self.publish(SessionState::Failed {
                    reason: err.to_string(),
                });
                return SessionEnd::Failed(err);
            };

            warn!(
                generation = self.generation,
                attempt = retry.attempt(),
                delay_ms = delay.as_millis(),
                error = %failure,
                "connection lost, reconnecting"
            );
            self.publish(SessionState::Reconnecting {
                attempt: retry.attempt(),
                retry_in_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn drive(&mut self, mut link: Box<dyn Link>) -> LinkEnd {
        let end = self.pump(&mut *link).await;
        if tokio::time::timeout(CLOSE_TIMEOUT, link.close()).await.is_err() {
            debug!("link close timed out");
        }
        end
    }

    async fn pump(&mut self, link: &mut dyn Link) -> LinkEnd {
        let initial = self.identity.borrow_and_update().clone();
        if let Some(frame) = initial {
            if let Err(e) = send_register(link, &frame).await {
                return LinkEnd::Lost(e);
            }
        } else {
            debug!("no user identity yet, skipping register");
        }

        let period = self.options.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_heard = Instant::now();
        let mut identity_open = true;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return LinkEnd::Cancelled,
                changed = self.identity.changed(), if identity_open => {
                    if changed.is_err() {
                        identity_open = false;
                        continue;
                    }
                    let frame = self.identity.borrow_and_update().clone();
                    if let Some(frame) = frame {
                        info!(generation = self.generation, "identity changed, re-registering");
                        if let Err(e) = send_register(link, &frame).await {
                            return LinkEnd::Lost(e);
                        }
                    }
                }
                _ = ping.tick() => {
                    let silent = last_heard.elapsed();
                    if silent >= self.options.pong_timeout {
                        return LinkEnd::Lost(CoreError::Transport {
                            message: format!("no reply from relay for {}s", silent.as_secs()),
                            transient: true,
                        });
                    }
                    trace!("sending ping");
                    if let Err(e) = link.send_text(wire::encode_ping()).await {
                        return LinkEnd::Lost(e.into());
                    }
                }
                inbound = link.next_text() => match inbound {
                    None => {
                        return LinkEnd::Lost(CoreError::Transport {
                            message: "relay closed the connection".into(),
                            transient: true,
                        });
                    }
                    Some(Err(e)) => return LinkEnd::Lost(e.into()),
                    Some(Ok(text)) => {
                        last_heard = Instant::now();
                        self.handle_frame(&text);
                    }
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match Frame::decode(text) {
            Ok(Frame::Pong(_)) => trace!("pong"),
            Ok(Frame::Message(frame)) => {
                debug!(id = %frame.id, "message received");
                self.hooks
                    .transport_message(InboundMessage::from_frame(frame));
            }
            Ok(Frame::Unknown(value)) => debug!(frame = %value, "ignoring unrecognised frame"),
            Err(e) => warn!(error = %e, "ignoring malformed frame"),
        }
    }
}

async fn send_register(link: &mut dyn Link, frame: &RegisterFrame) -> Result<(), CoreError> {
    link.send_text(frame.encode()?).await?;
    debug!(
        connector_id = %frame.sender.connector_id,
        connector_tag = %frame.sender.connector_tag,
        "registered with relay"
    );
    Ok(())
}
