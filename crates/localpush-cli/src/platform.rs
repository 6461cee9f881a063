//! Terminal implementations of the host platform seams.

use std::io::{self, IsTerminal, Write};

use async_trait::async_trait;
use dashmap::DashMap;
use owo_colors::OwoColorize;

use localpush_core::{
    Capability, CoreError, Grant, InboundMessage, PermissionPlatform, SystemNotifier,
};

// ── Permissions ──────────────────────────────────────────────────────

/// Asks on the terminal. Answers last for the process.
///
/// Printing to a terminal needs no OS grant, so notifications count as
/// granted up front; anything else starts undetermined.
pub struct TerminalPermissions {
    assume_yes: bool,
    answers: DashMap<Capability, Grant>,
}

impl TerminalPermissions {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            answers: DashMap::new(),
        }
    }
}

#[async_trait]
impl PermissionPlatform for TerminalPermissions {
    fn status(&self, capability: Capability) -> Grant {
        if let Some(grant) = self.answers.get(&capability) {
            return *grant;
        }
        match capability {
            Capability::Notifications => Grant::Granted,
            Capability::Location | Capability::ForegroundService => Grant::Undetermined,
        }
    }

    async fn prompt(
        &self,
        capabilities: Vec<Capability>,
    ) -> Result<Vec<(Capability, Grant)>, CoreError> {
        let assume_yes = self.assume_yes;
        let answers = tokio::task::spawn_blocking(move || ask_all(&capabilities, assume_yes))
            .await
            .map_err(|e| CoreError::PermissionUnavailable {
                message: e.to_string(),
            })??;

        for (cap, grant) in &answers {
            self.answers.insert(*cap, *grant);
        }
        Ok(answers)
    }
}

fn ask_all(
    capabilities: &[Capability],
    assume_yes: bool,
) -> Result<Vec<(Capability, Grant)>, CoreError> {
    let interactive = io::stdin().is_terminal();
    capabilities
        .iter()
        .map(|cap| {
            let grant = if assume_yes {
                Grant::Granted
            } else if !interactive {
                tracing::warn!(capability = %cap, "cannot prompt without a terminal");
                Grant::Denied
            } else {
                let allowed = dialoguer::Confirm::new()
                    .with_prompt(format!("Allow {cap} access?"))
                    .default(true)
                    .interact()
                    .map_err(|e| CoreError::PermissionUnavailable {
                        message: e.to_string(),
                    })?;
                if allowed { Grant::Granted } else { Grant::Denied }
            };
            Ok((*cap, grant))
        })
        .collect()
}

// ── Notifications ────────────────────────────────────────────────────

/// Prints a banner on stderr, leaving stdout for the message stream.
pub struct TerminalNotifier {
    color: bool,
}

impl TerminalNotifier {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl SystemNotifier for TerminalNotifier {
    fn show(&self, message: &InboundMessage) -> Result<(), CoreError> {
        let mut stderr = io::stderr().lock();
        let written = if self.color {
            writeln!(
                stderr,
                "{} {} {}",
                "[notification]".magenta(),
                message.title.bold(),
                message.body.dimmed()
            )
        } else {
            writeln!(stderr, "[notification] {} {}", message.title, message.body)
        };
        written.map_err(|e| CoreError::Notifier {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assume_yes_grants_and_remembers() {
        let platform = TerminalPermissions::new(true);
        assert_eq!(platform.status(Capability::Location), Grant::Undetermined);
        assert_eq!(platform.status(Capability::Notifications), Grant::Granted);

        let answers = platform.prompt(vec![Capability::Location]).await.unwrap();
        assert_eq!(answers, vec![(Capability::Location, Grant::Granted)]);
        assert_eq!(platform.status(Capability::Location), Grant::Granted);
    }
}
