//! `listen`: run a session and print messages as they arrive.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use localpush_core::{LocalPush, MessageSystem, SessionState, SessionStatus};

use crate::cli::{GlobalOpts, ListenArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::settings::not_configured;

pub async fn handle(
    push: &LocalPush,
    args: &ListenArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !push.settings().is_configured() {
        return Err(not_configured(global));
    }

    push.hooks().lifecycle_changed(args.lifecycle());
    if !push.request_permission().await? {
        tracing::warn!("not every permission was granted");
    }
    push.start().await?;

    let spinner = status_spinner(global);
    let color = output::should_color(global.color);
    let mut status = push.status();
    let mut app = push.attach();
    let mut received = 0_usize;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                spinner.set_message(describe(&current));
                if let SessionState::Failed { reason } = current.state {
                    break Err(CliError::ConnectionFailed { message: reason });
                }
            }
            message = app.recv() => {
                let Some(message) = message else { break Ok(()) };
                let line = render_message(&message, global.output, color);
                spinner.suspend(|| output::print_output(&line, global.quiet));
                app.acknowledge(&message, Ok(()));

                received += 1;
                if args.count.is_some_and(|n| received >= n) {
                    break Ok(());
                }
            }
        }
    };

    spinner.finish_and_clear();
    push.stop().await?;
    outcome
}

fn status_spinner(global: &GlobalOpts) -> ProgressBar {
    if global.quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("starting");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn describe(status: &SessionStatus) -> String {
    match &status.state {
        SessionState::Reconnecting { retry_in_ms, .. } => {
            let wait = Duration::from_millis(*retry_in_ms).as_secs_f64();
            format!("{} (retry in {wait:.1}s)", status.state)
        }
        state => state.to_string(),
    }
}

/// One message in the selected format. Structured formats emit one
/// document per message so the output can be piped.
fn render_message(message: &MessageSystem, format: OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Table => {
            let time = message.received_at.format("%H:%M:%S").to_string();
            let origin = if message.from_notification { " (tapped)" } else { "" };
            let title = &message.message.notification.title;
            let body = &message.message.notification.body;
            if color {
                format!(
                    "{} {}: {}{}",
                    time.dimmed(),
                    title.bold(),
                    body,
                    origin.dimmed()
                )
            } else {
                format!("{time} {title}: {body}{origin}")
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(message).unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
        }
        OutputFormat::Yaml => format!(
            "---\n{}",
            serde_yaml::to_string(message).unwrap_or_else(|e| format!("error: {e}"))
        ),
        OutputFormat::Plain => message.message.payload.clone(),
    }
}
