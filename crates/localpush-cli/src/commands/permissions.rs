//! `permissions`: show grants, optionally prompting first.

use serde::Serialize;
use tabled::Tabled;

use localpush_core::{Capability, Grant, LocalPush};

use crate::cli::{GlobalOpts, PermissionsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct GrantEntry {
    capability: Capability,
    grant: Grant,
}

#[derive(Tabled)]
struct GrantRow {
    #[tabled(rename = "Capability")]
    capability: String,
    #[tabled(rename = "Status")]
    grant: String,
}

pub async fn handle(
    push: &LocalPush,
    args: &PermissionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.request {
        let granted = push.request_permission().await?;
        tracing::info!(granted, "permission request finished");
    }

    let state = push.check_permissions();
    let entries: Vec<GrantEntry> = state
        .grants
        .iter()
        .map(|(capability, grant)| GrantEntry {
            capability: *capability,
            grant: *grant,
        })
        .collect();

    let rendered = output::render_list(
        global.output,
        &entries,
        |e| GrantRow {
            capability: e.capability.to_string(),
            grant: e.grant.to_string(),
        },
        |e| format!("{}={}", e.capability, e.grant),
    );
    output::print_output(&rendered, global.quiet);

    if args.request && !state.all_granted() {
        return Err(CliError::from(localpush_core::CoreError::PermissionDenied {
            missing: state.missing(),
        }));
    }
    Ok(())
}
