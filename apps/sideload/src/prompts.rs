//! Terminal confirmations for installer requests

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use sideload_install::{ConfirmationRequest, PendingNotification, UserPrompter};
use sideload_platform::SimulatedInstaller;
use sideload_types::CallbackTarget;
use tokio::runtime::Handle;
use tracing::warn;

/// Asks on the terminal when attached to one, otherwise prints a notice.
///
/// Every confirmation needs an explicit answer from the user.
pub struct ConsolePrompter {
    installer: SimulatedInstaller,
    interactive: bool,
    runtime: Option<Handle>,
}

impl ConsolePrompter {
    pub fn new(installer: SimulatedInstaller, interactive: bool) -> Self {
        Self {
            installer,
            interactive,
            runtime: Handle::try_current().ok(),
        }
    }
}

impl UserPrompter for ConsolePrompter {
    fn is_foreground(&self) -> bool {
        self.interactive
    }

    fn show_confirmation(&self, request: ConfirmationRequest) {
        let Some(runtime) = self.runtime.clone() else {
            warn!(session = %request.session_id, "no runtime to prompt from");
            return;
        };
        let installer = self.installer.clone();
        runtime.spawn(async move {
            let prompt = match request.target {
                CallbackTarget::Install => format!("Install {}?", request.label),
                CallbackTarget::Upgrade => format!("Update {}?", request.label),
                CallbackTarget::Uninstall => format!("Uninstall {}?", request.label),
            };
            let answer = tokio::task::spawn_blocking(move || {
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
            })
            .await;

            let result = match answer {
                Ok(Ok(true)) => installer.approve(request.session_id).await,
                Ok(Ok(false)) => installer.reject(request.session_id).await,
                Ok(Err(e)) => {
                    warn!(session = %request.session_id, error = %e, "confirmation prompt failed");
                    return;
                }
                Err(e) => {
                    warn!(session = %request.session_id, error = %e, "confirmation task failed");
                    return;
                }
            };
            if let Err(e) = result {
                warn!(session = %request.session_id, error = %e, "could not answer the installer");
            }
        });
    }

    fn post_notification(&self, notification: PendingNotification) {
        match notification {
            PendingNotification::Single(request) => eprintln!(
                "{} {} is waiting for your confirmation ({})",
                style("!").yellow().bold(),
                request.label,
                request.action.0
            ),
            PendingNotification::Summary { target, count } => eprintln!(
                "{} {count} {target} requests are waiting for your confirmation",
                style("!").yellow().bold()
            ),
        }
    }
}
