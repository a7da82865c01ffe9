//! Notification-policies command implementation.

use std::io::Write;

use rulesync_core::{RuleStore, load_policies, sync_notification_policies};
use tracing::info;

use crate::cli::NotificationPolicyArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Routes generated alerts to the managed receivers.
pub struct NotificationPoliciesCommand<'a, S> {
    store: &'a S,
}

impl<'a, S: RuleStore> NotificationPoliciesCommand<'a, S> {
    /// Create a new notification-policies command.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Execute the notification-policies command.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy file is unreadable, or the alertmanager
    /// configuration cannot be read or written.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &NotificationPolicyArgs,
    ) -> Result<(), CliError> {
        let policies = load_policies(&args.file)?;
        info!(
            services = policies.len(),
            file = %args.file.display(),
            "loaded notification policies"
        );

        let report = sync_notification_policies(
            self.store,
            &policies,
            args.skip_merge_existing_policies,
        )
        .await?;
        format.write(out, &report)
    }
}
