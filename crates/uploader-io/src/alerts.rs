//! Schema-drift notification.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use uploader_core::{EmailGateway, EmailMessage, SubscriptionStore, UploadError};

pub const EMAIL_SENDER_ADDRESS: &str = "dataplattform@oslo.kommune.no";
pub const EMAIL_SENDER_NAME: &str = "Dataspeilet";
pub const EMAIL_SUBJECT: &str = "Endring i datastruktur";

/// Compose the alert body: lead line plus the sorted column names as a
/// bulleted list.
pub fn alert_body(dataset_id: &str, new_columns: &BTreeSet<String>) -> String {
    let lead = if new_columns.len() > 1 {
        format!("New columns have been added to the dataset '{dataset_id}':")
    } else {
        format!("A new column has been added to the dataset '{dataset_id}':")
    };
    let bullets: Vec<String> = new_columns.iter().map(|c| format!("- {c}")).collect();
    format!("{lead}\n{}", bullets.join("\n"))
}

/// Emails dataset subscribers when a publication adds columns. Failures here
/// must never fail the pipeline; callers catch and log the `AlertEmail`
/// error kind.
pub struct SchemaDriftNotifier {
    subscriptions: Arc<dyn SubscriptionStore>,
    email: Arc<dyn EmailGateway>,
}

impl SchemaDriftNotifier {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, email: Arc<dyn EmailGateway>) -> Self {
        SchemaDriftNotifier {
            subscriptions,
            email,
        }
    }

    pub async fn notify_new_columns(
        &self,
        dataset_id: &str,
        new_columns: &BTreeSet<String>,
    ) -> Result<(), UploadError> {
        if new_columns.is_empty() {
            return Ok(());
        }
        let subscribers = self
            .subscriptions
            .subscribers(dataset_id)
            .await
            .map_err(|e| UploadError::AlertEmail(e.to_string()))?;
        if subscribers.is_empty() {
            debug!(dataset_id, "no schema drift subscribers");
            return Ok(());
        }

        info!(dataset_id, columns = ?new_columns, "notifying subscribers of new columns");
        let message = EmailMessage {
            recipients: subscribers,
            sender_address: EMAIL_SENDER_ADDRESS.to_string(),
            sender_name: EMAIL_SENDER_NAME.to_string(),
            subject: EMAIL_SUBJECT.to_string(),
            body: alert_body(dataset_id, new_columns),
        };
        self.email
            .send(&message)
            .await
            .map_err(|e| UploadError::AlertEmail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailingEmailGateway, MemorySubscriptionStore, RecordingEmailGateway};

    fn columns(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn singular_and_plural_bodies() {
        assert_eq!(
            alert_body("ds1", &columns(&["new_col"])),
            "A new column has been added to the dataset 'ds1':\n- new_col"
        );
        assert_eq!(
            alert_body("ds1", &columns(&["b", "a"])),
            "New columns have been added to the dataset 'ds1':\n- a\n- b"
        );
    }

    #[tokio::test]
    async fn notifies_subscribers_once() {
        let subscriptions = Arc::new(MemorySubscriptionStore::default());
        subscriptions
            .subscribe("ds1", vec!["per@example.org".into(), "kari@example.org".into()])
            .await;
        let gateway = Arc::new(RecordingEmailGateway::default());
        let notifier = SchemaDriftNotifier::new(subscriptions, gateway.clone());

        notifier
            .notify_new_columns("ds1", &columns(&["new_col"]))
            .await
            .unwrap();

        let messages = gateway.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipients.len(), 2);
        assert_eq!(messages[0].subject, EMAIL_SUBJECT);
        assert!(messages[0].body.contains("- new_col"));
    }

    #[tokio::test]
    async fn no_new_columns_means_no_email() {
        let subscriptions = Arc::new(MemorySubscriptionStore::default());
        subscriptions.subscribe("ds1", vec!["a@b.no".into()]).await;
        let gateway = Arc::new(RecordingEmailGateway::default());
        let notifier = SchemaDriftNotifier::new(subscriptions, gateway.clone());

        notifier
            .notify_new_columns("ds1", &BTreeSet::new())
            .await
            .unwrap();
        assert!(gateway.messages().await.is_empty());
    }

    #[tokio::test]
    async fn no_subscribers_means_no_email() {
        let subscriptions = Arc::new(MemorySubscriptionStore::default());
        let gateway = Arc::new(RecordingEmailGateway::default());
        let notifier = SchemaDriftNotifier::new(subscriptions, gateway.clone());

        notifier
            .notify_new_columns("ds1", &columns(&["c"]))
            .await
            .unwrap();
        assert!(gateway.messages().await.is_empty());
    }

    #[tokio::test]
    async fn gateway_failures_surface_as_alert_email_errors() {
        let subscriptions = Arc::new(MemorySubscriptionStore::default());
        subscriptions.subscribe("ds1", vec!["a@b.no".into()]).await;
        let notifier =
            SchemaDriftNotifier::new(subscriptions, Arc::new(FailingEmailGateway));

        let err = notifier
            .notify_new_columns("ds1", &columns(&["c"]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::AlertEmail(_)));
    }
}
