//! Email notifier
//!
//! Email is a best-effort side channel: failures are logged, never
//! surfaced to the caller and never retried. The trait exists so the
//! lifecycle code can be tested against a recording stub instead of a
//! real mail transport.

use async_trait::async_trait;

/// Outbound notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver (or enqueue) one message. Must not fail the caller.
    async fn send(&self, to: &str, subject: &str, body: &str);
}

/// Sends mail through an HTTP mail gateway (Mailgun-style JSON POST).
pub struct EmailNotifier {
    client: reqwest::Client,
    gateway_url: String,
    from: String,
}

#[derive(serde::Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl EmailNotifier {
    pub fn new(gateway_url: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url,
            from,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        let request = self
            .client
            .post(&self.gateway_url)
            .json(&MailRequest {
                from: &self.from,
                to,
                subject,
                text: body,
            })
            .send();

        // Fire and forget: don't hold the request handler hostage to the
        // mail gateway's latency.
        let to = to.to_string();
        let subject = subject.to_string();
        tokio::spawn(async move {
            match request.await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(to = %to, subject = %subject, "Notification email sent");
                }
                Ok(resp) => {
                    tracing::warn!(
                        to = %to,
                        status = %resp.status(),
                        "Mail gateway rejected notification email"
                    );
                }
                Err(e) => {
                    tracing::warn!(to = %to, error = %e, "Failed to send notification email");
                }
            }
        });
    }
}

/// Used when no mail gateway is configured: logs and drops the message.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) {
        tracing::debug!(to = %to, subject = %subject, "Mail gateway not configured, dropping email");
    }
}
