//! Console transports for development.
//!
//! These log notifications instead of sending them and always succeed.

use async_trait::async_trait;
use tablebook_core::transport::{
    EmailMessage, EmailTransport, PushTarget, PushTransport, TransportError,
};
use tracing::info;

/// Push transport that logs to the console.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsolePushTransport;

impl ConsolePushTransport {
    /// Create a console push transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushTransport for ConsolePushTransport {
    async fn send_push(
        &self,
        target: &PushTarget,
        title: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        let target = match target {
            PushTarget::DeviceToken(token) => format!("device {token}"),
            PushTarget::WebSubscription { endpoint, .. } => format!("browser {endpoint}"),
        };
        info!(%target, title, "Push notification (development mode)");
        println!("\n┌─ PUSH ─ {target}");
        println!("│ {title}");
        println!("│ {body}");
        println!("└──────────\n");
        Ok(())
    }
}

/// Email transport that logs to the console.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleEmailTransport;

impl ConsoleEmailTransport {
    /// Create a console email transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailTransport for ConsoleEmailTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        info!(to = %message.to, subject = %message.subject, "Email (development mode)");
        println!("\n┌─ EMAIL ─ {}", message.to);
        println!("│ Subject: {}", message.subject);
        for line in message.text.lines() {
            println!("│ {line}");
        }
        println!("└──────────\n");
        Ok(())
    }
}
