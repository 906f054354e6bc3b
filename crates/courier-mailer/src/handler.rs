use async_trait::async_trait;
use courier_core::types::JobPayload;
use courier_executor::{ExecuteError, JobHandler};

use crate::transport::{MailError, MailTransport, OutgoingMail};

const DEFAULT_SUBJECT: &str = "(no subject)";

/// Handles `email` jobs: validates the payload, renders the message, and
/// submits it to the configured transport.
///
/// Payload contract: `to` (required), `subject`, `title`, `body`.
pub struct EmailHandler {
    transport: Box<dyn MailTransport>,
}

impl EmailHandler {
    pub fn new(transport: Box<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl JobHandler for EmailHandler {
    async fn execute(&self, payload: &JobPayload) -> Result<(), ExecuteError> {
        let to = payload
            .get("to")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExecuteError::Permanent("email payload missing 'to'".into()))?;
        let subject = payload
            .get("subject")
            .map(String::as_str)
            .unwrap_or(DEFAULT_SUBJECT);

        let mail = OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: render_body(payload.get("title"), payload.get("body")),
        };
        self.transport.send(&mail).await.map_err(classify)
    }
}

fn classify(err: MailError) -> ExecuteError {
    if err.is_permanent() {
        ExecuteError::Permanent(err.to_string())
    } else {
        ExecuteError::Transient(err.to_string())
    }
}

/// Plain-text body: the title becomes a heading line above the body.
fn render_body(title: Option<&String>, body: Option<&String>) -> String {
    match (title, body) {
        (Some(t), Some(b)) if !t.is_empty() => format!("{t}\n\n{b}"),
        (_, Some(b)) => b.clone(),
        (Some(t), None) => t.clone(),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::payload;
    use std::sync::{Arc, Mutex};

    /// Records sends; optionally fails each one with an address error.
    #[derive(Clone)]
    struct StubTransport {
        sent: Arc<Mutex<Vec<OutgoingMail>>>,
        reject: bool,
    }

    impl StubTransport {
        fn new(reject: bool) -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                reject,
            }
        }
    }

    #[async_trait]
    impl MailTransport for StubTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            if self.reject {
                let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
                return Err(MailError::Address(addr_err.unwrap_err()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn sends_rendered_message() {
        let stub = StubTransport::new(false);
        let handler = EmailHandler::new(Box::new(stub.clone()));
        let p = payload([
            ("to", "a@x.com"),
            ("subject", "S"),
            ("title", "T"),
            ("body", "B"),
        ]);
        handler.execute(&p).await.expect("execute");

        let sent = stub.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[0].subject, "S");
        assert_eq!(sent[0].body, "T\n\nB");
    }

    #[tokio::test]
    async fn missing_to_is_permanent() {
        let handler = EmailHandler::new(Box::new(StubTransport::new(false)));
        let err = handler
            .execute(&payload([("subject", "S")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Permanent(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn blank_to_is_permanent() {
        let handler = EmailHandler::new(Box::new(StubTransport::new(false)));
        let err = handler.execute(&payload([("to", "   ")])).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Permanent(_)));
    }

    #[tokio::test]
    async fn address_rejection_is_permanent() {
        let handler = EmailHandler::new(Box::new(StubTransport::new(true)));
        let err = handler
            .execute(&payload([("to", "a@x.com")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Permanent(_)));
    }

    #[test]
    fn body_rendering() {
        let t = "T".to_string();
        let b = "B".to_string();
        assert_eq!(render_body(Some(&t), Some(&b)), "T\n\nB");
        assert_eq!(render_body(None, Some(&b)), "B");
        assert_eq!(render_body(Some(&t), None), "T");
        assert_eq!(render_body(None, None), "");
    }
}
