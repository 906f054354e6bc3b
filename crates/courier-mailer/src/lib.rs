//! `courier-mailer` — the built-in `email` job handler.
//!
//! [`handler::EmailHandler`] turns a job payload (`to`, `subject`, `title`,
//! `body`) into an outgoing message and hands it to a [`transport::MailTransport`].
//! Two transports ship: [`transport::SmtpMailer`] over lettre's async SMTP
//! client, and [`transport::LogMailer`], which logs instead of delivering when
//! no `[smtp]` section is configured.

pub mod handler;
pub mod transport;

pub use handler::EmailHandler;
pub use transport::{LogMailer, MailError, MailTransport, OutgoingMail, SmtpMailer};
