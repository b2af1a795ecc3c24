//! IMAP mailbox reader for bank notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailparse::ParsedMail;
use tracing::debug;

use crate::config::MailboxConfig;
use crate::jobs::payment_checker::{MailboxError, MailboxSource};

pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxSource for ImapMailbox {
    async fn fetch_recent(&self, since: DateTime<Utc>) -> Result<Vec<String>, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config, since))
            .await
            .map_err(|e| MailboxError::Protocol(format!("mailbox task failed: {e}")))?
    }
}

/// IMAP `SEARCH` criteria for mail from `sender` since the day of `since`.
pub fn search_query(since: DateTime<Utc>, sender: &str) -> String {
    format!(
        "SINCE {} FROM \"{}\"",
        since.format("%d-%b-%Y"),
        sender.replace('"', "")
    )
}

fn fetch_blocking(
    config: &MailboxConfig,
    since: DateTime<Utc>,
) -> Result<Vec<String>, MailboxError> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    let client = imap::connect((config.host.as_str(), config.port), &config.host, &tls)
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    let mut session = client
        .login(&config.user, &config.password)
        .map_err(|(e, _)| MailboxError::Connect(e.to_string()))?;

    let result = (|| -> Result<Vec<String>, MailboxError> {
        session
            .select("INBOX")
            .map_err(|e| MailboxError::Protocol(e.to_string()))?;
        let ids = session
            .search(search_query(since, &config.sender))
            .map_err(|e| MailboxError::Protocol(e.to_string()))?;
        debug!(found = ids.len(), "Bank notifications found");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        let set = ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let messages = session
            .fetch(set, "RFC822")
            .map_err(|e| MailboxError::Protocol(e.to_string()))?;

        Ok(messages
            .iter()
            .filter_map(|message| message.body())
            .filter_map(message_text)
            .collect())
    })();

    let _ = session.logout();
    result
}

/// Text of a raw RFC 822 message: the first `text/plain` part, else the
/// first `text/html` part.
pub fn message_text(raw: &[u8]) -> Option<String> {
    let parsed = mailparse::parse_mail(raw).ok()?;
    find_part(&parsed, "text/plain").or_else(|| find_part(&parsed, "text/html"))
}

fn find_part(mail: &ParsedMail<'_>, mimetype: &str) -> Option<String> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            return mail.get_body().ok().filter(|body| !body.trim().is_empty());
        }
        return None;
    }
    mail.subparts
        .iter()
        .find_map(|part| find_part(part, mimetype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_search_query_format() {
        let since = Utc.with_ymd_and_hms(2026, 10, 7, 12, 0, 0).unwrap();
        assert_eq!(
            search_query(since, "jago.com"),
            "SINCE 07-Oct-2026 FROM \"jago.com\""
        );
    }

    #[test]
    fn test_message_text_prefers_plain_part() {
        let raw = concat!(
            "From: Bank Jago <noreply@jago.com>\r\n",
            "Subject: Transfer masuk\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>Nominal: <b>Rp 50.101</b></p>\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Nominal: Rp 50.101\r\n",
            "--b1--\r\n",
        );
        let text = message_text(raw.as_bytes()).unwrap();
        assert!(text.starts_with("Nominal: Rp 50.101"));
    }

    #[test]
    fn test_message_text_falls_back_to_html() {
        let raw = concat!(
            "From: noreply@jago.com\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>Rp 75.222</p>\r\n",
        );
        assert!(message_text(raw.as_bytes()).unwrap().contains("Rp 75.222"));
    }
}
