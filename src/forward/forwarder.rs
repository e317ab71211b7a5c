//! Sends one source message to every active target.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::settings::ForwardSettings;
use super::transform::transform;
use crate::telegram::{
    IncomingMessage, OperationKind, OutgoingMessage, SlidingWindowLimiter, Transport,
    log_preview,
};
use crate::{ChatId, UserId};

/// Why a message was not forwarded at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Forwarding is off, or has no source or active target.
    NotReady,
    /// The message did not come from the configured source.
    OtherChat,
    RateLimited,
    /// Nothing left to send after the transform.
    Empty,
}

/// What happened to one forwarded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: Vec<ChatId>,

    /// Targets that refused the post and should be switched off.
    pub deactivated: Vec<(ChatId, String)>,

    /// Targets that failed for another reason; they stay active.
    pub failed: Vec<(ChatId, String)>,

    pub skipped: Option<SkipReason>,
}

impl ForwardReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Whether `apply` would change the settings.
    #[must_use]
    pub fn changes_settings(&self) -> bool {
        self.skipped.is_none()
    }

    /// Records the outcome in the user's settings: refused targets are
    /// deactivated, errors remembered, counters bumped.
    pub fn apply(&self, settings: &mut ForwardSettings, now: DateTime<Utc>) {
        for target in &mut settings.targets {
            if let Some((_, reason)) = self.deactivated.iter().find(|(id, _)| *id == target.id) {
                target.active = false;
                target.last_error = Some(reason.clone());
            } else if let Some((_, reason)) = self.failed.iter().find(|(id, _)| *id == target.id) {
                target.last_error = Some(reason.clone());
            } else if self.delivered.contains(&target.id) {
                target.last_error = None;
            }
        }

        settings.stats.forwarded += self.delivered.len() as u64;
        settings.stats.failed += (self.deactivated.len() + self.failed.len()) as u64;
        if !self.delivered.is_empty() {
            settings.stats.last_forward_at = Some(now);
        }
    }
}

/// Forwards messages through one account's transport.
pub struct Forwarder<T> {
    transport: Arc<T>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl<T: Transport> Forwarder<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { transport, limiter }
    }

    /// Forwards `message` for `user` to every active target, waiting
    /// `delay_seconds` between targets.
    pub async fn forward(
        &self,
        user: UserId,
        settings: &ForwardSettings,
        message: &IncomingMessage,
    ) -> ForwardReport {
        if !settings.is_ready() {
            return ForwardReport::skipped(SkipReason::NotReady);
        }
        if settings.source.as_ref().is_none_or(|source| source.id != message.chat) {
            return ForwardReport::skipped(SkipReason::OtherChat);
        }
        if !self.limiter.try_acquire((user, OperationKind::Forward)).await {
            debug!("Forward for {} rate limited", user);
            return ForwardReport::skipped(SkipReason::RateLimited);
        }

        let Some(outgoing) = prepare(settings, message) else {
            return ForwardReport::skipped(SkipReason::Empty);
        };
        debug!(
            "Forwarding for {}: \"{}\"",
            user,
            log_preview(outgoing.body(), 40)
        );

        let delay = Duration::from_secs(settings.delay_seconds);
        let mut report = ForwardReport::default();

        for (i, target) in settings.active_targets().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.transport.send(target.id, outgoing.clone()).await {
                Ok(()) => report.delivered.push(target.id),
                Err(e) if e.is_forbidden() => {
                    warn!("Deactivating target {} ({}): {}", target.title, target.id, e);
                    report.deactivated.push((target.id, e.to_string()));
                }
                Err(e) => {
                    warn!("Failed to forward to {} ({}): {}", target.title, target.id, e);
                    report.failed.push((target.id, e.to_string()));
                }
            }
        }

        info!(
            "Forwarded for {}: {} delivered, {} deactivated, {} failed",
            user,
            report.delivered.len(),
            report.deactivated.len(),
            report.failed.len()
        );
        report
    }
}

impl<T> std::fmt::Debug for Forwarder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder").finish_non_exhaustive()
    }
}

/// The message to post, or `None` when nothing is left to send.
fn prepare(settings: &ForwardSettings, message: &IncomingMessage) -> Option<OutgoingMessage> {
    match &message.media {
        Some(media) if settings.forward_media => {
            let mut record = media.clone().into_record(1);
            record.caption = transform(&media.caption, settings);
            Some(OutgoingMessage::file(record))
        }
        Some(media) => text_only(transform(&media.caption, settings)),
        None => text_only(transform(&message.text, settings)),
    }
}

fn text_only(text: String) -> Option<OutgoingMessage> {
    if text.trim().is_empty() {
        None
    } else {
        Some(OutgoingMessage::text(text))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::FileKind;
    use crate::forward::settings::{ChannelRef, WordRule};
    use crate::telegram::{Dialog, IncomingMedia, TransportError};

    const SOURCE: ChatId = -100;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(ChatId, OutgoingMessage, tokio::time::Instant)>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<(), TransportError> {
            match chat {
                -3 => Err(TransportError::Forbidden(chat)),
                -4 => Err(TransportError::Connection("reset".to_owned())),
                _ => {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((chat, message, tokio::time::Instant::now()));
                    Ok(())
                }
            }
        }

        async fn recent_messages(&self, _chat: ChatId, _limit: usize) -> Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
            Ok(Vec::new())
        }
    }

    fn settings(targets: &[ChatId]) -> ForwardSettings {
        let mut settings = ForwardSettings {
            active: true,
            source: Some(ChannelRef {
                id: SOURCE,
                title: "Source".to_owned(),
            }),
            ..ForwardSettings::default()
        };
        for id in targets {
            settings.add_target(ChannelRef {
                id: *id,
                title: format!("T{id}"),
            });
        }
        settings
    }

    fn from_source(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: SOURCE,
            sender: SOURCE,
            text: text.to_owned(),
            media: None,
        }
    }

    fn forwarder(max: usize) -> (Arc<Recorder>, Forwarder<Recorder>) {
        let transport = Arc::new(Recorder::default());
        let limiter = Arc::new(SlidingWindowLimiter::new(max, Duration::from_secs(60)));
        (Arc::clone(&transport), Forwarder::new(transport, limiter))
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_with_delay_between_targets() {
        let (transport, forwarder) = forwarder(10);
        let mut settings = settings(&[-1, -2]);
        settings.delay_seconds = 5;
        settings.word_rules.push(WordRule {
            original: "old".to_owned(),
            replacement: "new".to_owned(),
            case_sensitive: false,
        });

        let report = forwarder.forward(9, &settings, &from_source("OLD news")).await;
        assert_eq!(report.delivered, vec![-1, -2]);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].1, OutgoingMessage::text("new news"));
        assert!(sent[1].2 - sent[0].2 >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_forbidden_target_is_deactivated() {
        let (_, forwarder) = forwarder(10);
        let mut settings = settings(&[-1, -3, -4]);

        let report = forwarder.forward(9, &settings, &from_source("hi")).await;
        assert_eq!(report.delivered, vec![-1]);
        assert_eq!(report.deactivated.len(), 1);
        assert_eq!(report.failed.len(), 1);

        report.apply(&mut settings, Utc::now());
        assert!(settings.targets[0].active);
        assert!(!settings.targets[1].active);
        assert!(settings.targets[2].active);
        assert!(settings.targets[2].last_error.is_some());
        assert_eq!(settings.stats.forwarded, 1);
        assert_eq!(settings.stats.failed, 2);
        assert!(settings.stats.last_forward_at.is_some());
    }

    #[tokio::test]
    async fn test_skips() {
        let (transport, forwarder) = forwarder(1);
        let settings = settings(&[-1]);

        let mut other = from_source("hi");
        other.chat = -999;
        assert_eq!(
            forwarder.forward(9, &settings, &other).await.skipped,
            Some(SkipReason::OtherChat)
        );
        assert_eq!(
            forwarder.forward(9, &settings, &from_source("   ")).await.skipped,
            Some(SkipReason::Empty)
        );
        assert_eq!(
            forwarder.forward(9, &settings, &from_source("again")).await.skipped,
            Some(SkipReason::RateLimited)
        );

        let idle = ForwardSettings::default();
        assert_eq!(
            forwarder.forward(9, &idle, &from_source("hi")).await.skipped,
            Some(SkipReason::NotReady)
        );
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_follows_forward_media_flag() {
        let (transport, forwarder) = forwarder(10);
        let mut settings = settings(&[-1]);
        let mut message = from_source("");
        message.media = Some(IncomingMedia {
            file_id: "handle".to_owned(),
            kind: FileKind::Photo,
            file_name: None,
            caption: "Look".to_owned(),
        });

        forwarder.forward(9, &settings, &message).await;
        settings.forward_media = false;
        forwarder.forward(9, &settings, &message).await;

        let sent = transport.sent.lock().unwrap();
        let OutgoingMessage::File { record } = &sent[0].1 else {
            panic!("expected media");
        };
        assert_eq!(record.file_id, "handle");
        assert_eq!(record.caption, "Look");
        assert_eq!(sent[1].1, OutgoingMessage::text("Look"));
    }
}
