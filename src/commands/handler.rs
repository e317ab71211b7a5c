//! Command handler implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::service::CatalogService;
use super::types::{BotCommand, CommandResult};
use crate::catalog::{CatalogRoot, decode_backup, encode_backup};
use crate::config::BotSettings;
use crate::telegram::{
    IncomingMessage, OperationKind, OutgoingMessage, SlidingWindowLimiter, Transport,
    TransportError,
};
use crate::updates::UpdateHandler;
use crate::wizard::{Caller, Outcome, main_menu};
use crate::{ChatId, UserId};

/// How many channel messages `/restore` scans for backup parts.
const RESTORE_SCAN_LIMIT: usize = 100;

const GENERIC_ERROR: &str = "⚠️ Something went wrong. Please try again or send /menu.";

/// Errors that abort the handling of one update.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to reply: {0}")]
    Transport(#[from] TransportError),
}

/// Routes updates of the materials bot to commands and the wizard.
pub struct CommandHandler<T> {
    transport: Arc<T>,
    service: Mutex<CatalogService>,
    limiter: SlidingWindowLimiter,
    backup_channel: Option<ChatId>,
    session_idle: Duration,
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(transport: Arc<T>, service: CatalogService, settings: &BotSettings) -> Self {
        Self {
            transport,
            service: Mutex::new(service),
            limiter: SlidingWindowLimiter::new(settings.rate_limit_max, settings.rate_limit_window()),
            backup_channel: settings.backup_channel_id,
            session_idle: settings.session_idle(),
        }
    }

    /// Handles one incoming message and sends every reply.
    pub async fn handle(&self, message: IncomingMessage) -> Result<(), HandlerError> {
        let user = message.sender;
        let now = Instant::now();

        let mut service = self.service.lock().await;
        if service.register(user) {
            info!("New user {}", user);
            if let Err(e) = service.persist() {
                warn!("New user {} is only registered in memory: {}", user, e);
            }
        }
        let caller = service.caller(user);

        let command = match &message.media {
            Some(_) => None,
            None => BotCommand::parse(&message.text),
        };
        if caller.is_admin && matches!(command, Some(BotCommand::Backup | BotCommand::Restore)) {
            let warning = service.take_warning(user);
            let result = if command == Some(BotCommand::Backup) {
                let snapshot = service.catalog().clone();
                drop(service);
                self.backup(&snapshot, user).await
            } else {
                drop(service);
                self.restore(user).await
            };
            info!("Command result: success={}", result.success);

            if let Some(warning) = warning {
                self.transport
                    .send(message.chat, OutgoingMessage::text(warning))
                    .await?;
            }
            self.transport
                .send(message.chat, OutgoingMessage::text(result.message))
                .await?;
            return Ok(());
        }

        let mut outcome = if let Some(media) = message.media {
            debug!("Media from {}: {}", user, media.kind);
            service.wizard_mut().handle_media(caller, media, now)
        } else if let Some(command) = command {
            debug!("Handling command from {}: {}", user, command);
            Self::execute(&mut service, caller, command, now)
        } else {
            service.wizard_mut().handle_text(caller, &message.text, now)
        };

        if outcome.save {
            if let Err(e) = service.persist() {
                outcome.replies.push(OutgoingMessage::text(format!(
                    "⚠️ The change is active but could not be saved: {e}"
                )));
            }
        }
        if let Some(warning) = service.take_warning(user) {
            outcome.replies.insert(0, OutgoingMessage::text(warning));
        }

        let recipients: Vec<UserId> = match &outcome.broadcast {
            Some(_) => service
                .catalog()
                .meta
                .users
                .iter()
                .copied()
                .filter(|u| *u != user)
                .collect(),
            None => Vec::new(),
        };
        drop(service);

        for reply in outcome.replies {
            self.transport.send(message.chat, reply).await?;
        }

        if let Some(text) = outcome.broadcast {
            let result = self.deliver_broadcast(user, &text, &recipients).await;
            self.transport
                .send(message.chat, OutgoingMessage::text(result.message))
                .await?;
        }

        Ok(())
    }

    /// Executes a parsed command.
    fn execute(
        service: &mut CatalogService,
        caller: Caller,
        command: BotCommand,
        now: Instant,
    ) -> Outcome {
        if command.is_admin_only() && !caller.is_admin {
            return Outcome::text("⛔ This command is for admins only.");
        }
        if command.is_owner_only() && !service.is_owner(caller.id) {
            return Outcome::text("⛔ Only the owner can manage admins.");
        }
        if let Some(mode) = command.mode() {
            return service.wizard_mut().start(caller, mode, now);
        }

        let (result, save) = match command {
            BotCommand::Start => {
                return service.wizard_mut().menu(
                    caller,
                    now,
                    "👋 Welcome! Browse study materials by exam, subject and publisher.",
                );
            }
            BotCommand::Menu => return service.wizard_mut().menu(caller, now, "🏠 Main menu."),
            BotCommand::Cancel => return service.wizard_mut().cancel(caller, now),
            BotCommand::Done => return service.wizard_mut().finish_uploads(caller, now),
            BotCommand::Help => {
                return Outcome::reply(main_menu(caller.is_admin, help_text(caller.is_admin)));
            }
            BotCommand::Broadcast(Some(text)) => {
                let mut outcome = service.wizard_mut().cancel(caller, now);
                outcome.broadcast = Some(text);
                return outcome;
            }
            BotCommand::AddSubject(Some((exam, subject))) => add_subject(service, &exam, &subject),
            BotCommand::AddAdmin(id) => add_admin(service, id),
            BotCommand::RemoveAdmin(id) => remove_admin(service, id),
            BotCommand::Stats => (stats(service), false),
            // Run by `handle` once the catalog lock is released.
            BotCommand::Backup
            | BotCommand::Restore
            | BotCommand::AddMaterial
            | BotCommand::DeleteFile
            | BotCommand::DeletePublisher
            | BotCommand::DeleteSubject
            | BotCommand::AddSubject(None)
            | BotCommand::AddSubfolder
            | BotCommand::Broadcast(None) => return Outcome::default(),
        };

        info!("Command result: success={}", result.success);
        Outcome::text(result.message).saving(save)
    }

    async fn backup(&self, catalog: &CatalogRoot, user: UserId) -> CommandResult {
        let Some(channel) = self.backup_channel else {
            return CommandResult::error("❌ BACKUP_CHANNEL_ID is not configured.");
        };
        if let Some(wait) = self.throttle(user, OperationKind::Backup).await {
            return CommandResult::error(wait);
        }

        let messages = match encode_backup(catalog, Utc::now()) {
            Ok(messages) => messages,
            Err(e) => return CommandResult::error(format!("❌ Backup failed: {e}")),
        };

        let total = messages.len();
        for (i, text) in messages.into_iter().enumerate() {
            if let Err(e) = self.transport.send(channel, OutgoingMessage::text(text)).await {
                warn!("Backup part {}/{} failed: {}", i + 1, total, e);
                return CommandResult::error(format!(
                    "❌ Backup failed at part {}/{total}: {e}",
                    i + 1
                ));
            }
        }

        info!("Backup posted to {} in {} message(s)", channel, total);
        CommandResult::success(format!(
            "✅ Backup saved to the backup channel ({total} message(s))."
        ))
    }

    /// Reads the backup channel, then swaps the catalog in under the lock.
    async fn restore(&self, user: UserId) -> CommandResult {
        let Some(channel) = self.backup_channel else {
            return CommandResult::error("❌ BACKUP_CHANNEL_ID is not configured.");
        };
        if let Some(wait) = self.throttle(user, OperationKind::Backup).await {
            return CommandResult::error(wait);
        }

        let messages = match self.transport.recent_messages(channel, RESTORE_SCAN_LIMIT).await {
            Ok(messages) => messages,
            Err(e) => return CommandResult::error(format!("❌ Could not read the backup channel: {e}")),
        };
        let root = match decode_backup(&messages) {
            Ok(root) => root,
            Err(e) => return CommandResult::error(format!("❌ Restore failed: {e}")),
        };

        let stats = root.stats();
        info!(
            "Restoring catalog: {} exams, {} files",
            stats.exams, stats.files
        );
        match self.service.lock().await.restore(root) {
            Ok(()) => CommandResult::success(format!(
                "✅ Catalog restored: {} exams, {} subjects, {} publishers, {} files.",
                stats.exams, stats.subjects, stats.publishers, stats.files
            )),
            Err(e) => CommandResult::error(format!(
                "⚠️ Catalog restored but could not be saved: {e}"
            )),
        }
    }

    async fn deliver_broadcast(&self, admin: UserId, text: &str, recipients: &[UserId]) -> CommandResult {
        if let Some(wait) = self.throttle(admin, OperationKind::Broadcast).await {
            return CommandResult::error(wait);
        }

        let (mut sent, mut failed) = (0usize, 0usize);
        for &user in recipients {
            match self
                .transport
                .send(user, OutgoingMessage::text(format!("📢 {text}")))
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    debug!("Broadcast to {} failed: {}", user, e);
                    failed += 1;
                }
            }
        }

        info!("Broadcast from {}: {} sent, {} failed", admin, sent, failed);
        CommandResult::success(format!(
            "📢 Broadcast finished: {sent} delivered, {failed} failed."
        ))
    }

    /// `Some(message)` when the user must wait before another `kind`.
    async fn throttle(&self, user: UserId, kind: OperationKind) -> Option<String> {
        let key = (user, kind);
        if self.limiter.try_acquire(key).await {
            return None;
        }
        let wait = self.limiter.retry_after(&key).await;
        Some(format!(
            "⏳ Too many requests. Try again in {}s.",
            wait.as_secs().max(1)
        ))
    }
}

#[async_trait]
impl<T: Transport + 'static> UpdateHandler for CommandHandler<T> {
    type Error = HandlerError;

    async fn handle(&self, message: IncomingMessage) -> Result<(), HandlerError> {
        Self::handle(self, message).await
    }

    async fn on_failure(&self, message: &IncomingMessage) {
        self.service
            .lock()
            .await
            .wizard_mut()
            .sessions_mut()
            .reset(message.sender);
        if let Err(e) = self
            .transport
            .send(message.chat, OutgoingMessage::text(GENERIC_ERROR))
            .await
        {
            warn!("Failed to send error reply to {}: {}", message.chat, e);
        }
    }

    async fn sweep(&self) {
        let evicted = self
            .service
            .lock()
            .await
            .wizard_mut()
            .sessions_mut()
            .evict_idle(Instant::now(), self.session_idle);
        if evicted > 0 {
            debug!("Swept {} idle sessions", evicted);
        }
        self.limiter.sweep().await;
    }
}

impl<T> std::fmt::Debug for CommandHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("backup_channel", &self.backup_channel)
            .field("session_idle", &self.session_idle)
            .finish_non_exhaustive()
    }
}

fn add_subject(service: &mut CatalogService, exam: &str, subject: &str) -> (CommandResult, bool) {
    match service.catalog_mut().add_subject(exam, subject) {
        Ok(true) => {
            info!("Subject '{}' added to '{}'", subject, exam);
            (CommandResult::success(format!("✅ Subject '{subject}' added to {exam}.")), true)
        }
        Ok(false) => (
            CommandResult::error(format!("ℹ️ Subject '{subject}' already exists in {exam}.")),
            false,
        ),
        Err(e) => (CommandResult::error(format!("❌ {e}.")), false),
    }
}

fn add_admin(service: &mut CatalogService, id: UserId) -> (CommandResult, bool) {
    if service.is_owner(id) {
        return (CommandResult::error("ℹ️ The owner is always an admin."), false);
    }
    if service.catalog_mut().meta.add_admin(id) {
        info!("Admin {} added", id);
        (CommandResult::success(format!("✅ {id} is now an admin.")), true)
    } else {
        (CommandResult::error(format!("ℹ️ {id} is already an admin.")), false)
    }
}

fn remove_admin(service: &mut CatalogService, id: UserId) -> (CommandResult, bool) {
    if service.is_owner(id) {
        return (CommandResult::error("❌ The owner cannot be removed."), false);
    }
    if service.catalog_mut().meta.remove_admin(id) {
        info!("Admin {} removed", id);
        (CommandResult::success(format!("✅ {id} is no longer an admin.")), true)
    } else {
        (CommandResult::error(format!("ℹ️ {id} is not an admin.")), false)
    }
}

fn stats(service: &CatalogService) -> CommandResult {
    let stats = service.catalog().stats();
    let health = match service.problem() {
        Some(_) => "⚠️ degraded",
        None => "✅ healthy",
    };
    CommandResult::success(format!(
        "📊 Catalog statistics\n\
         Exams: {}\n\
         Subjects: {}\n\
         Publishers: {}\n\
         Folders: {}\n\
         Files: {}\n\
         Users: {}\n\
         Admins: {}\n\
         Storage: {health}",
        stats.exams,
        stats.subjects,
        stats.publishers,
        stats.folders,
        stats.files,
        stats.users,
        stats.admins,
    ))
}

fn help_text(is_admin: bool) -> String {
    let mut lines = vec!["📖 Commands:".to_owned()];
    for (command, description) in BotCommand::all_commands(is_admin) {
        lines.push(format!("{command} - {description}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::catalog::{CatalogPath, FileKind, FileRecord, JsonCatalogStore};
    use crate::telegram::Dialog;

    const OWNER: UserId = 1;
    const CHANNEL: ChatId = -100_500;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(ChatId, OutgoingMessage)>>,
    }

    impl Recorder {
        fn texts_to(&self, chat: ChatId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat)
                .map(|(_, m)| m.body().to_owned())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((chat, message));
            Ok(())
        }

        async fn recent_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<String>, TransportError> {
            let mut texts = self.texts_to(chat);
            texts.reverse();
            texts.truncate(limit);
            Ok(texts)
        }

        async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
            Ok(Vec::new())
        }
    }

    fn handler(dir: &tempfile::TempDir) -> (Arc<Recorder>, CommandHandler<Recorder>) {
        handler_with(JsonCatalogStore::new(dir.path().join("catalog.json")))
    }

    fn handler_with(store: JsonCatalogStore) -> (Arc<Recorder>, CommandHandler<Recorder>) {
        let settings = BotSettings {
            owner_id: Some(OWNER),
            backup_channel_id: Some(CHANNEL),
            ..BotSettings::default()
        };
        let transport = Arc::new(Recorder::default());
        let service = CatalogService::open(store, settings.owner_id);
        let handler = CommandHandler::new(Arc::clone(&transport), service, &settings);
        (transport, handler)
    }

    fn text(sender: UserId, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: sender,
            sender,
            text: text.to_owned(),
            media: None,
        }
    }

    #[tokio::test]
    async fn test_admin_commands_rejected_for_users() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, handler) = handler(&dir);

        handler.handle(text(7, "/deletefile")).await.unwrap();
        handler.handle(text(7, "/addadmin 8")).await.unwrap();
        let replies = transport.texts_to(7);
        assert!(replies.iter().all(|r| r.contains("admins only")));
    }

    #[tokio::test]
    async fn test_owner_manages_admins() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, handler) = handler(&dir);

        handler.handle(text(OWNER, "/addadmin 8")).await.unwrap();
        handler.handle(text(8, "/removeadmin 9")).await.unwrap();
        handler.handle(text(OWNER, "/removeadmin 1")).await.unwrap();

        assert!(transport.texts_to(OWNER)[0].contains("8 is now an admin"));
        assert!(transport.texts_to(8)[0].contains("Only the owner"));
        assert!(transport.texts_to(OWNER)[1].contains("cannot be removed"));

        let saved = JsonCatalogStore::new(dir.path().join("catalog.json")).load().unwrap();
        assert!(saved.meta.admins.contains(&8));
        assert!(saved.meta.users.contains(&OWNER));
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, handler) = handler(&dir);
        {
            let mut service = handler.service.lock().await;
            service
                .catalog_mut()
                .append_file(
                    &CatalogPath::new("NEET", "Physics", "HC Verma"),
                    FileRecord::new("f1", FileKind::Document, "ch1.pdf", ""),
                )
                .unwrap();
        }

        handler.handle(text(OWNER, "/backup")).await.unwrap();
        assert!(transport.texts_to(CHANNEL)[0].starts_with("#BACKUP v1"));

        handler.service.lock().await.catalog_mut().delete_exam("NEET").unwrap();
        handler.handle(text(OWNER, "/restore")).await.unwrap();

        let replies = transport.texts_to(OWNER);
        assert!(replies.last().unwrap().contains("Catalog restored"), "{replies:?}");
        let service = handler.service.lock().await;
        let path = CatalogPath::new("NEET", "Physics", "HC Verma");
        assert_eq!(service.catalog().files(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_registration_save_warns_admin() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let (transport, handler) = handler_with(JsonCatalogStore::new(nested.join("catalog.json")));

        // A file where the directory should be makes every write fail.
        std::fs::write(&nested, "").unwrap();
        handler.handle(text(30, "/start")).await.unwrap();
        assert!(handler.service.lock().await.is_degraded());

        handler.handle(text(OWNER, "/menu")).await.unwrap();
        assert!(transport.texts_to(OWNER)[0].contains("could not be saved"));
    }

    #[derive(Default)]
    struct SlowChannel {
        inner: Recorder,
        reached: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Transport for SlowChannel {
        async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<(), TransportError> {
            if chat == CHANNEL {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.send(chat, message).await
        }

        async fn recent_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<String>, TransportError> {
            self.inner.recent_messages(chat, limit).await
        }

        async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_backup_upload_does_not_block_other_users() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BotSettings {
            owner_id: Some(OWNER),
            backup_channel_id: Some(CHANNEL),
            ..BotSettings::default()
        };
        let store = JsonCatalogStore::new(dir.path().join("catalog.json"));
        let transport = Arc::new(SlowChannel::default());
        let service = CatalogService::open(store, settings.owner_id);
        let handler = Arc::new(CommandHandler::new(Arc::clone(&transport), service, &settings));

        let backup = tokio::spawn({
            let handler = Arc::clone(&handler);
            async move { handler.handle(text(OWNER, "/backup")).await }
        });
        transport.reached.notified().await;

        tokio::time::timeout(Duration::from_secs(5), handler.handle(text(9, "/start")))
            .await
            .expect("catalog lock held during the backup upload")
            .unwrap();
        assert!(transport.inner.texts_to(9)[0].contains("Welcome"));

        transport.release.notify_one();
        backup.await.unwrap().unwrap();
        assert!(transport.inner.texts_to(OWNER).last().unwrap().contains("Backup saved"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_other_users() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, handler) = handler(&dir);
        handler.handle(text(20, "/start")).await.unwrap();
        handler.handle(text(21, "/start")).await.unwrap();

        handler.handle(text(OWNER, "/broadcast Exams postponed")).await.unwrap();

        assert_eq!(transport.texts_to(20).last().unwrap(), "📢 Exams postponed");
        assert_eq!(transport.texts_to(21).last().unwrap(), "📢 Exams postponed");
        assert!(
            transport
                .texts_to(OWNER)
                .last()
                .unwrap()
                .contains("2 delivered, 0 failed")
        );
    }

    #[tokio::test]
    async fn test_failure_resets_session_and_replies() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, handler) = handler(&dir);
        handler.handle(text(5, "/start")).await.unwrap();
        handler.handle(text(5, "📚 Browse Materials")).await.unwrap();

        let message = text(5, "NEET");
        UpdateHandler::on_failure(&handler, &message).await;

        assert_eq!(transport.texts_to(5).last().unwrap(), GENERIC_ERROR);
        let mut service = handler.service.lock().await;
        let session = service.wizard_mut().session(5).unwrap();
        assert!(session.is_idle());
    }
}
