//! The auto-forward bot: per-user login, settings and listener tasks.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::accounts::{Account, AccountConnector};
use super::commands::{ForwardCommand, HELP_TEXT, SettingChange, render_dashboard, render_settings};
use super::forwarder::Forwarder;
use super::login::{LoginError, LoginFlow, LoginStep};
use super::settings::{ForwardSettings, SettingsError, SettingsStore};
use crate::UserId;
use crate::config::BotSettings;
use crate::telegram::{
    Dialog, IncomingMessage, OperationKind, OutgoingMessage, SlidingWindowLimiter, Transport,
    TransportError,
};
use crate::updates::{UpdateHandler, UpdateSource};

const GENERIC_ERROR: &str = "⚠️ Something went wrong. Please try again.";

const SESSION_LOST: &str =
    "⚠️ Your Telegram session is no longer valid. Log in again with /login +<phone>.";

/// Errors that abort the handling of one update.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Failed to reply: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Per-user state that only the bot side touches.
struct UserSlot<A: Account> {
    account: Option<Arc<A>>,
    login: LoginFlow<A>,

    /// Dialog list last shown on the dashboard; `/settings source <n>`
    /// indexes into it.
    dialogs: Vec<Dialog>,

    listener: Option<JoinHandle<()>>,
}

impl<A: Account> Default for UserSlot<A> {
    fn default() -> Self {
        Self {
            account: None,
            login: LoginFlow::new(),
            dialogs: Vec::new(),
            listener: None,
        }
    }
}

impl<A: Account> UserSlot<A> {
    fn is_logged_in(&self) -> bool {
        self.account.is_some() && (self.login.is_done() || self.listener.is_some())
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// State shared with the listener tasks.
struct Shared<B> {
    bot: Arc<B>,
    store: SettingsStore,
    settings: Mutex<HashMap<UserId, ForwardSettings>>,
}

impl<B: Transport> Shared<B> {
    async fn settings(&self, user: UserId) -> Result<ForwardSettings, SettingsError> {
        let mut cache = self.settings.lock().await;
        if let Some(settings) = cache.get(&user) {
            return Ok(settings.clone());
        }
        let settings = self.store.load(user)?;
        cache.insert(user, settings.clone());
        Ok(settings)
    }

    /// Edits a user's settings and writes them out.
    async fn update<R>(
        &self,
        user: UserId,
        edit: impl FnOnce(&mut ForwardSettings) -> R + Send,
    ) -> Result<R, SettingsError> {
        let mut cache = self.settings.lock().await;
        let settings = match cache.entry(user) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.store.load(user)?),
        };
        let result = edit(settings);
        self.store.save(user, settings)?;
        Ok(result)
    }

    async fn notify(&self, user: UserId, text: impl Into<String> + Send) {
        if let Err(e) = self.bot.send(user, OutgoingMessage::text(text)).await {
            warn!("Failed to notify {}: {}", user, e);
        }
    }
}

/// Drives the auto-forward bot for every user.
pub struct ForwardService<C: AccountConnector, B> {
    connector: C,
    shared: Arc<Shared<B>>,
    limiter: Arc<SlidingWindowLimiter>,
    slots: Mutex<HashMap<UserId, Arc<Mutex<UserSlot<C::Account>>>>>,
}

impl<C: AccountConnector, B: Transport + 'static> ForwardService<C, B> {
    #[must_use]
    pub fn new(connector: C, bot: Arc<B>, store: SettingsStore, settings: &BotSettings) -> Self {
        Self {
            connector,
            shared: Arc::new(Shared {
                bot,
                store,
                settings: Mutex::new(HashMap::new()),
            }),
            limiter: Arc::new(SlidingWindowLimiter::new(
                settings.rate_limit_max,
                settings.rate_limit_window(),
            )),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Reconnects every stored account session and restarts its listener.
    /// Sessions that are no longer authorized are dropped and their owners
    /// asked to log in again.
    pub async fn resume_sessions(&self) -> Result<usize, SettingsError> {
        let users = self.shared.store.users_with_sessions()?;
        let mut resumed = 0;

        for user in users {
            let account = match self.connector.connect(user).await {
                Ok(account) => Arc::new(account),
                Err(e) => {
                    warn!("Could not reconnect account of {}: {}", user, e);
                    self.shared.notify(user, SESSION_LOST).await;
                    continue;
                }
            };

            if matches!(account.is_authorized().await, Ok(true)) {
                let slot = self.slot(user).await;
                let mut slot = slot.lock().await;
                self.start_listener(user, &mut slot, account);
                resumed += 1;
            } else {
                info!("Stored session of {} is no longer authorized", user);
                account.disconnect();
                self.connector.forget(user);
                self.shared.notify(user, SESSION_LOST).await;
            }
        }

        info!("Resumed {} account sessions", resumed);
        Ok(resumed)
    }

    /// Handles one message sent to the bot.
    pub async fn handle(&self, message: IncomingMessage) -> Result<(), ForwardError> {
        let user = message.sender;
        if message.chat != user {
            debug!("Ignoring message in group chat {}", message.chat);
            return Ok(());
        }

        let reply = match ForwardCommand::parse(&message.text) {
            Some(command) => {
                debug!("Command from {}: {}", user, command_name(&command));
                self.execute(user, command).await?
            }
            None => "Unknown command. Send /help for the list.".to_owned(),
        };

        self.shared
            .bot
            .send(user, OutgoingMessage::text(reply))
            .await?;
        Ok(())
    }

    async fn execute(&self, user: UserId, command: ForwardCommand) -> Result<String, ForwardError> {
        match command {
            ForwardCommand::Start | ForwardCommand::Help => Ok(HELP_TEXT.to_owned()),
            ForwardCommand::Login(None) => Ok("Usage: /login +15551234567".to_owned()),
            ForwardCommand::Login(Some(phone)) => Ok(self.login(user, &phone).await),
            ForwardCommand::Code(None) => {
                Ok("Usage: /code 12345 (or AUTOX12345). Spaces and dashes between digits are fine.".to_owned())
            }
            ForwardCommand::Code(Some(code)) => Ok(self.submit_code(user, &code).await),
            ForwardCommand::Password(password) if password.is_empty() => {
                Ok("Usage: /password <password>".to_owned())
            }
            ForwardCommand::Password(password) => Ok(self.submit_password(user, &password).await),
            ForwardCommand::Dashboard => self.dashboard(user).await,
            ForwardCommand::Settings(None) => {
                Ok(render_settings(&self.shared.settings(user).await?))
            }
            ForwardCommand::Settings(Some(args)) => self.change_setting(user, &args).await,
            ForwardCommand::Logout => self.logout(user).await,
        }
    }

    async fn login(&self, user: UserId, phone: &str) -> String {
        if let Some(wait) = self.throttle(user, OperationKind::Login).await {
            return wait;
        }

        let slot = self.slot(user).await;
        let mut slot = slot.lock().await;

        let existing = slot.account.clone();
        let account = match existing {
            Some(account) => account,
            None => match self.connector.connect(user).await {
                Ok(account) => {
                    let account = Arc::new(account);
                    slot.account = Some(Arc::clone(&account));
                    account
                }
                Err(e) => {
                    error!("Failed to open account client for {}: {}", user, e);
                    return format!("❌ Could not connect to Telegram: {e}");
                }
            },
        };

        if matches!(account.is_authorized().await, Ok(true)) {
            if slot.listener.is_none() {
                self.start_listener(user, &mut slot, account);
            }
            return "✅ Already logged in. Open /dashboard.".to_owned();
        }

        match slot.login.start(&account, phone).await {
            Ok(_) => "📨 Code sent. Reply with AUTOX followed by the code, e.g. AUTOX12345, \
                      so Telegram does not block it."
                .to_owned(),
            Err(e) => format!("❌ {e}"),
        }
    }

    async fn submit_code(&self, user: UserId, code: &str) -> String {
        if let Some(wait) = self.throttle(user, OperationKind::Login).await {
            return wait;
        }

        let slot = self.slot(user).await;
        let mut slot = slot.lock().await;
        let Some(account) = slot.account.clone() else {
            return "Send /login +<phone> first.".to_owned();
        };

        let result = slot.login.submit_code(&account, code).await;
        self.after_login_step(user, &mut slot, account, result)
    }

    async fn submit_password(&self, user: UserId, password: &str) -> String {
        if let Some(wait) = self.throttle(user, OperationKind::Login).await {
            return wait;
        }

        let slot = self.slot(user).await;
        let mut slot = slot.lock().await;
        let Some(account) = slot.account.clone() else {
            return "Send /login +<phone> first.".to_owned();
        };

        let result = slot.login.submit_password(&account, password).await;
        self.after_login_step(user, &mut slot, account, result)
    }

    fn after_login_step(
        &self,
        user: UserId,
        slot: &mut UserSlot<C::Account>,
        account: Arc<C::Account>,
        result: Result<LoginStep, LoginError>,
    ) -> String {
        match result {
            Ok(LoginStep::LoggedIn) => {
                info!("User {} logged in", user);
                self.start_listener(user, slot, account);
                "✅ Logged in. Open /dashboard to pick a source and targets.".to_owned()
            }
            Ok(LoginStep::PasswordRequired) => {
                "🔐 Two-step verification is on. Send /password <password>.".to_owned()
            }
            Ok(LoginStep::WrongCode { remaining }) => {
                format!("❌ Wrong code. {remaining} attempt(s) left.")
            }
            Ok(LoginStep::WrongPassword { remaining }) => {
                format!("❌ Wrong password. {remaining} attempt(s) left.")
            }
            Ok(LoginStep::CodeSent) => "📨 Code sent.".to_owned(),
            Err(e) => format!("❌ {e}"),
        }
    }

    async fn dashboard(&self, user: UserId) -> Result<String, ForwardError> {
        let settings = self.shared.settings(user).await?;
        let slot = self.slot(user).await;
        let mut slot = slot.lock().await;

        let account = match &slot.account {
            Some(account) if slot.is_logged_in() => Arc::clone(account),
            _ => {
                return Ok(format!(
                    "{}\n\nNot logged in. Use /login +<phone>.",
                    render_settings(&settings)
                ));
            }
        };

        match account.dialogs().await {
            Ok(dialogs) => {
                slot.dialogs = dialogs;
                Ok(render_dashboard(&settings, &slot.dialogs))
            }
            Err(TransportError::NotAuthorized) => {
                self.drop_account(user, &mut slot);
                Ok(SESSION_LOST.to_owned())
            }
            Err(e) => Ok(format!("❌ Could not load your chats: {e}")),
        }
    }

    async fn change_setting(&self, user: UserId, args: &str) -> Result<String, ForwardError> {
        let change = match SettingChange::parse(args) {
            Ok(change) => change,
            Err(e) => return Ok(format!("❌ {e}")),
        };

        let dialogs = {
            let slot = self.slot(user).await;
            let slot = slot.lock().await;
            slot.dialogs.clone()
        };

        let result = self
            .shared
            .update(user, move |settings| change.apply(settings, &dialogs))
            .await?;
        Ok(match result {
            Ok(message) => format!("✅ {message}"),
            Err(e) => format!("❌ {e}"),
        })
    }

    async fn logout(&self, user: UserId) -> Result<String, ForwardError> {
        let slot = self.slot(user).await;
        let mut slot = slot.lock().await;
        let Some(account) = slot.account.clone() else {
            return Ok("You are not logged in.".to_owned());
        };

        if let Err(e) = account.sign_out().await {
            warn!("Sign-out of {} failed: {}", user, e);
        }
        self.drop_account(user, &mut slot);
        self.shared.update(user, |settings| settings.active = false).await?;

        info!("User {} logged out", user);
        Ok("👋 Logged out. Forwarding stopped.".to_owned())
    }

    /// Stops the listener, disconnects and forgets the stored session.
    fn drop_account(&self, user: UserId, slot: &mut UserSlot<C::Account>) {
        slot.stop_listener();
        if let Some(account) = slot.account.take() {
            account.disconnect();
        }
        slot.login.reset();
        slot.dialogs.clear();
        self.connector.forget(user);
    }

    fn start_listener(&self, user: UserId, slot: &mut UserSlot<C::Account>, account: Arc<C::Account>) {
        slot.stop_listener();
        slot.account = Some(Arc::clone(&account));

        let forwarder = Forwarder::new(Arc::clone(&account), Arc::clone(&self.limiter));
        let shared = Arc::clone(&self.shared);
        slot.listener = Some(tokio::spawn(listen(user, account, forwarder, shared)));
        debug!("Listener started for {}", user);
    }

    async fn slot(&self, user: UserId) -> Arc<Mutex<UserSlot<C::Account>>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(user).or_default())
    }

    async fn throttle(&self, user: UserId, kind: OperationKind) -> Option<String> {
        let key = (user, kind);
        if self.limiter.try_acquire(key).await {
            return None;
        }
        let wait = self.limiter.retry_after(&key).await;
        Some(format!(
            "⏳ Too many attempts. Try again in {}s.",
            wait.as_secs().max(1)
        ))
    }

    /// Stops every listener and disconnects every account.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.slots.lock().await.drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            let mut slot = slot.lock().await;
            slot.stop_listener();
            if let Some(account) = slot.account.take() {
                account.disconnect();
            }
        }
    }
}

/// Forwards the user's source-channel messages until the account's update
/// stream ends.
async fn listen<A: Account, B: Transport>(
    user: UserId,
    account: Arc<A>,
    forwarder: Forwarder<A>,
    shared: Arc<Shared<B>>,
) {
    while let Some(message) = account.next_update().await {
        let settings = match shared.settings(user).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Skipping message for {}: {}", user, e);
                continue;
            }
        };
        if settings.source.as_ref().is_none_or(|s| s.id != message.chat) {
            continue;
        }

        let report = forwarder.forward(user, &settings, &message).await;
        if !report.changes_settings() {
            continue;
        }
        if let Err(e) = shared
            .update(user, |settings| report.apply(settings, Utc::now()))
            .await
        {
            warn!("Failed to record forward of {}: {}", user, e);
        }
        for (_, reason) in &report.deactivated {
            shared
                .notify(user, format!("⚠️ A target was switched off: {reason}"))
                .await;
        }
    }

    warn!("Update stream of {} ended", user);
    shared.notify(user, SESSION_LOST).await;
}

fn command_name(command: &ForwardCommand) -> &'static str {
    match command {
        ForwardCommand::Start => "start",
        ForwardCommand::Help => "help",
        ForwardCommand::Login(_) => "login",
        ForwardCommand::Code(_) => "code",
        ForwardCommand::Password(_) => "password",
        ForwardCommand::Dashboard => "dashboard",
        ForwardCommand::Settings(_) => "settings",
        ForwardCommand::Logout => "logout",
    }
}

#[async_trait]
impl<C: AccountConnector, B: Transport + 'static> UpdateHandler for ForwardService<C, B> {
    type Error = ForwardError;

    async fn handle(&self, message: IncomingMessage) -> Result<(), ForwardError> {
        Self::handle(self, message).await
    }

    async fn on_failure(&self, message: &IncomingMessage) {
        self.shared.notify(message.sender, GENERIC_ERROR).await;
    }

    async fn sweep(&self) {
        self.limiter.sweep().await;
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        for slot in slots {
            let mut slot = slot.lock().await;
            if slot.listener.as_ref().is_some_and(JoinHandle::is_finished) {
                slot.listener = None;
            }
        }
    }
}

impl<C: AccountConnector, B> std::fmt::Debug for ForwardService<C, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardService")
            .field("store", &self.shared.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::telegram::{AccountLogin, SignInFailure};

    const USER: UserId = 7;
    const SOURCE: i64 = -1001;
    const TARGET: i64 = -1002;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(i64, String)>>,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, chat: i64, message: OutgoingMessage) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat, message.body().to_owned()));
            Ok(())
        }

        async fn recent_messages(&self, _chat: i64, _limit: usize) -> Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
            Ok(Vec::new())
        }
    }

    /// A user account whose code is 12345 and whose updates come from a
    /// channel the test feeds.
    struct FakeAccount {
        posted: Recorder,
        authorized: StdMutex<bool>,
        updates: tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingMessage>>,
    }

    #[async_trait]
    impl Transport for FakeAccount {
        async fn send(&self, chat: i64, message: OutgoingMessage) -> Result<(), TransportError> {
            self.posted.send(chat, message).await
        }

        async fn recent_messages(&self, _chat: i64, _limit: usize) -> Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
            Ok(vec![
                Dialog {
                    id: SOURCE,
                    title: "News".to_owned(),
                    is_channel: true,
                },
                Dialog {
                    id: TARGET,
                    title: "Mirror".to_owned(),
                    is_channel: true,
                },
            ])
        }
    }

    #[async_trait]
    impl AccountLogin for FakeAccount {
        type CodeToken = ();
        type PasswordToken = ();

        async fn request_code(&self, _phone: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn sign_in(&self, _token: &(), code: &str) -> Result<(), SignInFailure<()>> {
            if code == "12345" {
                *self.authorized.lock().unwrap() = true;
                Ok(())
            } else {
                Err(SignInFailure::InvalidCode)
            }
        }

        async fn check_password(&self, _token: (), _password: &str) -> Result<(), SignInFailure<()>> {
            Err(SignInFailure::Failed("no password".to_owned()))
        }
    }

    #[async_trait]
    impl UpdateSource for FakeAccount {
        async fn next_update(&self) -> Option<IncomingMessage> {
            self.updates.lock().await.recv().await
        }
    }

    #[async_trait]
    impl Account for FakeAccount {
        async fn is_authorized(&self) -> Result<bool, TransportError> {
            Ok(*self.authorized.lock().unwrap())
        }

        async fn sign_out(&self) -> Result<(), TransportError> {
            *self.authorized.lock().unwrap() = false;
            Ok(())
        }

        fn disconnect(&self) {}
    }

    /// Hands out one prepared account.
    struct FakeConnector {
        account: StdMutex<Option<FakeAccount>>,
        forgotten: StdMutex<Vec<UserId>>,
    }

    #[async_trait]
    impl AccountConnector for FakeConnector {
        type Account = FakeAccount;

        async fn connect(&self, _user: UserId) -> Result<FakeAccount, TransportError> {
            self.account
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TransportError::Connection("no more accounts".to_owned()))
        }

        fn forget(&self, user: UserId) {
            self.forgotten.lock().unwrap().push(user);
        }
    }

    fn service(
        dir: &std::path::Path,
    ) -> (
        ForwardService<FakeConnector, Recorder>,
        Arc<Recorder>,
        mpsc::UnboundedSender<IncomingMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let account = FakeAccount {
            posted: Recorder::default(),
            authorized: StdMutex::new(false),
            updates: tokio::sync::Mutex::new(rx),
        };
        let connector = FakeConnector {
            account: StdMutex::new(Some(account)),
            forgotten: StdMutex::new(Vec::new()),
        };
        let bot = Arc::new(Recorder::default());
        let service = ForwardService::new(
            connector,
            Arc::clone(&bot),
            SettingsStore::new(dir),
            &BotSettings::default(),
        );
        (service, bot, tx)
    }

    fn private(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: USER,
            sender: USER,
            text: text.to_owned(),
            media: None,
        }
    }

    async fn send(service: &ForwardService<FakeConnector, Recorder>, bot: &Recorder, text: &str) -> String {
        service.handle(private(text)).await.unwrap();
        bot.texts().last().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_login_configure_and_forward() {
        let dir = tempfile::tempdir().unwrap();
        let (service, bot, updates) = service(dir.path());

        assert!(send(&service, &bot, "/login +15551234567").await.contains("Code sent"));
        assert!(send(&service, &bot, "AUTOX 1111").await.contains("2 attempt(s) left"));
        assert!(send(&service, &bot, "AUTOX12-345").await.contains("Logged in"));

        let dashboard = send(&service, &bot, "/dashboard").await;
        assert!(dashboard.contains("1. News"), "{dashboard}");
        assert!(send(&service, &bot, "/settings source 1").await.contains("News"));
        assert!(send(&service, &bot, "/settings target add 2").await.contains("Mirror"));
        assert!(send(&service, &bot, "/settings word hello => hi").await.starts_with('✅'));
        assert!(send(&service, &bot, "/settings start").await.contains("started"));

        updates
            .send(IncomingMessage {
                chat: SOURCE,
                sender: SOURCE,
                text: "Hello world".to_owned(),
                media: None,
            })
            .unwrap();

        let stored = SettingsStore::new(dir.path());
        let mut forwarded = 0;
        for _ in 0..100 {
            forwarded = stored.load(USER).unwrap().stats.forwarded;
            if forwarded > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(forwarded, 1);

        let slot = service.slot(USER).await;
        let account = slot.lock().await.account.clone().unwrap();
        assert_eq!(account.posted.sent.lock().unwrap()[0], (TARGET, "hi world".to_owned()));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_settings_errors_are_replies() {
        let dir = tempfile::tempdir().unwrap();
        let (service, bot, _updates) = service(dir.path());

        assert!(send(&service, &bot, "/settings source 1").await.contains("not in the list"));
        assert!(send(&service, &bot, "/settings start").await.contains("Set a source"));
        assert!(send(&service, &bot, "/settings delay soon").await.contains("Usage"));
        assert!(send(&service, &bot, "/code 12").await.contains("Usage"));
        assert!(send(&service, &bot, "/code 12345").await.contains("/login"));
        assert!(send(&service, &bot, "hello").await.contains("/help"));
        assert!(send(&service, &bot, "/logout").await.contains("not logged in"));
    }

    #[tokio::test]
    async fn test_logout_forgets_session() {
        let dir = tempfile::tempdir().unwrap();
        let (service, bot, _updates) = service(dir.path());

        send(&service, &bot, "/login +15551234567").await;
        send(&service, &bot, "/code 12345").await;
        assert!(send(&service, &bot, "/logout").await.contains("Logged out"));

        assert_eq!(*service.connector.forgotten.lock().unwrap(), vec![USER]);
        assert!(!SettingsStore::new(dir.path()).load(USER).unwrap().active);
        assert!(send(&service, &bot, "/dashboard").await.contains("Not logged in"));
    }

    #[tokio::test]
    async fn test_group_messages_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (service, bot, _updates) = service(dir.path());

        let mut message = private("/help");
        message.chat = -500;
        service.handle(message).await.unwrap();
        assert!(bot.texts().is_empty());
    }
}
