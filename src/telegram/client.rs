//! grammers-backed Telegram client shared by both bots.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::update::Update;
use grammers_client::{
    Client, InputMessage, InvocationError, SenderPool, SignInError, UpdatesConfiguration, button,
    reply_markup, sender,
};
use grammers_session::storages::SqliteSession;
use grammers_session::types::PeerRef;
use grammers_tl_types as tl;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::file_handle::FileHandle;
use super::rate_limiter::SendPacer;
use super::transport::{
    AccountLogin, Dialog, IncomingMedia, IncomingMessage, Keyboard, OutgoingMessage, SignInFailure,
    Transport, TransportError,
};
use crate::ChatId;
use crate::catalog::FileKind;

/// Offset Telegram's Bot API adds to channel ids.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// RPC errors meaning the chat will never accept our messages.
const FORBIDDEN_ERRORS: &[&str] = &[
    "CHANNEL_PRIVATE",
    "CHAT_WRITE_FORBIDDEN",
    "CHAT_ADMIN_REQUIRED",
    "USER_IS_BLOCKED",
    "USER_BANNED_IN_CHANNEL",
    "CHANNEL_INVALID",
    "PEER_ID_INVALID",
];

impl TransportError {
    fn classify(err: &InvocationError, chat: Option<ChatId>) -> Self {
        if let InvocationError::Rpc(rpc) = err
            && let Some(classified) = Self::from_rpc(&rpc.name, rpc.value, chat)
        {
            return classified;
        }
        Self::Invocation(err.to_string())
    }

    /// Maps an RPC error name (with its numeric suffix split off) to a
    /// variant callers act on.
    fn from_rpc(name: &str, value: Option<u32>, chat: Option<ChatId>) -> Option<Self> {
        match name {
            "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT" => {
                Some(Self::FloodWait(value.unwrap_or(1)))
            }
            "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" => Some(Self::NotAuthorized),
            name if FORBIDDEN_ERRORS.contains(&name) => chat.map(Self::Forbidden),
            _ => None,
        }
    }
}

impl From<InvocationError> for TransportError {
    fn from(err: InvocationError) -> Self {
        Self::classify(&err, None)
    }
}

/// High-level Telegram client: a bot account for the materials bot, a user
/// account per person for the auto-forwarder.
pub struct TelegramBot {
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    api_hash: String,

    /// Spaces outgoing sends and absorbs flood waits.
    pacer: SendPacer,

    /// Peers seen in updates or dialogs, by Bot API style id.
    peers: RwLock<HashMap<ChatId, PeerRef>>,

    updates: Mutex<Option<grammers_client::client::UpdateStream>>,

    random_ids: AtomicI64,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Opens the session file and connects.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the connection fails.
    pub async fn connect(
        api_id: i32,
        api_hash: &str,
        session_path: &Path,
        send_interval_ms: u64,
    ) -> Result<Self, TransportError> {
        info!("Connecting to Telegram with session {}...", session_path.display());

        if let Some(parent) = session_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Session(e.to_string()))?;
        }

        let session = Arc::new(
            SqliteSession::open(session_path)
                .await
                .map_err(|e| TransportError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let stream = client.stream_updates(updates, UpdatesConfiguration::default());

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            api_hash: api_hash.to_owned(),
            pacer: SendPacer::from_millis(send_interval_ms),
            peers: RwLock::new(HashMap::new()),
            updates: Mutex::new(Some(stream)),
            random_ids: AtomicI64::new(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TransportError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    /// Signs in as a bot unless the session already is.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected.
    pub async fn bot_sign_in(&self, token: &str) -> Result<(), TransportError> {
        if self.is_authorized().await? {
            info!("Session already authorized");
            return Ok(());
        }

        info!("Signing in as bot...");
        self.client
            .bot_sign_in(token, &self.api_hash)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Session(e.to_string()))
    }

    /// Logs the account out and invalidates the session.
    ///
    /// # Errors
    ///
    /// Returns an error if Telegram rejects the request.
    pub async fn sign_out(&self) -> Result<(), TransportError> {
        info!("Signing out...");
        self.client
            .invoke(&tl::functions::auth::LogOut {})
            .await
            .map(|_| ())
            .map_err(TransportError::from)
    }

    /// Waits for the next incoming message.
    ///
    /// Returns `None` once the update stream has ended.
    pub async fn next_message(&self) -> Option<IncomingMessage> {
        let mut guard = self.updates.lock().await;
        let stream = guard.as_mut()?;

        loop {
            match stream.next().await {
                Ok(Update::NewMessage(message)) if !message.outgoing() => {
                    let Some(incoming) = incoming_from_raw(&message.raw) else {
                        continue;
                    };
                    if let Some(peer) = message.peer_ref() {
                        self.peers.write().await.insert(incoming.chat, peer);
                    }
                    return Some(incoming);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Update stream failed: {}", e);
                    guard.take();
                    return None;
                }
            }
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }

    async fn peer(&self, chat: ChatId) -> Result<PeerRef, TransportError> {
        if let Some(peer) = self.peers.read().await.get(&chat) {
            return Ok(*peer);
        }

        // Unknown chat: refresh from the dialog list once.
        self.dialogs().await?;
        self.peers
            .read()
            .await
            .get(&chat)
            .copied()
            .ok_or(TransportError::UnknownPeer(chat))
    }

    fn next_random_id(&self) -> i64 {
        self.random_ids.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_once(&self, chat: ChatId, message: &OutgoingMessage) -> Result<(), TransportError> {
        let peer = self.peer(chat).await?;

        let result = match message {
            OutgoingMessage::Text { text, keyboard } => {
                let mut input = InputMessage::new().text(text.as_str());
                if let Some(keyboard) = keyboard {
                    input = input.reply_markup(&build_markup(keyboard));
                }
                self.client.send_message(peer, input).await.map(|_| ())
            }
            OutgoingMessage::File { record } => {
                let handle = FileHandle::decode(&record.file_id)?;
                let request = tl::functions::messages::SendMedia {
                    silent: false,
                    background: false,
                    clear_draft: false,
                    noforwards: false,
                    update_stickersets_order: false,
                    invert_media: false,
                    allow_paid_floodskip: false,
                    peer: peer.into(),
                    reply_to: None,
                    media: input_media(&handle),
                    message: record.caption.clone(),
                    random_id: self.next_random_id(),
                    reply_markup: None,
                    entities: None,
                    schedule_date: None,
                    send_as: None,
                    quick_reply_shortcut: None,
                    effect: None,
                    allow_paid_stars: None,
                    suggested_post: None,
                };
                self.client.invoke(&request).await.map(|_| ())
            }
        };

        result.map_err(|e| TransportError::classify(&e, Some(chat)))
    }
}

#[async_trait]
impl Transport for TelegramBot {
    async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<(), TransportError> {
        self.pacer.wait_and_acquire().await;
        debug!("Sending to {}: \"{}\"", chat, log_preview(message.body(), 30));

        match self.send_once(chat, &message).await {
            Err(TransportError::FloodWait(seconds)) => {
                self.pacer.handle_flood_wait(seconds).await;
                self.send_once(chat, &message).await
            }
            other => other,
        }
    }

    async fn recent_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<String>, TransportError> {
        let peer = self.peer(chat).await?;
        let mut history = self.client.iter_messages(peer).limit(limit);
        let mut texts = Vec::new();

        while let Some(message) = history
            .next()
            .await
            .map_err(|e| TransportError::classify(&e, Some(chat)))?
        {
            texts.push(message.text().to_owned());
        }
        Ok(texts)
    }

    async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError> {
        let mut iter = self.client.iter_dialogs();
        let mut dialogs = Vec::new();
        let mut peers = self.peers.write().await;

        while let Some(dialog) = iter.next().await? {
            let peer = dialog.peer();
            let id = peer.id().bot_api_dialog_id();
            if let Some(peer_ref) = peer.to_ref() {
                peers.insert(id, peer_ref);
            }
            dialogs.push(Dialog {
                id,
                title: peer.name().unwrap_or_default().to_owned(),
                is_channel: id < -CHANNEL_ID_OFFSET,
            });
        }
        Ok(dialogs)
    }
}

#[async_trait]
impl AccountLogin for TelegramBot {
    type CodeToken = LoginToken;
    type PasswordToken = PasswordToken;

    async fn request_code(&self, phone: &str) -> Result<LoginToken, TransportError> {
        info!("Requesting login code for phone: {}...", redact_phone(phone));

        self.client
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(TransportError::from)
    }

    async fn sign_in(
        &self,
        token: &LoginToken,
        code: &str,
    ) -> Result<(), SignInFailure<PasswordToken>> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(SignInFailure::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => Err(SignInFailure::InvalidCode),
            Err(e) => Err(SignInFailure::Failed(e.to_string())),
        }
    }

    async fn check_password(
        &self,
        token: PasswordToken,
        password: &str,
    ) -> Result<(), SignInFailure<PasswordToken>> {
        info!("Checking 2FA password...");

        match self.client.check_password(token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(SignInFailure::InvalidPassword(token)),
            Err(e) => Err(SignInFailure::Failed(e.to_string())),
        }
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("pacer", &self.pacer)
            .finish_non_exhaustive()
    }
}

fn build_markup(keyboard: &Keyboard) -> reply_markup::ReplyMarkup {
    let rows = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(|label| button::text(label)).collect())
        .collect();
    reply_markup::keyboard(rows).fit_size()
}

fn input_media(handle: &FileHandle) -> tl::enums::InputMedia {
    match handle.kind {
        FileKind::Photo => tl::types::InputMediaPhoto {
            spoiler: false,
            id: tl::types::InputPhoto {
                id: handle.id,
                access_hash: handle.access_hash,
                file_reference: handle.file_reference.clone(),
            }
            .into(),
            ttl_seconds: None,
            video: None,
        }
        .into(),
        FileKind::Document | FileKind::Video => tl::types::InputMediaDocument {
            spoiler: false,
            id: tl::types::InputDocument {
                id: handle.id,
                access_hash: handle.access_hash,
                file_reference: handle.file_reference.clone(),
            }
            .into(),
            video_cover: None,
            video_timestamp: None,
            ttl_seconds: None,
            query: None,
        }
        .into(),
    }
}

/// Bot API style id of a raw peer: users positive, groups negative,
/// channels below `-10^12`.
fn peer_chat_id(peer: &tl::enums::Peer) -> ChatId {
    match peer {
        tl::enums::Peer::User(user) => user.user_id,
        tl::enums::Peer::Chat(chat) => -chat.chat_id,
        tl::enums::Peer::Channel(channel) => -(CHANNEL_ID_OFFSET + channel.channel_id),
    }
}

fn incoming_from_raw(raw: &tl::enums::Message) -> Option<IncomingMessage> {
    let tl::enums::Message::Message(message) = raw else {
        return None;
    };

    let chat = peer_chat_id(&message.peer_id);
    let sender = message.from_id.as_ref().map_or(chat, peer_chat_id);
    let media = message
        .media
        .as_ref()
        .and_then(|media| incoming_media(media, &message.message));

    Some(IncomingMessage {
        chat,
        sender,
        text: if media.is_some() {
            String::new()
        } else {
            message.message.clone()
        },
        media,
    })
}

fn incoming_media(media: &tl::enums::MessageMedia, caption: &str) -> Option<IncomingMedia> {
    match media {
        tl::enums::MessageMedia::Photo(photo) => {
            let Some(tl::enums::Photo::Photo(photo)) = &photo.photo else {
                return None;
            };
            let handle = FileHandle {
                kind: FileKind::Photo,
                id: photo.id,
                access_hash: photo.access_hash,
                file_reference: photo.file_reference.clone(),
            };
            Some(IncomingMedia {
                file_id: handle.encode(),
                kind: FileKind::Photo,
                file_name: None,
                caption: caption.to_owned(),
            })
        }
        tl::enums::MessageMedia::Document(document) => {
            let Some(tl::enums::Document::Document(document)) = &document.document else {
                return None;
            };
            let mut kind = FileKind::Document;
            let mut file_name = None;
            for attribute in &document.attributes {
                match attribute {
                    tl::enums::DocumentAttribute::Filename(name) => {
                        file_name = Some(name.file_name.clone());
                    }
                    tl::enums::DocumentAttribute::Video(_) => kind = FileKind::Video,
                    _ => {}
                }
            }
            let handle = FileHandle {
                kind,
                id: document.id,
                access_hash: document.access_hash,
                file_reference: document.file_reference.clone(),
            };
            Some(IncomingMedia {
                file_id: handle.encode(),
                kind,
                file_name,
                caption: caption.to_owned(),
            })
        }
        _ => None,
    }
}

/// Phone number with all but its last four digits hidden.
pub(crate) fn redact_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.len().checked_sub(4) {
        Some(hidden) if hidden > 0 => {
            format!("***{}", digits[hidden..].iter().collect::<String>())
        }
        _ => "****".to_owned(),
    }
}

/// At most `max_chars` characters of `s`, with an ellipsis when cut.
pub(crate) fn log_preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_owned(),
    }
}
