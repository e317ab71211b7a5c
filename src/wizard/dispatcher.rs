//! Step-by-step dispatcher for browsing and managing the catalog.
//!
//! Every text goes through the same order: navigation tokens first, then
//! validation against the legal options of the current step, then either
//! the next prompt or the mode's action. Invalid input leaves the session
//! untouched and repeats the prompt.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use super::labels::{
    self, ADD_PUBLISHER, CONFIRM_NO, CONFIRM_YES, DONE, NEXT_PAGE, Nav, PAGE_SIZE, PREV_PAGE,
};
use super::{Mode, Step};
use crate::UserId;
use crate::catalog::{CatalogError, CatalogPath, CatalogRoot, FileRecord, NodeKind, match_name};
use crate::session::{SessionState, SessionStore};
use crate::telegram::{IncomingMedia, Keyboard, OutgoingMessage};

/// Who sent the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub is_admin: bool,
}

impl Caller {
    #[must_use]
    pub const fn user(id: UserId) -> Self {
        Self { id, is_admin: false }
    }

    #[must_use]
    pub const fn admin(id: UserId) -> Self {
        Self { id, is_admin: true }
    }
}

/// What the caller should do after a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Messages for the user, in order.
    pub replies: Vec<OutgoingMessage>,

    /// The catalog changed and must be persisted.
    pub save: bool,

    /// Text to deliver to every known user.
    pub broadcast: Option<String>,
}

impl Outcome {
    #[must_use]
    pub fn reply(message: OutgoingMessage) -> Self {
        Self {
            replies: vec![message],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::reply(OutgoingMessage::text(text))
    }

    fn then(mut self, other: Self) -> Self {
        self.replies.extend(other.replies);
        self.save |= other.save;
        self.broadcast = self.broadcast.or(other.broadcast);
        self
    }

    /// Also requests a save when `save` is set.
    #[must_use]
    pub fn saving(mut self, save: bool) -> Self {
        self.save |= save;
        self
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("No {0} selected")]
    MissingSelection(NodeKind),
}

type StepResult = Result<Outcome, StepError>;

const DELETES_LOCKED: &str = "⚠️ Catalog storage is unhealthy, so deleting is disabled. \
                              Use /restore or check the bot's disk.";

/// Owns the catalog and the sessions browsing it.
#[derive(Debug)]
pub struct Dispatcher {
    catalog: CatalogRoot,
    sessions: SessionStore,
    deletes_locked: bool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(catalog: CatalogRoot) -> Self {
        Self {
            catalog,
            sessions: SessionStore::new(),
            deletes_locked: false,
        }
    }

    /// Refuses every mode that removes content while `locked`, including
    /// wizards already in progress.
    pub fn lock_deletes(&mut self, locked: bool) {
        self.deletes_locked = locked;
    }

    #[must_use]
    pub const fn catalog(&self) -> &CatalogRoot {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogRoot {
        &mut self.catalog
    }

    /// Swaps in a restored catalog. Open wizards are reset since their
    /// selections may no longer exist.
    pub fn replace_catalog(&mut self, catalog: CatalogRoot) -> CatalogRoot {
        self.sessions = SessionStore::new();
        std::mem::replace(&mut self.catalog, catalog)
    }

    pub fn sessions_mut(&mut self) -> &mut SessionStore {
        &mut self.sessions
    }

    #[must_use]
    pub fn session(&self, user: UserId) -> Option<&SessionState> {
        self.sessions.get(user)
    }

    /// Enters `mode` and shows its first prompt.
    pub fn start(&mut self, caller: Caller, mode: Mode, now: Instant) -> Outcome {
        if mode.is_admin_only() && !caller.is_admin {
            return Outcome::text("⛔ This action is for admins only.");
        }
        if mode.is_destructive() && self.deletes_locked {
            return Outcome::text(DELETES_LOCKED);
        }

        let session = self.sessions.get_or_create(caller.id, now);
        session.begin(mode);
        debug!("User {} started {}", caller.id, mode);

        prompt(&self.catalog, session).unwrap_or_else(|e| fail(session, caller, &e))
    }

    /// Abandons whatever the user was doing.
    pub fn cancel(&mut self, caller: Caller, now: Instant) -> Outcome {
        let session = self.sessions.get_or_create(caller.id, now);
        finish(session, caller, "❌ Cancelled.")
    }

    /// Shows the main menu, leaving any wizard.
    pub fn menu(&mut self, caller: Caller, now: Instant, text: &str) -> Outcome {
        self.sessions.get_or_create(caller.id, now).clear();
        Outcome::reply(labels::main_menu(caller.is_admin, text))
    }

    /// Ends an upload started with "Add Material".
    pub fn finish_uploads(&mut self, caller: Caller, now: Instant) -> Outcome {
        let session = self.sessions.get_or_create(caller.id, now);
        if session.step != Some(Step::AwaitUploads) {
            return Outcome::text("ℹ️ Nothing to finish. Use /addmaterial to upload files.");
        }

        let count = session.flags.uploaded;
        let message = match session.selection.path() {
            Some(path) if count > 0 => {
                format!("✅ Upload finished: {count} file(s) added to {path}.")
            }
            _ => "ℹ️ No files were uploaded.".to_owned(),
        };
        finish(session, caller, message)
    }

    /// Handles a plain-text message.
    pub fn handle_text(&mut self, caller: Caller, text: &str, now: Instant) -> Outcome {
        let text = text.trim();
        let session = self.sessions.get_or_create(caller.id, now);

        match Nav::parse(text) {
            Some(Nav::Menu) => {
                return finish(session, caller, "🏠 Main menu.");
            }
            Some(Nav::Back) => {
                return go_back(&self.catalog, session).unwrap_or_else(|e| fail(session, caller, &e));
            }
            None => {}
        }

        let (Some(mode), Some(step)) = (session.mode, session.step) else {
            if let Some(mode) = Mode::ALL.into_iter().find(|m| labels::is_label(text, m.label())) {
                return self.start(caller, mode, now);
            }
            return Outcome::reply(labels::main_menu(
                caller.is_admin,
                "Choose an option from the menu below.",
            ));
        };
        if mode.is_destructive() && self.deletes_locked {
            warn!("Refusing {} for user {}: catalog storage is unhealthy", mode, caller.id);
            return finish(session, caller, DELETES_LOCKED);
        }

        on_step(&mut self.catalog, session, caller, mode, step, text)
            .unwrap_or_else(|e| fail(session, caller, &e))
    }

    /// Handles an uploaded document, photo or video.
    pub fn handle_media(&mut self, caller: Caller, media: IncomingMedia, now: Instant) -> Outcome {
        let session = self.sessions.get_or_create(caller.id, now);
        if session.step != Some(Step::AwaitUploads) {
            return Outcome::text(
                "ℹ️ To upload files, use /addmaterial and choose where they belong first.",
            );
        }
        let Some(path) = session.selection.path() else {
            return fail(session, caller, &StepError::MissingSelection(NodeKind::Publisher));
        };

        let record = media.into_record(session.flags.uploaded + 1);
        let name = record.display_name.clone();
        match self.catalog.append_file(&path, record) {
            Ok(()) => {
                session.flags.uploaded += 1;
                Outcome::text(format!(
                    "✅ Received '{name}' ({} so far). Send more or {DONE}.",
                    session.flags.uploaded
                ))
                .saving(true)
            }
            Err(e) => fail(session, caller, &e.into()),
        }
    }
}

/// Resets the session and shows the main menu after `message`.
fn finish(session: &mut SessionState, caller: Caller, message: impl Into<String>) -> Outcome {
    session.clear();
    Outcome::reply(labels::main_menu(caller.is_admin, message))
}

fn fail(session: &mut SessionState, caller: Caller, error: &StepError) -> Outcome {
    warn!("Wizard step failed for user {}: {}", caller.id, error);
    finish(session, caller, format!("⚠️ {error}. Returning to the menu."))
}

fn selected(value: Option<&String>, kind: NodeKind) -> Result<&str, StepError> {
    value.map(String::as_str).ok_or(StepError::MissingSelection(kind))
}

fn current_path(session: &SessionState) -> Result<CatalogPath, StepError> {
    session
        .selection
        .path()
        .ok_or(StepError::MissingSelection(NodeKind::Publisher))
}

/// Whether `step` takes part in the session's current mode.
fn applies(catalog: &CatalogRoot, session: &SessionState, step: Step) -> bool {
    match step {
        Step::AskPublisherName => session.flags.creating_publisher,
        Step::ChooseFolder => {
            let sel = &session.selection;
            match (&sel.exam, &sel.subject, &sel.publisher) {
                (Some(exam), Some(subject), Some(publisher)) => catalog
                    .publisher(exam, subject, publisher)
                    .is_ok_and(|node| node.has_folders()),
                _ => false,
            }
        }
        _ => true,
    }
}

/// Nearest earlier step Back may return to, with its table index.
fn back_target(catalog: &CatalogRoot, session: &SessionState) -> Option<(usize, Step)> {
    let (mode, step) = (session.mode?, session.step?);
    let current = mode.position(step)?;
    mode.steps()[..current]
        .iter()
        .copied()
        .enumerate()
        .rev()
        .find(|(_, s)| s.is_back_target() && applies(catalog, session, *s))
}

fn go_back(catalog: &CatalogRoot, session: &mut SessionState) -> StepResult {
    let (Some(mode), Some(step)) = (session.mode, session.step) else {
        return Ok(Outcome::text("🏠 Already at the main menu."));
    };
    let Some((index, target)) = back_target(catalog, session) else {
        session.clear();
        return Ok(Outcome::text("🏠 Main menu."));
    };

    let current = mode.position(step).unwrap_or(index);
    for left in &mode.steps()[index..=current] {
        left.clear(&mut session.selection, &mut session.flags);
    }
    session.step = Some(target);
    prompt(catalog, session)
}

/// Moves to the next applicable step and prompts for it.
fn advance(catalog: &CatalogRoot, session: &mut SessionState) -> StepResult {
    let (Some(mode), Some(step)) = (session.mode, session.step) else {
        return Ok(Outcome::default());
    };
    let next = mode
        .position(step)
        .and_then(|current| {
            mode.steps()[current + 1..]
                .iter()
                .copied()
                .find(|s| applies(catalog, session, *s))
        });

    match next {
        Some(next) => {
            session.step = Some(next);
            prompt(catalog, session)
        }
        None => Ok(Outcome::default()),
    }
}

/// Repeats the current prompt after an error line.
fn reprompt(catalog: &CatalogRoot, session: &SessionState, error: impl Into<String>) -> StepResult {
    Ok(Outcome::text(error).then(prompt(catalog, session)?))
}

fn on_step(
    catalog: &mut CatalogRoot,
    session: &mut SessionState,
    caller: Caller,
    mode: Mode,
    step: Step,
    text: &str,
) -> StepResult {
    let sel = session.selection.clone();

    match step {
        Step::ChooseExam => {
            let exams = catalog.list_exams();
            match match_name(&exams, text) {
                Some(exam) => {
                    session.selection.exam = Some(exam.to_owned());
                    advance(catalog, session)
                }
                None => reprompt(catalog, session, "❌ Invalid exam. Choose from the buttons."),
            }
        }

        Step::ChooseSubject => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subjects = catalog.list_subjects(exam)?;
            match match_name(&subjects, text) {
                Some(subject) => {
                    session.selection.subject = Some(subject.to_owned());
                    advance(catalog, session)
                }
                None => reprompt(catalog, session, "❌ Invalid subject. Choose from the buttons."),
            }
        }

        Step::ChoosePublisher => {
            if mode.can_create_publisher() && labels::is_label(text, ADD_PUBLISHER) {
                session.flags.creating_publisher = true;
                return advance(catalog, session);
            }
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let publishers = catalog.list_publishers(exam, subject)?;
            match match_name(&publishers, text) {
                Some(publisher) => {
                    session.selection.publisher = Some(publisher.to_owned());
                    session.flags.creating_publisher = false;
                    advance(catalog, session)
                }
                None => reprompt(catalog, session, "❌ Invalid publisher. Choose from the buttons."),
            }
        }

        Step::AskPublisherName => {
            if !labels::is_valid_new_name(text) {
                return reprompt(catalog, session, "❌ Send the publisher's name as plain text.");
            }
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            catalog.ensure_path(&CatalogPath::new(exam, subject, text))?;

            let publishers = catalog.list_publishers(exam, subject)?;
            let stored = match_name(&publishers, text).unwrap_or(text).to_owned();
            session.selection.publisher = Some(stored);
            Ok(advance(catalog, session)?.saving(true))
        }

        Step::ChooseFolder => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let publisher = selected(sel.publisher.as_ref(), NodeKind::Publisher)?;
            let folders = catalog.list_folders(exam, subject, publisher)?;
            match match_name(&folders, text) {
                Some(folder) => {
                    session.selection.folder = Some(folder.to_owned());
                    advance(catalog, session)
                }
                None => reprompt(catalog, session, "❌ Invalid folder. Choose from the buttons."),
            }
        }

        Step::AskFolderName => {
            if !labels::is_valid_new_name(text) {
                return reprompt(catalog, session, "❌ Send the folder's name as plain text.");
            }
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let publisher = selected(sel.publisher.as_ref(), NodeKind::Publisher)?;
            let path = CatalogPath::new(exam, subject, publisher).with_folder(text);
            match catalog.ensure_path(&path) {
                Ok(()) => Ok(finish(
                    session,
                    caller,
                    format!("✅ Folder '{text}' is ready under {exam} › {subject} › {publisher}."),
                )
                .saving(true)),
                Err(e @ CatalogError::PathConflict { .. }) => {
                    Ok(finish(session, caller, format!("❌ {e}.")))
                }
                Err(e) => Err(e.into()),
            }
        }

        Step::AskSubjectName => {
            if !labels::is_valid_new_name(text) {
                return reprompt(catalog, session, "❌ Send the subject's name as plain text.");
            }
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?.to_owned();
            let created = catalog.add_subject(&exam, text)?;
            let message = if created {
                format!("✅ Subject '{text}' added to {exam}.")
            } else {
                format!("ℹ️ Subject '{text}' already exists in {exam}.")
            };
            Ok(finish(session, caller, message).saving(created))
        }

        Step::ChooseFile => choose_file(catalog, session, text),

        Step::AwaitUploads => Ok(Outcome::text(format!(
            "📎 Send a document, photo or video, or {DONE} when finished."
        ))),

        Step::AwaitFileNumber => {
            let path = current_path(session)?;
            let Ok(index) = text.parse::<usize>() else {
                return reprompt(catalog, session, "❌ Send the number of the file to delete.");
            };
            match catalog.delete_file(&path, index) {
                Ok(record) => Ok(finish(
                    session,
                    caller,
                    format!("✅ Deleted '{}' from {path}.", record.display_name),
                )
                .saving(true)),
                Err(CatalogError::IndexOutOfRange { len: 0, .. }) => {
                    Ok(finish(session, caller, format!("📭 No files in {path}.")))
                }
                Err(CatalogError::IndexOutOfRange { len, .. }) => reprompt(
                    catalog,
                    session,
                    format!("❌ No file number {index}. Send a number between 1 and {len}."),
                ),
                Err(e) => Err(e.into()),
            }
        }

        Step::ConfirmDelete => {
            if labels::is_no(text) {
                return Ok(finish(session, caller, "Cancelled. Nothing was deleted."));
            }
            if !labels::is_yes(text) {
                return reprompt(catalog, session, "❌ Please confirm with the buttons.");
            }
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let message = if mode == Mode::DeletePublisher {
                let publisher = selected(sel.publisher.as_ref(), NodeKind::Publisher)?;
                let removed = catalog.delete_publisher(exam, subject, publisher)?;
                format!(
                    "✅ Publisher '{publisher}' deleted ({} file(s) removed).",
                    removed.file_count()
                )
            } else {
                catalog.delete_subject(exam, subject)?;
                format!("✅ Subject '{subject}' deleted from {exam}.")
            };
            Ok(finish(session, caller, message).saving(true))
        }

        Step::AwaitBroadcast => {
            if text.is_empty() || text.starts_with('/') {
                return reprompt(catalog, session, "❌ Send the text to broadcast.");
            }
            let users = catalog.meta.users.len();
            let mut outcome = finish(session, caller, format!("📢 Broadcasting to {users} user(s)..."));
            outcome.broadcast = Some(text.to_owned());
            Ok(outcome)
        }
    }
}

fn choose_file(catalog: &CatalogRoot, session: &mut SessionState, text: &str) -> StepResult {
    let path = current_path(session)?;
    let files = catalog.files(&path)?;
    let pages = page_count(files.len());

    if labels::is_label(text, NEXT_PAGE) && session.flags.page + 1 < pages {
        session.flags.page += 1;
        return prompt(catalog, session);
    }
    if labels::is_label(text, PREV_PAGE) && session.flags.page > 0 {
        session.flags.page -= 1;
        return prompt(catalog, session);
    }

    let by_number = text
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=files.len()).contains(n))
        .map(|n| n - 1);
    let by_name = || {
        let names: Vec<String> = files.iter().map(|f| f.display_name.clone()).collect();
        match_name(&names, text).and_then(|name| names.iter().position(|n| n == name))
    };

    match by_number.or_else(by_name).and_then(|i| files.get(i)) {
        Some(record) => Ok(Outcome::reply(OutgoingMessage::file(record.clone()))),
        None => reprompt(
            catalog,
            session,
            "❌ Invalid file. Choose a file from the buttons or send its number.",
        ),
    }
}

fn page_count(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE).max(1)
}

/// The prompt for the session's current step.
fn prompt(catalog: &CatalogRoot, session: &SessionState) -> StepResult {
    let (Some(mode), Some(step)) = (session.mode, session.step) else {
        return Ok(Outcome::default());
    };
    let sel = &session.selection;
    let nav = labels::nav_row(back_target(catalog, session).is_some());

    let message = match step {
        Step::ChooseExam => choice(
            "📚 Select an exam:",
            "📭 No exams yet.",
            &catalog.list_exams(),
            &[],
            &nav,
        ),

        Step::ChooseSubject => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            choice(
                &format!("📖 {exam}: select a subject:"),
                &format!("📭 No subjects in {exam} yet."),
                &catalog.list_subjects(exam)?,
                &[],
                &nav,
            )
        }

        Step::ChoosePublisher => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let actions: &[&str] = if mode.can_create_publisher() {
                &[ADD_PUBLISHER]
            } else {
                &[]
            };
            choice(
                &format!("🏢 {exam} › {subject}: select a publisher:"),
                &format!("📭 No publishers in {exam} › {subject} yet."),
                &catalog.list_publishers(exam, subject)?,
                actions,
                &nav,
            )
        }

        Step::AskPublisherName => {
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            ask(&format!("✏️ Send the name of the new publisher for {subject}:"), &nav)
        }

        Step::ChooseFolder => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let publisher = selected(sel.publisher.as_ref(), NodeKind::Publisher)?;
            choice(
                &format!("📁 {publisher}: select a folder:"),
                &format!("📭 {publisher} has no folders yet."),
                &catalog.list_folders(exam, subject, publisher)?,
                &[],
                &nav,
            )
        }

        Step::AskFolderName => {
            let publisher = selected(sel.publisher.as_ref(), NodeKind::Publisher)?;
            ask(&format!("✏️ Send the name of the new folder in {publisher}:"), &nav)
        }

        Step::AskSubjectName => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            ask(&format!("✏️ Send the name of the new subject for {exam}:"), &nav)
        }

        Step::ChooseFile => {
            let path = current_path(session)?;
            file_page(&path, catalog.files(&path)?, session.flags.page, &nav)
        }

        Step::AwaitUploads => {
            let path = current_path(session)?;
            OutgoingMessage::with_keyboard(
                format!("📤 Send documents, photos or videos for {path}.\nSend {DONE} when finished."),
                Keyboard::default().row(&[DONE]).row(&nav),
            )
        }

        Step::AwaitFileNumber => {
            let path = current_path(session)?;
            let files = catalog.files(&path)?;
            let text = if files.is_empty() {
                format!("📭 No files in {path}.")
            } else {
                format!(
                    "🗑 Files in {path}:\n\n{}\n\nSend the number of the file to delete.",
                    numbered(files, 0)
                )
            };
            ask(&text, &nav)
        }

        Step::ConfirmDelete => {
            let exam = selected(sel.exam.as_ref(), NodeKind::Exam)?;
            let subject = selected(sel.subject.as_ref(), NodeKind::Subject)?;
            let target = match &sel.publisher {
                Some(publisher) if mode == Mode::DeletePublisher => {
                    format!("publisher '{publisher}' from {exam} › {subject}")
                }
                _ => format!("subject '{subject}' from {exam}"),
            };
            OutgoingMessage::with_keyboard(
                format!("⚠️ Delete {target} with all its files? This cannot be undone."),
                Keyboard::default().row(&[CONFIRM_YES, CONFIRM_NO]).row(&nav),
            )
        }

        Step::AwaitBroadcast => ask(
            &format!(
                "📢 Send the message to broadcast to all {} user(s).",
                catalog.meta.users.len()
            ),
            &nav,
        ),
    };

    Ok(Outcome::reply(message))
}

fn choice(
    title: &str,
    empty: &str,
    options: &[String],
    actions: &[&str],
    nav: &[&str],
) -> OutgoingMessage {
    let text = if options.is_empty() { empty } else { title };
    OutgoingMessage::with_keyboard(
        text,
        Keyboard::grid(options, 2).row(actions).row(nav),
    )
}

fn ask(text: &str, nav: &[&str]) -> OutgoingMessage {
    OutgoingMessage::with_keyboard(text, Keyboard::default().row(nav))
}

fn numbered(files: &[FileRecord], offset: usize) -> String {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. {} ({})", offset + i + 1, f.display_name, f.kind))
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_page(path: &CatalogPath, files: &[FileRecord], page: usize, nav: &[&str]) -> OutgoingMessage {
    if files.is_empty() {
        return ask(&format!("📭 No files in {path} yet."), nav);
    }

    let pages = page_count(files.len());
    let page = page.min(pages - 1);
    let start = page * PAGE_SIZE;
    let shown = &files[start..files.len().min(start + PAGE_SIZE)];

    let mut paging = Vec::new();
    if page > 0 {
        paging.push(PREV_PAGE);
    }
    if page + 1 < pages {
        paging.push(NEXT_PAGE);
    }

    let names: Vec<&str> = shown.iter().map(|f| f.display_name.as_str()).collect();
    OutgoingMessage::with_keyboard(
        format!(
            "📄 {path} (page {}/{pages}):\n\n{}\n\nChoose a file or send its number.",
            page + 1,
            numbered(shown, start)
        ),
        Keyboard::grid(&names, 1).row(&paging).row(nav),
    )
}
