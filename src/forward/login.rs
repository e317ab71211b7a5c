//! Phone-number login of a user account, one flow per bot user.

use thiserror::Error;
use tracing::{info, warn};

use crate::telegram::{AccountLogin, SignInFailure, TransportError, redact_phone};

/// Code or password attempts before the flow starts over.
pub const MAX_ATTEMPTS: u32 = 3;

/// Prefix users may put in front of the code so Telegram does not
/// recognise it as a shared login code.
const CODE_PREFIX: &str = "AUTOX";

/// Errors that end or block a login step.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Send /login <phone> first.")]
    NotStarted,

    #[error("'{0}' does not look like a phone number. Use the international format, e.g. +15551234567.")]
    InvalidPhone(String),

    #[error("A code is expected now, not a password.")]
    CodeExpected,

    #[error("Your account has two-step verification. Send /password <password>.")]
    PasswordExpected,

    #[error("No password is expected now.")]
    PasswordNotExpected,

    #[error("Too many wrong attempts. Start again with /login.")]
    TooManyAttempts,

    #[error("Login failed: {0}. Start again with /login.")]
    Failed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the user has to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    CodeSent,
    WrongCode { remaining: u32 },
    PasswordRequired,
    WrongPassword { remaining: u32 },
    LoggedIn,
}

enum Stage<L: AccountLogin> {
    AwaitPhone,
    AwaitCode {
        phone: String,
        token: L::CodeToken,
        attempts: u32,
    },
    AwaitPassword {
        token: L::PasswordToken,
        attempts: u32,
    },
    Done,
}

/// Tracks where one user is in the login dialogue.
pub struct LoginFlow<L: AccountLogin> {
    stage: Stage<L>,
}

impl<L: AccountLogin> Default for LoginFlow<L> {
    fn default() -> Self {
        Self {
            stage: Stage::AwaitPhone,
        }
    }
}

impl<L: AccountLogin> LoginFlow<L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    pub fn reset(&mut self) {
        self.stage = Stage::AwaitPhone;
    }

    /// Requests a login code for `phone`. Restarts any flow in progress.
    pub async fn start(&mut self, login: &L, phone: &str) -> Result<LoginStep, LoginError> {
        self.reset();
        let phone = normalize_phone(phone).ok_or_else(|| LoginError::InvalidPhone(phone.to_owned()))?;

        let token = login.request_code(&phone).await?;
        info!("Login code sent to {}", redact_phone(&phone));
        self.stage = Stage::AwaitCode {
            phone,
            token,
            attempts: 0,
        };
        Ok(LoginStep::CodeSent)
    }

    /// Signs in with the code the user received.
    pub async fn submit_code(&mut self, login: &L, code: &str) -> Result<LoginStep, LoginError> {
        let (phone, token, attempts) = match std::mem::replace(&mut self.stage, Stage::AwaitPhone) {
            Stage::AwaitCode {
                phone,
                token,
                attempts,
            } => (phone, token, attempts),
            other => {
                let err = if matches!(other, Stage::AwaitPassword { .. }) {
                    LoginError::PasswordExpected
                } else {
                    LoginError::NotStarted
                };
                self.stage = other;
                return Err(err);
            }
        };

        match login.sign_in(&token, code).await {
            Ok(()) => {
                info!("Account {} logged in", redact_phone(&phone));
                self.stage = Stage::Done;
                Ok(LoginStep::LoggedIn)
            }
            Err(SignInFailure::PasswordRequired(token)) => {
                self.stage = Stage::AwaitPassword { token, attempts: 0 };
                Ok(LoginStep::PasswordRequired)
            }
            Err(SignInFailure::InvalidCode | SignInFailure::InvalidPassword(_)) => {
                let attempts = attempts + 1;
                if attempts >= MAX_ATTEMPTS {
                    warn!("Too many wrong codes for {}", redact_phone(&phone));
                    return Err(LoginError::TooManyAttempts);
                }
                self.stage = Stage::AwaitCode {
                    phone,
                    token,
                    attempts,
                };
                Ok(LoginStep::WrongCode {
                    remaining: MAX_ATTEMPTS - attempts,
                })
            }
            Err(SignInFailure::Failed(reason)) => {
                warn!("Sign-in for {} failed: {}", redact_phone(&phone), reason);
                Err(LoginError::Failed(reason))
            }
        }
    }

    /// Completes a two-step-verification login.
    pub async fn submit_password(&mut self, login: &L, password: &str) -> Result<LoginStep, LoginError> {
        let (token, attempts) = match std::mem::replace(&mut self.stage, Stage::AwaitPhone) {
            Stage::AwaitPassword { token, attempts } => (token, attempts),
            other => {
                let err = if matches!(other, Stage::AwaitCode { .. }) {
                    LoginError::CodeExpected
                } else {
                    LoginError::PasswordNotExpected
                };
                self.stage = other;
                return Err(err);
            }
        };

        match login.check_password(token, password).await {
            Ok(()) => {
                self.stage = Stage::Done;
                Ok(LoginStep::LoggedIn)
            }
            Err(SignInFailure::InvalidPassword(token) | SignInFailure::PasswordRequired(token)) => {
                let attempts = attempts + 1;
                if attempts >= MAX_ATTEMPTS {
                    warn!("Too many wrong passwords");
                    return Err(LoginError::TooManyAttempts);
                }
                self.stage = Stage::AwaitPassword { token, attempts };
                Ok(LoginStep::WrongPassword {
                    remaining: MAX_ATTEMPTS - attempts,
                })
            }
            Err(SignInFailure::InvalidCode) => Err(LoginError::Failed("code rejected".to_owned())),
            Err(SignInFailure::Failed(reason)) => Err(LoginError::Failed(reason)),
        }
    }
}

impl<L: AccountLogin> std::fmt::Debug for LoginFlow<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self.stage {
            Stage::AwaitPhone => "await_phone",
            Stage::AwaitCode { .. } => "await_code",
            Stage::AwaitPassword { .. } => "await_password",
            Stage::Done => "done",
        };
        f.debug_struct("LoginFlow").field("stage", &stage).finish()
    }
}

/// Extracts the digits of a login code from `/code 12 345` or
/// `AUTOX12-345`. Returns `None` for anything else.
#[must_use]
pub fn parse_code(text: &str) -> Option<String> {
    let text = text.trim();
    let rest = if let Some(rest) = text.strip_prefix("/code") {
        rest
    } else if text.len() >= CODE_PREFIX.len()
        && text.is_char_boundary(CODE_PREFIX.len())
        && text[..CODE_PREFIX.len()].eq_ignore_ascii_case(CODE_PREFIX)
    {
        &text[CODE_PREFIX.len()..]
    } else {
        return None;
    };

    let mut digits = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '\t' => {}
            _ => return None,
        }
    }
    (4..=8).contains(&digits.len()).then_some(digits)
}

/// Strips spaces, dashes and parentheses; requires 7 to 15 digits with an
/// optional leading `+`.
fn normalize_phone(phone: &str) -> Option<String> {
    let cleaned: String = phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let valid = (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    valid.then(|| format!("+{digits}"))
}
