//! User-facing text.
//!
//! Every message the components produce is a value of one of the enums below;
//! rendering to a string happens only at the edge, in the chosen [`Locale`].

use serde::{Deserialize, Serialize};

use crate::auth::AuthErrorCode;

/// Language for rendered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locale::Ja => write!(f, "ja"),
            Locale::En => write!(f, "en"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ja" => Ok(Locale::Ja),
            "en" => Ok(Locale::En),
            other => Err(format!("Unknown locale '{}' (expected ja or en)", other)),
        }
    }
}

/// Messages shown by the credential form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMessage {
    InvalidCredential,
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmail,
    UserNotFound,
    /// Fallback for provider codes without a dedicated message.
    Unknown,
    EmailRequired,
    PasswordRequired,
    ResetEmailSent,
    EmailNotRegistered,
    ResetFailed,
}

impl AuthMessage {
    /// Message for a failed sign-in or sign-up.
    pub fn for_sign_in(code: &AuthErrorCode) -> Self {
        match code {
            AuthErrorCode::InvalidCredential => AuthMessage::InvalidCredential,
            AuthErrorCode::EmailAlreadyInUse => AuthMessage::EmailAlreadyInUse,
            AuthErrorCode::WeakPassword => AuthMessage::WeakPassword,
            AuthErrorCode::InvalidEmail => AuthMessage::InvalidEmail,
            AuthErrorCode::UserNotFound => AuthMessage::UserNotFound,
            AuthErrorCode::Network | AuthErrorCode::Other(_) => AuthMessage::Unknown,
        }
    }

    /// Message for a failed password reset request.
    pub fn for_password_reset(code: &AuthErrorCode) -> Self {
        match code {
            AuthErrorCode::UserNotFound => AuthMessage::EmailNotRegistered,
            AuthErrorCode::InvalidEmail => AuthMessage::InvalidEmail,
            _ => AuthMessage::ResetFailed,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, AuthMessage::ResetEmailSent)
    }

    pub fn text(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ja => match self {
                AuthMessage::InvalidCredential => {
                    "メールアドレスまたはパスワードが正しくありません"
                }
                AuthMessage::EmailAlreadyInUse => "このメールアドレスは既に使用されています",
                AuthMessage::WeakPassword => "パスワードは6文字以上で設定してください",
                AuthMessage::InvalidEmail => "メールアドレスの形式が正しくありません",
                AuthMessage::UserNotFound => "ユーザーが見つかりません",
                AuthMessage::Unknown => "エラーが発生しました",
                AuthMessage::EmailRequired => "メールアドレスを入力してください",
                AuthMessage::PasswordRequired => "パスワードを入力してください",
                AuthMessage::ResetEmailSent => {
                    "パスワードリセットメールを送信しました。メールをご確認ください。"
                }
                AuthMessage::EmailNotRegistered => "このメールアドレスは登録されていません",
                AuthMessage::ResetFailed => "メール送信に失敗しました",
            },
            Locale::En => match self {
                AuthMessage::InvalidCredential => "Incorrect email address or password",
                AuthMessage::EmailAlreadyInUse => "This email address is already in use",
                AuthMessage::WeakPassword => "Password must be at least 6 characters",
                AuthMessage::InvalidEmail => "Email address is not valid",
                AuthMessage::UserNotFound => "User not found",
                AuthMessage::Unknown => "An error occurred",
                AuthMessage::EmailRequired => "Please enter your email address",
                AuthMessage::PasswordRequired => "Please enter your password",
                AuthMessage::ResetEmailSent => {
                    "Password reset email sent. Please check your inbox."
                }
                AuthMessage::EmailNotRegistered => "This email address is not registered",
                AuthMessage::ResetFailed => "Failed to send email",
            },
        }
    }
}

/// Fixed interface labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiText {
    Loading,
    AppTitle,
    SignIn,
    SignUp,
    SignOut,
    SwitchToSignUp,
    SwitchToSignIn,
    RememberMe,
    ForgotPassword,
    NewReservation,
    ReservationList,
    NoReservations,
    ConfirmDelete,
    /// The live reservation list ended and will not update again.
    FeedStopped,
    ReservationCompleted,
    ErrorPrefix,
}

impl UiText {
    pub fn text(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ja => match self {
                UiText::Loading => "読み込み中...",
                UiText::AppTitle => "予約システム",
                UiText::SignIn => "LOGIN",
                UiText::SignUp => "SIGN UP",
                UiText::SignOut => "ログアウト",
                UiText::SwitchToSignUp => "Don't have an account? Sign up",
                UiText::SwitchToSignIn => "Already have an account? Login",
                UiText::RememberMe => "ログイン状態を保持",
                UiText::ForgotPassword => "パスワードを忘れた？",
                UiText::NewReservation => "新規予約",
                UiText::ReservationList => "予約一覧",
                UiText::NoReservations => "予約がありません",
                UiText::ConfirmDelete => "この予約を削除しますか？",
                UiText::FeedStopped => "予約一覧の更新が停止しました。再度ログインしてください",
                UiText::ReservationCompleted => "予約が完了しました！",
                UiText::ErrorPrefix => "エラー: ",
            },
            Locale::En => match self {
                UiText::Loading => "Loading...",
                UiText::AppTitle => "Reservations",
                UiText::SignIn => "LOGIN",
                UiText::SignUp => "SIGN UP",
                UiText::SignOut => "Sign out",
                UiText::SwitchToSignUp => "Don't have an account? Sign up",
                UiText::SwitchToSignIn => "Already have an account? Login",
                UiText::RememberMe => "Keep me signed in",
                UiText::ForgotPassword => "Forgot password?",
                UiText::NewReservation => "New reservation",
                UiText::ReservationList => "Your reservations",
                UiText::NoReservations => "No reservations",
                UiText::ConfirmDelete => "Delete this reservation?",
                UiText::FeedStopped => {
                    "The reservation list stopped updating. Please sign in again"
                }
                UiText::ReservationCompleted => "Reservation completed!",
                UiText::ErrorPrefix => "Error: ",
            },
        }
    }
}
