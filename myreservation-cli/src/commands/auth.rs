//! Authentication commands for the resv CLI.
//!
//! Sign-in, sign-up, sign-out, status and password reset against the
//! configured identity provider.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Args, Subcommand};
use myreservation_core::{
    AuthState, CredentialForm, IdentityProvider, Locale, Mode, Persistence, User,
};

use super::prompt;
use crate::backend::Backend;
use crate::config::Config;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Sign in with email and password
    Login(CredentialArgs),
    /// Create an account and sign in
    Signup(CredentialArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show who is signed in
    Status,
    /// Email a password reset link
    ResetPassword {
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args)]
struct CredentialArgs {
    /// Email address (prompted if omitted)
    #[arg(long)]
    email: Option<String>,
    /// Keep the session after this command exits
    #[arg(long)]
    remember: bool,
}

impl CredentialArgs {
    fn persistence(&self) -> Persistence {
        if self.remember {
            Persistence::Durable
        } else {
            Persistence::Ephemeral
        }
    }
}

impl AuthCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let locale = config.locale.value;
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout();

        match &self.command {
            AuthSubcommand::Login(args) => {
                login(
                    backend.provider(),
                    Mode::SignIn,
                    args.email.as_deref(),
                    args.persistence(),
                    locale,
                    &mut input,
                    &mut out,
                )
                .await?;
            }
            AuthSubcommand::Signup(args) => {
                login(
                    backend.provider(),
                    Mode::SignUp,
                    args.email.as_deref(),
                    args.persistence(),
                    locale,
                    &mut input,
                    &mut out,
                )
                .await?;
            }
            AuthSubcommand::Logout => {
                backend.provider().sign_out().await;
                writeln!(out, "Signed out.")?;
            }
            AuthSubcommand::Status => {
                backend.verify_session().await;
                status(backend.provider().as_ref(), &mut out)?;
            }
            AuthSubcommand::ResetPassword { email } => {
                reset_password(
                    backend.provider(),
                    email.as_deref(),
                    locale,
                    &mut input,
                    &mut out,
                )
                .await?;
            }
        }
        Ok(())
    }
}

/// Prompts for whatever is missing and submits the credential form.
pub(crate) async fn login<R: BufRead, W: Write>(
    provider: Arc<dyn IdentityProvider>,
    mode: Mode,
    email: Option<&str>,
    persistence: Persistence,
    locale: Locale,
    input: &mut R,
    out: &mut W,
) -> Result<User, Box<dyn Error>> {
    let email = match email {
        Some(email) => email.to_string(),
        None => prompt(input, out, "Email: ")?,
    };
    let password = prompt(input, out, "Password (shown as typed): ")?;

    let mut form = CredentialForm::new(provider);
    if mode != form.mode() {
        form.toggle_mode();
    }
    form.set_persistence(persistence);

    let user = form
        .submit(&email, &password)
        .await
        .map_err(|message| message.text(locale))?;

    writeln!(out, "Signed in as {}", user.email)?;
    if persistence == Persistence::Ephemeral {
        writeln!(
            out,
            "Note: this session ends when the command exits. Use --remember to stay signed in."
        )?;
    }
    Ok(user)
}

pub(crate) async fn reset_password<R: BufRead, W: Write>(
    provider: Arc<dyn IdentityProvider>,
    email: Option<&str>,
    locale: Locale,
    input: &mut R,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let email = match email {
        Some(email) => email.to_string(),
        None => prompt(input, out, "Email: ")?,
    };

    let mut form = CredentialForm::new(provider);
    form.request_password_reset(&email)
        .await
        .map_err(|message| message.text(locale))?;

    if let Some(notice) = form.notice() {
        writeln!(out, "{}", notice.text(locale))?;
    }
    Ok(())
}

pub(crate) fn status<W: Write>(provider: &dyn IdentityProvider, out: &mut W) -> io::Result<()> {
    match &*provider.auth_state().borrow() {
        AuthState::SignedIn(user) => writeln!(out, "Signed in as {} ({})", user.email, user.uid),
        AuthState::SignedOut => writeln!(
            out,
            "Not signed in. Run 'resv auth login --remember' to sign in."
        ),
        AuthState::Unknown => writeln!(out, "Session state unknown."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myreservation_core::MemoryBackend;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.restore();
        backend.add_account("hanako@example.com", "secret1");
        backend
    }

    #[tokio::test]
    async fn test_login_prompts_for_email_and_password() {
        let backend = backend();
        let mut input = "hanako@example.com\nsecret1\n".as_bytes();
        let mut out = Vec::new();

        let user = login(
            Arc::new(backend.clone()),
            Mode::SignIn,
            None,
            Persistence::Ephemeral,
            Locale::Ja,
            &mut input,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(user.email, "hanako@example.com");
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(
            "Email: Password (shown as typed): Signed in as hanako@example.com"
        ));
        assert!(out.contains("--remember"));
    }

    #[tokio::test]
    async fn test_login_failure_is_localized() {
        let backend = backend();
        let mut input = "wrong\n".as_bytes();
        let mut out = Vec::new();

        let err = login(
            Arc::new(backend),
            Mode::SignIn,
            Some("hanako@example.com"),
            Persistence::Durable,
            Locale::Ja,
            &mut input,
            &mut out,
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "メールアドレスまたはパスワードが正しくありません"
        );
    }

    #[tokio::test]
    async fn test_signup_with_remember_survives_restart() {
        let backend = backend();
        let mut input = "secret1\n".as_bytes();
        let mut out = Vec::new();

        login(
            Arc::new(backend.clone()),
            Mode::SignUp,
            Some("new@example.com"),
            Persistence::Durable,
            Locale::En,
            &mut input,
            &mut out,
        )
        .await
        .unwrap();

        let restarted = backend.restart();
        restarted.restore();
        let mut out = Vec::new();
        status(&restarted, &mut out).unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("Signed in as new@example.com"));
    }

    #[tokio::test]
    async fn test_reset_password_messages() {
        let backend = backend();
        let mut out = Vec::new();

        reset_password(
            Arc::new(backend.clone()),
            Some("hanako@example.com"),
            Locale::En,
            &mut "".as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Password reset email sent. Please check your inbox.\n"
        );

        let err = reset_password(
            Arc::new(backend.clone()),
            None,
            Locale::Ja,
            &mut "\n".as_bytes(),
            &mut Vec::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "メールアドレスを入力してください");
        assert_eq!(backend.password_reset_requests().len(), 1);
    }

    #[test]
    fn test_status_signed_out() {
        let backend = backend();
        let mut out = Vec::new();
        status(&backend, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Not signed in."));
    }
}
