//! Interactive shell.
//!
//! Shows the login screen or the reservation screen depending on the
//! session, and keeps the reservation list live while signed in.

use std::error::Error;
use std::io::{self, Write};

use clap::Args;
use myreservation_core::{
    App, AppEvent, CredentialForm, FeedView, Home, Locale, Mode, Persistence, ReservationDraft,
    ServiceCategory, StoreError, UiText, View,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use super::is_yes;
use super::reservation::write_feed;
use crate::backend::Backend;
use crate::config::Config;

const LOGIN_HELP: &str = "Commands: login <email> <password> (password is shown as typed), \
     mode, remember [on|off], reset <email>, quit";
const HOME_HELP: &str =
    "Commands: new <service> <YYYY-MM-DD> <HH:MM>, list, delete <number|id>, logout, quit";

/// Start an interactive session
#[derive(Args)]
pub struct ShellCommand {}

impl ShellCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let input = BufReader::new(tokio::io::stdin());
        run_shell(&backend, config.locale.value, input, &mut io::stdout()).await
    }
}

enum Flow {
    Continue,
    Quit,
}

pub(crate) async fn run_shell<R, W>(
    backend: &Backend,
    locale: Locale,
    input: R,
    out: &mut W,
) -> Result<(), Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    backend.verify_session().await;
    let mut app = App::new(backend.provider(), backend.store());
    let mut lines = input.lines();
    let mut shown: Option<View> = None;

    let result = app.reconcile().await;
    show(&app, result, &mut shown, locale, out)?;
    let mut prompt_due = true;

    loop {
        if prompt_due {
            write!(out, "> ")?;
            out.flush()?;
            prompt_due = false;
        }

        tokio::select! {
            biased;
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Flow::Quit = command(&mut app, &mut lines, line.trim(), locale, out).await? {
                    break;
                }
                // A reconcile interrupted inside next_event is completed here.
                let result = app.reconcile().await;
                show(&app, result, &mut shown, locale, out)?;
                prompt_due = true;
            }
            event = app.next_event() => match event {
                Some(event) => prompt_due = on_event(&app, event, &mut shown, locale, out)?,
                None => break,
            },
        }
    }

    if app.home().is_some() {
        debug!("Leaving shell while signed in");
    }
    Ok(())
}

/// Renders the screen for `result` if it differs from what is shown.
///
/// Returns true if anything was written.
fn show<W: Write>(
    app: &App,
    result: Result<View, StoreError>,
    shown: &mut Option<View>,
    locale: Locale,
    out: &mut W,
) -> io::Result<bool> {
    match result {
        Ok(view) if shown.as_ref() == Some(&view) => Ok(false),
        Ok(view) => {
            render(app, &view, locale, out)?;
            *shown = Some(view);
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "{}{}", UiText::ErrorPrefix.text(locale), e)?;
            Ok(true)
        }
    }
}

fn on_event<W: Write>(
    app: &App,
    event: AppEvent,
    shown: &mut Option<View>,
    locale: Locale,
    out: &mut W,
) -> io::Result<bool> {
    match event {
        AppEvent::Session(result) => {
            if matches!(&result, Ok(view) if shown.as_ref() == Some(view)) {
                return Ok(false);
            }
            writeln!(out)?;
            show(app, result, shown, locale, out)
        }
        AppEvent::Feed(Ok(())) => match app.home() {
            Some(home) => {
                writeln!(out)?;
                write_feed(&home.feed, locale, out)?;
                Ok(true)
            }
            None => Ok(false),
        },
        AppEvent::Feed(Err(e)) => {
            writeln!(out, "\n{}{}", UiText::ErrorPrefix.text(locale), e)?;
            Ok(true)
        }
        AppEvent::FeedEnded => {
            debug!("Reservation feed ended");
            writeln!(
                out,
                "\n{}{}",
                UiText::ErrorPrefix.text(locale),
                UiText::FeedStopped.text(locale)
            )?;
            Ok(true)
        }
    }
}

fn render<W: Write>(app: &App, view: &View, locale: Locale, out: &mut W) -> io::Result<()> {
    let title = UiText::AppTitle.text(locale);
    match view {
        View::Loading => writeln!(out, "{}", UiText::Loading.text(locale)),
        View::SignedOut => {
            writeln!(out, "== {} ==", title)?;
            render_login(&app.login, locale, out)
        }
        View::SignedIn(user) => {
            writeln!(out, "== {} ==  {}", title, user.email)?;
            writeln!(
                out,
                "{}: new <service> <YYYY-MM-DD> <HH:MM>",
                UiText::NewReservation.text(locale)
            )?;
            let services: Vec<String> = ServiceCategory::ALL
                .iter()
                .map(|s| format!("{} ({})", s.key(), s.label(locale)))
                .collect();
            writeln!(out, "  {}", services.join(", "))?;
            if let Some(home) = app.home() {
                write_feed(&home.feed, locale, out)?;
            }
            writeln!(out, "{} (logout)", UiText::SignOut.text(locale))?;
            writeln!(out, "{}", HOME_HELP)
        }
    }
}

fn render_login<W: Write>(form: &CredentialForm, locale: Locale, out: &mut W) -> io::Result<()> {
    let (heading, switch) = match form.mode() {
        Mode::SignIn => (UiText::SignIn, UiText::SwitchToSignUp),
        Mode::SignUp => (UiText::SignUp, UiText::SwitchToSignIn),
    };
    writeln!(out, "{}", heading.text(locale))?;
    writeln!(
        out,
        "[{}] {}",
        if form.persistence() == Persistence::Durable { "x" } else { " " },
        UiText::RememberMe.text(locale)
    )?;
    writeln!(out, "{} (mode)", switch.text(locale))?;
    writeln!(out, "{} (reset <email>)", UiText::ForgotPassword.text(locale))?;
    writeln!(out, "{}", LOGIN_HELP)
}

async fn command<R, W>(
    app: &mut App,
    lines: &mut Lines<R>,
    line: &str,
    locale: Locale,
    out: &mut W,
) -> Result<Flow, Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(Flow::Continue);
    };
    let args: Vec<&str> = words.collect();

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => {
            let help = if app.home().is_some() { HOME_HELP } else { LOGIN_HELP };
            writeln!(out, "{}", help)?;
            return Ok(Flow::Continue);
        }
        "logout" if app.home().is_some() => {
            app.sign_out().await;
            return Ok(Flow::Continue);
        }
        _ => {}
    }

    match app.view() {
        View::Loading => writeln!(out, "{}", UiText::Loading.text(locale))?,
        View::SignedOut => login_command(&mut app.login, name, &args, locale, out).await?,
        View::SignedIn(_) => match app.home_mut() {
            Some(home) => home_command(home, lines, name, &args, locale, out).await?,
            None => writeln!(out, "{}", UiText::Loading.text(locale))?,
        },
    }
    Ok(Flow::Continue)
}

async fn login_command<W: Write>(
    form: &mut CredentialForm,
    name: &str,
    args: &[&str],
    locale: Locale,
    out: &mut W,
) -> io::Result<()> {
    let arg = |i: usize| args.get(i).copied().unwrap_or("");

    match name {
        "login" => {
            if let Err(message) = form.submit(arg(0), arg(1)).await {
                writeln!(out, "{}", message.text(locale))?;
            }
        }
        "mode" => {
            form.toggle_mode();
            render_login(form, locale, out)?;
        }
        "remember" => {
            let persistence = match arg(0) {
                "on" => Persistence::Durable,
                "off" => Persistence::Ephemeral,
                _ if form.persistence() == Persistence::Durable => Persistence::Ephemeral,
                _ => Persistence::Durable,
            };
            form.set_persistence(persistence);
            render_login(form, locale, out)?;
        }
        "reset" => match form.request_password_reset(arg(0)).await {
            Ok(()) => {
                if let Some(notice) = form.notice() {
                    writeln!(out, "{}", notice.text(locale))?;
                }
            }
            Err(message) => writeln!(out, "{}", message.text(locale))?,
        },
        other => writeln!(out, "Unknown command: {}. {}", other, LOGIN_HELP)?,
    }
    Ok(())
}

async fn home_command<R, W>(
    home: &mut Home,
    lines: &mut Lines<R>,
    name: &str,
    args: &[&str],
    locale: Locale,
    out: &mut W,
) -> Result<(), Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let arg = |i: usize| args.get(i).copied().unwrap_or("");

    match name {
        "new" => {
            home.form.draft = ReservationDraft {
                service: ServiceCategory::parse(arg(0)),
                date: arg(1).to_string(),
                time: arg(2).to_string(),
            };
            let message = match home.form.submit(&home.context).await {
                Ok(_) => UiText::ReservationCompleted.text(locale).to_string(),
                Err(message) => message.text(locale),
            };
            writeln!(out, "{}", message)?;
        }
        "list" => {
            wait_loaded(home, locale, out).await?;
            write_feed(&home.feed, locale, out)?;
        }
        "delete" => {
            wait_loaded(home, locale, out).await?;
            let id = resolve(home, arg(0));
            let pending = match home.feed.request_delete(&id) {
                Ok(pending) => pending,
                Err(e) => {
                    writeln!(out, "{}", e)?;
                    return Ok(());
                }
            };

            let r = pending.reservation();
            writeln!(
                out,
                "    {} {}  {}  {}",
                r.date,
                r.time,
                r.service.label(locale),
                r.id
            )?;
            write!(out, "{} [y/N] ", UiText::ConfirmDelete.text(locale))?;
            out.flush()?;

            let answer = lines.next_line().await?.unwrap_or_default();
            if is_yes(&answer) {
                match pending.confirm().await {
                    Ok(()) => writeln!(out, "Deleted reservation: {}", id)?,
                    Err(e) => writeln!(out, "{}{}", UiText::ErrorPrefix.text(locale), e)?,
                }
            } else {
                pending.cancel();
                writeln!(out, "Cancelled.")?;
            }
        }
        other => writeln!(out, "Unknown command: {}. {}", other, HOME_HELP)?,
    }
    Ok(())
}

/// Waits for the first snapshot if the feed is still loading.
async fn wait_loaded<W: Write>(home: &mut Home, locale: Locale, out: &mut W) -> io::Result<()> {
    if home.feed.is_live() && home.feed.view() == FeedView::Loading {
        if let Some(Err(e)) = home.feed.next_snapshot().await {
            writeln!(out, "{}{}", UiText::ErrorPrefix.text(locale), e)?;
        }
    }
    Ok(())
}

/// Maps a list number to its reservation ID; anything else is taken as an ID.
fn resolve(home: &Home, arg: &str) -> String {
    let listed = home.feed.reservations();
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 && n <= listed.len() => listed[n - 1].id.clone(),
        _ => arg.to_string(),
    }
}
