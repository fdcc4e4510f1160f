//! Reservation commands: create, list, delete and watch.

use std::error::Error;
use std::io::{self, BufRead, Write};

use chrono::Local;
use clap::Args;
use myreservation_core::{
    FeedView, Locale, Reservation, ReservationDraft, ReservationFeed, ReservationForm,
    ServiceCategory, SessionContext, SessionGate, UiText,
};

use super::{is_yes, prompt, OutputFormat};
use crate::backend::Backend;
use crate::config::Config;

const NOT_SIGNED_IN: &str = "Not signed in. Run 'resv auth login --remember' first.";

/// Book a new appointment
#[derive(Args)]
pub struct NewCommand {
    /// Service (cut, color, perm, treatment)
    #[arg(long, short)]
    service: ServiceCategory,

    /// Date (YYYY-MM-DD)
    #[arg(long, short)]
    date: String,

    /// Time (HH:MM)
    #[arg(long, short)]
    time: String,
}

/// List your reservations, newest date first
#[derive(Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Delete one of your reservations
#[derive(Args)]
pub struct DeleteCommand {
    /// Reservation ID
    id: String,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

/// Follow your reservations as they change
#[derive(Args)]
pub struct WatchCommand {}

impl NewCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let ctx = require_session(&backend).await?;
        let draft = ReservationDraft::new(self.service, self.date.as_str(), self.time.as_str());
        create(&ctx, draft, config.locale.value, &mut io::stdout()).await
    }
}

impl ListCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let ctx = require_session(&backend).await?;
        list(&ctx, self.format, config.locale.value, &mut io::stdout()).await
    }
}

impl DeleteCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let ctx = require_session(&backend).await?;
        let stdin = io::stdin();
        delete(
            &ctx,
            &self.id,
            self.yes,
            config.locale.value,
            &mut stdin.lock(),
            &mut io::stdout(),
        )
        .await
    }
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        let backend = Backend::connect(config).await?;
        let ctx = require_session(&backend).await?;
        watch(&ctx, config.locale.value, &mut io::stdout()).await
    }
}

/// The signed-in scope, or an error telling the user to sign in.
pub(crate) async fn require_session(backend: &Backend) -> Result<SessionContext, Box<dyn Error>> {
    backend.verify_session().await;
    SessionGate::new(backend.provider())
        .context(backend.store())
        .ok_or_else(|| NOT_SIGNED_IN.into())
}

pub(crate) async fn create<W: Write>(
    ctx: &SessionContext,
    draft: ReservationDraft,
    locale: Locale,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let mut form = ReservationForm::new();
    form.draft = draft;

    let write = form
        .submit(ctx)
        .await
        .map_err(|message| message.text(locale))?;

    writeln!(out, "{}", UiText::ReservationCompleted.text(locale))?;
    writeln!(out, "  ID: {}", write.id)?;
    Ok(())
}

/// Opens a feed and waits for its first snapshot.
async fn open_feed(ctx: &SessionContext) -> Result<ReservationFeed, Box<dyn Error>> {
    let mut feed = ReservationFeed::open(ctx).await?;
    match feed.next_snapshot().await {
        Some(Ok(())) => Ok(feed),
        Some(Err(e)) => {
            feed.close();
            Err(e.into())
        }
        None => Err("Reservation subscription closed".into()),
    }
}

pub(crate) async fn list<W: Write>(
    ctx: &SessionContext,
    format: OutputFormat,
    locale: Locale,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let feed = open_feed(ctx).await?;
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(feed.reservations())?)?;
        }
        OutputFormat::Text => write_feed(&feed, locale, out)?,
    }
    feed.close();
    Ok(())
}

pub(crate) async fn delete<R: BufRead, W: Write>(
    ctx: &SessionContext,
    id: &str,
    yes: bool,
    locale: Locale,
    input: &mut R,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let feed = open_feed(ctx).await?;
    let result = delete_listed(&feed, id, yes, locale, input, out).await;
    feed.close();
    result
}

async fn delete_listed<R: BufRead, W: Write>(
    feed: &ReservationFeed,
    id: &str,
    yes: bool,
    locale: Locale,
    input: &mut R,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let pending = feed.request_delete(id)?;

    if !yes {
        write_reservation(out, None, pending.reservation(), locale)?;
        let answer = prompt(
            input,
            out,
            &format!("{} [y/N] ", UiText::ConfirmDelete.text(locale)),
        )?;
        if !is_yes(&answer) {
            pending.cancel();
            writeln!(out, "Cancelled.")?;
            return Ok(());
        }
    }

    pending.confirm().await?;
    writeln!(out, "Deleted reservation: {}", id)?;
    Ok(())
}

pub(crate) async fn watch<W: Write>(
    ctx: &SessionContext,
    locale: Locale,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let mut feed = ReservationFeed::open(ctx).await?;
    writeln!(out, "{}", UiText::Loading.text(locale))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = feed.next_snapshot() => match next {
                Some(Ok(())) => {
                    writeln!(out, "--- {}", Local::now().format("%H:%M:%S"))?;
                    write_feed(&feed, locale, out)?;
                }
                Some(Err(e)) => {
                    writeln!(out, "{}{}", UiText::ErrorPrefix.text(locale), e)?;
                }
                None => break,
            },
        }
        out.flush()?;
    }

    feed.close();
    Ok(())
}

/// Renders the feed: loading text, the empty placeholder or numbered rows.
pub(crate) fn write_feed<W: Write>(
    feed: &ReservationFeed,
    locale: Locale,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "{}", UiText::ReservationList.text(locale))?;
    match feed.view() {
        FeedView::Loading => writeln!(out, "  {}", UiText::Loading.text(locale)),
        FeedView::Empty => writeln!(out, "  {}", UiText::NoReservations.text(locale)),
        FeedView::Reservations(list) => {
            for (i, reservation) in list.iter().enumerate() {
                write_reservation(out, Some(i + 1), reservation, locale)?;
            }
            Ok(())
        }
    }
}

fn write_reservation<W: Write>(
    out: &mut W,
    number: Option<usize>,
    r: &Reservation,
    locale: Locale,
) -> io::Result<()> {
    let prefix = match number {
        Some(n) => format!("{:>3}.", n),
        None => "    ".to_string(),
    };
    writeln!(
        out,
        "{} {} {}  {}  [{}]  {}",
        prefix,
        r.date,
        r.time,
        r.service.label(locale),
        r.status.label(locale),
        r.id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use myreservation_core::models::{field, COLLECTION};
    use myreservation_core::{IdentityProvider, MemoryBackend};

    async fn signed_in() -> (MemoryBackend, SessionContext) {
        let memory = MemoryBackend::new().with_owner_rule(COLLECTION, field::USER_ID);
        memory.restore();
        memory.add_account("hanako@example.com", "secret1");
        memory
            .sign_in("hanako@example.com", "secret1")
            .await
            .unwrap();
        let ctx = require_session(&Backend::memory(&memory)).await.unwrap();
        (memory, ctx)
    }

    async fn book(ctx: &SessionContext, date: &str) -> String {
        let mut out = Vec::new();
        create(
            ctx,
            ReservationDraft::new(ServiceCategory::Cut, date, "10:00"),
            Locale::En,
            &mut out,
        )
        .await
        .unwrap();
        let out = String::from_utf8(out).unwrap();
        out.lines()
            .find_map(|line| line.trim().strip_prefix("ID: "))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_require_session_when_signed_out() {
        let memory = MemoryBackend::new();
        memory.restore();

        let err = require_session(&Backend::memory(&memory)).await.unwrap_err();

        assert_eq!(err.to_string(), NOT_SIGNED_IN);
    }

    #[tokio::test]
    async fn test_create_stores_pending_reservation() {
        let (memory, ctx) = signed_in().await;

        let id = book(&ctx, "2024-03-15").await;

        let docs = memory.documents(COLLECTION);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].get_str(field::STATUS), Some("pending"));
        assert_eq!(docs[0].get_str(field::SERVICE), Some("カット"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_date() {
        let (memory, ctx) = signed_in().await;

        let err = create(
            &ctx,
            ReservationDraft::new(ServiceCategory::Perm, "15/03/2024", "10:00"),
            Locale::En,
            &mut Vec::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Date must be YYYY-MM-DD: 15/03/2024");
        assert!(memory.documents(COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn test_list_text_and_empty() {
        let (_memory, ctx) = signed_in().await;
        let mut out = Vec::new();
        list(&ctx, OutputFormat::Text, Locale::Ja, &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "予約一覧\n  予約がありません\n");

        let older = book(&ctx, "2024-01-10").await;
        let newer = book(&ctx, "2024-03-15").await;
        let mut out = Vec::new();
        list(&ctx, OutputFormat::Text, Locale::En, &mut out)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            format!("  1. 2024-03-15 10:00  Cut  [Pending]  {}", newer)
        );
        assert!(lines[2].ends_with(&older));
    }

    #[tokio::test]
    async fn test_list_json() {
        let (_memory, ctx) = signed_in().await;
        let id = book(&ctx, "2024-03-15").await;
        let mut out = Vec::new();

        list(&ctx, OutputFormat::Json, Locale::En, &mut out)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[0]["id"], id.as_str());
        assert_eq!(json[0]["userEmail"], "hanako@example.com");
        assert_eq!(json[0]["service"], "カット");
        assert_eq!(json[0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_delete_asks_first() {
        let (memory, ctx) = signed_in().await;
        let id = book(&ctx, "2024-03-15").await;

        let mut out = Vec::new();
        delete(&ctx, &id, false, Locale::En, &mut "n\n".as_bytes(), &mut out)
            .await
            .unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("Delete this reservation? [y/N] Cancelled."));
        assert_eq!(memory.documents(COLLECTION).len(), 1);

        delete(&ctx, &id, false, Locale::En, &mut "y\n".as_bytes(), &mut Vec::new())
            .await
            .unwrap();
        assert!(memory.documents(COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id() {
        let (_memory, ctx) = signed_in().await;

        let err = delete(&ctx, "nope", true, Locale::En, &mut "".as_bytes(), &mut Vec::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Reservation not found: nope");
    }
}
