use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    load_settings, ComposerChannel, ComposerEvent, ComposerOrchestrator, DirectChannel, GifPhase,
    GifSearcher, HttpChatBackend, InputRef, MissingGifSearcher, NoopFocus, PendingFile, RoomChannel,
    SendOutcome,
};
use shared::domain::{RoomId, ThreadId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(about = "Send chat messages, images and /gif picks from the shell")]
struct Cli {
    /// Overrides `api_url` from composer.toml / APP__API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    /// Report that the client is offline (every send is refused).
    #[arg(long, global = true)]
    offline: bool,
    /// Disable GIF search; `/gif` drafts then fail to preview.
    #[arg(long, global = true)]
    no_gif: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post into a chat room.
    Room {
        #[arg(long)]
        room: String,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        #[command(flatten)]
        draft: DraftArgs,
    },
    /// Post into a direct-message thread.
    Direct {
        #[arg(long)]
        thread: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
}

#[derive(Args, Debug)]
struct DraftArgs {
    /// Image to attach; repeatable.
    #[arg(long = "attach", value_name = "PATH")]
    attachments: Vec<PathBuf>,
    /// Cycle the GIF preview this many times before sending a `/gif` pick.
    #[arg(long, default_value_t = 0)]
    shuffle: usize,
    /// Message text. `/gif <query>` sends a GIF.
    #[arg(trailing_var_arg = true)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_cli=info,client_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(token) = cli.token {
        settings.api_token = Some(token);
    }
    let backend = Arc::new(HttpChatBackend::from_settings(&settings)?);
    let gif_searcher: Arc<dyn GifSearcher> = if cli.no_gif {
        Arc::new(MissingGifSearcher)
    } else {
        backend.clone()
    };
    info!(api = %settings.api_base_url, "chat client ready");

    match cli.command {
        Command::Room {
            room,
            latitude,
            longitude,
            draft,
        } => {
            let mut channel = RoomChannel::new(backend.clone());
            if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
                channel = channel.with_location(latitude, longitude);
            }
            let composer = ComposerOrchestrator::new(
                channel,
                backend.clone(),
                gif_searcher,
                Arc::new(NoopFocus),
                InputRef("room-composer".into()),
                &settings,
            );
            composer.set_offline(cli.offline).await;
            compose(&composer, RoomId::new(room), draft).await
        }
        Command::Direct { thread, draft } => {
            let composer = ComposerOrchestrator::new(
                DirectChannel::new(backend.clone()),
                backend.clone(),
                gif_searcher,
                Arc::new(NoopFocus),
                InputRef("direct-composer".into()),
                &settings,
            );
            composer.set_offline(cli.offline).await;
            compose(&composer, ThreadId::new(thread), draft).await
        }
    }
}

async fn compose<C: ComposerChannel>(
    composer: &ComposerOrchestrator<C>,
    target: C::Target,
    args: DraftArgs,
) -> Result<()> {
    composer.set_target(Some(target)).await;

    if !args.attachments.is_empty() {
        if !composer.check_attachment_picker().await {
            return Err(status_error(composer).await);
        }
        let mut files = Vec::with_capacity(args.attachments.len());
        for path in &args.attachments {
            files.push(PendingFile::from_path(path).await?);
        }
        let mut events = composer.subscribe_events();
        let outcome = composer.attach_files(files).await;
        while let Ok(event) = events.try_recv() {
            if let ComposerEvent::UploadProgress(Some(progress)) = event {
                eprintln!("uploaded {}/{}", progress.completed, progress.total);
            }
        }
        info!(
            added = outcome.added,
            failed = outcome.failed,
            overflow = outcome.overflow,
            unsupported = outcome.unsupported,
            "attachments processed"
        );
        if let Some(status) = composer.status().await {
            eprintln!("{}", status.message);
        }
    }

    composer.set_draft(args.message.join(" ")).await;
    let mut outcome = composer.send().await;

    if outcome == SendOutcome::PreviewRequested {
        let snapshot = composer.gif_snapshot().await;
        if snapshot.phase != GifPhase::Ready {
            bail!(snapshot
                .message
                .unwrap_or_else(|| "GIF preview unavailable.".to_string()));
        }
        for _ in 0..args.shuffle {
            composer.shuffle_gif().await;
        }
        if let Some(option) = composer
            .gif_snapshot()
            .await
            .preview
            .as_ref()
            .and_then(|preview| preview.selected())
        {
            eprintln!("sending {}", option.attachment.url);
        }
        outcome = composer.confirm_gif().await;
    }

    match outcome {
        SendOutcome::Sent { gif } => {
            println!("sent{}", if gif { " (gif)" } else { "" });
            Ok(())
        }
        SendOutcome::Ignored => bail!("nothing to send"),
        SendOutcome::Blocked | SendOutcome::Failed => Err(status_error(composer).await),
        SendOutcome::PreviewRequested | SendOutcome::AwaitingPreview => {
            bail!("GIF preview did not settle")
        }
    }
}

async fn status_error<C: ComposerChannel>(composer: &ComposerOrchestrator<C>) -> anyhow::Error {
    match composer.status().await {
        Some(status) => anyhow!(status.message),
        None => anyhow!("message not sent"),
    }
}
