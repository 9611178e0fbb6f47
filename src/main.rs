use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use url::Url;

use gallery::blob::UploadProgress;
use gallery::client::GalleryClient;
use gallery::compose::{ImageSource, PostDraft};
use gallery::config::{Cli, Command, Config};
use gallery::error::{AppError, AppResult};
use gallery::gallery::{FeedTab, ADMIN_NOTICE};
use gallery::gateway::SqliteConnector;
use gallery::identity::KeyFileIdentity;
use gallery::models::{CommentId, PostId, Principal};
use gallery::notify::{Notice, NoticeLevel};
use gallery::profile::{self, ProfileDraft};
use gallery::{db, render};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let client = GalleryClient::new(
        Arc::new(SqliteConnector::new(pool, config.uploads_path())),
        Arc::new(KeyFileIdentity::new(config.key_file())),
        config.stale_after(),
    );
    if cli.command != Command::Login {
        client.restore_session().await?;
    }

    let mut notices = client.subscribe();
    let result = run(&client, cli.command).await;
    print_notices(&mut notices);

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            let shown = Notice {
                level: NoticeLevel::Error,
                message: e.to_string(),
            };
            eprintln!("{}", render::notice(&shown));
            tracing::debug!("Command failed ({:?})", e.class());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Failure notices are skipped; the returned error is printed instead.
fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        if notice.level == NoticeLevel::Success {
            println!("{}", render::notice(&notice));
        }
    }
}

async fn run(client: &GalleryClient, command: Command) -> AppResult<()> {
    let now = Utc::now();
    match command {
        Command::Login => {
            let principal = client.login().await?;
            println!("Logged in as {}", principal);
            if client.caller_profile().await?.is_none() {
                println!("Set up your profile: gallery profile --username <name> --email <email>");
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => whoami(client).await?,
        Command::Profile { username, email } => {
            client.save_profile(&ProfileDraft::new(username, email)).await?;
        }
        Command::Feed { following } => {
            let tab = if following { FeedTab::Following } else { FeedTab::All };
            let state = client.feed(tab).await?;
            let cards = client.post_cards(state.posts()).await;
            print!("{}", render::feed(&state, &cards, now));
        }
        Command::Show { post } => {
            let id = PostId(post);
            let post = client
                .post(id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("Post {} not found", id)))?;
            let cards = client.post_cards(&[(id, post)]).await;
            for card in &cards {
                print!("{}", render::post_card(card, now));
            }
            println!();
            print!("{}", render::thread(&client.post_thread(id).await?, now));
        }
        Command::Post { caption, images } => {
            let mut draft = PostDraft::new(caption);
            draft.attach(images.iter().map(|s| image_source(s)).collect())?;
            let id = publish(client, draft).await?;
            println!("Created post #{}", id);
        }
        Command::Comment {
            post,
            text,
            reply_to,
        } => {
            let post = PostId(post);
            let id = match reply_to {
                Some(parent) => {
                    let target = client.reply_target(post, CommentId(parent)).await?;
                    client.add_reply(target, &text).await?
                }
                None => client.add_comment(post, &text).await?,
            };
            println!("Comment #{}", id);
        }
        Command::Like { post } => {
            let id = PostId(post);
            let liked = client.like_post(id).await?;
            let likes = client.post_likes(id).await?;
            println!(
                "{} · {}",
                if liked { "Liked" } else { "Unliked" },
                gallery::gallery::like_label(likes)
            );
        }
        Command::Follow { principal } => client.follow(&principal).await?,
        Command::Unfollow { principal } => client.unfollow(&principal).await?,
        Command::Followers => print_principals(client, client.followers().await?).await,
        Command::Following => print_principals(client, client.following().await?).await,
        Command::DeletePost { post } => client.delete_post(PostId(post)).await?,
        Command::DeleteComment { comment } => client.delete_comment(CommentId(comment)).await?,
        Command::Grant { principal, role } => client.assign_role(&principal, role).await?,
    }
    Ok(())
}

async fn whoami(client: &GalleryClient) -> AppResult<()> {
    let Some(principal) = client.principal().await else {
        println!("Not logged in");
        return Ok(());
    };
    println!("Principal: {}", principal);

    let profile = client.caller_profile().await?;
    if profile::needs_setup(true, true, profile.as_ref()) {
        println!("Profile: not set up");
    }
    if let Some(profile) = profile {
        println!("Username: {}", profile.username);
        println!("Email: {}", profile.email);
    }
    println!("Role: {}", client.caller_role().await?);
    if client.is_caller_admin().await? {
        println!("{}", ADMIN_NOTICE);
    }
    Ok(())
}

async fn publish(client: &GalleryClient, draft: PostDraft) -> AppResult<PostId> {
    let (progress, mut rx) = UploadProgress::new();
    let reporter = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let percent = *rx.borrow_and_update();
            eprintln!("Uploading... {}%", percent);
        }
    });

    let result = client.create_post(draft, &progress).await;
    drop(progress);
    let _ = reporter.await;
    result
}

async fn print_principals(client: &GalleryClient, principals: Vec<Principal>) {
    if principals.is_empty() {
        println!("Nobody yet");
    }
    for principal in principals {
        println!("{}  {}", principal, client.display_name_of(&principal).await);
    }
}

/// `http(s)://` arguments are linked as-is; anything else is a file path.
fn image_source(arg: &str) -> ImageSource {
    match Url::parse(arg) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => ImageSource::Url(url),
        _ => ImageSource::File(PathBuf::from(arg)),
    }
}
