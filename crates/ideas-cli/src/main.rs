use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use ideas_client::engagement::CommentOutcome;
use ideas_client::{ClientConfig, IdeaDraft, IdeaOrder, IdeasClient, LikeOutcome};
use ideas_types::api::RegisterRequest;
use ideas_types::models::PREVIEW_CHARS;
use ideas_types::{Idea, IdeaId};

#[derive(Parser)]
#[command(name = "ideas")]
#[command(about = "Pitch, browse, like and discuss ideas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session
    Login {
        username: String,
        #[arg(long, short)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, short)]
        password: String,
        #[arg(long)]
        password_confirm: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Top ideas followed by everything else
    Feed {
        /// Order the remaining ideas by newest instead of most liked
        #[arg(long)]
        newest: bool,
    },
    /// Show one idea with its comments
    Show { id: IdeaId },
    /// Like or unlike an idea
    Like { id: IdeaId },
    /// Comment on an idea
    Comment { id: IdeaId, content: String },
    /// Pitch a new idea
    Submit { title: String, description: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ideas=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    debug!(?config, "Loaded configuration");
    let client = IdeasClient::open(&config)?;

    match cli.command {
        Commands::Login { username, password } => {
            let user = client.session.login(&username, &password).await?;
            println!("Signed in as {}", user.username);
        }
        Commands::Register {
            username,
            email,
            password,
            password_confirm,
            first_name,
            last_name,
        } => {
            let user = client
                .session
                .register(RegisterRequest {
                    username,
                    email,
                    first_name,
                    last_name,
                    password,
                    password_confirm,
                })
                .await?;
            println!("Welcome, {}", user.username);
        }
        Commands::Logout => {
            client.session.logout().await;
            println!("Signed out");
        }
        Commands::Whoami => match client.session.current_user() {
            Some(user) => println!("{} (id {})", user.username, user.id),
            None => println!("Not signed in"),
        },
        Commands::Feed { newest } => {
            let feed = client.feed.load().await;

            println!("Top ideas");
            match &feed.top {
                Ok(top) => top.iter().for_each(print_card),
                Err(e) => println!("  could not load: {e}"),
            }

            let order = if newest { IdeaOrder::Newest } else { IdeaOrder::Popular };
            let mut more = feed.more_ideas().to_vec();
            ideas_client::feed::sort_ideas(&mut more, order);

            println!();
            println!("More ideas");
            match &feed.all {
                Ok(_) if more.is_empty() => println!("  nothing else yet"),
                Ok(_) => more.iter().for_each(print_card),
                Err(e) => println!("  could not load: {e}"),
            }
        }
        Commands::Show { id } => {
            let idea = client.feed.open_idea(id).await?;
            print_idea(&idea);
        }
        Commands::Like { id } => {
            client.feed.open_idea(id).await?;
            match client.engagement.toggle_like(id).await? {
                LikeOutcome::Committed(likes) => {
                    let verb = if likes.is_liked { "Liked" } else { "Unliked" };
                    println!("{verb} idea {id} ({} likes)", likes.likes_count);
                }
                LikeOutcome::Ignored | LikeOutcome::Discarded(_) => bail!("like for idea {id} was not applied"),
            }
        }
        Commands::Comment { id, content } => {
            client.feed.open_idea(id).await?;
            match client.engagement.post_comment(id, &content).await? {
                CommentOutcome::Committed(comment) | CommentOutcome::Discarded(comment) => {
                    println!("Comment {} posted on idea {id}", comment.id);
                }
            }
        }
        Commands::Submit { title, description } => {
            let id = client.feed.submit_idea(&IdeaDraft::new(title, description)).await?;
            println!("Submitted idea {id}");
        }
    }

    Ok(())
}

fn print_card(idea: &Idea) {
    println!(
        "  #{} {} by {} [{} likes]",
        idea.id, idea.title, idea.pitcher.username, idea.likes_count
    );
    println!("     {}", idea.preview(PREVIEW_CHARS));
}

fn print_idea(idea: &Idea) {
    let liked = if idea.is_liked { ", liked by you" } else { "" };
    println!("{} (#{})", idea.title, idea.id);
    println!(
        "by {} on {} [{} likes{liked}]",
        idea.pitcher.username,
        idea.created_at.format("%Y-%m-%d"),
        idea.likes_count
    );
    println!();
    println!("{}", idea.description);

    if idea.comments.is_empty() {
        return;
    }
    println!();
    println!("Comments");
    for comment in &idea.comments {
        println!(
            "  {} ({}): {}",
            comment.commenter.username,
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.content
        );
    }
}
