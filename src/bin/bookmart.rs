//! Bookmart command line client.
//!
//! Runs marketplace mutations against a server through the same coordinator
//! the app uses, printing the resulting entity or errors as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use bookmart::catalog::{authors, books, checkouts, orders, users, Feed};
use bookmart::credentials::FileCredentialStore;
use bookmart::transport::SubscriptionTransport;
use bookmart::{
    ClientConfig, FileUpload, HttpTransport, InMemoryCache, MutationCoordinator, MutationResult,
    MutationSpec, Record, Session, SubmitOutcome, WsTransport,
};

#[derive(Parser, Debug)]
#[command(name = "bookmart")]
#[command(about = "Book marketplace client")]
struct Cli {
    /// JSON config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding persisted credentials
    #[arg(long, value_name = "DIR", default_value = ".bookmart")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the token
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored token
    SignOut,
    /// Add an author
    AddAuthor {
        #[arg(long)]
        name: String,
    },
    /// Add a book with a cover image
    AddBook {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author_id: String,
        #[arg(long)]
        language_id: String,
        #[arg(long)]
        category_id: String,
        #[arg(long)]
        price: String,
        #[arg(long)]
        isbn: String,
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        published_date: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a book
    DeleteBook {
        #[arg(long)]
        id: i64,
    },
    /// Print entities pushed by a live feed until interrupted
    Watch {
        #[arg(value_enum)]
        feed: FeedName,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FeedName {
    LatestOrders,
    UpdatedOrders,
    LatestCheckouts,
}

impl FeedName {
    fn feed(self) -> Feed {
        match self {
            FeedName::LatestOrders => orders::latest_orders(),
            FeedName::UpdatedOrders => orders::updated_orders(),
            FeedName::LatestCheckouts => checkouts::latest_checkouts(),
        }
    }
}

struct Client {
    transport: Arc<HttpTransport>,
    live: WsTransport,
    cache: Arc<InMemoryCache>,
    session: Session,
}

impl Client {
    async fn connect(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        }
        .with_env_overrides();

        let store = Arc::new(
            FileCredentialStore::open(&cli.data_dir)
                .await
                .with_context(|| format!("opening credentials in {}", cli.data_dir.display()))?,
        );
        let transport = Arc::new(HttpTransport::new(&config).with_credentials(store.clone()));
        let live = WsTransport::new(&config).with_credentials(store.clone());
        let session = Session::new(store, config.token_key.clone());
        session.restore().await?;

        log::info!("Using {}", transport.endpoint());
        Ok(Self {
            transport,
            live,
            cache: Arc::new(InMemoryCache::new()),
            session,
        })
    }

    async fn submit(&self, spec: MutationSpec, input: Value) -> Result<MutationResult> {
        let coordinator = MutationCoordinator::new(spec, self.transport.clone(), self.cache.clone());
        let input: Record = input.as_object().cloned().unwrap_or_default();

        match coordinator.submit(input).await {
            SubmitOutcome::Succeeded(result) => Ok(result),
            SubmitOutcome::Invalid(errors) | SubmitOutcome::Rejected(errors) => {
                println!("{}", serde_json::to_string_pretty(&json!({ "errors": errors }))?);
                bail!("{} was not accepted", coordinator.spec().operation_name)
            }
            SubmitOutcome::Failed(e) => Err(e.into()),
            SubmitOutcome::Dropped => bail!("submission already in flight"),
        }
    }

    async fn watch(&self, feed: Feed) -> Result<()> {
        let spec = feed.subscription;
        let mut events = self.live.subscribe(&spec.request()).await?;
        log::info!("Watching {} on {}", spec.operation_name, self.live.url());

        while let Some(event) = events.recv().await {
            if let Some(entity) = event.data.as_ref().and_then(|d| spec.entity(d)) {
                println!("{}", serde_json::to_string(entity)?);
            }
        }
        bail!("{} ended", spec.operation_name)
    }
}

fn print_entity(result: &MutationResult) -> Result<()> {
    let entity = result.entity.clone().unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let client = Client::connect(&cli).await?;

    match &cli.command {
        Command::SignIn { email, password } => {
            let result = client
                .submit(users::sign_in(), json!({ "email": email, "password": password }))
                .await?;
            let me = users::complete_sign_in(&client.session, &result).await?;
            println!("{}", serde_json::to_string_pretty(&me)?);
        }
        Command::SignOut => {
            client.session.sign_out().await?;
            println!("Signed out");
        }
        Command::AddAuthor { name } => {
            let result = client.submit(authors::add_author(), json!({ "name": name })).await?;
            print_entity(&result)?;
        }
        Command::AddBook {
            title,
            author_id,
            language_id,
            category_id,
            price,
            isbn,
            cover,
            condition,
            status,
            published_date,
            description,
        } => {
            let cover = cover
                .canonicalize()
                .with_context(|| format!("cover {}", cover.display()))?;
            let upload = FileUpload::from_picked(format!("file://{}", cover.display()), mime_type(&cover));
            let input = json!({
                "title": title,
                "authorId": author_id,
                "languageId": language_id,
                "categoryId": category_id,
                "price": price,
                "isbn": isbn,
                "condition": condition,
                "status": status,
                "publishedDate": published_date,
                "description": description,
                "coverFile": upload.to_value(),
            });
            let result = client.submit(books::add_book(), input).await?;
            print_entity(&result)?;
        }
        Command::DeleteBook { id } => {
            let result = client.submit(books::delete_book(), json!({ "id": id })).await?;
            print_entity(&result)?;
        }
        Command::Watch { feed } => client.watch(feed.feed()).await?,
    }
    Ok(())
}
