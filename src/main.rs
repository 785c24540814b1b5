mod cache;
mod config;
mod http;
mod store;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cache::{ApiResponse, CachedClient, RequestBody, RequestOptions};
use http::{Method, ReqwestTransport};
use store::{KeyValueStore, MemoryStore, SqliteStore};
use sync::{
  Action, CategoryUpdate, OfflineQueue, ProfileUpdate, ReportRequest, SubmitOutcome,
  SubscriptionUpdate, SyncLog,
};

#[derive(Parser, Debug)]
#[command(name = "ledgersync")]
#[command(about = "Offline-first cache and write queue for the ledger API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ledgersync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unreachable: writes are queued, sync is skipped
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read a resource, falling back to the cache when the network fails
  Get {
    path: String,
    /// Cache slot for the response
    #[arg(long)]
    cache_key: Option<String>,
    /// Maximum age of a cached response, in seconds
    #[arg(long)]
    ttl_secs: Option<u64>,
    /// Print the status line and response headers
    #[arg(short, long)]
    include: bool,
  },
  /// Send an arbitrary request (no caching, no queueing)
  Send {
    /// GET, POST, PUT, PATCH or DELETE
    method: Method,
    path: String,
    /// Request body, sent as text
    #[arg(long, conflicts_with = "data_file")]
    data: Option<String>,
    /// File whose bytes are sent as the body
    #[arg(long)]
    data_file: Option<PathBuf>,
    /// Content type overriding the default
    #[arg(long)]
    content_type: Option<String>,
    /// Print the status line and response headers
    #[arg(short, long)]
    include: bool,
  },
  /// Assign a category to a transaction
  Categorize {
    transaction_id: String,
    category: String,
  },
  /// Update the current user's profile
  Profile {
    #[arg(long)]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long)]
    date_of_birth: Option<String>,
  },
  /// Change the subscription plan
  Subscription {
    #[arg(long)]
    plan: String,
    #[arg(long)]
    close_day: u8,
  },
  /// Request a report
  Report { report_type: String, path: String },
  /// List queued writes
  Pending,
  /// Replay queued writes against the backend
  Sync,
  /// Show recent sync activity
  Log {
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
  },
}

fn init_tracing() -> Result<Option<WorkerGuard>> {
  let Some(log_dir) = dirs::data_dir().map(|d| d.join("ledgersync")) else {
    return Ok(None);
  };
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::never(&log_dir, "ledgersync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("LEDGERSYNC_LOG")
    .unwrap_or_else(|_| EnvFilter::new("ledgersync=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

fn print_response(response: &ApiResponse, include: bool) {
  if include {
    println!("status: {}", response.status);
    for (name, value) in &response.headers {
      println!("{}: {}", name, value);
    }
    println!();
  }
  if response.cached {
    let at = response
      .cached_at
      .map(|t| t.to_rfc3339())
      .unwrap_or_default();
    eprintln!("(cached {})", at);
  } else if !response.ok() {
    eprintln!("(status {})", response.status);
  }
  println!("{}", response.text());
}

async fn submit(
  queue: &OfflineQueue,
  action: Action,
  token: Option<&str>,
  offline: bool,
) -> SubmitOutcome {
  let outcome = queue.submit(action, token, offline).await;
  match outcome {
    SubmitOutcome::Applied => println!("applied"),
    SubmitOutcome::Queued { pending } => println!("queued ({} pending)", pending),
  }
  outcome
}

fn open_store(config: &config::Config) -> Arc<dyn KeyValueStore> {
  let opened = config
    .storage_path()
    .and_then(|path| SqliteStore::open(&path));
  match opened {
    Ok(store) => Arc::new(store),
    Err(e) => {
      // Storage is soft: run with volatile state rather than refusing to start
      warn!(error = %e, "state database unavailable, using in-memory store");
      Arc::new(MemoryStore::new())
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let token = config::Config::get_api_token();

  let store = open_store(&config);
  let transport = ReqwestTransport::new(config.timeout())?;
  let client = Arc::new(
    CachedClient::new(Arc::new(transport), store.clone(), config.base_url()?)
      .with_default_ttl(config.default_ttl()?),
  );
  let log = Arc::new(SyncLog::new(store));
  let queue = OfflineQueue::new(client.clone(), log.clone());

  let offline = args.offline;

  match args.command {
    Command::Get {
      path,
      cache_key,
      ttl_secs,
      include,
    } => {
      let ttl = ttl_secs.map(config::ttl_from_secs).transpose()?;
      let mut options = RequestOptions::get().token(token.as_deref());
      if let Some(key) = cache_key.as_deref() {
        options = options.cache(key, ttl);
      }
      let response = client.request(&path, options).await;
      print_response(&response, include);
    }
    Command::Send {
      method,
      path,
      data,
      data_file,
      content_type,
      include,
    } => {
      let mut options = RequestOptions::new(method).token(token.as_deref());
      if let Some(text) = data {
        options = options.body(RequestBody::Text(text));
      } else if let Some(file) = data_file {
        let bytes = std::fs::read(&file)
          .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
        options = options.body(RequestBody::Binary(bytes));
      }
      if let Some(content_type) = content_type.as_deref() {
        options = options.header("Content-Type", content_type);
      }
      let response = client.request(&path, options).await;
      print_response(&response, include);
    }
    Command::Categorize {
      transaction_id,
      category,
    } => {
      let action = Action::UpdateCategory(CategoryUpdate {
        transaction_id,
        category,
      });
      submit(&queue, action, token.as_deref(), offline).await;
    }
    Command::Profile {
      first_name,
      last_name,
      date_of_birth,
    } => {
      let action = Action::UpdateProfile(ProfileUpdate {
        first_name,
        last_name,
        date_of_birth,
      });
      submit(&queue, action, token.as_deref(), offline).await;
    }
    Command::Subscription { plan, close_day } => {
      let action = Action::UpdateSubscription(SubscriptionUpdate {
        subscription_plan: plan,
        monthly_close_day: close_day,
      });
      submit(&queue, action, token.as_deref(), offline).await;
    }
    Command::Report { report_type, path } => {
      let action = Action::ReportRequest(ReportRequest { report_type, path });
      let outcome = submit(&queue, action, token.as_deref(), offline).await;
      if outcome == SubmitOutcome::Applied {
        if let Some(latest) = queue.latest_report() {
          println!("{}", latest.data);
        }
      }
    }
    Command::Pending => {
      for queued in queue.pending() {
        println!(
          "{}  {}  {}",
          queued.created_at.format("%Y-%m-%d %H:%M:%S"),
          queued.id,
          queued.action.describe()
        );
      }
      println!("{}", queue.summary());
    }
    Command::Sync => {
      if offline {
        println!("offline, {}", queue.summary());
        return Ok(());
      }
      let report = queue.replay(token.as_deref()).await;
      println!("synced {}, {} remaining", report.flushed, report.remaining);
      println!("{}", queue.summary());
    }
    Command::Log { limit } => {
      for entry in log.recent(limit) {
        println!(
          "{}  {}  {:<12}  {}",
          entry.created_at.format("%Y-%m-%d %H:%M:%S"),
          entry.id,
          entry.action,
          entry.status
        );
      }
    }
  }

  Ok(())
}
