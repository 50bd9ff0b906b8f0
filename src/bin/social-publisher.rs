//! Social Publisher CLI
//!
//! Scheduled multi-platform publishing for Facebook pages and LinkedIn
//! organizations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use social_publisher::core::config::{ProvidersConfig, SandboxConfig};
use social_publisher::core::logging::init_tracing;
use social_publisher::notifications::sink_from_config;
use social_publisher::orchestration::analytics::immediate_retry;
use social_publisher::{
    AnalyticsCollector, AnalyticsQuery, Channel, ConfigLoadOptions, ConfigLoader, Existence,
    LogNotifier, MediaAttachment, MediaKind, MemoryStore, Platform, PluginLoader, PostContent,
    PublishStore, PublisherConfig, SandboxPlugin, SecureTokenStore, SocialPublisher, TaskSettings,
    TokenStore,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;

/// Scheduled multi-platform social publishing
#[derive(Parser)]
#[command(name = "social-publisher")]
#[command(version)]
#[command(about = "Scheduled multi-platform social publishing", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.social-publisher.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory sandbox provider; nothing is persisted or posted
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a post on one or more platforms
    Schedule {
        /// Post text
        text: String,

        /// Target platforms (facebook, linkedin, sandbox)
        #[arg(short, long, value_delimiter = ',', required = true)]
        platform: Vec<Platform>,

        /// Publish time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Link attached to the post
        #[arg(long)]
        link: Option<String>,

        /// Image URLs
        #[arg(long)]
        image: Vec<String>,

        /// IANA timezone recorded with the task
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Do not send a notification when a platform fails
        #[arg(long)]
        no_failure_notify: bool,
    },

    /// Run due publish tasks
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Withdraw a post and cancel its pending tasks
    Cancel {
        /// Post id
        post_id: String,
    },

    /// Show per-platform results of a post
    Report {
        /// Post id
        post_id: String,
    },

    /// Resolve a platform id to its canonical form
    Resolve {
        #[arg(short, long)]
        platform: Platform,

        /// Id as supplied (bare, compound or URN)
        id: String,
    },

    /// Check whether a published object still exists
    Status {
        #[arg(short, long)]
        platform: Platform,

        id: String,
    },

    /// Show a published object as the platform returns it
    View {
        #[arg(short, long)]
        platform: Platform,

        id: String,
    },

    /// Delete a published object
    Delete {
        #[arg(short, long)]
        platform: Platform,

        id: String,
    },

    /// Collect an analytics snapshot for a published post
    Analytics {
        /// Post id
        post_id: String,

        #[arg(short, long)]
        platform: Platform,
    },

    /// Display engagement statistics
    Stats {
        /// Filter by platform
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Filter by post id
        #[arg(long)]
        post: Option<String>,

        /// Show statistics for last N days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Print the JSON export instead of Markdown
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and verify channel credentials
    Check,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let config = load_config(&cli).await?;
    init_tracing(&config.logging())?;

    let validation = ConfigLoader::validate(&config);
    if !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
        return Ok(1);
    }

    if let Commands::Check = cli.command {
        println!("{}", ConfigLoader::format_validation_result(&validation));
    }

    let publisher = if cli.dry_run {
        println!("🧪 Dry run: using the in-memory sandbox provider\n");
        build_dry_run(&config)?
    } else {
        build(&config).await?
    };

    let exit_code = match cli.command {
        Commands::Schedule {
            text,
            platform,
            at,
            link,
            image,
            timezone,
            no_failure_notify,
        } => {
            let content = PostContent {
                text,
                link,
                media: image
                    .into_iter()
                    .map(|url| MediaAttachment {
                        url,
                        kind: MediaKind::Image,
                        alt_text: None,
                    })
                    .collect(),
            };
            let settings = TaskSettings {
                timezone,
                notify_on_failure: !no_failure_notify,
            };
            let platforms = if cli.dry_run {
                vec![Platform::Sandbox]
            } else {
                platform
            };
            schedule_command(&publisher, content, &platforms, at, settings, cli.dry_run).await?
        }
        Commands::Run { once } => run_command(&publisher, once).await?,
        Commands::Cancel { post_id } => {
            let cancelled = publisher.cancel_post(&post_id).await?;
            println!("🚫 Post {} withdrawn, {} pending task(s) cancelled", post_id, cancelled.len());
            0
        }
        Commands::Report { post_id } => {
            let report = publisher.post_report(&post_id).await?;
            report.print();
            match report.into_result() {
                Ok(_) => 0,
                Err(e) => {
                    eprintln!("⚠️  {}", e);
                    1
                }
            }
        }
        Commands::Resolve { platform, id } => {
            let resolution = publisher.resolve_id(platform, &id).await?;
            println!(
                "{} (via {}, tried: {})",
                resolution.canonical_id,
                resolution.strategy.as_str(),
                resolution
                    .attempted
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            0
        }
        Commands::Status { platform, id } => {
            let record = publisher.get_post_status(platform, &id).await?;
            println!("{}", record.state);
            if let Some(detail) = &record.detail {
                println!("  {}", detail);
            }
            match record.state {
                Existence::Exists => 0,
                Existence::Deleted => 1,
                Existence::Unknown => 2,
            }
        }
        Commands::View { platform, id } => {
            let object = publisher.view_post(platform, &id).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
            0
        }
        Commands::Delete { platform, id } => {
            let outcome = publisher.delete_post(platform, &id).await?;
            if outcome.already_absent {
                println!("✅ {} was already deleted", id);
            } else {
                println!("✅ {} deleted", id);
            }
            0
        }
        Commands::Analytics { post_id, platform } => {
            let record = publisher.collect_analytics(&post_id, platform).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            0
        }
        Commands::Stats {
            platform,
            post,
            days,
            json,
        } => {
            println!("\n📊 Engagement Statistics\n");
            let query = AnalyticsQuery {
                post_id: post,
                platform,
                start_date: Some(Utc::now() - chrono::Duration::days(days)),
                ..Default::default()
            };
            let report = publisher.analytics().generate_report(&query).await?;
            if json {
                println!("{}", report.json_data);
            } else {
                println!("{}", report.markdown_summary);
            }
            0
        }
        Commands::Check => check_command(&publisher).await,
    };

    publisher.shutdown().await;
    Ok(exit_code)
}

async fn load_config(cli: &Cli) -> Result<PublisherConfig> {
    let mut options = ConfigLoadOptions::from_env();
    options.config_file = cli.config.clone();
    ConfigLoader::load(options)
        .await
        .context("failed to load configuration")
}

async fn build(config: &PublisherConfig) -> Result<SocialPublisher> {
    let store: Arc<dyn PublishStore> = match config.store().path {
        Some(path) => Arc::new(MemoryStore::open(&path).await?),
        None => {
            tracing::warn!("store.path is not set, tasks live only for this process");
            Arc::new(MemoryStore::new())
        }
    };

    let loader = PluginLoader::from_config(config)?;
    let tokens: Arc<dyn TokenStore> = Arc::new(SecureTokenStore::from_env());
    let notifier = sink_from_config(&config.notifications())?;

    Ok(SocialPublisher::new(config, store, loader, tokens, notifier)?)
}

fn build_dry_run(config: &PublisherConfig) -> Result<SocialPublisher> {
    let sandbox = config
        .providers()
        .sandbox
        .unwrap_or_else(|| SandboxConfig {
            enabled: true,
            ..Default::default()
        });

    let mut config = config.clone();
    config.providers = Some(ProvidersConfig {
        sandbox: Some(sandbox.clone()),
        ..Default::default()
    });

    let store: Arc<dyn PublishStore> = Arc::new(MemoryStore::new());
    let mut loader = PluginLoader::new();
    loader.register(Arc::new(SandboxPlugin::new(&sandbox)));

    let tokens = Arc::new(SecureTokenStore::new());
    tokens.insert(Channel::new(
        "sandbox-dry-run",
        Platform::Sandbox,
        sandbox.parent_id.clone(),
        "dry-run-token",
    ));

    let analytics = config.analytics();
    let collector = AnalyticsCollector::new(store.clone(), loader.clone(), tokens.clone(), &analytics)
        .with_retry_options(immediate_retry(analytics.fetch_attempts));

    Ok(SocialPublisher::with_collector(
        &config,
        store,
        loader,
        tokens,
        Arc::new(LogNotifier),
        collector,
    )?)
}

async fn schedule_command(
    publisher: &SocialPublisher,
    content: PostContent,
    platforms: &[Platform],
    at: Option<DateTime<Utc>>,
    settings: TaskSettings,
    dry_run: bool,
) -> Result<i32> {
    let when = at.unwrap_or_else(Utc::now);
    let (post, task_ids) = publisher
        .schedule_post(content, platforms, when, settings)
        .await?;

    println!("📅 Post {} scheduled for {}", post.id, when.to_rfc3339());
    for task_id in &task_ids {
        println!("   - task {}", task_id);
    }

    // Nothing survives a dry run, so publish right away
    if dry_run {
        let summary = publisher.run_due_at(when).await?;
        summary.print_summary();
        let report = publisher.post_report(&post.id).await?;
        report.print();
        return Ok(if report.into_result().is_ok() { 0 } else { 1 });
    }

    Ok(0)
}

async fn run_command(publisher: &SocialPublisher, once: bool) -> Result<i32> {
    if once {
        let summary = publisher.run_due().await?;
        summary.print_summary();
        return Ok(if summary.failed > 0 || !summary.errors.is_empty() {
            1
        } else {
            0
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n⏹️  Stopping scheduler...");
            let _ = shutdown_tx.send(true);
        }
    });

    println!("\n⏱️  Scheduler running, press Ctrl-C to stop\n");
    publisher.run(shutdown_rx).await?;
    Ok(0)
}

async fn check_command(publisher: &SocialPublisher) -> i32 {
    println!("\n🔍 Channel Check\n");

    let mut failures = 0;
    for platform in publisher.platforms() {
        match publisher.verify_channel(platform).await {
            Ok(account) => println!(
                "  ✅ {}: {}",
                platform,
                account.name.unwrap_or(account.account_id)
            ),
            Err(e) => {
                failures += 1;
                println!("  ❌ {}: {}", platform, e);
                for action in e.suggested_actions() {
                    println!("     - {}", action);
                }
            }
        }
    }

    println!();
    if failures > 0 { 1 } else { 0 }
}
