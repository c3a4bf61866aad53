use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use multisite::core::SelectionItem;
use multisite::core::catalog::EntityCatalog;
use multisite::core::location::Location;
use multisite::events::{ActionLaunch, Event, EventData, LaunchOptions, Reply};
use multisite::hooks::transfer_action::ACTION_IDENTIFIER;
use multisite::logging::{self, LogConfig};
use multisite::{config, context::AppContext};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisite")]
#[command(about = "Transfer components between storage locations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    api_user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    locations_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List locations available for transfers
    Locations,
    /// Show the actions offered for a selection
    Discover(SelectionArgs),
    /// Show the transfer form
    Interface(SelectionArgs),
    /// Transfer the selection's components and wait for the job to finish
    Transfer(TransferArgs),
    /// List recent jobs
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show a job with its status history
    Job { id: String },
}

#[derive(Args)]
struct SelectionArgs {
    /// Selected entity as `type:id` (project, context, version, component)
    #[arg(long = "select", required = true, value_parser = parse_selection)]
    selection: Vec<SelectionItem>,
}

#[derive(Args)]
struct TransferArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    /// Source location id or name
    #[arg(long)]
    from: String,
    /// Target location id or name
    #[arg(long)]
    to: String,
    /// Skip components missing from the source location
    #[arg(long)]
    ignore_missing: bool,
    /// Skip components that fail with any location error
    #[arg(long)]
    ignore_errors: bool,
}

fn parse_selection(s: &str) -> Result<SelectionItem, String> {
    SelectionItem::parse(s).ok_or_else(|| format!("invalid selection '{}', expected type:id", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::AppConfig::new(Some(&cli.global))?;
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    })?;

    let ctx = AppContext::bootstrap(config)
        .await
        .context("Failed to start hooks")?;

    match cli.command {
        Commands::Locations => run_locations(&ctx).await,
        Commands::Discover(args) => {
            let data = EventData::ActionDiscover {
                selection: args.selection,
            };
            print_replies(publish(&ctx, data).await)
        }
        Commands::Interface(args) => {
            let data = launch_data(args.selection, None);
            print_replies(publish(&ctx, data).await)
        }
        Commands::Transfer(args) => run_transfer(&ctx, args).await,
        Commands::Jobs { limit, offset } => {
            let jobs = ctx.session.catalog().list_jobs(limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }
        Commands::Job { id } => {
            let job = ctx.session.catalog().get_job(&id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
    }
}

fn launch_data(selection: Vec<SelectionItem>, values: Option<serde_json::Value>) -> EventData {
    EventData::ActionLaunch(ActionLaunch {
        action_identifier: ACTION_IDENTIFIER.to_string(),
        selection,
        values,
        options: LaunchOptions::default(),
    })
}

async fn publish(ctx: &AppContext, data: EventData) -> Vec<Reply> {
    let user = ctx.session.api_user().to_string();
    let event = Event::new(data).from_user(user.clone(), user);
    ctx.hub.publish(event).await.replies
}

fn print_replies(replies: Vec<Reply>) -> Result<()> {
    if replies.is_empty() {
        println!("No reply.");
    }
    for reply in replies {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    Ok(())
}

async fn run_locations(ctx: &AppContext) -> Result<()> {
    let locations = ctx.session.available_locations().await?;
    if locations.is_empty() {
        println!("No configured locations.");
    }
    for location in locations {
        let kind = location.accessor.as_ref().map(|a| a.kind()).unwrap_or("-");
        println!(
            "{:>6}  {:<6}  {:<38}  {}",
            location.priority,
            kind,
            location.id,
            location.display_label()
        );
    }
    Ok(())
}

async fn find_location(ctx: &AppContext, key: &str) -> Option<Location> {
    let registry = ctx.session.locations();
    match registry.get(key).await {
        Some(location) => Some(location),
        None => registry.get_by_name(key).await,
    }
}

async fn run_transfer(ctx: &AppContext, args: TransferArgs) -> Result<()> {
    // Unknown keys pass through as ids so the action reports them.
    let from = find_location(ctx, &args.from)
        .await
        .map(|l| l.id)
        .unwrap_or(args.from);
    let to = find_location(ctx, &args.to)
        .await
        .map(|l| l.id)
        .unwrap_or(args.to);

    let values = serde_json::json!({
        "from_location": from,
        "to_location": to,
        "ignore_component_not_in_location": args.ignore_missing.to_string(),
        "ignore_location_errors": args.ignore_errors.to_string(),
    });

    let replies = publish(ctx, launch_data(args.selection.selection, Some(values))).await;
    let job_id = replies.iter().find_map(|r| match r {
        Reply::Launch(response) if response.success => response.job_id.clone(),
        _ => None,
    });
    print_replies(replies)?;
    let Some(job_id) = job_id else {
        bail!("Transfer was not started");
    };

    tokio::select! {
        _ = ctx.spawner.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling transfers...");
            ctx.spawner.cancel_all();
            ctx.spawner.wait_idle().await;
        }
    }

    let job = ctx.session.catalog().get_job(&job_id).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
