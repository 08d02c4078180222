use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use favtool_core::action::{PageAction, PageOutput};
use favtool_core::api::{self, FavoriteRequest};
use favtool_core::cache;
use favtool_core::config::{FavConfig, load_config};
use favtool_core::remote;
use favtool_core::runtime::{
    InitOptions, MIGRATIONS_POLICY_MESSAGE, PathOverrides, ResolutionContext, ResolvedPaths,
    init_layout, inspect_runtime, resolve_paths,
};
use favtool_core::session::{UserContext, UserOverrides, resolve_user};
use favtool_core::store::{self, Direction, FavoriteEntry};
use favtool_core::title::{Namespace, Title};
use rusqlite::Connection;

#[derive(Debug, Parser)]
#[command(
    name = "favtool",
    version,
    about = "Favorites for wiki pages: toggle, list, and talk to a live wiki's favorite API"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "ID", help = "Act as this user id")]
    user_id: Option<i64>,
    #[arg(long, global = true, value_name = "NAME", help = "Act under this user name")]
    user_name: Option<String>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    user_id: Option<i64>,
    user_name: Option<String>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            user_id: cli.user_id,
            user_name: cli.user_name.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Favorite(TitleArgs),
    Unfavorite(TitleArgs),
    List,
    Status,
    Api(ApiArgs),
    Remote(RemoteArgs),
    Db(DbArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .favtool/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct TitleArgs {
    title: String,
}

#[derive(Debug, Args)]
struct ApiArgs {
    #[arg(long, help = "The page to (un)favorite")]
    title: Option<String>,
    #[arg(long, help = "Unfavorite instead of favoriting")]
    unfavorite: bool,
    #[arg(long, help = "Print the module's help metadata instead of executing")]
    describe: bool,
}

#[derive(Debug, Args)]
struct RemoteArgs {
    #[command(subcommand)]
    command: RemoteSubcommand,
}

#[derive(Debug, Subcommand)]
enum RemoteSubcommand {
    Favorite { title: String },
    Unfavorite { title: String },
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    Stats,
    Migrate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Favorite(TitleArgs { title })) => {
            run_page_action(&runtime, &title, Direction::Favorite)
        }
        Some(Commands::Unfavorite(TitleArgs { title })) => {
            run_page_action(&runtime, &title, Direction::Unfavorite)
        }
        Some(Commands::List) => run_list(&runtime),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Api(args)) => run_api(&runtime, args),
        Some(Commands::Remote(RemoteArgs { command })) => match command {
            RemoteSubcommand::Favorite { title } => run_remote(&runtime, &title, false),
            RemoteSubcommand::Unfavorite { title } => run_remote(&runtime, &title, true),
        },
        Some(Commands::Db(DbArgs { command })) => match command {
            DbSubcommand::Stats => run_db_stats(&runtime),
            DbSubcommand::Migrate => run_db_migrate(&runtime),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    let connection = store::open_store(&paths.db_path)?;
    let migrate = store::run_migrations(&connection)?;

    println!("Initialized favtool runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    println!("migrations_applied: {}", migrate.applied.len());
    println!("schema_version: {}", migrate.current_version);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_page_action(runtime: &RuntimeOptions, raw_title: &str, direction: Direction) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (_, user) = resolve_identity(runtime, &paths)?;
    if !user.is_registered() {
        bail!("you must be logged in to have a favorites list (set [user] in config or --user-id)");
    }

    let title = Title::parse(raw_title)?;
    if title.is_virtual() {
        bail!("cannot favorite a virtual-namespace page: {raw_title}");
    }

    let connection = open_migrated_store(&paths)?;
    let action = PageAction::new(direction);
    let mut output = PageOutput::new();
    let outcome = action.run(&connection, &user, &title, &mut output)?;

    println!("{}", action.name());
    println!("user: {} ({})", user.name, user.id);
    println!("title: {}", title.prefixed_text());
    println!("changed: {}", format_flag(outcome.changed));
    println!("label: {}", action.action_label());
    for block in output.blocks() {
        println!("message: {block}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_list(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (_, user) = resolve_identity(runtime, &paths)?;
    if !user.is_registered() {
        bail!("you must be logged in to have a favorites list (set [user] in config or --user-id)");
    }

    let connection = open_migrated_store(&paths)?;
    let entries = cache::favorites_for_user(&connection, user.id)?;

    println!("favorites list");
    println!("user: {} ({})", user.name, user.id);
    println!("favorites.count: {}", entries.len());
    if entries.is_empty() {
        println!("favorites: <none>");
    } else {
        for entry in &entries {
            println!("favorites.title: {}", format_entry(entry));
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    let (_, user) = resolve_identity(runtime, &paths)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("user: {} ({})", user.name, user.id);
    println!(
        "pending_migrations: {}",
        store::pending_migration_count(&paths.db_path)?
    );
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_api(runtime: &RuntimeOptions, args: ApiArgs) -> Result<()> {
    if args.describe {
        println!("{}", serde_json::to_string_pretty(&api::module_metadata())?);
        return Ok(());
    }

    let paths = resolve_runtime_paths(runtime)?;
    let (_, user) = resolve_identity(runtime, &paths)?;
    let connection = open_migrated_store(&paths)?;

    let request = FavoriteRequest {
        title: args.title,
        unfavorite: args.unfavorite,
    };
    // The module answers every request with a body, error envelope
    // included, the way an api.php endpoint does.
    let body = match api::execute(&connection, &user, &request) {
        Ok(payload) => api::wrap_module(payload),
        Err(error) => error.envelope(),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_remote(runtime: &RuntimeOptions, title: &str, unfavorite: bool) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let Some(api_url) = config.api_url_owned() else {
        bail!("no wiki api_url configured; set [wiki].api_url or WIKI_API_URL");
    };

    let outcome = remote::submit_toggle(&api_url, &config.user_agent(), title, unfavorite)?;
    println!("remote {}", if unfavorite { "unfavorite" } else { "favorite" });
    println!("api_url: {api_url}");
    println!("title: {}", outcome.title);
    println!("label: {}", outcome.action_label);
    if let Some(message) = outcome.message {
        println!("message: {message}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_db_stats(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;

    println!("db stats");
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    let pending = store::pending_migration_count(&paths.db_path)?;
    println!("pending_migrations: {pending}");
    if status.db_exists && pending == 0 {
        let connection = store::open_store(&paths.db_path)?;
        println!("schema_version: {}", store::current_version(&connection)?);
        println!(
            "favoritelist.rows: {}",
            store::count_all_favorites(&connection)?
        );
    } else {
        println!("favoritelist.rows: <not migrated> ({MIGRATIONS_POLICY_MESSAGE})");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_db_migrate(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let connection = store::open_store(&paths.db_path)?;
    let report = store::run_migrations(&connection)?;

    println!("db migrate");
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("applied: {}", report.applied.len());
    for migration in &report.applied {
        println!("applied.migration: v{:03}_{}", migration.version, migration.name);
    }
    println!("schema_version: {}", report.current_version);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn open_migrated_store(paths: &ResolvedPaths) -> Result<Connection> {
    let pending = store::pending_migration_count(&paths.db_path)?;
    if pending > 0 {
        bail!("{pending} schema migration(s) pending. {MIGRATIONS_POLICY_MESSAGE}");
    }
    store::open_store(&paths.db_path)
}

fn resolve_identity(
    runtime: &RuntimeOptions,
    paths: &ResolvedPaths,
) -> Result<(FavConfig, UserContext)> {
    let config = load_config(&paths.config_path)?;
    let user = resolve_user(
        &config,
        &UserOverrides {
            id: runtime.user_id,
            name: runtime.user_name.clone(),
        },
    )?;
    Ok((config, user))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn format_entry(entry: &FavoriteEntry) -> String {
    let text = entry.title.replace('_', " ");
    match Namespace::from_id(entry.namespace) {
        Some(namespace) if !namespace.canonical_name().is_empty() => {
            format!("{}:{text}", namespace.canonical_name())
        }
        Some(_) => text,
        None => format!("ns{}:{text}", entry.namespace),
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
