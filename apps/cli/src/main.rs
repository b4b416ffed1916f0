use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zhoconv_settings::migrate;
use zhoconv_settings::{LoadReport, SettingsPaths, SettingsStore, StoreOptions};

#[derive(Parser)]
#[command(
    name = "zhoconv-cli",
    about = "Inspect and maintain zhoconv settings files",
    author,
    version
)]
struct Cli {
    /// 指定設定檔所在的根目錄；預設為目前目錄。 / Root directory holding the settings files (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// 覆寫預設設定檔路徑。 / Override the shipped default settings path.
    #[arg(long, global = true, value_name = "FILE")]
    defaults_file: Option<PathBuf>,

    /// 覆寫使用者設定檔路徑。 / Override the user-override settings path.
    #[arg(long, global = true, value_name = "FILE")]
    user: Option<PathBuf>,

    /// 完整存檔時一併寫入舊版欄位。 / Also write legacy flat PDF fields on full saves.
    #[arg(long, global = true)]
    mirror_legacy: bool,

    /// 顯示除錯記錄（可用 RUST_LOG 覆寫）。 / Enable debug logging (RUST_LOG takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 顯示目前生效的設定。 / Print the active settings document.
    Show(ShowArgs),
    /// 顯示各設定層的載入狀態。 / Report how each settings layer loaded.
    Status,
    /// 顯示與預設值的差異。 / Print the diff against the defaults.
    Diff,
    /// 設定單一欄位後存檔。 / Set one field and save.
    Set(SetArgs),
    /// 將使用者設定檔改寫為最小差異。 / Rewrite the user file as a minimal diff.
    Compact,
    /// 清除所有使用者覆寫。 / Drop every user override.
    Reset,
    /// 匯出完整設定。 / Export the full active settings.
    Export(ExportArgs),
    /// 匯入設定 JSON。 / Import settings from JSON.
    Import(ImportArgs),
}

#[derive(Args)]
struct ShowArgs {
    /// 顯示預設值而非目前設定。 / Show the normalized defaults instead.
    #[arg(long)]
    defaults: bool,
}

#[derive(Args)]
struct SetArgs {
    /// 以點分隔的欄位路徑，例如 pdfOptions.pdfEngine。 / Dotted camelCase key, e.g. `pdfOptions.pdfEngine`.
    key: String,

    /// JSON 值；無法解析時視為字串。 / JSON value; taken as a plain string when it does not parse.
    value: String,

    /// 寫入完整文件而非差異。 / Save the full document instead of a diff.
    #[arg(long)]
    full: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// 輸出檔案路徑。 / Destination file path.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct ImportArgs {
    /// 輸入檔案路徑。 / Source settings JSON.
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// 寫入完整文件而非差異。 / Save the full document instead of a diff.
    #[arg(long)]
    full: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let workspace_root = resolve_workspace(cli.workspace)?;
    let paths = settings_paths(&workspace_root, cli.defaults_file, cli.user)?;
    debug!(
        defaults = %paths.defaults.display(),
        user = %paths.user.display(),
        "Resolved settings paths"
    );
    let options = StoreOptions {
        mirror_legacy_fields: cli.mirror_legacy,
        ..StoreOptions::default()
    };
    let mut store = SettingsStore::load_with(paths, options);

    match cli.command {
        Commands::Show(args) => {
            let settings = if args.defaults {
                store.defaults()
            } else {
                store.settings()
            };
            print_json(&serde_json::to_value(settings)?)
        }
        Commands::Status => print_status(&store),
        Commands::Diff => print_json(&Value::Object(store.diff()?)),
        Commands::Set(args) => execute_set(&mut store, args),
        Commands::Compact => {
            let written = store
                .save_diff()
                .with_context(|| format!("failed to write {}", store.paths().user.display()))?;
            println!(
                "Wrote {} override section(s) to {}",
                written.len(),
                store.paths().user.display()
            );
            Ok(())
        }
        Commands::Reset => {
            store.reset_to_defaults();
            store
                .save_diff()
                .with_context(|| format!("failed to write {}", store.paths().user.display()))?;
            println!("Cleared overrides in {}", store.paths().user.display());
            Ok(())
        }
        Commands::Export(args) => {
            let output = resolve_input_path(&args.output)?;
            store
                .export_to(&output)
                .with_context(|| format!("failed to export settings to {}", output.display()))?;
            println!("Exported settings to {}", output.display());
            Ok(())
        }
        Commands::Import(args) => execute_import(&mut store, args),
    }
}

fn execute_set(store: &mut SettingsStore, args: SetArgs) -> Result<()> {
    let value = serde_json::from_str(&args.value)
        .unwrap_or_else(|_| Value::String(args.value.clone()));
    let mut document = serde_json::to_value(store.settings())?;
    set_dotted(&mut document, &args.key, value)?;
    let updated = migrate::upgrade(document)
        .with_context(|| format!("invalid value for '{}'", args.key))?;
    store.replace(updated);
    persist(store, args.full)?;
    println!("Updated {}", args.key);
    Ok(())
}

fn execute_import(store: &mut SettingsStore, args: ImportArgs) -> Result<()> {
    let input = resolve_input_path(&args.input)?;
    if !input.exists() {
        bail!("settings file '{}' does not exist", input.display());
    }
    store
        .import_from(&input)
        .with_context(|| format!("failed to import settings from {}", input.display()))?;
    persist(store, args.full)?;
    println!("Imported settings from {}", input.display());
    Ok(())
}

fn persist(store: &mut SettingsStore, full: bool) -> Result<()> {
    let user_path = store.paths().user.clone();
    let result = if full {
        store.save()
    } else {
        store.save_diff().map(|_| ())
    };
    result.with_context(|| format!("failed to write {}", user_path.display()))
}

fn set_dotted(document: &mut Value, key: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        bail!("invalid key '{key}'");
    }
    let Some((last, parents)) = segments.split_last() else {
        bail!("invalid key '{key}'");
    };

    let mut cursor = document;
    for segment in parents {
        cursor = match cursor {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => bail!("'{key}' does not name an object field"),
        };
    }
    match cursor {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => bail!("'{key}' does not name an object field"),
    }
}

fn print_status(store: &SettingsStore) -> Result<()> {
    let LoadReport {
        defaults,
        user,
        defaults_regenerated,
    } = store.load_report();
    let paths = store.paths();
    println!("defaults: {} ({defaults})", paths.defaults.display());
    println!("user: {} ({user})", paths.user.display());
    if *defaults_regenerated {
        println!("default settings were regenerated");
    }
    println!("overridden sections: {}", store.diff()?.len());
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter),
        )
        .init();
}

fn settings_paths(
    workspace_root: &Path,
    defaults: Option<PathBuf>,
    user: Option<PathBuf>,
) -> Result<SettingsPaths> {
    let defaults = match defaults {
        Some(path) => resolve_input_path(&path)?,
        None => workspace_root.join("settings.json"),
    };
    let user = match user {
        Some(path) => resolve_input_path(&path)?,
        None => workspace_root.join(".zhoconv").join("user_settings.json"),
    };
    Ok(SettingsPaths::new(defaults, user))
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
