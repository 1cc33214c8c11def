use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;

use cli_style::{
    format_duration, get_prompt, get_styles, print_empty_list, print_error, print_goodbye,
    print_help, print_key_value, print_success, print_warning, CommandHelp, TableBuilder,
};
use setlist_catalog::config::{AppConfig, CliConfig, FileConfig};
use setlist_catalog::songs::SongDetails;
use setlist_catalog::sort::{SortMode, TuningRotation};
use setlist_catalog::store::{ListEntry, MembershipOverrides, SetlistSummary, SongFields};
use setlist_catalog::view::ListSession;
use setlist_catalog::{SetlistEngine, SetlistError};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles())]
struct CliArgs {
    /// Path to the setlist database, created if missing.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Band whose lists are managed.
    #[clap(long)]
    pub band: Option<String>,

    /// Path to a TOML config file; its values override the flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// API key for tempo lookups, used when enrichment is enabled in the config.
    #[clap(long)]
    pub tempo_api_key: Option<String>,
}

#[derive(Parser)]
#[command(styles=get_styles(),name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Shows every list of the band, catalog first.
    Lists,

    /// Opens a list by name or id and shows it. Without argument, shows the open list.
    Show { list: Option<String> },

    /// Creates a performance list.
    Create { name: String },

    /// Renames a performance list.
    Rename { list: String, name: String },

    /// Deletes a performance list. Its songs stay in the catalog.
    Delete { list: String },

    /// Adds a song to the open list, and to the catalog if it is new.
    Add {
        title: String,
        artist: String,
        #[clap(long)]
        bpm: Option<i32>,
        #[clap(long)]
        tuning: Option<String>,
        /// Duration in seconds.
        #[clap(long)]
        duration: Option<i32>,
    },

    /// Removes the song at the given row from the open list.
    Remove { row: usize },

    /// Deletes the song at the given row from the catalog and every list.
    Purge { row: usize },

    /// Moves a song from one row to another.
    Move { from: usize, to: usize },

    /// Sets the sort mode: manual, standard, drop, open. Without argument, cycles.
    Sort { mode: Option<String> },

    /// Imports songs from a text file (title, artist, bpm, tuning per line).
    Import {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Reverts the last import into the open list.
    Undo,

    /// Edits a song everywhere it appears.
    Edit {
        row: usize,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        artist: Option<String>,
        #[clap(long)]
        bpm: Option<i32>,
        #[clap(long)]
        tuning: Option<String>,
        #[clap(long)]
        duration: Option<i32>,
        #[clap(long)]
        notes: Option<String>,
    },

    /// Sets values for a song on the open list only.
    Override {
        row: usize,
        #[clap(long)]
        bpm: Option<i32>,
        #[clap(long)]
        tuning: Option<String>,
        #[clap(long)]
        duration: Option<i32>,
    },

    /// Shows the path of the current database.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

impl From<SetlistError> for CommandExecutionResult {
    fn from(err: SetlistError) -> Self {
        CommandExecutionResult::Error(err.user_message())
    }
}

struct Repl {
    engine: SetlistEngine,
    band_id: String,
    db_path: String,
    session: Option<ListSession>,
}

fn parse_sort_mode(raw: &str) -> Option<SortMode> {
    match raw.to_lowercase().as_str() {
        "manual" => Some(SortMode::Manual),
        "standard" => Some(SortMode::Tuning(TuningRotation::StandardFirst)),
        "drop" => Some(SortMode::Tuning(TuningRotation::DropFirst)),
        "open" => Some(SortMode::Tuning(TuningRotation::OpenFirst)),
        _ => None,
    }
}

fn print_lists(lists: &[SetlistSummary]) {
    let mut table = TableBuilder::new(&["Name", "Songs", "Length", "Id"]);
    for list in lists {
        let name = if list.setlist.is_catalog {
            format!("{} ★", list.setlist.name)
        } else {
            list.setlist.name.clone()
        };
        table.add_row(vec![
            name,
            list.song_count.to_string(),
            format_duration(list.total_duration_seconds),
            list.setlist.id.clone(),
        ]);
    }
    table.print();
}

fn print_entries(entries: &[ListEntry]) {
    if entries.is_empty() {
        print_empty_list("(no songs yet)");
        return;
    }
    let mut table = TableBuilder::new(&["#", "Title", "Artist", "BPM", "Tuning", "Length"]);
    for (row, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            (row + 1).to_string(),
            entry.song.title.clone(),
            entry.song.artist.clone(),
            entry
                .effective_bpm()
                .map(|b| b.to_string())
                .unwrap_or_default(),
            entry.effective_tuning().unwrap_or_default().to_string(),
            entry
                .effective_duration()
                .map(|d| format_duration(d as i64))
                .unwrap_or_default(),
        ]);
    }
    table.print();
}

impl Repl {
    fn session(&self) -> Result<&ListSession, CommandExecutionResult> {
        self.session.as_ref().ok_or_else(|| {
            CommandExecutionResult::Error("No list is open, use 'show <list>' first.".to_string())
        })
    }

    fn find_list(&self, name_or_id: &str) -> Result<SetlistSummary, CommandExecutionResult> {
        let lists = self.engine.setlists().list_setlists(&self.band_id)?;
        let wanted = name_or_id.trim().to_lowercase();
        lists
            .into_iter()
            .find(|l| l.setlist.id == name_or_id || l.setlist.name.to_lowercase() == wanted)
            .ok_or_else(|| CommandExecutionResult::Error(format!("No list named '{}'", name_or_id)))
    }

    /// Song id at a 1-based row of the open list, as currently displayed.
    async fn song_at(&self, row: usize) -> Result<String, CommandExecutionResult> {
        let snapshot = self.session()?.snapshot().await;
        row.checked_sub(1)
            .and_then(|index| snapshot.entries.get(index))
            .map(|e| e.song.id.clone())
            .ok_or_else(|| CommandExecutionResult::Error(format!("No song at row {}", row)))
    }

    async fn show_open_list(&self) -> Result<(), CommandExecutionResult> {
        let session = self.session()?;
        session.sync_metadata().await?;
        let snapshot = session.snapshot().await;
        println!();
        print_key_value("List", &snapshot.setlist.name);
        print_key_value("Sort", snapshot.mode.label());
        print_key_value(
            "Songs",
            &format!(
                "{} ({})",
                snapshot.song_count,
                format_duration(snapshot.total_duration_seconds)
            ),
        );
        if snapshot.reorder_pending {
            print_warning("Order not saved yet");
        }
        if let Some(error) = &snapshot.error {
            print_error(error);
        }
        print_entries(&snapshot.entries);
        Ok(())
    }

    async fn open(&mut self, list: &str) -> Result<(), CommandExecutionResult> {
        let summary = self.find_list(list)?;
        if let Some(previous) = self.session.take() {
            previous.close().await?;
        }
        self.session = Some(
            self.engine
                .open_list(&self.band_id, &summary.setlist.id)
                .await?,
        );
        Ok(())
    }

    async fn execute(&mut self, command: InnerCommand) -> Result<(), CommandExecutionResult> {
        match command {
            InnerCommand::Lists => {
                let lists = self.engine.setlists().list_setlists(&self.band_id)?;
                print_lists(&lists);
            }
            InnerCommand::Show { list } => {
                if let Some(list) = list {
                    self.open(&list).await?;
                }
                self.show_open_list().await?;
            }
            InnerCommand::Create { name } => {
                let list = self.engine.setlists().create_setlist(&self.band_id, &name)?;
                print_success(&format!("Created '{}'", list.name));
            }
            InnerCommand::Rename { list, name } => {
                let summary = self.find_list(&list)?;
                self.engine
                    .setlists()
                    .rename_setlist(&self.band_id, &summary.setlist.id, &name)?;
                print_success(&format!("Renamed '{}'", summary.setlist.name));
                let is_open = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.list_id() == summary.setlist.id);
                if is_open {
                    self.open(&summary.setlist.id).await?;
                }
            }
            InnerCommand::Delete { list } => {
                let summary = self.find_list(&list)?;
                if self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.list_id() == summary.setlist.id)
                {
                    self.session = None;
                }
                self.engine
                    .setlists()
                    .delete_setlist(&self.band_id, &summary.setlist.id)?;
                print_success(&format!("Deleted '{}'", summary.setlist.name));
            }
            InnerCommand::Add {
                title,
                artist,
                bpm,
                tuning,
                duration,
            } => {
                let details = SongDetails {
                    bpm,
                    tuning,
                    duration_seconds: duration,
                    album_artwork: None,
                };
                let outcome = self.session()?.add_song(&title, &artist, details).await?;
                if outcome.was_already_in_list {
                    print_warning("Already on this list");
                } else {
                    print_success(&format!("Added '{}'", title));
                }
                self.show_open_list().await?;
            }
            InnerCommand::Remove { row } => {
                let song_id = self.song_at(row).await?;
                self.session()?.remove_song(&song_id).await?;
                self.show_open_list().await?;
            }
            InnerCommand::Purge { row } => {
                let song_id = self.song_at(row).await?;
                let report = self.session()?.purge_song(&song_id).await?;
                print_success(&format!(
                    "Song deleted from the catalog and {} other lists",
                    report.removed_from_lists.len().saturating_sub(1)
                ));
                self.show_open_list().await?;
            }
            InnerCommand::Move { from, to } => {
                if from == 0 || to == 0 {
                    return Err(CommandExecutionResult::Error(
                        "Rows start at 1".to_string(),
                    ));
                }
                let session = self.session()?;
                session.reorder(from - 1, to - 1).await?;
                self.show_open_list().await?;
            }
            InnerCommand::Sort { mode } => {
                let session = self.session()?;
                match mode {
                    Some(raw) => {
                        let Some(mode) = parse_sort_mode(&raw) else {
                            return Err(CommandExecutionResult::Error(format!(
                                "Unknown sort mode '{}'",
                                raw
                            )));
                        };
                        session.set_sort_mode(mode).await?;
                    }
                    None => {
                        session.cycle_sort_mode().await?;
                    }
                }
                self.show_open_list().await?;
            }
            InnerCommand::Import { file } => {
                let raw_text = std::fs::read_to_string(&file).map_err(|err| {
                    CommandExecutionResult::Error(format!("Cannot read {:?}: {}", file, err))
                })?;
                let report = self.session()?.import(&raw_text).await?;
                for invalid in &report.parsed.invalid_rows {
                    print_warning(&format!(
                        "Line {} skipped: {}",
                        invalid.line_number, invalid.reason
                    ));
                }
                for warning in &report.parsed.warnings {
                    print_warning(warning);
                }
                for failed in &report.result.failed_rows {
                    print_error(&format!("'{}' failed: {}", failed.row.title, failed.reason));
                }
                print_success(&format!(
                    "Imported {} songs ({} already there, {} duplicates dropped)",
                    report.result.added_count,
                    report.result.already_present,
                    report.parsed.duplicates_removed
                ));
                self.show_open_list().await?;
            }
            InnerCommand::Undo => {
                let removed = self.session()?.undo_import().await?;
                print_success(&format!("Removed {} imported songs from this list", removed));
                self.show_open_list().await?;
            }
            InnerCommand::Edit {
                row,
                title,
                artist,
                bpm,
                tuning,
                duration,
                notes,
            } => {
                let song_id = self.song_at(row).await?;
                let fields = SongFields {
                    title,
                    artist,
                    bpm,
                    duration_seconds: duration,
                    tuning,
                    notes,
                    album_artwork: None,
                };
                let song = self.session()?.edit_song(&song_id, fields).await?;
                print_success(&format!("Updated '{}' everywhere", song.title));
                self.show_open_list().await?;
            }
            InnerCommand::Override {
                row,
                bpm,
                tuning,
                duration,
            } => {
                let song_id = self.song_at(row).await?;
                let overrides = MembershipOverrides {
                    bpm,
                    tuning,
                    duration_seconds: duration,
                };
                self.session()?.set_overrides(&song_id, overrides).await?;
                self.show_open_list().await?;
            }
            InnerCommand::Where => {
                println!("{}", self.db_path);
            }
            InnerCommand::Exit => return Err(CommandExecutionResult::Exit),
        }
        Ok(())
    }
}

fn execute_command(line: String, repl: &mut Repl, runtime: &Runtime) -> CommandExecutionResult {
    if line.trim().is_empty() {
        return CommandExecutionResult::Ok;
    }
    if line.trim() == "help" {
        print_help(HELP);
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => match runtime.block_on(repl.execute(cli.command)) {
            Ok(()) => CommandExecutionResult::Ok,
            Err(result) => result,
        },
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
            CommandExecutionResult::Ok
        }
    }
}

const HELP: &[(&str, &[CommandHelp])] = &[
    (
        "Lists",
        &[
            CommandHelp {
                name: "lists",
                args: "",
                description: "All lists of the band",
            },
            CommandHelp {
                name: "show",
                args: "[list]",
                description: "Open and show a list",
            },
            CommandHelp {
                name: "create",
                args: "<name>",
                description: "New performance list",
            },
            CommandHelp {
                name: "rename",
                args: "<list> <name>",
                description: "Rename a list",
            },
            CommandHelp {
                name: "delete",
                args: "<list>",
                description: "Delete a list, songs stay in the catalog",
            },
        ],
    ),
    (
        "Songs on the open list",
        &[
            CommandHelp {
                name: "add",
                args: "<title> <artist> [--bpm --tuning --duration]",
                description: "Add a song",
            },
            CommandHelp {
                name: "remove",
                args: "<row>",
                description: "Take a song off this list",
            },
            CommandHelp {
                name: "purge",
                args: "<row>",
                description: "Delete a song from the band",
            },
            CommandHelp {
                name: "move",
                args: "<from> <to>",
                description: "Reorder",
            },
            CommandHelp {
                name: "sort",
                args: "[manual|standard|drop|open]",
                description: "Change sort mode",
            },
            CommandHelp {
                name: "edit",
                args: "<row> [--title --artist --bpm --tuning --duration --notes]",
                description: "Edit a song everywhere",
            },
            CommandHelp {
                name: "override",
                args: "<row> [--bpm --tuning --duration]",
                description: "Values for this list only",
            },
        ],
    ),
    (
        "Import",
        &[
            CommandHelp {
                name: "import",
                args: "<file>",
                description: "Bulk add from a text file",
            },
            CommandHelp {
                name: "undo",
                args: "",
                description: "Revert the last import",
            },
        ],
    ),
    (
        "System",
        &[
            CommandHelp {
                name: "where",
                args: "",
                description: "Database path",
            },
            CommandHelp {
                name: "exit",
                args: "",
                description: "Quit",
            },
        ],
    ),
];

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .chain(std::iter::once("help".to_string()))
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .cloned()
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let cli_args = CliArgs::parse();
    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        band_id: cli_args.band,
        enrichment_api_key: cli_args.tempo_api_key,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    let Some(band_id) = config.band_id.clone() else {
        bail!("A band is required, pass --band or set band_id in the config file");
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let engine = SetlistEngine::new(&config)?;
    let mut repl = Repl {
        engine,
        band_id,
        db_path: config.db_path.display().to_string(),
        session: None,
    };

    cli_style::print_banner();
    print_key_value("Database", &repl.db_path);
    print_key_value("Band", &repl.band_id);
    println!();

    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .build();
    let mut rl = Editor::<MyHelper, FileHistory>::with_config(rl_config)?;
    rl.set_helper(Some(MyHelper::new()));

    loop {
        let list_name = repl.session.as_ref().map(|s| s.list_id().to_string());
        let prompt = match &list_name {
            Some(list_id) => {
                let name = repl
                    .engine
                    .setlists()
                    .get_setlist(&repl.band_id, list_id)
                    .map(|l| l.name)
                    .unwrap_or_default();
                get_prompt(Some(&name))
            }
            None => get_prompt(None),
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &mut repl, &runtime) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }

    if let Some(session) = repl.session.take() {
        if let Err(err) = runtime.block_on(session.close()) {
            print_error(&format!("Unsaved order was lost: {}", err.user_message()));
        }
    }
    print_goodbye();
    Ok(())
}
