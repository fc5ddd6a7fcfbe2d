use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use oxattach::{
    CreateOptions, DEFAULT_PRIORITY, DEFAULT_STATUS, Settings, Vault, VaultEvent, VaultPath,
    VaultService, ViewMode, property_options,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Reading,
    LivePreview,
}

impl From<ModeArg> for ViewMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Reading => ViewMode::Reading,
            ModeArg::LivePreview => ViewMode::LivePreview,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "oxa",
    version,
    about = "Parent/child note attachments and folder types for Obsidian vaults"
)]
struct Cli {
    /// Path to the Obsidian vault.
    #[arg(long, env = "OBSIDIAN_VAULT", global = true)]
    vault: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Settings file utilities.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    #[command(flatten)]
    Notes(NoteCommand),
}

#[derive(Debug, Subcommand)]
enum NoteCommand {
    /// List note types derived from the configured folders.
    Types,
    /// Show the type of a folder or of the folder holding a note.
    TypeOf {
        /// Folder path, note path or note name.
        target: String,
    },
    /// List notes attached to a parent.
    Attached {
        /// Parent note path or name.
        note: String,
    },
    /// List the parents a note links to.
    Parents {
        /// Child note path or name.
        note: String,
    },
    /// Point a note's link field at a parent (replaces existing links).
    Attach {
        #[arg(long)]
        child: String,
        #[arg(long)]
        parent: String,
    },
    /// Remove a note's link field.
    Detach {
        #[arg(long)]
        child: String,
    },
    /// Create a note of a type, attached to a parent.
    Create {
        #[arg(long)]
        parent: String,

        /// Type name (fuzzy) or folder path.
        #[arg(long = "type")]
        note_type: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        body: String,

        #[arg(long, default_value = DEFAULT_STATUS)]
        status: String,

        #[arg(long, default_value = DEFAULT_PRIORITY)]
        priority: String,
    },
    /// Show the attachments panel for a note.
    Panel {
        note: String,

        #[arg(long, value_enum, default_value = "reading")]
        mode: ModeArg,
    },
    /// Set a single front matter property.
    Set {
        note: String,
        key: String,
        value: String,
    },
    /// Watch the vault and print events.
    Watch {
        /// Notes to keep a panel open for (repeatable).
        #[arg(long)]
        open: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print the effective settings as TOML.
    Show,
    /// Write the default settings file into the vault.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let vault = Vault::open(require_vault(cli.vault)?)?;
    let settings = Settings::load(&vault)?;
    init_logging(settings.enable_logging);

    match cli.command {
        Command::Settings { command } => handle_settings(&vault, settings, command),
        Command::Notes(command) => handle_notes(vault, settings, command, cli.json).await,
    }
}

async fn handle_notes(
    vault: Vault,
    settings: Settings,
    command: NoteCommand,
    json: bool,
) -> anyhow::Result<()> {
    let mut service = VaultService::with_settings(vault, settings);
    service.build_index().await?;

    match command {
        NoteCommand::Types => {
            let types = service.all_types();
            if json {
                print_json(&types)?;
            } else {
                for t in &types {
                    println!("{}\t{}\t{}", t.name, t.path, t.icon().as_str());
                }
            }
        }
        NoteCommand::TypeOf { target } => {
            let folder = target.trim().trim_matches('/');
            let found = match service.type_for_path(folder) {
                Some(t) => Some(t),
                None => {
                    let note = require_note(&service, &target)?;
                    service.type_of_note(&note)
                }
            };
            if json {
                print_json(&found)?;
            } else {
                match found {
                    Some(t) => println!("{}\t{}", t.name, t.path),
                    None => println!("(no type)"),
                }
            }
        }
        NoteCommand::Attached { note } => {
            let parent = require_note(&service, &note)?;
            let attached = service.attached_notes(&parent);
            if json {
                print_json(&attached)?;
            } else {
                for a in &attached {
                    let ty = a.note_type.as_ref().map_or("-", |t| t.name.as_str());
                    println!("{}\t{}", a.path, ty);
                }
            }
        }
        NoteCommand::Parents { note } => {
            let child = require_note(&service, &note)?;
            let parents = service.all_parent_notes(&child);
            if json {
                print_json(&parents)?;
            } else {
                for p in &parents {
                    println!("{p}");
                }
            }
        }
        NoteCommand::Attach { child, parent } => {
            let child = require_note(&service, &child)?;
            let parent = require_note(&service, &parent)?;
            service.attach_note(&child, &parent)?;
            println!("attached {child} -> {parent}");
        }
        NoteCommand::Detach { child } => {
            let child = require_note(&service, &child)?;
            service.detach_note(&child)?;
            println!("detached {child}");
        }
        NoteCommand::Create {
            parent,
            note_type,
            title,
            body,
            status,
            priority,
        } => {
            let parent = require_note(&service, &parent)?;
            let folder = note_type.trim().trim_matches('/');
            let Some(ty) = service
                .type_for_path(folder)
                .or_else(|| service.find_type(&note_type))
            else {
                anyhow::bail!("no type matches {note_type:?}");
            };
            let opts = CreateOptions {
                body,
                status,
                priority,
            };
            let path = service
                .create_attached_note(&parent, &ty, &title, &opts)
                .await?;
            if json {
                print_json(&path)?;
            } else {
                println!("{path}");
            }
        }
        NoteCommand::Panel { note, mode } => {
            let path = require_note(&service, &note)?;
            let panel = service.panel(&path, mode.into());
            if json {
                print_json(&panel)?;
            } else {
                match panel {
                    None => println!("(panel disabled for this view)"),
                    Some(panel) => print_panel(&panel),
                }
            }
        }
        NoteCommand::Set { note, key, value } => {
            let path = require_note(&service, &note)?;
            let options = property_options(&key);
            if !options.is_empty() && !options.contains(&value.as_str()) {
                anyhow::bail!("{key} must be one of: {}", options.join(", "));
            }
            service.set_property(&path, &key, &value)?;
            println!("{path}: {key} = {value}");
        }
        NoteCommand::Watch { open } => {
            let mut rx = service.subscribe();
            service.start_watching().await?;
            for note in &open {
                let path = require_note(&service, note)?;
                let id = service.open_view(path.clone(), ViewMode::Reading);
                println!("{id}: {path}");
            }
            println!("watching... (Ctrl-C to stop)");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    ev = rx.recv() => {
                        match ev {
                            Ok(VaultEvent::Refreshed { view, path }) => {
                                println!("refreshed {view} ({path})");
                                if let Some(panel) = service.panels().get(&view) {
                                    print_panel(panel);
                                }
                            }
                            Ok(ev) => println!("{ev:?}"),
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                eprintln!("(lagged {n} events)");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            service.dispose().await;
        }
    }

    Ok(())
}

fn handle_settings(vault: &Vault, settings: Settings, command: SettingsCommand) -> anyhow::Result<()> {
    match command {
        SettingsCommand::Show => {
            print!("{}", settings.to_toml_string()?);
        }
        SettingsCommand::Init { force } => {
            let path = vault.root().join(&vault.config().settings_path);
            if path.exists() && !force {
                anyhow::bail!(
                    "settings already exist at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let written = Settings::default().save(vault)?;
            println!("wrote {}", written.display());
        }
    }
    Ok(())
}

/// Logs go to stderr, and only when enabled in settings or through `RUST_LOG`.
fn init_logging(enabled: bool) {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    if !enabled && !from_env {
        return;
    }
    let filter = if from_env {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::new("oxattach=debug")
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn require_vault(vault: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    vault.ok_or_else(|| anyhow::anyhow!("--vault is required (or set OBSIDIAN_VAULT)"))
}

fn require_note(service: &VaultService, reference: &str) -> anyhow::Result<VaultPath> {
    service
        .resolve_note(reference)
        .ok_or_else(|| anyhow::anyhow!("note not found: {reference}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_panel(panel: &oxattach::Panel) {
    if !panel.parents.is_empty() {
        let titles: Vec<&str> = panel.parents.iter().map(|p| p.title.as_str()).collect();
        println!("Parent: {}", titles.join(", "));
    }
    println!("Attachments ({})", panel.count());
    if panel.attached.is_empty() {
        println!("  No attached notes yet");
    }
    for item in &panel.attached {
        let badges: Vec<&str> = item.badges.iter().map(|b| b.value.as_str()).collect();
        println!(
            "  [{}] {}{}{}",
            item.icon,
            item.title,
            item.type_name
                .as_deref()
                .map(|t| format!(" ({t})"))
                .unwrap_or_default(),
            if badges.is_empty() {
                String::new()
            } else {
                format!("  {}", badges.join(" "))
            }
        );
    }
}
