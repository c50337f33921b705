use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;

use mdxgloss_rs::config::{ConflictAction, DictGroup, SaveFormat, Settings};
use mdxgloss_rs::dict::MdictReader;
use mdxgloss_rs::lookup::{self, LookupOutcome, LookupRequest};
use mdxgloss_rs::resolve::{self, ResolveError, ResolvedDictionarySet};
use mdxgloss_rs::web;

#[derive(Parser, Debug)]
#[command(
    name = "mdxgloss-rs",
    about = "Look up words in local MDX/MDD dictionaries",
    version
)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(long, global = true, default_value = "mdxgloss.json")]
    config: PathBuf,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up a word across a group's dictionaries and print the result.
    Lookup {
        word: String,
        /// Dictionary group to query.
        #[arg(short, long)]
        group: String,
        /// Override the group's configured output format.
        #[arg(short, long)]
        format: Option<SaveFormat>,
    },
    /// Look up a word and write the result into the group's save folder.
    Save {
        word: String,
        #[arg(short, long)]
        group: String,
        #[arg(short, long)]
        format: Option<SaveFormat>,
        /// What to do when the word file already exists.
        #[arg(long, value_enum)]
        on_conflict: Option<ConflictAction>,
    },
    /// Start the local lookup server.
    Serve {
        /// Override the configured port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List configured groups and their resolution status.
    Groups,
    /// Validate the settings file.
    Check,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if let Command::Check = cli.command {
        return handle_check(&cli.config);
    }
    let settings = Settings::load(&cli.config)?;
    match cli.command {
        Command::Lookup {
            word,
            group,
            format,
        } => handle_lookup(&settings, &word, &group, format, cli.json),
        Command::Save {
            word,
            group,
            format,
            on_conflict,
        } => handle_save(&settings, &word, &group, format, on_conflict),
        Command::Serve { port } => handle_serve(settings, port),
        Command::Groups => handle_groups(&settings, cli.json),
        Command::Check => handle_check(&cli.config),
    }
}

fn handle_lookup(
    settings: &Settings,
    word: &str,
    group_name: &str,
    format: Option<SaveFormat>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let (group, format, outcome) = run_pipeline(settings, word, group_name, format)?;
    report_notices(&outcome);
    if as_json {
        let payload = json!({
            "word": word,
            "group": group.name,
            "format": format.to_string(),
            "result": outcome.text,
            "notices": outcome.notices,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", outcome.text);
    }
    Ok(())
}

fn handle_save(
    settings: &Settings,
    word: &str,
    group_name: &str,
    format: Option<SaveFormat>,
    on_conflict: Option<ConflictAction>,
) -> Result<(), Box<dyn Error>> {
    let (group, format, outcome) = run_pipeline(settings, word, group_name, format)?;
    report_notices(&outcome);
    let target = save_target(group, word, format);
    write_word_file(&target, &outcome.text, on_conflict)?;
    println!("Saved {word:?} to {}", target.display());
    Ok(())
}

fn handle_serve(mut settings: Settings, port: Option<u16>) -> Result<(), Box<dyn Error>> {
    if let Some(port) = port {
        settings.port = port;
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(web::serve(settings, Arc::new(MdictReader)))?;
    Ok(())
}

fn handle_groups(settings: &Settings, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        let payload: Vec<_> = settings
            .groups
            .iter()
            .map(|group| match resolve::resolve(&group.dict_paths) {
                Ok(set) => json!({
                    "name": group.name,
                    "format": group.save_format.to_string(),
                    "dictionaries": set.dict_all_paths.len(),
                    "folders": set.folder_paths.len(),
                }),
                Err(err) => json!({
                    "name": group.name,
                    "format": group.save_format.to_string(),
                    "error": err.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if settings.groups.is_empty() {
        println!("No dictionary groups configured.");
        return Ok(());
    }
    for group in &settings.groups {
        match resolve::resolve(&group.dict_paths) {
            Ok(set) => println!(
                "{}: {} dictionaries across {} folders ({})",
                group.name,
                set.dict_all_paths.len(),
                set.folder_paths.len(),
                group.save_format,
            ),
            Err(err) => println!("{}: {err}", group.name),
        }
    }
    Ok(())
}

fn handle_check(path: &Path) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load(path)?;
    let mut failures = 0usize;
    for group in &settings.groups {
        match resolve::resolve(&group.dict_paths) {
            Ok(set) => println!(
                "{}: ok ({} dictionaries)",
                group.name,
                set.dict_all_paths.len()
            ),
            Err(err) => {
                println!("{}: {err}", group.name);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(format!("{failures} group(s) failed to resolve").into());
    }
    println!("Settings file {} is valid.", path.display());
    Ok(())
}

fn run_pipeline<'a>(
    settings: &'a Settings,
    word: &str,
    group_name: &str,
    format_override: Option<SaveFormat>,
) -> Result<(&'a DictGroup, SaveFormat, LookupOutcome), Box<dyn Error>> {
    let group = settings
        .group(group_name)
        .ok_or_else(|| format!("No group named {group_name:?}"))?;
    let format = format_override.unwrap_or(group.save_format);
    let rules = group.compiled_rules()?;
    let resolved = match resolve::resolve(&group.dict_paths) {
        Ok(set) => set,
        // An empty set is not fatal; the pipeline answers with its
        // "No dictionary exists" result.
        Err(ResolveError::EmptyDictionarySet) => ResolvedDictionarySet::empty(),
        Err(err) => return Err(err.into()),
    };
    let request = LookupRequest {
        word,
        group: &group.name,
        format,
        template: group.template_for(format),
        rules: &rules,
        show_notice: group.show_notice,
        port: settings.port,
    };
    let outcome = lookup::lookup_all(&MdictReader, &request, &resolved)?;
    Ok((group, format, outcome))
}

fn report_notices(outcome: &LookupOutcome) {
    for notice in &outcome.notices {
        eprintln!("{notice}");
    }
}

fn save_target(group: &DictGroup, word: &str, format: SaveFormat) -> PathBuf {
    let dir = if group.file_save_path.trim().is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(&group.file_save_path)
    };
    dir.join(format!("{word}.{}", format.file_extension()))
}

fn write_word_file(
    target: &Path,
    text: &str,
    decision: Option<ConflictAction>,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if !target.exists() {
        fs::write(target, text)?;
        return Ok(());
    }
    let action = match decision {
        Some(action) => action,
        None => prompt_conflict_action(target)?,
    };
    match action {
        ConflictAction::Append => {
            let mut file = OpenOptions::new().append(true).open(target)?;
            writeln!(file)?;
            file.write_all(text.as_bytes())?;
        }
        ConflictAction::Overwrite => fs::write(target, text)?,
        ConflictAction::Ignore => eprintln!("Leaving {} untouched", target.display()),
    }
    Ok(())
}

fn prompt_conflict_action(target: &Path) -> Result<ConflictAction, Box<dyn Error>> {
    if !atty::is(Stream::Stdin) {
        eprintln!(
            "{} already exists; pass --on-conflict to choose what to do",
            target.display()
        );
        return Ok(ConflictAction::Ignore);
    }
    eprint!(
        "{} already exists. [a]ppend / [o]verwrite / [i]gnore? ",
        target.display()
    );
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(match answer.trim().chars().next() {
        Some('a' | 'A') => ConflictAction::Append,
        Some('o' | 'O') => ConflictAction::Overwrite,
        _ => ConflictAction::Ignore,
    })
}
