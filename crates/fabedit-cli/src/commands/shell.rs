//! Interactive editing shell
//!
//! Reads one command per line and applies it to an open [`Session`]. Every
//! edit is undoable, and after each command the autosave trigger is checked
//! so a dirty session is snapshotted once the configured interval passes.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use fabedit_core::models::keys;
use fabedit_core::stats::{bundle_stats, global_stats};
use fabedit_core::storage::atomic_write;
use fabedit_core::{
    AutosaveStore, Config, DecoderRegistry, EntityDraft, FieldPatch, Filters, Session, Settings,
};

use crate::commands::catalog::{catalog_json, open_session};
use crate::output::Output;

const HELP: &str = "\
Commands:
  list [class]                 List unassigned items
  show <id>                    Show an item
  bundles                      List bundles
  stats [bundle]               Catalog or bundle statistics
  create <class> [name]        Create an item with the next free id
  set <id> <field> <value>     Set a field (value is JSON, or plain text)
  rename <id> <name>           Set the display name
  delete <id>                  Delete an item and remove it from bundles
  add <item> <bundle>          Add an item to a bundle
  remove <item> <bundle>       Remove an item from a bundle
  move <item> <from> <to>      Move between bundles (- for unassigned)
  undo | redo                  Step through history
  history                      Show the undo log
  validate                     Run the validation rules
  fix                          Apply automatic fixes
  autosave on|off              Toggle autosave
  save [path]                  Write the catalog
  quit                         Leave (quit! discards unsaved changes)";

/// Whether the shell keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    session: Session,
    path: PathBuf,
    autosave: AutosaveStore,
    decoders: DecoderRegistry,
    quit_warned: bool,
}

impl Shell {
    pub fn new(session: Session, path: PathBuf, autosave: AutosaveStore) -> Self {
        Self {
            session,
            path,
            autosave,
            decoders: DecoderRegistry::default(),
            quit_warned: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read and execute commands until `quit` or end of input
    pub fn run_loop(&mut self, input: impl BufRead, out: &mut impl Write, prompt: bool) -> Result<()> {
        if prompt {
            write!(out, "fabedit> ")?;
            out.flush()?;
        }
        for line in input.lines() {
            let line = line?;
            match self.execute_at(&line, Utc::now(), out) {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => writeln!(out, "error: {:#}", e)?,
            }
            if prompt {
                write!(out, "fabedit> ")?;
                out.flush()?;
            }
        }
        if self.session.has_unsaved_changes() {
            writeln!(out, "Unsaved changes were not written to {}", self.path.display())?;
        }
        Ok(())
    }

    /// Execute one command line, then check the autosave trigger at `now`
    pub fn execute_at(&mut self, line: &str, now: DateTime<Utc>, out: &mut impl Write) -> Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };

        if command != "quit" && command != "exit" {
            self.quit_warned = false;
        }
        let flow = self.dispatch(command, args, out)?;
        if flow == Flow::Continue {
            self.maybe_autosave(now, out)?;
        }
        Ok(flow)
    }

    fn dispatch(&mut self, command: &str, args: &[&str], out: &mut impl Write) -> Result<Flow> {
        match (command, args) {
            ("help" | "?", _) => writeln!(out, "{}", HELP)?,
            ("list" | "ls", _) => self.list(args.first().copied(), out)?,
            ("show", [id]) => self.show(id, out)?,
            ("bundles", []) => self.bundles(out)?,
            ("stats", []) => {
                let stats = global_stats(self.session.store());
                writeln!(
                    out,
                    "{} bundle(s), {} item(s), {} unassigned, avg power {:.1}",
                    stats.bundle_count, stats.total_entities, stats.unassigned_entities, stats.avg_power
                )?;
            }
            ("stats", [bundle_id]) => {
                if self.session.store().bundle(bundle_id).is_none() {
                    bail!("Bundle not found: {}", bundle_id);
                }
                let stats = bundle_stats(self.session.store(), bundle_id);
                writeln!(
                    out,
                    "{}: {} item(s), power {}, balance {}, avg level {:.1}",
                    bundle_id, stats.item_count, stats.total_power, stats.total_balance, stats.avg_level
                )?;
            }
            ("create" | "new", [class, name @ ..]) => {
                let item_id = self.session.generate_item_id(class);
                let mut draft = EntityDraft::new(item_id, *class);
                if !name.is_empty() {
                    draft = draft.display_name(name.join(" "));
                }
                let entity = self.session.create_entity(draft);
                writeln!(out, "Created {}", entity.item_id())?;
            }
            ("set", [id, field, value @ ..]) if !value.is_empty() => {
                let value = parse_value(&value.join(" "));
                self.update(id, FieldPatch::new().set(*field, value), out)?;
            }
            ("rename", [id, name @ ..]) if !name.is_empty() => {
                let patch = FieldPatch::new().set(keys::DISPLAY_NAME, name.join(" "));
                self.update(id, patch, out)?;
            }
            ("delete" | "rm", [id]) => {
                if !self.session.delete_entity(id) {
                    bail!("Item not found: {}", id);
                }
                writeln!(out, "Deleted {}", id)?;
            }
            ("add", [item_id, bundle_id]) => {
                if self.session.add_to_bundle(item_id, bundle_id) {
                    writeln!(out, "Added {} to {}", item_id, bundle_id)?;
                } else {
                    writeln!(out, "No change: {} is already in {} or it is not a bundle", item_id, bundle_id)?;
                }
            }
            ("remove", [item_id, bundle_id]) => {
                if !self.session.remove_from_bundle(item_id, bundle_id) {
                    bail!("{} is not in {}", item_id, bundle_id);
                }
                writeln!(out, "Removed {} from {}", item_id, bundle_id)?;
            }
            ("move" | "mv", [item_id, from, to]) => {
                let from = bundle_arg(from);
                let to = bundle_arg(to);
                if !self.session.move_between_bundles(item_id, from, to) {
                    bail!("Nothing to move: {} was not changed", item_id);
                }
                writeln!(
                    out,
                    "Moved {} from {} to {}",
                    item_id,
                    from.unwrap_or("unassigned"),
                    to.unwrap_or("unassigned")
                )?;
            }
            ("undo", []) => match self.session.undo()? {
                Some(kind) => writeln!(out, "Undid {}", kind.label())?,
                None => writeln!(out, "Nothing to undo")?,
            },
            ("redo", []) => match self.session.redo()? {
                Some(kind) => writeln!(out, "Redid {}", kind.label())?,
                None => writeln!(out, "Nothing to redo")?,
            },
            ("history", []) => {
                let history = self.session.history();
                let records: Vec<_> = history.past().collect();
                for record in records.iter().rev() {
                    writeln!(
                        out,
                        "{}  {:<18} {}",
                        record.timestamp.format("%H:%M:%S"),
                        record.kind().label(),
                        record.action.item_id()
                    )?;
                }
                writeln!(
                    out,
                    "{} undoable, {} redoable (limit {})",
                    history.len(),
                    history.redo_len(),
                    history.limit()
                )?;
            }
            ("validate", []) => {
                let report = self.session.validate();
                for issue in &report.issues {
                    writeln!(out, "[{}] {} {}: {}", issue.severity, issue.rule, issue.item_id, issue.message)?;
                }
                writeln!(
                    out,
                    "{} error(s), {} warning(s)",
                    report.error_count(),
                    report.warning_count()
                )?;
            }
            ("fix", []) => {
                let report = self.session.validate();
                let fixed = self.session.auto_fix_all(&report)?;
                writeln!(out, "Fixed {} issue(s)", fixed)?;
            }
            ("autosave", ["on"]) => {
                self.session.set_autosave_enabled(true);
                writeln!(out, "Autosave enabled")?;
            }
            ("autosave", ["off"]) => {
                self.session.set_autosave_enabled(false);
                writeln!(out, "Autosave disabled")?;
            }
            ("save", []) => self.save(None, out)?,
            ("save", [path]) => self.save(Some(Path::new(path)), out)?,
            ("quit!" | "exit!", []) => return Ok(Flow::Quit),
            ("quit" | "exit", []) => {
                if self.session.has_unsaved_changes() && !self.quit_warned {
                    self.quit_warned = true;
                    writeln!(out, "Unsaved changes. Use 'save' first, or quit again to discard them.")?;
                } else {
                    return Ok(Flow::Quit);
                }
            }
            _ => bail!("Unknown command or wrong arguments: '{}'. Type 'help'.", command),
        }
        Ok(Flow::Continue)
    }

    fn list(&self, item_class: Option<&str>, out: &mut impl Write) -> Result<()> {
        let filters = match item_class {
            Some(item_class) => Filters::new().with_type(item_class),
            None => Filters::new(),
        };
        let entities = self.session.store().filtered_sorted(&filters);
        for entity in &entities {
            writeln!(
                out,
                "{:<24} {:<12} {}",
                entity.item_id(),
                entity.item_class(),
                entity.display_name().unwrap_or("")
            )?;
        }
        writeln!(out, "{} unassigned item(s)", entities.len())?;
        Ok(())
    }

    fn show(&self, item_id: &str, out: &mut impl Write) -> Result<()> {
        let entity = self
            .session
            .store()
            .get(item_id)
            .with_context(|| format!("Item not found: {}", item_id))?;
        writeln!(
            out,
            "{} ({}) {}",
            entity.item_id(),
            entity.item_class(),
            entity.display_name().unwrap_or("")
        )?;
        if entity.is_bundle() {
            writeln!(out, "  members: {}", entity.member_ids().join(", "))?;
        }
        for (label, value) in self.decoders.decode(entity).summary() {
            writeln!(out, "  {}: {}", label, value)?;
        }
        Ok(())
    }

    fn bundles(&self, out: &mut impl Write) -> Result<()> {
        let store = self.session.store();
        for bundle in store.bundles() {
            writeln!(
                out,
                "{:<20} {:<24} {} item(s)",
                bundle.item_id(),
                bundle.display_name().unwrap_or(""),
                bundle.member_ids().len()
            )?;
        }
        Ok(())
    }

    fn update(&mut self, item_id: &str, patch: FieldPatch, out: &mut impl Write) -> Result<()> {
        if !self.session.update_entity(item_id, patch)? {
            bail!("Item not found: {}", item_id);
        }
        writeln!(out, "Updated {}", item_id)?;
        Ok(())
    }

    fn save(&mut self, dest: Option<&Path>, out: &mut impl Write) -> Result<()> {
        let dest = dest.unwrap_or(&self.path).to_path_buf();
        let json = catalog_json(&self.session)?;
        atomic_write(&dest, json.as_bytes())
            .with_context(|| format!("Failed to write catalog: {:?}", dest))?;
        self.session.mark_saved(Utc::now());
        writeln!(out, "Saved {} item(s) to {}", self.session.store().len(), dest.display())?;
        Ok(())
    }

    fn maybe_autosave(&mut self, now: DateTime<Utc>, out: &mut impl Write) -> Result<()> {
        if !self.session.autosave_due(now) {
            return Ok(());
        }
        match self.autosave.save_session(&mut self.session, now) {
            Ok(_) => writeln!(out, "(autosaved)")?,
            Err(e) => {
                warn!("Autosave failed: {}", e);
                match e.recovery_suggestion() {
                    Some(hint) => writeln!(out, "Autosave failed: {} {}", e, hint)?,
                    None => writeln!(out, "Autosave failed: {}", e)?,
                }
            }
        }
        Ok(())
    }
}

/// `-` names the unassigned pool
fn bundle_arg(arg: &str) -> Option<&str> {
    (arg != "-").then_some(arg)
}

/// Parse a field value as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Open `file` and run the shell on stdin
pub fn run(file: &Path, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let autosave = AutosaveStore::from_config(config);

    if let Ok(Some(loaded)) = autosave.load() {
        output.message(&format!(
            "An autosave from {} exists at {} (restore with `fabedit autosave restore`)",
            loaded.formatted_age(),
            autosave.path().display()
        ));
    }

    let stdin = io::stdin();
    let interactive = stdin.is_terminal() && !output.is_quiet();
    if interactive {
        println!(
            "Editing {} ({} items). Type 'help' for commands.",
            file.display(),
            session.store().len()
        );
    }

    let mut shell = Shell::new(session, file.to_path_buf(), autosave);
    let mut stdout = io::stdout();
    shell.run_loop(stdin.lock(), &mut stdout, interactive)?;

    remember_session(config, file, shell.session().autosave_policy().enabled);
    Ok(())
}

/// Record the file and autosave choice as the last session in settings
fn remember_session(config: &Config, file: &Path, auto_save_enabled: bool) {
    let path = config.settings_path();
    let result = Settings::load_from_path(&path).and_then(|mut settings| {
        settings.last_session.file_path = Some(file.display().to_string());
        settings.last_session.timestamp = Some(Utc::now().timestamp_millis());
        settings.last_session.auto_save_enabled = auto_save_enabled;
        settings.save_to_path(&path)
    });
    if let Err(e) = result {
        warn!("Failed to record last session: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{item_ids, read_catalog, setup};
    use chrono::Duration;
    use tempfile::TempDir;

    fn shell(config: &Config, file: &Path) -> Shell {
        let session = open_session(file, config).unwrap();
        Shell::new(session, file.to_path_buf(), AutosaveStore::from_config(config))
    }

    fn exec(shell: &mut Shell, line: &str) -> String {
        let mut out = Vec::new();
        shell.execute_at(line, Utc::now(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn exec_err(shell: &mut Shell, line: &str) -> String {
        let mut out = Vec::new();
        shell.execute_at(line, Utc::now(), &mut out).unwrap_err().to_string()
    }

    fn no_autosave(temp: &TempDir) -> Config {
        Config {
            data_dir: temp.path().join("data"),
            autosave_enabled: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_create_undo_redo() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        assert!(exec(&mut shell, "create team Blues").contains("Created team_2"));
        assert_eq!(shell.session().store().get("team_2").unwrap().display_name(), Some("Blues"));

        assert!(exec(&mut shell, "undo").contains("Undid"));
        assert!(shell.session().store().get("team_2").is_none());

        exec(&mut shell, "redo");
        assert!(shell.session().store().get("team_2").is_some());
    }

    #[test]
    fn test_set_parses_json_values() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        exec(&mut shell, "set staff_1 IsTradable true");
        exec(&mut shell, "set staff_1 Description a fine coach");
        exec(&mut shell, "rename staff_1 Head Coach");

        let staff = shell.session().store().get("staff_1").unwrap();
        assert_eq!(staff.fields["IsTradable"], Value::Bool(true));
        assert_eq!(staff.fields["Description"], "a fine coach");
        assert_eq!(staff.display_name(), Some("Head Coach"));
        assert_eq!(shell.session().history().len(), 3);
    }

    #[test]
    fn test_bundle_membership_commands() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        exec(&mut shell, "add staff_1 club_1");
        assert!(shell.session().store().is_member("staff_1"));

        exec(&mut shell, "move staff_1 club_1 -");
        assert!(!shell.session().store().is_member("staff_1"));

        assert!(exec_err(&mut shell, "remove staff_1 club_1").contains("not in"));
        assert_eq!(shell.session().history().len(), 2);
    }

    #[test]
    fn test_delete_then_undo_restores_membership() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        exec(&mut shell, "delete player_1");
        assert!(!shell.session().store().bundle("club_1").unwrap().has_member("player_1"));

        exec(&mut shell, "undo");
        let club = shell.session().store().bundle("club_1").unwrap();
        assert_eq!(club.member_ids(), vec!["player_1", "team_1"]);
    }

    #[test]
    fn test_unknown_command_and_bad_args() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        assert!(exec_err(&mut shell, "frobnicate").contains("Unknown command"));
        assert!(exec_err(&mut shell, "show").contains("Unknown command"));
        assert!(exec_err(&mut shell, "show ghost").contains("Item not found"));
        assert_eq!(exec(&mut shell, "   "), "");
    }

    #[test]
    fn test_quit_warns_once_when_dirty() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);
        let mut out = Vec::new();

        assert_eq!(shell.execute_at("quit", Utc::now(), &mut out).unwrap(), Flow::Quit);

        let mut shell = self::shell(&config, &file);
        exec(&mut shell, "create player");
        assert_eq!(shell.execute_at("quit", Utc::now(), &mut out).unwrap(), Flow::Continue);
        assert_eq!(shell.execute_at("quit", Utc::now(), &mut out).unwrap(), Flow::Quit);
    }

    #[test]
    fn test_save_writes_file_and_clears_dirty() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);

        exec(&mut shell, "delete staff_1");
        assert!(shell.session().has_unsaved_changes());
        exec(&mut shell, "save");
        assert!(!shell.session().has_unsaved_changes());

        assert_eq!(item_ids(&read_catalog(&file)), vec!["player_1", "team_1", "club_1"]);
    }

    #[test]
    fn test_autosave_fires_after_interval() {
        let (temp, file, _) = setup();
        let config = Config {
            data_dir: temp.path().join("data"),
            autosave_interval_secs: 30,
            ..Config::default()
        };
        let mut shell = shell(&config, &file);
        let start = Utc::now();
        let mut out = Vec::new();

        // Dirty but inside the interval
        shell.execute_at("delete staff_1", start, &mut out).unwrap();
        assert!(!config.autosave_path().exists());

        // Interval elapsed
        shell
            .execute_at("list", start + Duration::seconds(31), &mut out)
            .unwrap();
        assert!(config.autosave_path().exists());
        assert!(!shell.session().has_unsaved_changes());
        assert!(String::from_utf8(out).unwrap().contains("(autosaved)"));
    }

    #[test]
    fn test_autosave_off() {
        let (temp, file, _) = setup();
        let config = Config {
            data_dir: temp.path().join("data"),
            autosave_interval_secs: 0,
            ..Config::default()
        };
        let mut shell = shell(&config, &file);

        exec(&mut shell, "autosave off");
        exec(&mut shell, "delete staff_1");
        assert!(!config.autosave_path().exists());

        exec(&mut shell, "autosave on");
        assert!(config.autosave_path().exists());
    }

    #[test]
    fn test_run_loop_reads_until_quit() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);
        let mut shell = shell(&config, &file);
        let input = "rename team_1 Greens\nbogus\nsave\nquit\ncreate player\n";
        let mut out = Vec::new();

        shell.run_loop(input.as_bytes(), &mut out, false).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("error: Unknown command"));
        assert!(out.contains("Saved 4 item(s)"));
        // Nothing after quit ran
        assert!(shell.session().store().get("player_2").is_none());
        assert_eq!(read_catalog(&file)["Catalog"][1]["DisplayName"], "Greens");
    }

    #[test]
    fn test_remember_session() {
        let (temp, file, _) = setup();
        let config = no_autosave(&temp);

        remember_session(&config, &file, false);

        let settings = Settings::load_from_path(&config.settings_path()).unwrap();
        assert_eq!(settings.last_session.file_path, Some(file.display().to_string()));
        assert!(!settings.last_session.auto_save_enabled);
        assert!(settings.last_session.timestamp.is_some());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_value("plain words"), Value::String("plain words".into()));
    }
}
