#![cfg(not(tarpaulin_include))]

use registration_desk::config::AppConfig;
use registration_desk::dashboard::{Dashboard, DashboardView, SortConfig, SortDirection, SortKey};
use registration_desk::export;
use registration_desk::i18n::Language;
use registration_desk::notify::Notifier;
use registration_desk::registration::{RegistrationPatch, RegistrationStatus};
use registration_desk::store;
use std::env;
use std::error::Error;
use std::str::FromStr;

const USAGE: &str = "Usage: registration-admin <command> [args]

Commands:
  list [--sort KEY] [--desc] [--filter TEXT] [--lang ar|fr]
  confirm <id>
  reject <id>
  edit <id> field=value...    (fullName, email, nationalId, phone, category, status)
  delete <id> --yes
  export <path> [--csv] [--lang ar|fr]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    List,
    Confirm,
    Reject,
    Edit,
    Delete,
    Export,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Command::List),
            "confirm" => Ok(Command::Confirm),
            "reject" => Ok(Command::Reject),
            "edit" => Ok(Command::Edit),
            "delete" => Ok(Command::Delete),
            "export" => Ok(Command::Export),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args[0] == "help" || args[0] == "--help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let command = match args[0].parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return Err(e.into());
        }
    };

    let config = AppConfig::from_env()?;
    let dashboard = Dashboard::new(store::open_repository(&config).await?);
    let mut language = config.default_language;

    match command {
        Command::List => {
            let mut view = DashboardView {
                language,
                ..Default::default()
            };
            let mut direction = SortDirection::Ascending;
            let mut key = None;

            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--sort" => key = Some(next_value(&mut rest, "--sort")?.parse::<SortKey>()?),
                    "--desc" => direction = SortDirection::Descending,
                    "--filter" => view.filter = Some(next_value(&mut rest, "--filter")?.to_string()),
                    "--lang" => view.language = next_value(&mut rest, "--lang")?.parse::<Language>()?,
                    other => return Err(format!("Unknown option: {}", other).into()),
                }
            }
            if let Some(key) = key {
                view.sort = SortConfig::new(key, direction);
            }

            let rows = dashboard.list(&view).await?;
            for reg in &rows {
                println!(
                    "{}  {}  {:<25} {:<30} {:<20} {}",
                    reg.id,
                    reg.submission_date.format("%Y-%m-%d %H:%M"),
                    reg.full_name,
                    reg.email,
                    reg.category.label(view.language),
                    reg.status.label(view.language)
                );
            }
            println!("{} registration(s)", rows.len());
        }
        Command::Confirm | Command::Reject => {
            let id = args.get(1).ok_or("Missing registration id")?;
            let status = if command == Command::Confirm {
                RegistrationStatus::Confirmed
            } else {
                RegistrationStatus::Rejected
            };

            let registration = dashboard.set_status(id, status).await?;
            let notifier = Notifier::new(config.smtp.as_ref())?;
            if let Some(sentence) = notifier.status_changed(&registration, language).await {
                println!("{}", sentence);
            }
            println!("{} -> {}", registration.id, registration.status);
        }
        Command::Edit => {
            let id = args.get(1).ok_or("Missing registration id")?;
            let mut patch = RegistrationPatch::default();
            for assignment in &args[2..] {
                let (field, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| format!("Expected field=value, got {}", assignment))?;
                patch.set(field, value)?;
            }
            if patch.is_empty() {
                return Err("Nothing to edit".into());
            }

            let registration = dashboard.edit(id, &patch).await?;
            println!("{}", serde_json::to_string_pretty(&registration)?);
        }
        Command::Delete => {
            let id = args.get(1).ok_or("Missing registration id")?;
            if !args[2..].iter().any(|a| a == "--yes") {
                eprintln!("Refusing to delete {} without --yes", id);
                return Ok(());
            }
            dashboard.delete(id).await?;
            println!("Deleted {}", id);
        }
        Command::Export => {
            let path = args.get(1).ok_or("Missing output path")?;
            let mut csv = false;

            let mut rest = args[2..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--csv" => csv = true,
                    "--lang" => language = next_value(&mut rest, "--lang")?.parse::<Language>()?,
                    other => return Err(format!("Unknown option: {}", other).into()),
                }
            }

            let view = DashboardView {
                language,
                ..Default::default()
            };
            let rows = dashboard.list(&view).await?;
            if csv {
                std::fs::write(path, export::to_csv(&rows, language)?)?;
            } else {
                std::fs::write(path, export::to_xlsx(&rows, language)?)?;
            }
            println!("Exported {} registration(s) to {}", rows.len(), path);
        }
    }

    Ok(())
}

fn next_value<'a>(
    args: &mut impl Iterator<Item = &'a String>,
    option: &str,
) -> Result<&'a str, String> {
    args.next()
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", option))
}
