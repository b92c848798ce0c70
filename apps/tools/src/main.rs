use std::{path::PathBuf, process::ExitCode};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use directory::{engine, fixtures::sample_lawyers, DirectoryQuery};
use shared::{domain::UserRole, protocol::LawyerQuery};
use storage::{normalize_database_url, NewUser, Storage};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Maintenance commands for the consultation marketplace database")]
struct Cli {
    #[arg(long, default_value = storage::DEFAULT_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a SQL file as-is and print per-table row counts.
    RunSql { file: PathBuf },
    /// Insert or refresh the sample lawyer profiles.
    SeedSample,
    CreateUser {
        username: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, default_value = "client")]
        role: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Run a directory query against the stored lawyers.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    text: Option<String>,
    /// Comma separated specialties.
    #[arg(long)]
    specialties: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    max_price: Option<u32>,
    #[arg(long)]
    min_rating: Option<f64>,
    #[arg(long)]
    online: Option<bool>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    direction: Option<String>,
}

impl From<SearchArgs> for LawyerQuery {
    fn from(args: SearchArgs) -> Self {
        Self {
            search: args.text,
            specialties: args.specialties,
            location: args.location,
            max_price: args.max_price,
            min_rating: args.min_rating,
            online: args.online,
            sort: args.sort,
            direction: args.direction,
            ..Self::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let database_url = normalize_database_url(&cli.database_url);
    let storage = Storage::new(&database_url).await?;

    match cli.command {
        Command::RunSql { file } => {
            let report = storage.run_sql_file(&file).await?;
            println!(
                "applied {} ({} statements, {} rows affected)",
                report.path.display(),
                report.statements,
                report.rows_affected
            );
            for (table, count) in &report.table_counts {
                println!("  {table:<24} {count}");
            }
        }
        Command::SeedSample => {
            let lawyers = sample_lawyers();
            for lawyer in &lawyers {
                storage.upsert_lawyer(lawyer).await?;
            }
            info!(count = lawyers.len(), "seeded sample lawyers");
            println!("seeded {} lawyers", lawyers.len());
        }
        Command::CreateUser {
            username,
            display_name,
            role,
            email,
            phone,
        } => {
            let role = UserRole::parse(&role).ok_or_else(|| anyhow!("unknown role '{role}'"))?;
            let user = storage
                .create_user(&NewUser {
                    display_name: display_name.unwrap_or_else(|| username.clone()),
                    username,
                    email,
                    phone,
                    role,
                })
                .await?;
            println!(
                "created user_id={} username={} role={}",
                user.id.0,
                user.username,
                user.role.as_str()
            );
        }
        Command::Search(args) => {
            let query = LawyerQuery::from(args);
            let lawyers = storage.list_lawyers().await?;
            let visible = engine::apply(&lawyers, &DirectoryQuery::from(&query));
            for lawyer in &visible {
                println!(
                    "{:>4}  {}  rating={:.1} reviews={} rate={} exp={}y online={}  [{}]  {}",
                    lawyer.id.0,
                    lawyer.name,
                    lawyer.rating,
                    lawyer.review_count,
                    lawyer.hourly_rate,
                    lawyer.experience,
                    lawyer.is_online,
                    lawyer.specialties.join(", "),
                    lawyer.location
                );
            }
            println!("{} of {} lawyers match", visible.len(), lawyers.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_flags_map_onto_lawyer_query() {
        let cli = Cli::try_parse_from([
            "tools",
            "--database-url",
            "sqlite::memory:",
            "search",
            "--specialties",
            "婚姻家庭,继承纠纷",
            "--online",
            "true",
            "--sort",
            "price",
        ])
        .expect("parse");
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        let query = LawyerQuery::from(args);
        assert_eq!(query.specialties.as_deref(), Some("婚姻家庭,继承纠纷"));
        assert_eq!(query.online, Some(true));
        assert_eq!(query.sort.as_deref(), Some("price"));
        assert!(query.min_experience.is_none());
    }

    #[test]
    fn run_sql_requires_a_file() {
        assert!(Cli::try_parse_from(["tools", "run-sql"]).is_err());
        let cli = Cli::try_parse_from(["tools", "run-sql", "patch.sql"]).expect("parse");
        assert!(matches!(cli.command, Command::RunSql { ref file } if file.ends_with("patch.sql")));
    }
}
