use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_screen, BookingDraft, BookingFlow, CannedReplies, ConsultationRoom, FlowTimings,
    MarketplaceClient, RoomEvent, ScreenData, SessionStore, Speaker,
};
use directory::{fixtures::sample_lawyers, DirectoryStore, FilterPatch, SortDirection, SortKey};
use serde::Serialize;
use shared::{
    domain::{ConsultationType, Lawyer, LawyerId},
    protocol::{AdminUserQuery, LawyerQuery},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Console client for the consultation marketplace")]
struct Cli {
    /// Marketplace server; without it the bundled sample lawyers are used.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, default_value = "./data/session.json")]
    session_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Browse {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_delimiter = ',')]
        specialty: Vec<String>,
        #[arg(long)]
        online: bool,
        #[arg(long, default_value = "rating")]
        sort: String,
        #[arg(long)]
        asc: bool,
    },
    Login {
        username: String,
    },
    Logout,
    Book {
        lawyer_id: i64,
        #[arg(long, value_enum, default_value = "text")]
        kind: KindArg,
        /// Hours from now for phone or video consultations.
        #[arg(long)]
        in_hours: Option<i64>,
        #[arg(long, default_value_t = 60)]
        minutes: u32,
        #[arg(long)]
        description: String,
    },
    /// Simulated chat; type `/end` to finish.
    Chat {
        lawyer_id: i64,
    },
    Admin {
        #[arg(value_enum)]
        screen: AdminScreen,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Text,
    Phone,
    Video,
}

impl From<KindArg> for ConsultationType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Text => ConsultationType::Text,
            KindArg::Phone => ConsultationType::Phone,
            KindArg::Video => ConsultationType::Video,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AdminScreen {
    Dashboard,
    Users,
    Consultations,
    Payments,
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut sessions = SessionStore::persistent(&cli.session_file);

    match cli.command {
        Command::Browse {
            search,
            specialty,
            online,
            sort,
            asc,
        } => {
            let mut store = DirectoryStore::new(load_lawyers(cli.server_url.as_deref()).await?);
            store.set_search(search);
            store.set_filters(
                FilterPatch::default()
                    .specialties(specialty)
                    .online(online.then_some(true)),
            );
            let key = SortKey::parse(&sort).ok_or_else(|| anyhow!("unknown sort key '{sort}'"))?;
            let direction = if asc {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            };
            store.set_sort(key, direction);
            for lawyer in store.visible() {
                print_lawyer(lawyer);
            }
            println!("{} of {} lawyers", store.visible().len(), store.all().len());
        }
        Command::Login { username } => {
            let mut client = client_for(cli.server_url.as_deref())?;
            let session = client.login(&username).await?;
            println!(
                "signed in as {} ({})",
                session.user.display_name,
                session.user.role.as_str()
            );
            sessions.sign_in(session)?;
        }
        Command::Logout => {
            sessions.sign_out()?;
            println!("signed out");
        }
        Command::Book {
            lawyer_id,
            kind,
            in_hours,
            minutes,
            description,
        } => {
            let lawyer = resolve_lawyer(cli.server_url.as_deref(), LawyerId(lawyer_id)).await?;
            let mut draft = BookingDraft::new(kind.into(), description).lasting(minutes);
            if let Some(hours) = in_hours {
                draft = draft.at(Utc::now() + Duration::hours(hours));
            }

            let mut flow = BookingFlow::new(lawyer, FlowTimings::default());
            println!(
                "booking {} for {} minutes, fee {}",
                flow.lawyer().name,
                minutes,
                flow.quote(minutes)
            );
            match flow.submit(sessions.current(), draft).await {
                Ok(receipt) => {
                    println!(
                        "booked: reference {} status {}",
                        receipt.reference,
                        receipt.consultation.status.as_str()
                    );
                    if let Some(next) = flow.await_redirect().await {
                        println!("next: {next:?}");
                    }
                }
                Err(err) => println!("{}", flow.notice().unwrap_or(&err.to_string())),
            }
        }
        Command::Chat { lawyer_id } => {
            let lawyer = resolve_lawyer(cli.server_url.as_deref(), LawyerId(lawyer_id)).await?;
            chat(lawyer).await?;
        }
        Command::Admin { screen } => {
            let session = sessions
                .current()
                .filter(|s| s.is_admin())
                .ok_or_else(|| anyhow!("sign in as an admin first"))?;
            let client = client_for(cli.server_url.as_deref())?.with_session(session);
            match screen {
                AdminScreen::Dashboard => show(load_screen(client.admin_dashboard()).await)?,
                AdminScreen::Users => {
                    show(load_screen(client.admin_users(&AdminUserQuery::default())).await)?
                }
                AdminScreen::Consultations => {
                    show(load_screen(client.admin_consultations(None)).await)?
                }
                AdminScreen::Payments => show(load_screen(client.admin_payments()).await)?,
                AdminScreen::Settings => show(load_screen(client.admin_settings()).await)?,
            }
        }
    }

    Ok(())
}

fn client_for(server_url: Option<&str>) -> Result<MarketplaceClient> {
    let url = server_url.ok_or_else(|| anyhow!("--server-url is required for this command"))?;
    Ok(MarketplaceClient::new(url)?)
}

async fn load_lawyers(server_url: Option<&str>) -> Result<Vec<Lawyer>> {
    match server_url {
        Some(url) => Ok(MarketplaceClient::new(url)?
            .list_lawyers(&LawyerQuery::default())
            .await?),
        None => Ok(sample_lawyers()),
    }
}

async fn resolve_lawyer(server_url: Option<&str>, id: LawyerId) -> Result<Lawyer> {
    match server_url {
        Some(url) => Ok(MarketplaceClient::new(url)?.lawyer(id).await?),
        None => sample_lawyers()
            .into_iter()
            .find(|lawyer| lawyer.id == id)
            .with_context(|| format!("no sample lawyer with id {}", id.0)),
    }
}

async fn chat(lawyer: Lawyer) -> Result<()> {
    let room = ConsultationRoom::open(
        lawyer,
        FlowTimings::default(),
        Arc::new(CannedReplies::default()),
    );
    let mut events = room.subscribe();
    println!("connecting to {}...", room.lawyer().name);

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RoomEvent::StateChanged(state) => println!("[{state:?}]"),
                RoomEvent::Message(message) if message.speaker != Speaker::Client => {
                    println!("{:?}: {}", message.speaker, message.body)
                }
                RoomEvent::Message(_) => {}
                RoomEvent::Navigate(next) => {
                    println!("leaving room: {next:?}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/end" {
            break;
        }
        if let Err(err) = room.send(&line).await {
            println!("{err}");
        }
    }

    room.end().await?;
    printer.await.context("room event printer panicked")?;
    Ok(())
}

fn show<T: Serialize>(screen: ScreenData<T>) -> Result<()> {
    match screen {
        ScreenData::Loaded(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ScreenData::Unavailable { reason } => {
            warn!(%reason, "screen unavailable");
            bail!("data unavailable: {reason}");
        }
    }
    Ok(())
}

fn print_lawyer(lawyer: &Lawyer) {
    println!(
        "#{} {}  {:.1} ({} reviews)  {}/h  {} years  {}{}",
        lawyer.id.0,
        lawyer.name,
        lawyer.rating,
        lawyer.review_count,
        lawyer.hourly_rate,
        lawyer.experience,
        lawyer.location,
        if lawyer.is_online { "  online" } else { "" }
    );
}
