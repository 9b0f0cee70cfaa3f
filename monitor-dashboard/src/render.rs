//! Projection of the endpoint state into a display tree.
//!
//! Rendering is a pure function of its inputs; the current time is passed
//! in so the same inputs always produce the same tree.

use chrono::{DateTime, Utc};
use monitor_core::EndpointRecord;
use std::fmt;

use crate::snapshot::SnapshotStatus;

const EMPTY_HINT: &str = "No endpoints configured. Add one above to get started!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTree {
    Placeholder(Placeholder),
    Grid {
        /// Set when the latest snapshot failed; the cards are the last
        /// known state.
        banner: Option<String>,
        cards: Vec<Card>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// No snapshot has completed yet.
    Loading,
    /// The server confirmed there are no endpoints.
    Empty,
    /// Nothing is known because the snapshot failed.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    pub name: String,
    /// Raw server status; doubles as the style tag.
    pub status: String,
    pub target: String,
    pub status_code: String,
    pub response_time: String,
    pub last_check: String,
    pub interval: String,
    pub error: Option<String>,
    pub actions: [Action; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: &'static str,
    pub command: UiCommand,
}

/// Commands a rendered card can emit back into the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    CheckNow(String),
    Remove(String),
}

impl Default for DisplayTree {
    fn default() -> Self {
        DisplayTree::Placeholder(Placeholder::Loading)
    }
}

pub fn render<'a>(
    records: impl IntoIterator<Item = &'a EndpointRecord>,
    snapshot: &SnapshotStatus,
    now: DateTime<Utc>,
) -> DisplayTree {
    let cards: Vec<Card> = records.into_iter().map(|record| card(record, now)).collect();
    if cards.is_empty() {
        let placeholder = match snapshot {
            SnapshotStatus::Pending => Placeholder::Loading,
            SnapshotStatus::Loaded => Placeholder::Empty,
            SnapshotStatus::Failed(reason) => Placeholder::Unavailable {
                reason: reason.clone(),
            },
        };
        return DisplayTree::Placeholder(placeholder);
    }

    let banner = match snapshot {
        SnapshotStatus::Failed(reason) => Some(format!("Showing last known state: {}", reason)),
        _ => None,
    };

    DisplayTree::Grid { banner, cards }
}

fn card(record: &EndpointRecord, now: DateTime<Utc>) -> Card {
    Card {
        id: record.id.clone(),
        name: record.name.clone(),
        status: record.status.clone(),
        target: format!("{} {}", record.method, record.url),
        status_code: record
            .status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        response_time: format!("{}ms", record.response_time_ms.unwrap_or(0)),
        last_check: record
            .last_check
            .map(|at| relative_time(at, now))
            .unwrap_or_else(|| "Never".to_string()),
        interval: format!("{}s", record.interval_seconds),
        error: record.error.clone(),
        actions: [
            Action {
                label: "Check Now",
                command: UiCommand::CheckNow(record.id.clone()),
            },
            Action {
                label: "Remove",
                command: UiCommand::Remove(record.id.clone()),
            },
        ],
    }
}

/// Floor-divided age of `at` relative to `now`.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = (now - at).num_seconds();
    if age < 60 {
        "Just now".to_string()
    } else if age < 3600 {
        format!("{}m ago", age / 60)
    } else if age < 86_400 {
        format!("{}h ago", age / 3600)
    } else {
        at.format("%-m/%-d/%Y").to_string()
    }
}

impl fmt::Display for DisplayTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayTree::Placeholder(Placeholder::Loading) => writeln!(f, "Loading endpoints..."),
            DisplayTree::Placeholder(Placeholder::Empty) => writeln!(f, "{}", EMPTY_HINT),
            DisplayTree::Placeholder(Placeholder::Unavailable { reason }) => {
                writeln!(f, "Endpoints unavailable: {}", reason)
            }
            DisplayTree::Grid { banner, cards } => {
                if let Some(banner) = banner {
                    writeln!(f, "! {}", banner)?;
                }
                for card in cards {
                    write!(f, "{}", card)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {} ({})", self.status.to_uppercase(), self.name, self.id)?;
        writeln!(f, "    {}", self.target)?;
        writeln!(
            f,
            "    code {} | {} | last check {} | every {}",
            self.status_code, self.response_time, self.last_check, self.interval
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "    error: {}", error)?;
        }
        let actions: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        writeln!(f, "    {}", actions.join("  "))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            UiCommand::CheckNow(id) => write!(f, "{}: check {}", self.label, id),
            UiCommand::Remove(id) => write!(f, "{}: rm {}", self.label, id),
        }
    }
}
