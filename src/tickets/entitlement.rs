//! Derived entitlement values for the ticket dashboard: how many tickets the
//! active package still allows this month, and when the next support response
//! is due. Pure functions over the ticket list so the dashboard can re-poll
//! them every minute without touching state.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::SupportTicket;

/// Monthly ticket allowance. Serialized as a plain number, or the
/// `"unlimited"` sentinel the storefront renders verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketQuota {
    Limited(u32),
    Unlimited,
}

impl TicketQuota {
    /// Map the nullable `monthly_tickets` column: NULL means unlimited.
    pub fn from_column(monthly_tickets: Option<i32>) -> Self {
        match monthly_tickets {
            Some(n) => Self::Limited(n.max(0) as u32),
            None => Self::Unlimited,
        }
    }

    pub fn to_column(self) -> Option<i32> {
        match self {
            Self::Limited(n) => Some(n as i32),
            Self::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl Serialize for TicketQuota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for TicketQuota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Tag(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Self::Limited(n)),
            Raw::Tag(s) if s == "unlimited" => Ok(Self::Unlimited),
            Raw::Tag(other) => Err(D::Error::custom(format!(
                "expected a ticket count or \"unlimited\", got \"{other}\""
            ))),
        }
    }
}

/// Countdown to the SLA deadline of the oldest unanswered ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseCountdown {
    pub overdue: bool,
    pub hours: i64,
    pub minutes: i64,
    pub deadline: DateTime<Utc>,
    pub label: String,
}

/// Tickets created in the same calendar month (and year) as `now`.
pub fn used_this_month(tickets: &[SupportTicket], now: DateTime<Utc>) -> u32 {
    tickets
        .iter()
        .filter(|t| t.created_at.month() == now.month() && t.created_at.year() == now.year())
        .count() as u32
}

/// Remaining tickets under `quota` for the current calendar month.
/// Unlimited stays unlimited; a limited quota never goes negative.
pub fn remaining_tickets(
    quota: TicketQuota,
    tickets: &[SupportTicket],
    now: DateTime<Utc>,
) -> TicketQuota {
    match quota {
        TicketQuota::Unlimited => TicketQuota::Unlimited,
        TicketQuota::Limited(limit) => {
            TicketQuota::Limited(limit.saturating_sub(used_this_month(tickets, now)))
        }
    }
}

/// SLA countdown for the oldest ticket still waiting on support
/// (status open or in_progress). None when nothing is waiting.
pub fn next_response_due(
    response_hours: i32,
    tickets: &[SupportTicket],
    now: DateTime<Utc>,
) -> Option<ResponseCountdown> {
    let oldest = tickets
        .iter()
        .filter(|t| matches!(t.status.as_str(), "open" | "in_progress"))
        .min_by_key(|t| t.created_at)?;

    let deadline = oldest.created_at + Duration::hours(i64::from(response_hours));
    let remaining = deadline - now;

    if remaining <= Duration::zero() {
        return Some(ResponseCountdown {
            overdue: true,
            hours: 0,
            minutes: 0,
            deadline,
            label: "Overdue".to_string(),
        });
    }

    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    Some(ResponseCountdown {
        overdue: false,
        hours,
        minutes,
        deadline,
        label: format!("{hours}h {minutes}m"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn ticket(created_at: DateTime<Utc>, status: &str) -> SupportTicket {
        SupportTicket {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            subject: "printer on fire".to_string(),
            category: "technical".to_string(),
            priority: "high".to_string(),
            message: "see subject".to_string(),
            status: status.to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn each_ticket_this_month_costs_exactly_one() {
        let now = at(2026, 8, 20, 12);
        let mut tickets = Vec::new();
        for n in 0..4u32 {
            assert_eq!(
                remaining_tickets(TicketQuota::Limited(4), &tickets, now),
                TicketQuota::Limited(4 - n)
            );
            tickets.push(ticket(at(2026, 8, n + 1, 9), "open"));
        }
        assert_eq!(
            remaining_tickets(TicketQuota::Limited(4), &tickets, now),
            TicketQuota::Limited(0)
        );
    }

    #[test]
    fn quota_floors_at_zero() {
        let now = at(2026, 8, 20, 12);
        let tickets: Vec<_> = (1..=6).map(|d| ticket(at(2026, 8, d, 9), "open")).collect();
        assert_eq!(
            remaining_tickets(TicketQuota::Limited(4), &tickets, now),
            TicketQuota::Limited(0)
        );
    }

    #[test]
    fn other_months_do_not_count() {
        let now = at(2026, 8, 20, 12);
        let tickets = vec![
            ticket(at(2026, 7, 31, 23), "open"),
            // same month, previous year
            ticket(at(2025, 8, 20, 12), "open"),
            ticket(at(2026, 8, 1, 0), "open"),
        ];
        assert_eq!(
            remaining_tickets(TicketQuota::Limited(4), &tickets, now),
            TicketQuota::Limited(3)
        );
    }

    #[test]
    fn unlimited_stays_unlimited() {
        let now = at(2026, 8, 20, 12);
        let tickets: Vec<_> = (1..=20)
            .map(|d| ticket(at(2026, 8, d, 9), "open"))
            .collect();
        assert_eq!(
            remaining_tickets(TicketQuota::Unlimited, &tickets, now),
            TicketQuota::Unlimited
        );
    }

    #[test]
    fn overdue_iff_past_deadline() {
        let created = at(2026, 8, 1, 0);
        let tickets = vec![ticket(created, "open")];

        let before = next_response_due(48, &tickets, at(2026, 8, 2, 23)).unwrap();
        assert!(!before.overdue);
        assert_eq!(before.hours, 1);
        assert_eq!(before.minutes, 0);
        assert_eq!(before.label, "1h 0m");

        // exactly at the deadline counts as overdue
        let at_deadline = next_response_due(48, &tickets, at(2026, 8, 3, 0)).unwrap();
        assert!(at_deadline.overdue);
        assert_eq!(at_deadline.label, "Overdue");

        let after = next_response_due(48, &tickets, at(2026, 8, 4, 0)).unwrap();
        assert!(after.overdue);
        assert_eq!(after.hours, 0);
        assert_eq!(after.minutes, 0);
    }

    #[test]
    fn countdown_tracks_oldest_waiting_ticket() {
        let tickets = vec![
            ticket(at(2026, 8, 5, 0), "resolved"),
            ticket(at(2026, 8, 6, 0), "in_progress"),
            ticket(at(2026, 8, 7, 0), "open"),
        ];
        let due = next_response_due(48, &tickets, at(2026, 8, 6, 12)).unwrap();
        // the resolved ticket is ignored; the in_progress one is oldest
        assert_eq!(due.deadline, at(2026, 8, 8, 0));
        assert_eq!(due.hours, 36);
    }

    #[test]
    fn no_countdown_without_waiting_tickets() {
        let tickets = vec![
            ticket(at(2026, 8, 5, 0), "resolved"),
            ticket(at(2026, 8, 6, 0), "closed"),
        ];
        assert!(next_response_due(48, &tickets, at(2026, 8, 7, 0)).is_none());
        assert!(next_response_due(48, &[], at(2026, 8, 7, 0)).is_none());
    }

    #[test]
    fn quota_wire_format_round_trips() {
        assert_eq!(
            serde_json::to_value(TicketQuota::Limited(4)).unwrap(),
            serde_json::json!(4)
        );
        assert_eq!(
            serde_json::to_value(TicketQuota::Unlimited).unwrap(),
            serde_json::json!("unlimited")
        );
        let q: TicketQuota = serde_json::from_value(serde_json::json!("unlimited")).unwrap();
        assert_eq!(q, TicketQuota::Unlimited);
        let q: TicketQuota = serde_json::from_value(serde_json::json!(10)).unwrap();
        assert_eq!(q, TicketQuota::Limited(10));
        assert!(serde_json::from_value::<TicketQuota>(serde_json::json!("lots")).is_err());
    }
}
