use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row labels of the seating chart provisioned for every event.
pub const SEAT_ROWS: [&str; 5] = ["A", "B", "C", "D", "E"];
pub const SEATS_PER_ROW: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Occupied,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Occupied => "occupied",
        }
    }

    /// Older records used `booked`/`purchased` for sold seats.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "occupied" | "booked" | "purchased" => SeatStatus::Occupied,
            _ => SeatStatus::Available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub event_id: Uuid,
    /// Row letter followed by the seat number, e.g. `B5`.
    pub label: String,
    pub row: String,
    pub number: i32,
    pub status: SeatStatus,
    pub user_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn available(event_id: Uuid, row: &str, number: i32) -> Self {
        Self {
            event_id,
            label: format!("{row}{number}"),
            row: row.to_string(),
            number,
            status: SeatStatus::Available,
            user_id: None,
            purchase_id: None,
            updated_at: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status == SeatStatus::Occupied
    }
}

/// Splits `"C10"` into `("C", 10)`.
pub fn parse_label(label: &str) -> Option<(String, i32)> {
    let split = label.find(|c: char| c.is_ascii_digit())?;
    let (row, number) = label.split_at(split);
    if row.is_empty() || !row.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let number = number.parse::<i32>().ok()?;
    Some((row.to_string(), number))
}

/// The fixed 5x10 grid written when an event is created.
pub fn provision_grid(event_id: Uuid) -> Vec<Seat> {
    SEAT_ROWS
        .iter()
        .flat_map(|row| (1..=SEATS_PER_ROW).map(move |n| Seat::available(event_id, row, n)))
        .collect()
}
