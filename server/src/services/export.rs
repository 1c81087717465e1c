use chrono::{DateTime, Utc};

use crate::models::Purchase;
use crate::utils::format::format_timestamp;

pub const CSV_SEPARATOR: &str = ";";
pub const CSV_LINE_BREAK: &str = "\r\n";

pub const CSV_HEADERS: [&str; 12] = [
    "ID Compra",
    "UID Usuario",
    "Email Usuario",
    "ID Evento",
    "Título Evento",
    "Fecha Evento",
    "Lugar Evento",
    "Precio Unitario (CLP)",
    "Cantidad",
    "Total Pagado (CLP)",
    "Asientos",
    "Fecha Compra",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
    pub rows: usize,
}

/// Wraps a value in double quotes, doubling any quote inside it.
pub fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_line<I, S>(cells: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells
        .into_iter()
        .map(|cell| csv_cell(cell.as_ref()))
        .collect::<Vec<_>>()
        .join(CSV_SEPARATOR)
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("compras_DramaTicket_{}.csv", now.format("%Y-%m-%d"))
}

/// Renders every purchase as one line under the fixed header. Returns `None`
/// when there is nothing to export.
pub fn purchases_csv(purchases: &[Purchase], now: DateTime<Utc>) -> Option<CsvExport> {
    if purchases.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(purchases.len() + 1);
    lines.push(csv_line(CSV_HEADERS));
    for p in purchases {
        lines.push(csv_line([
            p.id.to_string(),
            p.user_id.to_string(),
            p.user_email.clone().unwrap_or_default(),
            p.event_id.to_string(),
            p.event_title.clone(),
            format_timestamp(&p.event_date),
            p.event_venue.clone(),
            p.unit_price.normalize().to_string(),
            p.quantity.to_string(),
            p.total_amount.normalize().to_string(),
            p.seats.join(", "),
            format_timestamp(&p.purchased_at),
        ]));
    }

    Some(CsvExport {
        file_name: export_file_name(now),
        content: lines.join(CSV_LINE_BREAK),
        rows: purchases.len(),
    })
}
