//! Output formatting for CLI client commands.
//!
//! Human-readable tables and status lines on stdout.

use std::fmt::Write;

use crate::ipc::protocol::PendingDescriptor;

/// Print pending identifiers as a table to stdout.
pub fn print_pending(pending: &[PendingDescriptor]) {
    print!("{}", render_pending(pending));
}

/// Print enqueue success.
pub fn print_enqueued(asset: &str) {
    println!("Enqueued {asset}");
}

fn render_pending(pending: &[PendingDescriptor]) -> String {
    if pending.is_empty() {
        return "No pending deletions\n".to_string();
    }

    let width = pending
        .iter()
        .map(|p| p.asset.len())
        .max()
        .unwrap_or(0)
        .max("ASSET".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$} STATE", "ASSET");
    let _ = writeln!(out, "{}", "-".repeat(width + 10));
    for p in pending {
        let _ = writeln!(
            out,
            "{:<width$} {}",
            p.asset,
            if p.in_flight { "in-flight" } else { "pending" }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(asset: &str, in_flight: bool) -> PendingDescriptor {
        PendingDescriptor {
            asset: asset.to_string(),
            in_flight,
        }
    }

    #[test]
    fn empty_queue_has_a_message() {
        assert_eq!(render_pending(&[]), "No pending deletions\n");
    }

    #[test]
    fn table_marks_in_flight_rows() {
        let out = render_pending(&[descriptor("A1", true), descriptor("asset-22", false)]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ASSET    STATE");
        assert_eq!(lines[2], "A1       in-flight");
        assert_eq!(lines[3], "asset-22 pending");
    }

    #[test]
    fn column_is_at_least_header_width() {
        let out = render_pending(&[descriptor("a", false)]);
        assert!(out.lines().nth(2).unwrap().starts_with("a     pending"));
    }
}
