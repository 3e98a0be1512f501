//! Textual rendering of aggregation snapshots
//!
//! Presentation-only: works on copy-out snapshots and never touches engine
//! state. Bytes that changed recently are marked with `*`, a textual
//! stand-in for a GUI's change-highlight animation.

use can_sniffer_core::aggregate::AggregatedSource;
use can_sniffer_core::labels::{FunctionDb, IdLabels};
use can_sniffer_core::monitor::Monitor;

/// How long a changed byte keeps its marker, in seconds.
const HIGHLIGHT_SECS: f64 = 0.5;

/// Render the live monitor table.
///
/// `now` is the current session time, used to age the change markers.
pub fn render_table(
    snapshot: &[AggregatedSource],
    labels: &IdLabels,
    functions: &FunctionDb,
    now: f64,
) -> String {
    let mut rows = snapshot.to_vec();
    // display order only; the session log is untouched
    rows.sort_by(|a, b| a.last_frame.id.cmp(&b.last_frame.id));

    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:<16} {:<20} {:>3} {:>3} {:>3}  {}\n",
        "ID", "DEVICE", "FUNCTION", "RTR", "IDE", "DLC", "D0  D1  D2  D3  D4  D5  D6  D7"
    ));

    for source in &rows {
        let frame = &source.last_frame;
        let device = labels.get(&frame.id).unwrap_or("---");
        let function = functions
            .function_for(&frame.id, &frame.payload_text())
            .unwrap_or("---");

        let mut bytes = String::new();
        for (i, byte) in frame.payload.iter().enumerate() {
            let fresh = source.last_change[i]
                .map(|at| now - at < HIGHLIGHT_SECS)
                .unwrap_or(false);
            bytes.push_str(&format!("{:02X}{} ", byte, if fresh { "*" } else { " " }));
        }

        out.push_str(&format!(
            "{:<10} {:<16} {:<20} {:>3} {:>3} {:>3}  {}\n",
            frame.id,
            device,
            function,
            frame.rtr as u8,
            frame.ide as u8,
            frame.dlc,
            bytes.trim_end()
        ));
    }
    out
}

/// One-line run statistics.
pub fn render_summary(monitor: &Monitor) -> String {
    format!(
        "{} sources, {} frames accepted, {} filtered, {} dropped on overflow",
        monitor.snapshot().len(),
        monitor.accepted(),
        monitor.rejected(),
        monitor.dropped()
    )
}
