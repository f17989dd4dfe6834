//! The human-readable status file.
//!
//! Rendered from the per-tick [`StatusSnapshot`] and overwritten whole
//! each tick. A path of `-` writes to stdout instead.

use qdisk_core::{RecordSnapshot, StatusSnapshot};
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::time::SystemTime;

/// Render and write the snapshot to `path` (`-` means stdout).
pub fn write_status(path: &str, snapshot: &StatusSnapshot) -> io::Result<()> {
    let rendered = render(snapshot, SystemTime::now());
    if path == "-" {
        io::stdout().write_all(rendered.as_bytes())
    } else {
        std::fs::write(path, rendered)
    }
}

/// Render the snapshot to text. `stamp` is the wall-clock time of the
/// render, independent of the protocol clock (which may be uptime-based).
pub fn render(snapshot: &StatusSnapshot, stamp: SystemTime) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Time Stamp: {}", httpdate::fmt_http_date(stamp));
    let _ = writeln!(out, "Node ID: {}", snapshot.node_id);
    let _ = writeln!(
        out,
        "Score: {}/{} (Minimum required = {})",
        snapshot.score, snapshot.score_max, snapshot.score_req
    );
    let _ = writeln!(out, "Current state: {}", snapshot.state);

    let _ = write!(out, "Initializing Set: {{");
    for node in &snapshot.initializing {
        let _ = write!(out, " {node}");
    }
    let _ = writeln!(out, " }}");

    let _ = write!(out, "Visible Set: {{");
    for node in &snapshot.visible {
        let _ = write!(out, " {node}");
    }
    let _ = writeln!(out, " }}");

    // While we are still initializing there is no meaningful master view.
    if snapshot.state != qdisk_types::NodeState::Init {
        match snapshot.master {
            Some(master) => {
                let _ = writeln!(out, "Master Node ID: {master}");
                let _ = write!(out, "Quorate Set: {{");
                for node in &snapshot.quorate {
                    let _ = write!(out, " {node}");
                }
                let _ = writeln!(out, " }}");
            }
            None => {
                let _ = writeln!(out, "Master Node ID: (none)");
            }
        }
    }

    if let Some(records) = &snapshot.records {
        for record in records {
            render_record(&mut out, record);
        }
    }

    out.push('\n');
    out
}

fn render_record(out: &mut String, record: &RecordSnapshot) {
    let _ = writeln!(out, "node_info_t [node {}] {{", record.node_id);
    let _ = writeln!(out, "    incarnation = {:#018x}", record.incarnation);
    let _ = writeln!(
        out,
        "    evil_incarnation = {:#018x}",
        record.evil_incarnation
    );
    let _ = writeln!(out, "    last_seen = {}", record.last_seen);
    let _ = writeln!(out, "    misses = {}", record.misses);
    let _ = writeln!(out, "    seen = {}", record.seen);
    let _ = writeln!(
        out,
        "    msg = {{ {} arg={} seq={} }}",
        record.msg.kind, record.msg.arg, record.msg.seq
    );
    let _ = writeln!(
        out,
        "    last_msg = {{ {} arg={} seq={} }}",
        record.last_msg.kind, record.last_msg.arg, record.last_msg.seq
    );
    let _ = writeln!(out, "    state = {}", record.state);
    let _ = writeln!(out, "}}");
}
