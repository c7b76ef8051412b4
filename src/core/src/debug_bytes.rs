use std::sync::OnceLock;

use uuid::Uuid;

fn debug_terminal_bytes_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let v = std::env::var("SHELLGATE_DEBUG_TERMINAL_BYTES").unwrap_or_default();
        matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES")
    })
}

fn debug_connection_filter() -> Option<Uuid> {
    static FILTER: OnceLock<Option<Uuid>> = OnceLock::new();
    *FILTER.get_or_init(|| {
        std::env::var("SHELLGATE_DEBUG_CONNECTION")
            .ok()
            .and_then(|v| v.parse::<Uuid>().ok())
    })
}

/// Whether raw terminal bytes should be traced for this connection.
pub fn terminal_debug_enabled_for(conn_id: Uuid) -> bool {
    if !debug_terminal_bytes_enabled() {
        return false;
    }
    match debug_connection_filter() {
        Some(filter) => filter == conn_id,
        None => true,
    }
}

/// Hex + printable preview of at most `max` bytes (0 = no limit).
pub fn fmt_bytes(data: &[u8], max: usize) -> String {
    let show = if max > 0 && data.len() > max {
        &data[..max]
    } else {
        data
    };

    let hex = show
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut ascii = String::new();
    for &b in show {
        match b {
            b'\x1b' => ascii.push_str("<esc>"),
            b'\r' => ascii.push_str("<cr>"),
            b'\n' => ascii.push_str("<lf>"),
            b'\t' => ascii.push_str("<tab>"),
            0x00 => ascii.push_str("<nul>"),
            0x20..=0x7e => ascii.push(b as char),
            _ => ascii.push('.'),
        }
    }

    format!("len={} hex=[{}] ascii=\"{}\"", data.len(), hex, ascii)
}
