use std::fmt::Write;

use safewatch_core::StatusSnapshot;

/// Text status panel. Log lines are printed once, as they arrive.
#[derive(Debug, Default)]
pub struct Panel {
    next_seq: u64,
}

impl Panel {
    pub fn render(&mut self, snap: &StatusSnapshot) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "-- safewatch ------------------------------------");

        let location = match snap.location {
            Some(l) => format!("{:.5}, {:.5}", l.lat, l.lng),
            None => "unknown".to_string(),
        };
        let _ = writeln!(out, "location : {}", location);

        let online = match snap.online {
            Some(true) => " (online)",
            Some(false) => " (OFFLINE)",
            None => "",
        };
        let pending = if snap.escalation_pending { " [escalation pending]" } else { "" };
        let _ = writeln!(out, "network  : {}{}{}", snap.network, online, pending);

        match &snap.emergency {
            Some(e) => {
                let _ = writeln!(out, "status   : !! EMERGENCY: {} ({}s) !!", e.reason, e.started_at.elapsed().as_secs());
            }
            None => {
                let _ = writeln!(out, "status   : ok{}", if snap.inactive { " (inactive)" } else { "" });
            }
        }

        for entry in snap.log.iter().filter(|e| e.seq >= self.next_seq) {
            let _ = writeln!(out, "  [{}] {}", clock(entry.ts_unix_ms), entry.message);
        }
        self.next_seq = snap.log_total;
        out
    }
}

fn clock(ts_unix_ms: i64) -> String {
    match time::OffsetDateTime::from_unix_timestamp_nanos(ts_unix_ms as i128 * 1_000_000) {
        Ok(t) => format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second()),
        Err(_) => "--:--:--".to_string(),
    }
}
