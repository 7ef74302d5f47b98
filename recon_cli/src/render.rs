//! Terminal output for session events and results.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use recon_session::{NoticeLevel, RenderHandoff, Session, SessionEvent, SessionStatus};
use recon_types::StatusResponse;

/// Prints one line per visible change; repeated snapshots with the same status and
/// progress are folded away.
#[derive(Default)]
pub struct TerminalRenderer {
    last_line: Mutex<Option<String>>,
    last_upload_percent: Mutex<Option<u8>>,
}

impl TerminalRenderer {
    pub fn into_listener(self) -> impl Fn(&SessionEvent) + Send + Sync + 'static {
        let renderer = Arc::new(self);
        move |event| renderer.handle(event)
    }

    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Changed(session) => {
                let line = status_line(session);
                let mut last = self.last_line.lock();
                if last.as_deref() != Some(line.as_str()) {
                    eprintln!("{line}");
                    *last = Some(line);
                }
            },
            SessionEvent::UploadProgress(percent) => {
                let mut last = self.last_upload_percent.lock();
                if *last != Some(*percent) {
                    eprint!("\ruploading {percent:>3}%");
                    if *percent == 100 {
                        eprintln!();
                    }
                    let _ = std::io::stderr().flush();
                    *last = Some(*percent);
                }
            },
            SessionEvent::Notice(notice) => eprintln!("{}{notice}", notice_prefix(notice.level)),
        }
    }
}

fn notice_prefix(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "",
        NoticeLevel::Success => "ok: ",
        NoticeLevel::Warning => "warning: ",
        NoticeLevel::Error => "error: ",
    }
}

pub fn status_line(session: &Session) -> String {
    match session.status {
        SessionStatus::Processing => format!(
            "processing {:>3}% ({} elapsed)",
            session.progress,
            format_elapsed(session.elapsed_seconds)
        ),
        SessionStatus::Failed => format!("failed: {}", session.error.as_deref().unwrap_or("unknown error")),
        status => status.to_string(),
    }
}

/// `75` -> `1m 15s`, `3725` -> `1h 02m 05s`.
pub fn format_elapsed(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}

pub fn print_session(session: &Session) {
    if let Some(id) = &session.session_id {
        println!("session:  {id}");
    }
    println!("status:   {}", session.status);
    println!("quality:  {}", session.quality);
    println!("method:   {}", session.method);
    if let Some(n) = session.num_images {
        println!("images:   {n}");
    }
    if session.elapsed_seconds > 0 {
        println!("elapsed:  {}", format_elapsed(session.elapsed_seconds));
    }
    if let Some(error) = &session.error {
        println!("error:    {error}");
    }
    for file in &session.result_files {
        println!("file:     {}  {}", file.filename, file.download_url);
    }
}

pub fn print_status(status: &StatusResponse) {
    print!("{}", status.status);
    if let Some(progress) = status.clamped_progress() {
        print!("  {progress}%");
    }
    if let Some(elapsed) = status.elapsed_seconds() {
        print!("  {}", format_elapsed(elapsed));
    }
    if let Some(error) = &status.error {
        print!("  {error}");
    }
    println!();
}

pub fn print_handoff(handoff: &RenderHandoff) {
    println!("model:    {} ({})", handoff.model_url(), handoff.model_type());
}

#[cfg(test)]
mod tests {
    use recon_types::SessionId;

    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(42), "42s");
        assert_eq!(format_elapsed(75), "1m 15s");
        assert_eq!(format_elapsed(3725), "1h 02m 05s");
    }

    #[test]
    fn test_status_line() {
        let mut session = Session {
            session_id: Some(SessionId::from("abc")),
            status: SessionStatus::Processing,
            progress: 40,
            elapsed_seconds: 65,
            ..Default::default()
        };
        assert_eq!(status_line(&session), "processing  40% (1m 05s elapsed)");

        session.status = SessionStatus::Failed;
        session.error = Some("out of memory".to_owned());
        assert_eq!(status_line(&session), "failed: out of memory");

        session.status = SessionStatus::Uploaded;
        assert_eq!(status_line(&session), "uploaded");
    }
}
