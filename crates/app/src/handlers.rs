//! Executes one parsed command against the session and renders the outcome.

use crate::commands::{Command, HELP};
use agent_host::workflows::{self, BriefKind, VoiceBrief};
use agent_host::{RoleChange, Session, WorkflowError, ROLES};
use services::documents::Upload;
use shared::agent_api::Speaker;
use shared::error::FailureKind;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One-line prefix naming the failure category.
fn failure_title(kind: Option<FailureKind>) -> &'static str {
    match kind {
        Some(FailureKind::Extraction) => "Extraction failed",
        Some(FailureKind::MissingCredential) => "Missing API key",
        Some(FailureKind::Authentication) => "Authentication failed",
        Some(FailureKind::Transport) => "Request failed",
        Some(FailureKind::EmptyResult) => "No result",
        None => "Invalid input",
    }
}

pub fn render_error(err: &WorkflowError) -> String {
    format!("❌ {}: {}", failure_title(err.kind()), err)
}

fn read_upload(path: &Path) -> Result<Upload, String> {
    Upload::from_path(path).map_err(|e| format!("Could not read {}: {}", path.display(), e))
}

pub async fn handle<W: Write>(session: &mut Session, command: Command, out: &mut W) -> io::Result<Flow> {
    match command {
        Command::Quit => return Ok(Flow::Quit),
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Chat(text) => chat(session, &text, out).await?,
        Command::Roles => {
            for role in ROLES.iter() {
                let marker = if role.name == session.role().name { "*" } else { " " };
                writeln!(out, "{} {} {}", marker, role.icon, role.name)?;
            }
        }
        Command::Role(query) => match session.select_role(&query) {
            Ok(RoleChange::Unchanged) => writeln!(out, "Already using {}.", session.role().name)?,
            Ok(RoleChange::Switched { cleared_turns }) => {
                let role = session.role();
                writeln!(out, "Current role: {} {}", role.icon, role.name)?;
                if cleared_turns > 0 {
                    writeln!(out, "Conversation cleared ({} messages).", cleared_turns)?;
                }
            }
            Err(e) => writeln!(out, "{}", render_error(&e))?,
        },
        Command::Upload(paths) => upload(session, &paths, out)?,
        Command::Kb => {
            let kb = session.knowledge_base();
            if kb.is_empty() {
                writeln!(out, "Knowledge base is empty.")?;
            } else {
                writeln!(
                    out,
                    "Knowledge base: {} document(s), {} words",
                    kb.blocks().len(),
                    kb.word_count()
                )?;
                for block in kb.blocks() {
                    writeln!(out, "  {}", block.header())?;
                }
            }
        }
        Command::ClearKb => {
            session.clear_knowledge_base();
            writeln!(out, "Knowledge base cleared.")?;
        }
        Command::Tables => {
            if session.tables().is_empty() {
                writeln!(out, "No tables loaded.")?;
            }
            for table in session.tables() {
                writeln!(
                    out,
                    "  {} (from {}): {} rows | columns: {}",
                    table.name,
                    table.source,
                    table.row_count(),
                    table.headers.join(", ")
                )?;
            }
        }
        Command::Table(name) => match session.find_table(&name) {
            None => writeln!(out, "No table named '{}'. Try /tables.", name)?,
            Some(t) => {
                writeln!(out, "{} (from {}):", t.name, t.source)?;
                writeln!(out, "{}", t.to_plain_text())?;
            }
        },
        Command::Stats { table, column } => match session.find_table(&table) {
            None => writeln!(out, "No table named '{}'. Try /tables.", table)?,
            Some(t) => match t.column_stats(&column) {
                None => writeln!(out, "Table '{}' has no column '{}'.", t.name, column)?,
                Some(stats) => {
                    writeln!(
                        out,
                        "{}.{}: {} values, {} numeric",
                        t.name, stats.column, stats.count, stats.numeric_count
                    )?;
                    if let (Some(mean), Some(min), Some(max)) = (stats.mean, stats.min, stats.max) {
                        writeln!(
                            out,
                            "  sum {} | mean {:.2} | min {} | max {}",
                            stats.sum, mean, min, max
                        )?;
                    }
                }
            },
        },
        Command::History => {
            if session.turns().is_empty() {
                writeln!(out, "No messages yet.")?;
            }
            for turn in session.turns() {
                let who = match (turn.speaker, turn.is_error) {
                    (Speaker::User, _) => "you",
                    (Speaker::Assistant, false) => "assistant",
                    (Speaker::Assistant, true) => "error",
                };
                writeln!(out, "[{}] {}: {}", turn.timestamp.format("%H:%M:%S"), who, turn.content)?;
            }
        }
        Command::Scheme(scheme) => {
            session.set_scheme(scheme);
            writeln!(out, "Auth scheme: {}", scheme)?;
        }
        Command::Backend(backend) => {
            session.set_chat_backend(backend);
            writeln!(out, "Chat backend: {}", backend.as_str())?;
        }
        Command::Endpoints => {
            for (capability, url) in session.settings().endpoints.iter() {
                writeln!(out, "  {:<18} {}", capability.as_str(), url)?;
            }
        }
        Command::Endpoint { capability, url } => match session.set_endpoint(capability, &url) {
            Ok(()) => writeln!(out, "{} endpoint set to {}", capability, url)?,
            Err(e) => writeln!(out, "{}", render_error(&e))?,
        },
        Command::Key(raw) => {
            if session.set_credential(&raw) {
                let masked = session.credential().map(|k| k.masked()).unwrap_or_default();
                writeln!(out, "API key updated ({}).", masked)?;
            } else {
                writeln!(out, "That does not look like an API key; keeping the current one.")?;
            }
        }
        Command::Test(capability) => {
            let gateway = session.gateway();
            match workflows::test_connection(gateway.as_ref(), session.settings(), capability).await {
                Ok(reply) => writeln!(out, "✅ {} reachable: {}", capability, reply)?,
                Err(e) => writeln!(out, "{}", render_error(&e))?,
            }
        }
        Command::Brief { kind, brief } => {
            let gateway = session.gateway();
            match workflows::company_brief(gateway.as_ref(), session.settings(), &brief, kind).await {
                Ok(text) => {
                    let title = match kind {
                        BriefKind::Profile => "Company profile",
                        BriefKind::Strategy => "Approach strategy",
                    };
                    writeln!(out, "## {}: {}\n\n{}", title, brief.company, text)?;
                }
                Err(e) => writeln!(out, "{}", render_error(&e))?,
            }
        }
        Command::Tender(path) => tender(session, &path, out).await?,
        Command::Site(path) => site(session, &path, out).await?,
        Command::Analyze { path, question } => analyze(session, &path, question.as_deref(), out).await?,
        Command::Voice { input, output } => voice(session, &input, output, out).await?,
    }
    Ok(Flow::Continue)
}

async fn chat<W: Write>(session: &mut Session, text: &str, out: &mut W) -> io::Result<()> {
    let router = session.chat_router();
    let mut write_failed = None;
    let result = session
        .chat_turn(&router, text, |fragment| {
            if write_failed.is_none() {
                if let Err(e) = write!(out, "{}", fragment).and_then(|_| out.flush()) {
                    write_failed = Some(e);
                }
            }
        })
        .await;
    if let Some(e) = write_failed {
        return Err(e);
    }
    match result {
        Ok(_) => writeln!(out),
        Err(e) => {
            let err = WorkflowError::Gateway(e);
            writeln!(out, "\n{}", render_error(&err))
        }
    }
}

fn upload<W: Write>(session: &mut Session, paths: &[PathBuf], out: &mut W) -> io::Result<()> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        match read_upload(path) {
            Ok(upload) => uploads.push(upload),
            Err(msg) => writeln!(out, "❌ {}", msg)?,
        }
    }
    if uploads.is_empty() {
        return Ok(());
    }

    let report = session.ingest(&uploads);
    if !report.ingested.is_empty() {
        writeln!(out, "✅ Added to knowledge base: {}", report.ingested.join(", "))?;
    }
    for table in &report.tables {
        writeln!(out, "   table '{}': {} rows", table.name, table.row_count())?;
    }
    for failure in report.failures {
        writeln!(out, "{}", render_error(&WorkflowError::Extraction(failure)))?;
    }
    let kb = session.knowledge_base();
    if !kb.is_empty() {
        writeln!(out, "Knowledge base: {} words", kb.word_count())?;
    }
    Ok(())
}

async fn tender<W: Write>(session: &Session, path: &Path, out: &mut W) -> io::Result<()> {
    let upload = match read_upload(path) {
        Ok(upload) => upload,
        Err(msg) => return writeln!(out, "❌ {}", msg),
    };
    let gateway = session.gateway();
    match workflows::analyze_tender(gateway.as_ref(), session.settings(), &upload).await {
        Ok(result) => {
            writeln!(out, "OCR done: {} characters extracted.", result.text_chars)?;
            writeln!(out, "--- OCR preview ---\n{}\n-------------------", result.text_preview)?;
            writeln!(out, "\n{}", result.analysis)
        }
        Err(e) => writeln!(out, "{}", render_error(&e)),
    }
}

async fn site<W: Write>(session: &Session, path: &Path, out: &mut W) -> io::Result<()> {
    let upload = match read_upload(path) {
        Ok(upload) => upload,
        Err(msg) => return writeln!(out, "❌ {}", msg),
    };
    let gateway = session.gateway();
    match workflows::assess_site(gateway.as_ref(), session.settings(), &upload).await {
        Ok(report) => {
            let detected = report.detections.summary();
            if detected.is_empty() {
                writeln!(out, "Detections: none listed")?;
            } else {
                writeln!(out, "Detections: {}", detected.join(", "))?;
            }
            writeln!(out, "Object detection (raw):\n{}", pretty(&report.detections.raw))?;
            writeln!(out, "Multimodal analysis (raw):\n{}", pretty(&report.multimodal.raw))?;
            writeln!(out, "\n{}", report.summary)
        }
        Err(e) => writeln!(out, "{}", render_error(&e)),
    }
}

async fn analyze<W: Write>(session: &Session, path: &Path, question: Option<&str>, out: &mut W) -> io::Result<()> {
    let upload = match read_upload(path) {
        Ok(upload) => upload,
        Err(msg) => return writeln!(out, "❌ {}", msg),
    };
    let gateway = session.gateway();
    match workflows::analyze_file(gateway.as_ref(), &upload, question).await {
        Ok(report) => {
            if let Some(text) = &report.text {
                writeln!(out, "{}\n", text)?;
            }
            writeln!(out, "Multimodal analysis (raw):\n{}", pretty(&report.raw))
        }
        Err(e) => writeln!(out, "{}", render_error(&e)),
    }
}

async fn voice<W: Write>(
    session: &Session,
    input: &Path,
    output: Option<PathBuf>,
    out: &mut W,
) -> io::Result<()> {
    let upload = match read_upload(input) {
        Ok(upload) => upload,
        Err(msg) => return writeln!(out, "❌ {}", msg),
    };
    let gateway = session.gateway();
    match workflows::voice_brief(gateway.as_ref(), session.settings(), &upload).await {
        Ok(brief) => write_voice_brief(brief, output, out),
        Err(e) => writeln!(out, "{}", render_error(&e)),
    }
}

fn write_voice_brief<W: Write>(brief: VoiceBrief, output: Option<PathBuf>, out: &mut W) -> io::Result<()> {
    writeln!(out, "Transcript:\n{}\n", brief.transcript)?;
    writeln!(out, "30-second briefing:\n{}\n", brief.briefing)?;

    let audio = match brief.audio {
        Ok(audio) => audio,
        Err(e) => {
            writeln!(out, "⚠️ Text-to-speech returned no audio; the briefing above is text only.")?;
            return writeln!(out, "{}", render_error(&WorkflowError::Gateway(e)));
        }
    };
    let output = output.unwrap_or_else(|| {
        let ext = match audio.mime.as_deref() {
            Some("audio/wav" | "audio/x-wav") => "wav",
            _ => "mp3",
        };
        PathBuf::from(format!("briefing.{}", ext))
    });
    match std::fs::write(&output, &audio.bytes) {
        Ok(()) => writeln!(out, "🔊 Audio saved to {} ({} bytes)", output.display(), audio.bytes.len()),
        Err(e) => writeln!(out, "❌ Could not write {}: {}", output.display(), e),
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Status line shown at start-up.
pub fn status_line(session: &Session) -> String {
    let settings = session.settings();
    let key = match session.credential() {
        Some(key) => key.masked(),
        None => "not set".to_string(),
    };
    format!(
        "Role: {} {} | backend: {} | scheme: {} | key: {} | since {}",
        session.role().icon,
        session.role().name,
        settings.chat_backend.as_str(),
        settings.auth_scheme,
        key,
        session.started_at().format("%H:%M UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_host::workflows::SynthesizedAudio;
    use shared::error::GatewayError;
    use shared::settings::{AppSettings, AuthScheme, Capability};

    fn session() -> Session {
        Session::new(AppSettings::default(), None)
    }

    async fn run(session: &mut Session, line: &str) -> String {
        let command = Command::parse(line).unwrap().unwrap();
        let mut out = Vec::new();
        assert_eq!(handle(session, command, &mut out).await.unwrap(), Flow::Continue);
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_upload_and_kb_summary() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "Fiber installs take five days.").unwrap();
        let broken = dir.path().join("scan.pdf");
        std::fs::write(&broken, b"not a pdf").unwrap();

        let mut s = session();
        let text = run(&mut s, &format!("/upload {} {}", notes.display(), broken.display())).await;
        assert!(text.contains("Added to knowledge base: notes.txt"));
        assert!(text.contains("Extraction failed: scan.pdf"));

        let kb = run(&mut s, "/kb").await;
        assert!(kb.contains("1 document(s)"));
        assert!(kb.contains("=== DOCUMENT: notes.txt ==="));

        run(&mut s, "/clear-kb").await;
        assert!(run(&mut s, "/kb").await.contains("empty"));
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let mut s = session();
        let text = run(&mut s, "/upload /definitely/not/here.pdf").await;
        assert!(text.contains("Could not read /definitely/not/here.pdf"));
        assert!(s.knowledge_base().is_empty());
    }

    #[tokio::test]
    async fn test_stats_over_uploaded_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("sales.csv");
        std::fs::write(&csv, "product,units\nrouter,4\nswitch,6\nmodem,n/a\n").unwrap();

        let mut s = session();
        run(&mut s, &format!("/upload {}", csv.display())).await;
        assert!(run(&mut s, "/tables").await.contains("sales (from sales.csv): 3 rows"));

        let shown = run(&mut s, "/table SALES").await;
        assert!(shown.contains("sales (from sales.csv):\nproduct units\nrouter 4\n"));

        let stats = run(&mut s, "/stats sales units").await;
        assert!(stats.contains("sales.units: 3 values, 2 numeric"));
        assert!(stats.contains("mean 5.00"));
    }

    #[tokio::test]
    async fn test_chat_without_key_records_error_turn() {
        let mut s = session();
        let text = run(&mut s, "hello").await;
        assert!(text.contains("Missing API key"));
        assert_eq!(s.turn_counts(), (1, 1));
        assert!(s.turns()[1].is_error);
    }

    #[tokio::test]
    async fn test_settings_commands() {
        let mut s = session();
        assert!(run(&mut s, "/scheme x-api-key").await.contains("Auth scheme: x-api-key"));
        assert_eq!(s.settings().auth_scheme, AuthScheme::HeaderKey);

        assert!(run(&mut s, "/key short").await.contains("keeping the current one"));
        assert!(run(&mut s, "/key abcdefghijkl9876").await.contains("****9876"));

        assert!(run(&mut s, "/endpoint tts ftp://x").await.contains("Invalid input"));
        assert!(run(&mut s, "/role tutor").await.contains("Teacher/Tutor"));
        let status = status_line(&s);
        assert!(status.contains("scheme: x-api-key"));
        assert!(status.contains(&format!("since {}", s.started_at().format("%H:%M"))));
    }

    #[test]
    fn test_voice_brief_without_audio_still_shows_text() {
        let brief = VoiceBrief {
            transcript: "client asks for 12 branches".to_string(),
            briefing: "Offer SD-WAN, book a site survey.".to_string(),
            audio: Err(GatewayError::empty(Capability::TextToSpeech, "response contained no audio")),
        };
        let mut out = Vec::new();
        write_voice_brief(brief, None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("client asks for 12 branches"));
        assert!(text.contains("Offer SD-WAN, book a site survey."));
        assert!(text.contains("Text-to-speech returned no audio"));
        assert!(text.contains("No result"));
    }

    #[test]
    fn test_voice_brief_audio_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brief.mp3");
        let brief = VoiceBrief {
            transcript: "t".to_string(),
            briefing: "b".to_string(),
            audio: Ok(SynthesizedAudio {
                bytes: vec![9, 8, 7],
                mime: None,
            }),
        };
        let mut out = Vec::new();
        write_voice_brief(brief, Some(path.clone()), &mut out).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![9, 8, 7]);
        assert!(String::from_utf8(out).unwrap().contains("(3 bytes)"));
    }

    #[tokio::test]
    async fn test_analyze_without_key_reports_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("floor plan.pdf");
        std::fs::write(&plan, b"%PDF-1.4").unwrap();

        let mut s = session();
        let text = run(&mut s, &format!("/analyze \"{}\" where is the MDF?", plan.display())).await;
        assert!(text.contains("Missing API key"));
    }

    #[tokio::test]
    async fn test_quit() {
        let mut out = Vec::new();
        assert_eq!(handle(&mut session(), Command::Quit, &mut out).await.unwrap(), Flow::Quit);
    }
}
