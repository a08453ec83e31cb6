//! Parsing of one line of terminal input into a user action.

use agent_host::workflows::{BriefKind, CompanyBrief};
use shared::settings::{AuthScheme, Capability, ChatBackendKind};
use std::path::PathBuf;

pub const HELP: &str = r#"Commands:
  /help                              show this help
  /roles                             list roles
  /role <name>                       switch role (clears the conversation)
  /upload <path>...                  add PDF, spreadsheet, CSV or text files to the knowledge base
                                     (quote paths with spaces: "my file.pdf")
  /kb                                knowledge base summary
  /clear-kb                          empty the knowledge base
  /tables                            list retained spreadsheet tables
  /table <name>                      print a table as plain text rows
  /stats <table> <column>            numeric summary of a table column
  /history                           show the conversation
  /scheme <name>                     bearer | x-api-key | apikey | bearer + x-api-key
  /backend <gemini|hosted>           choose the chat backend
  /endpoints                         show capability endpoints
  /endpoint <capability> <url>       override one endpoint
  /key <value>                       use another API key for this session
  /test <chat|multimodal>            connection test
  /profile <company>[; industry[; products[; crm]]]
  /strategy <company>[; industry[; products[; crm]]]
  /tender <pdf>                      OCR + tender analysis
  /site <image>                      site risk assessment from a photo
  /analyze <file> [question]         multimodal analysis of a photo or document
  /voice <audio> [output]            voice note to spoken briefing
  /quit                              end the session
Anything else is sent to the chat model."#;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat(String),
    Help,
    Roles,
    Role(String),
    Upload(Vec<PathBuf>),
    Kb,
    ClearKb,
    Tables,
    Table(String),
    Stats { table: String, column: String },
    History,
    Scheme(AuthScheme),
    Backend(ChatBackendKind),
    Endpoints,
    Endpoint { capability: Capability, url: String },
    Key(String),
    Test(Capability),
    Brief { kind: BriefKind, brief: CompanyBrief },
    Tender(PathBuf),
    Site(PathBuf),
    Analyze { path: PathBuf, question: Option<String> },
    Voice { input: PathBuf, output: Option<PathBuf> },
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Chat(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        let required = |usage: &str| {
            if args.is_empty() {
                Err(format!("Usage: {}", usage))
            } else {
                Ok(args)
            }
        };

        let command = match name.to_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "roles" => Command::Roles,
            "role" => Command::Role(required("/role <name>")?.to_string()),
            "upload" => Command::Upload(
                split_args(required("/upload <path>...")?)?
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
            ),
            "kb" => Command::Kb,
            "clear-kb" => Command::ClearKb,
            "tables" => Command::Tables,
            "table" => Command::Table(required("/table <name>")?.to_string()),
            "stats" => {
                let usage = "/stats <table> <column>";
                let (table, column) = required(usage)?
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| format!("Usage: {}", usage))?;
                Command::Stats {
                    table: table.to_string(),
                    column: column.trim().to_string(),
                }
            }
            "history" => Command::History,
            "scheme" => Command::Scheme(
                required("/scheme <name>")?
                    .parse()
                    .map_err(|e: shared::settings::SettingsError| e.to_string())?,
            ),
            "backend" => Command::Backend(
                required("/backend <gemini|hosted>")?
                    .parse()
                    .map_err(|e: shared::settings::SettingsError| e.to_string())?,
            ),
            "endpoints" => Command::Endpoints,
            "endpoint" => {
                let usage = "/endpoint <capability> <url>";
                let (capability, url) = required(usage)?
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| format!("Usage: {}", usage))?;
                Command::Endpoint {
                    capability: capability
                        .parse()
                        .map_err(|e: shared::settings::SettingsError| e.to_string())?,
                    url: url.trim().to_string(),
                }
            }
            "key" => Command::Key(required("/key <value>")?.to_string()),
            "test" => {
                let capability = required("/test <chat|multimodal>")?
                    .parse()
                    .map_err(|e: shared::settings::SettingsError| e.to_string())?;
                Command::Test(capability)
            }
            "profile" => Command::Brief {
                kind: BriefKind::Profile,
                brief: parse_brief(required("/profile <company>[; industry[; products[; crm]]]")?),
            },
            "strategy" => Command::Brief {
                kind: BriefKind::Strategy,
                brief: parse_brief(required("/strategy <company>[; industry[; products[; crm]]]")?),
            },
            "tender" => Command::Tender(PathBuf::from(unquote(required("/tender <pdf>")?))),
            "site" => Command::Site(PathBuf::from(unquote(required("/site <image>")?))),
            "analyze" => {
                let (path, question) = first_arg(required("/analyze <file> [question]")?)?;
                Command::Analyze {
                    path: PathBuf::from(path),
                    question: (!question.is_empty()).then(|| question.to_string()),
                }
            }
            "voice" => {
                let usage = "/voice <audio> [output]";
                let mut parts = split_args(required(usage)?)?.into_iter().map(PathBuf::from);
                let input = parts.next().ok_or_else(|| format!("Usage: {}", usage))?;
                let output = parts.next();
                if parts.next().is_some() {
                    return Err(format!("Usage: {}", usage));
                }
                Command::Voice { input, output }
            }
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("Unknown command '/{}'. Type /help for the list.", other)),
        };
        Ok(Some(command))
    }
}

/// Whitespace-separated arguments; a double-quoted argument may contain spaces.
fn split_args(args: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut rest = args.trim_start();
    while !rest.is_empty() {
        let (part, tail) = first_arg(rest)?;
        parts.push(part);
        rest = tail;
    }
    Ok(parts)
}

/// The leading argument, quoted or bare, and whatever follows it.
fn first_arg(args: &str) -> Result<(String, &str), String> {
    let args = args.trim_start();
    if let Some(quoted) = args.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| "Unterminated quote in arguments.".to_string())?;
        return Ok((quoted[..end].to_string(), quoted[end + 1..].trim_start()));
    }
    match args.split_once(char::is_whitespace) {
        Some((part, tail)) => Ok((part.to_string(), tail.trim_start())),
        None => Ok((args.to_string(), "")),
    }
}

/// A single path argument that may have been quoted.
fn unquote(arg: &str) -> &str {
    arg.strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg)
}

/// `company; industry; product, product; crm snapshot`. Empty fields keep
/// their defaults.
fn parse_brief(args: &str) -> CompanyBrief {
    let mut fields = args.splitn(4, ';').map(str::trim);
    let mut brief = CompanyBrief::new(fields.next().unwrap_or_default());
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    brief.industry = fields.next().and_then(non_empty);
    if let Some(products) = fields.next().filter(|p| !p.is_empty()) {
        brief.products = products
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }
    brief.crm_snapshot = fields.next().and_then(non_empty);
    brief
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(parse("  what is SD-WAN? "), Command::Chat("what is SD-WAN?".to_string()));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("/help"), Command::Help);
        assert_eq!(parse("/KB"), Command::Kb);
        assert_eq!(parse("/clear-kb"), Command::ClearKb);
        assert_eq!(parse("/exit"), Command::Quit);
        assert_eq!(parse("/role tech support"), Command::Role("tech support".to_string()));
    }

    #[test]
    fn test_upload_takes_several_paths() {
        assert_eq!(
            parse("/upload a.pdf  b.xlsx"),
            Command::Upload(vec![PathBuf::from("a.pdf"), PathBuf::from("b.xlsx")])
        );
        assert!(Command::parse("/upload").is_err());
    }

    #[test]
    fn test_quoted_paths_keep_spaces() {
        assert_eq!(
            parse(r#"/upload "Q3 price list.xlsx" notes.txt"#),
            Command::Upload(vec![PathBuf::from("Q3 price list.xlsx"), PathBuf::from("notes.txt")])
        );
        assert_eq!(parse(r#"/tender "RFP Bank Jatim.pdf""#), Command::Tender(PathBuf::from("RFP Bank Jatim.pdf")));
        assert_eq!(parse("/site rack photo.jpg"), Command::Site(PathBuf::from("rack photo.jpg")));
        assert!(Command::parse(r#"/upload "unterminated.pdf"#).is_err());
    }

    #[test]
    fn test_analyze_and_table() {
        assert_eq!(
            parse(r#"/analyze "site plan.pdf" where is the server room?"#),
            Command::Analyze {
                path: PathBuf::from("site plan.pdf"),
                question: Some("where is the server room?".to_string())
            }
        );
        assert_eq!(
            parse("/analyze rack.png"),
            Command::Analyze {
                path: PathBuf::from("rack.png"),
                question: None
            }
        );
        assert_eq!(parse("/table Sales"), Command::Table("Sales".to_string()));
    }

    #[test]
    fn test_scheme_accepts_combined_form() {
        assert_eq!(parse("/scheme bearer + x-api-key"), Command::Scheme(AuthScheme::Both));
        assert_eq!(parse("/scheme apikey"), Command::Scheme(AuthScheme::AlternateHeaderKey));
        assert!(Command::parse("/scheme basic").is_err());
    }

    #[test]
    fn test_endpoint_and_stats_split_arguments() {
        assert_eq!(
            parse("/endpoint ocr https://ocr.example.test/v2"),
            Command::Endpoint {
                capability: Capability::Ocr,
                url: "https://ocr.example.test/v2".to_string()
            }
        );
        assert_eq!(
            parse("/stats Sales Unit Price"),
            Command::Stats {
                table: "Sales".to_string(),
                column: "Unit Price".to_string()
            }
        );
        assert!(Command::parse("/stats Sales").is_err());
        assert_eq!(parse("/test lmm"), Command::Test(Capability::Multimodal));
    }

    #[test]
    fn test_brief_fields() {
        match parse("/strategy PT Sinar Logistik; Logistics; SD-WAN, Security") {
            Command::Brief { kind, brief } => {
                assert_eq!(kind, BriefKind::Strategy);
                assert_eq!(brief.company, "PT Sinar Logistik");
                assert_eq!(brief.industry.as_deref(), Some("Logistics"));
                assert_eq!(brief.products, vec!["SD-WAN", "Security"]);
                assert_eq!(brief.crm_snapshot, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse("/profile Acme") {
            Command::Brief { brief, .. } => assert_eq!(brief.products, vec!["IndiBiz Internet", "SD-WAN"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_voice_output_is_optional() {
        assert_eq!(
            parse("/voice memo.m4a"),
            Command::Voice {
                input: PathBuf::from("memo.m4a"),
                output: None
            }
        );
        assert_eq!(
            parse(r#"/voice "client memo.m4a" out.mp3"#),
            Command::Voice {
                input: PathBuf::from("client memo.m4a"),
                output: Some(PathBuf::from("out.mp3"))
            }
        );
        assert!(Command::parse("/voice a.mp3 b.mp3 c.mp3").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse("/dance").unwrap_err();
        assert!(err.contains("/help"));
    }
}
