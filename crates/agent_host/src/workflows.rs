//! Multi-step actions over the remote capabilities. Each one is a single
//! user action; its failure is reported to the surface and the session goes
//! on.

use crate::prompts::{
    CONSULTATIVE_SELLING_PROMPT, FILE_ANALYSIS_TASK, NETWORK_ENGINEER_PROMPT, SALES_CONSULTANT_PROMPT, SITE_PHOTO_TASK,
    SITE_SUMMARY_TASK, TENDER_ANALYST_PROMPT, TENDER_TASK, VOICE_BRIEF_TASK,
};
use crate::WorkflowError;
use providers::capabilities::{Capabilities, DetectionReport, LlmRequest, MultimodalReport, MultimodalRequest};
pub use providers::capabilities::SynthesizedAudio;
use serde::Serialize;
use services::documents::Upload;
use services::media::{audio_mime, encode_data_url, image_mime};
use shared::error::GatewayError;
use shared::settings::{AppSettings, Capability};
use shared::truncate_chars;

/// OCR text beyond this is not sent for analysis.
pub const TENDER_ANALYSIS_CHARS: usize = 15_000;
pub const TENDER_PREVIEW_CHARS: usize = 5_000;
/// Each JSON result is cut to this before the site summary.
pub const SITE_SUMMARY_JSON_CHARS: usize = 4_000;

pub const DEFAULT_PRODUCTS: [&str; 2] = ["IndiBiz Internet", "SD-WAN"];

// ── Company brief ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BriefKind {
    Profile,
    Strategy,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyBrief {
    pub company: String,
    pub industry: Option<String>,
    pub products: Vec<String>,
    pub crm_snapshot: Option<String>,
}

impl CompanyBrief {
    pub fn new(company: &str) -> Self {
        Self {
            company: company.trim().to_string(),
            products: DEFAULT_PRODUCTS.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn task_prompt(&self, kind: BriefKind) -> String {
        let task = match kind {
            BriefKind::Profile => "Profile",
            BriefKind::Strategy => "Recommend an approach for",
        };
        let or_dash = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("-")
                .to_string()
        };
        let products = if self.products.is_empty() {
            "-".to_string()
        } else {
            self.products.join(", ")
        };
        format!(
            "Task: {task} the following company.\n\
             Name: {name}\n\
             Industry: {industry}\n\
             Target products: {products}\n\
             CRM snapshot: {crm}\n\
             Goal: 90-day project opportunity + next best action.",
            name = self.company,
            industry = or_dash(&self.industry),
            crm = or_dash(&self.crm_snapshot),
        )
    }
}

pub async fn company_brief(
    caps: &dyn Capabilities,
    settings: &AppSettings,
    brief: &CompanyBrief,
    kind: BriefKind,
) -> Result<String, WorkflowError> {
    if brief.company.trim().is_empty() {
        return Err(WorkflowError::invalid("Enter a company name first."));
    }
    tracing::info!(company = %brief.company, kind = ?kind, "company brief");
    let req = LlmRequest::prompt(
        &settings.llm_model,
        CONSULTATIVE_SELLING_PROMPT,
        &brief.task_prompt(kind),
    )
    .with_sampling(0.2, LlmRequest::DEFAULT_MAX_TOKENS);
    Ok(caps.complete(&req).await?)
}

// ── Tender analysis ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TenderAnalysis {
    pub text_chars: usize,
    pub text_preview: String,
    pub analysis: String,
}

pub async fn analyze_tender(
    caps: &dyn Capabilities,
    settings: &AppSettings,
    upload: &Upload,
) -> Result<TenderAnalysis, WorkflowError> {
    if upload.resolved_mime().as_deref() != Some("application/pdf") {
        return Err(WorkflowError::invalid(format!("{} is not a PDF tender document.", upload.name)));
    }
    let document = encode_data_url("application/pdf", &upload.bytes);

    tracing::info!(file = %upload.name, bytes = upload.bytes.len(), "running tender OCR");
    let text = caps.ocr(&document).await?;
    if text.trim().is_empty() {
        return Err(GatewayError::empty(Capability::Ocr, "OCR produced no text; check the PDF is not encrypted").into());
    }

    let prompt = format!("{}\n\n{}", TENDER_TASK, truncate_chars(&text, TENDER_ANALYSIS_CHARS));
    let analysis = caps
        .complete(&LlmRequest::prompt(&settings.llm_model, TENDER_ANALYST_PROMPT, &prompt))
        .await?;

    Ok(TenderAnalysis {
        text_chars: text.chars().count(),
        text_preview: truncate_chars(&text, TENDER_PREVIEW_CHARS),
        analysis,
    })
}

// ── Site risk ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SiteRiskReport {
    pub detections: DetectionReport,
    pub multimodal: MultimodalReport,
    pub summary: String,
}

pub async fn assess_site(
    caps: &dyn Capabilities,
    settings: &AppSettings,
    upload: &Upload,
) -> Result<SiteRiskReport, WorkflowError> {
    let mime = image_mime(&upload.name, &upload.bytes)
        .ok_or_else(|| WorkflowError::invalid(format!("{} is not a JPEG or PNG photo.", upload.name)))?;
    let image = encode_data_url(mime, &upload.bytes);

    tracing::info!(file = %upload.name, mime, "assessing site photo");
    let detections = caps.detect(&image, &settings.detection_labels).await?;
    let multimodal = caps
        .analyze(&MultimodalRequest::new(SITE_PHOTO_TASK).with_image(image))
        .await?;

    let prompt = format!(
        "{}\nDetections: {}\nMultimodal analysis: {}",
        SITE_SUMMARY_TASK,
        truncate_chars(&detections.raw.to_string(), SITE_SUMMARY_JSON_CHARS),
        truncate_chars(&multimodal.raw.to_string(), SITE_SUMMARY_JSON_CHARS),
    );
    let summary = caps
        .complete(&LlmRequest::prompt(&settings.llm_model, NETWORK_ENGINEER_PROMPT, &prompt))
        .await?;

    Ok(SiteRiskReport {
        detections,
        multimodal,
        summary,
    })
}

// ── File analysis ────────────────────────────────────────────────────

/// Multimodal read of one file. Photos go in as images, documents as files.
pub async fn analyze_file(
    caps: &dyn Capabilities,
    upload: &Upload,
    question: Option<&str>,
) -> Result<MultimodalReport, WorkflowError> {
    let request = MultimodalRequest::new(question.unwrap_or(FILE_ANALYSIS_TASK));
    let request = if let Some(mime) = image_mime(&upload.name, &upload.bytes) {
        request.with_image(encode_data_url(mime, &upload.bytes))
    } else {
        let mime = upload
            .resolved_mime()
            .ok_or_else(|| WorkflowError::invalid(format!("Cannot tell what kind of file {} is.", upload.name)))?;
        request.with_file(encode_data_url(&mime, &upload.bytes))
    };

    tracing::info!(file = %upload.name, bytes = upload.bytes.len(), "multimodal file analysis");
    Ok(caps.analyze(&request).await?)
}

// ── Voice brief ──────────────────────────────────────────────────────

/// Transcript and briefing survive a text-to-speech failure; `audio` then
/// carries the error instead.
#[derive(Debug, Clone)]
pub struct VoiceBrief {
    pub transcript: String,
    pub briefing: String,
    pub audio: Result<SynthesizedAudio, GatewayError>,
}

pub async fn voice_brief(
    caps: &dyn Capabilities,
    settings: &AppSettings,
    upload: &Upload,
) -> Result<VoiceBrief, WorkflowError> {
    let audio = encode_data_url(audio_mime(&upload.name), &upload.bytes);

    tracing::info!(file = %upload.name, language = %settings.stt_language, "transcribing voice note");
    let transcript = caps.transcribe(&audio, &settings.stt_language).await?;
    if transcript.trim().is_empty() {
        return Err(GatewayError::empty(Capability::SpeechToText, "no transcript; try another audio format").into());
    }

    let prompt = format!("{}\n\nText:\n{}", VOICE_BRIEF_TASK, transcript);
    let briefing = caps
        .complete(&LlmRequest::prompt(&settings.llm_model, SALES_CONSULTANT_PROMPT, &prompt))
        .await?;
    let audio = caps.synthesize(&briefing, &settings.tts_voice).await;
    if let Err(e) = &audio {
        tracing::warn!(file = %upload.name, error = %e, "briefing has no audio");
    }

    Ok(VoiceBrief {
        transcript,
        briefing,
        audio,
    })
}

// ── Connection test ──────────────────────────────────────────────────

/// Minimal request to one capability, returning what it answered.
pub async fn test_connection(
    caps: &dyn Capabilities,
    settings: &AppSettings,
    capability: Capability,
) -> Result<String, WorkflowError> {
    match capability {
        Capability::Chat => {
            let req = LlmRequest::prompt(&settings.llm_model, "ping", "ping").with_sampling(0.0, 16);
            Ok(caps.complete(&req).await?)
        }
        Capability::Multimodal => {
            let report = caps.analyze(&MultimodalRequest::new("ping")).await?;
            Ok(report
                .text
                .unwrap_or_else(|| truncate_chars(&report.raw.to_string(), 500)))
        }
        other => Err(WorkflowError::invalid(format!(
            "Connection tests cover chat and multimodal, not {}.",
            other
        ))),
    }
}
