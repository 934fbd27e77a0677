//! Prompt builders for the inference-backed stages.
//!
//! Every builder is a deterministic function of its inputs and demands a
//! bare JSON object with the exact keys its stage parses. Extraction is
//! forgiving about fences and surrounding prose, but the schema keys must
//! match the typed slots, so they are spelled out verbatim here.

use leadflow_shared::{LeadRecord, Qualification, ResearchInsights};

use crate::stages::HistoryFeatures;

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else: \
no prose, no code fences, no extra keys.";

/// Render the lead profile lines shared by several prompts.
fn profile_block(record: &LeadRecord) -> String {
    format!(
        "Lead profile:\n\
         - Name: {name}\n\
         - Company: {company}\n\
         - Title: {title}\n\
         - Industry: {industry}\n\
         - Region: {region}\n\
         - Lead source: {source}\n\
         - Site visits: {visits}\n\
         - Time on site (minutes): {time_on_site:.1}\n\
         - Pages per visit: {pages:.1}\n\
         - Converted before: {converted}",
        name = or_unknown(&record.name),
        company = or_unknown(&record.company),
        title = or_unknown(&record.title),
        industry = or_unknown(&record.industry),
        region = or_unknown(&record.region),
        source = or_unknown(&record.lead_source),
        visits = record.visits,
        time_on_site = record.time_on_site,
        pages = record.pages_per_visit,
        converted = if record.converted { "yes" } else { "no" },
    )
}

fn history_block(history: &HistoryFeatures) -> String {
    if history.is_empty() {
        return "Interaction history: none recorded.".into();
    }
    let mut block = format!(
        "Interaction history:\n\
         - Emails sent: {}\n\
         - Emails opened: {}\n\
         - Replies: {}\n\
         - Response rate: {:.0}%",
        history.sends,
        history.opens,
        history.replies,
        history.response_rate * 100.0,
    );
    if let Some(weekday) = history.best_weekday {
        block.push_str(&format!("\n- Most replies on: {weekday}"));
    }
    if let Some(hour) = history.best_hour {
        block.push_str(&format!("\n- Most replies around: {hour:02}:00"));
    }
    if let Some(delay) = history.mean_reply_delay_hours {
        block.push_str(&format!("\n- Mean reply delay: {delay:.1} hours"));
    }
    block
}

fn or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() { "unknown" } else { trimmed }
}

// ---------------------------------------------------------------------------
// Stage prompts
// ---------------------------------------------------------------------------

pub fn research_prompt(record: &LeadRecord) -> String {
    format!(
        "You are a lead research analyst for an outbound sales team.\n\
         Turn the profile below into concrete insights a rep can act on. \
         Each insight names the metric it came from, reads its value, and \
         explains what it implies.\n\n\
         {profile}\n\n\
         Schema:\n\
         {{\"insights\": [{{\"metric\": \"...\", \"value\": \"...\", \
         \"reasoning\": \"...\"}}], \"recommendation\": \"...\"}}\n\n\
         {JSON_ONLY}",
        profile = profile_block(record),
    )
}

pub fn qualification_prompt(
    record: &LeadRecord,
    research: &ResearchInsights,
    history: &HistoryFeatures,
) -> String {
    let insights = serde_json::to_string(research).unwrap_or_default();
    format!(
        "You are a sales qualification analyst scoring purchase intent.\n\
         Score this lead from 0 (cold) to 100 (ready to buy) and list the \
         buying signals behind the score.\n\n\
         {profile}\n\n\
         {history}\n\n\
         Research findings:\n{insights}\n\n\
         Schema:\n\
         {{\"intent_score\": 0-100, \"signals\": [{{\"signal\": \"...\", \
         \"strength\": \"high|medium|low\", \"reasoning\": \"...\"}}]}}\n\n\
         {JSON_ONLY}",
        profile = profile_block(record),
        history = history_block(history),
    )
}

pub fn composition_prompt(
    record: &LeadRecord,
    research: &ResearchInsights,
    qualification: &Qualification,
) -> String {
    let signals = serde_json::to_string(&qualification.signals).unwrap_or_default();
    format!(
        "You are a sales outreach copywriter drafting a first-touch email.\n\
         Write a subject line (under 10 words) and a 2-3 sentence preview \
         tailored to this lead, and name the personalization factors you \
         leaned on.\n\n\
         {profile}\n\n\
         Intent score: {score:.0}/100\n\
         Signals: {signals}\n\
         Recommended angle: {recommendation}\n\n\
         Schema:\n\
         {{\"subject\": \"...\", \"email_preview\": \"...\", \
         \"personalization_factors\": [\"...\"]}}\n\n\
         {JSON_ONLY}",
        profile = profile_block(record),
        score = qualification.intent_score,
        recommendation = research.recommendation,
    )
}

pub fn timing_prompt(record: &LeadRecord, history: &HistoryFeatures, intent_score: f32) -> String {
    format!(
        "You are an outreach scheduling strategist.\n\
         Recommend when to follow up with this lead and which approach to \
         take. Pick the approach by urgency band: 0-30 soft_nudge, 31-70 \
         value_add, 71-100 social_proof.\n\n\
         Lead: {name} at {company}\n\
         Intent score: {intent_score:.0}/100\n\n\
         {history}\n\n\
         Schema:\n\
         {{\"recommended_date\": \"YYYY-MM-DD\", \"send_time\": \"HH:MM\", \
         \"approach\": \"soft_nudge|value_add|social_proof\", \
         \"urgency\": 0-100, \"reasoning\": \"...\", \
         \"response_probability\": 0.0-1.0}}\n\n\
         {JSON_ONLY}",
        name = or_unknown(&record.name),
        company = or_unknown(&record.company),
        history = history_block(history),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
