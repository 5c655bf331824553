//! Prompt building and completion parsing for the studio tools
//!
//! Three tools sit on top of text/image generation:
//!
//! - Content generator: per-platform title, description, hashtags and tags.
//! - Brand kit: image assets with a fixed aspect ratio per asset type.
//! - GEO optimizer: entity/score analysis plus JSON-LD markup.
//!
//! Completions are free text; the JSON they are asked for is located by
//! taking the span from the first `{` to the last `}`.

use serde::{Deserialize, Serialize};

/// Maximum number of characters of user content embedded in GEO prompts.
pub const GEO_CONTENT_LIMIT: usize = 5000;

/// Target platform for generated content. `All` fans out to every other variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    All,
    Twitter,
    LinkedIn,
    Instagram,
    Facebook,
    YouTube,
    AiSearch,
}

impl Platform {
    /// Every concrete platform, in display order.
    pub const CONCRETE: [Platform; 6] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Instagram,
        Platform::Facebook,
        Platform::YouTube,
        Platform::AiSearch,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Platform::All => "all",
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::YouTube => "youtube",
            Platform::AiSearch => "aisearch",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Platform::All => "Omni-Channel (All)",
            Platform::Twitter => "Twitter",
            Platform::LinkedIn => "LinkedIn",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::YouTube => "YouTube",
            Platform::AiSearch => "AI Search / GEO",
        }
    }

    /// Platforms a request for `self` generates content for.
    pub fn targets(self) -> Vec<Platform> {
        match self {
            Platform::All => Self::CONCRETE.to_vec(),
            p => vec![p],
        }
    }
}

/// Structured content for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: String,
    #[serde(default)]
    pub tags: String,
}

impl GeneratedContent {
    /// Result used when a completion has no parseable JSON object; the raw
    /// completion is kept as the description.
    pub fn unparsed(raw: &str) -> Self {
        Self {
            title: "Error parsing".to_string(),
            description: raw.to_string(),
            hashtags: String::new(),
            tags: String::new(),
        }
    }
}

/// Span from the first `{` to the last `}` inclusive, if any.
pub fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn content_prompt(topic: &str, platform: Platform) -> String {
    format!(
        r##"Generate search-optimized content for the topic: "{topic}" that can rank in search engines and AI overviews (GEO).
Platform: {label}

Guidelines:
- Mention concrete entities (names, places, concepts, data).
- Answer the reader's intent in the first sentence.
- Prefer plain subject-verb-object sentences.
- Work relevant keywords in naturally.

Platform rules:
- Twitter: at most 280 characters, hook then value then call to action.
- LinkedIn: professional tone, bullet points where they help.
- YouTube: high click-through title, tags spanning broad and niche terms.
- AI Search: dense with facts, description phrased as a direct answer.

Respond with strictly valid JSON only, no long-form article, using the fields "title", "description", "hashtags", "tags":
{{
  "title": "...",
  "description": "...",
  "hashtags": "#tag1 #tag2",
  "tags": "tag1, tag2, tag3"
}}"##,
        label = platform.label(),
    )
}

/// Parse a content completion, falling back to [`GeneratedContent::unparsed`]
/// only when no JSON object can be read from it.
///
/// Fields are read leniently: arrays are joined (`hashtags` with spaces, the
/// rest with `", "`), numbers and booleans are stringified, anything else is
/// empty.
pub fn parse_generated_content(text: &str) -> GeneratedContent {
    let parsed = json_span(text).and_then(|span| {
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(span).ok()
    });
    let Some(object) = parsed else {
        return GeneratedContent::unparsed(text);
    };

    let field = |name: &str, separator: &str| {
        object
            .get(name)
            .map(|v| field_text(v, separator))
            .unwrap_or_default()
    };
    GeneratedContent {
        title: field("title", ", "),
        description: field("description", ", "),
        hashtags: field("hashtags", " "),
        tags: field("tags", ", "),
    }
}

fn field_text(value: &serde_json::Value, separator: &str) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| field_text(item, separator))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(separator),
        serde_json::Value::Null | serde_json::Value::Object(_) => String::new(),
    }
}

/// Visual asset kinds offered by the brand kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Logo,
    Banner,
    Post,
    Story,
    Thumbnail,
}

impl AssetType {
    pub fn label(self) -> &'static str {
        match self {
            AssetType::Logo => "Logo",
            AssetType::Banner => "Banner / Header",
            AssetType::Post => "Social Post",
            AssetType::Story => "Story",
            AssetType::Thumbnail => "Thumbnail",
        }
    }

    pub fn ratio(self) -> &'static str {
        match self {
            AssetType::Logo => "1:1",
            AssetType::Banner | AssetType::Thumbnail => "16:9",
            AssetType::Post => "4:5",
            AssetType::Story => "9:16",
        }
    }

    /// Target pixel size (width, height).
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AssetType::Logo => (1024, 1024),
            AssetType::Banner => (1920, 1080),
            AssetType::Post => (1080, 1350),
            AssetType::Story => (1080, 1920),
            AssetType::Thumbnail => (1280, 720),
        }
    }
}

pub fn brand_asset_prompt(description: &str, asset: AssetType) -> String {
    format!(
        "Create a professional {label} for a brand described as: \"{description}\".\n\
         Style: high quality, professional, modern.\n\
         Aspect Ratio: {ratio}",
        label = asset.label(),
        ratio = asset.ratio(),
    )
}

/// First [`GEO_CONTENT_LIMIT`] characters of `content`.
pub fn truncate_for_geo(content: &str) -> &str {
    match content.char_indices().nth(GEO_CONTENT_LIMIT) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

pub fn geo_analysis_prompt(content: &str) -> String {
    format!(
        r#"Analyze the following content for Generative Engine Optimization (GEO).
Identify:
1. Key entities (people, places, concepts).
2. Sentiment.
3. Factuality score (0-100).
4. Missing topics that would make it more complete.

Content: "{content}"

Output JSON format: {{ "entities": [], "sentiment": "", "score": 0, "missing": [] }}"#,
        content = truncate_for_geo(content),
    )
}

pub fn geo_schema_prompt(content: &str) -> String {
    format!(
        r#"Generate valid JSON-LD Schema.org markup for the following content.
Treat it as an Article or BlogPosting.

Content: "{content}"

Output ONLY the JSON code block."#,
        content = truncate_for_geo(content),
    )
}

/// Parse a GEO analysis completion.
///
/// No `{...}` span yields an "Error parsing AI response" entity; a span that
/// is not valid JSON yields a "Could not parse analysis" missing topic.
pub fn parse_geo_analysis(text: &str) -> serde_json::Value {
    match json_span(text) {
        None => serde_json::json!({
            "entities": ["Error parsing AI response"],
            "score": 0,
            "missing": [],
        }),
        Some(span) => serde_json::from_str(span).unwrap_or_else(|_| {
            serde_json::json!({
                "entities": [],
                "score": 0,
                "missing": ["Could not parse analysis"],
            })
        }),
    }
}

/// Strip markdown code fences from a schema completion.
pub fn clean_schema(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}
