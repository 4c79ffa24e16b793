//! Structured response parsing.
//!
//! `parse` never fails. Text that does not match the expected schema becomes a
//! single fallback item carrying the raw model output, flagged as degraded.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::prompt::SchemaKind;

pub const FALLBACK_TITLE: &str = "Generated Content";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SlideBody {
    Points { points: Vec<String> },
    Block { content: String },
}

impl SlideBody {
    pub fn char_count(&self) -> usize {
        match self {
            Self::Points { points } => points.iter().map(|p| p.chars().count()).sum(),
            Self::Block { content } => content.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slide {
    pub title: String,
    #[serde(flatten)]
    pub body: SlideBody,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub speaker_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

impl Slide {
    pub fn block<T: Into<String>, C: Into<String>>(title: T, content: C) -> Self {
        Self {
            title: title.into(),
            body: SlideBody::Block { content: content.into() },
            speaker_notes: String::new(),
            image_reference: None,
            image_prompt: None,
        }
    }

    pub fn points<T: Into<String>>(title: T, points: Vec<String>) -> Self {
        Self {
            title: title.into(),
            body: SlideBody::Points { points },
            speaker_notes: String::new(),
            image_reference: None,
            image_prompt: None,
        }
    }
}

/// Wire form of a slide as models actually emit it.
#[derive(Debug, Deserialize)]
struct RawSlide {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "bullet_points", alias = "bullets")]
    points: Option<Vec<String>>,
    #[serde(default, alias = "text", alias = "body")]
    content: Option<RawContent>,
    #[serde(default, alias = "notes")]
    speaker_notes: Option<String>,
    #[serde(default, alias = "image", alias = "image_path")]
    image_reference: Option<String>,
    #[serde(default)]
    image_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Lines(Vec<String>),
}

fn clean_bullet(line: &str) -> String {
    line.trim()
        .trim_start_matches(&['-', '*', '\u{2022}'][..])
        .trim()
        .to_string()
}

impl From<RawSlide> for Slide {
    fn from(raw: RawSlide) -> Self {
        let points: Vec<String> = raw
            .points
            .unwrap_or_default()
            .iter()
            .map(|p| clean_bullet(p))
            .filter(|p| !p.is_empty())
            .collect();

        let body = if !points.is_empty() {
            SlideBody::Points { points }
        } else {
            match raw.content {
                Some(RawContent::Lines(lines)) => SlideBody::Points {
                    points: lines.iter().map(|l| clean_bullet(l)).filter(|l| !l.is_empty()).collect(),
                },
                Some(RawContent::Text(text)) => {
                    let lines: Vec<String> = text.lines().map(clean_bullet).filter(|l| !l.is_empty()).collect();
                    if lines.len() > 1 {
                        SlideBody::Points { points: lines }
                    } else {
                        SlideBody::Block { content: text.trim().to_string() }
                    }
                }
                None => SlideBody::Block { content: String::new() },
            }
        };

        Self {
            title: raw.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| "Untitled".to_string()),
            body,
            speaker_notes: raw.speaker_notes.unwrap_or_default(),
            image_reference: raw.image_reference.filter(|r| !r.trim().is_empty()),
            image_prompt: raw.image_prompt.filter(|p| !p.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

fn score_from_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(value.round().clamp(0.0, 100.0) as u32)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(deserialize_with = "score_from_number")]
    pub viral_score: u32,
    pub reason: String,
    #[serde(default)]
    pub suggested_caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    #[serde(default = "unknown_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub text: String,
}

fn unknown_speaker() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Slides(Vec<Slide>),
    Quiz(Vec<QuizQuestion>),
    Flashcards(Vec<Flashcard>),
    Clips(Vec<Clip>),
    Script(Vec<DialogueLine>),
    Narrative(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArtifact {
    pub artifact: Artifact,
    /// Set when the fallback item replaced unparseable output
    pub degraded: bool,
}

/// Remove leading/trailing markdown code-fence markers.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    for opener in ["```json", "```JSON", "```javascript", "```"] {
        if let Some(rest) = text.strip_prefix(opener) {
            text = rest;
            break;
        }
    }
    text = text.trim();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn envelope_key(schema: SchemaKind) -> &'static str {
    match schema {
        SchemaKind::Slides => "slides",
        SchemaKind::Quiz => "questions",
        SchemaKind::Flashcards => "flashcards",
        SchemaKind::Clips => "clips",
        SchemaKind::PodcastScript => "script",
        SchemaKind::Narrative => "content",
    }
}

/// Find the array in a parsed value: bare, or wrapped under the conventional key.
fn locate_array(value: Value, schema: SchemaKind) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove(envelope_key(schema)) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn parse_value(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    // Tolerate prose around the payload by slicing the outermost array.
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end]).ok()
}

fn items_of<T: for<'de> Deserialize<'de>>(items: Vec<Value>) -> Option<Vec<T>> {
    let parsed: Vec<T> = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(|e| debug!("Item does not match schema: {}", e))
        .ok()?;
    if parsed.is_empty() { None } else { Some(parsed) }
}

fn strict_parse(text: &str, schema: SchemaKind) -> Option<Artifact> {
    let items = locate_array(parse_value(text)?, schema)?;
    match schema {
        SchemaKind::Slides => {
            items_of::<RawSlide>(items).map(|raw| Artifact::Slides(raw.into_iter().map(Slide::from).collect()))
        }
        SchemaKind::Quiz => items_of(items).map(Artifact::Quiz),
        SchemaKind::Flashcards => items_of(items).map(Artifact::Flashcards),
        SchemaKind::Clips => items_of(items).map(Artifact::Clips),
        SchemaKind::PodcastScript => items_of::<DialogueLine>(items)
            .map(|lines| lines.into_iter().filter(|l| !l.text.trim().is_empty()).collect::<Vec<_>>())
            .filter(|lines| !lines.is_empty())
            .map(Artifact::Script),
        SchemaKind::Narrative => None,
    }
}

fn fallback(raw: &str, schema: SchemaKind) -> Artifact {
    let raw = raw.trim().to_string();
    match schema {
        SchemaKind::Slides | SchemaKind::Narrative => Artifact::Slides(vec![Slide::block(FALLBACK_TITLE, raw)]),
        SchemaKind::Quiz => Artifact::Quiz(vec![QuizQuestion {
            question: raw,
            options: Vec::new(),
            answer: String::new(),
        }]),
        SchemaKind::Flashcards => Artifact::Flashcards(vec![Flashcard { front: FALLBACK_TITLE.to_string(), back: raw }]),
        SchemaKind::Clips => Artifact::Clips(vec![Clip {
            start_time: 0.0,
            end_time: 0.0,
            viral_score: 0,
            reason: raw,
            suggested_caption: String::new(),
        }]),
        SchemaKind::PodcastScript => Artifact::Script(vec![DialogueLine { speaker: "Alex".to_string(), text: raw }]),
    }
}

/// Parse model output against `schema`. Always returns at least one item.
pub fn parse(raw: &str, schema: SchemaKind) -> ParsedArtifact {
    if schema == SchemaKind::Narrative {
        return ParsedArtifact { artifact: Artifact::Narrative(raw.trim().to_string()), degraded: false };
    }

    let text = strip_fences(raw);
    match strict_parse(text, schema) {
        Some(artifact) => ParsedArtifact { artifact, degraded: false },
        None => {
            warn!("Model output did not match the {:?} schema, using fallback content", schema);
            ParsedArtifact { artifact: fallback(text, schema), degraded: true }
        }
    }
}

impl ParsedArtifact {
    /// Raw model text kept by `fallback`.
    fn fallback_text(&self) -> String {
        let parts: Vec<&str> = match &self.artifact {
            Artifact::Slides(v) => v
                .iter()
                .map(|s| match &s.body {
                    SlideBody::Block { content } => content.as_str(),
                    SlideBody::Points { .. } => "",
                })
                .collect(),
            Artifact::Quiz(v) => v.iter().map(|q| q.question.as_str()).collect(),
            Artifact::Flashcards(v) => v.iter().map(|c| c.back.as_str()).collect(),
            Artifact::Clips(v) => v.iter().map(|c| c.reason.as_str()).collect(),
            Artifact::Script(v) => v.iter().map(|l| l.text.as_str()).collect(),
            Artifact::Narrative(text) => vec![text.as_str()],
        };
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join("\n\n")
    }

    pub fn len(&self) -> usize {
        match &self.artifact {
            Artifact::Slides(v) => v.len(),
            Artifact::Quiz(v) => v.len(),
            Artifact::Flashcards(v) => v.len(),
            Artifact::Clips(v) => v.len(),
            Artifact::Script(v) => v.len(),
            Artifact::Narrative(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Caller-facing JSON envelope, e.g. `{"questions": [...]}`.
    pub fn to_json(&self) -> Value {
        let mut out = match &self.artifact {
            Artifact::Slides(v) => json!({ "slides": v }),
            Artifact::Quiz(v) => json!({ "questions": v }),
            Artifact::Flashcards(v) => json!({ "flashcards": v }),
            Artifact::Clips(v) => json!({ "clips": v }),
            Artifact::Script(v) => json!({ "script": v }),
            Artifact::Narrative(text) => json!({ "content": text }),
        };
        if self.degraded {
            out["degraded"] = Value::Bool(true);
        }
        out
    }

    /// Slides for export. Never empty. Degraded output is one slide titled
    /// `FALLBACK_TITLE` holding the raw text, whatever the schema.
    pub fn to_slides(&self) -> Vec<Slide> {
        if self.degraded {
            return vec![Slide::block(FALLBACK_TITLE, self.fallback_text())];
        }

        let slides: Vec<Slide> = match &self.artifact {
            Artifact::Slides(v) => v.clone(),
            Artifact::Quiz(v) => v
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    let mut slide = if q.options.is_empty() {
                        Slide::block(format!("Question {}", i + 1), q.question.clone())
                    } else {
                        Slide::points(q.question.clone(), q.options.clone())
                    };
                    if !q.answer.is_empty() {
                        slide.speaker_notes = format!("Answer: {}", q.answer);
                    }
                    slide
                })
                .collect(),
            Artifact::Flashcards(v) => v.iter().map(|c| Slide::block(c.front.clone(), c.back.clone())).collect(),
            Artifact::Clips(v) => v
                .iter()
                .map(|c| {
                    let mut points = vec![c.reason.clone()];
                    if !c.suggested_caption.is_empty() {
                        points.push(format!("Caption: {}", c.suggested_caption));
                    }
                    points.push(format!("Viral score: {}", c.viral_score));
                    Slide::points(format!("Clip {:.1}s - {:.1}s", c.start_time, c.end_time), points)
                })
                .collect(),
            Artifact::Script(v) => v.iter().map(|l| Slide::block(l.speaker.clone(), l.text.clone())).collect(),
            Artifact::Narrative(text) => narrative_slides(text),
        };

        if slides.is_empty() {
            vec![Slide::block(FALLBACK_TITLE, String::new())]
        } else {
            slides
        }
    }
}

/// Split narrative text at markdown headings or "Slide N:" lines.
fn narrative_slides(text: &str) -> Vec<Slide> {
    let mut slides = Vec::new();
    let mut title: Option<String> = None;
    let mut lines: Vec<String> = Vec::new();

    let flush = |title: &mut Option<String>, lines: &mut Vec<String>, slides: &mut Vec<Slide>| {
        if title.is_none() && lines.is_empty() {
            return;
        }
        let heading = title.take().unwrap_or_else(|| FALLBACK_TITLE.to_string());
        let body: Vec<String> = lines.drain(..).collect();
        slides.push(if body.len() > 1 {
            Slide::points(heading, body)
        } else {
            Slide::block(heading, body.into_iter().next().unwrap_or_default())
        });
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let heading = if trimmed.starts_with('#') {
            Some(trimmed.trim_start_matches('#').trim().to_string())
        } else if trimmed.to_lowercase().starts_with("slide ") && trimmed.contains(':') {
            trimmed.split_once(':').map(|(_, rest)| rest.trim().to_string())
        } else {
            None
        };

        match heading {
            Some(h) => {
                flush(&mut title, &mut lines, &mut slides);
                title = Some(h.trim_matches('*').trim().to_string());
            }
            None => lines.push(clean_bullet(trimmed)),
        }
    }
    flush(&mut title, &mut lines, &mut slides);
    slides
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"[{"question": "What does photosynthesis convert?", "options": ["Light into chemical energy","Water into oxygen","Heat into light","Sound into energy"], "answer": "Light into chemical energy"}]"#;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("  ```\n[1]\n```  "), "[1]");
        assert_eq!(strip_fences("[1]"), "[1]");
    }

    #[test]
    fn test_quiz_parses_with_and_without_fences() {
        for raw in [QUIZ.to_string(), format!("```json\n{}\n```", QUIZ)] {
            let parsed = parse(&raw, SchemaKind::Quiz);
            assert!(!parsed.degraded);
            let Artifact::Quiz(questions) = &parsed.artifact else { panic!("expected quiz") };
            assert_eq!(questions.len(), 1);
            assert!(questions[0].options.contains(&questions[0].answer));

            let json = parsed.to_json();
            assert_eq!(json["questions"].as_array().unwrap().len(), 1);
            assert_eq!(json["questions"][0]["answer"], "Light into chemical energy");
            assert!(json.get("degraded").is_none());
        }
    }

    #[test]
    fn test_malformed_output_falls_back_to_raw_text() {
        for schema in [SchemaKind::Slides, SchemaKind::Quiz, SchemaKind::Flashcards, SchemaKind::Clips, SchemaKind::PodcastScript] {
            let parsed = parse("Sorry, I cannot help with that.", schema);
            assert!(parsed.degraded);
            assert_eq!(parsed.len(), 1);
            assert!(parsed.to_json().to_string().contains("Sorry, I cannot help with that."));
        }
    }

    #[test]
    fn test_empty_array_falls_back() {
        let parsed = parse("[]", SchemaKind::Slides);
        assert!(parsed.degraded);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_wrong_item_shape_falls_back() {
        let parsed = parse(r#"[{"front": "a"}]"#, SchemaKind::Flashcards);
        assert!(parsed.degraded);
    }

    #[test]
    fn test_slides_accept_points_or_content() {
        let raw = r#"{"slides": [
            {"title": "Slide 1", "content": "Bullet A\n- Bullet B"},
            {"title": "Slide 2", "content": "Conclusion", "notes": "wrap up"},
            {"title": "Slide 3", "points": ["One", "", "Two"], "image": "diagram.png"},
            {"content": ["x", "y"]}
        ]}"#;
        let parsed = parse(raw, SchemaKind::Slides);
        assert!(!parsed.degraded);
        let Artifact::Slides(slides) = parsed.artifact else { panic!("expected slides") };
        assert_eq!(slides.len(), 4);
        assert_eq!(slides[0].body, SlideBody::Points { points: vec!["Bullet A".into(), "Bullet B".into()] });
        assert_eq!(slides[1].body, SlideBody::Block { content: "Conclusion".into() });
        assert_eq!(slides[1].speaker_notes, "wrap up");
        assert_eq!(slides[2].body, SlideBody::Points { points: vec!["One".into(), "Two".into()] });
        assert_eq!(slides[2].image_reference.as_deref(), Some("diagram.png"));
        assert_eq!(slides[3].title, "Untitled");
    }

    #[test]
    fn test_counts_are_not_enforced() {
        let many: Vec<Value> = (0..12).map(|i| json!({"front": i.to_string(), "back": "b"})).collect();
        let parsed = parse(&Value::Array(many).to_string(), SchemaKind::Flashcards);
        assert_eq!(parsed.len(), 12);
    }

    #[test]
    fn test_prose_around_array_is_tolerated() {
        let raw = "Here are your cards:\n[{\"front\": \"Python\", \"back\": \"A programming language\"}]\nEnjoy!";
        let parsed = parse(raw, SchemaKind::Flashcards);
        assert!(!parsed.degraded);
        assert_eq!(parsed.to_json()["flashcards"][0]["front"], "Python");
    }

    #[test]
    fn test_clip_scores_are_rounded() {
        let raw = r#"[{"start_time": 2.0, "end_time": 7.0, "viral_score": 89.6, "reason": "High energy intro", "suggested_caption": "Viral!"}]"#;
        let parsed = parse(raw, SchemaKind::Clips);
        let json = parsed.to_json();
        assert_eq!(json["clips"][0]["viral_score"], 90);
        assert_eq!(json["clips"][0]["start_time"], 2.0);
    }

    #[test]
    fn test_script_drops_blank_lines() {
        let raw = r#"[{"speaker": "Alex", "text": "Hello world"}, {"speaker": "Sam", "text": ""}, {"speaker": "Sam", "text": "Hi Alex"}]"#;
        let parsed = parse(raw, SchemaKind::PodcastScript);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_to_slides_never_empty() {
        let parsed = ParsedArtifact { artifact: Artifact::Narrative(String::new()), degraded: false };
        assert_eq!(parsed.to_slides().len(), 1);

        let quiz = parse(QUIZ, SchemaKind::Quiz).to_slides();
        assert_eq!(quiz[0].speaker_notes, "Answer: Light into chemical energy");
    }

    #[test]
    fn test_degraded_output_exports_under_fallback_title() {
        let raw = "Sorry, the model rambled.";
        for schema in [
            SchemaKind::Slides,
            SchemaKind::Quiz,
            SchemaKind::Flashcards,
            SchemaKind::Clips,
            SchemaKind::PodcastScript,
        ] {
            let parsed = parse(raw, schema);
            assert!(parsed.degraded);
            let slides = parsed.to_slides();
            assert_eq!(slides.len(), 1, "{:?}", schema);
            assert_eq!(slides[0].title, FALLBACK_TITLE, "{:?}", schema);
            assert_eq!(slides[0].body, SlideBody::Block { content: raw.to_string() }, "{:?}", schema);
        }
    }

    #[test]
    fn test_narrative_sections_become_slides() {
        let text = "# Intro\n- point one\n- point two\n\n## Details\nJust one line\nSlide 3: Wrap up\n";
        let slides = narrative_slides(text);
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[0].title, "Intro");
        assert_eq!(slides[0].body, SlideBody::Points { points: vec!["point one".into(), "point two".into()] });
        assert_eq!(slides[1].body, SlideBody::Block { content: "Just one line".into() });
        assert_eq!(slides[2].title, "Wrap up");
    }
}
