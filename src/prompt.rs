//! Prompt construction.
//!
//! Every builder here is a pure function of its inputs: identical arguments
//! always produce byte-identical instruction text.

use serde::{Deserialize, Serialize};

use crate::request::{ContentType, TargetCount, Tier, Tone};

/// Shape the model is told to answer in, and the parser validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    Narrative,
    Slides,
    Quiz,
    Flashcards,
    Clips,
    PodcastScript,
}

impl SchemaKind {
    pub fn for_content_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::SlideDeck => Self::Slides,
            ContentType::Quiz => Self::Quiz,
            ContentType::Flashcards => Self::Flashcards,
            ContentType::ClipAnalysis => Self::Clips,
            ContentType::PodcastScript => Self::PodcastScript,
            ContentType::Summary | ContentType::StudyGuide | ContentType::Blog | ContentType::Carousel => {
                Self::Narrative
            }
        }
    }

    /// Field list appended to structured instructions.
    fn schema_description(&self) -> &'static str {
        match self {
            Self::Narrative => "",
            Self::Slides => {
                "Return a JSON array of slide objects. Each object must have:\n\
                 - \"title\": string\n\
                 - \"points\": array of strings (3 to 5 concise bullet points)\n\
                 - \"speaker_notes\": string\n\
                 - \"image_prompt\": string (a short visual idea for the slide, may be empty)"
            }
            Self::Quiz => {
                "Return a JSON array of question objects. Each object must have:\n\
                 - \"question\": string\n\
                 - \"options\": array of exactly 4 strings\n\
                 - \"answer\": string (must be identical to one of the options)"
            }
            Self::Flashcards => {
                "Return a JSON array of flashcard objects. Each object must have:\n\
                 - \"front\": string (a term or question)\n\
                 - \"back\": string (the definition or answer)"
            }
            Self::Clips => {
                "Return a JSON array of clip objects. Each object must have:\n\
                 - \"start_time\": number (seconds)\n\
                 - \"end_time\": number (seconds)\n\
                 - \"viral_score\": integer from 0 to 100\n\
                 - \"reason\": string\n\
                 - \"suggested_caption\": string"
            }
            Self::PodcastScript => {
                "Return a JSON array of dialogue lines. Each object must have:\n\
                 - \"speaker\": string (either \"Alex\" the host or \"Sam\" the expert)\n\
                 - \"text\": string"
            }
        }
    }
}

/// Style parameters that accompany the source text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PromptParams {
    pub tone: Tone,
    pub target_count: TargetCount,
    /// The text is video metadata rather than a transcript
    pub is_degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub instruction_text: String,
    pub expected_schema: SchemaKind,
}

const NO_FENCING: &str =
    "Output only the raw JSON array. Do not wrap it in markdown code fences and do not add any commentary.";

const DEGRADED_CAVEAT: &str = "Note: no transcript was available for this video. The source below is only its \
     title, description and tags, so stay general and do not invent specific quotes or numbers.";

/// Tone-setting language for each style.
pub fn tone_directive(tone: Tone) -> &'static str {
    match tone {
        Tone::Professional => "Use a professional, clear and confident tone suited to a business audience.",
        Tone::Fun => "Use a fun, energetic and conversational tone with light humor where it fits.",
        Tone::Academic => "Use a rigorous academic tone with precise terminology and careful qualification.",
        Tone::Neutral => "Use a neutral, plain and objective tone without embellishment.",
    }
}

fn language_directive(language: &str) -> String {
    format!("Write all output text in {}.", language)
}

fn narrative_framing(content_type: ContentType, tier: Tier, count: &TargetCount) -> String {
    match (content_type, tier) {
        (ContentType::Blog, _) => format!(
            "Write an engaging long-form blog post based on the following content. \
             Give it a headline, an introduction, {} sections with subheadings, and a conclusion.",
            count
        ),
        (ContentType::Carousel, _) => format!(
            "Turn the following content into a social media carousel of {} slides. \
             Write each slide on its own line as \"Slide N: <text>\", starting with a strong hook \
             and ending with a call to action.",
            count
        ),
        (_, Tier::Student) => format!(
            "Summarize the following video transcript into concise bullet points suitable for study notes. \
             Target length: {} slides/sections.",
            count
        ),
        (_, Tier::Professor) => format!(
            "Create a detailed academic study guide with citations based on the following transcript. \
             Structure the guide into {} distinct chapters or modules.",
            count
        ),
        (_, Tier::Podcaster) => format!(
            "Generate slide descriptions and visual imagery ideas for a presentation based on this transcript. \
             PRODUCE EXACTLY {} SLIDES. For each slide, provide the text content and a prompt for an image generator.",
            count
        ),
    }
}

fn structured_framing(schema: SchemaKind, tier: Tier, count: &TargetCount) -> String {
    match schema {
        SchemaKind::Slides => {
            let audience = match tier {
                Tier::Student => "a student revising the material",
                Tier::Professor => "a lecture delivered by a professor",
                Tier::Podcaster => "a creator presenting to an online audience, with strong visual ideas",
            };
            format!(
                "Convert the following content into a slide deck for {}. Create {} slides.",
                audience, count
            )
        }
        SchemaKind::Quiz => format!(
            "Create a multiple-choice quiz of {} questions that tests understanding of the following content.",
            count
        ),
        SchemaKind::Flashcards => format!(
            "Create {} study flashcards covering the key terms and ideas in the following content.",
            count
        ),
        SchemaKind::Clips => format!(
            "Identify the {} most engaging moments in the following video content that would work as short \
             social media clips, and score how likely each is to go viral.",
            count
        ),
        SchemaKind::PodcastScript => format!(
            "Write a podcast dialogue between Alex (the curious host) and Sam (the expert) that explains the \
             following content. Use about {} exchanges.",
            count
        ),
        SchemaKind::Narrative => String::new(),
    }
}

/// Build the instruction and expected schema for a content request.
pub fn build_prompt(
    content_type: ContentType,
    tier: Tier,
    text: &str,
    language: &str,
    params: &PromptParams,
) -> PromptSpec {
    let schema = SchemaKind::for_content_type(content_type);
    let mut sections: Vec<String> = Vec::new();

    if schema == SchemaKind::Narrative {
        sections.push(narrative_framing(content_type, tier, &params.target_count));
        if matches!(content_type, ContentType::Blog | ContentType::Carousel) {
            sections.push(tone_directive(params.tone).to_string());
        }
    } else {
        sections.push(structured_framing(schema, tier, &params.target_count));
        sections.push(tone_directive(params.tone).to_string());
    }
    sections.push(language_directive(language));

    if params.is_degraded {
        sections.push(DEGRADED_CAVEAT.to_string());
    }

    sections.push(format!("Content:\n{}", text.trim()));

    if schema != SchemaKind::Narrative {
        sections.push(schema.schema_description().to_string());
        sections.push(NO_FENCING.to_string());
    }

    PromptSpec {
        instruction_text: sections.join("\n\n"),
        expected_schema: schema,
    }
}

/// Restyle free text in the requested tone.
pub fn build_rewrite_prompt(text: &str, tone: &str) -> PromptSpec {
    PromptSpec {
        instruction_text: format!(
            "Rewrite the following text to be {}. Keep the meaning the same but adjust the style.\n\nText: {}",
            tone.trim(),
            text.trim()
        ),
        expected_schema: SchemaKind::Narrative,
    }
}

/// One earlier turn of a conversation about a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

/// Answer a question grounded in the video text and the conversation so far.
pub fn build_chat_prompt(context: &str, history: &[ChatTurn], question: &str, language: &str) -> PromptSpec {
    let mut out = String::from(
        "You are a helpful tutor answering questions about a video. Answer using only the video content below. \
         If the answer is not in the content, say so.",
    );
    out.push_str("\n\n");
    out.push_str(&language_directive(language));
    out.push_str("\n\nVideo content:\n");
    out.push_str(context.trim());

    if !history.is_empty() {
        out.push_str("\n\nConversation so far:\n");
        for turn in history {
            let speaker = if turn.role.eq_ignore_ascii_case("user") { "User" } else { "Tutor" };
            out.push_str(&format!("{}: {}\n", speaker, turn.text.trim()));
        }
    }

    out.push_str(&format!("\n\nQuestion: {}", question.trim()));

    PromptSpec {
        instruction_text: out,
        expected_schema: SchemaKind::Narrative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tone: Tone) -> PromptParams {
        PromptParams { tone, target_count: TargetCount::Range(6, 10), is_degraded: false }
    }

    #[test]
    fn test_prompts_are_deterministic_for_every_tuple() {
        let tiers = [Tier::Student, Tier::Professor, Tier::Podcaster];
        let tones = [Tone::Professional, Tone::Fun, Tone::Academic, Tone::Neutral];
        for content_type in ContentType::ALL {
            for tier in tiers {
                for tone in tones {
                    for language in ["English", "Spanish"] {
                        let a = build_prompt(content_type, tier, "some text", language, &params(tone));
                        let b = build_prompt(content_type, tier, "some text", language, &params(tone));
                        assert_eq!(a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_structured_prompts_end_with_schema_and_no_fencing() {
        for content_type in ContentType::ALL.into_iter().filter(|ct| ct.is_structured()) {
            let spec = build_prompt(content_type, Tier::Student, "text", "French", &params(Tone::Fun));
            assert!(spec.instruction_text.ends_with(NO_FENCING), "{}", content_type);
            assert!(spec.instruction_text.contains("Write all output text in French."));
            assert!(spec.instruction_text.contains(tone_directive(Tone::Fun)));
            assert!(spec.instruction_text.contains("6-10"));
            assert!(spec.instruction_text.contains(spec.expected_schema.schema_description()));
        }
    }

    #[test]
    fn test_tier_selects_narrative_framing() {
        let student = build_prompt(ContentType::Summary, Tier::Student, "t", "English", &params(Tone::Neutral));
        let professor = build_prompt(ContentType::StudyGuide, Tier::Professor, "t", "English", &params(Tone::Neutral));
        let podcaster = build_prompt(ContentType::Summary, Tier::Podcaster, "t", "English", &params(Tone::Neutral));

        assert!(student.instruction_text.contains("concise bullet points"));
        assert!(professor.instruction_text.contains("academic study guide with citations"));
        assert!(podcaster.instruction_text.contains("prompt for an image generator"));
        assert_eq!(student.expected_schema, SchemaKind::Narrative);
        assert!(!student.instruction_text.contains(NO_FENCING));
    }

    #[test]
    fn test_style_changes_instruction() {
        let fun = build_prompt(ContentType::Quiz, Tier::Student, "t", "English", &params(Tone::Fun));
        let academic = build_prompt(ContentType::Quiz, Tier::Student, "t", "English", &params(Tone::Academic));
        assert_ne!(fun.instruction_text, academic.instruction_text);
    }

    #[test]
    fn test_degraded_source_adds_caveat() {
        let mut p = params(Tone::Neutral);
        p.is_degraded = true;
        let spec = build_prompt(ContentType::SlideDeck, Tier::Student, "Title: x", "English", &p);
        assert!(spec.instruction_text.contains(DEGRADED_CAVEAT));
        assert_eq!(spec.expected_schema, SchemaKind::Slides);
    }

    #[test]
    fn test_chat_prompt_includes_history_and_question() {
        let history = vec![
            ChatTurn { role: "model".into(), text: "Hello".into() },
            ChatTurn { role: "user".into(), text: "Hi".into() },
        ];
        let spec = build_chat_prompt("Python functions", &history, "What is a function?", "English");
        assert!(spec.instruction_text.contains("Tutor: Hello\nUser: Hi"));
        assert!(spec.instruction_text.ends_with("Question: What is a function?"));
    }

    #[test]
    fn test_rewrite_prompt() {
        let spec = build_rewrite_prompt("Original text.", "Professional");
        assert!(spec.instruction_text.starts_with("Rewrite the following text to be Professional."));
        assert!(spec.instruction_text.ends_with("Text: Original text."));
    }
}
