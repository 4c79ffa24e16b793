use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the source text comes from. Exactly one is required.
#[derive(ClapArgs, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Video URL or 11-character video id
    #[arg(short, long)]
    pub url: Option<String>,

    /// Source text given inline
    #[arg(long)]
    pub text: Option<String>,

    /// Read source text from a file
    #[arg(long)]
    pub text_file: Option<PathBuf>,
}

/// Who is asking; decides usage attribution and the export watermark.
#[derive(ClapArgs, Debug, Clone)]
pub struct CallerArgs {
    /// User id of an authenticated caller
    #[arg(long)]
    pub user: Option<String>,

    /// Treat the caller as authenticated even without a user id
    #[arg(long)]
    pub authenticated: bool,

    /// Remaining credits of the caller
    #[arg(long, default_value = "0")]
    pub credits: i64,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GenerateArgs {
    /// Content type (summary, study-guide, slide-deck, quiz, flashcards, clip-analysis, podcast-script, blog, carousel)
    #[arg(short = 'T', long = "type", default_value = "summary")]
    pub content_type: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Audience tier (student, professor, podcaster)
    #[arg(long, default_value = "student")]
    pub tier: String,

    /// Output language
    #[arg(short, long, default_value = "English")]
    pub language: String,

    /// Tone (professional, fun, academic, neutral)
    #[arg(long, default_value = "professional")]
    pub tone: String,

    /// Target item count, e.g. "6-10" or "8"
    #[arg(long, default_value = "6-10")]
    pub count: String,

    #[command(flatten)]
    pub caller: CallerArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate content from a video or text and print it as JSON
    Generate {
        #[command(flatten)]
        args: GenerateArgs,

        /// Write the JSON to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate content and export it as a PDF or PPTX document
    Export {
        #[command(flatten)]
        args: GenerateArgs,

        /// Document format (pdf, pptx)
        #[arg(short, long, default_value = "pdf")]
        format: String,

        /// Theme name (see `themes`)
        #[arg(long)]
        theme: Option<String>,

        /// Aspect ratio (16:9, 1:1)
        #[arg(long, default_value = "16:9")]
        aspect: String,

        /// Output document path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Synthesize podcast audio from a script file or from generated content
    Podcast {
        /// Podcast script JSON file (list of {speaker, text})
        #[arg(long)]
        script: Option<PathBuf>,

        /// Video URL or id to generate a script from
        #[arg(short, long, conflicts_with = "script")]
        url: Option<String>,

        /// Source text file to generate a script from
        #[arg(long, conflicts_with_all = ["script", "url"])]
        text_file: Option<PathBuf>,

        /// Output language for a generated script
        #[arg(short, long, default_value = "English")]
        language: String,

        /// Output MP3 path
        #[arg(short, long, default_value = "podcast.mp3")]
        output: PathBuf,
    },

    /// Resolve a video to text and print it with the source it came from
    Resolve {
        /// Video URL or 11-character video id
        #[arg(short, long)]
        url: String,

        /// Preferred caption language
        #[arg(short, long, default_value = "English")]
        language: String,
    },

    /// Rewrite text in another tone
    Rewrite {
        /// Text file to rewrite
        #[arg(short, long)]
        input: PathBuf,

        /// Target tone, e.g. "fun" or "more formal"
        #[arg(long, default_value = "professional")]
        tone: String,
    },

    /// Render a text file as a plain PDF report
    Report {
        /// Text file to render
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Delete every stored artifact of a user
    Purge {
        /// User id whose artifacts are removed
        #[arg(long)]
        user: String,
    },

    /// List export themes
    Themes,

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "modyfire.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_generate_requires_one_source() {
        assert!(Args::try_parse_from(["modyfire", "generate", "--type", "quiz"]).is_err());
        assert!(Args::try_parse_from(["modyfire", "generate", "--url", "abc", "--text", "x"]).is_err());

        let args = Args::try_parse_from(["modyfire", "generate", "-T", "quiz", "--text", "notes"]).unwrap();
        match args.command {
            Commands::Generate { args, output } => {
                assert_eq!(args.content_type, "quiz");
                assert_eq!(args.source.text.as_deref(), Some("notes"));
                assert_eq!(args.count, "6-10");
                assert!(output.is_none());
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_export_options() {
        let args = Args::try_parse_from([
            "modyfire", "export", "--url", "dQw4w9WgXcQ", "-T", "slide-deck", "--format", "pptx",
            "--theme", "dark", "--aspect", "1:1", "--user", "u1", "--credits", "5", "-o", "deck.pptx",
        ])
        .unwrap();
        match args.command {
            Commands::Export { args, format, theme, aspect, output, .. } => {
                assert_eq!(format, "pptx");
                assert_eq!(theme.as_deref(), Some("dark"));
                assert_eq!(aspect, "1:1");
                assert_eq!(args.caller.user.as_deref(), Some("u1"));
                assert_eq!(args.caller.credits, 5);
                assert_eq!(output, PathBuf::from("deck.pptx"));
            }
            _ => panic!("expected export"),
        }
    }
}
