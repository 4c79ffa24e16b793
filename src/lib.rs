//! Modyfire - video and text to study material
//!
//! Resolves a video reference (or takes raw text), asks a text-generation model
//! for summaries, slide decks, quizzes, flashcards, clip picks or podcast scripts,
//! parses the answer into typed artifacts, and exports them as PDF, PPTX or MP3.

pub mod audio;
pub mod background;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod generate;
pub mod parse;
pub mod policy;
pub mod prompt;
pub mod request;
pub mod storage;
pub mod transcript;
pub mod usage;
pub mod workflow;
