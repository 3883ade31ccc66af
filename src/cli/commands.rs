use crate::config::Mode;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "answerkit")]
#[command(author, version, about = "Answer chat questions from LLM backends or a knowledge sheet", long_about = None)]
pub struct Cli {
    /// Override the configured answer mode
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Access key for gated deployments
    #[arg(long, global = true)]
    pub access_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Ai,
    Knowledge,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Ai => Mode::Ai,
            ModeArg::Knowledge => Mode::Knowledge,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a single message
    Ask {
        query: String,

        /// Value of the hidden form field (non-empty means bot)
        #[arg(long)]
        honeypot: Option<String>,
    },

    /// Start an interactive chat session
    Interactive {
        /// Session identifier used in logs
        #[arg(long, default_value = "cli")]
        session_id: String,
    },

    /// Load the knowledge source and report what was parsed
    Knowledge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_mode_override() {
        let cli = Cli::try_parse_from(["answerkit", "--mode", "ai", "ask", "what is the price"]).unwrap();
        assert!(matches!(cli.mode, Some(ModeArg::Ai)));
        assert!(matches!(cli.command, Commands::Ask { ref query, honeypot: None } if query == "what is the price"));
    }

    #[test]
    fn test_interactive_default_session() {
        let cli = Cli::try_parse_from(["answerkit", "interactive", "--access-key", "demo-42"]).unwrap();
        assert_eq!(cli.access_key.as_deref(), Some("demo-42"));
        assert!(matches!(cli.command, Commands::Interactive { ref session_id } if session_id == "cli"));
        assert_eq!(Mode::from(ModeArg::Knowledge), Mode::Knowledge);
    }
}
