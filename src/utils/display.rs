use crate::engine::{Reply, ReplyKind, ReplySink};
use colored::*;
use std::io::Write;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

/// Writes replies to the terminal, colored by kind
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ReplySink for ConsoleSink {
    fn deliver(&mut self, reply: &Reply) {
        match reply.kind {
            ReplyKind::Answer => println!("{}\n", reply.text),
            ReplyKind::Suggestion => println!("{}\n", reply.text.cyan()),
            ReplyKind::Fallback => println!("{}\n", reply.text.yellow()),
            ReplyKind::Notice => println!("{}\n", reply.text.yellow().bold()),
            ReplyKind::Apology => println!("{}\n", reply.text.red()),
        }
    }
}
