//! Delimited knowledge source parser
//!
//! Turns the raw sheet export (pipe, tab or comma separated, header row first)
//! into QA rules and personality phrase pools.

use super::{Category, Knowledge, KnowledgeRecord, PersonalityPool, RowSkipped};
use crate::config::KnowledgeConfig;
use crate::error::{EngineError, Result};
use std::collections::HashSet;

/// Pipe wins over tab, tab over comma.
pub fn detect_delimiter(header: &str) -> char {
    ['|', '\t']
        .into_iter()
        .find(|d| header.contains(*d))
        .unwrap_or(',')
}

/// Splits one row, keeping delimiters that sit inside double quotes.
/// A doubled quote inside a quoted segment is a literal quote.
pub fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Splits the source into records, each tagged with the line it starts on.
/// Line breaks inside a quoted cell stay part of the record.
pub fn split_records(text: &str) -> Vec<(usize, String)> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\n' => {
                line += 1;
                if in_quotes {
                    current.push(c);
                } else {
                    records.push((start_line, current.trim_end_matches('\r').to_string()));
                    current.clear();
                    start_line = line;
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        records.push((start_line, current.trim_end_matches('\r').to_string()));
    }
    records
}

pub fn parse_keywords(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

struct Columns {
    id: usize,
    keywords: usize,
    answer: usize,
    width: usize,
}

fn locate_columns(header_line: &str, delimiter: char, config: &KnowledgeConfig) -> Result<Columns> {
    let header: Vec<String> = split_row(header_line.trim_start_matches('\u{feff}'), delimiter)
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();

    let find = |name: &str| {
        let name = name.to_lowercase();
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| EngineError::Format(format!("missing column '{}' in header {:?}", name, header)))
    };

    Ok(Columns {
        id: find(&config.id_column)?,
        keywords: find(&config.keywords_column)?,
        answer: find(&config.answer_column)?,
        width: header.len(),
    })
}

fn category_for(id: &str, config: &KnowledgeConfig) -> Option<Category> {
    let id = id.to_lowercase();
    if id == config.greeting_id.to_lowercase() {
        Some(Category::Greeting)
    } else if id == config.closing_id.to_lowercase() {
        Some(Category::Closing)
    } else if id == config.fallback_id.to_lowercase() {
        Some(Category::Fallback)
    } else {
        None
    }
}

/// Fails only with `EngineError::Format`; bad rows are skipped and reported.
/// Quoted cells may span several lines.
pub fn parse(text: &str, config: &KnowledgeConfig) -> Result<Knowledge> {
    let mut lines = split_records(text).into_iter().filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| EngineError::Format("knowledge source is empty".to_string()))?;
    let delimiter = detect_delimiter(&header_line);
    let columns = locate_columns(&header_line, delimiter, config)?;

    let mut rules = Vec::new();
    let mut personality = PersonalityPool::default();
    let mut skipped = Vec::new();
    let mut seen_ids = HashSet::new();

    for (line, row) in lines {
        let fields = split_row(&row, delimiter);
        if fields.len() != columns.width {
            tracing::warn!(
                "[KnowledgeParser] Skipping line {}: expected {} fields, found {}",
                line,
                columns.width,
                fields.len()
            );
            skipped.push(RowSkipped {
                line,
                expected: columns.width,
                found: fields.len(),
            });
            continue;
        }

        let id = fields[columns.id].as_str();
        let answer = fields[columns.answer].replace("\\n", "\n");

        if let Some(category) = category_for(id, config) {
            if !answer.is_empty() {
                personality.push(category, answer);
            }
            continue;
        }

        let keywords = parse_keywords(&fields[columns.keywords]);
        if id.is_empty() || keywords.is_empty() || answer.is_empty() {
            continue;
        }
        if !seen_ids.insert(id.to_string()) {
            tracing::warn!("[KnowledgeParser] Duplicate rule id '{}' on line {}, keeping the first", id, line);
            continue;
        }

        rules.push(KnowledgeRecord {
            id: id.to_string(),
            keywords,
            answer,
        });
    }

    tracing::debug!(
        "[KnowledgeParser] Parsed {} rules, {} skipped rows (delimiter {:?})",
        rules.len(),
        skipped.len(),
        delimiter
    );

    Ok(Knowledge {
        rules,
        personality,
        skipped,
        degraded: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KnowledgeConfig {
        KnowledgeConfig::default()
    }

    #[test]
    fn test_quoted_keywords_keep_their_comma() {
        let text = "id,keywords,answer\nr1,\"precio, delivery\",Cuesta 10 soles\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.rules.len(), 1);
        let rule = &knowledge.rules[0];
        assert_eq!(rule.id, "r1");
        assert_eq!(rule.keywords, vec!["precio", "delivery"]);
        assert_eq!(rule.answer, "Cuesta 10 soles");
    }

    #[test]
    fn test_delimiter_preference() {
        assert_eq!(detect_delimiter("id|keywords|answer"), '|');
        assert_eq!(detect_delimiter("id\tkeywords,x\tanswer"), '\t');
        assert_eq!(detect_delimiter("id,keywords,answer"), ',');
        assert_eq!(detect_delimiter("id|keywords\tanswer"), '|');
    }

    #[test]
    fn test_pipe_source_with_case_folded_header() {
        let text = "ID|Keywords|Answer\nhours|horario, hora|Open 9 to 5\\nMonday to Friday\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.rules[0].keywords, vec!["horario", "hora"]);
        assert_eq!(knowledge.rules[0].answer, "Open 9 to 5\nMonday to Friday");
    }

    #[test]
    fn test_missing_column_is_format_error() {
        let err = parse("id,words,answer\nr1,a,b\n", &config()).unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));

        let err = parse("\n\n", &config()).unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));
    }

    #[test]
    fn test_row_with_wrong_field_count_is_skipped() {
        let text = "id,keywords,answer\nr1,price,Ten\nr2,broken\nr3,hours,Nine to five\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.rules.len(), 2);
        assert_eq!(
            knowledge.skipped,
            vec![RowSkipped {
                line: 3,
                expected: 3,
                found: 2
            }]
        );
    }

    #[test]
    fn test_reserved_ids_fill_personality_pools() {
        let text = "id,keywords,answer\n\
                    greeting,,Hi!\n\
                    greeting,,Hello!\n\
                    Closing,,Anything else?\n\
                    fallback,,I don't know that one.\n\
                    r1,price,Ten soles\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.personality.phrases(Category::Greeting), ["Hi!", "Hello!"]);
        assert_eq!(knowledge.personality.phrases(Category::Closing), ["Anything else?"]);
        assert_eq!(knowledge.personality.phrases(Category::Fallback).len(), 1);
        assert_eq!(knowledge.rules.len(), 1);
    }

    #[test]
    fn test_incomplete_and_duplicate_rules_are_dropped() {
        let text = "id,keywords,answer\n,price,Ten\nr1,,Ten\nr2,price,\nr3,price,Ten\nr3,cost,Eleven\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.rules.len(), 1);
        assert_eq!(knowledge.rules[0].answer, "Ten");
    }

    #[test]
    fn test_escaped_quotes_and_crlf() {
        let fields = split_row("r1,\"say \"\"hi\"\"\",x\r", ',');
        assert_eq!(fields, vec!["r1", "say \"hi\"", "x\r".trim()]);

        let text = "id,keywords,answer\r\nr1,greet,\"Say \"\"hi\"\"\"\r\n";
        let knowledge = parse(text, &config()).unwrap();
        assert_eq!(knowledge.rules[0].answer, "Say \"hi\"");
    }

    #[test]
    fn test_quoted_cell_may_span_lines() {
        let text = "id,keywords,answer\nr1,envio,\"Lima: 1 day\nProvinces: 3 days\"\nr2,broken\nr3,hours,Nine\n";
        let knowledge = parse(text, &config()).unwrap();

        assert_eq!(knowledge.rules.len(), 2);
        assert_eq!(knowledge.rules[0].answer, "Lima: 1 day\nProvinces: 3 days");
        assert_eq!(knowledge.skipped[0].line, 4);
    }

    #[test]
    fn test_records_track_starting_line() {
        let records = split_records("a,b\r\n\"x\ny\",z\nlast");
        assert_eq!(
            records,
            vec![(1, "a,b".to_string()), (2, "\"x\ny\",z".to_string()), (4, "last".to_string())]
        );
    }

    #[test]
    fn test_custom_column_names() {
        let config = KnowledgeConfig {
            id_column: "clave".into(),
            keywords_column: "palabras".into(),
            answer_column: "respuesta".into(),
            ..KnowledgeConfig::default()
        };
        let knowledge = parse("Clave\tPalabras\tRespuesta\nr1\tprecio\tDiez\n", &config).unwrap();
        assert_eq!(knowledge.rules[0].id, "r1");
    }
}
