//! Filename heuristics
//!
//! Zero-cost first guess from the file name alone: a category's own name as a
//! whole word wins, then a fixed set of domain keyword patterns.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::categories::{CategorySet, Classification};

/// Confidence when the filename contains a category's own name
pub const CATEGORY_NAME_CONFIDENCE: f32 = 0.98;

/// Confidence when the filename contains a domain keyword
pub const KEYWORD_CONFIDENCE: f32 = 0.90;

/// A keyword group and the category names it can resolve to, in preference order
struct KeywordGroup {
    aliases: &'static [&'static str],
    pattern: Regex,
}

fn group(aliases: &'static [&'static str], terms: &str) -> KeywordGroup {
    KeywordGroup {
        aliases,
        pattern: Regex::new(&format!(r"\b({})\b", terms)).expect("Invalid keyword pattern"),
    }
}

/// Declaration order is the tie-break order
static KEYWORD_GROUPS: Lazy<Vec<KeywordGroup>> = Lazy::new(|| {
    vec![
        group(
            &["Financial", "Finance", "Financeiro"],
            "statement|invoice|bill|payslip|paystub|tax|receipt|bank slip|\
             extrato|fatura|boleto|conta|holerite|imposto|recibo|nota fiscal|nf e|nfe|danfe",
        ),
        group(
            &["Personal", "Pessoal"],
            "passport|id card|driver license|drivers license|birth certificate|\
             marriage certificate|voter|identity|\
             rg|cpf|cnh|passaporte|certidao|eleitor|nascimento|casamento|identidade|titulo eleitoral",
        ),
        group(
            &["Legal", "Jurídico", "Juridico"],
            "contract|petition|notice|court|agreement|deed|power of attorney|permit|ruling|terms of|\
             contrato|peticao|notificacao|judicial|acordo|escritura|procuracao|alvara|sentenca|termo de",
        ),
        group(
            &["Health", "Saúde", "Saude"],
            "exam|lab report|prescription|medical|vaccine|vaccination|appointment|\
             medical history|medical certificate|\
             exame|laudo|receita|medico|vacina|consulta|historico medico|atestado|relatorio medico",
        ),
    ]
});

/// Strip the extension, lowercase, and turn `_`/`-` into spaces
pub fn normalize_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    stem.to_lowercase().replace(['_', '-'], " ")
}

/// Classify a file by its name.
///
/// Returns `Unmatched` with confidence 0.0 when nothing matches.
pub fn classify(filename: &str, categories: &CategorySet) -> (Classification, f32) {
    let normalized = normalize_filename(filename);

    for name in categories.names() {
        let pattern = format!(r"\b{}\b", regex::escape(&name.to_lowercase()));
        let matched = Regex::new(&pattern)
            .map(|re| re.is_match(&normalized))
            .unwrap_or(false);
        if matched {
            return (Classification::from_name(name), CATEGORY_NAME_CONFIDENCE);
        }
    }

    for group in KEYWORD_GROUPS.iter() {
        let Some(category) = group.aliases.iter().find_map(|alias| categories.find(alias)) else {
            continue;
        };
        if group.pattern.is_match(&normalized) {
            return (Classification::from_name(category), KEYWORD_CONFIDENCE);
        }
    }

    (Classification::Unmatched, 0.0)
}
