//! Conversation export: Markdown and self-contained HTML.

use chrono::Utc;

use crate::plugins::storage::{Conversation, Factor, FactorValue};
use crate::services::prompts::local_offset;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Include the date/factor metadata block before the turns.
    pub include_metadata: bool,
}

fn factor_summary(factors: &[Factor]) -> String {
    factors
        .iter()
        .map(|f| {
            let value = match &f.value {
                FactorValue::Toggle => {
                    if f.enabled { "ativado" } else { "desativado" }.to_string()
                }
                FactorValue::Slider { value, .. } => value.to_string(),
                FactorValue::Dropdown { value, .. } => value.clone(),
                FactorValue::Text { value } => value.clone(),
            };
            format!("{}: {}", f.label, value)
        })
        .collect::<Vec<_>>()
        .join(" · ")
}

fn export_date() -> String {
    Utc::now()
        .with_timezone(&local_offset())
        .format("%d/%m/%Y %H:%M")
        .to_string()
}

pub fn to_markdown(
    conversation: &Conversation,
    factors: &[Factor],
    options: ExportOptions,
) -> String {
    let title = if conversation.title.is_empty() {
        "Conversa"
    } else {
        conversation.title.as_str()
    };
    let mut out = format!("# {title}\n");

    if options.include_metadata {
        out.push_str(&format!("\n> Exportado em {}\n", export_date()));
        if !factors.is_empty() {
            out.push_str(&format!("> Fatores: {}\n", factor_summary(factors)));
        }
    }

    for turn in &conversation.turns {
        out.push_str("\n## Usuário\n\n");
        out.push_str(&turn.user_text);
        out.push_str("\n\n## Tessy\n\n");
        out.push_str(&turn.assistant_text);
        out.push('\n');
        if !turn.citations.is_empty() {
            out.push_str("\nFontes:\n");
            for citation in &turn.citations {
                out.push_str(&format!("- [{}]({})\n", citation.title, citation.uri));
            }
        }
    }

    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn to_html(conversation: &Conversation, factors: &[Factor], options: ExportOptions) -> String {
    let title = if conversation.title.is_empty() {
        "Conversa".to_string()
    } else {
        escape_html(&conversation.title)
    };

    let mut body = String::new();
    if options.include_metadata {
        body.push_str(&format!(
            "<p class=\"meta\">Exportado em {}</p>\n",
            export_date()
        ));
        if !factors.is_empty() {
            body.push_str(&format!(
                "<p class=\"meta\">Fatores: {}</p>\n",
                escape_html(&factor_summary(factors))
            ));
        }
    }

    for turn in &conversation.turns {
        body.push_str(&format!(
            "<div class=\"turn\"><p class=\"role\">Usuário</p><p>{}</p></div>\n",
            escape_html(&turn.user_text)
        ));
        body.push_str(&format!(
            "<div class=\"turn assistant\"><p class=\"role\">Tessy</p><p>{}</p>",
            escape_html(&turn.assistant_text)
        ));
        if !turn.citations.is_empty() {
            body.push_str("<ul class=\"sources\">");
            for citation in &turn.citations {
                body.push_str(&format!(
                    "<li><a href=\"{}\">{}</a></li>",
                    escape_html(&citation.uri),
                    escape_html(&citation.title)
                ));
            }
            body.push_str("</ul>");
        }
        body.push_str("</div>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\nbody {{ font-family: sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; color: #222; }}\n.meta {{ color: #777; font-size: 0.85rem; }}\n.turn {{ margin: 1.2rem 0; padding: 0.8rem 1rem; border-radius: 8px; background: #f4f4f5; }}\n.turn.assistant {{ background: #eef4ff; }}\n.role {{ font-weight: bold; margin: 0 0 0.4rem; }}\n.sources {{ font-size: 0.85rem; }}\n</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}
